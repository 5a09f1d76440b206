//! Abstract Syntax Tree
//!
//! A single uniform node shape carries every construct in the dialect:
//! declarations, statements, and expressions alike. `kind` is a short tag
//! ("if", "+", "compound_statement", "identifier", ...); `text` carries
//! the payload for leaves (identifier spelling, literal text, operator
//! symbol); `children` are ordered sub-nodes. Equality is structural and
//! ignores location, which is what the parser's backtracking relies on
//! when comparing trial parses.

use crate::file_manager::SourceLocation;

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: String,
    pub text: String,
    pub children: Vec<Node>,
    pub loc: SourceLocation,
}

impl Node {
    pub fn new(kind: impl Into<String>, loc: SourceLocation) -> Self {
        Node {
            kind: kind.into(),
            text: String::new(),
            children: Vec::new(),
            loc,
        }
    }

    pub fn leaf(kind: impl Into<String>, text: impl Into<String>, loc: SourceLocation) -> Self {
        Node {
            kind: kind.into(),
            text: text.into(),
            children: Vec::new(),
            loc,
        }
    }

    pub fn with_children(kind: impl Into<String>, loc: SourceLocation, children: Vec<Node>) -> Self {
        Node {
            kind: kind.into(),
            text: String::new(),
            children,
            loc,
        }
    }

    pub fn push(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn child(&self, i: usize) -> &Node {
        &self.children[i]
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Pretty-prints the tree for `--ast`, one node per line, indented by
    /// depth: `kind[text] @ line:col`.
    pub fn dump(&self, depth: usize, out: &mut String) {
        use std::fmt::Write;
        for _ in 0..depth {
            out.push_str("  ");
        }
        if self.text.is_empty() {
            let _ = writeln!(out, "{}", self.kind);
        } else {
            let _ = writeln!(out, "{}[{}]", self.kind, self.text);
        }
        for c in &self.children {
            c.dump(depth + 1, out);
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.text == other.text && self.children == other.children
    }
}
