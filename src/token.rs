//! Token types shared by the raw lexer, preprocessor, and token converter.
//!
//! Preprocessing tokens carry a hide-set (the set of macro names that must
//! not be re-expanded starting at that token) per the Dave Prosser
//! algorithm described in the C99 rationale. Hide-sets are shared via `Rc`
//! so that splicing and substitution, which touch many tokens per macro
//! invocation, stay cheap.

use crate::file_manager::SourceLocation;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Set of macro names disallowed from expansion at a token. Stored sorted
/// so that intersection/union are simple merges and so two hide-sets with
/// the same members compare equal regardless of insertion order.
pub type HideSet = Rc<BTreeSet<String>>;

pub fn empty_hide_set() -> HideSet {
    thread_local! {
        static EMPTY: HideSet = Rc::new(BTreeSet::new());
    }
    EMPTY.with(|e| e.clone())
}

pub fn hide_set_union(a: &HideSet, b: &HideSet) -> HideSet {
    if a.is_empty() {
        return b.clone();
    }
    if b.is_empty() {
        return a.clone();
    }
    Rc::new(a.union(b).cloned().collect())
}

pub fn hide_set_intersect(a: &HideSet, b: &HideSet) -> HideSet {
    if a.is_empty() || b.is_empty() {
        return empty_hide_set();
    }
    Rc::new(a.intersection(b).cloned().collect())
}

pub fn hide_set_with(hs: &HideSet, name: &str) -> HideSet {
    if hs.contains(name) {
        return hs.clone();
    }
    let mut next = (**hs).clone();
    next.insert(name.to_string());
    Rc::new(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpTokenKind {
    Identifier,
    PpNumber,
    Punctuator,
    CharConstant,
    StringLiteral,
    /// `<foo/bar.h>` or `"foo/bar.h"` recognized only in `#include` context.
    HeaderName,
    Whitespace,
    Newline,
    /// Sentinel left behind by an empty macro argument so that `##` has an
    /// operand to paste against; removed after substitution.
    Placemarker,
    Eof,
}

impl fmt::Display for PpTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PpTokenKind::Identifier => "identifier",
            PpTokenKind::PpNumber => "pp_number",
            PpTokenKind::Punctuator => "punctuator",
            PpTokenKind::CharConstant => "char_constant",
            PpTokenKind::StringLiteral => "string_literal",
            PpTokenKind::HeaderName => "header_name",
            PpTokenKind::Whitespace => "whitespace",
            PpTokenKind::Newline => "newline",
            PpTokenKind::Placemarker => "placemarker",
            PpTokenKind::Eof => "eof",
        };
        f.write_str(s)
    }
}

/// A preprocessing token: the unit the raw lexer produces and the
/// preprocessor rewrites in place.
#[derive(Debug, Clone)]
pub struct PpToken {
    pub kind: PpTokenKind,
    pub text: String,
    pub loc: SourceLocation,
    pub hide_set: HideSet,
    /// Set once by `#define`/argument substitution: true if at least one
    /// whitespace character preceded this token. Needed so stringize can
    /// insert single spaces between originally-separated tokens.
    pub leading_space: bool,
}

impl PpToken {
    pub fn new(kind: PpTokenKind, text: impl Into<String>, loc: SourceLocation) -> Self {
        PpToken {
            kind,
            text: text.into(),
            loc,
            hide_set: empty_hide_set(),
            leading_space: false,
        }
    }

    pub fn eof(loc: SourceLocation) -> Self {
        PpToken::new(PpTokenKind::Eof, "", loc)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == PpTokenKind::Eof
    }

    pub fn is_identifier(&self, text: &str) -> bool {
        self.kind == PpTokenKind::Identifier && self.text == text
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == PpTokenKind::Punctuator && self.text == text
    }

    pub fn is_whitespace_like(&self) -> bool {
        matches!(self.kind, PpTokenKind::Whitespace | PpTokenKind::Newline)
    }
}

/// Keyword set is closed: anything not in this list that looks like an
/// identifier is an ordinary identifier token.
pub const KEYWORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "const",
    "volatile", "struct", "union", "enum", "typedef", "extern", "static", "auto", "register",
    "sizeof", "if", "else", "switch", "case", "default", "while", "do", "for", "goto", "continue",
    "break", "return",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LangTokenKind {
    Keyword,
    Identifier,
    IntConstant,
    FloatConstant,
    CharConstant,
    StringLiteral,
    Punctuator,
    Eof,
}

/// A token of the language proper, produced by the token converter from the
/// post-preprocessing pp-token stream. Qualifier keywords (`const`,
/// `volatile`) survive conversion; only whitespace and newline tokens are
/// dropped.
#[derive(Debug, Clone)]
pub struct LangToken {
    pub kind: LangTokenKind,
    pub text: String,
    pub loc: SourceLocation,
}

impl LangToken {
    pub fn new(kind: LangTokenKind, text: impl Into<String>, loc: SourceLocation) -> Self {
        LangToken {
            kind,
            text: text.into(),
            loc,
        }
    }

    pub fn is(&self, text: &str) -> bool {
        self.text == text
            && matches!(self.kind, LangTokenKind::Keyword | LangTokenKind::Punctuator)
    }
}

impl fmt::Display for LangToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
