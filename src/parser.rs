//! Recursive-descent parser
//!
//! Builds the uniform [`crate::ast::Node`] tree from the converted language
//! token stream. Ambiguity between a declaration and an expression
//! statement at block-statement position is resolved the classic way: the
//! parser tracks which identifiers `typedef` has introduced so far and
//! consults that set when deciding whether a leading identifier starts a
//! declarator or an expression.

use crate::ast::Node;
use crate::diagnostics::CompileError;
use crate::file_manager::SourceLocation;
use crate::token::{LangToken, LangTokenKind};
use std::collections::HashSet;

pub struct Parser<'a> {
    toks: &'a [LangToken],
    pos: usize,
    typedef_names: HashSet<String>,
}

type PResult = Result<Node, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(toks: &'a [LangToken]) -> Self {
        Parser {
            toks,
            pos: 0,
            typedef_names: HashSet::new(),
        }
    }

    pub fn parse_translation_unit(&mut self) -> PResult {
        let loc = self.loc();
        let mut children = Vec::new();
        while !self.at_eof() {
            children.push(self.external_declaration()?);
        }
        Ok(Node::with_children("translation_unit", loc, children))
    }

    // ---- token cursor ----

    fn peek(&self) -> &LangToken {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn loc(&self) -> SourceLocation {
        self.peek().loc
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == LangTokenKind::Eof
    }

    fn bump(&mut self) -> LangToken {
        let t = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        t
    }

    fn at(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    fn at_kind(&self, kind: LangTokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, text: &str) -> Result<LangToken, CompileError> {
        if self.at(text) {
            Ok(self.bump())
        } else {
            Err(CompileError::parse(self.loc(), format!("'{}'", text)))
        }
    }

    /// Backtracking alternator: tries each alternative from the current
    /// position, restoring the cursor between attempts, and raises the
    /// error whose location advanced furthest if every alternative fails.
    fn or(&mut self, alts: &[fn(&mut Parser<'a>) -> PResult]) -> PResult {
        let start = self.pos;
        let mut best: Option<(usize, CompileError)> = None;
        for f in alts {
            self.pos = start;
            match f(self) {
                Ok(n) => return Ok(n),
                Err(e) => {
                    let reached = self.pos;
                    if best.as_ref().map(|(p, _)| reached > *p).unwrap_or(true) {
                        best = Some((reached, e));
                    }
                }
            }
        }
        self.pos = start;
        Err(best.map(|(_, e)| e).unwrap_or_else(|| CompileError::parse(self.loc(), "declaration or statement")))
    }

    /// Produces a one-child node if `f` succeeds, or an empty-children
    /// placeholder node (restoring the cursor) if it fails.
    fn opt(&mut self, kind: &str, f: impl FnOnce(&mut Self) -> PResult) -> Node {
        let start = self.pos;
        let loc = self.loc();
        match f(self) {
            Ok(n) => Node::with_children(kind, loc, vec![n]),
            Err(_) => {
                self.pos = start;
                Node::new(kind, loc)
            }
        }
    }

    // ---- external declarations ----

    fn external_declaration(&mut self) -> PResult {
        let loc = self.loc();
        let specs = self.declaration_specifiers()?;
        if self.at(";") {
            self.bump();
            return Ok(Node::with_children("declaration", loc, vec![specs]));
        }
        let is_typedef = specs.children.iter().any(|c| c.is("keyword") && c.text == "typedef");
        let declarator = self.declarator()?;
        if self.at("{") {
            if is_typedef {
                return Err(CompileError::parse(loc, "function body after typedef"));
            }
            let body = self.compound_statement()?;
            return Ok(Node::with_children("function_definition", loc, vec![specs, declarator, body]));
        }
        let mut init_declarators = vec![self.init_declarator_tail(declarator, is_typedef)?];
        while self.at(",") {
            self.bump();
            let d = self.declarator()?;
            init_declarators.push(self.init_declarator_tail(d, is_typedef)?);
        }
        self.eat(";")?;
        let mut children = vec![specs];
        children.extend(init_declarators);
        Ok(Node::with_children("declaration", loc, children))
    }

    fn init_declarator_tail(&mut self, declarator: Node, is_typedef: bool) -> PResult {
        if is_typedef {
            if let Some(name) = declarator_name(&declarator) {
                self.typedef_names.insert(name.to_string());
            }
        }
        let loc = declarator.loc;
        if self.at("=") {
            self.bump();
            let init = self.initializer()?;
            return Ok(Node::with_children("init_declarator", loc, vec![declarator, init]));
        }
        Ok(Node::with_children("init_declarator", loc, vec![declarator]))
    }

    fn initializer(&mut self) -> PResult {
        if self.at("{") {
            let loc = self.loc();
            self.bump();
            let mut children = Vec::new();
            if !self.at("}") {
                children.push(self.initializer()?);
                while self.at(",") {
                    self.bump();
                    if self.at("}") {
                        break;
                    }
                    children.push(self.initializer()?);
                }
            }
            self.eat("}")?;
            Ok(Node::with_children("initializer_list", loc, children))
        } else {
            self.assignment_expression()
        }
    }

    // ---- declaration specifiers ----

    const SPEC_KEYWORDS: &'static [&'static str] = &[
        "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
        "const", "volatile", "typedef", "extern", "static", "auto", "register",
    ];

    fn declaration_specifiers(&mut self) -> PResult {
        let loc = self.loc();
        let mut children = Vec::new();
        loop {
            if self.at_kind(LangTokenKind::Keyword) && Self::SPEC_KEYWORDS.contains(&self.peek().text.as_str()) {
                let t = self.bump();
                children.push(Node::leaf("keyword", t.text, t.loc));
            } else if self.at("struct") || self.at("union") {
                children.push(self.struct_or_union_specifier()?);
            } else if self.at("enum") {
                children.push(self.enum_specifier()?);
            } else if self.at_kind(LangTokenKind::Identifier)
                && self.typedef_names.contains(&self.peek().text)
                && children.is_empty()
            {
                let t = self.bump();
                children.push(Node::leaf("typedef_name", t.text, t.loc));
            } else {
                break;
            }
        }
        if children.is_empty() {
            return Err(CompileError::parse(loc, "declaration specifiers"));
        }
        Ok(Node::with_children("specifiers", loc, children))
    }

    fn struct_or_union_specifier(&mut self) -> PResult {
        let loc = self.loc();
        let kw = self.bump().text;
        let kind = if kw == "union" { "union_specifier" } else { "struct_specifier" };
        let tag = if self.at_kind(LangTokenKind::Identifier) {
            self.bump().text
        } else {
            String::new()
        };
        let mut node = Node::leaf(kind, tag, loc);
        if self.at("{") {
            self.bump();
            while !self.at("}") {
                node.children.push(self.struct_field_declaration()?);
            }
            self.eat("}")?;
        }
        Ok(node)
    }

    fn struct_field_declaration(&mut self) -> PResult {
        let loc = self.loc();
        let specs = self.declaration_specifiers()?;
        let mut declarators = vec![self.declarator()?];
        while self.at(",") {
            self.bump();
            declarators.push(self.declarator()?);
        }
        self.eat(";")?;
        let mut children = vec![specs];
        children.extend(declarators);
        Ok(Node::with_children("field_declaration", loc, children))
    }

    fn enum_specifier(&mut self) -> PResult {
        let loc = self.loc();
        self.bump();
        let tag = if self.at_kind(LangTokenKind::Identifier) {
            self.bump().text
        } else {
            String::new()
        };
        let mut node = Node::leaf("enum_specifier", tag, loc);
        if self.at("{") {
            self.bump();
            loop {
                let eloc = self.loc();
                let name = self.expect_identifier()?;
                let mut e = Node::leaf("enumerator", name, eloc);
                if self.at("=") {
                    self.bump();
                    e.children.push(self.assignment_expression()?);
                }
                node.children.push(e);
                if self.at(",") {
                    self.bump();
                    if self.at("}") {
                        break;
                    }
                } else {
                    break;
                }
            }
            self.eat("}")?;
        }
        Ok(node)
    }

    fn expect_identifier(&mut self) -> Result<String, CompileError> {
        if self.at_kind(LangTokenKind::Identifier) {
            Ok(self.bump().text)
        } else {
            Err(CompileError::parse(self.loc(), "identifier"))
        }
    }

    // ---- declarators ----
    // Hand-written because of the arbitrary nesting of `*`, `()`, `[n]`, and
    // grouping parens. `abstract_ok` allows omitting the identifier, used
    // for cast target types and `sizeof(T)`.

    fn declarator(&mut self) -> PResult {
        self.declarator_inner(false)
    }

    fn abstract_declarator(&mut self) -> PResult {
        self.declarator_inner(true)
    }

    fn declarator_inner(&mut self, abstract_ok: bool) -> PResult {
        let loc = self.loc();
        let mut pointer_depth = 0;
        while self.at("*") {
            self.bump();
            pointer_depth += 1;
            while self.at("const") || self.at("volatile") {
                self.bump();
            }
        }
        let mut inner = self.direct_declarator(abstract_ok)?;
        for _ in 0..pointer_depth {
            inner = Node::with_children("pointer_declarator", loc, vec![inner]);
        }
        Ok(inner)
    }

    fn direct_declarator(&mut self, abstract_ok: bool) -> PResult {
        let loc = self.loc();
        let mut node = if self.at("(") {
            self.bump();
            let inner = self.declarator_inner(abstract_ok)?;
            self.eat(")")?;
            Node::with_children("paren_declarator", loc, vec![inner])
        } else if self.at_kind(LangTokenKind::Identifier) {
            let name = self.bump().text;
            Node::leaf("ident_declarator", name, loc)
        } else if abstract_ok {
            Node::leaf("ident_declarator", "", loc)
        } else {
            return Err(CompileError::parse(loc, "declarator"));
        };

        loop {
            if self.at("[") {
                self.bump();
                let size_loc = self.loc();
                let mut children = vec![node];
                if !self.at("]") {
                    children.push(self.assignment_expression()?);
                }
                self.eat("]")?;
                node = Node::with_children("array_declarator", size_loc, children);
            } else if self.at("(") {
                self.bump();
                let mut children = vec![node];
                if self.at("void") && self.peek_next_is(")") {
                    self.bump();
                } else if !self.at(")") {
                    children.push(self.parameter_declaration()?);
                    while self.at(",") {
                        self.bump();
                        if self.at("...") {
                            self.bump();
                            children.push(Node::leaf("ellipsis", "...", self.loc()));
                            break;
                        }
                        children.push(self.parameter_declaration()?);
                    }
                }
                self.eat(")")?;
                node = Node::with_children("function_declarator", loc, children);
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn peek_next_is(&self, text: &str) -> bool {
        self.toks.get(self.pos + 1).map(|t| t.is(text)).unwrap_or(false)
    }

    fn parameter_declaration(&mut self) -> PResult {
        let loc = self.loc();
        let specs = self.declaration_specifiers()?;
        let declarator = self.or(&[
            |p| p.declarator(),
            |p| p.abstract_declarator(),
        ])?;
        Ok(Node::with_children("param", loc, vec![specs, declarator]))
    }

    // ---- statements ----

    fn compound_statement(&mut self) -> PResult {
        let loc = self.loc();
        self.eat("{")?;
        let mut children = Vec::new();
        while !self.at("}") {
            children.push(self.block_item()?);
        }
        self.eat("}")?;
        Ok(Node::with_children("compound_statement", loc, children))
    }

    fn block_item(&mut self) -> PResult {
        if self.starts_declaration() {
            self.external_declaration_in_block()
        } else {
            self.statement()
        }
    }

    fn external_declaration_in_block(&mut self) -> PResult {
        let loc = self.loc();
        let specs = self.declaration_specifiers()?;
        let is_typedef = specs.children.iter().any(|c| c.is("keyword") && c.text == "typedef");
        let mut children = vec![specs];
        if !self.at(";") {
            let d = self.declarator()?;
            children.push(self.init_declarator_tail(d, is_typedef)?);
            while self.at(",") {
                self.bump();
                let d = self.declarator()?;
                children.push(self.init_declarator_tail(d, is_typedef)?);
            }
        }
        self.eat(";")?;
        Ok(Node::with_children("declaration", loc, children))
    }

    fn starts_declaration(&self) -> bool {
        if self.at_kind(LangTokenKind::Keyword) {
            let t = &self.peek().text;
            return Self::SPEC_KEYWORDS.contains(&t.as_str()) || t == "struct" || t == "union" || t == "enum";
        }
        self.at_kind(LangTokenKind::Identifier) && self.typedef_names.contains(&self.peek().text)
    }

    fn statement(&mut self) -> PResult {
        let loc = self.loc();
        if self.at("{") {
            return self.compound_statement();
        }
        if self.at("if") {
            self.bump();
            self.eat("(")?;
            let cond = self.expression()?;
            self.eat(")")?;
            let then_s = self.statement()?;
            let mut children = vec![cond, then_s];
            if self.at("else") {
                self.bump();
                children.push(self.statement()?);
            }
            return Ok(Node::with_children("if", loc, children));
        }
        if self.at("while") {
            self.bump();
            self.eat("(")?;
            let cond = self.expression()?;
            self.eat(")")?;
            let body = self.statement()?;
            return Ok(Node::with_children("while", loc, vec![cond, body]));
        }
        if self.at("do") {
            self.bump();
            let body = self.statement()?;
            self.eat("while")?;
            self.eat("(")?;
            let cond = self.expression()?;
            self.eat(")")?;
            self.eat(";")?;
            return Ok(Node::with_children("do_while", loc, vec![body, cond]));
        }
        if self.at("for") {
            self.bump();
            self.eat("(")?;
            let init = if self.starts_declaration() {
                self.external_declaration_in_block()?
            } else if self.at(";") {
                Node::new("empty_statement", self.loc())
            } else {
                let e = self.expression()?;
                self.eat(";")?;
                Node::with_children("exp_statement", e.loc, vec![e])
            };
            let cond = self.opt("for_cond", |p| p.expression());
            self.eat(";")?;
            let step = self.opt("for_step", |p| p.expression());
            self.eat(")")?;
            let body = self.statement()?;
            return Ok(Node::with_children("for", loc, vec![init, cond, step, body]));
        }
        if self.at("switch") {
            self.bump();
            self.eat("(")?;
            let cond = self.expression()?;
            self.eat(")")?;
            let body = self.statement()?;
            return Ok(Node::with_children("switch", loc, vec![cond, body]));
        }
        if self.at("case") {
            self.bump();
            let value = self.conditional_expression()?;
            self.eat(":")?;
            let body = self.statement()?;
            return Ok(Node::with_children("case", loc, vec![value, body]));
        }
        if self.at("default") {
            self.bump();
            self.eat(":")?;
            let body = self.statement()?;
            return Ok(Node::with_children("default", loc, vec![body]));
        }
        if self.at("return") {
            self.bump();
            let mut children = Vec::new();
            if !self.at(";") {
                children.push(self.expression()?);
            }
            self.eat(";")?;
            return Ok(Node::with_children("return", loc, children));
        }
        if self.at("break") {
            self.bump();
            self.eat(";")?;
            return Ok(Node::new("break", loc));
        }
        if self.at("continue") {
            self.bump();
            self.eat(";")?;
            return Ok(Node::new("continue", loc));
        }
        if self.at("goto") {
            self.bump();
            let name = self.expect_identifier()?;
            self.eat(";")?;
            return Ok(Node::leaf("goto", name, loc));
        }
        if self.at(";") {
            self.bump();
            return Ok(Node::new("empty_statement", loc));
        }
        if self.at_kind(LangTokenKind::Identifier) && self.peek_next_is(":") {
            let name = self.bump().text;
            self.bump(); // ':'
            let body = self.statement()?;
            return Ok(Node::with_children("label", loc, vec![Node::leaf("label_name", name, loc), body]));
        }
        let e = self.expression()?;
        self.eat(";")?;
        Ok(Node::with_children("exp_statement", loc, vec![e]))
    }

    // ---- expressions: precedence ladder, low to high ----

    fn expression(&mut self) -> PResult {
        let loc = self.loc();
        let mut first = self.assignment_expression()?;
        if self.at(",") {
            let mut children = vec![first];
            while self.at(",") {
                self.bump();
                children.push(self.assignment_expression()?);
            }
            first = Node::with_children(",", loc, children);
        }
        Ok(first)
    }

    const ASSIGN_OPS: &'static [&'static str] =
        &["=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>="];

    fn assignment_expression(&mut self) -> PResult {
        let loc = self.loc();
        let lhs = self.conditional_expression()?;
        if let Some(op) = Self::ASSIGN_OPS.iter().find(|op| self.at(op)) {
            let op = (*op).to_string();
            self.bump();
            let rhs = self.assignment_expression()?;
            return Ok(Node::with_children(op, loc, vec![lhs, rhs]));
        }
        Ok(lhs)
    }

    fn conditional_expression(&mut self) -> PResult {
        let loc = self.loc();
        let cond = self.logical_or_expression()?;
        if self.at("?") {
            self.bump();
            let then_e = self.expression()?;
            self.eat(":")?;
            let else_e = self.conditional_expression()?;
            return Ok(Node::with_children("?:", loc, vec![cond, then_e, else_e]));
        }
        Ok(cond)
    }

    fn binary_level(&mut self, ops: &[&str], next: fn(&mut Self) -> PResult) -> PResult {
        let mut lhs = next(self)?;
        loop {
            let matched = ops.iter().find(|op| self.at(op)).copied();
            let Some(op) = matched else { break };
            let loc = self.loc();
            self.bump();
            let rhs = next(self)?;
            lhs = Node::with_children(op, loc, vec![lhs, rhs]);
        }
        Ok(lhs)
    }

    fn logical_or_expression(&mut self) -> PResult {
        self.binary_level(&["||"], Self::logical_and_expression)
    }
    fn logical_and_expression(&mut self) -> PResult {
        self.binary_level(&["&&"], Self::bit_or_expression)
    }
    fn bit_or_expression(&mut self) -> PResult {
        self.binary_level(&["|"], Self::bit_xor_expression)
    }
    fn bit_xor_expression(&mut self) -> PResult {
        self.binary_level(&["^"], Self::bit_and_expression)
    }
    fn bit_and_expression(&mut self) -> PResult {
        self.binary_level(&["&"], Self::equality_expression)
    }
    fn equality_expression(&mut self) -> PResult {
        self.binary_level(&["==", "!="], Self::relational_expression)
    }
    fn relational_expression(&mut self) -> PResult {
        self.binary_level(&["<=", ">=", "<", ">"], Self::shift_expression)
    }
    fn shift_expression(&mut self) -> PResult {
        self.binary_level(&["<<", ">>"], Self::additive_expression)
    }
    fn additive_expression(&mut self) -> PResult {
        self.binary_level(&["+", "-"], Self::multiplicative_expression)
    }
    fn multiplicative_expression(&mut self) -> PResult {
        self.binary_level(&["*", "/", "%"], Self::cast_expression)
    }

    fn cast_expression(&mut self) -> PResult {
        if self.at("(") && self.looks_like_type_at(self.pos + 1) {
            let start = self.pos;
            let loc = self.loc();
            self.bump();
            if let Ok(specs) = self.declaration_specifiers() {
                let declarator = self.opt("abstract_declarator", |p| p.abstract_declarator());
                if self.at(")") {
                    self.bump();
                    let operand = self.cast_expression()?;
                    return Ok(Node::with_children("cast", loc, vec![specs, declarator, operand]));
                }
            }
            self.pos = start;
        }
        self.unary_expression()
    }

    fn looks_like_type_at(&self, idx: usize) -> bool {
        match self.toks.get(idx) {
            Some(t) if t.kind == LangTokenKind::Keyword => {
                Self::SPEC_KEYWORDS.contains(&t.text.as_str()) || t.text == "struct" || t.text == "union" || t.text == "enum"
            }
            Some(t) if t.kind == LangTokenKind::Identifier => self.typedef_names.contains(&t.text),
            _ => false,
        }
    }

    const UNARY_OPS: &'static [&'static str] = &["&", "*", "+", "-", "~", "!"];

    fn unary_expression(&mut self) -> PResult {
        let loc = self.loc();
        if self.at("++") || self.at("--") {
            let op = self.bump().text;
            let operand = self.unary_expression()?;
            return Ok(Node::with_children(format!("pre{}", op), loc, vec![operand]));
        }
        if let Some(op) = Self::UNARY_OPS.iter().find(|op| self.at(op)).copied() {
            self.bump();
            let operand = self.cast_expression()?;
            return Ok(Node::with_children(format!("unary{}", op), loc, vec![operand]));
        }
        if self.at("sizeof") {
            self.bump();
            if self.at("(") && self.looks_like_type_at(self.pos + 1) {
                self.bump();
                let specs = self.declaration_specifiers()?;
                let declarator = self.opt("abstract_declarator", |p| p.abstract_declarator());
                self.eat(")")?;
                return Ok(Node::with_children("sizeof_type", loc, vec![specs, declarator]));
            }
            let operand = self.unary_expression()?;
            return Ok(Node::with_children("sizeof_expr", loc, vec![operand]));
        }
        self.postfix_expression()
    }

    fn postfix_expression(&mut self) -> PResult {
        let loc = self.loc();
        let mut node = self.primary_expression()?;
        loop {
            if self.at("[") {
                self.bump();
                let index = self.expression()?;
                self.eat("]")?;
                node = Node::with_children("[]", loc, vec![node, index]);
            } else if self.at("(") {
                self.bump();
                let mut children = vec![node];
                if !self.at(")") {
                    children.push(self.assignment_expression()?);
                    while self.at(",") {
                        self.bump();
                        children.push(self.assignment_expression()?);
                    }
                }
                self.eat(")")?;
                node = Node::with_children("call", loc, children);
            } else if self.at(".") || self.at("->") {
                let op = self.bump().text;
                let field = self.expect_identifier()?;
                node = Node::with_children(op, loc, vec![node, Node::leaf("field_name", field, loc)]);
            } else if self.at("++") || self.at("--") {
                let op = self.bump().text;
                node = Node::with_children(format!("post{}", op), loc, vec![node]);
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn primary_expression(&mut self) -> PResult {
        let loc = self.loc();
        if self.at("(") {
            self.bump();
            let e = self.expression()?;
            self.eat(")")?;
            return Ok(e);
        }
        match self.peek().kind {
            LangTokenKind::Identifier => {
                let t = self.bump();
                Ok(Node::leaf("identifier", t.text, loc))
            }
            LangTokenKind::IntConstant => {
                let t = self.bump();
                Ok(Node::leaf("int_const", t.text, loc))
            }
            LangTokenKind::FloatConstant => {
                let t = self.bump();
                Ok(Node::leaf("float_const", t.text, loc))
            }
            LangTokenKind::CharConstant => {
                let t = self.bump();
                Ok(Node::leaf("char_const", t.text, loc))
            }
            LangTokenKind::StringLiteral => {
                let t = self.bump();
                Ok(Node::leaf("string_const", t.text, loc))
            }
            _ => Err(CompileError::parse(loc, "expression")),
        }
    }
}

/// Walks a declarator chain to find the name it declares (empty for an
/// abstract declarator).
pub fn declarator_name(node: &Node) -> Option<&str> {
    match node.kind.as_str() {
        "ident_declarator" => {
            if node.text.is_empty() {
                None
            } else {
                Some(node.text.as_str())
            }
        }
        "pointer_declarator" | "array_declarator" | "function_declarator" | "paren_declarator" => {
            declarator_name(node.child(0))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_tokens;
    use crate::file_manager::FileManager;
    use crate::lexer::Lexer;
    use std::path::PathBuf;

    fn parse(src: &str) -> Node {
        let mut fm = FileManager::new();
        let idx = fm.load_bytes(PathBuf::from("<test>"), src.as_bytes().to_vec());
        let bytes = fm.bytes(idx).to_vec();
        let pp = Lexer::new(idx, &bytes).tokenize().unwrap();
        let toks = convert_tokens(&pp).unwrap();
        let mut p = Parser::new(&toks);
        p.parse_translation_unit().unwrap()
    }

    #[test]
    fn parses_function_with_return() {
        let ast = parse("int main() { return 0; }");
        assert_eq!(ast.children.len(), 1);
        assert_eq!(ast.child(0).kind, "function_definition");
    }

    #[test]
    fn parses_struct_declaration_and_member_access() {
        let ast = parse("struct P { int x; int y; }; int f(struct P p) { return p.x; }");
        assert_eq!(ast.children.len(), 2);
    }

    #[test]
    fn parses_pointer_declarator_and_call() {
        let ast = parse("int main() { int *p; printf(\"%d\", *p); return 0; }");
        let func = ast.child(0);
        assert_eq!(func.kind, "function_definition");
    }

    #[test]
    fn parses_if_while_switch() {
        let ast = parse(
            "int f(int x) { if (x) { while (x) { x = x - 1; } } switch (x) { case 1: return 1; default: return 0; } return 0; }",
        );
        assert_eq!(ast.children.len(), 1);
    }
}
