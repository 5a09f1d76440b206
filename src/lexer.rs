//! Raw Lexer
//!
//! Turns the byte content of a single file into a flat list of
//! preprocessing tokens. This stage knows nothing about macros or
//! directives; it only recognizes the pp-token grammar (identifiers,
//! pp-numbers, punctuators, string/char literals, whitespace, newlines).
//! Line splicing (backslash-newline) is handled here since it is purely
//! lexical.

use crate::diagnostics::CompileError;
use crate::file_manager::{FileIndex, SourceLocation};
use crate::token::{PpToken, PpTokenKind};

/// Multi-character punctuators, longest first so the lexer's greedy match
/// never swallows a shorter valid punctuator's prefix incorrectly.
const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "...", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=",
    "-=", "*=", "/=", "%=", "&=", "^=", "|=", "##", "(", ")", "{", "}", "[", "]", ";", ":", ",",
    "=", "+", "-", "*", "/", "%", "<", ">", "!", "&", "|", "^", "~", "?", ".", "#",
];

pub struct Lexer<'a> {
    file: FileIndex,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl<'a> Lexer<'a> {
    pub fn new(file: FileIndex, bytes: &'a [u8]) -> Self {
        Lexer {
            file,
            bytes,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.file, self.line, self.col)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// Advances one raw byte, transparently splicing `\` immediately
    /// followed by a newline (with optional trailing `\r`) so every later
    /// stage sees logical lines.
    fn bump_raw(&mut self) -> Option<u8> {
        loop {
            let b = *self.bytes.get(self.pos)?;
            if b == b'\\' {
                let mut look = self.pos + 1;
                if self.bytes.get(look) == Some(&b'\r') {
                    look += 1;
                }
                if self.bytes.get(look) == Some(&b'\n') {
                    self.pos = look + 1;
                    self.line += 1;
                    self.col = 1;
                    continue;
                }
            }
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            return Some(b);
        }
    }

    /// Lexes the whole file into a flat token vector terminated by `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<PpToken>, CompileError> {
        let mut out = Vec::new();
        loop {
            let loc = self.loc();
            match self.peek() {
                None => {
                    out.push(PpToken::eof(loc));
                    break;
                }
                Some(b) if b == b'\n' => {
                    self.bump_raw();
                    out.push(PpToken::new(PpTokenKind::Newline, "\n", loc));
                }
                Some(b) if b == b' ' || b == b'\t' || b == b'\r' || b == 0x0c || b == 0x0b => {
                    let mut text = String::new();
                    while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(0x0c) | Some(0x0b))
                    {
                        text.push(self.bump_raw().unwrap() as char);
                    }
                    out.push(PpToken::new(PpTokenKind::Whitespace, text, loc));
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.bump_raw();
                    }
                    out.push(PpToken::new(PpTokenKind::Whitespace, " ", loc));
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.bump_raw();
                    self.bump_raw();
                    let mut closed = false;
                    while let Some(b) = self.peek() {
                        if b == b'*' && self.peek_at(1) == Some(b'/') {
                            self.bump_raw();
                            self.bump_raw();
                            closed = true;
                            break;
                        }
                        self.bump_raw();
                    }
                    if !closed {
                        return Err(CompileError::lex(loc, "unterminated comment"));
                    }
                    out.push(PpToken::new(PpTokenKind::Whitespace, " ", loc));
                }
                Some(b) if is_ident_start(b) => {
                    let mut text = String::new();
                    while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
                        text.push(self.bump_raw().unwrap() as char);
                    }
                    out.push(PpToken::new(PpTokenKind::Identifier, text, loc));
                }
                Some(b) if b.is_ascii_digit() => {
                    out.push(self.lex_pp_number(loc));
                }
                Some(b'.') if matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) => {
                    out.push(self.lex_pp_number(loc));
                }
                Some(b'"') => out.push(self.lex_string(loc)?),
                Some(b'\'') => out.push(self.lex_char(loc)?),
                Some(_) => {
                    out.push(self.lex_punctuator(loc)?);
                }
            }
        }
        Ok(out)
    }

    fn lex_pp_number(&mut self, loc: SourceLocation) -> PpToken {
        // pp-number: digit ( digit | ident-nondigit | . | (e|E|p|P) sign )*
        let mut text = String::new();
        text.push(self.bump_raw().unwrap() as char);
        loop {
            match self.peek() {
                Some(b) if (b == b'e' || b == b'E' || b == b'p' || b == b'P')
                    && matches!(self.peek_at(1), Some(b'+') | Some(b'-')) =>
                {
                    text.push(self.bump_raw().unwrap() as char);
                    text.push(self.bump_raw().unwrap() as char);
                }
                Some(b) if is_ident_continue(b) || b == b'.' => {
                    text.push(self.bump_raw().unwrap() as char);
                }
                _ => break,
            }
        }
        PpToken::new(PpTokenKind::PpNumber, text, loc)
    }

    fn lex_string(&mut self, loc: SourceLocation) -> Result<PpToken, CompileError> {
        let mut text = String::new();
        text.push(self.bump_raw().unwrap() as char); // opening quote
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(CompileError::lex(loc, "unterminated string literal"))
                }
                Some(b'"') => {
                    text.push(self.bump_raw().unwrap() as char);
                    break;
                }
                Some(b'\\') => {
                    text.push(self.bump_raw().unwrap() as char);
                    if let Some(b) = self.peek() {
                        text.push(self.bump_raw().unwrap() as char);
                        let _ = b;
                    }
                }
                Some(_) => text.push(self.bump_raw().unwrap() as char),
            }
        }
        Ok(PpToken::new(PpTokenKind::StringLiteral, text, loc))
    }

    fn lex_char(&mut self, loc: SourceLocation) -> Result<PpToken, CompileError> {
        let mut text = String::new();
        text.push(self.bump_raw().unwrap() as char); // opening quote
        if self.peek() == Some(b'\'') {
            return Err(CompileError::lex(loc, "empty character constant"));
        }
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Err(CompileError::lex(loc, "unterminated character constant"))
                }
                Some(b'\'') => {
                    text.push(self.bump_raw().unwrap() as char);
                    break;
                }
                Some(b'\\') => {
                    text.push(self.bump_raw().unwrap() as char);
                    if self.peek().is_some() {
                        text.push(self.bump_raw().unwrap() as char);
                    }
                }
                Some(_) => text.push(self.bump_raw().unwrap() as char),
            }
        }
        Ok(PpToken::new(PpTokenKind::CharConstant, text, loc))
    }

    fn lex_punctuator(&mut self, loc: SourceLocation) -> Result<PpToken, CompileError> {
        let rest = &self.bytes[self.pos..];
        for p in PUNCTUATORS {
            if rest.starts_with(p.as_bytes()) {
                let mut text = String::new();
                for _ in 0..p.len() {
                    text.push(self.bump_raw().unwrap() as char);
                }
                return Ok(PpToken::new(PpTokenKind::Punctuator, text, loc));
            }
        }
        let b = self.bump_raw().unwrap();
        Err(CompileError::lex(
            loc,
            format!("unrecognized character '{}'", b as char),
        ))
    }

    /// Re-lexes a `<...>` or `"..."` header-name immediately following a
    /// `#include`. Called by the preprocessor, which knows the syntactic
    /// context that makes `<`/`>` a bracket pair rather than relational
    /// operators.
    pub fn lex_header_name(bytes: &[u8], file: FileIndex, line: usize, col: usize) -> Option<PpToken> {
        let loc = SourceLocation::new(file, line, col);
        if bytes.is_empty() {
            return None;
        }
        let (open, close) = match bytes[0] {
            b'<' => (b'<', b'>'),
            b'"' => (b'"', b'"'),
            _ => return None,
        };
        let end = bytes[1..].iter().position(|&b| b == close)? + 1;
        if end == 1 {
            return None; // empty header name
        }
        let text = std::str::from_utf8(&bytes[..=end]).ok()?.to_string();
        let _ = open;
        Some(PpToken::new(PpTokenKind::HeaderName, text, loc))
    }
}
