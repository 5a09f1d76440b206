//! Error taxonomy and diagnostic printing.
//!
//! Every error is fatal to the current compilation: the first one unwinds
//! the pipeline to the driver, which prints a `file:line:col: error: ...`
//! diagnostic with the offending source line and a caret, then exits 1.
//! There is no multi-error recovery.

use crate::file_manager::{FileManager, SourceLocation};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Preprocessor,
    Parse,
    Type,
    Name,
    Flow,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Preprocessor => "preprocessor error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Type => "type error",
            ErrorKind::Name => "name error",
            ErrorKind::Flow => "flow error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(s)
    }
}

/// A single fatal compile error, optionally anchored to a source location.
/// Errors with no location (I/O failures opening the top-level input) are
/// printed without the file:line:col prefix.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<SourceLocation>,
}

impl CompileError {
    fn at(kind: ErrorKind, loc: SourceLocation, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            message: message.into(),
            loc: Some(loc),
        }
    }

    pub fn lex(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Lex, loc, message)
    }

    pub fn preprocessor(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Preprocessor, loc, message)
    }

    pub fn parse(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Parse, loc, format!("expected {}", message.into()))
    }

    pub fn ty(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Type, loc, message)
    }

    pub fn name(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Name, loc, message)
    }

    pub fn flow(loc: SourceLocation, message: impl Into<String>) -> Self {
        Self::at(ErrorKind::Flow, loc, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        CompileError {
            kind: ErrorKind::Io,
            message: message.into(),
            loc: None,
        }
    }

    /// Renders the `file:line:col: error: msg` header plus the source line
    /// and caret, matching the driver's stderr format.
    pub fn render(&self, files: &FileManager) -> String {
        let mut out = String::new();
        if let Some(loc) = self.loc {
            if loc.line > 0 {
                out.push_str(&format!(
                    "{}:{}:{}: ",
                    files.path(loc.file).display(),
                    loc.line,
                    loc.column
                ));
            }
        }
        out.push_str(&format!("error: {}\n", self.message));
        if let Some(loc) = self.loc {
            if loc.line > 0 {
                let line = files.line_text(loc.file, loc.line);
                out.push_str(line);
                out.push('\n');
                let col = loc.column.saturating_sub(1);
                for ch in line.chars().take(col) {
                    out.push(if ch == '\t' { '\t' } else { ' ' });
                }
                out.push_str("^\n");
            }
        }
        out
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<String> for CompileError {
    fn from(s: String) -> Self {
        CompileError {
            kind: ErrorKind::Io,
            message: s,
            loc: None,
        }
    }
}

/// An internal invariant violation (e.g. an unhandled AST node kind reaching
/// the generator). Distinct from a user-visible [`CompileError`]: this
/// indicates a bug in tucc itself, not a malformed input program.
#[derive(Debug)]
pub struct LogicError(pub String);

impl fmt::Display for LogicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal compiler error: {}", self.0)
    }
}

impl std::error::Error for LogicError {}
