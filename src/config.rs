//! Compiler configuration
//!
//! `CompilerConfig` carries the fixed `#include` search path, the early-exit
//! emit mode selected by the CLI, and the output path. No environment
//! variables are consulted; everything here comes from parsed CLI
//! arguments or the defaults below.

use std::path::PathBuf;

/// Which stage's output the driver prints instead of running the full
/// pipeline to IR. Selected by mutually exclusive CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitMode {
    /// Run the whole pipeline and write IR text (the default).
    #[default]
    Ir,
    /// `--lex`: print pp-tokens before preprocessing.
    Lex,
    /// `--pp`: print tokens after preprocessing.
    Pp,
    /// `--pre-ast`: print language tokens after conversion.
    PreAst,
    /// `--ast`: print the parsed AST.
    Ast,
}

/// Default system search path, consulted after the including file's own
/// directory (for `#include "x"` only) when resolving `#include <x>` and
/// `#include "x"` alike.
pub fn default_include_paths() -> Vec<PathBuf> {
    let cwd_include = std::env::current_dir()
        .map(|d| d.join("include"))
        .unwrap_or_else(|_| PathBuf::from("include"));
    vec![
        PathBuf::from("/usr/local/include"),
        cwd_include,
        PathBuf::from("/usr/include/x86_64-linux-gnu"),
        PathBuf::from("/include"),
        PathBuf::from("/usr/include"),
    ]
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub include_paths: Vec<PathBuf>,
    pub emit_mode: EmitMode,
    pub output: Option<PathBuf>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            include_paths: default_include_paths(),
            emit_mode: EmitMode::default(),
            output: None,
        }
    }

    pub fn with_emit_mode(mut self, mode: EmitMode) -> Self {
        self.emit_mode = mode;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Adds a directory to the front of the search path, ahead of the
    /// fixed system directories — used by callers embedding `tucc` as a
    /// library who need project-local headers found first.
    pub fn with_extra_include_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.insert(0, path.into());
        self
    }

    /// The output path for a plain `program <file>` invocation: the
    /// input's extension replaced by `.ll`.
    pub fn default_output_for(input: &std::path::Path) -> PathBuf {
        input.with_extension("ll")
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_extension() {
        let out = CompilerConfig::default_output_for(std::path::Path::new("prog.c"));
        assert_eq!(out, PathBuf::from("prog.ll"));
    }

    #[test]
    fn extra_include_dir_is_searched_first() {
        let config = CompilerConfig::new().with_extra_include_dir("/project/include");
        assert_eq!(config.include_paths[0], PathBuf::from("/project/include"));
    }

    #[test]
    fn builder_sets_emit_mode_and_output() {
        let config = CompilerConfig::new()
            .with_emit_mode(EmitMode::Ast)
            .with_output("out.ll");
        assert_eq!(config.emit_mode, EmitMode::Ast);
        assert_eq!(config.output, Some(PathBuf::from("out.ll")));
    }
}
