//! tucc — a single-translation-unit C compiler front end
//!
//! Reads one C source file through the macro preprocessor, converts the
//! resulting pp-token stream to the language's token set, parses it into an
//! AST, and walks that AST once to emit SSA-style textual IR. There is no
//! separate optimization or backend stage: [`compile_string`] and
//! [`compile_file`] hand back IR text, and it's the caller's job to feed
//! that to whatever backend consumes it.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod file_manager;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod symtab;
pub mod token;
pub mod types;
pub mod value;

pub use codegen::Generator;
pub use config::{CompilerConfig, EmitMode};
pub use diagnostics::{CompileError, ErrorKind};
pub use file_manager::FileManager;

use std::path::Path;

/// Runs the full pipeline over the text already loaded into `fm` at
/// `main_idx`, stopping early to return intermediate-stage text when
/// `config.emit_mode` asks for one.
fn compile_loaded(fm: &mut FileManager, main_idx: file_manager::FileIndex, config: &CompilerConfig) -> Result<String, CompileError> {
    let bytes = fm.bytes(main_idx).to_vec();
    let raw_tokens = lexer::Lexer::new(main_idx, &bytes).tokenize()?;
    if config.emit_mode == EmitMode::Lex {
        return Ok(dump_pp_tokens(&raw_tokens));
    }

    let mut macros = preprocessor::MacroTable::new();
    let pp_tokens = preprocessor::preprocess(fm, raw_tokens, &mut macros, &config.include_paths)?;
    if config.emit_mode == EmitMode::Pp {
        return Ok(dump_pp_tokens(&pp_tokens));
    }

    let lang_tokens = convert::convert_tokens(&pp_tokens)?;
    if config.emit_mode == EmitMode::PreAst {
        return Ok(dump_lang_tokens(&lang_tokens));
    }

    let ast = parser::Parser::new(&lang_tokens).parse_translation_unit()?;
    if config.emit_mode == EmitMode::Ast {
        let mut out = String::new();
        ast.dump(0, &mut out);
        return Ok(out);
    }

    codegen::Generator::new().generate(&ast)
}

/// Compiles `source_path` to IR text (or an earlier stage's dump, per
/// `config.emit_mode`) using `config`'s include search path.
///
/// Takes the caller's `FileManager` rather than owning one internally, so
/// that a `CompileError` returned from here (including one located inside
/// an `#include`d header) can later be rendered against the same instance
/// via [`CompileError::render`].
pub fn compile_file_with_config(fm: &mut FileManager, source_path: &Path, config: &CompilerConfig) -> Result<String, CompileError> {
    let idx = fm.load(source_path).map_err(CompileError::io)?;
    compile_loaded(fm, idx, config)
}

/// Compiles `source_path` to IR text using the default configuration and a
/// throwaway `FileManager`. Convenient for callers that don't need to
/// render errors with source context.
pub fn compile_file(source_path: &Path) -> Result<String, CompileError> {
    let mut fm = FileManager::new();
    compile_file_with_config(&mut fm, source_path, &CompilerConfig::new())
}

/// Compiles in-memory source text, as though it were a file named
/// `virtual_name`. Used by tests and by embedders that have source text but
/// no file on disk.
pub fn compile_string(virtual_name: &str, source: &str) -> Result<String, CompileError> {
    let mut fm = FileManager::new();
    let idx = fm.load_bytes(Path::new(virtual_name).to_path_buf(), source.as_bytes().to_vec());
    compile_loaded(&mut fm, idx, &CompilerConfig::new())
}

fn dump_pp_tokens(tokens: &[token::PpToken]) -> String {
    let mut out = String::new();
    for t in tokens {
        out.push_str(&format!("{:?} {:?}\n", t.kind, t.text));
    }
    out
}

fn dump_lang_tokens(tokens: &[token::LangToken]) -> String {
    let mut out = String::new();
    for t in tokens {
        out.push_str(&format!("{:?} {:?}\n", t.kind, t.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_trivial_program_to_ir() {
        let ir = compile_string("t.c", "int main() { return 0; }").unwrap();
        assert!(ir.contains("define i32 @main"));
    }

    #[test]
    fn surfaces_parse_errors_with_location() {
        let err = compile_string("t.c", "int main( { return 0; }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
