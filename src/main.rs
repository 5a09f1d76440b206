//! tucc CLI
//!
//! Compiles one C source file and writes its IR (or, with one of the
//! `--lex`/`--pp`/`--pre-ast`/`--ast` flags, an earlier pipeline stage's
//! dump) to stdout or `-o`.

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::process::ExitCode;
use tucc::config::{CompilerConfig, EmitMode};
use tucc::file_manager::FileManager;

#[derive(ClapParser)]
#[command(name = "tucc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Single-translation-unit C compiler, emits textual IR", long_about = None)]
struct Cli {
    /// Input C source file
    file: PathBuf,

    /// Output path (defaults to the input's extension replaced with `.ll`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print pp-tokens before preprocessing and stop
    #[arg(long, conflicts_with_all = ["pp", "pre_ast", "ast"])]
    lex: bool,

    /// Print tokens after preprocessing and stop
    #[arg(long, conflicts_with_all = ["lex", "pre_ast", "ast"])]
    pp: bool,

    /// Print language tokens after pp-token conversion and stop
    #[arg(long = "pre-ast", conflicts_with_all = ["lex", "pp", "ast"])]
    pre_ast: bool,

    /// Print the parsed AST and stop
    #[arg(long, conflicts_with_all = ["lex", "pp", "pre_ast"])]
    ast: bool,

    /// Extra `#include` search directory, searched before the system paths
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Print a shell completion script for SHELL and exit
    #[arg(long, value_name = "SHELL")]
    generate_completions: Option<Shell>,
}

/// Mirrors [`Cli`]'s completions flag without the required `file`
/// positional, so `tucc --generate-completions bash` works without a
/// dummy input path. Parsed leniently first; a real parse failure falls
/// through to [`Cli::parse`], which reports it against the full flag set.
#[derive(ClapParser)]
#[command(ignore_errors = true, disable_help_flag = true, disable_version_flag = true)]
struct CompletionsProbe {
    #[arg(long, value_name = "SHELL")]
    generate_completions: Option<Shell>,
}

impl Cli {
    fn emit_mode(&self) -> EmitMode {
        if self.lex {
            EmitMode::Lex
        } else if self.pp {
            EmitMode::Pp
        } else if self.pre_ast {
            EmitMode::PreAst
        } else if self.ast {
            EmitMode::Ast
        } else {
            EmitMode::Ir
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    if let Some(shell) = CompletionsProbe::parse().generate_completions {
        generate(shell, &mut Cli::command(), "tucc", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }
    let cli = Cli::parse();

    let mut config = CompilerConfig::new().with_emit_mode(cli.emit_mode());
    for dir in cli.include_dirs.iter().rev() {
        config = config.with_extra_include_dir(dir.clone());
    }

    let mut fm = FileManager::new();
    let output = match tucc::compile_file_with_config(&mut fm, &cli.file, &config) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("{}", err.render(&fm));
            return ExitCode::FAILURE;
        }
    };

    let out_path = cli.output.clone().unwrap_or_else(|| CompilerConfig::default_output_for(&cli.file));
    if cli.emit_mode() == EmitMode::Ir && cli.output.is_none() {
        if let Err(e) = std::fs::write(&out_path, output) {
            eprintln!("error: failed to write '{}': {e}", out_path.display());
            return ExitCode::FAILURE;
        }
        tracing::info!(path = %out_path.display(), "wrote IR");
    } else if let Some(path) = cli.output {
        if let Err(e) = std::fs::write(&path, output) {
            eprintln!("error: failed to write '{}': {e}", path.display());
            return ExitCode::FAILURE;
        }
    } else {
        print!("{output}");
    }

    ExitCode::SUCCESS
}
