mod cli;

use std::process::ExitCode;

use clap::Parser as _;
use pl0_backend::BackendError;
use pl0_frontend::TokenStream;
use pl0_session::{Diagnostics, StderrEmitter};
use target_lexicon::Triple;

use crate::cli::Cli;

#[derive(thiserror::Error, Debug)]
enum CompilerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("error writing object: {0}")]
    Object(#[from] pl0_backend::object::write::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, CompilerError> {
    let source = std::fs::read_to_string(&cli.input)?;

    let mut diagnostics = Diagnostics::new(StderrEmitter::new());

    let tokens = pl0_frontend::scan(&source, &mut diagnostics);

    if cli.list_tokens {
        list_tokens(&tokens);
        return Ok(ExitCode::FAILURE);
    }

    let program = pl0_frontend::parse(tokens, &mut diagnostics, cli.debug);

    if cli.debug {
        eprintln!("{program:#?}");
    }

    if diagnostics.error_count() > 0 {
        eprintln!("{} errors", diagnostics.error_count());
    }
    if !diagnostics.ok() {
        return Ok(ExitCode::FAILURE);
    }

    if cli.check_only {
        return Ok(ExitCode::SUCCESS);
    }

    let name = cli
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("program");
    let output = pl0_backend::run_codegen(&program, Triple::host(), name)?;

    if cli.emit_ir {
        for clif in &output.clif {
            println!("{clif}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let object_path = cli.input.with_extension("o");
    let object_data = output.object.write()?;
    std::fs::write(&object_path, object_data)?;

    Ok(ExitCode::SUCCESS)
}

fn list_tokens(tokens: &TokenStream) {
    for token in tokens.tokens() {
        eprintln!(
            "[{:3}:{:3}] TOKEN: {:<10} ({})",
            token.pos.line,
            token.start_col(),
            token.lexeme,
            token.kind.kind_name()
        );
    }
}
