use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The input file.
    pub input: PathBuf,

    /// Enable debug tracing.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Print the token stream and exit.
    #[arg(short = 'l')]
    pub list_tokens: bool,

    /// Parse and check only; write nothing.
    #[arg(short = 'c')]
    pub check_only: bool,

    /// Print the compiled functions as textual IR instead of writing an
    /// object file.
    #[arg(short = 'a')]
    pub emit_ir: bool,
}
