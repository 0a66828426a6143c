#[macro_use]
extern crate macro_rules_attribute;

pub mod ast;
pub mod token;

mod lexer;
mod parser;
mod table;

pub use lexer::{ScanError, Scanner, TokenStream};
pub use parser::{NameWarning, Parser, SyntaxError};
pub use table::{Symbol, SymbolKind, SymbolTable};

use ast::Program;
use pl0_session::{DiagnosticEmitter, Diagnostics};

derive_alias! {
    #[derive(Node!)] = #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)];
    #[derive(NodeCopy!)] = #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)];
}

pub fn scan<E: DiagnosticEmitter>(source: &str, diagnostics: &mut Diagnostics<E>) -> TokenStream {
    Scanner::new(diagnostics).scan(source)
}

pub fn parse<E: DiagnosticEmitter>(
    tokens: TokenStream,
    diagnostics: &mut Diagnostics<E>,
    debug: bool,
) -> Program {
    Parser::new(tokens, diagnostics, debug).parse()
}
