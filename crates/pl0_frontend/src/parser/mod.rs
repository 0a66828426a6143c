#[cfg(test)]
mod tests;

mod expr;

use std::fmt;

use pl0_session::{DiagnosticEmitter, Diagnostics};

use crate::ast::*;
use crate::lexer::TokenStream;
use crate::table::{SymbolKind, SymbolTable};
use crate::token::{Keyword, Token, TokenKind};

#[derive(serde::Serialize, thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unexpected '{0}': deleted")]
    Unexpected(String),

    #[error("missing '{0}': inserted")]
    Missing(String),

    #[error("No statement")]
    NoStatement,

    #[error("program done without '.'")]
    MissingTerminator,

    #[error("assigned not number")]
    AssignedNotNumber,

    #[error("assign lhs is not var/par")]
    BadAssignTarget,

    #[error("duplicate {category} {name}: ignored")]
    Duplicate { category: &'static str, name: String },

    #[error("undefined func {name}({arity})")]
    UndefinedFunc { name: String, arity: usize },

    #[error("delete {0} and skip to a new statement")]
    Skipped(String),

    #[error("fact + id/num {0}: missing opcode")]
    MissingOpcode(String),

    #[error("factor + '(': missing opcode")]
    MissingOpcodeBeforeParen,

    #[error("remain undefined symbols: {0}")]
    RemainUndefined(String),
}

#[derive(serde::Serialize, thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NameWarning {
    #[error("add {0} to name table temporarily")]
    AddTentative(String),

    #[error("delete {0} from name table")]
    DeleteTentative(String),
}

/// What `check_get` requires next.
#[derive(Clone, Copy)]
enum Expected {
    Symbol(&'static str),
    Keyword(Keyword),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Symbol(lit) => f.write_str(lit),
            Expected::Keyword(keyword) => f.write_str(keyword.as_str()),
        }
    }
}

/// Recursive-descent parser with one token of lookahead.
///
/// Name resolution runs during the parse against [`SymbolTable`]; errors
/// are reported through the shared diagnostics handle and recovered from
/// locally, so a single run surfaces many independent problems.
pub struct Parser<'d, E: DiagnosticEmitter> {
    tokens: TokenStream,
    table: SymbolTable,
    diagnostics: &'d mut Diagnostics<E>,
    debug: bool,
}

impl<'d, E: DiagnosticEmitter> Parser<'d, E> {
    pub fn new(tokens: TokenStream, diagnostics: &'d mut Diagnostics<E>, debug: bool) -> Self {
        Self {
            tokens,
            table: SymbolTable::new(),
            diagnostics,
            debug,
        }
    }

    pub fn parse(mut self) -> Program {
        let program = self.parse_program();
        debug_assert!(self.table.is_empty());
        program
    }

    // program = block "."
    fn parse_program(&mut self) -> Program {
        self.table.enter_block();
        let body = self.parse_block();

        // names that stayed tentative were never declared anywhere
        if self.table.has_tentative() {
            let names = self.table.take_tentatives();
            self.diagnostics
                .error(SyntaxError::RemainUndefined(names.join(" ")));
        }

        self.dump_table();
        self.table.leave_block();

        if self.tokens.is_symbol(".") {
            self.tokens.advance();
        } else {
            self.error_here(SyntaxError::MissingTerminator);
        }

        Program { body }
    }

    // block = { const_decl | var_decl | func_decl } statement
    fn parse_block(&mut self) -> Block {
        let mut block = Block {
            constants: None,
            variables: None,
            functions: vec![],
            body: Stmt::Null,
        };

        loop {
            if self.tokens.is_keyword(Keyword::Const) {
                let decl = self.parse_const_decl();
                match &mut block.constants {
                    Some(existing) => existing.defs.extend(decl.defs),
                    None => block.constants = Some(decl),
                }
            } else if self.tokens.is_keyword(Keyword::Var) {
                let decl = self.parse_var_decl();
                match &mut block.variables {
                    Some(existing) => existing.names.extend(decl.names),
                    None => block.variables = Some(decl),
                }
            } else if self.tokens.is_keyword(Keyword::Function) {
                if let Some(func) = self.parse_func_decl() {
                    block.functions.push(func);
                }
            } else {
                break;
            }
        }

        block.body = self.parse_statement();
        block
    }

    // const_decl = "const" ident "=" number { "," ident "=" number } ";"
    fn parse_const_decl(&mut self) -> ConstDecl {
        let mut decl = ConstDecl::default();
        self.tokens.advance();

        loop {
            let Some(token) = self.expect_ident() else {
                break;
            };
            self.check_get_symbol("=");

            match self.tokens.current().number_value() {
                Some(value) => {
                    self.tokens.advance();
                    self.declare_const(&token, value, &mut decl);
                }
                None => {
                    self.error_here(SyntaxError::AssignedNotNumber);
                    let current = self.tokens.current();
                    if !(current.is_symbol(";") || current.is_symbol(",") || current.is_eof()) {
                        self.tokens.advance();
                    }
                }
            }

            if self.tokens.is_symbol(",") {
                self.tokens.advance();
                continue;
            }
            break;
        }

        self.check_get_symbol(";");
        decl
    }

    fn declare_const(&mut self, token: &Token, value: i64, decl: &mut ConstDecl) {
        let name = &token.lexeme;

        if self.table.find_tentative(name) {
            self.table.delete_tentative(name);
            self.warn_at(token, NameWarning::DeleteTentative(name.clone()));
        }

        if self.table.find(name, SymbolKind::Const, true, -1) {
            self.error_at(
                token,
                SyntaxError::Duplicate {
                    category: "constant",
                    name: name.clone(),
                },
            );
            return;
        }

        self.table.add(name.clone(), SymbolKind::Const);
        decl.defs.push((name.clone(), value));
    }

    // var_decl = "var" ident { "," ident } ";"
    fn parse_var_decl(&mut self) -> VarDecl {
        let mut decl = VarDecl::default();
        self.tokens.advance();

        loop {
            let Some(token) = self.expect_ident() else {
                break;
            };
            self.declare_var(&token, &mut decl);

            if self.tokens.is_symbol(",") {
                self.tokens.advance();
                continue;
            }
            break;
        }

        self.check_get_symbol(";");
        decl
    }

    fn declare_var(&mut self, token: &Token, decl: &mut VarDecl) {
        let name = &token.lexeme;

        if self.table.find_tentative(name) {
            self.table.delete_tentative(name);
            self.warn_at(token, NameWarning::DeleteTentative(name.clone()));
        }

        if self.table.find(name, SymbolKind::Var, true, -1) {
            self.error_at(
                token,
                SyntaxError::Duplicate {
                    category: "var",
                    name: name.clone(),
                },
            );
            return;
        }

        self.table.add(name.clone(), SymbolKind::Var);
        decl.names.push(name.clone());
    }

    // func_decl = "function" ident "(" [ ident { "," ident } ] ")" block ";"
    //
    // The name becomes visible once the header is parsed, so a function
    // may call itself but not a sibling declared after it.
    fn parse_func_decl(&mut self) -> Option<FuncDecl> {
        self.tokens.advance();
        let name_token = self.expect_ident();

        self.check_get_symbol("(");
        let mut params: Vec<String> = vec![];
        if self.tokens.current().kind == TokenKind::Ident {
            loop {
                if let Some(token) = self.expect_ident() {
                    if params.contains(&token.lexeme) {
                        self.error_at(
                            &token,
                            SyntaxError::Duplicate {
                                category: "param",
                                name: token.lexeme.clone(),
                            },
                        );
                    } else {
                        params.push(token.lexeme.clone());
                    }
                }
                if self.tokens.is_symbol(",") {
                    self.tokens.advance();
                    continue;
                }
                break;
            }
        }
        self.check_get_symbol(")");

        let dropped = match &name_token {
            Some(token) => {
                let duplicate =
                    self.table
                        .find(&token.lexeme, SymbolKind::Func, true, params.len() as i32);
                if duplicate {
                    self.error_at(
                        token,
                        SyntaxError::Duplicate {
                            category: "func",
                            name: token.lexeme.clone(),
                        },
                    );
                } else {
                    self.table.add_func(token.lexeme.clone(), params.len());
                }
                duplicate
            }
            None => true,
        };

        self.table.enter_block();
        for param in &params {
            self.table.add(param.clone(), SymbolKind::Param);
        }
        let body = self.parse_block();
        self.dump_table();
        self.table.leave_block();

        self.check_get_symbol(";");

        match (name_token, dropped) {
            (Some(token), false) => Some(FuncDecl {
                name: token.lexeme,
                params,
                body,
            }),
            _ => None,
        }
    }

    // statement = assign | begin_end | if_then | while_do | return | write
    //           | "writeln" | ";" | empty before "." or "end"
    fn parse_statement(&mut self) -> Stmt {
        match self.tokens.current().kind {
            TokenKind::Ident => self.parse_assign(),
            TokenKind::Keyword(Keyword::Begin) => self.parse_begin_end(),
            TokenKind::Keyword(Keyword::If) => self.parse_if_then(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_do(),
            TokenKind::Keyword(Keyword::Return) => {
                self.tokens.advance();
                Stmt::Return(self.parse_expression(None))
            }
            TokenKind::Keyword(Keyword::Write) => {
                self.tokens.advance();
                Stmt::Write(self.parse_expression(None))
            }
            TokenKind::Keyword(Keyword::Writeln) => {
                self.tokens.advance();
                Stmt::Writeln
            }
            // a bare `;` is a complete null statement of its own
            TokenKind::Symbol if self.tokens.is_symbol(";") => {
                self.tokens.advance();
                Stmt::Null
            }
            // the empty statement: the terminators stay for the caller
            TokenKind::Keyword(Keyword::End) => Stmt::Null,
            TokenKind::Symbol if self.tokens.is_symbol(".") => Stmt::Null,
            _ => {
                self.error_here(SyntaxError::NoStatement);
                Stmt::Null
            }
        }
    }

    // assign = ident ":=" expression
    fn parse_assign(&mut self) -> Stmt {
        let token = self.tokens.current().clone();
        let name = token.lexeme.clone();

        if self.table.find(&name, SymbolKind::Func, false, -1) {
            self.error_at(&token, SyntaxError::BadAssignTarget);
        } else if !self.table.find(&name, SymbolKind::Var, false, -1)
            && !self.table.find(&name, SymbolKind::Param, false, -1)
            && !self.table.find_tentative(&name)
        {
            self.table.add_tentative(name.clone());
            self.warn_at(&token, NameWarning::AddTentative(name.clone()));
        }

        self.tokens.advance();
        self.check_get_symbol(":=");
        let rhs = self.parse_expression(None);
        Stmt::Assign { name, rhs }
    }

    // begin_end = "begin" statement { ";" statement } "end"
    fn parse_begin_end(&mut self) -> Stmt {
        self.tokens.advance();
        let mut stmts = vec![];

        loop {
            stmts.push(self.parse_statement());

            // resynchronize between statements
            loop {
                if self.tokens.is_symbol(";") {
                    self.tokens.advance();
                    break;
                }
                if self.tokens.is_keyword(Keyword::End) {
                    self.tokens.advance();
                    return Stmt::BeginEnd { stmts };
                }
                if self.at_statement_starter() {
                    self.error_prev(SyntaxError::Missing(";".to_owned()));
                    break;
                }
                if self.tokens.current().is_eof() {
                    self.error_prev(SyntaxError::Missing("end".to_owned()));
                    return Stmt::BeginEnd { stmts };
                }
                let lexeme = self.tokens.current().lexeme.clone();
                self.error_here(SyntaxError::Skipped(lexeme));
                self.tokens.advance();
            }
        }
    }

    fn at_statement_starter(&self) -> bool {
        matches!(
            self.tokens.current().kind,
            TokenKind::Keyword(
                Keyword::Begin
                    | Keyword::If
                    | Keyword::While
                    | Keyword::Return
                    | Keyword::Write
                    | Keyword::Writeln
            )
        )
    }

    // if_then = "if" condition "then" statement
    fn parse_if_then(&mut self) -> Stmt {
        self.tokens.advance();
        let cond = self.parse_condition();
        self.check_get_keyword(Keyword::Then);
        let body = self.parse_statement();
        Stmt::IfThen {
            cond,
            body: Box::new(body),
        }
    }

    // while_do = "while" condition "do" statement
    fn parse_while_do(&mut self) -> Stmt {
        self.tokens.advance();
        let cond = self.parse_condition();
        self.check_get_keyword(Keyword::Do);
        let body = self.parse_statement();
        Stmt::WhileDo {
            cond,
            body: Box::new(body),
        }
    }

    /// Require an identifier. Anything else is deleted and `None` returned;
    /// the caller abandons the construct and resynchronizes.
    fn expect_ident(&mut self) -> Option<Token> {
        let current = self.tokens.current();
        if current.kind == TokenKind::Ident {
            let token = current.clone();
            self.tokens.advance();
            return Some(token);
        }

        let lexeme = current.lexeme.clone();
        self.error_here(SyntaxError::Unexpected(lexeme));
        if !self.tokens.current().is_eof() {
            self.tokens.advance();
        }
        None
    }

    fn check_get_symbol(&mut self, lit: &'static str) {
        self.check_get(Expected::Symbol(lit));
    }

    fn check_get_keyword(&mut self, keyword: Keyword) {
        self.check_get(Expected::Keyword(keyword));
    }

    /// Require the next token to be `expected`.
    ///
    /// A wrong token of the same category is deleted and the expected one
    /// treated as present. A token of a different category stays put and
    /// the expected one is inserted, attributed to the end of the previous
    /// token.
    fn check_get(&mut self, expected: Expected) {
        let current = self.tokens.current();

        let found = match expected {
            Expected::Symbol(lit) => current.is_symbol(lit),
            Expected::Keyword(keyword) => current.is_keyword(keyword),
        };
        if found {
            self.tokens.advance();
            return;
        }

        let same_category = match expected {
            Expected::Symbol(_) => current.kind == TokenKind::Symbol,
            Expected::Keyword(_) => matches!(current.kind, TokenKind::Keyword(_)),
        };
        if same_category {
            let lexeme = current.lexeme.clone();
            self.error_here(SyntaxError::Unexpected(lexeme));
            self.error_here(SyntaxError::Missing(expected.to_string()));
            self.tokens.advance();
        } else {
            self.error_prev(SyntaxError::Missing(expected.to_string()));
        }
    }

    fn dump_table(&mut self) {
        if self.debug {
            let mut out = std::io::stderr().lock();
            let _ = self.table.dump(&mut out);
        }
    }

    /// Report at the start of the current token.
    fn error_here(&mut self, error: SyntaxError) {
        let (line, col) = self.tokens.current().diagnostic_pos(false);
        self.diagnostics.error_at(line, col, error);
    }

    /// Report just past the end of the token before the current one.
    fn error_prev(&mut self, error: SyntaxError) {
        let (line, col) = self.tokens.current().diagnostic_pos(true);
        self.diagnostics.error_at(line, col, error);
    }

    fn error_at(&mut self, token: &Token, error: SyntaxError) {
        let (line, col) = token.diagnostic_pos(false);
        self.diagnostics.error_at(line, col, error);
    }

    fn warn_at(&mut self, token: &Token, warning: NameWarning) {
        let (line, col) = token.diagnostic_pos(false);
        self.diagnostics.warn_at(line, col, warning);
    }
}
