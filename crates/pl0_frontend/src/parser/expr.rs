use pl0_session::DiagnosticEmitter;

use super::{NameWarning, Parser, SyntaxError};
use crate::ast::*;
use crate::table::SymbolKind;
use crate::token::{Keyword, Token, TokenKind};

impl<E: DiagnosticEmitter> Parser<'_, E> {
    // condition = "odd" expression | expression relop expression
    pub(super) fn parse_condition(&mut self) -> Expr {
        if self.tokens.is_keyword(Keyword::Odd) {
            self.tokens.advance();
            let rhs = self.parse_expression(None);
            return Expr::Odd(Box::new(rhs));
        }

        let lhs = self.parse_expression(None);
        let op = self.expect_relop();
        let rhs = self.parse_expression(None);
        Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn expect_relop(&mut self) -> RelOp {
        if self.tokens.current().kind == TokenKind::Symbol {
            let op = match self.tokens.current().lexeme.as_str() {
                "=" => Some(RelOp::Eq),
                "<>" => Some(RelOp::Ne),
                "<" => Some(RelOp::Lt),
                "<=" => Some(RelOp::Le),
                ">" => Some(RelOp::Gt),
                ">=" => Some(RelOp::Ge),
                _ => None,
            };
            if let Some(op) = op {
                self.tokens.advance();
                return op;
            }
        }

        // no relational operator here; recover as if `=` was meant
        self.check_get_symbol("=");
        RelOp::Eq
    }

    // expression = [ "+" | "-" ] term { ("+" | "-") term }
    //
    // An already-built lhs is passed back in by the tail call, so the tree
    // leans left without backtracking.
    pub(super) fn parse_expression(&mut self, lhs: Option<Expr>) -> Expr {
        match lhs {
            Some(expr) => self.parse_expression_tail(Sign::None, expr),
            None => {
                let prefix = self.eat_sign();
                let first = self.parse_term(None);
                self.parse_expression_tail(prefix, first)
            }
        }
    }

    fn parse_expression_tail(&mut self, prefix: Sign, lhs: Expr) -> Expr {
        let Some(op) = self.current_addop() else {
            return apply_sign(prefix, lhs);
        };
        self.tokens.advance();

        // a term after an operator may carry its own leading sign
        let rhs_sign = self.eat_sign();
        let rhs = apply_sign(rhs_sign, self.parse_term(None));

        let node = Expr::Binary {
            op,
            prefix,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        self.parse_expression(Some(node))
    }

    // term = factor { ("*" | "/") factor }
    pub(super) fn parse_term(&mut self, lhs: Option<Expr>) -> Expr {
        let lhs = match lhs {
            Some(expr) => expr,
            None => self.parse_factor(),
        };

        let Some(op) = self.current_mulop() else {
            return lhs;
        };
        self.tokens.advance();

        let rhs = self.parse_factor();
        let node = Expr::Binary {
            op,
            prefix: Sign::None,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        self.parse_term(Some(node))
    }

    // factor = ident | ident "(" [ expression { "," expression } ] ")"
    //        | number | "(" expression ")"
    fn parse_factor(&mut self) -> Expr {
        let token = self.tokens.current().clone();

        let factor = match token.kind {
            TokenKind::Ident => {
                self.tokens.advance();
                if self.table.find(&token.lexeme, SymbolKind::Func, false, -1) {
                    self.parse_call(&token)
                } else {
                    self.reference_variable(&token);
                    Expr::Variable {
                        name: token.lexeme.clone(),
                    }
                }
            }

            TokenKind::Number(value) => {
                self.tokens.advance();
                Expr::Number(value)
            }

            TokenKind::Symbol if token.is_symbol("(") => {
                self.tokens.advance();
                let inner = self.parse_expression(None);
                self.check_get_symbol(")");
                inner
            }

            _ => {
                self.error_here(SyntaxError::Unexpected(token.lexeme.clone()));
                // statement framing stays put so the caller can resync
                let keep = token.is_symbol(";")
                    || token.is_symbol(".")
                    || matches!(token.kind, TokenKind::Keyword(_) | TokenKind::Eof);
                if !keep {
                    self.tokens.advance();
                }
                Expr::ParseError
            }
        };

        self.check_factor_tail(factor)
    }

    /// A second operand directly after a completed factor means the
    /// operator between them was dropped.
    fn check_factor_tail(&mut self, factor: Expr) -> Expr {
        loop {
            let current = self.tokens.current();
            match current.kind {
                TokenKind::Ident | TokenKind::Number(_) => {
                    let lexeme = current.lexeme.clone();
                    self.error_here(SyntaxError::MissingOpcode(lexeme));
                    self.tokens.advance();
                }
                TokenKind::Symbol if current.is_symbol("(") => {
                    self.error_here(SyntaxError::MissingOpcodeBeforeParen);
                    self.tokens.advance();
                }
                _ => return factor,
            }
        }
    }

    /// A name used as a plain operand must be visible as a var, param or
    /// const somewhere; otherwise it goes into the tentative set, to be
    /// cleared by a later declaration or rejected at the end.
    fn reference_variable(&mut self, token: &Token) {
        let name = &token.lexeme;
        let visible = self.table.find(name, SymbolKind::Var, false, -1)
            || self.table.find(name, SymbolKind::Param, false, -1)
            || self.table.find(name, SymbolKind::Const, false, -1);
        if !visible && !self.table.find_tentative(name) {
            self.table.add_tentative(name.clone());
            self.warn_at(token, NameWarning::AddTentative(name.clone()));
        }
    }

    // After the argument list the callee must resolve with this arity.
    fn parse_call(&mut self, callee: &Token) -> Expr {
        self.check_get_symbol("(");

        let mut args = vec![];
        if !self.tokens.is_symbol(")") && !self.tokens.current().is_eof() {
            loop {
                args.push(self.parse_expression(None));
                if self.tokens.is_symbol(",") {
                    self.tokens.advance();
                    continue;
                }
                break;
            }
        }
        self.check_get_symbol(")");

        if !self
            .table
            .find(&callee.lexeme, SymbolKind::Func, false, args.len() as i32)
        {
            self.error_at(
                callee,
                SyntaxError::UndefinedFunc {
                    name: callee.lexeme.clone(),
                    arity: args.len(),
                },
            );
            return Expr::ParseError;
        }

        Expr::Call {
            callee: callee.lexeme.clone(),
            args,
        }
    }

    fn eat_sign(&mut self) -> Sign {
        if self.tokens.is_symbol("+") {
            self.tokens.advance();
            Sign::Plus
        } else if self.tokens.is_symbol("-") {
            self.tokens.advance();
            Sign::Minus
        } else {
            Sign::None
        }
    }

    fn current_addop(&self) -> Option<BinOp> {
        if self.tokens.is_symbol("+") {
            Some(BinOp::Add)
        } else if self.tokens.is_symbol("-") {
            Some(BinOp::Sub)
        } else {
            None
        }
    }

    fn current_mulop(&self) -> Option<BinOp> {
        if self.tokens.is_symbol("*") {
            Some(BinOp::Mul)
        } else if self.tokens.is_symbol("/") {
            Some(BinOp::Div)
        } else {
            None
        }
    }
}

/// A sign on a lone term normalizes to a binary node that evaluates the
/// same: the prefix negates the term, adding zero changes nothing.
fn apply_sign(sign: Sign, expr: Expr) -> Expr {
    match sign {
        Sign::Minus => Expr::Binary {
            op: BinOp::Add,
            prefix: Sign::Minus,
            lhs: Box::new(expr),
            rhs: Box::new(Expr::Number(0)),
        },
        Sign::None | Sign::Plus => expr,
    }
}
