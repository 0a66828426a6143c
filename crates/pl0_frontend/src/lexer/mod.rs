
use pl0_session::{DiagnosticEmitter, Diagnostics};

use crate::token::{Keyword, Token, TokenKind, TokenPos};

#[derive(serde::Serialize, thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("unexpected '{0}': deleted")]
    UnexpectedChar(char),

    #[error("expected '=' but '{0}'")]
    ExpectedEquals(char),

    /// A `:` at the end of a line.
    #[error("missing '=': inserted")]
    MissingEquals,

    #[error("integer overflow")]
    IntegerOverflow,
}

/// Turns the source into a token vector, line by line.
///
/// Scanning never aborts: a bad character is reported and skipped, a bad
/// `:=` is repaired, and the stream always ends with an `Eof` token.
pub struct Scanner<'d, E: DiagnosticEmitter> {
    diagnostics: &'d mut Diagnostics<E>,
    tokens: Vec<Token>,
    line: u32,
}

impl<'d, E: DiagnosticEmitter> Scanner<'d, E> {
    pub fn new(diagnostics: &'d mut Diagnostics<E>) -> Self {
        Self {
            diagnostics,
            tokens: vec![],
            line: 0,
        }
    }

    pub fn scan(mut self, source: &str) -> TokenStream {
        let mut in_comment = false;

        for line in source.lines() {
            self.line += 1;
            in_comment = self.scan_line(line, in_comment);
        }

        self.line += 1;
        self.push(TokenKind::Eof, String::new(), 0);
        TokenStream::new(self.tokens)
    }

    /// Scan one source line. Returns whether a `{ ... }` comment is still
    /// open at the end of it.
    fn scan_line(&mut self, line: &str, mut in_comment: bool) -> bool {
        let bytes = line.as_bytes();
        // 0-based index of the next unread character; when a token is
        // finished this is also the 1-based column of its last character.
        let mut col = 0usize;

        while col < bytes.len() {
            let ch = bytes[col] as char;
            col += 1;

            if in_comment {
                if ch == '}' {
                    in_comment = false;
                }
                continue;
            }

            if ch.is_ascii_whitespace() {
                continue;
            }

            if ch == '{' {
                in_comment = true;
                continue;
            }

            if ch.is_ascii_alphabetic() {
                let start = col - 1;
                while col < bytes.len() && bytes[col].is_ascii_alphanumeric() {
                    col += 1;
                }
                let lexeme = &line[start..col];
                let kind = match Keyword::from_ident(lexeme) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Ident,
                };
                self.push(kind, lexeme.to_owned(), col);
                continue;
            }

            if ch.is_ascii_digit() {
                // a leading zero is the whole literal
                if ch == '0' {
                    self.push(TokenKind::Number(0), "0".to_owned(), col);
                    continue;
                }
                let start = col - 1;
                while col < bytes.len() && bytes[col].is_ascii_digit() {
                    col += 1;
                }
                let lexeme = &line[start..col];
                let value = match lexeme.parse() {
                    Ok(value) => value,
                    Err(_) => {
                        self.error_at_col(col, ScanError::IntegerOverflow);
                        i64::MAX
                    }
                };
                self.push(TokenKind::Number(value), lexeme.to_owned(), col);
                continue;
            }

            match ch {
                ':' => {
                    if col < bytes.len() && bytes[col] == b'=' {
                        col += 1;
                        self.push_symbol(":=", col);
                    } else {
                        // repair: pretend the `=` was there
                        if col < bytes.len() {
                            self.error_at_col(col + 1, ScanError::ExpectedEquals(bytes[col] as char));
                        } else {
                            self.error_at_col(col, ScanError::MissingEquals);
                        }
                        self.push_symbol(":=", col);
                    }
                }
                '<' => {
                    if col < bytes.len() && (bytes[col] == b'>' || bytes[col] == b'=') {
                        col += 1;
                        self.push_symbol(&line[col - 2..col], col);
                    } else {
                        self.push_symbol("<", col);
                    }
                }
                '>' => {
                    if col < bytes.len() && bytes[col] == b'=' {
                        col += 1;
                        self.push_symbol(">=", col);
                    } else {
                        self.push_symbol(">", col);
                    }
                }
                '+' | '-' | '*' | '/' | '=' | ';' | ',' | '.' | '(' | ')' => {
                    self.push_symbol(&line[col - 1..col], col);
                }
                _ => {
                    self.error_at_col(col, ScanError::UnexpectedChar(ch));
                }
            }
        }

        in_comment
    }

    fn push(&mut self, kind: TokenKind, lexeme: String, endcol: usize) {
        let prev = self.tokens.last().map(|token| token.pos);
        self.tokens.push(Token {
            kind,
            lexeme,
            pos: TokenPos {
                line: self.line,
                endcol: endcol as u32,
            },
            prev,
        });
    }

    fn push_symbol(&mut self, lexeme: &str, endcol: usize) {
        self.push(TokenKind::Symbol, lexeme.to_owned(), endcol);
    }

    fn error_at_col(&mut self, col: usize, error: ScanError) {
        self.diagnostics.error_at(self.line, col as u32, error);
    }
}

/// The scanned token vector with a movable cursor.
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(tokens.last(), Some(token) if token.is_eof()));
        Self { tokens, cursor: 0 }
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.cursor]
    }

    /// Step to the next token; the cursor never moves past `Eof`.
    pub fn advance(&mut self) {
        if self.cursor + 1 < self.tokens.len() {
            self.cursor += 1;
        }
    }

    pub fn is_symbol(&self, lit: &str) -> bool {
        self.current().is_symbol(lit)
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.current().is_keyword(keyword)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}
