use std::io::{self, Write};
use std::process;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Hard cap on reported errors. Reaching it aborts the run immediately.
pub const MAX_ERRORS: usize = 30;

/// A run only counts as successful while the error count stays strictly
/// below this.
pub const MIN_ERRORS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "warn",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based `(line, column)` when the diagnostic points into the source.
    pub pos: Option<(u32, u32)>,
}

pub trait DiagnosticEmitter {
    fn emit(&mut self, diagnostic: &Diagnostic);
}

impl DiagnosticEmitter for Vec<Diagnostic> {
    fn emit(&mut self, diagnostic: &Diagnostic) {
        self.push(diagnostic.clone());
    }
}

/// Renders `[line:col] error: message` lines to stderr.
pub struct StderrEmitter {
    stream: StandardStream,
}

impl StderrEmitter {
    pub fn new() -> Self {
        Self {
            stream: StandardStream::stderr(ColorChoice::Auto),
        }
    }

    fn severity_color(severity: Severity) -> ColorSpec {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(match severity {
            Severity::Warning => Color::Yellow,
            Severity::Error => Color::Red,
        }));
        spec.set_bold(true);
        spec
    }

    fn write_diagnostic(&mut self, diagnostic: &Diagnostic) -> io::Result<()> {
        if let Some((line, col)) = diagnostic.pos {
            write!(self.stream, "[{line:3}:{col:3}] ")?;
        }
        self.stream.set_color(&Self::severity_color(diagnostic.severity))?;
        write!(self.stream, "{}", diagnostic.severity.label())?;
        self.stream.reset()?;
        writeln!(self.stream, ": {}", diagnostic.message)
    }
}

impl Default for StderrEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEmitter for StderrEmitter {
    fn emit(&mut self, diagnostic: &Diagnostic) {
        self.write_diagnostic(diagnostic)
            .expect("failed to emit diagnostic");
    }
}

/// The diagnostics handle threaded through the scanner and the parser.
///
/// Both stages report through the same handle and read the same counter,
/// so the error cap is enforced in one place.
pub struct Diagnostics<E: DiagnosticEmitter> {
    emitter: E,
    errors: usize,
}

impl<E: DiagnosticEmitter> Diagnostics<E> {
    pub fn new(emitter: E) -> Self {
        Self { emitter, errors: 0 }
    }

    /// Report an error that has no useful source position.
    pub fn error(&mut self, message: impl ToString) {
        self.report(Severity::Error, message.to_string(), None);
    }

    pub fn error_at(&mut self, line: u32, col: u32, message: impl ToString) {
        self.report(Severity::Error, message.to_string(), Some((line, col)));
    }

    /// Warnings are reported but never counted.
    pub fn warn_at(&mut self, line: u32, col: u32, message: impl ToString) {
        self.report(Severity::Warning, message.to_string(), Some((line, col)));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// The success gate checked once parsing is over.
    pub fn ok(&self) -> bool {
        self.errors < MIN_ERRORS
    }

    pub fn into_emitter(self) -> E {
        self.emitter
    }

    fn report(&mut self, severity: Severity, message: String, pos: Option<(u32, u32)>) {
        self.emitter.emit(&Diagnostic {
            severity,
            message,
            pos,
        });

        if severity == Severity::Error {
            self.errors += 1;
            if self.errors >= MAX_ERRORS {
                self.emitter.emit(&Diagnostic {
                    severity: Severity::Error,
                    message: "too many errors".to_owned(),
                    pos: None,
                });
                process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(f: impl FnOnce(&mut Diagnostics<Vec<Diagnostic>>)) -> Vec<Diagnostic> {
        let mut diagnostics = Diagnostics::new(Vec::new());
        f(&mut diagnostics);
        diagnostics.into_emitter()
    }

    #[test]
    fn errors_are_counted_warnings_are_not() {
        let mut diagnostics = Diagnostics::new(Vec::new());
        diagnostics.error_at(1, 1, "bad");
        diagnostics.warn_at(1, 2, "odd but fine");
        diagnostics.error("worse");
        assert_eq!(diagnostics.error_count(), 2);
        assert!(diagnostics.ok());
    }

    #[test]
    fn positions_are_recorded() {
        let emitted = collect(|diagnostics| {
            diagnostics.error_at(3, 7, "bad");
            diagnostics.error("no position");
        });
        assert_eq!(emitted[0].pos, Some((3, 7)));
        assert_eq!(emitted[1].pos, None);
    }

    #[test]
    fn severity_labels() {
        let emitted = collect(|diagnostics| {
            diagnostics.warn_at(1, 1, "w");
            diagnostics.error_at(1, 2, "e");
        });
        assert_eq!(emitted[0].severity.label(), "warn");
        assert_eq!(emitted[1].severity.label(), "error");
    }
}
