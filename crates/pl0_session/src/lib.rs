pub mod diagnostics;

pub use diagnostics::{
    Diagnostic, DiagnosticEmitter, Diagnostics, Severity, StderrEmitter, MAX_ERRORS, MIN_ERRORS,
};
