//! Lowers the parsed program to a relocatable native object.
//!
//! The backend trusts the front end's resolved world: every name in the
//! tree was visible to the parser. Anything that still fails to resolve
//! here (a name that only ever lived in the tentative set, a subtree
//! dropped during recovery) is a hard error, not a diagnostic.

use cranelift_object::object::write::Object;
use pl0_frontend::ast::Program;
use target_lexicon::{Architecture, Triple};

use codegen::Codegen;

mod codegen;
mod table;

// Re-exporting `object` here instead of using workspace dependencies
// so that we stay in sync with the version that cranelift uses.
pub use cranelift_object::object;

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("unsupported architecture: {0}")]
    UnsupportedArch(Architecture),

    #[error(transparent)]
    Module(#[from] cranelift_module::ModuleError),

    #[error(transparent)]
    Codegen(#[from] cranelift::codegen::CodegenError),

    #[error("{0} is undefined")]
    Undefined(String),

    #[error("cannot assign to {0}")]
    NotAssignable(String),

    #[error("{0} is not a value")]
    NotAValue(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("wrong number of arguments for {0}")]
    WrongArity(String),

    #[error("{0} is local to an enclosing function")]
    OuterLocal(String),

    #[error("malformed expression")]
    MalformedExpr,
}

pub type BackendResult<T> = Result<T, BackendError>;

pub struct CodegenOutput {
    pub object: Object<'static>,
    /// Textual IR of every compiled function, in definition order.
    pub clif: Vec<String>,
}

pub fn run_codegen(program: &Program, target: Triple, name: &str) -> BackendResult<CodegenOutput> {
    let mut codegen = Codegen::new(target, name)?;
    codegen.compile_program(program)?;
    codegen.finish()
}
