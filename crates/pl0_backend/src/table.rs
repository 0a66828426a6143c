use cranelift::prelude::Variable;
use cranelift_module::FuncId;

/// What a name is bound to at code-generation time.
pub enum Binding {
    Const(i64),
    Var(Variable),
    Param(Variable),
    Func { id: FuncId, arity: usize },
}

pub struct CodeEntry {
    pub name: String,
    pub level: i32,
    /// Ordinal of the compiled function whose frame holds this binding;
    /// only meaningful for `Var` and `Param`.
    pub owner: u32,
    pub binding: Binding,
}

/// The code-generation twin of the front end's symbol table: one flat
/// stack, searched back to front, popped a level at a time.
pub struct CodeTable {
    entries: Vec<CodeEntry>,
    level: i32,
}

impl CodeTable {
    pub fn new() -> Self {
        Self {
            entries: vec![],
            level: -1,
        }
    }

    pub fn enter_block(&mut self) {
        self.level += 1;
    }

    pub fn leave_block(&mut self) {
        while matches!(self.entries.last(), Some(entry) if entry.level == self.level) {
            self.entries.pop();
        }
        self.level -= 1;
    }

    pub fn push_const(&mut self, name: &str, value: i64) {
        self.push(name, 0, Binding::Const(value));
    }

    pub fn push_var(&mut self, name: &str, var: Variable, owner: u32) {
        self.push(name, owner, Binding::Var(var));
    }

    pub fn push_param(&mut self, name: &str, var: Variable, owner: u32) {
        self.push(name, owner, Binding::Param(var));
    }

    pub fn push_func(&mut self, name: &str, id: FuncId, arity: usize) {
        self.push(name, 0, Binding::Func { id, arity });
    }

    fn push(&mut self, name: &str, owner: u32, binding: Binding) {
        self.entries.push(CodeEntry {
            name: name.to_owned(),
            level: self.level,
            owner,
            binding,
        });
    }

    /// The nearest binding for `name`, regardless of kind.
    pub fn lookup(&self, name: &str) -> Option<&CodeEntry> {
        self.entries.iter().rev().find(|entry| entry.name == name)
    }

    /// The nearest function binding matching both name and arity.
    pub fn lookup_func(&self, name: &str, arity: usize) -> Option<FuncId> {
        self.entries.iter().rev().find_map(|entry| match entry.binding {
            Binding::Func { id, arity: a } if entry.name == name && a == arity => Some(id),
            _ => None,
        })
    }
}
