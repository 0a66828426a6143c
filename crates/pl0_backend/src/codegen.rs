use std::collections::HashSet;

use cranelift::codegen::verify_function;
use cranelift::prelude::*;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as _};
use cranelift_object::{ObjectBuilder, ObjectModule};
use pl0_frontend::ast::{self, BinOp, Expr, Program, RelOp, Sign, Stmt};
use target_lexicon::Triple;

use crate::table::{Binding, CodeTable};
use crate::{BackendError, BackendResult, CodegenOutput};

pub struct Codegen {
    ctx: codegen::Context,
    builder_ctx: FunctionBuilderContext,
    module: ObjectModule,

    table: CodeTable,
    used_symbols: HashSet<String>,
    next_ordinal: u32,

    printf: FuncId,
    puts: FuncId,
    write_fmt: DataId,
    empty_str: DataId,

    clif: Vec<String>,
}

impl Codegen {
    pub fn new(target: Triple, name: &str) -> BackendResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder.set("is_pic", "true").unwrap();
        flag_builder.set("opt_level", "speed").unwrap();

        let flags = settings::Flags::new(flag_builder);

        let isa = match isa::lookup(target.clone()) {
            Ok(isa_builder) => isa_builder.finish(flags)?,
            Err(_) => {
                return Err(BackendError::UnsupportedArch(target.architecture));
            }
        };

        let module_builder =
            ObjectBuilder::new(isa, name, cranelift_module::default_libcall_names())?;
        let mut module = ObjectModule::new(module_builder);

        let ptr_type = module.isa().pointer_type();

        // `write e` becomes printf("%d\n", e), `writeln` becomes puts("")
        let mut printf_sig = module.make_signature();
        printf_sig.params.push(AbiParam::new(ptr_type));
        printf_sig.params.push(AbiParam::new(types::I64));
        printf_sig.returns.push(AbiParam::new(types::I32));
        let printf = module.declare_function("printf", Linkage::Import, &printf_sig)?;

        let mut puts_sig = module.make_signature();
        puts_sig.params.push(AbiParam::new(ptr_type));
        puts_sig.returns.push(AbiParam::new(types::I32));
        let puts = module.declare_function("puts", Linkage::Import, &puts_sig)?;

        let write_fmt = module.declare_anonymous_data(false, false)?;
        let mut data = DataDescription::new();
        data.define(Box::new(*b"%d\n\0"));
        module.define_data(write_fmt, &data)?;

        let empty_str = module.declare_anonymous_data(false, false)?;
        let mut data = DataDescription::new();
        data.define(Box::new(*b"\0"));
        module.define_data(empty_str, &data)?;

        Ok(Self {
            ctx: module.make_context(),
            builder_ctx: FunctionBuilderContext::new(),
            module,

            table: CodeTable::new(),
            used_symbols: HashSet::new(),
            next_ordinal: 0,

            printf,
            puts,
            write_fmt,
            empty_str,

            clif: vec![],
        })
    }

    pub fn compile_program(&mut self, program: &Program) -> BackendResult<()> {
        self.used_symbols.insert("main".to_owned());
        let main_id = self.declare_symbol("main", 0)?;
        self.table.enter_block();
        self.compile_block(main_id, "main", &[], &program.body, true)
    }

    pub fn finish(self) -> BackendResult<CodegenOutput> {
        let product = self.module.finish();
        Ok(CodegenOutput {
            object: product.object,
            clif: self.clif,
        })
    }

    /// Compile one block as the body of one object function. Nested
    /// functions become their own object functions first; the table keeps
    /// a single stack across all of them, popped a level at a time.
    fn compile_block(
        &mut self,
        func_id: FuncId,
        symbol: &str,
        params: &[String],
        block: &ast::Block,
        is_main: bool,
    ) -> BackendResult<()> {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        let mut next_var = 0usize;

        if let Some(constants) = &block.constants {
            for (name, value) in &constants.defs {
                self.table.push_const(name, *value);
            }
        }

        let mut local_vars = vec![];
        if let Some(variables) = &block.variables {
            for name in &variables.names {
                let var = Variable::new(next_var);
                next_var += 1;
                self.table.push_var(name, var, ordinal);
                local_vars.push(var);
            }
        }

        let mut param_vars = vec![];
        for name in params {
            let var = Variable::new(next_var);
            next_var += 1;
            self.table.push_param(name, var, ordinal);
            param_vars.push(var);
        }

        for func in &block.functions {
            let inner_symbol = self.unique_symbol(&func.name);
            let inner_id = self.declare_symbol(&inner_symbol, func.params.len())?;
            self.table.push_func(&func.name, inner_id, func.params.len());

            self.table.enter_block();
            self.compile_block(inner_id, &inner_symbol, &func.params, &func.body, false)?;
        }

        self.module.clear_context(&mut self.ctx);
        self.ctx.func.signature = self.make_signature(params.len());

        let mut func_codegen = FuncCodegen {
            builder: FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx),
            module: &mut self.module,
            table: &self.table,
            ordinal,
            printf: self.printf,
            puts: self.puts,
            write_fmt: self.write_fmt,
            empty_str: self.empty_str,
        };

        let entry_block = func_codegen.builder.create_block();
        func_codegen
            .builder
            .append_block_params_for_function_params(entry_block);
        func_codegen.builder.switch_to_block(entry_block);
        func_codegen.builder.seal_block(entry_block); // no predecessors

        for (index, var) in param_vars.iter().enumerate() {
            func_codegen.builder.declare_var(*var, types::I64);
            let value = func_codegen.builder.block_params(entry_block)[index];
            func_codegen.builder.def_var(*var, value);
        }
        for var in &local_vars {
            func_codegen.builder.declare_var(*var, types::I64);
            let zero = func_codegen.builder.ins().iconst(types::I64, 0);
            func_codegen.builder.def_var(*var, zero);
        }

        func_codegen.gen_stmt(&block.body)?;

        // terminate the fall-through path: compiled programs exit with
        // status 1, a function without an explicit return yields 0
        let status = func_codegen
            .builder
            .ins()
            .iconst(types::I64, if is_main { 1 } else { 0 });
        func_codegen.builder.ins().return_(&[status]);
        func_codegen.builder.finalize();

        // any error here is a compiler bug
        verify_function(&self.ctx.func, self.module.isa()).expect("function verification failed");

        self.clif
            .push(format!("; {symbol}\n{}", self.ctx.func.display()));
        self.module.define_function(func_id, &mut self.ctx)?;

        self.table.leave_block();
        Ok(())
    }

    fn make_signature(&self, arity: usize) -> Signature {
        let mut sig = self.module.make_signature();
        for _ in 0..arity {
            sig.params.push(AbiParam::new(types::I64));
        }
        sig.returns.push(AbiParam::new(types::I64));
        sig
    }

    fn declare_symbol(&mut self, symbol: &str, arity: usize) -> BackendResult<FuncId> {
        let sig = self.make_signature(arity);
        Ok(self
            .module
            .declare_function(symbol, Linkage::Export, &sig)?)
    }

    /// Nested scopes may reuse a source name; object symbols may not.
    fn unique_symbol(&mut self, name: &str) -> String {
        if self.used_symbols.insert(name.to_owned()) {
            return name.to_owned();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{name}.{n}");
            if self.used_symbols.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

struct FuncCodegen<'a> {
    builder: FunctionBuilder<'a>,
    module: &'a mut ObjectModule,
    table: &'a CodeTable,
    ordinal: u32,

    printf: FuncId,
    puts: FuncId,
    write_fmt: DataId,
    empty_str: DataId,
}

impl FuncCodegen<'_> {
    fn gen_stmt(&mut self, stmt: &Stmt) -> BackendResult<()> {
        match stmt {
            Stmt::Null => Ok(()),

            Stmt::Assign { name, rhs } => {
                let value = self.gen_expr(rhs)?;
                let var = match self.table.lookup(name) {
                    Some(entry) => match entry.binding {
                        Binding::Var(var) | Binding::Param(var) => {
                            if entry.owner != self.ordinal {
                                return Err(BackendError::OuterLocal(name.clone()));
                            }
                            var
                        }
                        _ => return Err(BackendError::NotAssignable(name.clone())),
                    },
                    None => return Err(BackendError::Undefined(name.clone())),
                };
                self.builder.def_var(var, value);
                Ok(())
            }

            Stmt::BeginEnd { stmts } => {
                for stmt in stmts {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }

            Stmt::IfThen { cond, body } => {
                let flag = self.gen_expr(cond)?;
                let then_block = self.builder.create_block();
                let merge_block = self.builder.create_block();
                self.builder.ins().brif(flag, then_block, &[], merge_block, &[]);
                self.builder.seal_block(then_block);

                self.builder.switch_to_block(then_block);
                self.gen_stmt(body)?;
                self.builder.ins().jump(merge_block, &[]);

                self.builder.seal_block(merge_block);
                self.builder.switch_to_block(merge_block);
                Ok(())
            }

            Stmt::WhileDo { cond, body } => {
                let header_block = self.builder.create_block();
                let body_block = self.builder.create_block();
                let merge_block = self.builder.create_block();

                self.builder.ins().jump(header_block, &[]);
                self.builder.switch_to_block(header_block);
                let flag = self.gen_expr(cond)?;
                self.builder.ins().brif(flag, body_block, &[], merge_block, &[]);
                self.builder.seal_block(body_block);
                self.builder.seal_block(merge_block);

                self.builder.switch_to_block(body_block);
                self.gen_stmt(body)?;
                self.builder.ins().jump(header_block, &[]);
                self.builder.seal_block(header_block);

                self.builder.switch_to_block(merge_block);
                Ok(())
            }

            Stmt::Return(expr) => {
                let value = self.gen_expr(expr)?;
                self.builder.ins().return_(&[value]);

                // anything that follows is dead code; keep generating into
                // a fresh unreachable block
                let after_block = self.builder.create_block();
                self.builder.switch_to_block(after_block);
                self.builder.seal_block(after_block);
                Ok(())
            }

            Stmt::Write(expr) => {
                let value = self.gen_expr(expr)?;
                let fmt = self.data_addr(self.write_fmt);
                let printf = self
                    .module
                    .declare_func_in_func(self.printf, self.builder.func);
                self.builder.ins().call(printf, &[fmt, value]);
                Ok(())
            }

            Stmt::Writeln => {
                let empty = self.data_addr(self.empty_str);
                let puts = self
                    .module
                    .declare_func_in_func(self.puts, self.builder.func);
                self.builder.ins().call(puts, &[empty]);
                Ok(())
            }
        }
    }

    fn gen_expr(&mut self, expr: &Expr) -> BackendResult<Value> {
        match expr {
            Expr::Number(value) => Ok(self.builder.ins().iconst(types::I64, *value)),

            Expr::Variable { name } => {
                let entry = self
                    .table
                    .lookup(name)
                    .ok_or_else(|| BackendError::Undefined(name.clone()))?;
                match entry.binding {
                    Binding::Const(value) => Ok(self.builder.ins().iconst(types::I64, value)),
                    Binding::Var(var) | Binding::Param(var) => {
                        if entry.owner != self.ordinal {
                            return Err(BackendError::OuterLocal(name.clone()));
                        }
                        Ok(self.builder.use_var(var))
                    }
                    Binding::Func { .. } => Err(BackendError::NotAValue(name.clone())),
                }
            }

            Expr::Binary {
                op,
                prefix,
                lhs,
                rhs,
            } => {
                let mut lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;

                if *prefix == Sign::Minus {
                    lhs = self.builder.ins().ineg(lhs);
                }

                let ins = self.builder.ins();
                Ok(match op {
                    BinOp::Add => ins.iadd(lhs, rhs),
                    BinOp::Sub => ins.isub(lhs, rhs),
                    BinOp::Mul => ins.imul(lhs, rhs),
                    BinOp::Div => ins.sdiv(lhs, rhs),
                })
            }

            // odd e  <=>  e mod 2 = 1 under signed evaluation
            Expr::Odd(operand) => {
                let value = self.gen_expr(operand)?;
                let rem = self.builder.ins().srem_imm(value, 2);
                Ok(self.builder.ins().icmp_imm(IntCC::Equal, rem, 1))
            }

            Expr::Compare { op, lhs, rhs } => {
                let lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;
                let cc = match op {
                    RelOp::Eq => IntCC::Equal,
                    RelOp::Ne => IntCC::NotEqual,
                    RelOp::Lt => IntCC::SignedLessThan,
                    RelOp::Le => IntCC::SignedLessThanOrEqual,
                    RelOp::Gt => IntCC::SignedGreaterThan,
                    RelOp::Ge => IntCC::SignedGreaterThanOrEqual,
                };
                Ok(self.builder.ins().icmp(cc, lhs, rhs))
            }

            Expr::Call { callee, args } => {
                let Some(func_id) = self.table.lookup_func(callee, args.len()) else {
                    return Err(match self.table.lookup(callee) {
                        Some(entry) if matches!(entry.binding, Binding::Func { .. }) => {
                            BackendError::WrongArity(callee.clone())
                        }
                        Some(_) => BackendError::NotCallable(callee.clone()),
                        None => BackendError::Undefined(callee.clone()),
                    });
                };

                let mut values = vec![];
                for arg in args {
                    values.push(self.gen_expr(arg)?);
                }

                let func_ref = self.module.declare_func_in_func(func_id, self.builder.func);
                let call = self.builder.ins().call(func_ref, &values);
                Ok(self.builder.inst_results(call)[0])
            }

            Expr::ParseError => Err(BackendError::MalformedExpr),
        }
    }

    fn data_addr(&mut self, data: DataId) -> Value {
        let global = self.module.declare_data_in_func(data, self.builder.func);
        let ptr_type = self.module.isa().pointer_type();
        self.builder.ins().global_value(ptr_type, global)
    }
}
