use pl0_session::{Diagnostic, Diagnostics, Severity};

use crate::ast::*;

fn parse(source: &str) -> (Program, Vec<Diagnostic>) {
    let mut diagnostics = Diagnostics::new(Vec::new());
    let tokens = crate::scan(source, &mut diagnostics);
    let program = crate::parse(tokens, &mut diagnostics, false);
    (program, diagnostics.into_emitter())
}

fn errors(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.as_str())
        .collect()
}

fn warnings(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.message.as_str())
        .collect()
}

fn body_stmts(program: &Program) -> &[Stmt] {
    match &program.body.body {
        Stmt::BeginEnd { stmts } => stmts,
        other => panic!("program body is not begin/end: {other:?}"),
    }
}

fn first_assign_rhs(program: &Program) -> &Expr {
    match &body_stmts(program)[0] {
        Stmt::Assign { rhs, .. } => rhs,
        other => panic!("first statement is not an assignment: {other:?}"),
    }
}

fn var(name: &str) -> Expr {
    Expr::Variable {
        name: name.to_owned(),
    }
}

fn binary(op: BinOp, prefix: Sign, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        prefix,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[test]
fn straight_line_program() {
    let (program, diagnostics) = parse("var x; begin x := 10; write x; writeln end.");
    assert!(diagnostics.is_empty());

    assert_eq!(
        program,
        Program {
            body: Block {
                constants: None,
                variables: Some(VarDecl {
                    names: vec!["x".to_owned()],
                }),
                functions: vec![],
                body: Stmt::BeginEnd {
                    stmts: vec![
                        Stmt::Assign {
                            name: "x".to_owned(),
                            rhs: Expr::Number(10),
                        },
                        Stmt::Write(var("x")),
                        Stmt::Writeln,
                    ],
                },
            },
        }
    );
}

#[test]
fn constants_and_precedence() {
    let (program, diagnostics) =
        parse("const c = 3; var x; begin x := c + 4 * 2; write x; writeln end.");
    assert!(diagnostics.is_empty());

    assert_eq!(
        program.body.constants,
        Some(ConstDecl {
            defs: vec![("c".to_owned(), 3)],
        })
    );
    assert_eq!(
        *first_assign_rhs(&program),
        binary(
            BinOp::Add,
            Sign::None,
            var("c"),
            binary(BinOp::Mul, Sign::None, Expr::Number(4), Expr::Number(2)),
        )
    );
}

#[test]
fn if_then() {
    let (program, diagnostics) = parse("var x; begin x := 5; if x > 0 then write x; writeln end.");
    assert!(diagnostics.is_empty());

    let Stmt::IfThen { cond, body } = &body_stmts(&program)[1] else {
        panic!("expected if/then");
    };
    assert_eq!(
        *cond,
        Expr::Compare {
            op: RelOp::Gt,
            lhs: Box::new(var("x")),
            rhs: Box::new(Expr::Number(0)),
        }
    );
    assert_eq!(**body, Stmt::Write(var("x")));
}

#[test]
fn while_do() {
    let (program, diagnostics) =
        parse("var i; begin i := 0; while i < 3 do begin write i; i := i+1 end; writeln end.");
    assert!(diagnostics.is_empty());

    let Stmt::WhileDo { cond, body } = &body_stmts(&program)[1] else {
        panic!("expected while/do");
    };
    assert_eq!(
        *cond,
        Expr::Compare {
            op: RelOp::Lt,
            lhs: Box::new(var("i")),
            rhs: Box::new(Expr::Number(3)),
        }
    );
    let Stmt::BeginEnd { stmts } = &**body else {
        panic!("expected begin/end loop body");
    };
    assert_eq!(stmts.len(), 2);
}

#[test]
fn function_declaration_and_call() {
    let (program, diagnostics) =
        parse("function f(a,b); begin return a+b end; begin write f(2,3); writeln end.");
    assert!(diagnostics.is_empty());

    let func = &program.body.functions[0];
    assert_eq!(func.name, "f");
    assert_eq!(func.params, vec!["a", "b"]);
    let Stmt::BeginEnd { stmts } = &func.body.body else {
        panic!("expected function body block");
    };
    assert_eq!(
        stmts[0],
        Stmt::Return(binary(BinOp::Add, Sign::None, var("a"), var("b")))
    );

    assert_eq!(
        body_stmts(&program)[0],
        Stmt::Write(Expr::Call {
            callee: "f".to_owned(),
            args: vec![Expr::Number(2), Expr::Number(3)],
        })
    );
}

#[test]
fn undeclared_name_stays_tentative() {
    let (_, diagnostics) = parse("var x; begin y := 1 end.");
    assert_eq!(warnings(&diagnostics), vec!["add y to name table temporarily"]);
    assert_eq!(errors(&diagnostics), vec!["remain undefined symbols: y"]);
}

#[test]
fn duplicate_constant_is_dropped() {
    let (program, diagnostics) = parse("const a=1,a=2; begin writeln end.");
    assert_eq!(errors(&diagnostics), vec!["duplicate constant a: ignored"]);
    assert_eq!(
        program.body.constants,
        Some(ConstDecl {
            defs: vec![("a".to_owned(), 1)],
        })
    );
}

#[test]
fn duplicate_var_is_dropped() {
    let (program, diagnostics) = parse("var x; var x; begin writeln end.");
    assert_eq!(errors(&diagnostics), vec!["duplicate var x: ignored"]);
    assert_eq!(
        program.body.variables,
        Some(VarDecl {
            names: vec!["x".to_owned()],
        })
    );
}

#[test]
fn duplicate_function_is_dropped() {
    let (program, diagnostics) = parse(
        "function f(a); begin return a end; \
         function f(b); begin return b end; \
         begin writeln end.",
    );
    assert_eq!(errors(&diagnostics), vec!["duplicate func f: ignored"]);
    assert_eq!(program.body.functions.len(), 1);
}

#[test]
fn same_name_with_different_arity_is_allowed() {
    let (program, diagnostics) = parse(
        "function f(a); begin return a end; \
         function f(a,b); begin return a+b end; \
         begin write f(1); write f(1,2) end.",
    );
    assert!(diagnostics.is_empty());
    assert_eq!(program.body.functions.len(), 2);
}

#[test]
fn duplicate_parameter_is_dropped() {
    let (program, diagnostics) = parse("function f(a,a); begin return a end; begin writeln end.");
    assert_eq!(errors(&diagnostics), vec!["duplicate param a: ignored"]);
    assert_eq!(program.body.functions[0].params, vec!["a"]);
}

#[test]
fn constant_needs_a_number() {
    let (program, diagnostics) = parse("const a = b; begin writeln end.");
    assert_eq!(errors(&diagnostics), vec!["assigned not number"]);
    assert_eq!(program.body.constants, Some(ConstDecl { defs: vec![] }));
}

#[test]
fn subtraction_is_left_associative() {
    let (program, diagnostics) = parse("var a, b, c, x; begin x := a-b-c end.");
    assert!(diagnostics.is_empty());
    assert_eq!(
        *first_assign_rhs(&program),
        binary(
            BinOp::Sub,
            Sign::None,
            binary(BinOp::Sub, Sign::None, var("a"), var("b")),
            var("c"),
        )
    );
}

#[test]
fn unary_minus_on_a_later_term() {
    let (program, diagnostics) = parse("var x; begin x := 1 - -2 end.");
    assert!(diagnostics.is_empty());
    assert_eq!(
        *first_assign_rhs(&program),
        binary(
            BinOp::Sub,
            Sign::None,
            Expr::Number(1),
            binary(BinOp::Add, Sign::Minus, Expr::Number(2), Expr::Number(0)),
        )
    );
}

#[test]
fn leading_sign_sits_on_the_first_binary_node() {
    let (program, diagnostics) = parse("var x; begin x := -1 + 2 end.");
    assert!(diagnostics.is_empty());
    assert_eq!(
        *first_assign_rhs(&program),
        binary(BinOp::Add, Sign::Minus, Expr::Number(1), Expr::Number(2))
    );
}

#[test]
fn call_arity_must_match_a_visible_function() {
    let (program, diagnostics) =
        parse("function f(a); begin return a end; begin write f(2,3); writeln end.");
    assert_eq!(errors(&diagnostics), vec!["undefined func f(2)"]);
    assert_eq!(body_stmts(&program)[0], Stmt::Write(Expr::ParseError));
}

#[test]
fn assigning_to_a_function_is_reported() {
    let (program, diagnostics) = parse("function f(); begin return 1 end; begin f := 2 end.");
    assert_eq!(errors(&diagnostics), vec!["assign lhs is not var/par"]);
    // the assignment still records the name as written
    assert!(matches!(
        &body_stmts(&program)[0],
        Stmt::Assign { name, .. } if name == "f"
    ));
}

#[test]
fn forward_use_is_cleared_by_a_later_declaration() {
    let (_, diagnostics) = parse("function f(); begin y := 1 end; var y; begin y := f() end.");
    assert_eq!(
        warnings(&diagnostics),
        vec![
            "add y to name table temporarily",
            "delete y from name table"
        ]
    );
    assert_eq!(errors(&diagnostics), Vec::<&str>::new());
}

#[test]
fn repeated_declarations_merge_into_one_block_entry() {
    let (program, diagnostics) = parse("var x; var y; begin x := y end.");
    assert!(errors(&diagnostics).is_empty());
    assert_eq!(
        program.body.variables,
        Some(VarDecl {
            names: vec!["x".to_owned(), "y".to_owned()],
        })
    );
}

#[test]
fn missing_semicolon_between_statements_is_inserted() {
    let (program, diagnostics) = parse("var x; begin x := 1 write x end.");
    assert_eq!(errors(&diagnostics), vec!["missing ';': inserted"]);
    assert_eq!(body_stmts(&program).len(), 2);

    // attributed just past the end of the previous token
    let diagnostic = &diagnostics[0];
    assert_eq!(diagnostic.pos, Some((1, 20)));
}

#[test]
fn stray_token_between_statements_is_skipped() {
    let (program, diagnostics) = parse("var x; begin writeln , writeln end.");
    assert_eq!(
        errors(&diagnostics),
        vec![
            "delete , and skip to a new statement",
            "missing ';': inserted"
        ]
    );
    assert_eq!(body_stmts(&program).len(), 2);
}

#[test]
fn bare_semicolon_is_one_null_statement() {
    let (program, diagnostics) = parse("var x; begin x := 1;; end.");
    assert!(diagnostics.is_empty());
    assert_eq!(
        body_stmts(&program),
        &[
            Stmt::Assign {
                name: "x".to_owned(),
                rhs: Expr::Number(1),
            },
            Stmt::Null,
        ]
    );
}

#[test]
fn wrong_keyword_is_replaced() {
    let (_, diagnostics) = parse("var x; begin if x > 0 do x := 1 end.");
    assert_eq!(
        errors(&diagnostics),
        vec!["unexpected 'do': deleted", "missing 'then': inserted"]
    );
}

#[test]
fn adjacent_operands_need_an_operator() {
    let (_, diagnostics) = parse("var x; begin x := 1 2 end.");
    assert_eq!(errors(&diagnostics), vec!["fact + id/num 2: missing opcode"]);
}

#[test]
fn empty_source_has_no_statement_and_no_terminator() {
    let (program, diagnostics) = parse("");
    assert_eq!(
        errors(&diagnostics),
        vec!["No statement", "program done without '.'"]
    );
    assert_eq!(program.body.body, Stmt::Null);
}

#[test]
fn terminator_alone_is_an_empty_program() {
    let (program, diagnostics) = parse(".");
    assert!(diagnostics.is_empty());
    assert_eq!(program.body.body, Stmt::Null);
}

#[test]
fn unterminated_comment_leaves_nothing_to_parse() {
    let (_, diagnostics) = parse("{ this comment never closes");
    assert_eq!(
        errors(&diagnostics),
        vec!["No statement", "program done without '.'"]
    );
}

#[test]
fn writeln_alone_is_a_whole_program() {
    let (program, diagnostics) = parse("begin writeln end.");
    assert!(diagnostics.is_empty());
    assert_eq!(body_stmts(&program), &[Stmt::Writeln]);
}
