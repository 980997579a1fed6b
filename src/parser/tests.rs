//! Unit tests for the parser module.

use crate::ast::{
    ast::{Ast, DeclId},
    declarations::{DeclKind, Introducer, WhereRequirement},
    expressions::{BinaryOperator, ExprKind, PrefixOperator},
    statements::{BlockMember, ConditionItem, StmtKind},
    types::{Pattern, TypeExprKind},
};

use super::parser::{parse, parse_module};

fn members(ast: &Ast) -> Vec<DeclId> {
    match &ast.decl(ast.modules()[0]).kind {
        DeclKind::Module { members, .. } => members.clone(),
        _ => panic!("Expected module root"),
    }
}

fn fun_body(ast: &Ast, fun: DeclId) -> Vec<BlockMember> {
    let DeclKind::Fun { body: Some(body), .. } = &ast.decl(fun).kind else {
        panic!("Expected function with body");
    };
    match &ast.stmt(*body).kind {
        StmtKind::Brace { members } => members.clone(),
        _ => panic!("Expected brace body"),
    }
}

#[test]
fn test_parse_binding_declaration() {
    let ast = parse("let x = 42;", "test.lang").unwrap();
    let members = members(&ast);

    assert_eq!(members.len(), 1);
    let DeclKind::Binding {
        introducer,
        pattern,
        initializer,
        annotation,
    } = &ast.decl(members[0]).kind
    else {
        panic!("Expected binding");
    };

    assert_eq!(*introducer, Introducer::Let);
    assert!(annotation.is_none());
    let Pattern::Name(var) = pattern else {
        panic!("Expected name pattern");
    };
    assert_eq!(ast.decl(*var).name(), Some("x"));
    assert!(matches!(
        ast.expr(initializer.unwrap()).kind,
        ExprKind::Int(42)
    ));
}

#[test]
fn test_parse_tuple_pattern_with_annotation() {
    let ast = parse("var (a, _, b): (Int, Bool, ()) = (1, true, ());", "test.lang").unwrap();
    let DeclKind::Binding {
        introducer,
        pattern,
        annotation,
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected binding");
    };

    assert_eq!(*introducer, Introducer::Var);
    assert_eq!(pattern.vars().len(), 2);
    assert!(matches!(pattern, Pattern::Tuple(elements) if elements[1] == Pattern::Wildcard));

    let TypeExprKind::Tuple(elements) = &annotation.as_ref().unwrap().kind else {
        panic!("Expected tuple type");
    };
    assert!(matches!(&elements[2].kind, TypeExprKind::Tuple(unit) if unit.is_empty()));
}

#[test]
fn test_parse_function_declaration() {
    let ast = parse("fun add(a: Int, b: Int) -> Int { return a + b; }", "test.lang").unwrap();
    let fun = members(&ast)[0];

    let DeclKind::Fun {
        name,
        params,
        output,
        body,
        ..
    } = &ast.decl(fun).kind
    else {
        panic!("Expected function");
    };

    assert_eq!(name, "add");
    assert_eq!(params.len(), 2);
    assert!(output.is_some());
    assert!(body.is_some());

    let body = fun_body(&ast, fun);
    let BlockMember::Stmt(ret) = body[0] else {
        panic!("Expected return statement");
    };
    let StmtKind::Ret { value: Some(value) } = ast.stmt(ret).kind else {
        panic!("Expected return with value");
    };
    assert!(matches!(
        ast.expr(value).kind,
        ExprKind::Binary {
            operator: BinaryOperator::Add,
            ..
        }
    ));
}

#[test]
fn test_parse_generic_function_with_where_clause() {
    let source = "fun f<T, U>(x: U) -> T where T == Int, U: Shape & Named { return 1; }";
    let ast = parse(source, "test.lang").unwrap();

    let DeclKind::Fun {
        generic_params,
        where_clause,
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected function");
    };

    assert_eq!(generic_params.len(), 2);
    assert_eq!(where_clause.len(), 2);
    assert!(matches!(&where_clause[0], WhereRequirement::Equality { param, .. } if param == "T"));
    assert!(
        matches!(&where_clause[1], WhereRequirement::Conformance { traits, .. } if traits.len() == 2)
    );
}

#[test]
fn test_parse_operator_precedence() {
    let ast = parse("let x = -1 + 2 * 3;", "test.lang").unwrap();
    let DeclKind::Binding {
        initializer: Some(init),
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected binding");
    };

    let ExprKind::Binary {
        operator: BinaryOperator::Add,
        left,
        right,
    } = ast.expr(*init).kind
    else {
        panic!("Expected addition at the root");
    };
    assert!(matches!(
        ast.expr(left).kind,
        ExprKind::Prefix {
            operator: PrefixOperator::Neg,
            ..
        }
    ));
    assert!(matches!(
        ast.expr(right).kind,
        ExprKind::Binary {
            operator: BinaryOperator::Mul,
            ..
        }
    ));
}

#[test]
fn test_parse_if_let_else() {
    let source = "fun f() { if let x = 1, x > 0 { x; } else { 0; } }";
    let ast = parse(source, "test.lang").unwrap();
    let body = fun_body(&ast, members(&ast)[0]);

    let BlockMember::Stmt(cond) = body[0] else {
        panic!("Expected conditional statement");
    };
    let StmtKind::Cond {
        condition, failure, ..
    } = &ast.stmt(cond).kind
    else {
        panic!("Expected conditional statement");
    };

    assert!(matches!(condition[0], ConditionItem::Decl(_)));
    assert!(matches!(condition[1], ConditionItem::Expr(_)));
    assert!(failure.is_some());
}

#[test]
fn test_parse_loops() {
    let source = "fun f() { var i = 0; while i < 10 { i = i + 1; } do { i = i - 1; } while i > 0; }";
    let ast = parse(source, "test.lang").unwrap();
    let body = fun_body(&ast, members(&ast)[0]);

    assert_eq!(body.len(), 3);
    let BlockMember::Stmt(while_loop) = body[1] else {
        panic!("Expected while loop");
    };
    assert!(matches!(ast.stmt(while_loop).kind, StmtKind::While { .. }));
    let BlockMember::Stmt(do_while) = body[2] else {
        panic!("Expected do/while loop");
    };
    assert!(matches!(ast.stmt(do_while).kind, StmtKind::DoWhile { .. }));
}

#[test]
fn test_parse_match_expression() {
    let source = "let y = match (1, 2) { case (let a, 2) { a } case _ { 0 } };";
    let ast = parse(source, "test.lang").unwrap();
    let DeclKind::Binding {
        initializer: Some(init),
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected binding");
    };

    let ExprKind::Match { cases, .. } = &ast.expr(*init).kind else {
        panic!("Expected match expression");
    };
    assert_eq!(cases.len(), 2);

    let Pattern::Tuple(elements) = &ast.case(cases[0]).pattern else {
        panic!("Expected tuple pattern");
    };
    assert!(matches!(elements[0], Pattern::Name(_)));
    assert!(matches!(elements[1], Pattern::Expr(_)));
    assert_eq!(ast.case(cases[1]).pattern, Pattern::Wildcard);
}

#[test]
fn test_parse_conditional_expression() {
    let ast = parse("let v = if true { 1 } else { 2 };", "test.lang").unwrap();
    let DeclKind::Binding {
        initializer: Some(init),
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected binding");
    };

    assert!(matches!(ast.expr(*init).kind, ExprKind::Cond { .. }));
}

#[test]
fn test_parse_trait_and_type() {
    let source = "
        trait Shape: Named { fun area() -> Int; }
        type Square: Shape { let side: Int; fun area() -> Int { return side * side; } }
    ";
    let ast = parse(source, "test.lang").unwrap();
    let members = members(&ast);

    let DeclKind::Trait {
        refinements,
        members: requirements,
        ..
    } = &ast.decl(members[0]).kind
    else {
        panic!("Expected trait");
    };
    assert_eq!(refinements[0].name, "Named");
    assert_eq!(requirements.len(), 1);

    let DeclKind::Product {
        conformances,
        members: type_members,
        ..
    } = &ast.decl(members[1]).kind
    else {
        panic!("Expected type");
    };
    assert_eq!(conformances[0].name, "Shape");
    assert_eq!(type_members.len(), 2);
}

#[test]
fn test_parse_existential_annotation() {
    let ast = parse("fun f(s: any Shape & Named) {}", "test.lang").unwrap();
    let DeclKind::Fun { params, .. } = &ast.decl(members(&ast)[0]).kind else {
        panic!("Expected function");
    };
    let DeclKind::Param { annotation, .. } = &ast.decl(params[0]).kind else {
        panic!("Expected parameter");
    };

    assert!(matches!(&annotation.kind, TypeExprKind::Existential(traits) if traits.len() == 2));
}

#[test]
fn test_parse_member_call_chain() {
    let ast = parse("let a = s.area();", "test.lang").unwrap();
    let DeclKind::Binding {
        initializer: Some(init),
        ..
    } = &ast.decl(members(&ast)[0]).kind
    else {
        panic!("Expected binding");
    };

    let ExprKind::Call { callee, arguments } = &ast.expr(*init).kind else {
        panic!("Expected call");
    };
    assert!(arguments.is_empty());
    assert!(matches!(&ast.expr(*callee).kind, ExprKind::Member { member, .. } if member == "area"));
}

#[test]
fn test_parse_multiple_files_into_one_module() {
    let files = vec![
        (String::from("a.lang"), String::from("fun a() {}")),
        (String::from("b.lang"), String::from("fun b() {}")),
    ];
    let ast = parse_module(&files, "lib").unwrap();

    assert_eq!(ast.modules().len(), 1);
    assert_eq!(ast.decl(ast.modules()[0]).name(), Some("lib"));
    let members = members(&ast);
    assert_eq!(members.len(), 2);
    assert_eq!(ast.decl(members[1]).span.file(), "b.lang");
}

#[test]
fn test_parse_missing_semicolon() {
    let result = parse("let x = 1 let y = 2;", "test.lang");

    let error = result.unwrap_err();
    assert_eq!(error.get_error_name(), "UnexpectedToken");
    assert_eq!(error.get_position().0, 10);
}

#[test]
fn test_parse_conditional_expression_requires_else() {
    let result = parse("let v = if true { 1 };", "test.lang");

    assert_eq!(result.unwrap_err().get_error_name(), "UnexpectedTokenDetailed");
}

#[test]
fn test_parse_statement_at_module_level() {
    let result = parse("return 1;", "test.lang");

    assert_eq!(result.unwrap_err().get_error_name(), "UnexpectedTokenDetailed");
}

#[test]
fn test_parse_number_overflow() {
    let result = parse("let x = 99999999999999999999999;", "test.lang");

    assert_eq!(result.unwrap_err().get_error_name(), "NumberParseError");
}
