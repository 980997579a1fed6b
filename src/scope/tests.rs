use std::sync::Arc;

use crate::{
    ast::{
        ast::{Ast, DeclId, ExprId, ScopeId},
        declarations::{Decl, DeclKind},
        expressions::{Expr, ExprKind},
        statements::StmtKind,
    },
    errors::errors::InternalError,
    parser::parser::parse,
    Position, Span,
};

use super::scoped_program::{BindingStack, ScopedProgram};

fn scoped(source: &str) -> ScopedProgram {
    ScopedProgram::new(parse(source, "test.lang").unwrap()).unwrap()
}

/// Every `Name(name)` expression, in allocation order.
fn names(program: &ScopedProgram, name: &str) -> Vec<ExprId> {
    let ast = program.ast();
    ast.node_ids()
        .filter_map(|id| ast.as_expr(id))
        .filter(|e| matches!(&ast.expr(*e).kind, ExprKind::Name(n) if n == name))
        .collect()
}

fn decl_named(program: &ScopedProgram, name: &str) -> DeclId {
    let ast = program.ast();
    ast.node_ids()
        .filter_map(|id| ast.as_decl(id))
        .find(|d| ast.decl(*d).name() == Some(name))
        .unwrap()
}

fn visible(program: &ScopedProgram, name: &str, at: ExprId) -> bool {
    let scope = program.scope_of(at.node()).unwrap();
    !program.lookup(name, scope).is_empty()
}

fn span() -> Span {
    let file = Arc::new(String::from("test.lang"));
    Span::new(Position(0, file.clone()), Position(0, file))
}

#[test]
fn test_every_node_but_modules_has_a_scope() {
    let program = scoped(
        "fun f(a: Int) -> Int { let (x, y) = (a, 2); while x < y { x; } return x; }
         type P { let v: Int; fun g() {} }",
    );
    let ast = program.ast();

    for id in ast.node_ids() {
        assert_eq!(
            program.scope_of(id).is_some(),
            !ast.is_module(id),
            "node {:?}",
            id
        );
    }
    assert_eq!(program.node_count_with_scope(), ast.len() - 1);
}

#[test]
fn test_scope_is_innermost_scope_ancestor() {
    let program = scoped("fun f() { let x = 1 + 2; }");
    let ast = program.ast();
    let f = decl_named(&program, "f");
    let DeclKind::Fun {
        body: Some(body), ..
    } = ast.decl(f).kind
    else {
        panic!("Expected function");
    };

    // The operands of `1 + 2` skip the binding and the binary expression.
    for id in ast.node_ids() {
        if let Some(expr) = ast.as_expr(id) {
            assert_eq!(program.scope_of(expr.node()).unwrap().node(), body.node());
        }
    }
    assert_eq!(program.scope_of(body.node()).unwrap().node(), f.node());
    assert_eq!(
        program.scope_of(f.node()).unwrap().node(),
        ast.modules()[0].node()
    );
}

#[test]
fn test_declaration_lists_follow_textual_order() {
    let program = scoped("let a = 1; fun b<T>(p: T) { let (c, d) = (1, 2); fun e() {} } trait F {}");
    let ast = program.ast();
    let module_scope = program.scope_of(decl_named(&program, "b").node()).unwrap();

    let module_names: Vec<Option<&str>> = program
        .decls(module_scope)
        .iter()
        .map(|d| ast.decl(*d).name())
        .collect();
    assert_eq!(module_names, [None, Some("a"), Some("b"), Some("F")]);

    let fun_scope = program.scope_of(decl_named(&program, "p").node()).unwrap();
    let fun_names: Vec<Option<&str>> = program
        .decls(fun_scope)
        .iter()
        .map(|d| ast.decl(*d).name())
        .collect();
    assert_eq!(fun_names, [Some("T"), Some("p")]);

    let body_scope = program.scope_of(decl_named(&program, "c").node()).unwrap();
    let body_names: Vec<Option<&str>> = program
        .decls(body_scope)
        .iter()
        .map(|d| ast.decl(*d).name())
        .collect();
    assert_eq!(body_names, [None, Some("c"), Some("d"), Some("e")]);
}

#[test]
fn test_conditional_statement_asymmetry() {
    let program = scoped("fun f() { if let x = 1 { x; } else { x; } }");
    let uses = names(&program, "x");

    assert_eq!(uses.len(), 2);
    assert!(visible(&program, "x", uses[0]));
    assert!(!visible(&program, "x", uses[1]));
}

#[test]
fn test_conditional_expression_asymmetry() {
    let program = scoped("fun f() -> Int { return if let x = 1 { x } else { x }; }");
    let uses = names(&program, "x");

    assert!(visible(&program, "x", uses[0]));
    assert!(!visible(&program, "x", uses[1]));
}

#[test]
fn test_else_if_chain_scopes() {
    let program = scoped("fun f() { if let x = 1 { 0; } else if let y = 2 { x; y; } }");
    let x_use = names(&program, "x")[0];
    let y_use = names(&program, "y")[0];

    assert!(!visible(&program, "x", x_use));
    assert!(visible(&program, "y", y_use));
}

#[test]
fn test_do_while_condition_sees_body() {
    let program = scoped("fun f() { do { let y = 1; } while y > 0; 42; }");
    let ast = program.ast();
    let condition_use = names(&program, "y")[0];

    assert!(visible(&program, "y", condition_use));

    let after = ast
        .node_ids()
        .filter_map(|id| ast.as_expr(id))
        .find(|e| matches!(ast.expr(*e).kind, ExprKind::Int(42)))
        .unwrap();
    let do_while = ast
        .node_ids()
        .filter_map(|id| ast.as_stmt(id))
        .find(|s| matches!(ast.stmt(*s).kind, StmtKind::DoWhile { .. }))
        .unwrap();

    assert_eq!(
        program.scope_of(after.node()),
        program.scope_of(do_while.node())
    );
    assert!(!visible(&program, "y", after));
}

#[test]
fn test_while_condition_binding_scoped_to_loop() {
    let program = scoped("fun f() { while let z = true { z; } z; }");
    let uses = names(&program, "z");

    assert!(visible(&program, "z", uses[0]));
    assert!(!visible(&program, "z", uses[1]));
}

#[test]
fn test_binding_consistency() {
    let program = scoped("fun f() { let (a, (b, _)) = (1, (2, 3)); var c = 4; }");
    let ast = program.ast();

    let bindings: Vec<DeclId> = ast
        .node_ids()
        .filter_map(|id| ast.as_decl(id))
        .filter(|d| ast.decl(*d).is_binding())
        .collect();

    assert_eq!(program.binding_of(decl_named(&program, "a")), Some(bindings[0]));
    assert_eq!(program.binding_of(decl_named(&program, "b")), Some(bindings[0]));
    assert_eq!(program.binding_of(decl_named(&program, "c")), Some(bindings[1]));
}

#[test]
fn test_match_case_variable_outside_binding_is_unmapped() {
    let program = scoped("fun f() { match 1 { case let z { z } }; }");
    let z = decl_named(&program, "z");

    assert_eq!(program.binding_of(z), None);
    assert!(visible(&program, "z", names(&program, "z")[0]));
}

#[test]
fn test_match_case_variable_inside_binding_maps_to_open_binding() {
    let program = scoped("fun f() { let y = match 1 { case let z { z } }; }");
    let ast = program.ast();
    let binding = program.binding_of(decl_named(&program, "y")).unwrap();
    let z = decl_named(&program, "z");

    // Recorded against the enclosing binding even though its pattern does not own `z`.
    assert_eq!(program.binding_of(z), Some(binding));
    let DeclKind::Binding { pattern, .. } = &ast.decl(binding).kind else {
        panic!("Expected binding");
    };
    assert!(!pattern.contains_var(z));
}

#[test]
fn test_innermost_function_and_containment() {
    let program = scoped("fun outer() { fun inner() { 1; } 2; }");
    let ast = program.ast();
    let outer = decl_named(&program, "outer");
    let inner = decl_named(&program, "inner");

    let one = ast
        .node_ids()
        .filter_map(|id| ast.as_expr(id))
        .find(|e| matches!(ast.expr(*e).kind, ExprKind::Int(1)))
        .unwrap();
    let scope = program.scope_of(one.node()).unwrap();

    assert_eq!(program.innermost_function(scope), Some(inner));
    let outer_scope = program.scope_of(inner.node()).unwrap();
    assert_eq!(program.innermost_function(outer_scope), Some(outer));
    assert!(program.is_contained(scope, outer_scope));
    assert!(!program.is_contained(outer_scope, scope));

    let module_scope = program.scope_of(outer.node()).unwrap();
    assert_eq!(program.innermost_function(module_scope), None);
    assert_eq!(program.scopes_from(scope).last(), Some(module_scope));
}

#[test]
fn test_register_synthesized_node() {
    let mut program = scoped("fun f() { 1; }");
    let scope = program
        .scope_of(decl_named(&program, "f").node())
        .unwrap();
    let node = program
        .ast_mut()
        .insert_expr(Expr::new(ExprKind::Bool(true), span()));

    assert_eq!(program.scope_of(node.node()), None);
    program.register_synthesized(node.node(), scope);
    assert_eq!(program.scope_of(node.node()), Some(scope));
}

#[test]
fn test_nested_module_is_fatal() {
    let mut ast = Ast::new();
    let inner = ast.insert_decl(Decl::new(
        DeclKind::Module {
            name: String::from("inner"),
            members: vec![],
        },
        span(),
    ));
    let outer = ast.insert_decl(Decl::new(
        DeclKind::Module {
            name: String::from("outer"),
            members: vec![inner],
        },
        span(),
    ));
    ast.add_module(outer);

    let error = ScopedProgram::new(ast).unwrap_err();
    assert_eq!(error, InternalError::NestedModule(inner.node()));
}

#[test]
fn test_root_outside_module_is_fatal() {
    let mut ast = Ast::new();
    let var = ast.insert_decl(Decl::new(
        DeclKind::Var {
            name: String::from("x"),
        },
        span(),
    ));
    ast.add_module(var);

    let error = ScopedProgram::new(ast).unwrap_err();
    assert_eq!(error, InternalError::OrphanNode(var.node()));
}

#[test]
fn test_binding_stack_rejects_mismatched_pop() {
    let mut ast = Ast::new();
    let first = ast.insert_decl(Decl::new(
        DeclKind::Var {
            name: String::from("a"),
        },
        span(),
    ));
    let second = ast.insert_decl(Decl::new(
        DeclKind::Var {
            name: String::from("b"),
        },
        span(),
    ));

    let mut stack = BindingStack::default();
    stack.push(first);
    stack.push(second);

    assert_eq!(
        stack.pop_expecting(first),
        Err(InternalError::MismatchedBindingExit {
            expected: first,
            found: Some(second),
        })
    );
    assert_eq!(stack.top(), Some(first));
    assert_eq!(stack.pop_expecting(first), Ok(()));
    assert_eq!(
        stack.pop_expecting(first),
        Err(InternalError::MismatchedBindingExit {
            expected: first,
            found: None,
        })
    );
}

#[test]
fn test_multiple_modules_are_independent_roots() {
    let mut ast = parse("fun a() {}", "a.lang").unwrap();
    let module = ast.insert_decl(Decl::new(
        DeclKind::Module {
            name: String::from("other"),
            members: vec![],
        },
        span(),
    ));
    ast.add_module(module);

    let program = ScopedProgram::new(ast).unwrap();
    let first_scope = program.scope_of(decl_named(&program, "a").node()).unwrap();
    let second_scope = ScopeId::new(program.ast(), module.node()).unwrap();

    assert_eq!(program.parent(first_scope), None);
    assert_eq!(program.parent(second_scope), None);
    assert!(program.decls(second_scope).is_empty());
    assert!(program.lookup("a", second_scope).is_empty());
}
