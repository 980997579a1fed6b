//! End-to-end tests: source text through parsing, scope building and checking.

use sema::{
    ast::{
        ast::{Ast, DeclId, ExprId},
        declarations::DeclKind,
        expressions::ExprKind,
    },
    config::{Config, FreeTypeVarBindingPolicy},
    parser::parser::{parse, parse_module},
    scope::scoped_program::ScopedProgram,
    type_checker::{
        conformance::ConformanceState, stmt_checker::CheckContext, ty::Type,
        type_checker::TypeChecker,
    },
};

fn checker_with(source: &str, config: Config) -> (TypeChecker, bool) {
    let ast = parse(source, "test.lang").unwrap();
    let program = ScopedProgram::new(ast).unwrap();
    let mut checker = TypeChecker::new(program, config);
    let success = checker.check_program().unwrap();
    (checker, success)
}

fn check(source: &str) -> (TypeChecker, bool) {
    checker_with(source, Config::default())
}

fn error_names(checker: &TypeChecker) -> Vec<&str> {
    checker.errors().iter().map(|e| e.get_error_name()).collect()
}

fn decl_named(ast: &Ast, name: &str) -> DeclId {
    ast.node_ids()
        .filter_map(|id| ast.as_decl(id))
        .find(|d| ast.decl(*d).name() == Some(name))
        .unwrap()
}

fn call_to(ast: &Ast, callee_name: &str) -> ExprId {
    ast.node_ids()
        .filter_map(|id| ast.as_expr(id))
        .find(|e| match &ast.expr(*e).kind {
            ExprKind::Call { callee, .. } => {
                matches!(&ast.expr(*callee).kind, ExprKind::Name(name) if name == callee_name)
            }
            _ => false,
        })
        .unwrap()
}

#[test]
fn test_check_simple_program() {
    let (checker, success) = check("let x = 42; let y = x + 1;");
    assert!(success, "{:?}", checker.errors());

    let y = decl_named(checker.program().ast(), "y");
    assert_eq!(checker.decl_type(y), Some(Type::Int));
}

#[test]
fn test_use_before_declaration_at_module_level() {
    let (checker, success) = check("fun f() -> Int { return g(); } fun g() -> Int { return 1; }");
    assert!(success, "{:?}", checker.errors());
}

#[test]
fn test_local_variable_not_visible_before_binding() {
    let (checker, success) = check("fun f() { x; let x = 1; }");
    assert!(!success);
    assert_eq!(error_names(&checker), ["VariableNotDeclared"]);
}

#[test]
fn test_return_contextualized_by_equality() {
    let (checker, success) = check("fun f<T>() -> T where T == Int { return 1; }");
    assert!(success, "{:?}", checker.errors());

    let f = decl_named(checker.program().ast(), "f");
    let returns = checker.returns(f);
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].function, f);
    assert_eq!(returns[0].expected, Type::Int);
}

#[test]
fn test_return_mismatch_after_contextualization() {
    let (checker, success) = check("fun f<T>() -> T where T == Int { return \"s\"; }");
    assert!(!success);
    assert_eq!(error_names(&checker), ["TypeMatchError"]);

    let f = decl_named(checker.program().ast(), "f");
    assert_eq!(checker.returns(f)[0].expected, Type::Int);
}

#[test]
fn test_return_of_rigid_parameter() {
    let (checker, success) = check("fun id<T>(x: T) -> T { return x; }");
    assert!(success, "{:?}", checker.errors());

    let ast = checker.program().ast();
    let id = decl_named(ast, "id");
    let t = decl_named(ast, "T");
    assert_eq!(
        checker.returns(id)[0].expected,
        Type::Param {
            decl: t,
            name: String::from("T")
        }
    );
}

#[test]
fn test_conflicting_equalities_reported_once() {
    let (checker, success) =
        check("fun f<T>() -> T where T == Int, T == Bool { return 1; return 2; }");
    assert!(!success);
    assert_eq!(error_names(&checker), ["InvalidGenericEnvironment"]);

    let f = decl_named(checker.program().ast(), "f");
    let returns = checker.returns(f);
    assert_eq!(returns.len(), 2);
    assert!(returns.iter().all(|r| r.expected == Type::Error));
}

#[test]
fn test_where_clause_on_unknown_parameter() {
    let (checker, success) = check("fun f<T>(x: T) where U == Int {}");
    assert!(!success);
    assert_eq!(error_names(&checker), ["InvalidGenericEnvironment"]);
}

#[test]
fn test_generic_call_is_instantiated_at_call_site() {
    let source = "
        fun id<T>(x: T) -> T { return x; }
        let a = id(1);
        let b = id(\"s\");
    ";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());

    let ast = checker.program().ast();
    assert_eq!(checker.decl_type(decl_named(ast, "a")), Some(Type::Int));
    assert_eq!(checker.decl_type(decl_named(ast, "b")), Some(Type::String));
}

#[test]
fn test_existential_coercion_wraps_value() {
    let source = "
        trait Shape { fun area() -> Int; }
        type Square: Shape { let side: Int; fun area() -> Int { return side * side; } }
        fun measure(s: any Shape) -> Int { return s.area(); }
        fun main() -> Int { return measure(Square(2)); }
    ";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());

    let square = decl_named(checker.program().ast(), "Square");
    let conformances = checker.conformances(square);
    assert_eq!(conformances.len(), 1);
    assert_eq!(conformances[0].state(), ConformanceState::Checked);

    let checked = checker.finish();
    let ast = checked.program.ast();
    let call = call_to(ast, "measure");
    let ExprKind::Call { arguments, .. } = &ast.expr(call).kind else {
        panic!("Expected call");
    };
    let wrapper = arguments[0];
    let ExprKind::Existential { witness, traits } = &ast.expr(wrapper).kind else {
        panic!("Expected existential wrapper");
    };

    assert_eq!(*witness, call_to(ast, "Square"));
    assert_eq!(traits, &[decl_named(ast, "Shape")]);
    assert!(checked.program.scope_of(wrapper.node()).is_some());
    assert_eq!(
        checked.program.scope_of(wrapper.node()),
        checked.program.scope_of(witness.node())
    );
    assert!(matches!(
        checked.expr_types.get(&wrapper),
        Some(Type::Existential { .. })
    ));
}

#[test]
fn test_invalid_conformance_is_diagnosed_once() {
    let source = "
        trait Shape { fun area() -> Int; }
        type Circle: Shape { fun area() -> Bool { return true; } }
        fun measure(s: any Shape) -> Int { return s.area(); }
        fun main() -> Int { return measure(Circle()); }
    ";
    let (checker, success) = check(source);
    assert!(!success);
    assert_eq!(error_names(&checker), ["NonConformingType"]);

    let ast = checker.program().ast();
    let circle = decl_named(ast, "Circle");
    assert_eq!(
        checker.conformances(circle)[0].state(),
        ConformanceState::Invalid
    );

    // The coercion degrades silently instead of wrapping.
    let call = call_to(ast, "measure");
    let ExprKind::Call { arguments, .. } = &ast.expr(call).kind else {
        panic!("Expected call");
    };
    assert!(matches!(ast.expr(arguments[0]).kind, ExprKind::Call { .. }));
}

#[test]
fn test_coercion_without_conformance() {
    let source = "
        trait Shape { fun area() -> Int; }
        type Blob { }
        fun measure(s: any Shape) -> Int { return s.area(); }
        let m = measure(Blob());
    ";
    let (checker, success) = check(source);
    assert!(!success);
    assert_eq!(error_names(&checker), ["TypeMatchError"]);
}

#[test]
fn test_refinement_implies_conformance() {
    let source = "
        trait Named { fun name() -> String; }
        trait Shape: Named { fun area() -> Int; }
        type Square: Shape {
            fun area() -> Int { return 1; }
            fun name() -> String { return \"square\"; }
        }
        fun label(n: any Named) -> String { return n.name(); }
        fun main() -> String { return label(Square()); }
    ";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());

    let ast = checker.program().ast();
    let conformances = checker.conformances(decl_named(ast, "Square"));
    assert_eq!(conformances.len(), 2);
    assert_eq!(conformances[0].trait_decl(), decl_named(ast, "Shape"));
    assert!(!conformances[0].is_implicit());
    assert_eq!(conformances[1].trait_decl(), decl_named(ast, "Named"));
    assert!(conformances[1].is_implicit());
    assert!(conformances
        .iter()
        .all(|c| c.state() == ConformanceState::Checked));
}

#[test]
fn test_member_through_generic_bound() {
    let source = "
        trait Shape { fun area() -> Int; }
        fun double<T>(s: T) -> Int where T: Shape { return s.area() * 2; }
    ";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());
}

#[test]
fn test_do_while_condition_sees_body_bindings() {
    let source = "fun f() { var i = 0; do { let y = i + 1; i = y; } while y < 10; }";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());
}

#[test]
fn test_conditional_statement() {
    let (checker, success) =
        check("fun f(b: Bool) -> Int { if let x = 1, b { return x; } else { return 0; } }");
    assert!(success, "{:?}", checker.errors());

    let (checker, success) = check("fun f() { if 1 { } while \"s\" { } }");
    assert!(!success);
    assert_eq!(error_names(&checker), ["TypeMatchError", "TypeMatchError"]);
}

#[test]
fn test_conditional_and_match_expressions() {
    let source = "
        let v = if true { 1 } else { 2 };
        let y = match (1, 2) { case (let a, 2) { a } case _ { 0 } };
    ";
    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());

    let ast = checker.program().ast();
    assert_eq!(checker.decl_type(decl_named(ast, "v")), Some(Type::Int));
    assert_eq!(checker.decl_type(decl_named(ast, "y")), Some(Type::Int));
    assert_eq!(checker.decl_type(decl_named(ast, "a")), Some(Type::Int));
}

#[test]
fn test_conditional_expression_branch_mismatch() {
    let (checker, success) = check("let v = if true { 1 } else { \"s\" };");
    assert!(!success);
    assert_eq!(error_names(&checker), ["TypeMatchError"]);
}

#[test]
fn test_circular_reference() {
    let (checker, success) = check("let a = b; let b = a;");
    assert!(!success);
    assert!(error_names(&checker).contains(&"CircularReference"));
}

#[test]
fn test_assignment_to_constant() {
    let (checker, success) = check("fun f() { let x = 1; x = 2; var y = 1; y = 3; }");
    assert!(!success);
    assert_eq!(error_names(&checker), ["AssignmentToConstant"]);
}

#[test]
fn test_tuple_destructuring() {
    let (checker, success) = check("let (a, _, b) = (1, true, \"s\");");
    assert!(success, "{:?}", checker.errors());

    let ast = checker.program().ast();
    assert_eq!(checker.decl_type(decl_named(ast, "b")), Some(Type::String));

    let (checker, success) = check("let (a, b) = 1;");
    assert!(!success);
    assert_eq!(error_names(&checker), ["PatternMismatch"]);
}

#[test]
fn test_call_arity_and_argument_types() {
    let source = "
        fun add(a: Int, b: Int) -> Int { return a + b; }
        let x = add(1);
        let y = add(1, 2, 3);
        let z = add(1, true);
        let w = 1(2);
    ";
    let (checker, success) = check(source);
    assert!(!success);
    assert_eq!(
        error_names(&checker),
        [
            "MissingArguments",
            "UnexpectedArguments",
            "ArgumentTypeMatchError",
            "NotCallable"
        ]
    );
}

#[test]
fn test_ambiguous_type() {
    let source = "fun never<T>() -> T { return never(); } let v = never();";

    let (checker, success) = check(source);
    assert!(!success);
    assert_eq!(error_names(&checker), ["AmbiguousType"]);

    let config = Config {
        free_var_binding_policy: FreeTypeVarBindingPolicy::KeepFree,
        ..Config::default()
    };
    let (checker, success) = checker_with(source, config);
    assert!(success, "{:?}", checker.errors());

    let v = decl_named(checker.program().ast(), "v");
    assert!(matches!(checker.decl_type(v), Some(Type::Var(_))));
}

#[test]
fn test_missing_return_value_is_configurable() {
    let source = "fun f() -> Int { return; }";

    let (checker, success) = check(source);
    assert!(success, "{:?}", checker.errors());

    let config = Config {
        diagnose_missing_return_values: true,
        ..Config::default()
    };
    let (checker, success) = checker_with(source, config);
    assert!(!success);
    assert_eq!(error_names(&checker), ["MissingReturnValue"]);
}

#[test]
fn test_unknown_names() {
    let source = "
        fun f(x: Thing) {}
        type Square: Shape {}
        let v = Square.side;
    ";
    let (checker, success) = check(source);
    assert!(!success);

    let names = error_names(&checker);
    assert!(names.contains(&"UnknownType"));
    assert!(names.contains(&"UnknownTrait"));
}

#[test]
fn test_multiple_files_share_module_scope() {
    let files = [
        (String::from("a.lang"), String::from("fun a() -> Int { return b(); }")),
        (String::from("b.lang"), String::from("fun b() -> Int { return 1; }")),
    ];
    let program = ScopedProgram::new(parse_module(&files, "lib").unwrap()).unwrap();
    let mut checker = TypeChecker::new(program, Config::default());
    assert!(checker.check_program().unwrap(), "{:?}", checker.errors());

    let ast = checker.program().ast();
    let module = ast.modules()[0];
    assert!(matches!(&ast.decl(module).kind, DeclKind::Module { name, .. } if name == "lib"));
}

#[test]
fn test_type_errors_are_positioned() {
    let (checker, _) = check("let x: Int = true;");
    let error = &checker.errors()[0];

    assert_eq!(error.get_error_name(), "TypeMatchError");
    assert_eq!(error.get_position().0, 13);
    assert_eq!(error.get_position().1.as_str(), "test.lang");
}
