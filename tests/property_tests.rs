//! Property tests over generated programs.

use proptest::prelude::*;
use sema::{
    ast::ast::ScopeId,
    config::Config,
    parser::parser::parse,
    scope::scoped_program::ScopedProgram,
    type_checker::type_checker::TypeChecker,
};

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from)
}

fn expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0..100i64).prop_map(|n| n.to_string()),
        Just(String::from("true")),
        name(),
    ];
    leaf.prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{} + {}", l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({}, {})", l, r)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, s, f)| format!("if {} {{ {} }} else {{ {} }}", c, s, f)),
            (inner.clone(), name(), inner)
                .prop_map(|(s, n, b)| format!("match {} {{ case let {} {{ {} }} }}", s, n, b)),
        ]
    })
}

fn stmt() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (name(), expr()).prop_map(|(n, e)| format!("let {} = {};", n, e)),
        (name(), expr()).prop_map(|(n, e)| format!("var {} = {};", n, e)),
        // Parenthesized so a leading `if` is not read as a statement.
        expr().prop_map(|e| format!("({});", e)),
        expr().prop_map(|e| format!("return {};", e)),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        let block = prop::collection::vec(inner, 0..4).prop_map(|stmts| stmts.join(" "));
        prop_oneof![
            block.clone().prop_map(|b| format!("{{ {} }}", b)),
            (expr(), block.clone()).prop_map(|(c, b)| format!("while {} {{ {} }}", c, b)),
            (block.clone(), expr()).prop_map(|(b, c)| format!("do {{ {} }} while {};", b, c)),
            (name(), expr(), block.clone(), block)
                .prop_map(|(n, e, s, f)| format!("if let {} = {} {{ {} }} else {{ {} }}", n, e, s, f)),
        ]
    })
}

fn item() -> impl Strategy<Value = String> {
    prop_oneof![
        (name(), expr()).prop_map(|(n, e)| format!("let {} = {};", n, e)),
        (name(), prop::collection::vec(stmt(), 0..4))
            .prop_map(|(n, body)| format!("fun f_{}(x: Int) {{ {} }}", n, body.join(" "))),
    ]
}

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(item(), 1..6).prop_map(|items| items.join("\n"))
}

proptest! {
    #[test]
    fn every_node_but_modules_has_a_scope(source in program()) {
        let ast = parse(&source, "test.lang").unwrap();
        let expected = ast.len() - ast.modules().len();
        let program = ScopedProgram::new(ast).unwrap();

        prop_assert_eq!(program.node_count_with_scope(), expected);
        for module in program.ast().modules() {
            prop_assert_eq!(program.scope_of(module.node()), None);
        }
    }

    #[test]
    fn scope_declarations_are_in_textual_order(source in program()) {
        let program = ScopedProgram::new(parse(&source, "test.lang").unwrap()).unwrap();
        let ast = program.ast();

        for node in ast.node_ids() {
            let Some(scope) = ScopeId::new(ast, node) else {
                continue;
            };
            let starts: Vec<u32> = program
                .decls(scope)
                .iter()
                .map(|decl| ast.decl(*decl).span.start.0)
                .collect();
            prop_assert!(starts.windows(2).all(|w| w[0] <= w[1]), "{:?}", starts);
        }
    }

    #[test]
    fn checking_never_fails_internally(source in program()) {
        let program = ScopedProgram::new(parse(&source, "test.lang").unwrap()).unwrap();
        let mut checker = TypeChecker::new(program, Config::default());
        let result = checker.check_program();

        prop_assert!(result.is_ok(), "{:?}", result);
        if result == Ok(true) {
            prop_assert!(checker.errors().is_empty());
        }
    }
}
