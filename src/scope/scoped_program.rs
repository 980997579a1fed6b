use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    ast::{
        ast::{Ast, AstWalkObserver, DeclId, NodeId, ScopeId},
        declarations::DeclKind,
        expressions::ExprKind,
        statements::{ConditionItem, StmtKind},
    },
    errors::errors::InternalError,
};

/// A syntax tree together with its lexical scope structure.
///
/// Built in a single traversal by `ScopedProgram::new`. Later phases only add to it, through
/// `register_synthesized` and slot replacement in the tree.
#[derive(Debug, Clone, Serialize)]
pub struct ScopedProgram {
    ast: Ast,
    /// Innermost enclosing scope of every node except modules.
    node_to_scope: BTreeMap<NodeId, ScopeId>,
    /// Declarations directly owned by each scope, in textual order.
    scope_to_decls: BTreeMap<ScopeId, Vec<DeclId>>,
    /// Binding declaration introducing each variable declared under one.
    var_to_binding: BTreeMap<DeclId, DeclId>,
}

impl ScopedProgram {
    pub fn new(ast: Ast) -> Result<Self, InternalError> {
        let mut visitor = ScopeVisitor::default();

        for module in ast.modules() {
            ast.walk(module.node(), &mut visitor)?;
        }

        debug!(
            nodes = ast.len(),
            scopes = visitor.scope_to_decls.len(),
            "built scope tree"
        );

        Ok(ScopedProgram {
            ast,
            node_to_scope: visitor.node_to_scope,
            scope_to_decls: visitor.scope_to_decls,
            var_to_binding: visitor.var_to_binding,
        })
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn ast_mut(&mut self) -> &mut Ast {
        &mut self.ast
    }

    /// The innermost scope containing `node`; `None` for modules.
    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.node_to_scope.get(&node).copied()
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scope_of(scope.node())
    }

    /// Declarations directly owned by `scope`, in textual order.
    pub fn decls(&self, scope: ScopeId) -> &[DeclId] {
        self.scope_to_decls
            .get(&scope)
            .map_or(&[], |decls| decls.as_slice())
    }

    /// The binding declaration that introduced `var`.
    ///
    /// Variables bound by match case patterns are recorded against the innermost binding
    /// that was open when they were visited, or not at all. Consumers that need the owning
    /// binding of such a variable must check that the binding's pattern contains it.
    pub fn binding_of(&self, var: DeclId) -> Option<DeclId> {
        self.var_to_binding.get(&var).copied()
    }

    /// `scope` followed by each of its ancestors, innermost first.
    pub fn scopes_from(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |s| self.parent(*s))
    }

    /// Whether `scope` is `ancestor` or nested inside it.
    pub fn is_contained(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        self.scopes_from(scope).any(|s| s == ancestor)
    }

    /// The innermost function whose scope contains `scope`.
    pub fn innermost_function(&self, scope: ScopeId) -> Option<DeclId> {
        self.scopes_from(scope)
            .filter_map(|s| self.ast.as_decl(s.node()))
            .find(|d| self.ast.decl(*d).is_fun())
    }

    /// The declarations named `name` in the innermost scope around `from` that declares it.
    pub fn lookup(&self, name: &str, from: ScopeId) -> Vec<DeclId> {
        self.lookup_where(name, from, |_, _| true)
    }

    /// Like `lookup`, ignoring declarations rejected by `visible`.
    pub fn lookup_where(
        &self,
        name: &str,
        from: ScopeId,
        visible: impl Fn(ScopeId, DeclId) -> bool,
    ) -> Vec<DeclId> {
        for scope in self.scopes_from(from) {
            let found: Vec<DeclId> = self
                .decls(scope)
                .iter()
                .copied()
                .filter(|d| self.ast.decl(*d).name() == Some(name) && visible(scope, *d))
                .collect();

            if !found.is_empty() {
                return found;
            }
        }

        vec![]
    }

    /// Records a node created during checking as belonging to `scope`.
    pub fn register_synthesized(&mut self, node: NodeId, scope: ScopeId) {
        trace!(?node, ?scope, "registered synthesized node");
        self.node_to_scope.insert(node, scope);
    }

    pub fn node_count_with_scope(&self) -> usize {
        self.node_to_scope.len()
    }
}

/// Stack of the binding declarations currently being walked.
#[derive(Debug, Default)]
pub(crate) struct BindingStack(Vec<DeclId>);

impl BindingStack {
    pub(crate) fn push(&mut self, binding: DeclId) {
        self.0.push(binding);
    }

    pub(crate) fn top(&self) -> Option<DeclId> {
        self.0.last().copied()
    }

    /// Pops the top binding, which must be `expected`.
    pub(crate) fn pop_expecting(&mut self, expected: DeclId) -> Result<(), InternalError> {
        match self.0.pop() {
            Some(found) if found == expected => Ok(()),
            found => Err(InternalError::MismatchedBindingExit { expected, found }),
        }
    }
}

#[derive(Debug, Default)]
struct ScopeVisitor {
    node_to_scope: BTreeMap<NodeId, ScopeId>,
    scope_to_decls: BTreeMap<ScopeId, Vec<DeclId>>,
    var_to_binding: BTreeMap<DeclId, DeclId>,
    bindings: BindingStack,
    innermost: Option<ScopeId>,
}

impl ScopeVisitor {
    /// Records `node` as contained in the innermost scope.
    fn insert(&mut self, node: NodeId, ast: &Ast) -> Result<ScopeId, InternalError> {
        let scope = self.innermost.ok_or(InternalError::OrphanNode(node))?;

        self.node_to_scope.insert(node, scope);
        if let Some(decl) = ast.as_decl(node) {
            self.scope_to_decls.entry(scope).or_default().push(decl);
        }

        trace!(?node, ?scope, "registered node");
        Ok(scope)
    }

    fn enter_scope(&mut self, node: NodeId, ast: &Ast) {
        self.innermost = ScopeId::new(ast, node);
        if let Some(scope) = self.innermost {
            self.scope_to_decls.entry(scope).or_default();
        }
    }

    fn walk_condition(
        &mut self,
        condition: &[ConditionItem],
        ast: &Ast,
    ) -> Result<(), InternalError> {
        for item in condition {
            ast.walk(item.node(), self)?;
        }
        Ok(())
    }

    /// Condition and success branch inside the conditional's scope, failure branch outside.
    fn visit_conditional(
        &mut self,
        node: NodeId,
        enclosing: ScopeId,
        condition: &[ConditionItem],
        success: NodeId,
        failure: Option<NodeId>,
        ast: &Ast,
    ) -> Result<(), InternalError> {
        self.enter_scope(node, ast);
        self.walk_condition(condition, ast)?;
        ast.walk(success, self)?;

        self.innermost = Some(enclosing);
        if let Some(failure) = failure {
            ast.walk(failure, self)?;
        }
        Ok(())
    }

    /// The body is a scope as usual, but the condition is walked inside it.
    fn visit_do_while(
        &mut self,
        node: NodeId,
        enclosing: ScopeId,
        body: NodeId,
        condition: NodeId,
        ast: &Ast,
    ) -> Result<(), InternalError> {
        let body_members = match ast.as_stmt(body).map(|b| &ast.stmt(b).kind) {
            Some(StmtKind::Brace { .. }) => ast.children(body),
            _ => {
                return Err(InternalError::MalformedTree {
                    node,
                    reason: String::from("do/while body is not a brace statement"),
                })
            }
        };

        self.insert(body, ast)?;
        self.enter_scope(body, ast);
        for member in body_members {
            ast.walk(member, self)?;
        }
        ast.walk(condition, self)?;

        self.innermost = Some(enclosing);
        Ok(())
    }
}

impl AstWalkObserver for ScopeVisitor {
    type Error = InternalError;

    fn will_enter(&mut self, node: NodeId, ast: &Ast) -> Result<bool, InternalError> {
        if ast.is_module(node) {
            if self.innermost.is_some() {
                return Err(InternalError::NestedModule(node));
            }
            debug!(?node, "entering module");
            self.enter_scope(node, ast);
            return Ok(true);
        }

        let enclosing = self.insert(node, ast)?;

        if let Some(decl) = ast.as_decl(node) {
            match &ast.decl(decl).kind {
                DeclKind::Binding { .. } => {
                    self.bindings.push(decl);
                    ast.traverse(node, self)?;
                    self.bindings.pop_expecting(decl)?;
                    return Ok(false);
                }
                DeclKind::Var { .. } => {
                    if let Some(binding) = self.bindings.top() {
                        self.var_to_binding.entry(decl).or_insert(binding);
                    }
                    return Ok(true);
                }
                _ => {}
            }
        }

        if let Some(stmt) = ast.as_stmt(node) {
            match &ast.stmt(stmt).kind {
                StmtKind::Cond {
                    condition,
                    success,
                    failure,
                } => {
                    self.visit_conditional(
                        node,
                        enclosing,
                        condition,
                        success.node(),
                        failure.map(|f| f.node()),
                        ast,
                    )?;
                    return Ok(false);
                }
                StmtKind::DoWhile { body, condition } => {
                    self.visit_do_while(node, enclosing, body.node(), condition.node(), ast)?;
                    return Ok(false);
                }
                _ => {}
            }
        }

        if let Some(expr) = ast.as_expr(node) {
            if let ExprKind::Cond {
                condition,
                success,
                failure,
            } = &ast.expr(expr).kind
            {
                self.visit_conditional(
                    node,
                    enclosing,
                    condition,
                    success.node(),
                    Some(failure.node()),
                    ast,
                )?;
                return Ok(false);
            }
        }

        if ast.is_scope(node) {
            self.enter_scope(node, ast);
        }

        Ok(true)
    }

    fn will_exit(&mut self, node: NodeId, ast: &Ast) -> Result<(), InternalError> {
        if ast.is_module(node) {
            self.innermost = None;
        } else if ast.is_scope(node) {
            self.innermost = self.node_to_scope.get(&node).copied();
        }
        Ok(())
    }
}
