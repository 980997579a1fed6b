use serde::Serialize;

use crate::Span;

use super::{
    declarations::{Decl, DeclKind},
    expressions::{Expr, ExprKind, MatchCase},
    statements::{BlockMember, ConditionItem, Stmt, StmtKind},
};

/// Stable identity of a node in an `Ast` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(NodeId);

        impl $name {
            pub fn node(self) -> NodeId {
                self.0
            }
        }

        impl From<$name> for NodeId {
            fn from(id: $name) -> NodeId {
                id.0
            }
        }
    };
}

typed_id!(
    /// A node known to be a declaration.
    DeclId
);
typed_id!(
    /// A node known to be a statement.
    StmtId
);
typed_id!(
    /// A node known to be an expression.
    ExprId
);
typed_id!(
    /// A node known to be a match case.
    CaseId
);
typed_id!(
    /// A node known to introduce a lexical scope.
    ScopeId
);

impl ScopeId {
    /// Returns the scope introduced by `node`, if it introduces one.
    pub fn new(ast: &Ast, node: NodeId) -> Option<ScopeId> {
        ast.is_scope(node).then_some(ScopeId(node))
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Node {
    Decl(Decl),
    Stmt(Stmt),
    Expr(Expr),
    Case(MatchCase),
}

/// Arena holding every node of a program.
///
/// Nodes are never removed. Checking replaces a node by pointing the slot that
/// referenced it at a new node, so ids handed out earlier stay valid.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Ast {
    nodes: Vec<Node>,
    modules: Vec<DeclId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn insert_decl(&mut self, decl: Decl) -> DeclId {
        DeclId(self.push(Node::Decl(decl)))
    }

    pub fn insert_stmt(&mut self, stmt: Stmt) -> StmtId {
        StmtId(self.push(Node::Stmt(stmt)))
    }

    pub fn insert_expr(&mut self, expr: Expr) -> ExprId {
        ExprId(self.push(Node::Expr(expr)))
    }

    pub fn insert_case(&mut self, case: MatchCase) -> CaseId {
        CaseId(self.push(Node::Case(case)))
    }

    /// Registers `decl` as a root of the program.
    pub fn add_module(&mut self, decl: DeclId) {
        self.modules.push(decl);
    }

    pub fn modules(&self) -> &[DeclId] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        match self.node(id.0) {
            Node::Decl(decl) => decl,
            _ => unreachable!("DeclId {:?} names a non-declaration", id),
        }
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        match &mut self.nodes[id.0 .0 as usize] {
            Node::Decl(decl) => decl,
            _ => unreachable!("DeclId {:?} names a non-declaration", id),
        }
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        match self.node(id.0) {
            Node::Stmt(stmt) => stmt,
            _ => unreachable!("StmtId {:?} names a non-statement", id),
        }
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        match &mut self.nodes[id.0 .0 as usize] {
            Node::Stmt(stmt) => stmt,
            _ => unreachable!("StmtId {:?} names a non-statement", id),
        }
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        match self.node(id.0) {
            Node::Expr(expr) => expr,
            _ => unreachable!("ExprId {:?} names a non-expression", id),
        }
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        match &mut self.nodes[id.0 .0 as usize] {
            Node::Expr(expr) => expr,
            _ => unreachable!("ExprId {:?} names a non-expression", id),
        }
    }

    pub fn case(&self, id: CaseId) -> &MatchCase {
        match self.node(id.0) {
            Node::Case(case) => case,
            _ => unreachable!("CaseId {:?} names a non-case", id),
        }
    }

    pub fn case_mut(&mut self, id: CaseId) -> &mut MatchCase {
        match &mut self.nodes[id.0 .0 as usize] {
            Node::Case(case) => case,
            _ => unreachable!("CaseId {:?} names a non-case", id),
        }
    }

    pub fn as_decl(&self, id: NodeId) -> Option<DeclId> {
        matches!(self.node(id), Node::Decl(_)).then_some(DeclId(id))
    }

    pub fn as_stmt(&self, id: NodeId) -> Option<StmtId> {
        matches!(self.node(id), Node::Stmt(_)).then_some(StmtId(id))
    }

    pub fn as_expr(&self, id: NodeId) -> Option<ExprId> {
        matches!(self.node(id), Node::Expr(_)).then_some(ExprId(id))
    }

    pub fn span(&self, id: NodeId) -> &Span {
        match self.node(id) {
            Node::Decl(decl) => &decl.span,
            Node::Stmt(stmt) => &stmt.span,
            Node::Expr(expr) => &expr.span,
            Node::Case(case) => &case.span,
        }
    }

    pub fn is_module(&self, id: NodeId) -> bool {
        matches!(
            self.node(id),
            Node::Decl(Decl {
                kind: DeclKind::Module { .. },
                ..
            })
        )
    }

    /// Whether `id` owns a lexical region.
    pub fn is_scope(&self, id: NodeId) -> bool {
        match self.node(id) {
            Node::Decl(decl) => matches!(
                decl.kind,
                DeclKind::Module { .. }
                    | DeclKind::Fun { .. }
                    | DeclKind::Trait { .. }
                    | DeclKind::Product { .. }
            ),
            Node::Stmt(stmt) => matches!(
                stmt.kind,
                StmtKind::Brace { .. } | StmtKind::Cond { .. } | StmtKind::While { .. }
            ),
            Node::Expr(expr) => matches!(expr.kind, ExprKind::Cond { .. }),
            Node::Case(_) => true,
        }
    }

    /// The direct children of `id`, in traversal order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![];

        match self.node(id) {
            Node::Decl(decl) => match &decl.kind {
                DeclKind::Module { members, .. }
                | DeclKind::Trait { members, .. }
                | DeclKind::Product { members, .. } => {
                    out.extend(members.iter().map(|m| m.node()));
                }
                DeclKind::Fun {
                    generic_params,
                    params,
                    body,
                    ..
                } => {
                    out.extend(generic_params.iter().map(|p| p.node()));
                    out.extend(params.iter().map(|p| p.node()));
                    out.extend(body.map(|b| b.node()));
                }
                DeclKind::Binding {
                    pattern,
                    initializer,
                    ..
                } => {
                    pattern.collect_nodes(&mut out);
                    out.extend(initializer.map(|e| e.node()));
                }
                DeclKind::Param { .. } | DeclKind::GenericParam { .. } | DeclKind::Var { .. } => {}
            },
            Node::Stmt(stmt) => match &stmt.kind {
                StmtKind::Brace { members } => {
                    out.extend(members.iter().map(BlockMember::node));
                }
                StmtKind::Ret { value } => out.extend(value.map(|v| v.node())),
                StmtKind::Cond {
                    condition,
                    success,
                    failure,
                } => {
                    out.extend(condition.iter().map(ConditionItem::node));
                    out.push(success.node());
                    out.extend(failure.map(|f| f.node()));
                }
                StmtKind::While { condition, body } => {
                    out.extend(condition.iter().map(ConditionItem::node));
                    out.push(body.node());
                }
                StmtKind::DoWhile { body, condition } => {
                    out.push(body.node());
                    out.push(condition.node());
                }
            },
            Node::Expr(expr) => match &expr.kind {
                ExprKind::Int(_) | ExprKind::Str(_) | ExprKind::Bool(_) | ExprKind::Name(_) => {}
                ExprKind::Call { callee, arguments } => {
                    out.push(callee.node());
                    out.extend(arguments.iter().map(|a| a.node()));
                }
                ExprKind::Binary { left, right, .. } => {
                    out.push(left.node());
                    out.push(right.node());
                }
                ExprKind::Prefix { operand, .. } => out.push(operand.node()),
                ExprKind::Assign { assignee, value } => {
                    out.push(assignee.node());
                    out.push(value.node());
                }
                ExprKind::Tuple(elements) => out.extend(elements.iter().map(|e| e.node())),
                ExprKind::Member { base, .. } => out.push(base.node()),
                ExprKind::Cond {
                    condition,
                    success,
                    failure,
                } => {
                    out.extend(condition.iter().map(ConditionItem::node));
                    out.push(success.node());
                    out.push(failure.node());
                }
                ExprKind::Match { subject, cases } => {
                    out.push(subject.node());
                    out.extend(cases.iter().map(|c| c.node()));
                }
                ExprKind::Existential { witness, .. } => out.push(witness.node()),
            },
            Node::Case(case) => {
                case.pattern.collect_nodes(&mut out);
                out.push(case.body.node());
            }
        }

        out
    }

    /// Visits `node` and, if the observer asks for it, its subtree.
    pub fn walk<O: AstWalkObserver>(&self, node: NodeId, observer: &mut O) -> Result<(), O::Error> {
        if observer.will_enter(node, self)? {
            self.traverse(node, observer)?;
            observer.will_exit(node, self)?;
        }
        Ok(())
    }

    /// Walks every child of `node`.
    pub fn traverse<O: AstWalkObserver>(
        &self,
        node: NodeId,
        observer: &mut O,
    ) -> Result<(), O::Error> {
        for child in self.children(node) {
            self.walk(child, observer)?;
        }
        Ok(())
    }
}

/// Pre-order traversal hooks.
pub trait AstWalkObserver {
    type Error;

    /// Called before visiting `node`. Returning `false` skips its children and `will_exit`.
    fn will_enter(&mut self, node: NodeId, ast: &Ast) -> Result<bool, Self::Error>;

    fn will_exit(&mut self, _node: NodeId, _ast: &Ast) -> Result<(), Self::Error> {
        Ok(())
    }
}
