use serde::Serialize;

use crate::Span;

use super::ast::{DeclId, ExprId, NodeId, StmtId};

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

/// One slot of a brace block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockMember {
    Decl(DeclId),
    Stmt(StmtId),
    Expr(ExprId),
}

impl BlockMember {
    pub fn node(&self) -> NodeId {
        match self {
            BlockMember::Decl(id) => id.node(),
            BlockMember::Stmt(id) => id.node(),
            BlockMember::Expr(id) => id.node(),
        }
    }
}

/// One clause of an `if`/`while` condition: a boolean test or a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConditionItem {
    Expr(ExprId),
    Decl(DeclId),
}

impl ConditionItem {
    pub fn node(&self) -> NodeId {
        match self {
            ConditionItem::Expr(id) => id.node(),
            ConditionItem::Decl(id) => id.node(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum StmtKind {
    Brace {
        members: Vec<BlockMember>,
    },
    Ret {
        value: Option<ExprId>,
    },
    Cond {
        condition: Vec<ConditionItem>,
        success: StmtId,
        failure: Option<StmtId>,
    },
    While {
        condition: Vec<ConditionItem>,
        body: StmtId,
    },
    DoWhile {
        body: StmtId,
        condition: ExprId,
    },
}
