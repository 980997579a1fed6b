use std::fmt::Display;

use serde::Serialize;

use crate::{lexer::tokens::TokenKind, Span};

use super::{
    ast::{CaseId, DeclId, ExprId},
    statements::ConditionItem,
    types::Pattern,
};

#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Dash => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            TokenKind::Percent => BinaryOperator::Rem,
            TokenKind::Equals => BinaryOperator::Eq,
            TokenKind::NotEquals => BinaryOperator::Ne,
            TokenKind::Less => BinaryOperator::Lt,
            TokenKind::LessEquals => BinaryOperator::Le,
            TokenKind::Greater => BinaryOperator::Gt,
            TokenKind::GreaterEquals => BinaryOperator::Ge,
            TokenKind::And => BinaryOperator::And,
            TokenKind::Or => BinaryOperator::Or,
            _ => return None,
        })
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrefixOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Int(i64),
    Str(String),
    Bool(bool),
    Name(String),
    Call {
        callee: ExprId,
        arguments: Vec<ExprId>,
    },
    Binary {
        operator: BinaryOperator,
        left: ExprId,
        right: ExprId,
    },
    Prefix {
        operator: PrefixOperator,
        operand: ExprId,
    },
    Assign {
        assignee: ExprId,
        value: ExprId,
    },
    Tuple(Vec<ExprId>),
    Member {
        base: ExprId,
        member: String,
    },
    Cond {
        condition: Vec<ConditionItem>,
        success: ExprId,
        failure: ExprId,
    },
    Match {
        subject: ExprId,
        cases: Vec<CaseId>,
    },
    /// Packs `witness` into an existential of `traits`. Only created by the type checker.
    Existential {
        witness: ExprId,
        traits: Vec<DeclId>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: ExprId,
    pub span: Span,
}
