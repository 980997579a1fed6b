use std::fmt::Display;

use serde::Serialize;

use crate::Span;

use super::{
    ast::{DeclId, ExprId, NodeId},
    declarations::TraitName,
};

/// A type as written in source.
#[derive(Debug, Clone, Serialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeExprKind {
    Name(String),
    /// The empty tuple is the unit type.
    Tuple(Vec<TypeExpr>),
    /// `any A & B`
    Existential(Vec<TraitName>),
}

impl Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TypeExprKind::Name(name) => write!(f, "{}", name),
            TypeExprKind::Tuple(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", elements.join(", "))
            }
            TypeExprKind::Existential(traits) => {
                let traits: Vec<&str> = traits.iter().map(|t| t.name.as_str()).collect();
                write!(f, "any {}", traits.join(" & "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Pattern {
    /// Introduces the variable declaration it owns.
    Name(DeclId),
    Tuple(Vec<Pattern>),
    Wildcard,
    /// Matches values equal to the expression.
    Expr(ExprId),
}

impl Pattern {
    /// Appends the nodes this pattern owns, in source order.
    pub fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            Pattern::Name(var) => out.push(var.node()),
            Pattern::Tuple(elements) => {
                for element in elements {
                    element.collect_nodes(out);
                }
            }
            Pattern::Wildcard => {}
            Pattern::Expr(expr) => out.push(expr.node()),
        }
    }

    pub fn vars(&self) -> Vec<DeclId> {
        match self {
            Pattern::Name(var) => vec![*var],
            Pattern::Tuple(elements) => elements.iter().flat_map(Pattern::vars).collect(),
            Pattern::Wildcard | Pattern::Expr(_) => vec![],
        }
    }

    pub fn contains_var(&self, var: DeclId) -> bool {
        match self {
            Pattern::Name(v) => *v == var,
            Pattern::Tuple(elements) => elements.iter().any(|e| e.contains_var(var)),
            Pattern::Wildcard | Pattern::Expr(_) => false,
        }
    }
}
