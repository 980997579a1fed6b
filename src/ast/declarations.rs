use serde::Serialize;

use crate::Span;

use super::{
    ast::{DeclId, ExprId, StmtId},
    types::{Pattern, TypeExpr},
};

#[derive(Debug, Clone, Serialize)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Introducer {
    Let,
    Var,
}

/// A trait named in a refinement list, conformance list or bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitName {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum WhereRequirement {
    /// `T == Int`
    Equality {
        param: String,
        ty: TypeExpr,
        span: Span,
    },
    /// `T: Shape & Named`
    Conformance {
        param: String,
        traits: Vec<TraitName>,
        span: Span,
    },
}

impl WhereRequirement {
    pub fn param(&self) -> &str {
        match self {
            WhereRequirement::Equality { param, .. }
            | WhereRequirement::Conformance { param, .. } => param,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            WhereRequirement::Equality { span, .. }
            | WhereRequirement::Conformance { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum DeclKind {
    Module {
        name: String,
        members: Vec<DeclId>,
    },
    Fun {
        name: String,
        generic_params: Vec<DeclId>,
        params: Vec<DeclId>,
        output: Option<TypeExpr>,
        where_clause: Vec<WhereRequirement>,
        /// Absent for trait requirements.
        body: Option<StmtId>,
    },
    Param {
        name: String,
        annotation: TypeExpr,
    },
    GenericParam {
        name: String,
    },
    /// `let`/`var` introducing every variable of its pattern at once.
    Binding {
        introducer: Introducer,
        pattern: Pattern,
        annotation: Option<TypeExpr>,
        initializer: Option<ExprId>,
    },
    Var {
        name: String,
    },
    Trait {
        name: String,
        refinements: Vec<TraitName>,
        members: Vec<DeclId>,
    },
    Product {
        name: String,
        conformances: Vec<TraitName>,
        members: Vec<DeclId>,
    },
}

impl Decl {
    pub fn new(kind: DeclKind, span: Span) -> Self {
        Decl { kind, span }
    }

    /// The name this declaration introduces, if any. Bindings introduce names through their
    /// variables instead.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Module { name, .. }
            | DeclKind::Fun { name, .. }
            | DeclKind::Param { name, .. }
            | DeclKind::GenericParam { name }
            | DeclKind::Var { name }
            | DeclKind::Trait { name, .. }
            | DeclKind::Product { name, .. } => Some(name),
            DeclKind::Binding { .. } => None,
        }
    }

    pub fn is_fun(&self) -> bool {
        matches!(self.kind, DeclKind::Fun { .. })
    }

    pub fn is_binding(&self) -> bool {
        matches!(self.kind, DeclKind::Binding { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DeclKind::Module { .. } => "module",
            DeclKind::Fun { .. } => "function",
            DeclKind::Param { .. } => "parameter",
            DeclKind::GenericParam { .. } => "generic parameter",
            DeclKind::Binding { .. } => "binding",
            DeclKind::Var { .. } => "variable",
            DeclKind::Trait { .. } => "trait",
            DeclKind::Product { .. } => "type",
        }
    }
}
