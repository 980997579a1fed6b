use serde::Serialize;
use tracing::debug;

use crate::{
    ast::{ast::{Ast, DeclId}, declarations::DeclKind},
    errors::errors::InternalError,
    Span,
};

use super::ty::Type;

/// Verification state of a conformance.
///
/// `Realized` is the only non-terminal state. Nothing transitions back into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConformanceState {
    /// Declared, requirements not yet matched.
    Realized,
    /// Every requirement has an implementation.
    Checked,
    /// Verification failed and was diagnosed. Must not be consulted for implementations.
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceEntry {
    pub requirement: DeclId,
    pub implementation: DeclId,
}

/// The claim that a product type conforms to a trait.
///
/// The trait is referenced by declaration id; the declaration itself lives in the syntax tree.
#[derive(Debug, Clone, Serialize)]
pub struct TraitConformance {
    trait_decl: DeclId,
    /// Where the conformance is declared. Absent for conformances implied by refinement.
    span: Option<Span>,
    entries: Vec<ConformanceEntry>,
    state: ConformanceState,
}

impl TraitConformance {
    pub fn new(trait_decl: DeclId, span: Option<Span>) -> Self {
        TraitConformance {
            trait_decl,
            span,
            entries: vec![],
            state: ConformanceState::Realized,
        }
    }

    pub fn trait_decl(&self) -> DeclId {
        self.trait_decl
    }

    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    pub fn entries(&self) -> &[ConformanceEntry] {
        &self.entries
    }

    pub fn state(&self) -> ConformanceState {
        self.state
    }

    pub fn is_implicit(&self) -> bool {
        self.span.is_none()
    }

    /// The semantic type of the trait being conformed to.
    pub fn trait_type(&self, ast: &Ast) -> Type {
        Type::Trait {
            decl: self.trait_decl,
            name: ast
                .decl(self.trait_decl)
                .name()
                .map(String::from)
                .unwrap_or_default(),
        }
    }

    /// The function requirements of the trait, in declaration order.
    pub fn requirements(&self, ast: &Ast) -> Vec<DeclId> {
        match &ast.decl(self.trait_decl).kind {
            DeclKind::Trait { members, .. } => members
                .iter()
                .copied()
                .filter(|m| ast.decl(*m).is_fun())
                .collect(),
            _ => vec![],
        }
    }

    fn transition(&mut self, to: ConformanceState) -> Result<(), InternalError> {
        if self.state != ConformanceState::Realized {
            return Err(InternalError::IllegalConformanceTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Records a successful verification. `entries` must name each requirement exactly once.
    pub fn mark_checked(
        &mut self,
        entries: Vec<ConformanceEntry>,
        ast: &Ast,
    ) -> Result<(), InternalError> {
        if self.state != ConformanceState::Realized {
            return Err(InternalError::IllegalConformanceTransition {
                from: self.state,
                to: ConformanceState::Checked,
            });
        }

        let mut expected = self.requirements(ast);
        let mut covered: Vec<DeclId> = entries.iter().map(|e| e.requirement).collect();
        expected.sort();
        covered.sort();
        if expected != covered {
            return Err(InternalError::IncompleteConformance {
                trait_decl: self.trait_decl,
            });
        }

        self.transition(ConformanceState::Checked)?;
        self.entries = entries;
        debug!(trait_decl = ?self.trait_decl, entries = self.entries.len(), "conformance checked");
        Ok(())
    }

    /// Records a failed verification. The failure must already have been diagnosed.
    pub fn mark_invalid(&mut self) -> Result<(), InternalError> {
        self.transition(ConformanceState::Invalid)?;
        debug!(trait_decl = ?self.trait_decl, "conformance invalid");
        Ok(())
    }

    /// The implementation of `requirement`, once the conformance is checked.
    pub fn implementation(&self, requirement: DeclId) -> Option<DeclId> {
        if self.state != ConformanceState::Checked {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.requirement == requirement)
            .map(|e| e.implementation)
    }
}
