use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    ast::ast::{DeclId, ScopeId},
    scope::scoped_program::ScopedProgram,
};

use super::ty::{Substitutions, Type};

/// Generic parameters of a function together with the constraints of its `where` clause.
#[derive(Debug, Clone, Serialize)]
pub struct GenericEnvironment {
    decl: DeclId,
    /// The scope of the function; uses inside it see its parameters as rigid types.
    scope: ScopeId,
    params: Vec<(DeclId, String)>,
    equalities: BTreeMap<DeclId, Type>,
    conformances: BTreeMap<DeclId, Vec<Type>>,
}

impl GenericEnvironment {
    pub fn new(decl: DeclId, scope: ScopeId, params: Vec<(DeclId, String)>) -> Self {
        GenericEnvironment {
            decl,
            scope,
            params,
            equalities: BTreeMap::new(),
            conformances: BTreeMap::new(),
        }
    }

    pub fn decl(&self) -> DeclId {
        self.decl
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn params(&self) -> &[(DeclId, String)] {
        &self.params
    }

    pub fn param_named(&self, name: &str) -> Option<DeclId> {
        self.params
            .iter()
            .find(|(_, n)| n == name)
            .map(|(decl, _)| *decl)
    }

    /// Requires `param` to be `ty`. Fails with a reason if another type was already required.
    pub fn add_equality(&mut self, param: DeclId, ty: Type) -> Result<(), String> {
        match self.equalities.get(&param) {
            Some(existing) if *existing != ty => Err(format!(
                "conflicting requirements `{}` and `{}`",
                existing, ty
            )),
            Some(_) => Ok(()),
            None => {
                self.equalities.insert(param, ty);
                Ok(())
            }
        }
    }

    pub fn add_conformance(&mut self, param: DeclId, trait_: Type) {
        let bounds = self.conformances.entry(param).or_default();
        if !bounds.contains(&trait_) {
            bounds.push(trait_);
        }
    }

    pub fn equality(&self, param: DeclId) -> Option<&Type> {
        self.equalities.get(&param)
    }

    /// The trait types `param` is required to conform to.
    pub fn bounds(&self, param: DeclId) -> &[Type] {
        self.conformances
            .get(&param)
            .map_or(&[], |bounds| bounds.as_slice())
    }

    /// Replaces the generic parameters in `ty` with the types they denote at `use_site`.
    ///
    /// A parameter with an equality requirement becomes the required type. Otherwise it stays
    /// rigid inside the function and becomes a fresh inference variable outside of it.
    pub fn contextualize(
        &self,
        ty: &Type,
        use_site: ScopeId,
        program: &ScopedProgram,
        mut fresh: impl FnMut() -> Type,
    ) -> (Type, Substitutions) {
        let inside = program.is_contained(use_site, self.scope);
        let mut substitutions = Substitutions::new();

        for (decl, name) in &self.params {
            let replacement = match self.equalities.get(decl) {
                Some(concrete) => concrete.clone(),
                None if inside => Type::Param {
                    decl: *decl,
                    name: name.clone(),
                },
                None => fresh(),
            };
            substitutions.insert(*decl, replacement);
        }

        (ty.substitute(&substitutions), substitutions)
    }
}
