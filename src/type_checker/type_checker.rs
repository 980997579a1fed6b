use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    ast::{
        ast::{CaseId, DeclId, ExprId, NodeId, ScopeId},
        declarations::{DeclKind, Introducer, TraitName, WhereRequirement},
        expressions::{BinaryOperator, Expr, ExprKind, PrefixOperator},
        statements::ConditionItem,
        types::{Pattern, TypeExpr, TypeExprKind},
    },
    config::{Config, FreeTypeVarBindingPolicy},
    errors::errors::{Error, ErrorImpl, InternalError},
    scope::scoped_program::ScopedProgram,
};

use super::{
    conformance::{ConformanceEntry, ConformanceState, TraitConformance},
    generic_env::GenericEnvironment,
    stmt_checker::{CheckContext, CheckedExpr, ReturnRecord, StmtChecker},
    ty::{FunType, Substitutions, Type, TypeVars},
};

fn resolve_all<K: Ord>(vars: &TypeVars, types: BTreeMap<K, Type>) -> BTreeMap<K, Type> {
    types
        .into_iter()
        .map(|(id, ty)| (id, vars.resolve(&ty)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mismatch {
    Value,
    Argument,
}

/// Declaration and expression checker for a whole scoped program.
///
/// Declarations are realized lazily, so they may be used before the point where they are
/// checked. Diagnostics are collected and checking always runs to completion unless an internal
/// error is found.
#[derive(Debug)]
pub struct TypeChecker {
    program: ScopedProgram,
    config: Config,
    vars: TypeVars,
    decl_types: BTreeMap<DeclId, Type>,
    expr_types: BTreeMap<ExprId, Type>,
    signatures: BTreeMap<DeclId, FunType>,
    checked_decls: BTreeMap<DeclId, bool>,
    /// Bindings whose initializer is being checked.
    in_progress: BTreeSet<DeclId>,
    conformances: BTreeMap<DeclId, Vec<TraitConformance>>,
    returns: BTreeMap<DeclId, Vec<ReturnRecord>>,
    generic_envs: BTreeMap<DeclId, Option<GenericEnvironment>>,
    errors: Vec<Error>,
}

/// Everything checking produced, with inference variables resolved.
#[derive(Debug, Serialize)]
pub struct CheckedProgram {
    pub program: ScopedProgram,
    pub decl_types: BTreeMap<DeclId, Type>,
    pub expr_types: BTreeMap<ExprId, Type>,
    pub returns: BTreeMap<DeclId, Vec<ReturnRecord>>,
    pub conformances: BTreeMap<DeclId, Vec<TraitConformance>>,
    #[serde(skip)]
    pub errors: Vec<Error>,
}

impl TypeChecker {
    pub fn new(program: ScopedProgram, config: Config) -> Self {
        TypeChecker {
            program,
            config,
            vars: TypeVars::default(),
            decl_types: BTreeMap::new(),
            expr_types: BTreeMap::new(),
            signatures: BTreeMap::new(),
            checked_decls: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            conformances: BTreeMap::new(),
            returns: BTreeMap::new(),
            generic_envs: BTreeMap::new(),
            errors: vec![],
        }
    }

    /// Checks every module. Returns whether the program is free of type errors.
    pub fn check_program(&mut self) -> Result<bool, InternalError> {
        let modules = self.program.ast().modules().to_vec();
        let mut success = true;

        for module in modules {
            success &= self.check_declaration(module)?;
        }

        debug!(success, errors = self.errors.len(), "type checking finished");
        Ok(success && self.errors.is_empty())
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn decl_type(&self, decl: DeclId) -> Option<Type> {
        self.decl_types.get(&decl).map(|ty| self.vars.resolve(ty))
    }

    pub fn expr_type(&self, expr: ExprId) -> Option<Type> {
        self.expr_types.get(&expr).map(|ty| self.vars.resolve(ty))
    }

    /// Return statements of `fun`, in the order they were checked.
    pub fn returns(&self, fun: DeclId) -> &[ReturnRecord] {
        self.returns.get(&fun).map_or(&[], |records| records.as_slice())
    }

    pub fn conformances(&self, product: DeclId) -> &[TraitConformance] {
        self.conformances
            .get(&product)
            .map_or(&[], |conformances| conformances.as_slice())
    }

    pub fn finish(self) -> CheckedProgram {
        CheckedProgram {
            decl_types: resolve_all(&self.vars, self.decl_types),
            expr_types: resolve_all(&self.vars, self.expr_types),
            program: self.program,
            returns: self.returns,
            conformances: self.conformances,
            errors: self.errors,
        }
    }

    fn error_at(&mut self, error: ErrorImpl, node: NodeId) {
        let position = self.program.ast().span(node).start.clone();
        trace!(?node, %error, "reporting error");
        self.errors.push(Error::new(error, position));
    }

    fn enclosing_scope(&self, node: NodeId) -> Result<ScopeId, InternalError> {
        self.program
            .scope_of(node)
            .ok_or(InternalError::OrphanNode(node))
    }

    fn own_scope(&self, node: NodeId) -> Result<ScopeId, InternalError> {
        ScopeId::new(self.program.ast(), node).ok_or_else(|| InternalError::MalformedTree {
            node,
            reason: String::from("expected a scope"),
        })
    }

    fn decl_name(&self, decl: DeclId) -> String {
        self.program
            .ast()
            .decl(decl)
            .name()
            .map(String::from)
            .unwrap_or_else(|| String::from("_"))
    }

    fn check_declaration(&mut self, decl: DeclId) -> Result<bool, InternalError> {
        if let Some(success) = self.checked_decls.get(&decl) {
            return Ok(*success);
        }
        self.checked_decls.insert(decl, true);

        let kind = self.program.ast().decl(decl).kind.clone();
        let success = match kind {
            DeclKind::Module { name, members } => {
                debug!(module = %name, members = members.len(), "checking module");
                let mut success = true;
                for member in members {
                    success &= self.check_declaration(member)?;
                }
                success
            }
            DeclKind::Fun { .. } => self.check_fun(decl)?,
            DeclKind::Param { .. } | DeclKind::Binding { .. } | DeclKind::Var { .. } => {
                !self.realize(decl)?.has_errors()
            }
            DeclKind::GenericParam { .. } => true,
            DeclKind::Trait {
                refinements,
                members,
                ..
            } => {
                let scope = self.enclosing_scope(decl.node())?;
                let mut success = true;
                for refinement in &refinements {
                    success &= self.resolve_trait(refinement, scope).is_some();
                }
                for member in members {
                    success &= self.check_declaration(member)?;
                }
                success
            }
            DeclKind::Product { members, .. } => {
                let mut success = self.check_conformances(decl)?;
                for member in members {
                    success &= self.check_declaration(member)?;
                }
                success
            }
        };

        self.checked_decls.insert(decl, success);
        Ok(success)
    }

    fn check_fun(&mut self, fun: DeclId) -> Result<bool, InternalError> {
        let DeclKind::Fun {
            name,
            generic_params,
            where_clause,
            body,
            ..
        } = self.program.ast().decl(fun).kind.clone()
        else {
            return Err(InternalError::MalformedTree {
                node: fun.node(),
                reason: String::from("expected a function"),
            });
        };

        let signature = self.realize_signature(fun)?;
        let mut success = !Type::Fun(signature).has_errors();

        if !generic_params.is_empty() || !where_clause.is_empty() {
            success &= self.generic_env(fun).is_some();
        }

        if let Some(body) = body {
            debug!(function = %name, "checking function body");
            let mut checker =
                StmtChecker::new(self.own_scope(fun.node())?, self.config.free_var_binding_policy)
                    .diagnosing_missing_return_values(self.config.diagnose_missing_return_values);
            success &= checker.check(body, self)?;
            self.returns
                .entry(fun)
                .or_default()
                .extend(checker.into_ret_stmts());
        }

        Ok(success)
    }

    /// The semantic type of a declaration, computing it on first use.
    fn realize(&mut self, decl: DeclId) -> Result<Type, InternalError> {
        if let Some(ty) = self.decl_types.get(&decl) {
            return Ok(ty.clone());
        }

        let kind = self.program.ast().decl(decl).kind.clone();
        let ty = match kind {
            DeclKind::Fun { .. } => Type::Fun(self.realize_signature(decl)?),
            DeclKind::Param { annotation, .. } => {
                let scope = self.enclosing_scope(decl.node())?;
                self.resolve_type_expr(&annotation, scope)
            }
            DeclKind::GenericParam { name } => Type::Param { decl, name },
            DeclKind::Binding { .. } => return self.realize_binding(decl),
            DeclKind::Var { .. } => return self.realize_var(decl),
            DeclKind::Trait { name, .. } => Type::Trait { decl, name },
            DeclKind::Product { name, .. } => Type::Product { decl, name },
            DeclKind::Module { .. } => Type::Error,
        };

        self.decl_types.insert(decl, ty.clone());
        Ok(ty)
    }

    fn realize_signature(&mut self, fun: DeclId) -> Result<FunType, InternalError> {
        if let Some(signature) = self.signatures.get(&fun) {
            return Ok(signature.clone());
        }

        let DeclKind::Fun {
            name,
            params,
            output,
            ..
        } = self.program.ast().decl(fun).kind.clone()
        else {
            return Err(InternalError::MalformedTree {
                node: fun.node(),
                reason: String::from("expected a function"),
            });
        };

        let scope = self.own_scope(fun.node())?;
        let mut param_types = vec![];
        for param in params {
            param_types.push(self.realize(param)?);
        }
        let output = match output {
            Some(output) => self.resolve_type_expr(&output, scope),
            None => Type::unit(),
        };

        let signature = FunType::new(param_types, output);
        debug!(function = %name, signature = %Type::Fun(signature.clone()), "realized signature");
        self.signatures.insert(fun, signature.clone());
        Ok(signature)
    }

    /// The binding whose pattern introduces `var`, if any.
    fn owning_binding(&self, var: DeclId) -> Option<DeclId> {
        let ast = self.program.ast();
        self.program.binding_of(var).filter(|binding| {
            matches!(&ast.decl(*binding).kind, DeclKind::Binding { pattern, .. } if pattern.contains_var(var))
        })
    }

    fn realize_var(&mut self, var: DeclId) -> Result<Type, InternalError> {
        if let Some(ty) = self.decl_types.get(&var) {
            return Ok(ty.clone());
        }
        if let Some(binding) = self.owning_binding(var) {
            self.realize_binding(binding)?;
        }
        // Match case variables are typed when their case is checked.
        Ok(self.decl_types.get(&var).cloned().unwrap_or(Type::Error))
    }

    fn realize_binding(&mut self, binding: DeclId) -> Result<Type, InternalError> {
        if let Some(ty) = self.decl_types.get(&binding) {
            return Ok(ty.clone());
        }

        let DeclKind::Binding {
            pattern,
            annotation,
            initializer,
            ..
        } = self.program.ast().decl(binding).kind.clone()
        else {
            return Err(InternalError::MalformedTree {
                node: binding.node(),
                reason: String::from("expected a binding"),
            });
        };

        if !self.in_progress.insert(binding) {
            let name = pattern
                .vars()
                .first()
                .map(|var| self.decl_name(*var))
                .unwrap_or_else(|| String::from("_"));
            self.error_at(ErrorImpl::CircularReference { name }, binding.node());
            return Ok(Type::Error);
        }

        let scope = self.enclosing_scope(binding.node())?;
        let policy = self.config.free_var_binding_policy;
        let mut success = true;

        let ty = match (annotation, initializer) {
            (Some(annotation), initializer) => {
                let ty = self.resolve_type_expr(&annotation, scope);
                if let Some(initializer) = initializer {
                    let checked = self.check_expression(initializer, Some(&ty), scope, policy)?;
                    self.replace_initializer(binding, checked.expr);
                    success &= !checked.ty.has_errors();
                }
                ty
            }
            (None, Some(initializer)) => {
                let checked = self.check_expression(initializer, None, scope, policy)?;
                self.replace_initializer(binding, checked.expr);
                checked.ty
            }
            (None, None) => {
                self.error_at(ErrorImpl::ExpectedExplicitValue, binding.node());
                Type::Error
            }
        };

        success &= self.bind_pattern(&pattern, &ty, scope, binding.node())?;
        self.in_progress.remove(&binding);

        let ty = if success { ty } else { Type::Error };
        self.decl_types.insert(binding, ty.clone());
        Ok(ty)
    }

    fn replace_initializer(&mut self, binding: DeclId, expr: ExprId) {
        if let DeclKind::Binding { initializer, .. } =
            &mut self.program.ast_mut().decl_mut(binding).kind
        {
            *initializer = Some(expr);
        }
    }

    /// Types the variables of `pattern` by destructuring `ty`.
    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        ty: &Type,
        scope: ScopeId,
        at: NodeId,
    ) -> Result<bool, InternalError> {
        match pattern {
            Pattern::Name(var) => {
                self.decl_types.insert(*var, ty.clone());
                Ok(true)
            }
            Pattern::Wildcard => Ok(true),
            Pattern::Expr(expr) => {
                let (_, checked) = self.coerce_expr(*expr, ty, scope, Mismatch::Value)?;
                Ok(!checked.has_errors())
            }
            Pattern::Tuple(elements) => {
                let resolved = self.vars.resolve(ty);
                let element_types = match &resolved {
                    Type::Tuple(types) if types.len() == elements.len() => types.clone(),
                    Type::Var(_) => {
                        let fresh: Vec<Type> = elements.iter().map(|_| self.vars.fresh()).collect();
                        self.vars.unify(&resolved, &Type::Tuple(fresh.clone()));
                        fresh
                    }
                    Type::Error => vec![Type::Error; elements.len()],
                    other => {
                        let type_ = other.to_string();
                        self.error_at(ErrorImpl::PatternMismatch { type_ }, at);
                        for var in pattern.vars() {
                            self.decl_types.insert(var, Type::Error);
                        }
                        return Ok(false);
                    }
                };

                let mut success = true;
                for (element, element_ty) in elements.iter().zip(&element_types) {
                    success &= self.bind_pattern(element, element_ty, scope, at)?;
                }
                Ok(success)
            }
        }
    }

    fn lookup_trait(&self, name: &str, scope: ScopeId) -> Option<DeclId> {
        let ast = self.program.ast();
        self.program
            .lookup(name, scope)
            .last()
            .copied()
            .filter(|decl| matches!(ast.decl(*decl).kind, DeclKind::Trait { .. }))
    }

    fn resolve_trait(&mut self, name: &TraitName, scope: ScopeId) -> Option<DeclId> {
        let found = self.lookup_trait(&name.name, scope);
        if found.is_none() {
            self.errors.push(Error::new(
                ErrorImpl::UnknownTrait {
                    name: name.name.clone(),
                },
                name.span.start.clone(),
            ));
        }
        found
    }

    fn resolve_type_expr(&mut self, type_expr: &TypeExpr, scope: ScopeId) -> Type {
        match &type_expr.kind {
            TypeExprKind::Name(name) => {
                let ast = self.program.ast();
                let declared = self.program.lookup(name, scope).last().and_then(|decl| {
                    match &ast.decl(*decl).kind {
                        DeclKind::GenericParam { name } => Some(Type::Param {
                            decl: *decl,
                            name: name.clone(),
                        }),
                        DeclKind::Product { name, .. } => Some(Type::Product {
                            decl: *decl,
                            name: name.clone(),
                        }),
                        _ => None,
                    }
                });
                if let Some(ty) = declared {
                    return ty;
                }

                match name.as_str() {
                    "Int" => Type::Int,
                    "Bool" => Type::Bool,
                    "String" => Type::String,
                    _ => {
                        self.errors.push(Error::new(
                            ErrorImpl::UnknownType {
                                type_: name.clone(),
                            },
                            type_expr.span.start.clone(),
                        ));
                        Type::Error
                    }
                }
            }
            TypeExprKind::Tuple(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|e| self.resolve_type_expr(e, scope))
                    .collect(),
            ),
            TypeExprKind::Existential(traits) => {
                let mut types = vec![];
                for trait_name in traits {
                    match self.resolve_trait(trait_name, scope) {
                        Some(decl) => types.push(Type::Trait {
                            decl,
                            name: trait_name.name.clone(),
                        }),
                        None => return Type::Error,
                    }
                }
                Type::Existential { traits: types }
            }
        }
    }

    /// Whether `decl`, found in `scope`, is visible to a use starting at `use_start`.
    ///
    /// Declarations in modules, functions, traits and types are visible throughout. Local
    /// variables become visible after the binding that introduces them.
    fn is_visible(&self, scope: ScopeId, decl: DeclId, use_start: u32) -> bool {
        let ast = self.program.ast();
        if ast.as_decl(scope.node()).is_some() {
            return true;
        }
        if !matches!(ast.decl(decl).kind, DeclKind::Var { .. }) {
            return true;
        }
        let introducer = self.owning_binding(decl).unwrap_or(decl);
        ast.decl(introducer).span.end.0 <= use_start
    }

    fn lookup_value(&self, expr: ExprId, name: &str, use_site: ScopeId) -> Option<DeclId> {
        let scope = self.program.scope_of(expr.node()).unwrap_or(use_site);
        let start = self.program.ast().expr(expr).span.start.0;
        self.program
            .lookup_where(name, scope, |s, d| self.is_visible(s, d, start))
            .last()
            .copied()
    }

    /// The generic environment of `fun`, diagnosed once if it cannot be prepared.
    fn generic_env(&mut self, fun: DeclId) -> Option<GenericEnvironment> {
        if let Some(env) = self.generic_envs.get(&fun) {
            return env.clone();
        }

        let env = match self.build_generic_env(fun) {
            Ok(env) => Some(env),
            Err(reason) => {
                let function = self.decl_name(fun);
                self.error_at(
                    ErrorImpl::InvalidGenericEnvironment { function, reason },
                    fun.node(),
                );
                None
            }
        };
        self.generic_envs.insert(fun, env.clone());
        env
    }

    fn build_generic_env(&mut self, fun: DeclId) -> Result<GenericEnvironment, String> {
        let DeclKind::Fun {
            generic_params,
            where_clause,
            ..
        } = self.program.ast().decl(fun).kind.clone()
        else {
            return Err(String::from("not a function"));
        };
        let scope = ScopeId::new(self.program.ast(), fun.node())
            .ok_or_else(|| String::from("function has no scope"))?;

        let params = generic_params
            .iter()
            .map(|param| (*param, self.decl_name(*param)))
            .collect();
        let mut env = GenericEnvironment::new(fun, scope, params);

        for requirement in &where_clause {
            let param = env.param_named(requirement.param()).ok_or_else(|| {
                format!("`{}` is not a generic parameter", requirement.param())
            })?;

            match requirement {
                WhereRequirement::Equality { ty, .. } => {
                    let ty = self.resolve_type_expr(ty, scope);
                    env.add_equality(param, ty)?;
                }
                WhereRequirement::Conformance { traits, .. } => {
                    for trait_name in traits {
                        let decl = self
                            .lookup_trait(&trait_name.name, scope)
                            .ok_or_else(|| format!("`{}` is not a trait", trait_name.name))?;
                        env.add_conformance(
                            param,
                            Type::Trait {
                                decl,
                                name: trait_name.name.clone(),
                            },
                        );
                    }
                }
            }
        }

        debug!(function = ?fun, params = env.params().len(), "prepared generic environment");
        Ok(env)
    }

    fn contextualize_type(
        &mut self,
        env: &GenericEnvironment,
        ty: &Type,
        use_site: ScopeId,
    ) -> (Type, Substitutions) {
        env.contextualize(ty, use_site, &self.program, || self.vars.fresh())
    }

    /// Creates the conformances a product declares, plus those implied by refinement.
    fn ensure_conformances(&mut self, product: DeclId) -> Result<(), InternalError> {
        if self.conformances.contains_key(&product) {
            return Ok(());
        }
        let DeclKind::Product {
            conformances: names,
            ..
        } = self.program.ast().decl(product).kind.clone()
        else {
            return Ok(());
        };
        let scope = self.enclosing_scope(product.node())?;

        let mut conformances: Vec<TraitConformance> = vec![];
        let mut pending = vec![];
        for name in &names {
            if let Some(trait_decl) = self.resolve_trait(name, scope) {
                if !conformances.iter().any(|c| c.trait_decl() == trait_decl) {
                    conformances.push(TraitConformance::new(trait_decl, Some(name.span.clone())));
                    pending.push(trait_decl);
                }
            }
        }

        while let Some(trait_decl) = pending.pop() {
            let DeclKind::Trait { refinements, .. } =
                self.program.ast().decl(trait_decl).kind.clone()
            else {
                continue;
            };
            let trait_scope = self.enclosing_scope(trait_decl.node())?;
            for refinement in &refinements {
                if let Some(base) = self.lookup_trait(&refinement.name, trait_scope) {
                    if !conformances.iter().any(|c| c.trait_decl() == base) {
                        conformances.push(TraitConformance::new(base, None));
                        pending.push(base);
                    }
                }
            }
        }

        debug!(product = ?product, count = conformances.len(), "realized conformances");
        self.conformances.insert(product, conformances);
        Ok(())
    }

    /// Verifies every unverified conformance of `product`. Returns whether none is invalid.
    fn check_conformances(&mut self, product: DeclId) -> Result<bool, InternalError> {
        self.ensure_conformances(product)?;

        let mut conformances = self.conformances.remove(&product).unwrap_or_default();
        let mut result = Ok(());
        for conformance in conformances
            .iter_mut()
            .filter(|c| c.state() == ConformanceState::Realized)
        {
            result = self.verify_conformance(product, conformance);
            if result.is_err() {
                break;
            }
        }
        let success = conformances
            .iter()
            .all(|c| c.state() != ConformanceState::Invalid);
        self.conformances.insert(product, conformances);

        result.map(|_| success)
    }

    fn verify_conformance(
        &mut self,
        product: DeclId,
        conformance: &mut TraitConformance,
    ) -> Result<(), InternalError> {
        let members = match &self.program.ast().decl(product).kind {
            DeclKind::Product { members, .. } => members.clone(),
            _ => vec![],
        };

        let mut entries = vec![];
        let mut missing = vec![];
        for requirement in conformance.requirements(self.program.ast()) {
            let name = self.decl_name(requirement);
            let required = self.realize_signature(requirement)?;

            let mut implementation = None;
            for member in &members {
                if !self.program.ast().decl(*member).is_fun() || self.decl_name(*member) != name {
                    continue;
                }
                if self.realize_signature(*member)? == required {
                    implementation = Some(*member);
                    break;
                }
            }

            match implementation {
                Some(implementation) => entries.push(ConformanceEntry {
                    requirement,
                    implementation,
                }),
                None => missing.push(name),
            }
        }

        if missing.is_empty() {
            return conformance.mark_checked(entries, self.program.ast());
        }

        let position = match conformance.span() {
            Some(span) => span.start.clone(),
            None => self.program.ast().decl(product).span.start.clone(),
        };
        let type_ = self.decl_name(product);
        let trait_ = conformance.trait_type(self.program.ast()).to_string();
        for requirement in missing {
            self.errors.push(Error::new(
                ErrorImpl::NonConformingType {
                    type_: type_.clone(),
                    trait_: trait_.clone(),
                    requirement,
                },
                position.clone(),
            ));
        }
        conformance.mark_invalid()
    }

    fn check_expression(
        &mut self,
        expr: ExprId,
        expected: Option<&Type>,
        use_site: ScopeId,
        policy: FreeTypeVarBindingPolicy,
    ) -> Result<CheckedExpr, InternalError> {
        let (expr, ty) = match expected {
            Some(expected) => self.coerce_expr(expr, expected, use_site, Mismatch::Value)?,
            None => {
                let ty = self.infer_expr(expr, use_site)?;
                (expr, ty)
            }
        };

        let mut ty = self.vars.resolve(&ty);
        if ty.has_vars() && policy == FreeTypeVarBindingPolicy::BindToErrorType {
            self.error_at(
                ErrorImpl::AmbiguousType {
                    type_: ty.to_string(),
                },
                expr.node(),
            );
            ty = Type::Error;
        }

        self.expr_types.insert(expr, ty.clone());
        Ok(CheckedExpr { expr, ty })
    }

    /// Unifies `actual` with `expected`, reporting a mismatch at `expr`.
    fn expect_type(&mut self, expr: ExprId, actual: &Type, expected: &Type) -> bool {
        if self.vars.unify(actual, expected) {
            return true;
        }
        let error = ErrorImpl::TypeMatchError {
            expected: self.vars.resolve(expected).to_string(),
            received: self.vars.resolve(actual).to_string(),
        };
        self.error_at(error, expr.node());
        false
    }

    /// Checks `expr` against `expected`. Returns the expression to store in its slot, which
    /// differs from `expr` when the value had to be wrapped.
    fn coerce_expr(
        &mut self,
        expr: ExprId,
        expected: &Type,
        use_site: ScopeId,
        mismatch: Mismatch,
    ) -> Result<(ExprId, Type), InternalError> {
        let expected = self.vars.resolve(expected);
        let ty = self.infer_expr(expr, use_site)?;
        if expected == Type::Error {
            return Ok((expr, Type::Error));
        }

        let resolved = self.vars.resolve(&ty);
        if let (Type::Product { decl, .. }, Type::Existential { .. }) = (&resolved, &expected) {
            return self.coerce_to_existential(expr, *decl, &resolved, &expected, use_site);
        }

        if self.vars.unify(&ty, &expected) {
            return Ok((expr, self.vars.resolve(&ty)));
        }

        let (expected, received) = (expected.to_string(), resolved.to_string());
        let error = match mismatch {
            Mismatch::Value => ErrorImpl::TypeMatchError { expected, received },
            Mismatch::Argument => ErrorImpl::ArgumentTypeMatchError { expected, received },
        };
        self.error_at(error, expr.node());
        Ok((expr, Type::Error))
    }

    /// Wraps a product value into an existential. Every conformance involved must be checked.
    fn coerce_to_existential(
        &mut self,
        expr: ExprId,
        product: DeclId,
        product_ty: &Type,
        expected: &Type,
        use_site: ScopeId,
    ) -> Result<(ExprId, Type), InternalError> {
        self.check_conformances(product)?;

        let traits = expected.trait_decls();
        let mut invalid = false;
        for trait_decl in &traits {
            let state = self
                .conformances(product)
                .iter()
                .find(|c| c.trait_decl() == *trait_decl)
                .map(TraitConformance::state);

            match state {
                Some(ConformanceState::Checked) => {}
                // Already diagnosed when the conformance was verified.
                Some(ConformanceState::Invalid) => invalid = true,
                Some(ConformanceState::Realized) | None => {
                    let error = ErrorImpl::TypeMatchError {
                        expected: expected.to_string(),
                        received: product_ty.to_string(),
                    };
                    self.error_at(error, expr.node());
                    return Ok((expr, Type::Error));
                }
            }
        }
        if invalid {
            return Ok((expr, Type::Error));
        }

        let span = self.program.ast().expr(expr).span.clone();
        let wrapper = self.program.ast_mut().insert_expr(Expr::new(
            ExprKind::Existential {
                witness: expr,
                traits,
            },
            span,
        ));
        let scope = self.program.scope_of(expr.node()).unwrap_or(use_site);
        self.program.register_synthesized(wrapper.node(), scope);
        self.expr_types.insert(wrapper, expected.clone());

        debug!(?expr, ?wrapper, "wrapped value in existential");
        Ok((wrapper, expected.clone()))
    }

    fn infer_expr(&mut self, expr: ExprId, use_site: ScopeId) -> Result<Type, InternalError> {
        let kind = self.program.ast().expr(expr).kind.clone();

        let ty = match kind {
            ExprKind::Int(_) => Type::Int,
            ExprKind::Str(_) => Type::String,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Name(name) => self.infer_name(expr, &name, use_site)?,
            ExprKind::Call { callee, arguments } => {
                self.infer_call(expr, callee, &arguments, use_site)?
            }
            ExprKind::Binary {
                operator,
                left,
                right,
            } => self.infer_binary(operator, left, right, use_site)?,
            ExprKind::Prefix { operator, operand } => {
                let expected = match operator {
                    PrefixOperator::Neg => Type::Int,
                    PrefixOperator::Not => Type::Bool,
                };
                let ty = self.infer_expr(operand, use_site)?;
                if self.expect_type(operand, &ty, &expected) && !ty.has_errors() {
                    expected
                } else {
                    Type::Error
                }
            }
            ExprKind::Assign { assignee, value } => {
                self.infer_assign(expr, assignee, value, use_site)?
            }
            ExprKind::Tuple(elements) => {
                let mut types = vec![];
                for element in elements {
                    types.push(self.infer_expr(element, use_site)?);
                }
                Type::Tuple(types)
            }
            ExprKind::Member { base, member } => {
                let base_ty = self.infer_expr(base, use_site)?;
                self.infer_member(expr, &base_ty, &member)?
            }
            ExprKind::Cond {
                condition,
                success,
                failure,
            } => self.infer_cond(expr, &condition, success, failure, use_site)?,
            ExprKind::Match { subject, cases } => self.infer_match(subject, &cases, use_site)?,
            ExprKind::Existential { traits, .. } => Type::Existential {
                traits: traits
                    .iter()
                    .map(|decl| Type::Trait {
                        decl: *decl,
                        name: self.decl_name(*decl),
                    })
                    .collect(),
            },
        };

        self.expr_types.insert(expr, ty.clone());
        Ok(ty)
    }

    fn infer_name(
        &mut self,
        expr: ExprId,
        name: &str,
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        let Some(decl) = self.lookup_value(expr, name, use_site) else {
            self.error_at(
                ErrorImpl::VariableNotDeclared {
                    variable: String::from(name),
                },
                expr.node(),
            );
            return Ok(Type::Error);
        };

        match self.program.ast().decl(decl).kind.clone() {
            DeclKind::Var { .. } | DeclKind::Param { .. } | DeclKind::Binding { .. } => {
                self.realize(decl)
            }
            DeclKind::Fun { generic_params, .. } => {
                let ty = Type::Fun(self.realize_signature(decl)?);
                if generic_params.is_empty() {
                    return Ok(ty);
                }
                let scope = self.program.scope_of(expr.node()).unwrap_or(use_site);
                Ok(match self.generic_env(decl) {
                    Some(env) => self.contextualize_type(&env, &ty, scope).0,
                    None => Type::Error,
                })
            }
            DeclKind::Product { members, .. } => {
                // The constructor takes the stored properties in order.
                let mut params = vec![];
                for member in members {
                    if let DeclKind::Binding { pattern, .. } =
                        &self.program.ast().decl(member).kind
                    {
                        for var in pattern.vars() {
                            params.push(self.realize(var)?);
                        }
                    }
                }
                let output = self.realize(decl)?;
                Ok(Type::Fun(FunType::new(params, output)))
            }
            DeclKind::Trait { .. } | DeclKind::Module { .. } | DeclKind::GenericParam { .. } => {
                self.error_at(
                    ErrorImpl::NotAValue {
                        name: String::from(name),
                    },
                    expr.node(),
                );
                Ok(Type::Error)
            }
        }
    }

    fn infer_call(
        &mut self,
        expr: ExprId,
        callee: ExprId,
        arguments: &[ExprId],
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        let callee_ty = self.infer_expr(callee, use_site)?;

        let signature = match self.vars.resolve(&callee_ty) {
            Type::Fun(signature) if signature.params.len() == arguments.len() => signature,
            other => {
                match other {
                    Type::Fun(signature) => {
                        let (expected, received) = (signature.params.len(), arguments.len());
                        let error = if received > expected {
                            ErrorImpl::UnexpectedArguments { expected, received }
                        } else {
                            ErrorImpl::MissingArguments { expected, received }
                        };
                        self.error_at(error, expr.node());
                    }
                    Type::Error => {}
                    other => self.error_at(
                        ErrorImpl::NotCallable {
                            type_: other.to_string(),
                        },
                        callee.node(),
                    ),
                }
                for argument in arguments {
                    self.infer_expr(*argument, use_site)?;
                }
                return Ok(Type::Error);
            }
        };

        let mut success = true;
        for (i, (argument, param)) in arguments.iter().zip(&signature.params).enumerate() {
            let (checked, ty) = self.coerce_expr(*argument, param, use_site, Mismatch::Argument)?;
            if let ExprKind::Call { arguments, .. } = &mut self.program.ast_mut().expr_mut(expr).kind
            {
                arguments[i] = checked;
            }
            success &= !ty.has_errors();
        }

        Ok(if success {
            *signature.output
        } else {
            Type::Error
        })
    }

    fn infer_binary(
        &mut self,
        operator: BinaryOperator,
        left: ExprId,
        right: ExprId,
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        use BinaryOperator::*;

        let left_ty = self.infer_expr(left, use_site)?;
        let right_ty = self.infer_expr(right, use_site)?;

        let (operands, output) = match operator {
            Add if self.vars.resolve(&left_ty) == Type::String => (Type::String, Type::String),
            Add | Sub | Mul | Div | Rem => (Type::Int, Type::Int),
            Lt | Le | Gt | Ge => (Type::Int, Type::Bool),
            And | Or => (Type::Bool, Type::Bool),
            Eq | Ne => {
                let success = self.expect_type(right, &right_ty, &left_ty);
                let left_ty = self.vars.resolve(&left_ty);
                return Ok(if success && !left_ty.has_errors() && !right_ty.has_errors() {
                    Type::Bool
                } else {
                    Type::Error
                });
            }
        };

        let left_ok = self.expect_type(left, &left_ty, &operands);
        let right_ok = self.expect_type(right, &right_ty, &operands);
        let operands_ok = !self.vars.resolve(&left_ty).has_errors()
            && !self.vars.resolve(&right_ty).has_errors();

        Ok(if left_ok && right_ok && operands_ok {
            output
        } else {
            Type::Error
        })
    }

    fn infer_assign(
        &mut self,
        expr: ExprId,
        assignee: ExprId,
        value: ExprId,
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        let assignable = match self.program.ast().expr(assignee).kind.clone() {
            ExprKind::Name(name) => match self.lookup_value(assignee, &name, use_site) {
                Some(decl) => {
                    let mutable = matches!(self.program.ast().decl(decl).kind, DeclKind::Var { .. })
                        && self.owning_binding(decl).is_some_and(|binding| {
                            matches!(
                                self.program.ast().decl(binding).kind,
                                DeclKind::Binding {
                                    introducer: Introducer::Var,
                                    ..
                                }
                            )
                        });
                    if !mutable {
                        self.error_at(
                            ErrorImpl::AssignmentToConstant { variable: name },
                            assignee.node(),
                        );
                    }
                    mutable
                }
                // Reported as undeclared below.
                None => true,
            },
            ExprKind::Member { .. } => true,
            _ => {
                self.error_at(ErrorImpl::InvalidAssignee, assignee.node());
                false
            }
        };

        let target = self.infer_expr(assignee, use_site)?;
        let (checked, ty) = self.coerce_expr(value, &target, use_site, Mismatch::Value)?;
        if let ExprKind::Assign { value, .. } = &mut self.program.ast_mut().expr_mut(expr).kind {
            *value = checked;
        }

        Ok(if assignable && !ty.has_errors() && !target.has_errors() {
            Type::unit()
        } else {
            Type::Error
        })
    }

    fn infer_member(
        &mut self,
        expr: ExprId,
        base_ty: &Type,
        member: &str,
    ) -> Result<Type, InternalError> {
        let base = self.vars.resolve(base_ty);

        let found = match &base {
            Type::Error => return Ok(Type::Error),
            Type::Product { decl, .. } => self.product_member(*decl, member)?,
            Type::Existential { .. } | Type::Trait { .. } => {
                self.requirement_named(&base.trait_decls(), member)?
            }
            Type::Param { decl, .. } => {
                let fun = self
                    .program
                    .scope_of(decl.node())
                    .and_then(|scope| self.program.ast().as_decl(scope.node()));
                let bounds: Vec<DeclId> = match fun.and_then(|fun| self.generic_env(fun)) {
                    Some(env) => env
                        .bounds(*decl)
                        .iter()
                        .flat_map(Type::trait_decls)
                        .collect(),
                    None => vec![],
                };
                self.requirement_named(&bounds, member)?
            }
            _ => None,
        };

        match found {
            Some(ty) => Ok(ty),
            None => {
                self.error_at(
                    ErrorImpl::UnknownMember {
                        type_: base.to_string(),
                        member: String::from(member),
                    },
                    expr.node(),
                );
                Ok(Type::Error)
            }
        }
    }

    fn product_member(
        &mut self,
        product: DeclId,
        member: &str,
    ) -> Result<Option<Type>, InternalError> {
        let DeclKind::Product { members, .. } = self.program.ast().decl(product).kind.clone()
        else {
            return Ok(None);
        };

        for decl in members {
            match &self.program.ast().decl(decl).kind {
                DeclKind::Fun { name, .. } if name == member => {
                    return Ok(Some(Type::Fun(self.realize_signature(decl)?)));
                }
                DeclKind::Binding { pattern, .. } => {
                    let var = pattern
                        .vars()
                        .into_iter()
                        .find(|var| self.program.ast().decl(*var).name() == Some(member));
                    if let Some(var) = var {
                        return self.realize(var).map(Some);
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Finds a requirement named `member` in `traits` or the traits they refine.
    fn requirement_named(
        &mut self,
        traits: &[DeclId],
        member: &str,
    ) -> Result<Option<Type>, InternalError> {
        let mut pending = traits.to_vec();
        let mut seen = BTreeSet::new();

        while let Some(trait_decl) = pending.pop() {
            if !seen.insert(trait_decl) {
                continue;
            }
            let DeclKind::Trait {
                members,
                refinements,
                ..
            } = self.program.ast().decl(trait_decl).kind.clone()
            else {
                continue;
            };

            for requirement in members {
                if self.program.ast().decl(requirement).name() == Some(member) {
                    return Ok(Some(Type::Fun(self.realize_signature(requirement)?)));
                }
            }

            let scope = self.enclosing_scope(trait_decl.node())?;
            for refinement in &refinements {
                pending.extend(self.lookup_trait(&refinement.name, scope));
            }
        }

        Ok(None)
    }

    fn infer_cond(
        &mut self,
        expr: ExprId,
        condition: &[ConditionItem],
        success: ExprId,
        failure: ExprId,
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        let scope = self.own_scope(expr.node())?;
        let mut condition_ok = true;

        for (i, item) in condition.iter().enumerate() {
            match *item {
                ConditionItem::Decl(decl) => condition_ok &= self.check_declaration(decl)?,
                ConditionItem::Expr(test) => {
                    let (checked, ty) = self.coerce_expr(test, &Type::Bool, scope, Mismatch::Value)?;
                    if let ExprKind::Cond { condition, .. } =
                        &mut self.program.ast_mut().expr_mut(expr).kind
                    {
                        condition[i] = ConditionItem::Expr(checked);
                    }
                    condition_ok &= !ty.has_errors();
                }
            }
        }

        let success_ty = self.infer_expr(success, scope)?;
        let (checked, failure_ty) =
            self.coerce_expr(failure, &success_ty, use_site, Mismatch::Value)?;
        if let ExprKind::Cond { failure, .. } = &mut self.program.ast_mut().expr_mut(expr).kind {
            *failure = checked;
        }

        Ok(if condition_ok && !failure_ty.has_errors() {
            self.vars.resolve(&success_ty)
        } else {
            Type::Error
        })
    }

    fn infer_match(
        &mut self,
        subject: ExprId,
        cases: &[CaseId],
        use_site: ScopeId,
    ) -> Result<Type, InternalError> {
        let subject_ty = self.infer_expr(subject, use_site)?;
        let result = self.vars.fresh();
        if cases.is_empty() {
            self.vars.unify(&result, &Type::unit());
        }

        let mut success = !self.vars.resolve(&subject_ty).has_errors();
        for case in cases {
            let case_node = self.program.ast().case(*case).clone();
            let scope = self.own_scope(case.node())?;

            success &= self.bind_pattern(&case_node.pattern, &subject_ty, scope, case.node())?;
            let (checked, ty) = self.coerce_expr(case_node.body, &result, scope, Mismatch::Value)?;
            self.program.ast_mut().case_mut(*case).body = checked;
            success &= !ty.has_errors();
        }

        Ok(if success {
            self.vars.resolve(&result)
        } else {
            Type::Error
        })
    }
}

impl CheckContext for TypeChecker {
    fn program(&self) -> &ScopedProgram {
        &self.program
    }

    fn program_mut(&mut self) -> &mut ScopedProgram {
        &mut self.program
    }

    fn check_decl(&mut self, decl: DeclId) -> Result<bool, InternalError> {
        self.check_declaration(decl)
    }

    fn check_expr(
        &mut self,
        expr: ExprId,
        expected: Option<&Type>,
        use_site: ScopeId,
        policy: FreeTypeVarBindingPolicy,
    ) -> Result<CheckedExpr, InternalError> {
        self.check_expression(expr, expected, use_site, policy)
    }

    fn realized_signature(&self, fun: DeclId) -> Option<FunType> {
        self.signatures.get(&fun).cloned()
    }

    fn prepare_generic_env(&mut self, fun: DeclId) -> Option<GenericEnvironment> {
        self.generic_env(fun)
    }

    fn contextualize(
        &mut self,
        env: &GenericEnvironment,
        ty: &Type,
        use_site: ScopeId,
    ) -> (Type, Substitutions) {
        self.contextualize_type(env, ty, use_site)
    }

    fn report(&mut self, error: Error) {
        self.errors.push(error);
    }
}
