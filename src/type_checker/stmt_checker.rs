use serde::Serialize;
use tracing::trace;

use crate::{
    ast::{
        ast::{Ast, DeclId, ExprId, NodeId, ScopeId, StmtId},
        statements::{BlockMember, ConditionItem, StmtKind},
    },
    config::FreeTypeVarBindingPolicy,
    errors::errors::{Error, ErrorImpl, InternalError},
    scope::scoped_program::ScopedProgram,
};

use super::{
    generic_env::GenericEnvironment,
    ty::{FunType, Substitutions, Type},
};

/// An expression after checking. `expr` replaces the checked node in its slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedExpr {
    pub expr: ExprId,
    pub ty: Type,
}

/// The collaborators the statement checker relies on.
pub trait CheckContext {
    fn program(&self) -> &ScopedProgram;

    /// For slot replacement and synthesized node registration only.
    fn program_mut(&mut self) -> &mut ScopedProgram;

    fn check_decl(&mut self, decl: DeclId) -> Result<bool, InternalError>;

    /// Checks `expr`, against `expected` if given, resolving generic parameters as seen from
    /// `use_site`.
    fn check_expr(
        &mut self,
        expr: ExprId,
        expected: Option<&Type>,
        use_site: ScopeId,
        policy: FreeTypeVarBindingPolicy,
    ) -> Result<CheckedExpr, InternalError>;

    /// The signature of `fun`, if it has been realized.
    fn realized_signature(&self, fun: DeclId) -> Option<FunType>;

    fn prepare_generic_env(&mut self, fun: DeclId) -> Option<GenericEnvironment>;

    fn contextualize(
        &mut self,
        env: &GenericEnvironment,
        ty: &Type,
        use_site: ScopeId,
    ) -> (Type, Substitutions);

    fn report(&mut self, error: Error);
}

/// A return statement seen while checking a function body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnRecord {
    pub stmt: StmtId,
    pub function: DeclId,
    /// The return type the value was checked against, after contextualization.
    pub expected: Type,
}

/// Checks statements, recursing into nested statements.
///
/// One checker is used per function body. It owns the return statements it encounters.
#[derive(Debug)]
pub struct StmtChecker {
    use_site: ScopeId,
    policy: FreeTypeVarBindingPolicy,
    diagnose_missing_return_values: bool,
    ret_stmts: Vec<ReturnRecord>,
}

fn scope_for(ast: &Ast, node: NodeId, what: &str) -> Result<ScopeId, InternalError> {
    ScopeId::new(ast, node).ok_or_else(|| InternalError::MalformedTree {
        node,
        reason: format!("{} does not introduce a scope", what),
    })
}

impl StmtChecker {
    pub fn new(use_site: ScopeId, policy: FreeTypeVarBindingPolicy) -> Self {
        StmtChecker {
            use_site,
            policy,
            diagnose_missing_return_values: false,
            ret_stmts: vec![],
        }
    }

    pub fn diagnosing_missing_return_values(mut self, enabled: bool) -> Self {
        self.diagnose_missing_return_values = enabled;
        self
    }

    pub fn use_site(&self) -> ScopeId {
        self.use_site
    }

    pub fn ret_stmts(&self) -> &[ReturnRecord] {
        &self.ret_stmts
    }

    pub fn into_ret_stmts(self) -> Vec<ReturnRecord> {
        self.ret_stmts
    }

    /// Checks `stmt` and returns whether it is free of type errors.
    pub fn check<C: CheckContext + ?Sized>(
        &mut self,
        stmt: StmtId,
        ctx: &mut C,
    ) -> Result<bool, InternalError> {
        let kind = ctx.program().ast().stmt(stmt).kind.clone();
        trace!(?stmt, "checking statement");

        match kind {
            StmtKind::Brace { members } => {
                let scope = scope_for(ctx.program().ast(), stmt.node(), "brace statement")?;
                let enclosing = std::mem::replace(&mut self.use_site, scope);
                let result = self.check_brace(stmt, &members, ctx);
                self.use_site = enclosing;
                result
            }
            StmtKind::Ret { value } => self.check_return(stmt, value, ctx),
            StmtKind::Cond {
                condition,
                success,
                failure,
            } => {
                let scope = scope_for(ctx.program().ast(), stmt.node(), "conditional statement")?;
                let mut success_ok = self.check_condition(stmt, &condition, scope, ctx)?;
                success_ok &= self.check(success, ctx)?;
                if let Some(failure) = failure {
                    success_ok &= self.check(failure, ctx)?;
                }
                Ok(success_ok)
            }
            StmtKind::While { condition, body } => {
                let scope = scope_for(ctx.program().ast(), stmt.node(), "while loop")?;
                let condition_ok = self.check_condition(stmt, &condition, scope, ctx)?;
                let body_ok = self.check(body, ctx)?;
                Ok(condition_ok && body_ok)
            }
            StmtKind::DoWhile { body, condition } => {
                let body_ok = self.check(body, ctx)?;
                let scope = scope_for(ctx.program().ast(), body.node(), "do/while body")?;
                let checked = ctx.check_expr(condition, Some(&Type::Bool), scope, self.policy)?;
                if let StmtKind::DoWhile { condition, .. } =
                    &mut ctx.program_mut().ast_mut().stmt_mut(stmt).kind
                {
                    *condition = checked.expr;
                }
                Ok(body_ok && !checked.ty.has_errors())
            }
        }
    }

    /// Checks every member, even after a failure.
    fn check_brace<C: CheckContext + ?Sized>(
        &mut self,
        stmt: StmtId,
        members: &[BlockMember],
        ctx: &mut C,
    ) -> Result<bool, InternalError> {
        let mut success = true;

        for (i, member) in members.iter().enumerate() {
            let member_ok = match *member {
                BlockMember::Decl(decl) => ctx.check_decl(decl)?,
                BlockMember::Stmt(inner) => self.check(inner, ctx)?,
                BlockMember::Expr(expr) => {
                    let checked = ctx.check_expr(expr, None, self.use_site, self.policy)?;
                    if let StmtKind::Brace { members } =
                        &mut ctx.program_mut().ast_mut().stmt_mut(stmt).kind
                    {
                        members[i] = BlockMember::Expr(checked.expr);
                    }
                    !checked.ty.has_errors()
                }
            };
            success &= member_ok;
        }

        Ok(success)
    }

    fn check_return<C: CheckContext + ?Sized>(
        &mut self,
        stmt: StmtId,
        value: Option<ExprId>,
        ctx: &mut C,
    ) -> Result<bool, InternalError> {
        let program = ctx.program();
        let function = program
            .scope_of(stmt.node())
            .and_then(|scope| program.innermost_function(scope))
            .ok_or(InternalError::ReturnOutsideFunction(stmt))?;
        let signature = ctx
            .realized_signature(function)
            .ok_or(InternalError::UnrealizedSignature(function))?;

        let mut expected = *signature.output;
        if expected.has_type_params() {
            expected = match ctx.prepare_generic_env(function) {
                Some(env) => ctx.contextualize(&env, &expected, self.use_site).0,
                None => Type::Error,
            };
        }

        self.ret_stmts.push(ReturnRecord {
            stmt,
            function,
            expected: expected.clone(),
        });

        let Some(value) = value else {
            // Missing values are only diagnosed when configured to.
            if self.diagnose_missing_return_values && !expected.is_unit() && !expected.has_errors()
            {
                let position = ctx.program().ast().stmt(stmt).span.start.clone();
                ctx.report(Error::new(ErrorImpl::MissingReturnValue, position));
                return Ok(false);
            }
            return Ok(true);
        };

        let checked = ctx.check_expr(
            value,
            Some(&expected),
            self.use_site,
            FreeTypeVarBindingPolicy::default(),
        )?;
        if let StmtKind::Ret { value } = &mut ctx.program_mut().ast_mut().stmt_mut(stmt).kind {
            *value = Some(checked.expr);
        }

        Ok(!checked.ty.has_errors())
    }

    /// Boolean tests are checked against `Bool` from `scope`; bindings go to the declaration
    /// checker.
    fn check_condition<C: CheckContext + ?Sized>(
        &mut self,
        stmt: StmtId,
        condition: &[ConditionItem],
        scope: ScopeId,
        ctx: &mut C,
    ) -> Result<bool, InternalError> {
        let mut success = true;

        for (i, item) in condition.iter().enumerate() {
            match *item {
                ConditionItem::Decl(decl) => success &= ctx.check_decl(decl)?,
                ConditionItem::Expr(expr) => {
                    let checked = ctx.check_expr(expr, Some(&Type::Bool), scope, self.policy)?;
                    match &mut ctx.program_mut().ast_mut().stmt_mut(stmt).kind {
                        StmtKind::Cond { condition, .. } | StmtKind::While { condition, .. } => {
                            condition[i] = ConditionItem::Expr(checked.expr);
                        }
                        _ => {}
                    }
                    success &= !checked.ty.has_errors();
                }
            }
        }

        Ok(success)
    }
}
