use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use serde::Serialize;

use crate::ast::ast::DeclId;

/// Concrete types substituted for generic parameters, keyed by parameter declaration.
pub type Substitutions = BTreeMap<DeclId, Type>;

pub type TypeVarId = u32;

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Type {
    Int,
    Bool,
    String,
    /// The empty tuple is the unit type.
    Tuple(Vec<Type>),
    Fun(FunType),
    Product {
        decl: DeclId,
        name: String,
    },
    Trait {
        decl: DeclId,
        name: String,
    },
    /// `any A & B`, holding `Trait` types.
    Existential {
        traits: Vec<Type>,
    },
    /// Rigid reference to a generic parameter.
    Param {
        decl: DeclId,
        name: String,
    },
    /// Inference variable.
    Var(TypeVarId),
    /// Marks a value whose checking failed. Unifies with anything.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunType {
    pub params: Vec<Type>,
    pub output: Box<Type>,
}

impl FunType {
    pub fn new(params: Vec<Type>, output: Type) -> Self {
        FunType {
            params,
            output: Box::new(output),
        }
    }
}

impl Type {
    pub fn unit() -> Self {
        Type::Tuple(vec![])
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tuple(elements) if elements.is_empty())
    }

    pub fn has_errors(&self) -> bool {
        self.contains(&|t| matches!(t, Type::Error))
    }

    pub fn has_type_params(&self) -> bool {
        self.contains(&|t| matches!(t, Type::Param { .. }))
    }

    pub fn has_vars(&self) -> bool {
        self.contains(&|t| matches!(t, Type::Var(_)))
    }

    /// Whether `pred` holds for this type or any type nested in it.
    pub fn contains(&self, pred: &dyn Fn(&Type) -> bool) -> bool {
        if pred(self) {
            return true;
        }

        match self {
            Type::Tuple(elements) => elements.iter().any(|e| e.contains(pred)),
            Type::Fun(fun) => {
                fun.params.iter().any(|p| p.contains(pred)) || fun.output.contains(pred)
            }
            Type::Existential { traits } => traits.iter().any(|t| t.contains(pred)),
            _ => false,
        }
    }

    /// Rebuilds the type bottom-up, replacing every node for which `f` returns a type.
    pub fn transform(&self, f: &mut dyn FnMut(&Type) -> Option<Type>) -> Type {
        if let Some(replacement) = f(self) {
            return replacement;
        }

        match self {
            Type::Tuple(elements) => {
                Type::Tuple(elements.iter().map(|e| e.transform(&mut *f)).collect())
            }
            Type::Fun(fun) => Type::Fun(FunType {
                params: fun.params.iter().map(|p| p.transform(&mut *f)).collect(),
                output: Box::new(fun.output.transform(f)),
            }),
            Type::Existential { traits } => Type::Existential {
                traits: traits.iter().map(|t| t.transform(&mut *f)).collect(),
            },
            other => other.clone(),
        }
    }

    pub fn substitute(&self, substitutions: &Substitutions) -> Type {
        self.transform(&mut |t| match t {
            Type::Param { decl, .. } => substitutions.get(decl).cloned(),
            _ => None,
        })
    }

    /// The trait declarations of an existential, in the order written.
    pub fn trait_decls(&self) -> Vec<DeclId> {
        match self {
            Type::Trait { decl, .. } => vec![*decl],
            Type::Existential { traits } => traits.iter().flat_map(Type::trait_decls).collect(),
            _ => vec![],
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Tuple(elements) => {
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", elements.join(", "))
            }
            Type::Fun(fun) => {
                let params: Vec<String> = fun.params.iter().map(|p| p.to_string()).collect();
                write!(f, "({}) -> {}", params.join(", "), fun.output)
            }
            Type::Product { name, .. } | Type::Trait { name, .. } | Type::Param { name, .. } => {
                write!(f, "{}", name)
            }
            Type::Existential { traits } => {
                let traits: Vec<String> = traits.iter().map(|t| t.to_string()).collect();
                write!(f, "any {}", traits.join(" & "))
            }
            Type::Var(id) => write!(f, "$T{}", id),
            Type::Error => write!(f, "<error>"),
        }
    }
}

/// Inference variables and their bindings.
#[derive(Debug, Clone, Default)]
pub struct TypeVars {
    next: TypeVarId,
    bindings: HashMap<TypeVarId, Type>,
}

impl TypeVars {
    pub fn fresh(&mut self) -> Type {
        let id = self.next;
        self.next += 1;
        Type::Var(id)
    }

    /// Follows variable bindings at the top level only.
    fn shallow(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        while let Type::Var(id) = current {
            match self.bindings.get(&id) {
                Some(bound) => current = bound.clone(),
                None => break,
            }
        }
        current
    }

    /// Replaces every bound variable in `ty` by its binding.
    pub fn resolve(&self, ty: &Type) -> Type {
        ty.transform(&mut |t| match t {
            Type::Var(id) => Some(match self.bindings.get(id) {
                Some(bound) => self.resolve(bound),
                None => t.clone(),
            }),
            _ => None,
        })
    }

    fn occurs_in(&self, var: TypeVarId, ty: &Type) -> bool {
        self.resolve(ty).contains(&|t| *t == Type::Var(var))
    }

    /// Makes `a` and `b` equal by binding variables. Returns false if they cannot be.
    ///
    /// Bindings made before a failure are kept.
    pub fn unify(&mut self, a: &Type, b: &Type) -> bool {
        let a = self.shallow(a);
        let b = self.shallow(b);

        match (&a, &b) {
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::Var(x), Type::Var(y)) if x == y => true,
            (Type::Var(id), other) | (other, Type::Var(id)) => {
                if self.occurs_in(*id, other) {
                    return false;
                }
                self.bindings.insert(*id, other.clone());
                true
            }
            (Type::Tuple(xs), Type::Tuple(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.unify(x, y))
            }
            (Type::Fun(f), Type::Fun(g)) => {
                f.params.len() == g.params.len()
                    && f.params
                        .iter()
                        .zip(&g.params)
                        .all(|(x, y)| self.unify(x, y))
                    && self.unify(&f.output, &g.output)
            }
            (Type::Existential { .. }, Type::Existential { .. }) => {
                let mut xs = a.trait_decls();
                let mut ys = b.trait_decls();
                xs.sort();
                xs.dedup();
                ys.sort();
                ys.dedup();
                xs == ys
            }
            _ => a == b,
        }
    }
}
