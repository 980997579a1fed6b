//! Type checking and semantic analysis module.
//!
//! This module checks a scoped program in place:
//!
//! - `stmt_checker`: statements, against the narrow `CheckContext` seam
//! - `type_checker`: the default `CheckContext`, checking declarations and expressions
//! - `conformance`: the state of a product type's conformance to a trait
//! - `generic_env`: generic parameters, `where` clauses and contextualization
//! - `ty`: semantic types and inference variables
//!
//! Checked expressions replace the originals in their slots of the tree. Diagnostics are
//! collected as they are found and checking carries on past them.

pub mod conformance;
pub mod generic_env;
pub mod stmt_checker;
pub mod ty;
pub mod type_checker;
