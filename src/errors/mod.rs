//! Error types and error handling for the compiler.
//!
//! Two tiers live here:
//!
//! - `Error`/`ErrorImpl`: user-facing diagnostics with a source position and a tip
//! - `InternalError`: violated invariants between phases, fatal to the compilation

pub mod errors;
