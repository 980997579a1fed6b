//! Parser module for building the syntax tree.
//!
//! Transforms a stream of tokens into nodes of an `Ast` arena. It uses a
//! Pratt parser for expressions with operator precedence and handles:
//!
//! - Module-level declarations (functions, traits, types, bindings)
//! - Block members (bindings, local functions, control flow, expressions)
//! - Type annotations and patterns
//!
//! The parser uses NUD (null denotation) and LED (left denotation) functions
//! for expression parsing with binding power for precedence handling.

pub mod expr;
pub mod lookups;
pub mod parser;
pub mod stmt;
pub mod types;

#[cfg(test)]
mod tests;
