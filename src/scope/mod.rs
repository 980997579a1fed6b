//! Lexical scope structure of a parsed program.
//!
//! `ScopedProgram` maps every node to its innermost enclosing scope, every scope to the
//! declarations it directly owns, and every variable to the binding declaration that
//! introduced it.

pub mod scoped_program;

#[cfg(test)]
mod tests;
