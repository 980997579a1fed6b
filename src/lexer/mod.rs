//! Lexical analysis.
//!
//! Converts source text into a stream of tokens using an ordered table of
//! anchored regex patterns. Keywords are recognised from identifiers through
//! a reserved-word lookup.

pub mod lexer;
pub mod tokens;
