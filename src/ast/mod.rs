/// AST (Abstract Syntax Tree) module
/// Contains all definitions related to the AST structure
///
/// Submodules:
/// - ast: The node arena, typed node ids and the walk protocol
/// - declarations: Declaration nodes
/// - expressions: Expression and match case nodes
/// - statements: Statement nodes
/// - types: Type expressions and patterns as written in source
pub mod ast;
pub mod declarations;
pub mod expressions;
pub mod statements;
pub mod types;
