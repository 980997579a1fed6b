use std::fmt::Display;

use thiserror::Error;

use crate::{
    ast::ast::{DeclId, NodeId, StmtId},
    type_checker::conformance::ConformanceState,
    Position,
};

/// A user-facing diagnostic.
///
/// Lexing and parsing stop at the first one; type checking records as many as it can
/// and keeps going.
#[derive(Debug, Clone)]
pub struct Error {
    internal_error: ErrorImpl,
    position: Position,
}

impl Error {
    pub fn new(error_impl: ErrorImpl, position: Position) -> Self {
        Error {
            internal_error: error_impl,
            position,
        }
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn get_impl(&self) -> &ErrorImpl {
        &self.internal_error
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => "UnrecognisedToken",
            ErrorImpl::UnexpectedToken { .. } => "UnexpectedToken",
            ErrorImpl::UnexpectedTokenDetailed { .. } => "UnexpectedTokenDetailed",
            ErrorImpl::NumberParseError { .. } => "NumberParseError",
            ErrorImpl::VariableNotDeclared { .. } => "VariableNotDeclared",
            ErrorImpl::NotAValue { .. } => "NotAValue",
            ErrorImpl::UnexpectedArguments { .. } => "UnexpectedArguments",
            ErrorImpl::MissingArguments { .. } => "MissingArguments",
            ErrorImpl::ArgumentTypeMatchError { .. } => "ArgumentTypeMatchError",
            ErrorImpl::TypeMatchError { .. } => "TypeMatchError",
            ErrorImpl::ExpectedExplicitValue => "ExpectedExplicitValue",
            ErrorImpl::UnknownType { .. } => "UnknownType",
            ErrorImpl::UnknownTrait { .. } => "UnknownTrait",
            ErrorImpl::UnknownMember { .. } => "UnknownMember",
            ErrorImpl::NotCallable { .. } => "NotCallable",
            ErrorImpl::AssignmentToConstant { .. } => "AssignmentToConstant",
            ErrorImpl::InvalidAssignee => "InvalidAssignee",
            ErrorImpl::PatternMismatch { .. } => "PatternMismatch",
            ErrorImpl::CircularReference { .. } => "CircularReference",
            ErrorImpl::AmbiguousType { .. } => "AmbiguousType",
            ErrorImpl::InvalidGenericEnvironment { .. } => "InvalidGenericEnvironment",
            ErrorImpl::NonConformingType { .. } => "NonConformingType",
            ErrorImpl::MissingReturnValue => "MissingReturnValue",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => ErrorTip::None,
            ErrorImpl::UnexpectedToken { token } => ErrorTip::Suggestion(format!(
                "Unexpected token: `{}`, did you miss a semicolon?",
                token
            )),
            ErrorImpl::UnexpectedTokenDetailed { token, message } => {
                ErrorTip::Suggestion(format!("Unexpected token: `{}`, {}", token, message))
            }
            ErrorImpl::NumberParseError { token } => ErrorTip::Suggestion(format!(
                "Invalid number: `{}`, is it above the integer limit?",
                token
            )),
            ErrorImpl::VariableNotDeclared { variable } => {
                ErrorTip::Suggestion(format!("`{}` is not declared in this scope", variable))
            }
            ErrorImpl::NotAValue { name } => {
                ErrorTip::Suggestion(format!("`{}` names a type or module, not a value", name))
            }
            ErrorImpl::UnexpectedArguments { expected, received }
            | ErrorImpl::MissingArguments { expected, received } => ErrorTip::Suggestion(
                format!("Expected {} arguments, received {}", expected, received),
            ),
            ErrorImpl::ArgumentTypeMatchError { expected, received } => {
                ErrorTip::Suggestion(format!(
                    "Expected argument type `{}`, received `{}`",
                    expected, received
                ))
            }
            ErrorImpl::TypeMatchError { expected, received } => ErrorTip::Suggestion(format!(
                "Expected type `{}`, received `{}`",
                expected, received
            )),
            ErrorImpl::ExpectedExplicitValue => ErrorTip::Suggestion(String::from(
                "Expected explicit value when no type is given",
            )),
            ErrorImpl::UnknownType { type_ } => {
                ErrorTip::Suggestion(format!("Unknown type `{}` found", type_))
            }
            ErrorImpl::UnknownTrait { name } => {
                ErrorTip::Suggestion(format!("`{}` does not name a trait", name))
            }
            ErrorImpl::UnknownMember { type_, member } => {
                ErrorTip::Suggestion(format!("Type `{}` has no member `{}`", type_, member))
            }
            ErrorImpl::NotCallable { type_ } => {
                ErrorTip::Suggestion(format!("Values of type `{}` cannot be called", type_))
            }
            ErrorImpl::AssignmentToConstant { variable } => ErrorTip::Suggestion(format!(
                "`{}` is immutable, declare it with `var` to assign to it",
                variable
            )),
            ErrorImpl::InvalidAssignee => ErrorTip::Suggestion(String::from(
                "Only variables and members can be assigned to",
            )),
            ErrorImpl::PatternMismatch { type_ } => ErrorTip::Suggestion(format!(
                "Pattern cannot match a value of type `{}`",
                type_
            )),
            ErrorImpl::CircularReference { name } => {
                ErrorTip::Suggestion(format!("`{}` depends on its own value", name))
            }
            ErrorImpl::AmbiguousType { type_ } => ErrorTip::Suggestion(format!(
                "Type `{}` could not be fully inferred, add an annotation",
                type_
            )),
            ErrorImpl::InvalidGenericEnvironment { function, reason } => ErrorTip::Suggestion(
                format!("Invalid generic constraints on `{}`: {}", function, reason),
            ),
            ErrorImpl::NonConformingType {
                type_,
                trait_,
                requirement,
            } => ErrorTip::Suggestion(format!(
                "Type `{}` does not conform to `{}`: no implementation for `{}`",
                type_, trait_, requirement
            )),
            ErrorImpl::MissingReturnValue => ErrorTip::Suggestion(String::from(
                "Non-unit function should return a value",
            )),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}:{}", self.internal_error, self.position.1, self.position.0)
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorImpl {
    #[error("unrecognised token: {token:?}")]
    UnrecognisedToken { token: String },
    #[error("unexpected token: {token:?}")]
    UnexpectedToken { token: String },
    #[error("unexpected token ({message:?}): {token:?}")]
    UnexpectedTokenDetailed { token: String, message: String },
    #[error("error parsing number: {token:?}")]
    NumberParseError { token: String },
    #[error("{variable:?} not declared")]
    VariableNotDeclared { variable: String },
    #[error("{name:?} is not a value")]
    NotAValue { name: String },
    #[error("unexpected arguments: expected {expected:?}, received {received:?}")]
    UnexpectedArguments { expected: usize, received: usize },
    #[error("missing arguments: expected {expected:?}, received {received:?}")]
    MissingArguments { expected: usize, received: usize },
    #[error("argument types do not match: expected {expected:?}, received {received:?}")]
    ArgumentTypeMatchError { expected: String, received: String },
    #[error("types do not match: expected {expected:?}, received {received:?}")]
    TypeMatchError { expected: String, received: String },
    #[error("expected explicit value when no type is given")]
    ExpectedExplicitValue,
    #[error("unknown type {type_} found")]
    UnknownType { type_: String },
    #[error("unknown trait {name}")]
    UnknownTrait { name: String },
    #[error("type {type_} has no member {member:?}")]
    UnknownMember { type_: String, member: String },
    #[error("type {type_} is not callable")]
    NotCallable { type_: String },
    #[error("cannot assign to immutable {variable:?}")]
    AssignmentToConstant { variable: String },
    #[error("invalid assignee")]
    InvalidAssignee,
    #[error("pattern does not match type {type_}")]
    PatternMismatch { type_: String },
    #[error("circular reference to {name:?}")]
    CircularReference { name: String },
    #[error("ambiguous type {type_}")]
    AmbiguousType { type_: String },
    #[error("invalid generic environment for {function:?}: {reason}")]
    InvalidGenericEnvironment { function: String, reason: String },
    #[error("type {type_} does not conform to {trait_}: missing {requirement:?}")]
    NonConformingType {
        type_: String,
        trait_: String,
        requirement: String,
    },
    #[error("missing return value")]
    MissingReturnValue,
}

/// A violated internal invariant.
///
/// These are never caused by user input alone: they mean an earlier phase (the parser or the
/// scope builder) produced a malformed tree, or a pass was driven out of order. They abort the
/// compilation instead of being reported next to type errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InternalError {
    #[error("module {0:?} is nested inside another scope")]
    NestedModule(NodeId),
    #[error("node {0:?} is not contained in any module")]
    OrphanNode(NodeId),
    #[error("binding declaration exit mismatch: expected {expected:?}, popped {found:?}")]
    MismatchedBindingExit {
        expected: DeclId,
        found: Option<DeclId>,
    },
    #[error("return statement {0:?} outside of a function")]
    ReturnOutsideFunction(StmtId),
    #[error("body of {0:?} checked before its signature was realized")]
    UnrealizedSignature(DeclId),
    #[error("malformed tree at {node:?}: {reason}")]
    MalformedTree { node: NodeId, reason: String },
    #[error("illegal conformance transition from {from:?} to {to:?}")]
    IllegalConformanceTransition {
        from: ConformanceState,
        to: ConformanceState,
    },
    #[error("conformance entries for {trait_decl:?} do not cover each requirement exactly once")]
    IncompleteConformance { trait_decl: DeclId },
}
