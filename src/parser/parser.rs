//! Parser implementation for building the syntax tree.
//!
//! The parser uses a Pratt parser approach with NUD/LED handlers for
//! expression parsing and a statement lookup for block members.
//!
//! It maintains lookup tables for:
//! - Statement handlers
//! - NUD (null denotation) handlers for prefix expressions
//! - LED (left denotation) handlers for infix expressions
//! - Binding powers for operator precedence
//! - Type parsing handlers
//!
//! Nodes are allocated directly into the `Ast` arena the parser owns.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    ast::{
        ast::{Ast, CaseId, DeclId, ExprId, StmtId},
        declarations::{Decl, DeclKind},
        expressions::{Expr, ExprKind, MatchCase},
        statements::{Stmt, StmtKind},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::{
        lexer::tokenize,
        tokens::{Token, TokenKind},
    },
    Position, Span,
};

use super::{
    lookups::{
        create_token_lookups, BPLookup, BindingPower, LEDHandler, LEDLookup, NUDHandler, NUDLookup,
        StmtHandler, StmtLookup,
    },
    stmt::parse_item,
    types::{create_token_type_lookups, TypeNUDHandler, TypeNUDLookup},
};

/// The main parser structure that maintains parsing state.
pub struct Parser {
    /// The list of tokens to parse
    tokens: Vec<Token>,
    /// Current position in the token stream
    pos: usize,
    /// Arena receiving every parsed node
    ast: Ast,
    stmt_lookup: StmtLookup,
    nud_lookup: NUDLookup,
    led_lookup: LEDLookup,
    binding_power_lookup: BPLookup,
    type_nud_lookup: TypeNUDLookup,
}

impl Parser {
    /// Creates a parser over `tokens`, which must end with an `EOF` token.
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut parser = Parser {
            tokens,
            pos: 0,
            ast: Ast::new(),
            stmt_lookup: HashMap::new(),
            nud_lookup: HashMap::new(),
            led_lookup: HashMap::new(),
            binding_power_lookup: HashMap::new(),
            type_nud_lookup: HashMap::new(),
        };
        create_token_lookups(&mut parser);
        create_token_type_lookups(&mut parser);
        parser
    }

    /// Returns the current token without advancing.
    pub fn current_token(&self) -> &Token {
        // The stream always ends with EOF, and nothing advances past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn current_token_kind(&self) -> TokenKind {
        self.current_token().kind
    }

    /// Returns the kind of the token `n` places ahead.
    pub fn peek_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::EOF, |token| token.kind)
    }

    /// Advances to the next token and returns the previous token.
    pub fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        if self.current_token_kind() != TokenKind::EOF {
            self.pos += 1;
        }
        &self.tokens[index]
    }

    /// Expects a token of the specified kind, with optional custom error.
    pub fn expect_error(
        &mut self,
        expected_kind: TokenKind,
        error: Option<Error>,
    ) -> Result<Token, Error> {
        let token = self.current_token();
        if token.kind != expected_kind {
            return Err(error.unwrap_or_else(|| {
                Error::new(
                    ErrorImpl::UnexpectedToken {
                        token: token.value.clone(),
                    },
                    token.span.start.clone(),
                )
            }));
        }

        Ok(self.advance().clone())
    }

    /// Expects a token of the specified kind with default error message.
    pub fn expect(&mut self, expected_kind: TokenKind) -> Result<Token, Error> {
        self.expect_error(expected_kind, None)
    }

    /// Expects a token of the specified kind, explaining what was expected on failure.
    pub fn expect_detailed(
        &mut self,
        expected_kind: TokenKind,
        message: &str,
    ) -> Result<Token, Error> {
        let error = self.unexpected(message);
        self.expect_error(expected_kind, Some(error))
    }

    /// An `UnexpectedTokenDetailed` error at the current token.
    pub fn unexpected(&self, message: &str) -> Error {
        Error::new(
            ErrorImpl::UnexpectedTokenDetailed {
                token: self.current_token().value.clone(),
                message: String::from(message),
            },
            self.get_position(),
        )
    }

    /// Consumes the current token if it is of `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.current_token_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn has_tokens(&self) -> bool {
        self.current_token_kind() != TokenKind::EOF
    }

    pub fn get_stmt_lookup(&self) -> &StmtLookup {
        &self.stmt_lookup
    }

    pub fn get_nud_lookup(&self) -> &NUDLookup {
        &self.nud_lookup
    }

    pub fn get_led_lookup(&self) -> &LEDLookup {
        &self.led_lookup
    }

    pub fn get_bp_lookup(&self) -> &BPLookup {
        &self.binding_power_lookup
    }

    pub fn get_type_nud_lookup(&self) -> &TypeNUDLookup {
        &self.type_nud_lookup
    }

    /// Registers a left denotation (infix) handler for a token.
    pub fn led(&mut self, kind: TokenKind, binding_power: BindingPower, led_fn: LEDHandler) {
        self.binding_power_lookup.insert(kind, binding_power);
        self.led_lookup.insert(kind, led_fn);
    }

    /// Registers a null denotation (prefix) handler for a token.
    pub fn nud(&mut self, kind: TokenKind, nud_fn: NUDHandler) {
        self.nud_lookup.insert(kind, nud_fn);
    }

    /// Registers a statement handler for a token.
    pub fn stmt(&mut self, kind: TokenKind, stmt_fn: StmtHandler) {
        self.stmt_lookup.insert(kind, stmt_fn);
    }

    /// Registers a type null denotation handler.
    pub fn type_nud(&mut self, kind: TokenKind, nud_fn: TypeNUDHandler) {
        self.type_nud_lookup.insert(kind, nud_fn);
    }

    /// Returns the start of the current token.
    pub fn get_position(&self) -> Position {
        self.current_token().span.start.clone()
    }

    /// Returns the end of the last consumed token.
    pub fn previous_end(&self) -> Position {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.span.end.clone(),
            None => self.get_position(),
        }
    }

    /// A span from `start` to the end of the last consumed token.
    pub fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.previous_end())
    }

    pub fn insert_decl(&mut self, kind: DeclKind, span: Span) -> DeclId {
        self.ast.insert_decl(Decl::new(kind, span))
    }

    pub fn insert_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.ast.insert_stmt(Stmt::new(kind, span))
    }

    pub fn insert_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.ast.insert_expr(Expr::new(kind, span))
    }

    pub fn insert_case(&mut self, case: MatchCase) -> CaseId {
        self.ast.insert_case(case)
    }

    pub fn expr_span(&self, expr: ExprId) -> &Span {
        &self.ast.expr(expr).span
    }

    pub fn into_ast(self) -> Ast {
        self.ast
    }
}

/// Parses `files` (name, source) as the members of a single module named `module_name`.
pub fn parse_module(files: &[(String, String)], module_name: &str) -> Result<Ast, Error> {
    let mut tokens = vec![];

    for (index, (name, source)) in files.iter().enumerate() {
        let mut file_tokens = tokenize(source, Arc::new(name.clone()))?;
        if index + 1 < files.len() {
            file_tokens.pop();
        }
        tokens.extend(file_tokens);
    }

    let module_file = files
        .first()
        .map_or_else(|| String::from("<empty>"), |(name, _)| name.clone());
    let module_end = files.first().map_or(0, |(_, source)| source.len() as u32);
    let module_file = Arc::new(module_file);

    if tokens.is_empty() {
        tokens.push(Token {
            kind: TokenKind::EOF,
            value: String::from("EOF"),
            span: Span::new(
                Position(0, Arc::clone(&module_file)),
                Position(0, Arc::clone(&module_file)),
            ),
        });
    }

    let mut parser = Parser::new(tokens);
    let mut members = vec![];

    while parser.has_tokens() {
        members.push(parse_item(&mut parser)?);
    }

    debug!(module = module_name, members = members.len(), "parsed module");

    let module = parser.insert_decl(
        DeclKind::Module {
            name: String::from(module_name),
            members,
        },
        Span::new(
            Position(0, Arc::clone(&module_file)),
            Position(module_end, module_file),
        ),
    );

    let mut ast = parser.into_ast();
    ast.add_module(module);
    Ok(ast)
}

/// Parses a single source text as module `main`.
pub fn parse(source: &str, file: &str) -> Result<Ast, Error> {
    parse_module(&[(String::from(file), String::from(source))], "main")
}
