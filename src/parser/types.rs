//! Type parsing implementation.
//!
//! Handles type annotations:
//!
//! - Named types (`Int`, `T`, `Square`)
//! - Tuple types, with `()` as the unit type
//! - Existential compositions (`any Shape & Named`)

use std::collections::HashMap;

use crate::{
    ast::types::{TypeExpr, TypeExprKind},
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
};

use super::{parser::Parser, stmt::parse_trait_name};

/// Type alias for type null denotation handler functions.
pub type TypeNUDHandler = fn(&mut Parser) -> Result<TypeExpr, Error>;

/// Type alias for type NUD lookup table.
pub type TypeNUDLookup = HashMap<TokenKind, TypeNUDHandler>;

pub fn create_token_type_lookups(parser: &mut Parser) {
    parser.type_nud(TokenKind::Identifier, parse_symbol_type);
    parser.type_nud(TokenKind::OpenParen, parse_tuple_type);
    parser.type_nud(TokenKind::Any, parse_existential_type);
}

pub fn parse_symbol_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    let token = parser.expect(TokenKind::Identifier)?;
    Ok(TypeExpr {
        kind: TypeExprKind::Name(token.value),
        span: token.span,
    })
}

pub fn parse_tuple_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    let start = parser.expect(TokenKind::OpenParen)?.span.start;

    let mut elements = vec![];
    while parser.current_token_kind() != TokenKind::CloseParen {
        elements.push(parse_type(parser)?);
        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    parser.expect(TokenKind::CloseParen)?;

    Ok(TypeExpr {
        kind: TypeExprKind::Tuple(elements),
        span: parser.span_from(start),
    })
}

pub fn parse_existential_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    let start = parser.expect(TokenKind::Any)?.span.start;

    let mut traits = vec![parse_trait_name(parser)?];
    while parser.eat(TokenKind::Ampersand) {
        traits.push(parse_trait_name(parser)?);
    }

    Ok(TypeExpr {
        kind: TypeExprKind::Existential(traits),
        span: parser.span_from(start),
    })
}

pub fn parse_type(parser: &mut Parser) -> Result<TypeExpr, Error> {
    let token_kind = parser.current_token_kind();
    let Some(nud) = parser.get_type_nud_lookup().get(&token_kind).copied() else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    };

    nud(parser)
}
