use crate::{
    ast::{
        ast::{DeclId, StmtId},
        declarations::{DeclKind, Introducer, TraitName, WhereRequirement},
        statements::{BlockMember, ConditionItem, StmtKind},
        types::Pattern,
    },
    errors::errors::Error,
    lexer::tokens::TokenKind,
    parser::{expr::parse_expr, lookups::BindingPower},
};

use super::{parser::Parser, types::parse_type};

/// Parses a module-level declaration.
pub fn parse_item(parser: &mut Parser) -> Result<DeclId, Error> {
    match parser.current_token_kind() {
        TokenKind::Fun => parse_fun_decl(parser),
        TokenKind::Trait => parse_trait_decl(parser),
        TokenKind::Type => parse_product_decl(parser),
        TokenKind::Let | TokenKind::Var => {
            let binding = parse_binding_decl(parser)?;
            parser.expect(TokenKind::Semicolon)?;
            Ok(binding)
        }
        _ => Err(parser.unexpected("expected a declaration")),
    }
}

/// Parses one member of a brace block.
pub fn parse_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    if let Some(handler) = parser
        .get_stmt_lookup()
        .get(&parser.current_token_kind())
        .copied()
    {
        return handler(parser);
    }

    let expr = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::Semicolon)?;

    Ok(BlockMember::Expr(expr))
}

/// `let`/`var` pattern (`:` type)? (`=` expr)?, without the terminator.
pub fn parse_binding_decl(parser: &mut Parser) -> Result<DeclId, Error> {
    let start_token = parser.advance().clone();
    let introducer = if start_token.kind == TokenKind::Var {
        Introducer::Var
    } else {
        Introducer::Let
    };

    let pattern = parse_binding_pattern(parser)?;

    let annotation = if parser.eat(TokenKind::Colon) {
        Some(parse_type(parser)?)
    } else {
        None
    };

    let initializer = if parser.eat(TokenKind::Assignment) {
        Some(parse_expr(parser, BindingPower::Default)?)
    } else {
        None
    };

    Ok(parser.insert_decl(
        DeclKind::Binding {
            introducer,
            pattern,
            annotation,
            initializer,
        },
        parser.span_from(start_token.span.start),
    ))
}

fn parse_binding_pattern(parser: &mut Parser) -> Result<Pattern, Error> {
    match parser.current_token_kind() {
        TokenKind::Underscore => {
            parser.advance();
            Ok(Pattern::Wildcard)
        }
        TokenKind::OpenParen => {
            parser.advance();
            let mut elements = vec![];
            while parser.current_token_kind() != TokenKind::CloseParen {
                elements.push(parse_binding_pattern(parser)?);
                if !parser.eat(TokenKind::Comma) {
                    break;
                }
            }
            parser.expect(TokenKind::CloseParen)?;
            Ok(Pattern::Tuple(elements))
        }
        _ => Ok(Pattern::Name(parse_var(parser)?)),
    }
}

/// A variable declaration for the identifier at the current token.
pub fn parse_var(parser: &mut Parser) -> Result<DeclId, Error> {
    let token = parser.expect_detailed(
        TokenKind::Identifier,
        "expected identifier during variable declaration",
    )?;

    Ok(parser.insert_decl(DeclKind::Var { name: token.value }, token.span))
}

pub fn parse_binding_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    let binding = parse_binding_decl(parser)?;
    parser.expect(TokenKind::Semicolon)?;
    Ok(BlockMember::Decl(binding))
}

pub fn parse_fun_member(parser: &mut Parser) -> Result<BlockMember, Error> {
    Ok(BlockMember::Decl(parse_fun_decl(parser)?))
}

pub fn parse_brace_member(parser: &mut Parser) -> Result<BlockMember, Error> {
    Ok(BlockMember::Stmt(parse_brace_stmt(parser)?))
}

pub fn parse_brace_stmt(parser: &mut Parser) -> Result<StmtId, Error> {
    let start = parser.expect(TokenKind::OpenCurly)?.span.start;

    let mut members = Vec::new();
    while parser.current_token_kind() != TokenKind::CloseCurly {
        if !parser.has_tokens() {
            return Err(parser.unexpected("expected `}` before end of file"));
        }
        members.push(parse_stmt(parser)?);
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.insert_stmt(StmtKind::Brace { members }, parser.span_from(start)))
}

pub fn parse_return_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    let start = parser.advance().span.start.clone();

    let value = if parser.current_token_kind() != TokenKind::Semicolon {
        Some(parse_expr(parser, BindingPower::Default)?)
    } else {
        None
    };

    parser.expect(TokenKind::Semicolon)?;

    Ok(BlockMember::Stmt(parser.insert_stmt(
        StmtKind::Ret { value },
        parser.span_from(start),
    )))
}

/// Comma-separated condition clauses of an `if` or `while`.
pub fn parse_conditions(parser: &mut Parser) -> Result<Vec<ConditionItem>, Error> {
    let mut condition = vec![];

    loop {
        let item = match parser.current_token_kind() {
            TokenKind::Let | TokenKind::Var => ConditionItem::Decl(parse_binding_decl(parser)?),
            _ => ConditionItem::Expr(parse_expr(parser, BindingPower::Default)?),
        };
        condition.push(item);

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    Ok(condition)
}

fn parse_if(parser: &mut Parser) -> Result<StmtId, Error> {
    let start = parser.advance().span.start.clone();

    let condition = parse_conditions(parser)?;
    let success = parse_brace_stmt(parser)?;

    let failure = if parser.eat(TokenKind::Else) {
        if parser.current_token_kind() == TokenKind::If {
            Some(parse_if(parser)?)
        } else {
            Some(parse_brace_stmt(parser)?)
        }
    } else {
        None
    };

    Ok(parser.insert_stmt(
        StmtKind::Cond {
            condition,
            success,
            failure,
        },
        parser.span_from(start),
    ))
}

pub fn parse_if_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    Ok(BlockMember::Stmt(parse_if(parser)?))
}

pub fn parse_while_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    let start = parser.advance().span.start.clone();

    let condition = parse_conditions(parser)?;
    let body = parse_brace_stmt(parser)?;

    Ok(BlockMember::Stmt(parser.insert_stmt(
        StmtKind::While { condition, body },
        parser.span_from(start),
    )))
}

pub fn parse_do_while_stmt(parser: &mut Parser) -> Result<BlockMember, Error> {
    let start = parser.advance().span.start.clone();

    let body = parse_brace_stmt(parser)?;
    parser.expect_detailed(TokenKind::While, "expected `while` after `do` body")?;
    let condition = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::Semicolon)?;

    Ok(BlockMember::Stmt(parser.insert_stmt(
        StmtKind::DoWhile { body, condition },
        parser.span_from(start),
    )))
}

pub fn parse_fun_decl(parser: &mut Parser) -> Result<DeclId, Error> {
    let start = parser.advance().span.start.clone();

    let name = parser
        .expect_detailed(TokenKind::Identifier, "expected function name")?
        .value;

    let mut generic_params = vec![];
    if parser.eat(TokenKind::Less) {
        loop {
            let token = parser.expect_detailed(TokenKind::Identifier, "expected generic parameter")?;
            generic_params.push(
                parser.insert_decl(DeclKind::GenericParam { name: token.value }, token.span),
            );
            if !parser.eat(TokenKind::Comma) {
                break;
            }
        }
        parser.expect(TokenKind::Greater)?;
    }

    parser.expect(TokenKind::OpenParen)?;

    let mut params = Vec::new();
    while parser.current_token_kind() != TokenKind::CloseParen {
        let token = parser.expect_detailed(TokenKind::Identifier, "expected parameter name")?;
        parser.expect(TokenKind::Colon)?;
        let annotation = parse_type(parser)?;
        let span = parser.span_from(token.span.start);
        params.push(parser.insert_decl(
            DeclKind::Param {
                name: token.value,
                annotation,
            },
            span,
        ));

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    parser.expect(TokenKind::CloseParen)?;

    let output = if parser.eat(TokenKind::Arrow) {
        Some(parse_type(parser)?)
    } else {
        None
    };

    let mut where_clause = vec![];
    if parser.eat(TokenKind::Where) {
        loop {
            where_clause.push(parse_where_requirement(parser)?);
            if !parser.eat(TokenKind::Comma) {
                break;
            }
        }
    }

    let body = if parser.eat(TokenKind::Semicolon) {
        None
    } else {
        Some(parse_brace_stmt(parser)?)
    };

    Ok(parser.insert_decl(
        DeclKind::Fun {
            name,
            generic_params,
            params,
            output,
            where_clause,
            body,
        },
        parser.span_from(start),
    ))
}

fn parse_where_requirement(parser: &mut Parser) -> Result<WhereRequirement, Error> {
    let token = parser.expect_detailed(TokenKind::Identifier, "expected generic parameter")?;

    if parser.eat(TokenKind::Equals) {
        let ty = parse_type(parser)?;
        return Ok(WhereRequirement::Equality {
            param: token.value,
            ty,
            span: parser.span_from(token.span.start),
        });
    }

    parser.expect_detailed(TokenKind::Colon, "expected `==` or `:` in where clause")?;

    let mut traits = vec![parse_trait_name(parser)?];
    while parser.eat(TokenKind::Ampersand) {
        traits.push(parse_trait_name(parser)?);
    }

    Ok(WhereRequirement::Conformance {
        param: token.value,
        traits,
        span: parser.span_from(token.span.start),
    })
}

pub fn parse_trait_name(parser: &mut Parser) -> Result<TraitName, Error> {
    let token = parser.expect_detailed(TokenKind::Identifier, "expected trait name")?;
    Ok(TraitName {
        name: token.value,
        span: token.span,
    })
}

/// `: A, B` after a trait or type name.
fn parse_trait_list(parser: &mut Parser) -> Result<Vec<TraitName>, Error> {
    let mut traits = vec![];
    if parser.eat(TokenKind::Colon) {
        loop {
            traits.push(parse_trait_name(parser)?);
            if !parser.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    Ok(traits)
}

pub fn parse_trait_decl(parser: &mut Parser) -> Result<DeclId, Error> {
    let start = parser.advance().span.start.clone();

    let name = parser
        .expect_detailed(TokenKind::Identifier, "expected trait name")?
        .value;
    let refinements = parse_trait_list(parser)?;

    parser.expect(TokenKind::OpenCurly)?;

    let mut members = vec![];
    while parser.current_token_kind() != TokenKind::CloseCurly {
        if parser.current_token_kind() != TokenKind::Fun {
            return Err(parser.unexpected("traits may only declare functions"));
        }
        members.push(parse_fun_decl(parser)?);
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.insert_decl(
        DeclKind::Trait {
            name,
            refinements,
            members,
        },
        parser.span_from(start),
    ))
}

pub fn parse_product_decl(parser: &mut Parser) -> Result<DeclId, Error> {
    let start = parser.advance().span.start.clone();

    let name = parser
        .expect_detailed(TokenKind::Identifier, "expected type name")?
        .value;
    let conformances = parse_trait_list(parser)?;

    parser.expect(TokenKind::OpenCurly)?;

    let mut members = vec![];
    while parser.current_token_kind() != TokenKind::CloseCurly {
        match parser.current_token_kind() {
            TokenKind::Fun => members.push(parse_fun_decl(parser)?),
            TokenKind::Let | TokenKind::Var => {
                members.push(parse_binding_decl(parser)?);
                parser.expect(TokenKind::Semicolon)?;
            }
            _ => return Err(parser.unexpected("expected a property or function")),
        }
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.insert_decl(
        DeclKind::Product {
            name,
            conformances,
            members,
        },
        parser.span_from(start),
    ))
}
