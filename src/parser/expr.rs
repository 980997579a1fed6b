use crate::{
    ast::{
        ast::ExprId,
        expressions::{BinaryOperator, ExprKind, MatchCase, PrefixOperator},
        types::Pattern,
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
};

use super::{
    lookups::BindingPower,
    parser::Parser,
    stmt::{parse_conditions, parse_var},
};

pub fn parse_expr(parser: &mut Parser, bp: BindingPower) -> Result<ExprId, Error> {
    // First parse NUD
    let token_kind = parser.current_token_kind();
    let Some(nud) = parser.get_nud_lookup().get(&token_kind).copied() else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: parser.current_token().value.clone(),
            },
            parser.get_position(),
        ));
    };

    let mut left = nud(parser)?;

    // While LED and current BP is less than BP of current token, continue parsing lhs
    loop {
        let token_kind = parser.current_token_kind();
        let next_bp = *parser
            .get_bp_lookup()
            .get(&token_kind)
            .unwrap_or(&BindingPower::Default);
        if next_bp <= bp {
            break;
        }

        let Some(led) = parser.get_led_lookup().get(&token_kind).copied() else {
            return Err(Error::new(
                ErrorImpl::UnexpectedToken {
                    token: parser.current_token().value.clone(),
                },
                parser.get_position(),
            ));
        };

        left = led(parser, left, next_bp)?;
    }

    Ok(left)
}

pub fn parse_primary_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    let token = parser.current_token().clone();

    let kind = match token.kind {
        TokenKind::Number => match token.value.parse() {
            Ok(value) => ExprKind::Int(value),
            Err(_) => {
                return Err(Error::new(
                    ErrorImpl::NumberParseError { token: token.value },
                    token.span.start,
                ))
            }
        },
        TokenKind::Identifier => ExprKind::Name(token.value),
        TokenKind::String => ExprKind::Str(token.value),
        TokenKind::True => ExprKind::Bool(true),
        TokenKind::False => ExprKind::Bool(false),
        _ => {
            return Err(Error::new(
                ErrorImpl::UnexpectedToken { token: token.value },
                token.span.start,
            ))
        }
    };

    parser.advance();
    Ok(parser.insert_expr(kind, token.span))
}

pub fn parse_binary_expr(
    parser: &mut Parser,
    left: ExprId,
    bp: BindingPower,
) -> Result<ExprId, Error> {
    let operator_token = parser.advance().clone();
    let Some(operator) = BinaryOperator::from_token(operator_token.kind) else {
        return Err(Error::new(
            ErrorImpl::UnexpectedToken {
                token: operator_token.value,
            },
            operator_token.span.start,
        ));
    };

    let right = parse_expr(parser, bp)?;
    let start = parser.expr_span(left).start.clone();

    Ok(parser.insert_expr(
        ExprKind::Binary {
            operator,
            left,
            right,
        },
        parser.span_from(start),
    ))
}

pub fn parse_prefix_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    let operator_token = parser.advance().clone();
    let operator = if operator_token.kind == TokenKind::Not {
        PrefixOperator::Not
    } else {
        PrefixOperator::Neg
    };

    let operand = parse_expr(parser, BindingPower::Unary)?;

    Ok(parser.insert_expr(
        ExprKind::Prefix { operator, operand },
        parser.span_from(operator_token.span.start),
    ))
}

pub fn parse_assignment_expr(
    parser: &mut Parser,
    left: ExprId,
    bp: BindingPower,
) -> Result<ExprId, Error> {
    parser.advance();
    let value = parse_expr(parser, bp)?;
    let start = parser.expr_span(left).start.clone();

    Ok(parser.insert_expr(
        ExprKind::Assign {
            assignee: left,
            value,
        },
        parser.span_from(start),
    ))
}

/// `()`, `(e)` or `(e, f, ...)`.
pub fn parse_grouping_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    let start = parser.advance().span.start.clone();

    let mut elements = vec![];
    let mut trailing_comma = false;
    while parser.current_token_kind() != TokenKind::CloseParen {
        elements.push(parse_expr(parser, BindingPower::Default)?);
        trailing_comma = parser.eat(TokenKind::Comma);
        if !trailing_comma {
            break;
        }
    }

    parser.expect(TokenKind::CloseParen)?;

    if elements.len() == 1 && !trailing_comma {
        return Ok(elements[0]);
    }

    Ok(parser.insert_expr(ExprKind::Tuple(elements), parser.span_from(start)))
}

pub fn parse_call_expr(
    parser: &mut Parser,
    left: ExprId,
    _bp: BindingPower,
) -> Result<ExprId, Error> {
    parser.advance();

    let mut arguments = vec![];
    while parser.current_token_kind() != TokenKind::CloseParen {
        arguments.push(parse_expr(parser, BindingPower::Default)?);
        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    parser.expect(TokenKind::CloseParen)?;
    let start = parser.expr_span(left).start.clone();

    Ok(parser.insert_expr(
        ExprKind::Call {
            callee: left,
            arguments,
        },
        parser.span_from(start),
    ))
}

pub fn parse_member_expr(
    parser: &mut Parser,
    left: ExprId,
    _bp: BindingPower,
) -> Result<ExprId, Error> {
    parser.advance();
    let member = parser
        .expect_detailed(TokenKind::Identifier, "expected member name after `.`")?
        .value;
    let start = parser.expr_span(left).start.clone();

    Ok(parser.insert_expr(
        ExprKind::Member { base: left, member },
        parser.span_from(start),
    ))
}

/// `if conds { e } else { e }`
pub fn parse_cond_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    let start = parser.advance().span.start.clone();
    let condition = parse_conditions(parser)?;

    let success = parse_braced_expr(parser)?;
    parser.expect_detailed(TokenKind::Else, "conditional expressions need an `else` branch")?;
    let failure = if parser.current_token_kind() == TokenKind::If {
        parse_cond_expr(parser)?
    } else {
        parse_braced_expr(parser)?
    };

    Ok(parser.insert_expr(
        ExprKind::Cond {
            condition,
            success,
            failure,
        },
        parser.span_from(start),
    ))
}

fn parse_braced_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    parser.expect(TokenKind::OpenCurly)?;
    let expr = parse_expr(parser, BindingPower::Default)?;
    parser.expect(TokenKind::CloseCurly)?;
    Ok(expr)
}

/// `match e { case p { e } ... }`
pub fn parse_match_expr(parser: &mut Parser) -> Result<ExprId, Error> {
    let start = parser.advance().span.start.clone();
    let subject = parse_expr(parser, BindingPower::Default)?;

    parser.expect(TokenKind::OpenCurly)?;

    let mut cases = vec![];
    while parser.current_token_kind() != TokenKind::CloseCurly {
        let case_start = parser
            .expect_detailed(TokenKind::Case, "expected `case` in match body")?
            .span
            .start;
        let pattern = parse_case_pattern(parser)?;
        let body = parse_braced_expr(parser)?;

        cases.push(parser.insert_case(MatchCase {
            pattern,
            body,
            span: parser.span_from(case_start),
        }));
    }

    parser.expect(TokenKind::CloseCurly)?;

    Ok(parser.insert_expr(
        ExprKind::Match { subject, cases },
        parser.span_from(start),
    ))
}

fn parse_case_pattern(parser: &mut Parser) -> Result<Pattern, Error> {
    match parser.current_token_kind() {
        TokenKind::Let => {
            parser.advance();
            Ok(Pattern::Name(parse_var(parser)?))
        }
        TokenKind::Underscore => {
            parser.advance();
            Ok(Pattern::Wildcard)
        }
        TokenKind::OpenParen => {
            parser.advance();
            let mut elements = vec![];
            while parser.current_token_kind() != TokenKind::CloseParen {
                elements.push(parse_case_pattern(parser)?);
                if !parser.eat(TokenKind::Comma) {
                    break;
                }
            }
            parser.expect(TokenKind::CloseParen)?;

            if elements.len() == 1 {
                Ok(elements.remove(0))
            } else {
                Ok(Pattern::Tuple(elements))
            }
        }
        _ => Ok(Pattern::Expr(parse_expr(parser, BindingPower::Default)?)),
    }
}
