use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{cut, map, not, opt, peek, recognize},
    error::context,
    multi::{many1, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
    Parser,
};

use super::ast::{BinaryOperator, Case, Expression, FunctionCall, Literal, Parameter, UnaryOperator};
use super::common::{identifier, is_ident_char, keyword, quoted_string, ws, PResult};
use super::errors::EcSqlParsingError;
use super::select_statement::parse_select_statement;

pub fn parse_expression(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, expression) = parse_logical_or.parse(input)?;
    Ok((input, expression))
}

/// Left-associative chain `operand (op operand)*`
fn fold_binary<'a, P, O>(input: &'a str, mut operand: P, mut operator: O) -> PResult<'a, Expression<'a>>
where
    P: Parser<&'a str, Output = Expression<'a>, Error = EcSqlParsingError<'a>>,
    O: Parser<&'a str, Output = BinaryOperator, Error = EcSqlParsingError<'a>>,
{
    let (input, lhs) = operand.parse(input)?;
    let mut remaining_input = input;
    let mut final_expression = lhs;
    loop {
        match operator.parse(remaining_input) {
            Ok((new_input, op)) => {
                let (new_input, rhs) = operand.parse(new_input)?;
                final_expression = Expression::Binary(op, Box::new(final_expression), Box::new(rhs));
                remaining_input = new_input;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((remaining_input, final_expression))
}

fn parse_logical_or(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_logical_and, map(keyword("OR"), |_| BinaryOperator::Or))
}

fn parse_logical_and(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_not, map(keyword("AND"), |_| BinaryOperator::And))
}

fn parse_not(input: &'_ str) -> PResult<'_, Expression<'_>> {
    if let Ok((rest, _)) = terminated(keyword("NOT"), not(peek(keyword("EXISTS")))).parse(input) {
        let (rest, operand) = parse_not(rest)?;
        return Ok((rest, Expression::Unary(UnaryOperator::Not, Box::new(operand))));
    }
    parse_predicate(input)
}

fn comparison_operator(input: &'_ str) -> PResult<'_, BinaryOperator> {
    ws(alt((
        map(tag("<="), |_| BinaryOperator::LessThanEqual),
        map(tag(">="), |_| BinaryOperator::GreaterThanEqual),
        map(tag("<>"), |_| BinaryOperator::NotEqual),
        map(tag("!="), |_| BinaryOperator::NotEqual),
        map(tag("=="), |_| BinaryOperator::Equal),
        map(tag("="), |_| BinaryOperator::Equal),
        map(tag("<"), |_| BinaryOperator::LessThan),
        map(tag(">"), |_| BinaryOperator::GreaterThan),
    )))
    .parse(input)
}

/// Comparisons and the postfix predicates IS NULL, BETWEEN, IN and LIKE
fn parse_predicate(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, lhs) = parse_bitwise(input)?;
    let mut remaining_input = input;
    let mut expr = lhs;

    loop {
        if let Ok((rest, op)) = comparison_operator(remaining_input) {
            let (rest, rhs) = parse_bitwise(rest)?;
            expr = Expression::Binary(op, Box::new(expr), Box::new(rhs));
            remaining_input = rest;
            continue;
        }

        if let Ok((rest, _)) = keyword("IS").parse(remaining_input) {
            let (rest, negated) = opt(keyword("NOT")).parse(rest)?;
            let (rest, _) = context("expected NULL after IS", keyword("NULL")).parse(rest)?;
            expr = Expression::IsNull {
                operand: Box::new(expr),
                negated: negated.is_some(),
            };
            remaining_input = rest;
            continue;
        }

        let (rest, negated) = opt(keyword("NOT")).parse(remaining_input)?;
        let negated = negated.is_some();

        if let Ok((rest, _)) = keyword("BETWEEN").parse(rest) {
            let (rest, low) = parse_bitwise(rest)?;
            let (rest, _) = context("expected AND in BETWEEN", keyword("AND")).parse(rest)?;
            let (rest, high) = parse_bitwise(rest)?;
            expr = Expression::Between {
                operand: Box::new(expr),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            };
            remaining_input = rest;
            continue;
        }

        if let Ok((rest, _)) = keyword("IN").parse(rest) {
            let (rest, _) = ws(char('(')).parse(rest)?;
            if let Ok((rest, subquery)) = parse_select_statement(rest) {
                let (rest, _) = ws(char(')')).parse(rest)?;
                expr = Expression::InSubquery {
                    operand: Box::new(expr),
                    subquery: Box::new(subquery),
                    negated,
                };
                remaining_input = rest;
                continue;
            }
            let (rest, list) = separated_list0(ws(char(',')), parse_expression).parse(rest)?;
            let (rest, _) = context("expected ')' after IN list", ws(char(')'))).parse(rest)?;
            expr = Expression::InList {
                operand: Box::new(expr),
                list,
                negated,
            };
            remaining_input = rest;
            continue;
        }

        if let Ok((rest, _)) = keyword("LIKE").parse(rest) {
            let (rest, pattern) = parse_bitwise(rest)?;
            let (rest, escape) = opt(preceded(keyword("ESCAPE"), parse_bitwise)).parse(rest)?;
            expr = Expression::Like {
                operand: Box::new(expr),
                pattern: Box::new(pattern),
                escape: escape.map(Box::new),
                negated,
            };
            remaining_input = rest;
            continue;
        }

        break;
    }
    Ok((remaining_input, expr))
}

fn parse_bitwise(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(
        input,
        parse_additive,
        ws(alt((
            map(tag("<<"), |_| BinaryOperator::ShiftLeft),
            map(tag(">>"), |_| BinaryOperator::ShiftRight),
            map(char('&'), |_| BinaryOperator::BitAnd),
            map(terminated(char('|'), not(char('|'))), |_| BinaryOperator::BitOr),
        ))),
    )
}

fn parse_additive(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(
        input,
        parse_multiplicative,
        ws(alt((
            map(char('+'), |_| BinaryOperator::Add),
            map(char('-'), |_| BinaryOperator::Subtract),
        ))),
    )
}

fn parse_multiplicative(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(
        input,
        parse_concat,
        ws(alt((
            map(char('*'), |_| BinaryOperator::Multiply),
            map(char('/'), |_| BinaryOperator::Divide),
            map(char('%'), |_| BinaryOperator::Modulo),
        ))),
    )
}

fn parse_concat(input: &'_ str) -> PResult<'_, Expression<'_>> {
    fold_binary(input, parse_unary, map(ws(tag("||")), |_| BinaryOperator::Concat))
}

fn parse_unary(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, op) = opt(ws(alt((
        map(char('-'), |_| UnaryOperator::Minus),
        map(char('+'), |_| UnaryOperator::Plus),
        map(char('~'), |_| UnaryOperator::BitNot),
    ))))
    .parse(input)?;
    match op {
        Some(op) => {
            let (input, operand) = parse_unary(input)?;
            Ok((input, Expression::Unary(op, Box::new(operand))))
        }
        None => parse_primary(input),
    }
}

fn parse_primary(input: &'_ str) -> PResult<'_, Expression<'_>> {
    context(
        "expected expression",
        ws(alt((
            map(parse_literal, Expression::Literal),
            map(parse_parameter, Expression::Parameter),
            parse_case_expression,
            parse_exists_expression,
            parse_parenthesized,
            parse_function_call,
            map(parse_property_path, Expression::Property),
        ))),
    )
    .parse(input)
}

fn parse_parenthesized(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, _) = ws(char('(')).parse(input)?;
    if let Ok((rest, subquery)) = parse_select_statement(input) {
        let (rest, _) = ws(char(')')).parse(rest)?;
        return Ok((rest, Expression::Subquery(Box::new(subquery))));
    }
    let (input, expr) = parse_expression(input)?;
    let (input, _) = cut(context("expected ')'", ws(char(')')))).parse(input)?;
    Ok((input, expr))
}

fn parse_exists_expression(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, negated) = opt(keyword("NOT")).parse(input)?;
    let (input, _) = keyword("EXISTS").parse(input)?;
    let (input, subquery) = delimited(
        ws(char('(')),
        parse_select_statement,
        context("expected ')' after EXISTS subquery", ws(char(')'))),
    )
    .parse(input)?;
    let exists = Expression::Exists(Box::new(subquery));
    if negated.is_some() {
        Ok((input, Expression::Unary(UnaryOperator::Not, Box::new(exists))))
    } else {
        Ok((input, exists))
    }
}

fn parse_case_expression(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, _) = keyword("CASE").parse(input)?;
    let (input, operand) = if peek(keyword("WHEN")).parse(input).is_ok() {
        (input, None)
    } else {
        let (input, operand) = parse_expression(input)?;
        (input, Some(Box::new(operand)))
    };
    let (input, when_then) = many1(pair(
        preceded(keyword("WHEN"), parse_expression),
        preceded(keyword("THEN"), parse_expression),
    ))
    .parse(input)?;
    let (input, else_expr) = opt(preceded(keyword("ELSE"), parse_expression)).parse(input)?;
    let (input, _) = context("expected END", keyword("END")).parse(input)?;
    Ok((
        input,
        Expression::Case(Case {
            operand,
            when_then,
            else_expr: else_expr.map(Box::new),
        }),
    ))
}

fn parse_function_call(input: &'_ str) -> PResult<'_, Expression<'_>> {
    let (input, name) = identifier(input)?;
    let (input, _) = char('(').parse(input)?;
    let star: PResult<'_, _> = pair(ws(char('*')), ws(char(')'))).parse(input);
    if let Ok((rest, _)) = star {
        return Ok((
            rest,
            Expression::FunctionCall(FunctionCall {
                name,
                distinct: false,
                star: true,
                args: Vec::new(),
            }),
        ));
    }
    let (input, distinct) = opt(keyword("DISTINCT")).parse(input)?;
    let (input, args) = separated_list0(ws(char(',')), parse_expression).parse(input)?;
    let (input, _) = context("expected ')' after function arguments", ws(char(')'))).parse(input)?;
    Ok((
        input,
        Expression::FunctionCall(FunctionCall {
            name,
            distinct: distinct.is_some(),
            star: false,
            args,
        }),
    ))
}

/// `a.B.C`
pub fn parse_property_path(input: &'_ str) -> PResult<'_, Vec<&'_ str>> {
    separated_list1(char('.'), identifier).parse(input)
}

pub fn parse_parameter(input: &'_ str) -> PResult<'_, Parameter<'_>> {
    alt((
        map(terminated(char('?'), not(peek(one_of("0123456789")))), |_| Parameter::Positional),
        map(preceded(char(':'), take_while1(is_ident_char)), Parameter::Named),
    ))
    .parse(input)
}

fn parse_number(input: &'_ str) -> PResult<'_, Literal<'_>> {
    let (rest, text) = recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;
    if peek(nom::character::complete::satisfy::<_, &str, EcSqlParsingError<'_>>(is_ident_char))
        .parse(rest)
        .is_ok()
    {
        return Err(nom::Err::Error(EcSqlParsingError {
            errors: vec![(input, "malformed number")],
        }));
    }
    let is_real = text.contains(['.', 'e', 'E']);
    let literal = if is_real {
        text.parse::<f64>().ok().map(Literal::Real)
    } else {
        text.parse::<i64>()
            .ok()
            .map(Literal::Integer)
            .or_else(|| text.parse::<f64>().ok().map(Literal::Real))
    };
    match literal {
        Some(literal) => Ok((rest, literal)),
        None => Err(nom::Err::Failure(EcSqlParsingError {
            errors: vec![(input, "number out of range")],
        })),
    }
}

pub fn parse_literal(input: &'_ str) -> PResult<'_, Literal<'_>> {
    alt((
        map(preceded(tag_no_case("x"), quoted_string), Literal::Blob),
        map(quoted_string, Literal::String),
        parse_number,
        map(keyword("NULL"), |_| Literal::Null),
        map(keyword("TRUE"), |_| Literal::Boolean(true)),
        map(keyword("FALSE"), |_| Literal::Boolean(false)),
    ))
    .parse(input)
}
