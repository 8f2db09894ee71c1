use nom::{
    branch::alt,
    character::complete::char,
    combinator::{cut, map, opt},
    error::context,
    multi::separated_list1,
    sequence::{preceded, terminated},
    Parser,
};

use super::ast::{ClassRef, Join, JoinKind, OrderByItem, SelectItem, SelectStatement};
use super::class_ref::{parse_alias, parse_class_ref};
use super::common::{identifier, keyword, ws, PResult};
use super::expression::parse_expression;

pub fn parse_select_statement(input: &'_ str) -> PResult<'_, SelectStatement<'_>> {
    let (input, _) = keyword("SELECT").parse(input)?;
    let (input, quantifier) = opt(alt((
        map(keyword("DISTINCT"), |_| true),
        map(keyword("ALL"), |_| false),
    )))
    .parse(input)?;

    let (input, items) = context(
        "expected select item",
        separated_list1(ws(char(',')), parse_select_item),
    )
    .parse(input)?;

    let (input, _) = context("expected FROM", keyword("FROM")).parse(input)?;
    let (input, from): (&str, Vec<ClassRef>) = context(
        "expected class reference",
        separated_list1(ws(char(',')), parse_class_ref),
    )
    .parse(input)?;

    let mut joins = Vec::new();
    let mut remaining_input = input;
    loop {
        match parse_join(remaining_input) {
            Ok((rest, join)) => {
                joins.push(join);
                remaining_input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    let input = remaining_input;

    let (input, where_clause) = opt(preceded(keyword("WHERE"), cut(parse_expression))).parse(input)?;

    let (input, group_by) = match preceded(keyword("GROUP"), keyword("BY")).parse(input) {
        Ok((rest, _)) => separated_list1(ws(char(',')), parse_expression).parse(rest)?,
        Err(nom::Err::Error(_)) => (input, Vec::new()),
        Err(e) => return Err(e),
    };
    let (input, having) = opt(preceded(keyword("HAVING"), cut(parse_expression))).parse(input)?;

    let (input, order_by) = match preceded(keyword("ORDER"), keyword("BY")).parse(input) {
        Ok((rest, _)) => separated_list1(ws(char(',')), parse_order_by_item).parse(rest)?,
        Err(nom::Err::Error(_)) => (input, Vec::new()),
        Err(e) => return Err(e),
    };

    let (input, limit) = opt(preceded(keyword("LIMIT"), parse_expression)).parse(input)?;
    let (input, offset) = if limit.is_some() {
        opt(preceded(keyword("OFFSET"), parse_expression)).parse(input)?
    } else {
        (input, None)
    };

    Ok((
        input,
        SelectStatement {
            distinct: quantifier.unwrap_or(false),
            items,
            from,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        },
    ))
}

fn parse_select_item(input: &'_ str) -> PResult<'_, SelectItem<'_>> {
    let star: PResult<'_, char> = ws(char('*')).parse(input);
    if let Ok((rest, _)) = star {
        return Ok((rest, SelectItem::Wildcard(None)));
    }
    if let Ok((rest, alias)) = terminated(identifier, (char('.'), ws(char('*')))).parse(input) {
        return Ok((rest, SelectItem::Wildcard(Some(alias))));
    }
    let (input, expression) = parse_expression(input)?;
    let (input, alias) = parse_alias(input)?;
    Ok((input, SelectItem::Expression { expression, alias }))
}

fn parse_join(input: &'_ str) -> PResult<'_, Join<'_>> {
    let (input, kind) = alt((
        map((keyword("LEFT"), opt(keyword("OUTER")), keyword("JOIN")), |_| JoinKind::Left),
        map((keyword("INNER"), keyword("JOIN")), |_| JoinKind::Inner),
        map(keyword("JOIN"), |_| JoinKind::Inner),
    ))
    .parse(input)?;
    let (input, class_ref) = context("expected class reference after JOIN", parse_class_ref).parse(input)?;
    let (input, _) = context("expected ON", keyword("ON")).parse(input)?;
    let (input, on) = parse_expression(input)?;
    Ok((input, Join { kind, class_ref, on }))
}

fn parse_order_by_item(input: &'_ str) -> PResult<'_, OrderByItem<'_>> {
    let (input, expression) = parse_expression(input)?;
    let (input, direction) = opt(alt((
        map(keyword("ASC"), |_| false),
        map(keyword("DESC"), |_| true),
    )))
    .parse(input)?;
    Ok((
        input,
        OrderByItem {
            expression,
            descending: direction.unwrap_or(false),
        },
    ))
}
