use nom::{
    character::complete::char,
    combinator::opt,
    error::context,
    multi::separated_list0,
    sequence::preceded,
    Parser,
};

use super::ast::ClassRef;
use super::common::{identifier, keyword, ws, PResult};
use super::expression::parse_expression;

/// `[ONLY] [schema.]Class [[AS] alias]` or `[schema.]function(args) [[AS] alias]`
pub fn parse_class_ref(input: &'_ str) -> PResult<'_, ClassRef<'_>> {
    class_ref(input, true)
}

/// INSERT target: a parenthesis after the class name opens the property list
pub fn parse_insert_target(input: &'_ str) -> PResult<'_, ClassRef<'_>> {
    class_ref(input, false)
}

fn class_ref(input: &'_ str, allow_args: bool) -> PResult<'_, ClassRef<'_>> {
    let (input, only) = opt(keyword("ONLY")).parse(input)?;
    let (input, first) = context("expected class name", identifier).parse(input)?;
    let (input, second) = opt(preceded(char('.'), identifier)).parse(input)?;
    let (schema, name) = match second {
        Some(name) => (Some(first), name),
        None => (None, first),
    };

    let (input, function_args) = match ws(char('(')).parse(input) {
        Ok((rest, _)) if allow_args => {
            let (rest, args) = separated_list0(ws(char(',')), parse_expression).parse(rest)?;
            let (rest, _) = context("expected ')' after function arguments", ws(char(')'))).parse(rest)?;
            (rest, Some(args))
        }
        Ok(_) | Err(nom::Err::Error(_)) => (input, None),
        Err(e) => return Err(e),
    };

    let (input, alias) = parse_alias(input)?;

    Ok((
        input,
        ClassRef {
            only: only.is_some(),
            schema,
            name,
            function_args,
            alias,
        },
    ))
}

/// Optional `[AS] alias`
pub fn parse_alias(input: &'_ str) -> PResult<'_, Option<&'_ str>> {
    if let Ok((rest, _)) = keyword("AS").parse(input) {
        let (rest, alias) = context("expected alias after AS", identifier).parse(rest)?;
        return Ok((rest, Some(alias)));
    }
    opt(identifier).parse(input)
}
