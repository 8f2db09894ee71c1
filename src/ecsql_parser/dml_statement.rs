use nom::{
    character::complete::char,
    combinator::{cut, opt},
    error::context,
    multi::separated_list1,
    sequence::{delimited, preceded},
    Parser,
};

use super::ast::{Assignment, DeleteStatement, InsertStatement, UpdateStatement};
use super::class_ref::{parse_class_ref, parse_insert_target};
use super::common::{keyword, ws, PResult};
use super::expression::{parse_expression, parse_property_path};

/// `INSERT INTO classref (p, ...) VALUES (e, ...)`
pub fn parse_insert_statement(input: &'_ str) -> PResult<'_, InsertStatement<'_>> {
    let (input, _) = keyword("INSERT").parse(input)?;
    let (input, _) = context("expected INTO", keyword("INTO")).parse(input)?;
    let (input, class_ref) = parse_insert_target(input)?;
    let (input, properties) = context(
        "expected property list",
        delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), parse_property_path),
            ws(char(')')),
        ),
    )
    .parse(input)?;
    let (input, _) = context("expected VALUES", keyword("VALUES")).parse(input)?;
    let (input, values) = context(
        "expected value list",
        delimited(
            ws(char('(')),
            separated_list1(ws(char(',')), parse_expression),
            ws(char(')')),
        ),
    )
    .parse(input)?;

    if properties.len() != values.len() {
        return Err(nom::Err::Failure(super::errors::EcSqlParsingError {
            errors: vec![(input, "property and value counts differ")],
        }));
    }

    Ok((
        input,
        InsertStatement {
            class_ref,
            properties,
            values,
        },
    ))
}

/// `UPDATE classref SET p = e, ... [WHERE expr]`
pub fn parse_update_statement(input: &'_ str) -> PResult<'_, UpdateStatement<'_>> {
    let (input, _) = keyword("UPDATE").parse(input)?;
    let (input, class_ref) = parse_class_ref(input)?;
    let (input, _) = context("expected SET", keyword("SET")).parse(input)?;
    let (input, assignments) = separated_list1(ws(char(',')), parse_assignment).parse(input)?;
    let (input, where_clause) = opt(preceded(keyword("WHERE"), cut(parse_expression))).parse(input)?;
    Ok((
        input,
        UpdateStatement {
            class_ref,
            assignments,
            where_clause,
        },
    ))
}

fn parse_assignment(input: &'_ str) -> PResult<'_, Assignment<'_>> {
    let (input, property) = parse_property_path(input)?;
    let (input, _) = context("expected '='", ws(char('='))).parse(input)?;
    let (input, value) = parse_expression(input)?;
    Ok((input, Assignment { property, value }))
}

/// `DELETE FROM classref [WHERE expr]`
pub fn parse_delete_statement(input: &'_ str) -> PResult<'_, DeleteStatement<'_>> {
    let (input, _) = keyword("DELETE").parse(input)?;
    let (input, _) = context("expected FROM", keyword("FROM")).parse(input)?;
    let (input, class_ref) = parse_class_ref(input)?;
    let (input, where_clause) = opt(preceded(keyword("WHERE"), cut(parse_expression))).parse(input)?;
    Ok((
        input,
        DeleteStatement {
            class_ref,
            where_clause,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert() {
        let (rest, insert) =
            parse_insert_statement("INSERT INTO ts.Foo (Name, Addr.Street) VALUES ('x', ?)").unwrap();
        assert_eq!(rest, "");
        assert_eq!(insert.properties, vec![vec!["Name"], vec!["Addr", "Street"]]);
        assert_eq!(insert.values.len(), 2);
    }

    #[test]
    fn test_insert_count_mismatch_is_failure() {
        assert!(matches!(
            parse_insert_statement("INSERT INTO ts.Foo (A, B) VALUES (1)"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_update_and_delete() {
        let (_, update) = parse_update_statement("UPDATE ONLY ts.Foo SET A = 1, B = :b WHERE ECInstanceId = ?").unwrap();
        assert!(update.class_ref.only);
        assert_eq!(update.assignments.len(), 2);
        assert!(update.where_clause.is_some());

        let (rest, delete) = parse_delete_statement("DELETE FROM ts.Foo").unwrap();
        assert_eq!(rest, "");
        assert!(delete.where_clause.is_none());
    }
}
