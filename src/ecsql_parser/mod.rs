//! ECSQL parser
//!
//! nom parsers produce a borrowed [`ast::EcSqlAst`]; [`parse_ecsql`] strips
//! comments, parses one statement and lowers it into an owned [`ExpTree`].

use nom::character::complete::{char, multispace0};
use nom::combinator::{opt, peek};
use nom::{IResult, Parser};

pub mod ast;
mod class_ref;
pub(crate) mod common;
mod dml_statement;
pub mod errors;
pub mod exp_tree;
mod expression;
mod select_statement;

pub use common::strip_comments;
pub use errors::EcSqlParseError;
pub use exp_tree::{ExpKind, ExpNode, ExpTree, FinalizeState, LiteralValue, NodeId, StatementKind};

use ast::EcSqlAst;
use common::{keyword, ws};
use errors::EcSqlParsingError;

/// Parse one SELECT, INSERT, UPDATE or DELETE with an optional trailing `;`
pub fn parse_statement(input: &'_ str) -> IResult<&'_ str, EcSqlAst<'_>, EcSqlParsingError<'_>> {
    let (input, _) = multispace0.parse(input)?;

    let (input, statement) = if peek(keyword("SELECT")).parse(input).is_ok() {
        let (rest, select) = select_statement::parse_select_statement(input)?;
        (rest, EcSqlAst::Select(select))
    } else if peek(keyword("INSERT")).parse(input).is_ok() {
        let (rest, insert) = dml_statement::parse_insert_statement(input)?;
        (rest, EcSqlAst::Insert(insert))
    } else if peek(keyword("UPDATE")).parse(input).is_ok() {
        let (rest, update) = dml_statement::parse_update_statement(input)?;
        (rest, EcSqlAst::Update(update))
    } else if peek(keyword("DELETE")).parse(input).is_ok() {
        let (rest, delete) = dml_statement::parse_delete_statement(input)?;
        (rest, EcSqlAst::Delete(delete))
    } else {
        return Err(nom::Err::Error(EcSqlParsingError {
            errors: vec![(input, "expected SELECT, INSERT, UPDATE or DELETE")],
        }));
    };

    let (input, _) = opt(ws(char(';'))).parse(input)?;
    Ok((input, statement))
}

/// Parse ECSQL text into an expression tree
pub fn parse_ecsql(ecsql: &str) -> Result<ExpTree, EcSqlParseError> {
    let source = strip_comments(ecsql);
    match parse_statement(&source) {
        Ok((rest, ast)) => {
            if !rest.trim().is_empty() {
                let trimmed = rest.trim_start();
                return Err(EcSqlParseError {
                    offset: source.len() - trimmed.len(),
                    message: "Unexpected tokens after statement".to_string(),
                    near: trimmed.chars().take(32).collect(),
                });
            }
            log::trace!("parsed ECSQL: {:?}", ast);
            Ok(ExpTree::lower(&ast))
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(EcSqlParseError::from_parsing_error(&source, &e))
        }
        Err(nom::Err::Incomplete(_)) => Err(EcSqlParseError {
            offset: source.len(),
            message: "incomplete statement".to_string(),
            near: String::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = parse_ecsql("SELECT a FROM ts.Foo garbage here").unwrap_err();
        assert_eq!(err.message, "Unexpected tokens after statement");
        assert_eq!(err.near, "here");
    }

    #[test]
    fn test_semicolon_and_comments() {
        let tree = parse_ecsql("-- header\nSELECT a /* col */ FROM ts.Foo;").unwrap();
        assert_eq!(tree.statement_kind(), Some(StatementKind::Select));
    }

    #[test]
    fn test_unknown_statement() {
        let err = parse_ecsql("  DROP TABLE x").unwrap_err();
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_error_offset_inside_statement() {
        let err = parse_ecsql("SELECT a FROM ts.Foo WHERE (a = 1").unwrap_err();
        assert!(err.offset >= 27, "offset {} message {}", err.offset, err.message);
    }
}
