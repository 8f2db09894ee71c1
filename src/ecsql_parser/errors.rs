use nom::error::{ContextError, ParseError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, PartialEq)]
pub struct EcSqlParsingError<'a> {
    pub errors: Vec<(&'a str, &'static str)>,
}

impl<'a> ParseError<&'a str> for EcSqlParsingError<'a> {
    fn from_error_kind(input: &'a str, _kind: nom::error::ErrorKind) -> Self {
        EcSqlParsingError {
            errors: vec![(input, "unexpected input")],
        }
    }

    fn append(input: &'a str, _kind: nom::error::ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, "unexpected input (appended)"));
        other
    }
}

impl<'a> ContextError<&'a str> for EcSqlParsingError<'a> {
    fn add_context(input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, ctx));
        other
    }
}

impl fmt::Display for EcSqlParsingError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (input, ctx) in &self.errors {
            writeln!(f, "{}: {:}", ctx, input)?;
        }
        Ok(())
    }
}

impl<'a> From<nom::error::Error<&'a str>> for EcSqlParsingError<'a> {
    fn from(err: nom::error::Error<&'a str>) -> Self {
        EcSqlParsingError {
            errors: vec![(err.input, "Unable to parse")],
        }
    }
}

/// Owned parse failure with the byte offset of the offending text
#[derive(Debug, Clone, Error, PartialEq)]
#[error("ECSQL syntax error at offset {offset}: {message} near '{near}'")]
pub struct EcSqlParseError {
    pub offset: usize,
    pub message: String,
    pub near: String,
}

impl EcSqlParseError {
    /// Convert a nom error; `source` is the text that was parsed
    pub fn from_parsing_error(source: &str, err: &EcSqlParsingError<'_>) -> Self {
        // the innermost error has the smallest remaining input
        let (rest, message) = err
            .errors
            .iter()
            .min_by_key(|(rest, _)| rest.len())
            .copied()
            .unwrap_or((source, "Unable to parse"));
        let offset = source.len().saturating_sub(rest.len());
        EcSqlParseError {
            offset,
            message: message.to_string(),
            near: rest.chars().take(32).collect(),
        }
    }
}
