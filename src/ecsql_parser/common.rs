use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{not, peek, recognize},
    error::ParseError,
    sequence::{delimited, pair, terminated},
    IResult, Parser,
};

use super::errors::EcSqlParsingError;

pub type PResult<'a, T> = IResult<&'a str, T, EcSqlParsingError<'a>>;

const RESERVED_WORDS: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CROSS", "DELETE", "DESC", "DISTINCT",
    "ELSE", "END", "ESCAPE", "EXISTS", "FALSE", "FROM", "GROUP", "HAVING", "IN", "INNER", "INSERT",
    "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "ONLY", "OR",
    "ORDER", "OUTER", "SELECT", "SET", "THEN", "TRUE", "UNION", "UPDATE", "VALUES", "WHEN", "WHERE",
];

pub fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Case-insensitive keyword that is not the prefix of a longer word
/// ("OR" does not match "ORDER")
pub fn keyword<'a>(
    kw: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = EcSqlParsingError<'a>> {
    ws(terminated(tag_no_case(kw), not(peek(satisfy(is_ident_char)))))
}

fn bare_identifier(input: &str) -> PResult<'_, &str> {
    let (rest, ident) = recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))
    .parse(input)?;
    if is_reserved(ident) {
        return Err(nom::Err::Error(EcSqlParsingError {
            errors: vec![(input, "reserved word used as identifier")],
        }));
    }
    Ok((rest, ident))
}

/// `[any text]`; brackets escape reserved words
fn bracketed_identifier(input: &str) -> PResult<'_, &str> {
    delimited(char('['), take_while1(|c| c != ']'), char(']')).parse(input)
}

pub fn identifier(input: &str) -> PResult<'_, &str> {
    ws(alt((bracketed_identifier, bare_identifier))).parse(input)
}

/// Blank out `--` and `/* */` comments, keeping byte offsets intact.
/// Comment markers inside string literals and bracketed identifiers are text.
pub fn strip_comments(input: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        String,
        Bracket,
        LineComment,
        BlockComment,
    }
    let mut out = String::with_capacity(input.len());
    let mut state = State::Code;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '\'' => {
                    state = State::String;
                    out.push(c);
                }
                '[' => {
                    state = State::Bracket;
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            State::String => {
                if c == '\'' {
                    state = State::Code;
                }
                out.push(c);
            }
            State::Bracket => {
                if c == ']' {
                    state = State::Code;
                }
                out.push(c);
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push(c);
                } else {
                    out.extend(std::iter::repeat(' ').take(c.len_utf8()));
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else if c == '\n' {
                    out.push(c);
                } else {
                    out.extend(std::iter::repeat(' ').take(c.len_utf8()));
                }
            }
        }
    }
    out
}

/// Parse the text between single quotes, with `''` as an escaped quote
pub fn quoted_string(input: &str) -> PResult<'_, &str> {
    let (after_open, _) = char('\'').parse(input)?;
    let bytes = after_open.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Ok((&after_open[i + 1..], &after_open[..i]));
        }
        i += 1;
    }
    Err(nom::Err::Failure(EcSqlParsingError {
        errors: vec![(input, "unterminated string literal")],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::bytes::complete::tag;

    #[test]
    fn test_ws() {
        assert_eq!(
            ws(tag::<&str, &str, nom::error::Error<&str>>("test")).parse("   test   "),
            Ok(("", "test"))
        );
        assert_eq!(
            ws(tag::<&str, &str, nom::error::Error<&str>>("test")).parse("test"),
            Ok(("", "test"))
        );
    }

    #[test]
    fn test_keyword_needs_word_boundary() {
        assert!(keyword("OR").parse("ORDER BY x").is_err());
        assert_eq!(keyword("or").parse(" OR x"), Ok(("x", "OR")));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(identifier("Foo_1 x"), Ok(("x", "Foo_1")));
        assert_eq!(identifier("[Select]"), Ok(("", "Select")));
        assert!(identifier("WHERE").is_err());
        assert!(identifier("1abc").is_err());
    }

    #[test]
    fn test_strip_comments_keeps_offsets() {
        let source = "SELECT a -- note\nFROM /* x */ B WHERE s = '--not'";
        let stripped = strip_comments(source);
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains("note"));
        assert!(!stripped.contains("/*"));
        assert!(stripped.contains("'--not'"));
        assert_eq!(stripped.find("FROM"), source.find("FROM"));
    }

    #[test]
    fn test_quoted_string() {
        assert_eq!(quoted_string("'it''s' x"), Ok((" x", "it''s")));
        assert!(quoted_string("'open").is_err());
    }
}
