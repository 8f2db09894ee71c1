//! Unit tests for ECSQL parsing edge cases and error handling
//!
//! Tests malformed statements, comments and parameters to ensure robust
//! parsing without panics.

#[cfg(test)]
mod ecsql_parser_tests {
    use ecdb::ecsql_parser::{parse_ecsql, strip_comments, StatementKind};
    use test_case::test_case;

    #[test_case("SELECT ECInstanceId FROM ts.Foo", StatementKind::Select ; "plain select")]
    #[test_case("select distinct Name from ONLY ts.Foo", StatementKind::Select ; "lower case distinct only")]
    #[test_case("SELECT count(*) FROM ts.Foo WHERE Size > 3", StatementKind::Select ; "count star")]
    #[test_case("SELECT f.Name FROM ts.Foo f JOIN ts.Bar b ON b.Foo.Id = f.ECInstanceId", StatementKind::Select ; "join on navigation id")]
    #[test_case("SELECT f.Name FROM ts.Foo f LEFT JOIN ts.Bar b ON b.Name = f.Name ORDER BY f.Name DESC LIMIT 5 OFFSET 2", StatementKind::Select ; "left join order limit")]
    #[test_case("SELECT value FROM json_each(?)", StatementKind::Select ; "table valued function")]
    #[test_case("SELECT Addr.Loc.X FROM ts.Foo WHERE EXISTS (SELECT 1 FROM ts.Bar)", StatementKind::Select ; "nested path and exists")]
    #[test_case("INSERT INTO ts.Foo (Name, Size) VALUES (?, 3)", StatementKind::Insert ; "insert")]
    #[test_case("UPDATE ts.Foo SET Name = :name WHERE ECInstanceId = :id", StatementKind::Update ; "update")]
    #[test_case("DELETE FROM ONLY ts.Foo WHERE Name IS NULL", StatementKind::Delete ; "delete")]
    #[test_case("SELECT Name FROM ts.Foo;", StatementKind::Select ; "trailing semicolon")]
    fn test_statement_kinds(ecsql: &str, expected: StatementKind) {
        let tree = parse_ecsql(ecsql).unwrap_or_else(|e| panic!("{}: {}", ecsql, e));
        assert_eq!(tree.statement_kind(), Some(expected));
    }

    #[test_case("" ; "empty")]
    #[test_case("SELECT" ; "select without items")]
    #[test_case("SELECT Name FROM" ; "missing class")]
    #[test_case("SELECT Name FROM ts.Foo WHERE" ; "dangling where")]
    #[test_case("SELECT (Name FROM ts.Foo" ; "unclosed paren")]
    #[test_case("INSERT INTO ts.Foo (Name VALUES (1)" ; "unclosed column list")]
    #[test_case("UPDATE ts.Foo Name = 1" ; "missing set")]
    #[test_case("DROP TABLE ts_Foo" ; "not ecsql")]
    #[test_case("SELECT Name FROM ts.Foo garbage here" ; "trailing tokens")]
    fn test_malformed_statements_are_errors(ecsql: &str) {
        assert!(parse_ecsql(ecsql).is_err(), "{} should not parse", ecsql);
    }

    #[test]
    fn test_error_reports_offset_of_unexpected_text() {
        let err = parse_ecsql("SELECT Name FROM ts.Foo ORDER Name").unwrap_err();
        assert!(err.offset >= 24, "offset {}", err.offset);
        assert!(err.to_string().starts_with("ECSQL syntax error at offset"));
    }

    #[test]
    fn test_parameters_are_numbered_in_order() {
        let tree =
            parse_ecsql("SELECT Name FROM ts.Foo WHERE Size > ? AND Name = :name OR Note = :NAME AND Size < ?")
                .unwrap();
        // a repeated name shares its index
        assert_eq!(tree.parameter_count(), 3);
        assert_eq!(tree.parameter_index("name"), Some(2));
        assert_eq!(tree.parameter_index(":Name"), Some(2));
        assert_eq!(tree.parameter_index("missing"), None);
    }

    #[test]
    fn test_comment_stripping_keeps_offsets() {
        let test_cases = vec![
            ("", ""),
            ("SELECT 1", "SELECT 1"),
            ("SELECT 1 -- c", "SELECT 1     "),
            ("/* c */SELECT 1", "       SELECT 1"),
            ("SELECT '--x' FROM [a/*b]", "SELECT '--x' FROM [a/*b]"),
            ("SELECT 1 /* a\nb */ x", "SELECT 1     \n     x"),
        ];

        for (input, expected) in test_cases {
            let result = strip_comments(input);
            assert_eq!(result, expected, "Failed for input: {:?}", input);
            assert_eq!(result.len(), input.len());
        }
    }

    #[test]
    fn test_comments_between_clauses() {
        let tree = parse_ecsql("SELECT Name -- the name\nFROM ts.Foo /* all rows */").unwrap();
        assert_eq!(tree.statement_kind(), Some(StatementKind::Select));
    }
}
