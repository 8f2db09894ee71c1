//! Integration tests for prepared ECSQL statements
//!
//! Covers binding, stepping and typed reads, polymorphic queries over shared
//! tables, composite values, DML and the issues reported for rejected
//! statements.

#[cfg(test)]
mod statement_tests {
    use std::sync::Arc;

    use ecdb::ecsql_parser::parse_ecsql;
    use ecdb::ecsql_prepare::finalize::finalize;
    use ecdb::ecsql_prepare::{Issue, IssueCategory, IssueListener, PrepareContext, PrepareError};
    use ecdb::{EcDb, EcDbConfig, EcValue, StatementError, StepResult};
    use mockall::mock;
    use test_case::test_case;

    use crate::test_schemas::*;

    mock! {
        pub Listener {}
        impl IssueListener for Listener {
            fn on_issue(&self, issue: &Issue);
        }
    }

    fn insert_base_and_derived(ecdb: &EcDb) -> (i64, i64) {
        let mut base = ecdb.prepare("INSERT INTO ts.Base (X) VALUES (?)").unwrap();
        base.bind(1, 1i64).unwrap();
        base.step().unwrap();
        let mut derived = ecdb.prepare("INSERT INTO ts.Derived (X, Y) VALUES (?, ?)").unwrap();
        derived.bind(1, 2i64).unwrap();
        derived.bind(2, 2.5).unwrap();
        derived.step().unwrap();
        (base.last_inserted_id().unwrap(), derived.last_inserted_id().unwrap())
    }

    #[test]
    fn test_polymorphic_query_over_shared_table() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let (base_id, derived_id) = insert_base_and_derived(&ecdb);
        let base_class = ecdb.class_id("ts", "Base").unwrap();
        let derived_class = ecdb.class_id("ts", "Derived").unwrap();

        let mut stmt = ecdb
            .prepare("SELECT ECInstanceId, ECClassId, X FROM ts.Base ORDER BY X")
            .unwrap();
        let mut rows = Vec::new();
        while stmt.step().unwrap() == StepResult::Row {
            rows.push((
                stmt.get_value(0).unwrap().as_i64().unwrap(),
                stmt.get_value(1).unwrap().as_i64().unwrap(),
                stmt.get_value(2).unwrap(),
            ));
        }
        assert_eq!(
            rows,
            vec![
                (base_id, base_class, EcValue::Integer(1)),
                (derived_id, derived_class, EcValue::Integer(2)),
            ]
        );

        // Y is null on the row inserted as Base
        let y: Option<f64> = ecdb
            .store()
            .connection()
            .query_row("SELECT Y FROM ts_Base WHERE ECInstanceId = ?1", [base_id], |row| row.get(0))
            .unwrap();
        assert_eq!(y, None);

        let mut only = ecdb.prepare("SELECT count(*) FROM ONLY ts.Base").unwrap();
        only.step().unwrap();
        assert_eq!(only.get_value(0).unwrap().as_i64(), Some(1));

        let mut derived = ecdb.prepare("SELECT Y FROM ts.Derived").unwrap();
        assert_eq!(derived.step().unwrap(), StepResult::Row);
        assert_eq!(derived.get_value(0).unwrap(), EcValue::Double(2.5));
        assert_eq!(derived.step().unwrap(), StepResult::Done);
    }

    #[test]
    fn test_step_after_done_and_after_close() {
        let ecdb = store_with(vec![base_derived_schema()]);
        insert_base_and_derived(&ecdb);

        let mut stmt = ecdb.prepare("SELECT X FROM ts.Base WHERE X > ?").unwrap();
        stmt.bind(1, 1i64).unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
        assert!(matches!(stmt.get_value(0), Err(StatementError::NoRow)));

        // reset keeps the bindings
        stmt.reset().unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);

        stmt.close();
        assert!(stmt.is_closed());
        assert!(matches!(stmt.step(), Err(StatementError::Closed)));
        assert!(matches!(stmt.bind(1, 0i64), Err(StatementError::Closed)));
        assert!(matches!(stmt.reset(), Err(StatementError::Closed)));
        assert!(matches!(stmt.get_value(0), Err(StatementError::Closed)));
        assert!(matches!(stmt.column_info(0), Err(StatementError::Closed)));
        assert!(matches!(stmt.row_json(), Err(StatementError::Closed)));
    }

    #[test]
    fn test_closed_statement_does_not_read_struct_arrays() {
        let ecdb = store_with(vec![invoice_schema()]);
        let mut insert = ecdb.prepare("INSERT INTO ts.Invoice (Code, Items) VALUES ('A', ?)").unwrap();
        insert
            .bind(1, EcValue::Array(vec![EcValue::Struct(vec![("Sku".into(), "s".into())])]))
            .unwrap();
        insert.step().unwrap();

        let mut select = ecdb.prepare("SELECT Items FROM ts.Invoice").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        select.close();
        assert!(matches!(select.get_value(0), Err(StatementError::Closed)));
    }

    #[test]
    fn test_binding_errors() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut stmt = ecdb
            .prepare("SELECT X FROM ts.Base WHERE X = :x OR X = ?")
            .unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        assert_eq!(stmt.parameter_index(":X").unwrap(), 1);
        assert!(matches!(
            stmt.bind(3, 1i64),
            Err(StatementError::ParameterOutOfRange { index: 3, count: 2 })
        ));
        assert!(matches!(stmt.bind(0, 1i64), Err(StatementError::ParameterOutOfRange { .. })));
        assert!(matches!(
            stmt.bind_by_name("nope", 1i64),
            Err(StatementError::UnknownParameter(_))
        ));
        assert!(matches!(
            stmt.column_info(1),
            Err(StatementError::ColumnOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_update_and_delete_report_affected_instances() {
        let ecdb = store_with(vec![base_derived_schema()]);
        insert_base_and_derived(&ecdb);

        let mut update = ecdb.prepare("UPDATE ts.Base SET X = X + 10 WHERE X >= :min").unwrap();
        update.bind_by_name("min", 1i64).unwrap();
        assert_eq!(update.step().unwrap(), StepResult::Done);
        assert_eq!(update.affected_rows(), 2);

        let mut delete = ecdb.prepare("DELETE FROM ts.Derived").unwrap();
        delete.step().unwrap();
        assert_eq!(delete.affected_rows(), 1);

        let mut count = ecdb.prepare("SELECT count(*), max(X) FROM ts.Base").unwrap();
        count.step().unwrap();
        assert_eq!(count.get_value(0).unwrap().as_i64(), Some(1));
        assert_eq!(count.get_value(1).unwrap().as_i64(), Some(11));
    }

    #[test]
    fn test_struct_array_point_and_primitive_array() {
        let ecdb = store_with(vec![invoice_schema()]);
        let items = EcValue::Array(vec![
            EcValue::Struct(vec![("Sku".into(), "A-1".into()), ("Qty".into(), 2i64.into())]),
            EcValue::Struct(vec![("Sku".into(), "B-7".into()), ("Qty".into(), 5i64.into())]),
        ]);
        let tags = EcValue::Array(vec!["red".into(), "bulk".into()]);

        let mut insert = ecdb
            .prepare("INSERT INTO ts.Invoice (Code, Origin, Tags, Items) VALUES (?, ?, ?, ?)")
            .unwrap();
        insert.bind(1, "INV-1").unwrap();
        insert.bind(2, EcValue::Point2d { x: 1.5, y: -2.0 }).unwrap();
        insert.bind(3, tags.clone()).unwrap();
        insert.bind(4, items.clone()).unwrap();
        insert.step().unwrap();
        let id = insert.last_inserted_id().unwrap();

        let mut select = ecdb
            .prepare("SELECT Code, Origin, Origin.Y, Tags, Items FROM ts.Invoice WHERE ECInstanceId = ?")
            .unwrap();
        select.bind(1, id).unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::from("INV-1"));
        assert_eq!(select.get_value(1).unwrap(), EcValue::Point2d { x: 1.5, y: -2.0 });
        assert_eq!(select.get_value(2).unwrap(), EcValue::Double(-2.0));
        assert_eq!(select.get_value(3).unwrap(), tags);
        assert_eq!(select.get_value(4).unwrap(), items);

        let json = select.row_json().unwrap();
        assert_eq!(json["Items"][1]["Sku"], "B-7");
        assert_eq!(json["Tags"][0], "red");
    }

    #[test]
    fn test_struct_array_is_replaced_on_update() {
        let ecdb = store_with(vec![invoice_schema()]);
        let mut insert = ecdb.prepare("INSERT INTO ts.Invoice (Code, Items) VALUES ('X', ?)").unwrap();
        insert
            .bind(
                1,
                EcValue::Array(vec![EcValue::Struct(vec![("Sku".into(), "old".into())])]),
            )
            .unwrap();
        insert.step().unwrap();

        let replacement = EcValue::Array(vec![EcValue::Struct(vec![
            ("Sku".into(), "new".into()),
            ("Qty".into(), 1i64.into()),
        ])]);
        let mut update = ecdb.prepare("UPDATE ts.Invoice SET Items = ? WHERE Code = 'X'").unwrap();
        update.bind(1, replacement.clone()).unwrap();
        update.step().unwrap();

        let mut select = ecdb.prepare("SELECT Items FROM ts.Invoice").unwrap();
        select.step().unwrap();
        assert_eq!(select.get_value(0).unwrap(), replacement);
    }

    fn count(ecdb: &EcDb, ecsql: &str) -> i64 {
        let mut stmt = ecdb.prepare(ecsql).unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        stmt.get_value(0).unwrap().as_i64().unwrap()
    }

    #[test]
    fn test_insert_of_overflow_property_only() {
        let ecdb = store_with(vec![wide_schema(3, 4)]);
        let mut insert = ecdb.prepare("INSERT INTO ts.Wide (P4) VALUES (9)").unwrap();
        assert_eq!(insert.step().unwrap(), StepResult::Done);
        let id = insert.last_inserted_id().unwrap();

        let mut select = ecdb.prepare("SELECT P1, P4 FROM ts.Wide WHERE ECInstanceId = ?").unwrap();
        select.bind(1, id).unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::Null);
        assert_eq!(select.get_value(1).unwrap(), EcValue::Integer(9));
    }

    #[test]
    fn test_insert_of_instance_id_only() {
        let ecdb = store_with(vec![wide_schema(3, 4)]);
        let mut insert = ecdb.prepare("INSERT INTO ts.Wide (ECInstanceId) VALUES (77)").unwrap();
        insert.step().unwrap();
        assert_eq!(insert.last_inserted_id(), Some(77));
        assert_eq!(insert.affected_rows(), 1);

        assert_eq!(count(&ecdb, "SELECT count(*) FROM ts.Wide WHERE ECInstanceId = 77"), 1);
        let overflow_rows: i64 = ecdb
            .store()
            .connection()
            .query_row("SELECT count(*) FROM ts_Wide_Overflow WHERE ECInstanceId = 77", [], |row| row.get(0))
            .unwrap();
        assert_eq!(overflow_rows, 1);

        let mut update = ecdb.prepare("UPDATE ts.Wide SET P4 = 4 WHERE ECInstanceId = 77").unwrap();
        update.step().unwrap();
        assert_eq!(count(&ecdb, "SELECT P4 FROM ts.Wide"), 4);
    }

    #[test]
    fn test_insert_of_struct_array_only() {
        let ecdb = store_with(vec![invoice_schema()]);
        let items = EcValue::Array(vec![EcValue::Struct(vec![
            ("Sku".into(), "C-3".into()),
            ("Qty".into(), 1i64.into()),
        ])]);
        let mut insert = ecdb.prepare("INSERT INTO ts.Invoice (Items) VALUES (?)").unwrap();
        insert.bind(1, items.clone()).unwrap();
        insert.step().unwrap();
        let id = insert.last_inserted_id().unwrap();

        assert_eq!(count(&ecdb, "SELECT count(*) FROM ts.Invoice"), 1);
        let mut select = ecdb.prepare("SELECT ECInstanceId, Code, Items FROM ts.Invoice").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::Integer(id));
        assert_eq!(select.get_value(1).unwrap(), EcValue::Null);
        assert_eq!(select.get_value(2).unwrap(), items);
    }

    #[test]
    fn test_instance_ids_in_repository_range() {
        let config = EcDbConfig {
            repository_id: 5,
            ..EcDbConfig::default()
        };
        let ecdb = EcDb::open_in_memory(config).unwrap();
        let expected_first = (5i64 << 32) + 1;
        for local in 0..1000i64 {
            assert_eq!(ecdb.next_instance_id().unwrap(), expected_first + local);
        }
    }

    #[test]
    fn test_explicit_instance_id_is_kept() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut insert = ecdb
            .prepare("INSERT INTO ts.Base (ECInstanceId, X) VALUES (?, 3)")
            .unwrap();
        insert.bind(1, 4242i64).unwrap();
        insert.step().unwrap();
        assert_eq!(insert.last_inserted_id(), Some(4242));

        // a null id falls back to the sequence
        insert.reset().unwrap();
        insert.bind_null(1).unwrap();
        insert.step().unwrap();
        assert_eq!(insert.last_inserted_id(), Some(1));
    }

    #[test_case("SELECT X FROM ts.Base WHERE X IN (SELECT Y FROM ts.Derived d WHERE d.X = 1)" ; "subquery")]
    #[test_case("SELECT b.X FROM ts.Base b JOIN ts.Derived d ON d.ECInstanceId = b.ECInstanceId" ; "join")]
    #[test_case("SELECT Nope FROM ts.Base" ; "unknown property")]
    #[test_case("SELECT X FROM ts.Missing" ; "unknown class")]
    #[test_case("DELETE FROM json_each(?) WHERE value = 1" ; "delete from function")]
    #[test_case("UPDATE ts.Base SET X = (SELECT max(X) FROM ts.Base b2) WHERE EXISTS (SELECT 1 FROM ts.Derived)" ; "update with subqueries")]
    fn test_finalize_balances_context_frames(ecsql: &str) {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut tree = parse_ecsql(ecsql).unwrap();
        let mut ctx = PrepareContext::new();
        finalize(&mut tree, ecdb.snapshot(), ecdb.functions(), &mut ctx);
        let (pushes, pops) = ctx.balance();
        assert_eq!(pushes, pops, "{}", ecsql);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_delete_from_function_is_reported_to_listeners() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut listener = MockListener::new();
        listener
            .expect_on_issue()
            .withf(|issue: &Issue| issue.category == IssueCategory::BusinessRule && issue.message.contains("DELETE"))
            .times(1)
            .return_const(());
        ecdb.add_issue_listener(Arc::new(listener));

        let err = ecdb.prepare("DELETE FROM json_each(?) WHERE value = 1").unwrap_err();
        assert!(matches!(err, PrepareError::Semantic { .. }));
        assert_eq!(err.issues().len(), 1);
        assert_eq!(ecdb.cached_plan_count(), 0);
    }

    #[test]
    fn test_syntax_errors_are_reported_to_listeners() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut listener = MockListener::new();
        listener
            .expect_on_issue()
            .withf(|issue: &Issue| issue.category == IssueCategory::EcsqlSyntax)
            .times(1)
            .return_const(());
        ecdb.add_issue_listener(Arc::new(listener));

        let err = ecdb.prepare("SELECT X FROM ts.Base WHERE").unwrap_err();
        assert!(matches!(err, PrepareError::Syntax(_)));
    }

    #[test]
    fn test_json_each_as_table() {
        let ecdb = store_with(vec![base_derived_schema()]);
        let mut stmt = ecdb.prepare("SELECT value FROM json_each(?) ORDER BY value").unwrap();
        stmt.bind(1, "[3, 1, 2]").unwrap();
        let mut values = Vec::new();
        while stmt.step().unwrap() == StepResult::Row {
            values.push(stmt.get_value(0).unwrap().as_i64().unwrap());
        }
        assert_eq!(values, vec![1, 2, 3]);
    }
}
