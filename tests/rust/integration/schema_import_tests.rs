//! Integration tests for schema import and class mapping
//!
//! These tests import schemas into in-memory stores and check the resulting
//! property-to-column layout.

#[cfg(test)]
mod schema_import_tests {
    use std::io::Write;

    use ecdb::ec_catalog::{EcClass, EcProperty, EcSchema, PrimitiveType};
    use ecdb::{EcDb, EcDbConfig, EcValue, ImportError, StepResult};

    use crate::test_schemas::*;

    #[test]
    fn test_mapping_is_deterministic() {
        let schemas = || vec![base_derived_schema(), renamed(person_schema(false), "People", "ppl")];
        let first = store_with(schemas());
        let second = store_with(schemas());
        assert!(!layout(&first).is_empty());
        assert_eq!(layout(&first), layout(&second));
    }

    #[test]
    fn test_additive_import_keeps_existing_columns() {
        let mut ecdb = store_with(vec![person_schema(false)]);
        let before = layout(&ecdb);

        let report = ecdb.import_schemas(vec![person_schema(true)]).unwrap();
        let person = ecdb.class_id("ts", "Person").unwrap();
        assert!(report.updated_classes.contains(&person));
        assert_eq!(report.moved_properties, 0);

        let after = layout(&ecdb);
        for (access, column) in &before {
            assert_eq!(after.get(access), Some(column), "{} moved", access);
        }
        let added: Vec<&String> = after.keys().filter(|k| !before.contains_key(*k)).collect();
        assert_eq!(added, vec!["TestSchema.Person:Addr.Zip"]);
        assert_eq!(
            after["TestSchema.Person:Addr.Street"],
            before["TestSchema.Person:Addr.Street"]
        );
        assert_eq!(after["TestSchema.Person:Addr.City"], "ts_Person.Addr_City");
    }

    #[test]
    fn test_extended_struct_is_readable() {
        let mut ecdb = store_with(vec![person_schema(false)]);
        let mut insert = ecdb
            .prepare("INSERT INTO ts.Person (Name, Addr) VALUES (?, ?)")
            .unwrap();
        insert.bind(1, "Ann").unwrap();
        insert
            .bind(
                2,
                EcValue::Struct(vec![
                    ("Street".into(), "Main St".into()),
                    ("City".into(), "Springfield".into()),
                ]),
            )
            .unwrap();
        insert.step().unwrap();
        drop(insert);

        ecdb.import_schemas(vec![person_schema(true)]).unwrap();
        let mut select = ecdb.prepare("SELECT Addr FROM ts.Person").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        let addr = select.get_value(0).unwrap();
        assert_eq!(addr.leaf("Street"), EcValue::from("Main St"));
        assert_eq!(addr.leaf("City"), EcValue::from("Springfield"));
        assert_eq!(addr.leaf("Zip"), EcValue::Null);
    }

    #[test]
    fn test_property_past_shared_column_limit_goes_to_overflow() {
        let ecdb = store_with(vec![wide_schema(3, 4)]);
        let layout = layout(&ecdb);
        for i in 1..=3 {
            let column = &layout[&format!("TestSchema.Wide:P{}", i)];
            assert_eq!(column, &format!("ts_Wide.ps{}", i));
        }
        assert!(layout["TestSchema.Wide:P4"].starts_with("ts_Wide_Overflow."));

        let mut insert = ecdb
            .prepare("INSERT INTO ts.Wide (P1, P2, P3, P4) VALUES (1, 2, 3, 4)")
            .unwrap();
        insert.step().unwrap();
        let id = insert.last_inserted_id().unwrap();

        let mut select = ecdb
            .prepare("SELECT P1, P4 FROM ts.Wide WHERE ECInstanceId = ?")
            .unwrap();
        select.bind(1, id).unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::Integer(1));
        assert_eq!(select.get_value(1).unwrap(), EcValue::Integer(4));
    }

    #[test]
    fn test_overflow_on_incremental_import() {
        let mut ecdb = store_with(vec![wide_schema(3, 3)]);
        let before = layout(&ecdb);
        assert!(!ecdb.store().table_exists("ts_Wide_Overflow").unwrap());

        ecdb.import_schemas(vec![wide_schema(3, 4)]).unwrap();
        let after = layout(&ecdb);
        for (access, column) in &before {
            assert_eq!(after.get(access), Some(column));
        }
        assert!(after["TestSchema.Wide:P4"].starts_with("ts_Wide_Overflow."));
        assert!(ecdb.store().table_exists("ts_Wide_Overflow").unwrap());
    }

    #[test]
    fn test_exhausted_columns_reject_import() {
        let config = EcDbConfig {
            overflow_enabled: false,
            ..EcDbConfig::default()
        };
        let mut ecdb = EcDb::open_in_memory(config).unwrap();
        let err = ecdb.import_schemas(vec![wide_schema(1, 2)]).unwrap_err();
        assert!(matches!(err, ImportError::Mapping(_)));
        let diagnostic = &err.diagnostics()[0];
        assert_eq!(diagnostic.property.as_deref(), Some("P2"));
        // nothing of the failed import is visible
        assert_eq!(ecdb.class_id("ts", "Wide"), None);
        assert!(!ecdb.store().table_exists("ts_Wide").unwrap());
    }

    #[test]
    fn test_shared_table_hierarchy_columns() {
        let ecdb = store_with(vec![base_derived_schema()]);
        assert_eq!(
            table_columns(&ecdb, "ts_Base"),
            vec!["ECInstanceId", "ECClassId", "X", "Y"]
        );
        assert!(!ecdb.store().table_exists("ts_Derived").unwrap());
    }

    #[test]
    fn test_removing_a_property_is_rejected() {
        let mut ecdb = store_with(vec![person_schema(false)]);
        let without_name = EcSchema::new("TestSchema", "ts")
            .with_class(
                EcClass::struct_class("Address")
                    .with_property(EcProperty::primitive("Street", PrimitiveType::String))
                    .with_property(EcProperty::primitive("City", PrimitiveType::String)),
            )
            .with_class(EcClass::entity("Person").with_property(EcProperty::struct_property("Addr", "Address")));
        let err = ecdb.import_schemas(vec![without_name]).unwrap_err();
        let diagnostics = err.diagnostics();
        assert!(diagnostics
            .iter()
            .any(|d| d.property.as_deref() == Some("Name") && d.reason.contains("removed")));
        assert!(ecdb.prepare("SELECT Name FROM ts.Person").is_ok());
    }

    #[test]
    fn test_import_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
schemas:
  - name: TestSchema
    alias: ts
    classes:
      - name: Base
        map:
          strategy: shared_table
        properties:
          - name: X
            kind: primitive
            type: int
      - name: Derived
        base_class: Base
        properties:
          - name: Y
            kind: primitive
            type: double
"#
        )
        .unwrap();

        let mut ecdb = open_store();
        let report = ecdb.import_schema_file(file.path()).unwrap();
        assert_eq!(report.schemas, vec!["TestSchema".to_string()]);
        assert_eq!(report.mapped_classes.len(), 2);
        assert_eq!(layout(&ecdb), layout(&store_with(vec![base_derived_schema()])));
    }

    #[test]
    fn test_sample_schema_imports() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas/sample.yaml");
        let mut ecdb = open_store();
        let report = ecdb.import_schema_file(path).unwrap();
        assert_eq!(report.schemas, vec!["Library".to_string()]);

        let mut insert = ecdb
            .prepare("INSERT INTO lib.Book (Title, Pages, Chapters) VALUES (?, ?, ?)")
            .unwrap();
        insert.bind(1, "Dune").unwrap();
        insert.bind(2, 412i64).unwrap();
        insert
            .bind(
                3,
                EcValue::Array(vec![EcValue::Struct(vec![
                    ("Title".into(), "Prologue".into()),
                    ("FirstPage".into(), 1i64.into()),
                ])]),
            )
            .unwrap();
        insert.step().unwrap();
        drop(insert);

        let mut select = ecdb.prepare("SELECT Title FROM lib.Publication").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::from("Dune"));
    }
}
