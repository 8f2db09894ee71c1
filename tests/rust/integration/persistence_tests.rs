//! Integration tests for stores on disk
//!
//! A store is written, closed and opened again; the loaded mapping must be
//! the one that was saved and data must stay readable.

#[cfg(test)]
mod persistence_tests {
    use ecdb::{EcDb, EcDbConfig, EcValue, StepResult};
    use tempfile::TempDir;

    use crate::test_schemas::*;

    #[test]
    fn test_reopen_restores_mapping_and_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.ecdb");

        let (saved_layout, inserted) = {
            let mut ecdb = EcDb::open(&path, EcDbConfig::default()).unwrap();
            ecdb.import_schemas(vec![base_derived_schema(), renamed(invoice_schema(), "Sales", "sl")])
                .unwrap();
            let mut insert = ecdb.prepare("INSERT INTO ts.Derived (X, Y) VALUES (7, 0.5)").unwrap();
            insert.step().unwrap();
            let id = insert.last_inserted_id().unwrap();
            drop(insert);
            (layout(&ecdb), id)
        };

        let ecdb = EcDb::open(&path, EcDbConfig::default()).unwrap();
        assert_eq!(layout(&ecdb), saved_layout);
        assert_eq!(ecdb.class_id("TestSchema", "Derived"), ecdb.class_id("ts", "Derived"));

        let mut select = ecdb.prepare("SELECT ECInstanceId, X, Y FROM ts.Derived").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.get_value(0).unwrap(), EcValue::Integer(inserted));
        assert_eq!(select.get_value(1).unwrap(), EcValue::Integer(7));
        assert_eq!(select.get_value(2).unwrap(), EcValue::Double(0.5));
        drop(select);

        // the id sequence continues where it stopped
        assert_eq!(ecdb.next_instance_id().unwrap(), inserted + 1);
    }

    #[test]
    fn test_reopen_then_extend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grow.ecdb");
        {
            let mut ecdb = EcDb::open(&path, EcDbConfig::default()).unwrap();
            ecdb.import_schemas(vec![wide_schema(2, 2)]).unwrap();
        }

        let mut ecdb = EcDb::open(&path, EcDbConfig::default()).unwrap();
        let before = layout(&ecdb);
        let report = ecdb.import_schemas(vec![wide_schema(2, 3)]).unwrap();
        assert_eq!(report.updated_classes.len(), 1);
        let after = layout(&ecdb);
        for (access, column) in &before {
            assert_eq!(after.get(access), Some(column));
        }
        assert!(after["TestSchema.Wide:P3"].starts_with("ts_Wide_Overflow."));

        drop(ecdb);
        let reopened = EcDb::open(&path, EcDbConfig::default()).unwrap();
        assert_eq!(layout(&reopened), after);
    }

    #[test]
    fn test_repository_id_applies_to_new_stores_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ids.ecdb");
        let config = |repository_id| EcDbConfig {
            repository_id,
            ..EcDbConfig::default()
        };
        {
            let ecdb = EcDb::open(&path, config(3)).unwrap();
            assert_eq!(ecdb.next_instance_id().unwrap(), (3i64 << 32) + 1);
        }
        let ecdb = EcDb::open(&path, config(9)).unwrap();
        assert_eq!(ecdb.next_instance_id().unwrap(), (3i64 << 32) + 2);
    }
}
