//! Integration tests for finding related instances
//!
//! Folders hold documents through a navigation property; documents refer to
//! each other through a link-table relationship.

#[cfg(test)]
mod related_instance_tests {
    use ecdb::relationships::{DirectionFilter, InstanceKey, RelatedDirection};
    use ecdb::{EcDb, EcValue};

    use crate::test_schemas::*;

    struct Fixture {
        ecdb: EcDb,
        folder: i64,
        doc_a: i64,
        doc_b: i64,
    }

    fn insert(ecdb: &EcDb, ecsql: &str, params: Vec<EcValue>) -> i64 {
        let mut stmt = ecdb.prepare(ecsql).unwrap();
        for (i, value) in params.into_iter().enumerate() {
            stmt.bind(i + 1, value).unwrap();
        }
        stmt.step().unwrap();
        stmt.last_inserted_id().unwrap()
    }

    fn fixture() -> Fixture {
        let ecdb = store_with(vec![folder_schema()]);
        let folder = insert(&ecdb, "INSERT INTO ts.Folder (Name) VALUES (?)", vec!["inbox".into()]);
        let in_folder = |title: &str| {
            vec![
                title.into(),
                EcValue::Navigation {
                    id: folder,
                    rel_class_id: None,
                },
            ]
        };
        let doc_a = insert(&ecdb, "INSERT INTO ts.Doc (Title, Folder) VALUES (?, ?)", in_folder("a"));
        let doc_b = insert(&ecdb, "INSERT INTO ts.Doc (Title, Folder) VALUES (?, ?)", in_folder("b"));
        insert(
            &ecdb,
            "INSERT INTO ts.DocRefersToDoc (SourceECInstanceId, TargetECInstanceId) VALUES (?, ?)",
            vec![doc_a.into(), doc_b.into()],
        );
        Fixture {
            ecdb,
            folder,
            doc_a,
            doc_b,
        }
    }

    #[test]
    fn test_navigation_property_in_both_directions() {
        let f = fixture();
        let folder_class = f.ecdb.class_id("ts", "Folder").unwrap();
        let doc_class = f.ecdb.class_id("ts", "Doc").unwrap();
        let rel_class = f.ecdb.class_id("ts", "FolderHasDocs").unwrap();

        let mut docs = f
            .ecdb
            .find_related(InstanceKey::new(folder_class, f.folder), DirectionFilter::Both)
            .unwrap();
        docs.sort_by_key(|r| r.related.id);
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|r| r.direction == RelatedDirection::Forward));
        assert!(docs.iter().all(|r| r.relationship == rel_class));
        assert_eq!(docs[0].related, InstanceKey::new(doc_class, f.doc_a));
        assert_eq!(docs[1].related, InstanceKey::new(doc_class, f.doc_b));

        let folders = f
            .ecdb
            .find_related(InstanceKey::new(doc_class, f.doc_a), DirectionFilter::Backward)
            .unwrap();
        assert!(folders
            .iter()
            .any(|r| r.relationship == rel_class && r.related == InstanceKey::new(folder_class, f.folder)));
    }

    #[test]
    fn test_link_table_relationship() {
        let f = fixture();
        let doc_class = f.ecdb.class_id("ts", "Doc").unwrap();
        let refers = f.ecdb.class_id("ts", "DocRefersToDoc").unwrap();

        let forward = f
            .ecdb
            .find_related(InstanceKey::new(doc_class, f.doc_a), DirectionFilter::Forward)
            .unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].relationship, refers);
        assert_eq!(forward[0].related, InstanceKey::new(doc_class, f.doc_b));

        let backward: Vec<_> = f
            .ecdb
            .find_related(InstanceKey::new(doc_class, f.doc_b), DirectionFilter::Backward)
            .unwrap()
            .into_iter()
            .filter(|r| r.relationship == refers)
            .collect();
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].related.id, f.doc_a);
    }

    #[test]
    fn test_queries_are_cached_per_class_until_import() {
        let mut f = fixture();
        let folder_class = f.ecdb.class_id("ts", "Folder").unwrap();
        let key = InstanceKey::new(folder_class, f.folder);
        f.ecdb.find_related(key, DirectionFilter::Both).unwrap();
        f.ecdb.find_related(key, DirectionFilter::Forward).unwrap();
        assert_eq!(f.ecdb.related_instance_finder().cached_classes(), 1);

        f.ecdb
            .import_schemas(vec![renamed(person_schema(false), "People", "ppl")])
            .unwrap();
        assert_eq!(f.ecdb.related_instance_finder().cached_classes(), 0);
    }

    #[test]
    fn test_deleting_a_doc_removes_its_links() {
        let f = fixture();
        let doc_class = f.ecdb.class_id("ts", "Doc").unwrap();
        let mut delete = f.ecdb.prepare("DELETE FROM ts.Doc WHERE ECInstanceId = ?").unwrap();
        delete.bind(1, f.doc_b).unwrap();
        delete.step().unwrap();
        drop(delete);

        let related = f
            .ecdb
            .find_related(InstanceKey::new(doc_class, f.doc_a), DirectionFilter::Forward)
            .unwrap();
        assert!(related.is_empty(), "{:?}", related);
    }
}
