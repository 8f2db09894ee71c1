//! Shared schema builders and store helpers for the integration tests.

use std::collections::BTreeMap;

use ecdb::ec_catalog::{ClassMapHint, EcClass, EcProperty, EcSchema, NavigationDirection, PrimitiveType};
use ecdb::{EcDb, EcDbConfig};

/// Fresh in-memory store with default configuration
pub fn open_store() -> EcDb {
    EcDb::open_in_memory(EcDbConfig::default()).expect("in-memory store")
}

/// Fresh in-memory store with `schemas` imported
pub fn store_with(schemas: Vec<EcSchema>) -> EcDb {
    let mut ecdb = open_store();
    ecdb.import_schemas(schemas).expect("import");
    ecdb
}

/// Base{X:int} and Derived{Y:double} sharing one table
pub fn base_derived_schema() -> EcSchema {
    EcSchema::new("TestSchema", "ts")
        .with_class(
            EcClass::entity("Base")
                .with_map(ClassMapHint::shared_table())
                .with_property(EcProperty::primitive("X", PrimitiveType::Integer)),
        )
        .with_class(
            EcClass::entity("Derived")
                .with_base("Base")
                .with_property(EcProperty::primitive("Y", PrimitiveType::Double)),
        )
}

/// Person with a struct property `Addr`; `with_zip` adds `Zip` to the struct
pub fn person_schema(with_zip: bool) -> EcSchema {
    let mut address = EcClass::struct_class("Address")
        .with_property(EcProperty::primitive("Street", PrimitiveType::String))
        .with_property(EcProperty::primitive("City", PrimitiveType::String));
    if with_zip {
        address = address.with_property(EcProperty::primitive("Zip", PrimitiveType::String));
    }
    EcSchema::new("TestSchema", "ts").with_class(address).with_class(
        EcClass::entity("Person")
            .with_property(EcProperty::primitive("Name", PrimitiveType::String))
            .with_property(EcProperty::struct_property("Addr", "Address")),
    )
}

/// One shared-column class limited to `max_columns` shared columns, holding
/// the primitive properties `P1..=Pcount`
pub fn wide_schema(max_columns: u32, count: usize) -> EcSchema {
    let mut wide = EcClass::entity("Wide").with_map(ClassMapHint::shared_columns(max_columns));
    for i in 1..=count {
        wide = wide.with_property(EcProperty::primitive(format!("P{}", i), PrimitiveType::Integer));
    }
    EcSchema::new("TestSchema", "ts").with_class(wide)
}

/// Invoice with a struct array of line items and a primitive array of tags
pub fn invoice_schema() -> EcSchema {
    EcSchema::new("TestSchema", "ts")
        .with_class(
            EcClass::struct_class("LineItem")
                .with_property(EcProperty::primitive("Sku", PrimitiveType::String))
                .with_property(EcProperty::primitive("Qty", PrimitiveType::Integer)),
        )
        .with_class(
            EcClass::entity("Invoice")
                .with_property(EcProperty::primitive("Code", PrimitiveType::String))
                .with_property(EcProperty::primitive("Origin", PrimitiveType::Point2d))
                .with_property(EcProperty::primitive_array("Tags", PrimitiveType::String))
                .with_property(EcProperty::struct_array("Items", "LineItem")),
        )
}

/// Folder ⟵ Doc through the navigation property `Doc.Folder`, and a
/// link-table relationship between documents
/// The same schema under another name and alias
pub fn renamed(mut schema: EcSchema, name: &str, alias: &str) -> EcSchema {
    schema.name = name.to_string();
    schema.alias = alias.to_string();
    schema
}

pub fn folder_schema() -> EcSchema {
    EcSchema::new("TestSchema", "ts")
        .with_class(EcClass::entity("Folder").with_property(EcProperty::primitive("Name", PrimitiveType::String)))
        .with_class(
            EcClass::entity("Doc")
                .with_property(EcProperty::primitive("Title", PrimitiveType::String))
                .with_property(EcProperty::navigation(
                    "Folder",
                    "FolderHasDocs",
                    NavigationDirection::Backward,
                )),
        )
        .with_class(EcClass::relationship("FolderHasDocs", "Folder", "Doc"))
        .with_class(EcClass::relationship("DocRefersToDoc", "Doc", "Doc"))
}

/// Every mapped leaf as `Schema.Class:access.string` → `table.column`
pub fn layout(ecdb: &EcDb) -> BTreeMap<String, String> {
    let snapshot = ecdb.snapshot();
    let db = &snapshot.db_schema;
    let mut out = BTreeMap::new();
    for class_map in snapshot.class_maps.iter() {
        let class = snapshot.catalog.full_name(class_map.class_id);
        for map in class_map.property_maps.iter() {
            for leaf in map.leaf_columns() {
                let column = db.column(leaf.column).expect("mapped column");
                out.insert(
                    format!("{}:{}", class, leaf.access_string),
                    format!("{}.{}", db.table_name(column.table), column.name),
                );
            }
        }
    }
    out
}

/// Column names of a physical table, read back from SQLite
pub fn table_columns(ecdb: &EcDb, table: &str) -> Vec<String> {
    ecdb.store().column_names(table).expect("table info")
}
