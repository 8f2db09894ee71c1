//! Mapping metadata persistence
//!
//! Schemas, classes, tables, columns and maps are stored in the `ec_*`
//! metadata tables. [`save`] writes whatever the last mapping pass added
//! (DDL for new tables and columns, pending data moves, metadata rows);
//! [`load`] rebuilds the catalog, the [`DbSchema`] and the property map trees
//! from those rows without running any mapping logic.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::EcDbConfig;
use crate::ec_catalog::{ClassId, ClassIdEntry, EcProperty, EcSchema, PropertyKind, SchemaCatalog};
use crate::store::{self, StoreError};
use crate::utils::quote_ident;

use super::class_map::{ClassMap, ClassMapRegistry, MapStrategy, SharedColumnSettings};
use super::db_schema::{
    ColumnId, DbColumn, DbColumnKind, DbSchema, DbTable, DbTableType, TableId, ARRAY_INDEX_COLUMN,
    CLASS_ID_COLUMN, INSTANCE_ID_COLUMN, PARENT_INSTANCE_ID_COLUMN,
};
use super::errors::MappingError;
use super::mapping_manager::PendingMove;
use super::MappingSnapshot;
use super::property_map::{
    CompoundPropertyMap, DataPropertyMap, NavigationPropertyMap, PropertyMap, NAV_ID_MEMBER,
    NAV_REL_CLASS_ID_MEMBER,
};

const METADATA_DDL: &str = "
CREATE TABLE IF NOT EXISTS ec_Schema(
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    Alias TEXT NOT NULL,
    Definition TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS ec_Class(
    Id INTEGER PRIMARY KEY,
    SchemaId INTEGER NOT NULL REFERENCES ec_Schema(Id) ON DELETE CASCADE,
    Name TEXT NOT NULL COLLATE NOCASE);
CREATE TABLE IF NOT EXISTS ec_Table(
    Id INTEGER PRIMARY KEY,
    Name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    Type INTEGER NOT NULL,
    ParentTableId INTEGER REFERENCES ec_Table(Id));
CREATE TABLE IF NOT EXISTS ec_Column(
    Id INTEGER PRIMARY KEY,
    TableId INTEGER NOT NULL REFERENCES ec_Table(Id) ON DELETE CASCADE,
    Name TEXT NOT NULL COLLATE NOCASE,
    Kind INTEGER NOT NULL,
    SqlType TEXT);
CREATE TABLE IF NOT EXISTS ec_ClassMap(
    ClassId INTEGER PRIMARY KEY REFERENCES ec_Class(Id) ON DELETE CASCADE,
    Strategy INTEGER NOT NULL,
    TableId INTEGER REFERENCES ec_Table(Id),
    SharedColumns INTEGER,
    OverflowEnabled INTEGER,
    MaxOverflowColumns INTEGER,
    IsLinkTable INTEGER NOT NULL DEFAULT 0);
CREATE TABLE IF NOT EXISTS ec_PropertyMap(
    ClassId INTEGER NOT NULL REFERENCES ec_ClassMap(ClassId) ON DELETE CASCADE,
    AccessString TEXT NOT NULL COLLATE NOCASE,
    ColumnId INTEGER NOT NULL REFERENCES ec_Column(Id),
    PRIMARY KEY(ClassId, AccessString));
";

pub fn create_metadata_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(METADATA_DDL)?;
    Ok(())
}

fn column_definition(column: &DbColumn, table_type: DbTableType, parent_name: Option<&str>) -> String {
    let name = quote_ident(&column.name);
    match column.kind {
        DbColumnKind::InstanceId => match (table_type, parent_name) {
            (DbTableType::Overflow, Some(parent)) => format!(
                "{} INTEGER PRIMARY KEY REFERENCES {}({}) ON DELETE CASCADE",
                name,
                quote_ident(parent),
                quote_ident(INSTANCE_ID_COLUMN)
            ),
            _ => format!("{} INTEGER PRIMARY KEY", name),
        },
        DbColumnKind::ClassId | DbColumnKind::ParentInstanceId | DbColumnKind::ArrayIndex => {
            format!("{} INTEGER NOT NULL", name)
        }
        _ => match &column.sql_type {
            Some(sql_type) => format!("{} {}", name, sql_type),
            None => name,
        },
    }
}

/// `CREATE TABLE` plus index statements for one table
pub fn create_table_ddl(db: &DbSchema, table: TableId) -> Vec<String> {
    let Some(t) = db.table(table) else {
        return Vec::new();
    };
    let parent_name = t.parent.map(|p| db.table_name(p).to_string());
    let columns: Vec<String> = db
        .columns_of(table)
        .into_iter()
        .map(|c| column_definition(c, t.table_type, parent_name.as_deref()))
        .collect();
    let mut statements = vec![format!(
        "CREATE TABLE {}({})",
        quote_ident(&t.name),
        columns.join(", ")
    )];
    match t.table_type {
        DbTableType::Primary => statements.push(format!(
            "CREATE INDEX {} ON {}({})",
            quote_ident(&format!("ix_{}_ecclassid", t.name)),
            quote_ident(&t.name),
            quote_ident(CLASS_ID_COLUMN)
        )),
        DbTableType::StructArray => statements.push(format!(
            "CREATE INDEX {} ON {}({}, {})",
            quote_ident(&format!("ix_{}_parent", t.name)),
            quote_ident(&t.name),
            quote_ident(PARENT_INSTANCE_ID_COLUMN),
            quote_ident(ARRAY_INDEX_COLUMN)
        )),
        DbTableType::Overflow => {}
    }
    statements
}

fn write_ddl(conn: &Connection, db: &DbSchema) -> Result<(), StoreError> {
    let new_tables = db.unpersisted_tables();
    for table in &new_tables {
        for statement in create_table_ddl(db, *table) {
            debug!("{}", statement);
            conn.execute_batch(&statement)?;
        }
    }
    for column in db.unpersisted_columns() {
        let Some(c) = db.column(column) else { continue };
        if new_tables.contains(&c.table) {
            continue;
        }
        let table_type = db
            .table(c.table)
            .map(|t| t.table_type)
            .unwrap_or(DbTableType::Primary);
        let statement = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(db.table_name(c.table)),
            column_definition(c, table_type, None)
        );
        debug!("{}", statement);
        conn.execute_batch(&statement)?;
    }
    Ok(())
}

/// Copy the values of moved properties into their new columns and clear the old ones
fn execute_moves(conn: &Connection, db: &DbSchema, moves: &[PendingMove]) -> Result<(), StoreError> {
    if moves.is_empty() {
        return Ok(());
    }
    store::with_savepoint(conn, "ecdb_property_move", |conn| {
        for mv in moves {
            let from = quote_ident(db.table_name(mv.from_table));
            let to = quote_ident(db.table_name(mv.to_table));
            let class_ids = mv
                .class_ids
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let id = quote_ident(INSTANCE_ID_COLUMN);
            let class_id = quote_ident(CLASS_ID_COLUMN);
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {to}({id}, {class_id}) SELECT {id}, {class_id} FROM {from} WHERE {class_id} IN ({class_ids})"
                ),
                [],
            )?;
            let mut assignments = Vec::new();
            let mut clears = Vec::new();
            for (old, new) in &mv.columns {
                let old = quote_ident(db.column_name(*old));
                assignments.push(format!(
                    "{} = (SELECT f.{old} FROM {from} f WHERE f.{id} = {to}.{id})",
                    quote_ident(db.column_name(*new))
                ));
                clears.push(format!("{old} = NULL"));
            }
            if assignments.is_empty() {
                continue;
            }
            let copied = conn.execute(
                &format!(
                    "UPDATE {to} SET {} WHERE {class_id} IN ({class_ids})",
                    assignments.join(", ")
                ),
                [],
            )?;
            conn.execute(
                &format!(
                    "UPDATE {from} SET {} WHERE {class_id} IN ({class_ids})",
                    clears.join(", ")
                ),
                [],
            )?;
            info!("Moved {} row(s) of {} into {}", copied, mv.property, to);
        }
        Ok(())
    })
}

/// Write DDL, data moves and metadata for everything the last mapping pass added
pub fn save(
    conn: &Connection,
    catalog: &SchemaCatalog,
    db: &mut DbSchema,
    class_maps: &ClassMapRegistry,
    moves: &[PendingMove],
) -> Result<(), MappingError> {
    create_metadata_tables(conn)?;
    write_ddl(conn, db)?;
    execute_moves(conn, db, moves)?;

    for schema in catalog.schemas() {
        let definition = serde_json::to_string(schema).map_err(StoreError::from)?;
        conn.execute(
            "INSERT INTO ec_Schema(Name, Alias, Definition) VALUES (?1, ?2, ?3)
             ON CONFLICT(Name) DO UPDATE SET Alias = excluded.Alias, Definition = excluded.Definition",
            params![schema.name, schema.alias, definition],
        )?;
    }
    for entry in catalog.class_id_entries() {
        conn.execute(
            "INSERT INTO ec_Class(Id, SchemaId, Name)
             VALUES (?1, (SELECT Id FROM ec_Schema WHERE Name = ?2), ?3)
             ON CONFLICT(Id) DO NOTHING",
            params![entry.id, entry.schema, entry.class],
        )?;
    }

    for table_id in db.unpersisted_tables() {
        if let Some(t) = db.table(table_id) {
            conn.execute(
                "INSERT INTO ec_Table(Id, Name, Type, ParentTableId) VALUES (?1, ?2, ?3, ?4)",
                params![t.id, t.name, t.table_type.code(), t.parent],
            )?;
        }
    }
    for column_id in db.unpersisted_columns() {
        if let Some(c) = db.column(column_id) {
            conn.execute(
                "INSERT INTO ec_Column(Id, TableId, Name, Kind, SqlType) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![c.id, c.table, c.name, c.kind.code(), c.sql_type],
            )?;
        }
    }

    conn.execute("DELETE FROM ec_PropertyMap", [])?;
    for map in class_maps.iter() {
        let shared = map.shared_columns;
        conn.execute(
            "INSERT OR REPLACE INTO ec_ClassMap(ClassId, Strategy, TableId, SharedColumns, OverflowEnabled, MaxOverflowColumns, IsLinkTable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                map.class_id,
                map.strategy.code(),
                map.primary_table,
                shared.map(|s| s.max_shared_columns),
                shared.map(|s| s.overflow_enabled),
                shared.map(|s| s.max_overflow_columns),
                map.is_link_table,
            ],
        )?;
        let mut insert = conn.prepare_cached(
            "INSERT INTO ec_PropertyMap(ClassId, AccessString, ColumnId) VALUES (?1, ?2, ?3)",
        )?;
        for property_map in map.property_maps.iter() {
            for (access_string, column) in property_map.persisted_rows(db) {
                insert.execute(params![map.class_id, access_string, column])?;
            }
        }
    }

    db.mark_all_persisted();
    debug!(
        "Saved mapping metadata: {} classes, {} tables",
        class_maps.len(),
        db.tables().count()
    );
    Ok(())
}

/// Rebuild everything from the metadata tables. `None` for a store without
/// any imported schema.
pub fn load(conn: &Connection, config: &EcDbConfig) -> Result<Option<MappingSnapshot>, MappingError> {
    if !store::table_exists(conn, "ec_Schema")? {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT Definition FROM ec_Schema ORDER BY Id")?;
    let definitions = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if definitions.is_empty() {
        return Ok(None);
    }
    let schemas = definitions
        .iter()
        .map(|d| serde_json::from_str::<EcSchema>(d).map_err(StoreError::from))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT c.Id, s.Name, c.Name FROM ec_Class c JOIN ec_Schema s ON s.Id = c.SchemaId ORDER BY c.Id",
    )?;
    let known_ids = stmt
        .query_map([], |row| {
            Ok(ClassIdEntry {
                id: row.get(0)?,
                schema: row.get(1)?,
                class: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let catalog = SchemaCatalog::build(schemas, &known_ids).map_err(|errors| {
        StoreError::CorruptMetadata(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    })?;

    let db_schema = load_db_schema(conn)?;
    let class_maps = load_class_maps(conn, config, &catalog, &db_schema)?;
    info!(
        "Loaded {} schema(s), {} class map(s), {} table(s)",
        catalog.schemas().len(),
        class_maps.len(),
        db_schema.tables().count()
    );
    Ok(Some(MappingSnapshot {
        catalog,
        db_schema,
        class_maps,
    }))
}

fn load_db_schema(conn: &Connection) -> Result<DbSchema, MappingError> {
    let mut db = DbSchema::new();
    let mut stmt = conn.prepare("SELECT Id, Name, Type, ParentTableId FROM ec_Table ORDER BY Id")?;
    let tables = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, name, type_code, parent) in tables {
        let table_type = DbTableType::from_code(type_code)
            .ok_or_else(|| StoreError::CorruptMetadata(format!("table {} has type {}", name, type_code)))?;
        db.insert_loaded_table(DbTable {
            id,
            name,
            table_type,
            parent,
            columns: Vec::new(),
            overflow: None,
            persisted: true,
        });
    }

    let mut stmt = conn.prepare("SELECT Id, TableId, Name, Kind, SqlType FROM ec_Column ORDER BY Id")?;
    let columns = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, table, name, kind_code, sql_type) in columns {
        let kind = DbColumnKind::from_code(kind_code)
            .ok_or_else(|| StoreError::CorruptMetadata(format!("column {} has kind {}", name, kind_code)))?;
        db.insert_loaded_column(DbColumn {
            id,
            table,
            name,
            kind,
            sql_type,
            persisted: true,
        });
    }
    db.link_overflow_tables();
    Ok(db)
}

fn load_class_maps(
    conn: &Connection,
    config: &EcDbConfig,
    catalog: &SchemaCatalog,
    db: &DbSchema,
) -> Result<ClassMapRegistry, MappingError> {
    let mut rows: HashMap<ClassId, HashMap<String, ColumnId>> = HashMap::new();
    let mut stmt = conn.prepare("SELECT ClassId, AccessString, ColumnId FROM ec_PropertyMap")?;
    let property_rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (class_id, access_string, column) in property_rows {
        rows.entry(class_id)
            .or_default()
            .insert(access_string.to_lowercase(), column);
    }

    let mut registry = ClassMapRegistry::new();
    for class_id in catalog.hierarchy_order() {
        let Some(mut class_map) = read_class_map(conn, config, class_id)? else {
            continue;
        };
        if class_map.is_mapped() {
            let empty = HashMap::new();
            let loader = MapLoader {
                catalog,
                db,
                class_id,
                rows: rows.get(&class_id).unwrap_or(&empty),
            };
            let base_map = catalog.base(class_id).and_then(|b| registry.get(b));
            for property in catalog.all_properties(class_id) {
                let name = property.property.name.as_str();
                let inherited = base_map.filter(|_| property.declaring_class != class_id).and_then(|base| {
                    let map = base.property_maps.get(name)?;
                    (base.primary_table == class_map.primary_table || map.is_struct_array())
                        .then(|| map.clone())
                });
                let map = match inherited {
                    Some(map) => map,
                    None => loader.load(property.declaring_class, property.property, "", "")?,
                };
                class_map.property_maps.insert(map);
            }
        }
        registry.insert(class_map);
    }
    Ok(registry)
}

fn read_class_map(conn: &Connection, config: &EcDbConfig, class_id: ClassId) -> Result<Option<ClassMap>, MappingError> {
    let row = conn
        .query_row(
            "SELECT Strategy, TableId, SharedColumns, OverflowEnabled, MaxOverflowColumns, IsLinkTable
             FROM ec_ClassMap WHERE ClassId = ?1",
            [class_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<bool>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((strategy_code, table, shared, overflow, max_overflow, is_link_table)) = row else {
        return Ok(None);
    };
    let strategy = MapStrategy::from_code(strategy_code).ok_or_else(|| {
        StoreError::CorruptMetadata(format!("class {} has strategy {}", class_id, strategy_code))
    })?;
    let mut map = ClassMap::new(class_id, strategy, table);
    map.is_link_table = is_link_table;
    map.shared_columns = shared.map(|max_shared_columns| SharedColumnSettings {
        max_shared_columns,
        overflow_enabled: overflow.unwrap_or(config.overflow_enabled),
        max_overflow_columns: max_overflow.unwrap_or(config.max_overflow_columns),
        sibling_column_reuse: config.sibling_column_reuse,
    });
    Ok(Some(map))
}

/// Rebuilds property maps from `ec_PropertyMap` rows
struct MapLoader<'l> {
    catalog: &'l SchemaCatalog,
    db: &'l DbSchema,
    class_id: ClassId,
    rows: &'l HashMap<String, ColumnId>,
}

impl MapLoader<'_> {
    fn column(&self, key: &str) -> Result<ColumnId, MappingError> {
        self.rows
            .get(&key.to_lowercase())
            .copied()
            .ok_or_else(|| MappingError::MissingPropertyMap {
                class: self.catalog.full_name(self.class_id),
                access_string: key.to_string(),
            })
    }

    /// `key_prefix` is the full path used in the rows; `access_prefix` the
    /// path relative to the enclosing struct-array element
    fn load(
        &self,
        context: ClassId,
        property: &EcProperty,
        key_prefix: &str,
        access_prefix: &str,
    ) -> Result<Arc<PropertyMap>, MappingError> {
        let key = format!("{}{}", key_prefix, property.name);
        let access_string = format!("{}{}", access_prefix, property.name);
        let map = match &property.kind {
            PropertyKind::Primitive { primitive_type } if primitive_type.is_point() => {
                let columns = primitive_type
                    .components()
                    .iter()
                    .map(|c| self.column(&format!("{}.{}", key, c)))
                    .collect::<Result<Vec<_>, _>>()?;
                PropertyMap::Data(DataPropertyMap {
                    access_string,
                    primitive_type: *primitive_type,
                    is_array: false,
                    columns,
                })
            }
            PropertyKind::Primitive { primitive_type } | PropertyKind::PrimitiveArray { primitive_type } => {
                PropertyMap::Data(DataPropertyMap {
                    access_string,
                    primitive_type: *primitive_type,
                    is_array: matches!(property.kind, PropertyKind::PrimitiveArray { .. }),
                    columns: vec![self.column(&key)?],
                })
            }
            PropertyKind::Navigation { direction, .. } => {
                let relationship = self.catalog.relationship_of(&crate::ec_catalog::PropertyRef {
                    declaring_class: context,
                    property,
                })?;
                PropertyMap::Navigation(NavigationPropertyMap {
                    access_string,
                    relationship,
                    direction: *direction,
                    id_column: self.column(&format!("{}.{}", key, NAV_ID_MEMBER))?,
                    rel_class_id_column: self.column(&format!("{}.{}", key, NAV_REL_CLASS_ID_MEMBER))?,
                })
            }
            PropertyKind::Struct { struct_class } => {
                let struct_id = self.catalog.resolve_reference(context, struct_class)?;
                let members = self
                    .catalog
                    .all_properties(struct_id)
                    .into_iter()
                    .map(|m| {
                        self.load(
                            m.declaring_class,
                            m.property,
                            &format!("{}.", key),
                            &format!("{}.", access_string),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                PropertyMap::Compound(CompoundPropertyMap {
                    access_string,
                    struct_class: struct_id,
                    array_table: None,
                    members,
                })
            }
            PropertyKind::StructArray { struct_class } => {
                let struct_id = self.catalog.resolve_reference(context, struct_class)?;
                let parent_column = self.column(&key)?;
                let table = self
                    .db
                    .column(parent_column)
                    .map(|c| c.table)
                    .ok_or_else(|| StoreError::CorruptMetadata(format!("no table for struct array {}", key)))?;
                let members = self
                    .catalog
                    .all_properties(struct_id)
                    .into_iter()
                    .map(|m| self.load(m.declaring_class, m.property, &format!("{}.", key), ""))
                    .collect::<Result<Vec<_>, _>>()?;
                PropertyMap::Compound(CompoundPropertyMap {
                    access_string,
                    struct_class: struct_id,
                    array_table: Some(table),
                    members,
                })
            }
        };
        Ok(Arc::new(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_mapping::mapping_manager::ClassMappingManager;
    use crate::ec_catalog::{ClassMapHint, EcClass, PrimitiveType};

    fn schema() -> EcSchema {
        EcSchema::new("TestSchema", "ts")
            .with_class(
                EcClass::struct_class("Item")
                    .with_property(EcProperty::primitive("Label", PrimitiveType::String))
                    .with_property(EcProperty::primitive("At", PrimitiveType::Point3d)),
            )
            .with_class(
                EcClass::entity("Base")
                    .with_map(ClassMapHint::shared_columns(2))
                    .with_property(EcProperty::primitive("X", PrimitiveType::Integer))
                    .with_property(EcProperty::struct_property("Main", "Item"))
                    .with_property(EcProperty::struct_array("Items", "Item")),
            )
            .with_class(
                EcClass::entity("Derived")
                    .with_base("Base")
                    .with_property(EcProperty::primitive_array("Tags", PrimitiveType::String)),
            )
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let config = EcDbConfig::default();
        let catalog = SchemaCatalog::build(vec![schema()], &[]).unwrap();
        let mut db = DbSchema::new();
        let mut maps = ClassMapRegistry::new();
        let report = ClassMappingManager::new(&catalog, &config, &mut db, &mut maps).map_classes();
        assert!(!report.has_errors(), "{:?}", report.errors);
        save(&conn, &catalog, &mut db, &maps, &report.moves).unwrap();

        let loaded = load(&conn, &config).unwrap().unwrap();
        assert_eq!(loaded.db_schema, db);
        assert_eq!(loaded.class_maps, maps);
        assert_eq!(loaded.catalog.class_id_entries(), catalog.class_id_entries());
        assert!(store::table_exists(&conn, "ts_Base_Overflow").unwrap());
        assert!(store::table_exists(&conn, "ts_Base_Items").unwrap());
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(load(&conn, &EcDbConfig::default()).unwrap().is_none());
        create_metadata_tables(&conn).unwrap();
        assert!(load(&conn, &EcDbConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_overflow_ddl_references_primary() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let o = db.get_or_create_overflow(t).unwrap();
        let ddl = create_table_ddl(&db, o);
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("REFERENCES [ts_A]([ECInstanceId]) ON DELETE CASCADE"));
        let primary_ddl = create_table_ddl(&db, t);
        assert!(primary_ddl[1].starts_with("CREATE INDEX [ix_ts_A_ecclassid]"));
    }
}
