//! Physical tables and columns
//!
//! [`DbSchema`] is the in-memory model of every table and column the mapping
//! engine owns. Mapping only ever adds to it; the `persisted` flags tell the
//! persistence layer which DDL and metadata rows still have to be written.
//!
//! Every table starts with `ECInstanceId` (the row id) and `ECClassId`. Struct
//! array tables add `ParentECInstanceId` and `ECArrayIndex`. Overflow tables
//! are 1:1 with their primary table by `ECInstanceId`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type TableId = i64;
pub type ColumnId = i64;

pub const INSTANCE_ID_COLUMN: &str = "ECInstanceId";
pub const CLASS_ID_COLUMN: &str = "ECClassId";
pub const PARENT_INSTANCE_ID_COLUMN: &str = "ParentECInstanceId";
pub const ARRAY_INDEX_COLUMN: &str = "ECArrayIndex";
pub const SHARED_COLUMN_PREFIX: &str = "ps";
pub const OVERFLOW_TABLE_SUFFIX: &str = "_Overflow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbTableType {
    Primary,
    Overflow,
    StructArray,
}

impl DbTableType {
    pub fn code(self) -> i64 {
        match self {
            DbTableType::Primary => 0,
            DbTableType::Overflow => 1,
            DbTableType::StructArray => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(DbTableType::Primary),
            1 => Some(DbTableType::Overflow),
            2 => Some(DbTableType::StructArray),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbColumnKind {
    InstanceId,
    ClassId,
    ParentInstanceId,
    ArrayIndex,
    SourceInstanceId,
    SourceClassId,
    TargetInstanceId,
    TargetClassId,
    /// Column named after the property it holds
    Data,
    /// Anonymous `psN` column from a shared-column pool
    Shared,
}

impl DbColumnKind {
    pub fn code(self) -> i64 {
        match self {
            DbColumnKind::InstanceId => 0,
            DbColumnKind::ClassId => 1,
            DbColumnKind::ParentInstanceId => 2,
            DbColumnKind::ArrayIndex => 3,
            DbColumnKind::SourceInstanceId => 4,
            DbColumnKind::SourceClassId => 5,
            DbColumnKind::TargetInstanceId => 6,
            DbColumnKind::TargetClassId => 7,
            DbColumnKind::Data => 8,
            DbColumnKind::Shared => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => DbColumnKind::InstanceId,
            1 => DbColumnKind::ClassId,
            2 => DbColumnKind::ParentInstanceId,
            3 => DbColumnKind::ArrayIndex,
            4 => DbColumnKind::SourceInstanceId,
            5 => DbColumnKind::SourceClassId,
            6 => DbColumnKind::TargetInstanceId,
            7 => DbColumnKind::TargetClassId,
            8 => DbColumnKind::Data,
            9 => DbColumnKind::Shared,
            _ => return None,
        })
    }

    pub fn is_system(self) -> bool {
        !matches!(self, DbColumnKind::Data | DbColumnKind::Shared)
    }

    /// Relationship end columns of a link table, with their system property names
    pub const LINK_COLUMNS: [(DbColumnKind, &'static str); 4] = [
        (DbColumnKind::SourceInstanceId, "SourceECInstanceId"),
        (DbColumnKind::SourceClassId, "SourceECClassId"),
        (DbColumnKind::TargetInstanceId, "TargetECInstanceId"),
        (DbColumnKind::TargetClassId, "TargetECClassId"),
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbColumn {
    pub id: ColumnId,
    pub table: TableId,
    pub name: String,
    pub kind: DbColumnKind,
    /// Declared SQLite type; shared columns are untyped
    pub sql_type: Option<String>,
    pub persisted: bool,
}

impl DbColumn {
    pub fn is_shared(&self) -> bool {
        self.kind == DbColumnKind::Shared
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbTable {
    pub id: TableId,
    pub name: String,
    pub table_type: DbTableType,
    /// Primary table of an overflow table, owning table of a struct array table
    pub parent: Option<TableId>,
    pub columns: Vec<ColumnId>,
    pub overflow: Option<TableId>,
    pub persisted: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbSchema {
    tables: BTreeMap<TableId, DbTable>,
    columns: BTreeMap<ColumnId, DbColumn>,
}

impl DbSchema {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_table_id(&self) -> TableId {
        self.tables.keys().next_back().copied().unwrap_or(0) + 1
    }

    fn next_column_id(&self) -> ColumnId {
        self.columns.keys().next_back().copied().unwrap_or(0) + 1
    }

    pub fn table(&self, id: TableId) -> Option<&DbTable> {
        self.tables.get(&id)
    }

    pub fn column(&self, id: ColumnId) -> Option<&DbColumn> {
        self.columns.get(&id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &DbTable> {
        self.tables.values()
    }

    pub fn find_table(&self, name: &str) -> Option<&DbTable> {
        self.tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_name(&self, id: TableId) -> &str {
        self.tables.get(&id).map(|t| t.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn column_name(&self, id: ColumnId) -> &str {
        self.columns.get(&id).map(|c| c.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn columns_of(&self, table: TableId) -> Vec<&DbColumn> {
        self.tables
            .get(&table)
            .map(|t| t.columns.iter().filter_map(|c| self.columns.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn find_column(&self, table: TableId, name: &str) -> Option<&DbColumn> {
        self.columns_of(table)
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn system_column(&self, table: TableId, kind: DbColumnKind) -> Option<ColumnId> {
        self.columns_of(table)
            .into_iter()
            .find(|c| c.kind == kind)
            .map(|c| c.id)
    }

    /// Shared columns of a table in creation order
    pub fn shared_columns(&self, table: TableId) -> Vec<ColumnId> {
        self.columns_of(table)
            .into_iter()
            .filter(|c| c.is_shared())
            .map(|c| c.id)
            .collect()
    }

    fn unique_table_name(&self, base: &str) -> String {
        if self.find_table(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| self.find_table(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// `base`, or `base` with a numeric suffix if the table already has such a column
    pub fn unique_column_name(&self, table: TableId, base: &str) -> String {
        if self.find_column(table, base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.find_column(table, candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Create a table with its system columns
    pub fn create_table(&mut self, name: &str, table_type: DbTableType, parent: Option<TableId>) -> TableId {
        let id = self.next_table_id();
        let name = self.unique_table_name(name);
        self.tables.insert(
            id,
            DbTable {
                id,
                name,
                table_type,
                parent,
                columns: Vec::new(),
                overflow: None,
                persisted: false,
            },
        );
        self.add_column(id, INSTANCE_ID_COLUMN, DbColumnKind::InstanceId, Some("INTEGER"));
        self.add_column(id, CLASS_ID_COLUMN, DbColumnKind::ClassId, Some("INTEGER"));
        if table_type == DbTableType::StructArray {
            self.add_column(id, PARENT_INSTANCE_ID_COLUMN, DbColumnKind::ParentInstanceId, Some("INTEGER"));
            self.add_column(id, ARRAY_INDEX_COLUMN, DbColumnKind::ArrayIndex, Some("INTEGER"));
        }
        id
    }

    /// Overflow table of `primary`, created on first use
    pub fn get_or_create_overflow(&mut self, primary: TableId) -> Option<TableId> {
        let table = self.tables.get(&primary)?;
        if let Some(overflow) = table.overflow {
            return Some(overflow);
        }
        let name = format!("{}{}", table.name, OVERFLOW_TABLE_SUFFIX);
        let overflow = self.create_table(&name, DbTableType::Overflow, Some(primary));
        if let Some(table) = self.tables.get_mut(&primary) {
            table.overflow = Some(overflow);
        }
        Some(overflow)
    }

    /// Source/target columns of a link table
    pub fn add_link_columns(&mut self, table: TableId) {
        for (kind, name) in DbColumnKind::LINK_COLUMNS {
            if self.system_column(table, kind).is_none() {
                self.add_column(table, name, kind, Some("INTEGER"));
            }
        }
    }

    pub fn add_column(
        &mut self,
        table: TableId,
        name: &str,
        kind: DbColumnKind,
        sql_type: Option<&str>,
    ) -> ColumnId {
        let id = self.next_column_id();
        self.columns.insert(
            id,
            DbColumn {
                id,
                table,
                name: name.to_string(),
                kind,
                sql_type: sql_type.map(str::to_string),
                persisted: false,
            },
        );
        if let Some(t) = self.tables.get_mut(&table) {
            t.columns.push(id);
        }
        id
    }

    /// Name of the next shared column of a primary table. Numbering is shared
    /// between the primary table and its overflow table.
    pub fn next_shared_column_name(&self, primary: TableId) -> String {
        let mut count = self.shared_columns(primary).len();
        if let Some(overflow) = self.table(primary).and_then(|t| t.overflow) {
            count += self.shared_columns(overflow).len();
        }
        format!("{}{}", SHARED_COLUMN_PREFIX, count + 1)
    }

    /// Re-insert a table read back from the metadata tables
    pub fn insert_loaded_table(&mut self, table: DbTable) {
        self.tables.insert(table.id, table);
    }

    /// Re-insert a column read back from the metadata tables
    pub fn insert_loaded_column(&mut self, column: DbColumn) {
        if let Some(t) = self.tables.get_mut(&column.table) {
            if !t.columns.contains(&column.id) {
                t.columns.push(column.id);
            }
        }
        self.columns.insert(column.id, column);
    }

    /// Link overflow tables to their primaries after loading
    pub fn link_overflow_tables(&mut self) {
        let links: Vec<(TableId, TableId)> = self
            .tables
            .values()
            .filter(|t| t.table_type == DbTableType::Overflow)
            .filter_map(|t| t.parent.map(|p| (p, t.id)))
            .collect();
        for (primary, overflow) in links {
            if let Some(t) = self.tables.get_mut(&primary) {
                t.overflow = Some(overflow);
            }
        }
    }

    pub fn unpersisted_tables(&self) -> Vec<TableId> {
        self.tables
            .values()
            .filter(|t| !t.persisted)
            .map(|t| t.id)
            .collect()
    }

    pub fn unpersisted_columns(&self) -> Vec<ColumnId> {
        self.columns
            .values()
            .filter(|c| !c.persisted)
            .map(|c| c.id)
            .collect()
    }

    pub fn mark_all_persisted(&mut self) {
        for t in self.tables.values_mut() {
            t.persisted = true;
        }
        for c in self.columns.values_mut() {
            c.persisted = true;
        }
    }
}
