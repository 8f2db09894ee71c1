//! Column allocation for one class
//!
//! A [`ColumnFactory`] hands out columns of one table (plus its overflow
//! table) while a class's properties are mapped.
//!
//! - **Named** tables get one column per value, named after the access string.
//! - **Shared-column** tables draw from the `psN` pool. A column counts as in
//!   use for class C if C, an ancestor of C or a descendant of C maps to it;
//!   columns used only by classes outside that line (siblings) may be reused.
//!   Once the primary table holds `max_shared_columns` shared columns and none
//!   is free, properties go to the overflow table, created on first use.
//!
//! The per-property overflow flag makes a multi-column property (a point, a
//! struct, a navigation pair) land entirely in one table: the manager calls
//! [`ColumnFactory::evaluate_overflow`] before mapping a property and
//! [`ColumnFactory::reset_overflow_flag`] after it.

use std::collections::HashSet;

use log::debug;

use super::class_map::SharedColumnSettings;
use super::db_schema::{ColumnId, DbColumnKind, DbSchema, TableId};
use super::errors::MappingError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnMode {
    Named,
    Shared(SharedColumnSettings),
}

/// A column the mapping manager wants for one value
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRequest<'r> {
    pub property_name: &'r str,
    /// Preferred name for named columns
    pub column_name: String,
    pub sql_type: &'static str,
}

pub struct ColumnFactory<'a> {
    db: &'a mut DbSchema,
    class_name: String,
    primary: TableId,
    mode: ColumnMode,
    /// Columns of the class's own inheritance line
    in_use: HashSet<ColumnId>,
    /// Columns used by any class of the table
    taken: HashSet<ColumnId>,
    overflow_flag: bool,
}

impl<'a> ColumnFactory<'a> {
    pub fn new(
        db: &'a mut DbSchema,
        class_name: impl Into<String>,
        primary: TableId,
        mode: ColumnMode,
        in_use: HashSet<ColumnId>,
        taken: HashSet<ColumnId>,
    ) -> Self {
        ColumnFactory {
            db,
            class_name: class_name.into(),
            primary,
            mode,
            in_use,
            taken,
            overflow_flag: false,
        }
    }

    pub fn db(&self) -> &DbSchema {
        self.db
    }

    pub fn db_mut(&mut self) -> &mut DbSchema {
        self.db
    }

    pub fn primary_table(&self) -> TableId {
        self.primary
    }

    pub fn mode(&self) -> ColumnMode {
        self.mode
    }

    pub fn is_overflow_flag_set(&self) -> bool {
        self.overflow_flag
    }

    fn reusable(&self, table: TableId, settings: &SharedColumnSettings) -> Vec<ColumnId> {
        let blocked = if settings.sibling_column_reuse {
            &self.in_use
        } else {
            &self.taken
        };
        self.db
            .shared_columns(table)
            .into_iter()
            .filter(|c| !blocked.contains(c))
            .collect()
    }

    /// Decide before mapping `property_name` whether its `required_columns`
    /// still fit into the primary table. If not, and overflow is enabled, all
    /// of the property's columns go to the overflow table.
    pub fn evaluate_overflow(&mut self, property_name: &str, required_columns: usize) {
        let ColumnMode::Shared(settings) = self.mode else {
            self.overflow_flag = false;
            return;
        };
        let existing = self.db.shared_columns(self.primary).len();
        let creatable = (settings.max_shared_columns as usize).saturating_sub(existing);
        let free = self.reusable(self.primary, &settings).len() + creatable;
        self.overflow_flag = settings.overflow_enabled && required_columns > free;
        if self.overflow_flag {
            debug!(
                "{}.{} needs {} column(s), {} free in primary table; using overflow table",
                self.class_name, property_name, required_columns, free
            );
        }
    }

    pub fn reset_overflow_flag(&mut self) {
        self.overflow_flag = false;
    }

    /// Route the next allocations to the overflow table regardless of free
    /// primary slots. Used when an existing property is moved.
    pub fn set_overflow_flag(&mut self) {
        self.overflow_flag = matches!(self.mode, ColumnMode::Shared(s) if s.overflow_enabled);
    }

    pub fn allocate_column(&mut self, request: &ColumnRequest<'_>) -> Result<ColumnId, MappingError> {
        let column = match self.mode {
            ColumnMode::Named => self.allocate_named(request),
            ColumnMode::Shared(settings) => self.allocate_shared(request, &settings)?,
        };
        self.in_use.insert(column);
        self.taken.insert(column);
        Ok(column)
    }

    fn allocate_named(&mut self, request: &ColumnRequest<'_>) -> ColumnId {
        let mut name = request.column_name.clone();
        if self.db.find_column(self.primary, &name).is_some() {
            name = format!("{}_{}", self.class_name, request.column_name);
        }
        let name = self.db.unique_column_name(self.primary, &name);
        self.db
            .add_column(self.primary, &name, DbColumnKind::Data, Some(request.sql_type))
    }

    fn allocate_shared(
        &mut self,
        request: &ColumnRequest<'_>,
        settings: &SharedColumnSettings,
    ) -> Result<ColumnId, MappingError> {
        if !self.overflow_flag {
            if let Some(column) = self.reusable(self.primary, settings).first() {
                return Ok(*column);
            }
            if self.db.shared_columns(self.primary).len() < settings.max_shared_columns as usize {
                let name = self.db.next_shared_column_name(self.primary);
                return Ok(self.db.add_column(self.primary, &name, DbColumnKind::Shared, None));
            }
            if !settings.overflow_enabled {
                return Err(self.exhausted(
                    request,
                    self.primary,
                    format!(
                        "all {} shared columns are in use and overflow is disabled",
                        settings.max_shared_columns
                    ),
                ));
            }
        }

        let overflow = self
            .db
            .get_or_create_overflow(self.primary)
            .ok_or_else(|| MappingError::TableUnresolved {
                class: self.class_name.clone(),
            })?;
        if let Some(column) = self.reusable(overflow, settings).first() {
            return Ok(*column);
        }
        if self.db.shared_columns(overflow).len() >= settings.max_overflow_columns as usize {
            return Err(self.exhausted(
                request,
                overflow,
                format!(
                    "all {} overflow columns are in use",
                    settings.max_overflow_columns
                ),
            ));
        }
        let name = self.db.next_shared_column_name(self.primary);
        Ok(self.db.add_column(overflow, &name, DbColumnKind::Shared, None))
    }

    fn exhausted(&self, request: &ColumnRequest<'_>, table: TableId, reason: String) -> MappingError {
        MappingError::ColumnsExhausted {
            class: self.class_name.clone(),
            property: request.property_name.to_string(),
            table: self.db.table_name(table).to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_mapping::db_schema::DbTableType;

    fn settings(max: u32, overflow: bool) -> SharedColumnSettings {
        SharedColumnSettings {
            max_shared_columns: max,
            overflow_enabled: overflow,
            max_overflow_columns: 2,
            sibling_column_reuse: true,
        }
    }

    fn request(name: &str) -> ColumnRequest<'_> {
        ColumnRequest {
            property_name: name,
            column_name: name.to_string(),
            sql_type: "INTEGER",
        }
    }

    #[test]
    fn test_named_columns_and_collisions() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let mut factory = ColumnFactory::new(&mut db, "A", t, ColumnMode::Named, HashSet::new(), HashSet::new());
        let a = factory.allocate_column(&request("Name")).unwrap();
        let b = factory.allocate_column(&request("Name")).unwrap();
        assert_eq!(factory.db().column_name(a), "Name");
        assert_eq!(factory.db().column_name(b), "A_Name");
    }

    #[test]
    fn test_shared_pool_spills_to_overflow() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let mut factory = ColumnFactory::new(
            &mut db,
            "A",
            t,
            ColumnMode::Shared(settings(2, true)),
            HashSet::new(),
            HashSet::new(),
        );
        let mut columns = Vec::new();
        for name in ["P1", "P2", "P3"] {
            factory.evaluate_overflow(name, 1);
            columns.push(factory.allocate_column(&request(name)).unwrap());
            factory.reset_overflow_flag();
        }
        let db = factory.db();
        let names: Vec<&str> = columns.iter().map(|c| db.column_name(*c)).collect();
        assert_eq!(names, vec!["ps1", "ps2", "ps3"]);
        let overflow = db.table(t).unwrap().overflow.unwrap();
        assert_eq!(db.column(columns[2]).unwrap().table, overflow);
        assert_eq!(db.column(columns[1]).unwrap().table, t);
    }

    #[test]
    fn test_multi_column_property_does_not_straddle() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let mut factory = ColumnFactory::new(
            &mut db,
            "A",
            t,
            ColumnMode::Shared(settings(2, true)),
            HashSet::new(),
            HashSet::new(),
        );
        factory.evaluate_overflow("X", 1);
        factory.allocate_column(&request("X")).unwrap();
        factory.reset_overflow_flag();

        factory.evaluate_overflow("Origin", 2);
        assert!(factory.is_overflow_flag_set());
        let x = factory.allocate_column(&request("Origin")).unwrap();
        let y = factory.allocate_column(&request("Origin")).unwrap();
        factory.reset_overflow_flag();
        let db = factory.db();
        let overflow = db.table(t).unwrap().overflow.unwrap();
        assert_eq!(db.column(x).unwrap().table, overflow);
        assert_eq!(db.column(y).unwrap().table, overflow);
    }

    #[test]
    fn test_exhausted_without_overflow() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let mut factory = ColumnFactory::new(
            &mut db,
            "A",
            t,
            ColumnMode::Shared(settings(1, false)),
            HashSet::new(),
            HashSet::new(),
        );
        factory.allocate_column(&request("P1")).unwrap();
        let err = factory.allocate_column(&request("P2")).unwrap_err();
        assert!(matches!(err, MappingError::ColumnsExhausted { .. }));
    }

    #[test]
    fn test_overflow_limit() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_A", DbTableType::Primary, None);
        let mut factory = ColumnFactory::new(
            &mut db,
            "A",
            t,
            ColumnMode::Shared(settings(1, true)),
            HashSet::new(),
            HashSet::new(),
        );
        for name in ["P1", "P2", "P3"] {
            factory.evaluate_overflow(name, 1);
            factory.allocate_column(&request(name)).unwrap();
            factory.reset_overflow_flag();
        }
        factory.evaluate_overflow("P4", 1);
        assert!(factory.allocate_column(&request("P4")).is_err());
    }

    #[test]
    fn test_sibling_reuse() {
        let mut db = DbSchema::new();
        let t = db.create_table("ts_Base", DbTableType::Primary, None);
        let sibling_column = db.add_column(t, "ps1", DbColumnKind::Shared, None);
        let taken: HashSet<ColumnId> = [sibling_column].into_iter().collect();

        let mut reuse = ColumnFactory::new(
            &mut db,
            "B",
            t,
            ColumnMode::Shared(settings(4, true)),
            HashSet::new(),
            taken.clone(),
        );
        assert_eq!(reuse.allocate_column(&request("Q")).unwrap(), sibling_column);

        let mut db2 = DbSchema::new();
        let t2 = db2.create_table("ts_Base", DbTableType::Primary, None);
        let col2 = db2.add_column(t2, "ps1", DbColumnKind::Shared, None);
        let no_reuse = SharedColumnSettings {
            sibling_column_reuse: false,
            ..settings(4, true)
        };
        let mut fresh = ColumnFactory::new(
            &mut db2,
            "B",
            t2,
            ColumnMode::Shared(no_reuse),
            HashSet::new(),
            [col2].into_iter().collect(),
        );
        assert_ne!(fresh.allocate_column(&request("Q")).unwrap(), col2);
    }
}
