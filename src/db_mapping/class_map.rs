//! Class maps
//!
//! A [`ClassMap`] is created the first time a class is imported and is only
//! ever extended afterwards. It holds the resolved strategy, the primary table
//! and the class's [`PropertyMapCollection`].

use std::collections::{BTreeMap, HashSet};

use crate::config::EcDbConfig;
use crate::ec_catalog::{ClassId, SharedColumnsHint};

use super::db_schema::{ColumnId, DbSchema, TableId};
use super::property_map::PropertyMapCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapStrategy {
    OwnTable,
    SharedTable,
    NotMapped,
}

impl MapStrategy {
    pub fn code(self) -> i64 {
        match self {
            MapStrategy::OwnTable => 0,
            MapStrategy::SharedTable => 1,
            MapStrategy::NotMapped => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MapStrategy::OwnTable),
            1 => Some(MapStrategy::SharedTable),
            2 => Some(MapStrategy::NotMapped),
            _ => None,
        }
    }
}

/// Effective shared-column limits of a shared-table hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedColumnSettings {
    pub max_shared_columns: u32,
    pub overflow_enabled: bool,
    pub max_overflow_columns: u32,
    pub sibling_column_reuse: bool,
}

impl SharedColumnSettings {
    /// Hint values win; unset values come from the store configuration
    pub fn resolve(hint: &SharedColumnsHint, config: &EcDbConfig) -> Self {
        SharedColumnSettings {
            max_shared_columns: hint.max_shared_columns.unwrap_or(config.max_shared_columns),
            overflow_enabled: hint.overflow.unwrap_or(config.overflow_enabled),
            max_overflow_columns: hint
                .max_overflow_columns
                .unwrap_or(config.max_overflow_columns),
            sibling_column_reuse: config.sibling_column_reuse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMap {
    pub class_id: ClassId,
    pub strategy: MapStrategy,
    pub primary_table: Option<TableId>,
    pub shared_columns: Option<SharedColumnSettings>,
    /// Relationship class stored in a link table with source/target columns
    pub is_link_table: bool,
    pub property_maps: PropertyMapCollection,
}

impl ClassMap {
    pub fn new(class_id: ClassId, strategy: MapStrategy, primary_table: Option<TableId>) -> Self {
        ClassMap {
            class_id,
            strategy,
            primary_table,
            shared_columns: None,
            is_link_table: false,
            property_maps: PropertyMapCollection::new(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.strategy != MapStrategy::NotMapped && self.primary_table.is_some()
    }

    /// Primary table followed by its overflow table, if any
    pub fn tables(&self, db: &DbSchema) -> Vec<TableId> {
        let mut tables = Vec::new();
        if let Some(primary) = self.primary_table {
            tables.push(primary);
            if let Some(overflow) = db.table(primary).and_then(|t| t.overflow) {
                tables.push(overflow);
            }
        }
        tables
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMapRegistry {
    maps: BTreeMap<ClassId, ClassMap>,
}

impl ClassMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_id: ClassId) -> Option<&ClassMap> {
        self.maps.get(&class_id)
    }

    pub fn get_mut(&mut self, class_id: ClassId) -> Option<&mut ClassMap> {
        self.maps.get_mut(&class_id)
    }

    pub fn contains(&self, class_id: ClassId) -> bool {
        self.maps.contains_key(&class_id)
    }

    pub fn insert(&mut self, map: ClassMap) {
        self.maps.insert(map.class_id, map);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassMap> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Mapped classes whose primary table is `table`
    pub fn classes_in_table(&self, table: TableId) -> Vec<ClassId> {
        self.maps
            .values()
            .filter(|m| m.primary_table == Some(table))
            .map(|m| m.class_id)
            .collect()
    }

    /// Owning-row columns used by any of `classes`
    pub fn columns_used_by(&self, classes: &[ClassId]) -> HashSet<ColumnId> {
        classes
            .iter()
            .filter_map(|c| self.maps.get(c))
            .flat_map(|m| m.property_maps.columns())
            .collect()
    }
}
