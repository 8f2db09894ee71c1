//! Object-to-relational mapping
//!
//! Turns the classes of a [`SchemaCatalog`](crate::ec_catalog::SchemaCatalog)
//! into physical tables and columns ([`DbSchema`]) and records where every
//! property lives ([`ClassMap`], [`PropertyMap`]).

pub mod class_map;
pub mod column_factory;
pub mod db_schema;
pub mod errors;
pub mod mapping_manager;
pub mod persistence;
pub mod property_map;

pub use class_map::{ClassMap, ClassMapRegistry, MapStrategy, SharedColumnSettings};
pub use column_factory::{ColumnFactory, ColumnMode, ColumnRequest};
pub use db_schema::{ColumnId, DbColumn, DbColumnKind, DbSchema, DbTable, DbTableType, TableId};
pub use errors::MappingError;
pub use mapping_manager::{ClassMappingManager, MappingReport, PendingMove};
pub use property_map::{
    CompoundPropertyMap, DataPropertyMap, LeafColumn, NavigationPropertyMap, PropertyMap,
    PropertyMapCollection,
};

use crate::ec_catalog::{ClassId, SchemaCatalog};

/// Catalog, physical schema and class maps of one store state. Compilation
/// reads a snapshot; an import builds the next one.
#[derive(Debug, Clone, Default)]
pub struct MappingSnapshot {
    pub catalog: SchemaCatalog,
    pub db_schema: DbSchema,
    pub class_maps: ClassMapRegistry,
}

impl MappingSnapshot {
    pub fn class_map(&self, class_id: ClassId) -> Option<&ClassMap> {
        self.class_maps.get(class_id)
    }

    /// `class_id` and its subclasses that own rows in some table
    pub fn mapped_classes(&self, class_id: ClassId) -> Vec<ClassId> {
        self.catalog
            .self_and_descendants(class_id)
            .into_iter()
            .filter(|id| self.class_maps.get(*id).is_some_and(ClassMap::is_mapped))
            .collect()
    }
}
