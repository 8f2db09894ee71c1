//! Class Mapping Manager
//!
//! Walks the catalog base-first and builds or extends the [`ClassMap`] of
//! every class. Table placement follows the class's map hint, or its base's
//! strategy when it has none:
//!
//! - `SharedTable` is inherited: every subclass lands in the root's table
//! - `OwnTable` gives each subclass a fresh table
//! - `NotMapped` is inherited unless a subclass says otherwise
//!
//! Struct classes get no class map. Relationship classes realized by a
//! navigation property are foreign-key mapped (no table of their own); all
//! other relationship classes get a link table.
//!
//! On an incremental import only new properties and new struct members are
//! mapped; existing columns never change. The exception is a struct that no
//! longer fits into a shared-column primary table: its whole subtree is moved
//! into the overflow table and a [`PendingMove`] is recorded so that the
//! persistence layer can copy the data.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::EcDbConfig;
use crate::ec_catalog::{
    ClassId, EcProperty, MapStrategyHint, PropertyKind, PropertyRef, SchemaCatalog,
};

use super::class_map::{ClassMap, ClassMapRegistry, MapStrategy, SharedColumnSettings};
use super::column_factory::{ColumnFactory, ColumnMode, ColumnRequest};
use super::db_schema::{ColumnId, DbSchema, DbTableType, TableId};
use super::errors::MappingError;
use super::property_map::{
    CompoundPropertyMap, DataPropertyMap, NavigationPropertyMap, PropertyMap,
};

/// Data copy owed to the store after a property moved to the overflow table
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub class_ids: Vec<ClassId>,
    pub property: String,
    pub from_table: TableId,
    pub to_table: TableId,
    /// (old column, new column)
    pub columns: Vec<(ColumnId, ColumnId)>,
}

#[derive(Debug, Default)]
pub struct MappingReport {
    /// Classes that received their first class map
    pub mapped_classes: Vec<ClassId>,
    /// Classes whose existing map was extended
    pub updated_classes: Vec<ClassId>,
    pub moves: Vec<PendingMove>,
    pub errors: Vec<MappingError>,
}

impl MappingReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct ClassMappingManager<'a> {
    catalog: &'a SchemaCatalog,
    config: &'a EcDbConfig,
    db: &'a mut DbSchema,
    class_maps: &'a mut ClassMapRegistry,
    report: MappingReport,
}

impl<'a> ClassMappingManager<'a> {
    pub fn new(
        catalog: &'a SchemaCatalog,
        config: &'a EcDbConfig,
        db: &'a mut DbSchema,
        class_maps: &'a mut ClassMapRegistry,
    ) -> Self {
        ClassMappingManager {
            catalog,
            config,
            db,
            class_maps,
            report: MappingReport::default(),
        }
    }

    /// Map every class of the catalog, bases first
    pub fn map_classes(mut self) -> MappingReport {
        for class_id in self.catalog.hierarchy_order() {
            if let Err(err) = self.map_class(class_id) {
                warn!("Mapping of {} failed: {}", self.catalog.full_name(class_id), err);
                self.report.errors.push(err);
            }
        }
        self.report
    }

    pub fn map_class(&mut self, class_id: ClassId) -> Result<(), MappingError> {
        let catalog = self.catalog;
        let entry = catalog.get(class_id).ok_or_else(|| MappingError::ClassMapNotFound {
            class: catalog.full_name(class_id),
        })?;
        if entry.class.is_struct() {
            return Ok(());
        }

        let existed = self.class_maps.contains(class_id);
        let mut class_map = match self.class_maps.get(class_id) {
            Some(map) => map.clone(),
            None => self.create_class_map(class_id)?,
        };
        if class_map.strategy == MapStrategy::NotMapped {
            if !existed {
                debug!("{} is not mapped", entry.full_name());
                self.report.mapped_classes.push(class_id);
            }
            self.class_maps.insert(class_map);
            return Ok(());
        }

        let primary = class_map
            .primary_table
            .filter(|t| self.db.table(*t).is_some())
            .ok_or_else(|| MappingError::TableUnresolved {
                class: entry.full_name(),
            })?;
        let mode = match class_map.shared_columns {
            Some(settings) => ColumnMode::Shared(settings),
            None => ColumnMode::Named,
        };

        let table_classes = self.class_maps.classes_in_table(primary);
        let mut line = catalog.ancestors_or_self(class_id);
        line.extend(catalog.descendants(class_id));
        line.retain(|c| table_classes.contains(c));
        let mut in_use = self.class_maps.columns_used_by(&line);
        in_use.extend(class_map.property_maps.columns());
        let mut taken = self.class_maps.columns_used_by(&table_classes);
        taken.extend(in_use.iter().copied());

        let base_map = catalog.base(class_id).and_then(|b| self.class_maps.get(b)).cloned();
        let mut move_classes = vec![class_id];
        move_classes.extend(
            catalog
                .descendants(class_id)
                .into_iter()
                .filter(|c| table_classes.contains(c)),
        );

        let mut mapper = PropertyMapper {
            catalog,
            class_name: entry.name().to_string(),
            schema_alias: entry.schema_alias.clone(),
            owner_name: entry.name().to_string(),
            incremental_shared: existed && matches!(mode, ColumnMode::Shared(_)),
            move_classes,
            moves: Vec::new(),
        };
        let mut factory = ColumnFactory::new(&mut *self.db, entry.name(), primary, mode, in_use, taken);

        for property in catalog.all_properties(class_id) {
            let name = property.property.name.as_str();

            if property.declaring_class != class_id {
                let inherited = base_map.as_ref().and_then(|base| {
                    let map = base.property_maps.get(name)?;
                    (base.primary_table == Some(primary) || map.is_struct_array()).then(|| map.clone())
                });
                if let Some(inherited) = inherited {
                    upsert(&mut class_map, inherited);
                    continue;
                }
            }

            // A scalar map can only come from an earlier import and stays as is;
            // compound maps grow by their new members.
            let existing = class_map.property_maps.get(name).cloned();
            if existing.as_ref().is_some_and(|m| !m.is_compound()) {
                debug_assert!(existed, "{}.{} mapped twice in one import", entry.full_name(), name);
                continue;
            }
            match mapper.map_property(&mut factory, existing.as_ref(), &property) {
                Ok(map) => upsert(&mut class_map, map),
                Err(err) => {
                    warn!("{}.{}: {}", entry.full_name(), name, err);
                    self.report.errors.push(err);
                }
            }
        }
        drop(factory);

        self.report.moves.extend(mapper.moves);
        if existed {
            self.report.updated_classes.push(class_id);
        } else {
            debug!(
                "Mapped {} to {} ({:?}, {} properties)",
                entry.full_name(),
                self.db.table_name(primary),
                class_map.strategy,
                class_map.property_maps.len()
            );
            self.report.mapped_classes.push(class_id);
        }
        self.class_maps.insert(class_map);
        Ok(())
    }

    fn is_foreign_key_relationship(&self, class_id: ClassId) -> bool {
        self.catalog
            .ancestors_or_self(class_id)
            .into_iter()
            .any(|c| !self.catalog.navigation_properties_for(c).is_empty())
    }

    fn create_class_map(&mut self, class_id: ClassId) -> Result<ClassMap, MappingError> {
        let catalog = self.catalog;
        let entry = catalog.get(class_id).ok_or_else(|| MappingError::ClassMapNotFound {
            class: catalog.full_name(class_id),
        })?;
        let is_relationship = entry.class.is_relationship();
        if is_relationship && self.is_foreign_key_relationship(class_id) {
            debug!("{} is realized by navigation properties", entry.full_name());
            return Ok(ClassMap::new(class_id, MapStrategy::NotMapped, None));
        }

        let hint = entry.class.map.as_ref();
        let base_map = catalog.base(class_id).and_then(|b| self.class_maps.get(b));

        enum Placement {
            NotMapped,
            Own(Option<SharedColumnSettings>),
            Inherit(ClassMap),
        }
        let placement = match (hint.map(|h| h.strategy), base_map) {
            (Some(MapStrategyHint::NotMapped), _) => Placement::NotMapped,
            (Some(MapStrategyHint::OwnTable), _) => Placement::Own(None),
            (Some(MapStrategyHint::SharedTable), Some(base))
                if base.strategy == MapStrategy::SharedTable =>
            {
                Placement::Inherit(base.clone())
            }
            (Some(MapStrategyHint::SharedTable), _) => Placement::Own(
                hint.and_then(|h| h.shared_columns.as_ref())
                    .map(|s| SharedColumnSettings::resolve(s, self.config)),
            ),
            (None, Some(base)) => match base.strategy {
                MapStrategy::NotMapped => Placement::NotMapped,
                MapStrategy::SharedTable => Placement::Inherit(base.clone()),
                MapStrategy::OwnTable => Placement::Own(None),
            },
            (None, None) => Placement::Own(None),
        };

        let map = match placement {
            Placement::NotMapped => ClassMap::new(class_id, MapStrategy::NotMapped, None),
            Placement::Inherit(base) => {
                let mut map = ClassMap::new(class_id, MapStrategy::SharedTable, base.primary_table);
                map.shared_columns = base.shared_columns;
                map.is_link_table = base.is_link_table;
                map
            }
            Placement::Own(shared_columns) => {
                let strategy = if hint.is_some_and(|h| h.strategy == MapStrategyHint::SharedTable) {
                    MapStrategy::SharedTable
                } else {
                    MapStrategy::OwnTable
                };
                let name = format!("{}_{}", entry.schema_alias, entry.name());
                let table = self.db.create_table(&name, DbTableType::Primary, None);
                if is_relationship {
                    self.db.add_link_columns(table);
                }
                let mut map = ClassMap::new(class_id, strategy, Some(table));
                map.shared_columns = shared_columns;
                map.is_link_table = is_relationship;
                map
            }
        };
        Ok(map)
    }
}

fn upsert(class_map: &mut ClassMap, map: Arc<PropertyMap>) {
    if !class_map.property_maps.replace(map.clone()) {
        class_map.property_maps.insert(map);
    }
}

/// Column name for an access string in a named-column table
fn column_base_name(access_string: &str) -> String {
    access_string.replace('.', "_")
}

struct PropertyMapper<'c> {
    catalog: &'c SchemaCatalog,
    class_name: String,
    schema_alias: String,
    /// Class declaring the top-level property being mapped
    owner_name: String,
    /// Extending a shared-column map created by an earlier import
    incremental_shared: bool,
    move_classes: Vec<ClassId>,
    moves: Vec<PendingMove>,
}

impl PropertyMapper<'_> {
    /// Map one top-level property, or extend the existing map of a struct
    /// property with its new members
    fn map_property(
        &mut self,
        factory: &mut ColumnFactory<'_>,
        existing: Option<&Arc<PropertyMap>>,
        property: &PropertyRef<'_>,
    ) -> Result<Arc<PropertyMap>, MappingError> {
        let name = property.property.name.as_str();
        if existing.is_some_and(|m| !m.is_compound()) {
            return Err(MappingError::AlreadyMapped {
                class: self.class_name.clone(),
                property: name.to_string(),
            });
        }
        self.owner_name = self
            .catalog
            .get(property.declaring_class)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| self.class_name.clone());

        let required = self.required_columns(property.declaring_class, property.property, existing)?;
        factory.evaluate_overflow(name, required);
        let mapped = self.map_value(factory, existing, property.declaring_class, property.property, "");
        factory.reset_overflow_flag();
        let map = mapped?;

        let tables = map.tables(factory.db());
        if tables.len() <= 1 {
            return Ok(map);
        }
        if !self.incremental_shared {
            return Err(MappingError::IllegalMove {
                class: self.class_name.clone(),
                property: name.to_string(),
                tables: tables
                    .iter()
                    .map(|t| factory.db().table_name(*t).to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        self.move_to_overflow(factory, map, name)
    }

    /// Owning-row columns still to be allocated for `property`
    fn required_columns(
        &self,
        context: ClassId,
        property: &EcProperty,
        existing: Option<&Arc<PropertyMap>>,
    ) -> Result<usize, MappingError> {
        if existing.is_some_and(|m| !m.is_compound()) {
            return Ok(0);
        }
        Ok(match &property.kind {
            PropertyKind::Primitive { primitive_type } => primitive_type.column_count(),
            PropertyKind::PrimitiveArray { .. } => 1,
            PropertyKind::Navigation { .. } => 2,
            PropertyKind::StructArray { .. } => 0,
            PropertyKind::Struct { struct_class } => {
                let struct_id = self.catalog.resolve_reference(context, struct_class)?;
                let mut total = 0;
                for member in self.catalog.all_properties(struct_id) {
                    let existing_member = existing.and_then(|e| e.member(&member.property.name));
                    total += self.required_columns(member.declaring_class, member.property, existing_member)?;
                }
                total
            }
        })
    }

    fn map_value(
        &mut self,
        factory: &mut ColumnFactory<'_>,
        existing: Option<&Arc<PropertyMap>>,
        context: ClassId,
        property: &EcProperty,
        prefix: &str,
    ) -> Result<Arc<PropertyMap>, MappingError> {
        if let Some(existing) = existing.filter(|m| !m.is_compound()) {
            return Ok(existing.clone());
        }
        let access_string = format!("{}{}", prefix, property.name);
        let base_name = column_base_name(&access_string);
        let property_name = property.name.as_str();
        let request = |column_name: String, sql_type: &'static str| ColumnRequest {
            property_name,
            column_name,
            sql_type,
        };

        let map = match &property.kind {
            PropertyKind::Primitive { primitive_type } => {
                let columns = if primitive_type.is_point() {
                    primitive_type
                        .components()
                        .iter()
                        .map(|c| factory.allocate_column(&request(format!("{}_{}", base_name, c), "REAL")))
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    vec![factory.allocate_column(&request(base_name, primitive_type.sql_type()))?]
                };
                PropertyMap::Data(DataPropertyMap {
                    access_string,
                    primitive_type: *primitive_type,
                    is_array: false,
                    columns,
                })
            }
            PropertyKind::PrimitiveArray { primitive_type } => {
                let column = factory.allocate_column(&request(base_name, "TEXT"))?;
                PropertyMap::Data(DataPropertyMap {
                    access_string,
                    primitive_type: *primitive_type,
                    is_array: true,
                    columns: vec![column],
                })
            }
            PropertyKind::Navigation { direction, .. } => {
                let relationship = self.catalog.relationship_of(&PropertyRef {
                    declaring_class: context,
                    property,
                })?;
                let id_column = factory.allocate_column(&request(format!("{}Id", base_name), "INTEGER"))?;
                let rel_class_id_column =
                    factory.allocate_column(&request(format!("{}RelECClassId", base_name), "INTEGER"))?;
                PropertyMap::Navigation(NavigationPropertyMap {
                    access_string,
                    relationship,
                    direction: *direction,
                    id_column,
                    rel_class_id_column,
                })
            }
            PropertyKind::Struct { struct_class } => {
                let struct_id = self.catalog.resolve_reference(context, struct_class)?;
                let nested_prefix = format!("{}.", access_string);
                let mut members = Vec::new();
                for member in self.catalog.all_properties(struct_id) {
                    let existing_member = existing.and_then(|e| e.member(&member.property.name));
                    members.push(self.map_value(
                        factory,
                        existing_member,
                        member.declaring_class,
                        member.property,
                        &nested_prefix,
                    )?);
                }
                PropertyMap::Compound(CompoundPropertyMap {
                    access_string,
                    struct_class: struct_id,
                    array_table: None,
                    members,
                })
            }
            PropertyKind::StructArray { struct_class } => {
                let struct_id = self.catalog.resolve_reference(context, struct_class)?;
                let owner = factory.primary_table();
                let table = match existing.and_then(|m| match m.as_ref() {
                    PropertyMap::Compound(c) => c.array_table,
                    _ => None,
                }) {
                    Some(table) => table,
                    None => {
                        let db = factory.db();
                        let name = match db.table(owner).map(|t| t.table_type) {
                            Some(DbTableType::StructArray) => {
                                format!("{}_{}", db.table_name(owner), base_name)
                            }
                            _ => format!("{}_{}_{}", self.schema_alias, self.owner_name, base_name),
                        };
                        factory.db_mut().create_table(&name, DbTableType::StructArray, Some(owner))
                    }
                };
                let struct_name = self
                    .catalog
                    .get(struct_id)
                    .map(|c| c.name().to_string())
                    .unwrap_or_default();
                let mut element_factory = ColumnFactory::new(
                    factory.db_mut(),
                    struct_name,
                    table,
                    ColumnMode::Named,
                    HashSet::new(),
                    HashSet::new(),
                );
                let mut members = Vec::new();
                for member in self.catalog.all_properties(struct_id) {
                    let existing_member = existing.and_then(|e| e.member(&member.property.name));
                    members.push(self.map_value(
                        &mut element_factory,
                        existing_member,
                        member.declaring_class,
                        member.property,
                        "",
                    )?);
                }
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

    /// Reallocate every primary-table column of `map` in the overflow table
    fn move_to_overflow(
        &mut self,
        factory: &mut ColumnFactory<'_>,
        map: Arc<PropertyMap>,
        property_name: &str,
    ) -> Result<Arc<PropertyMap>, MappingError> {
        let primary = factory.primary_table();
        let overflow = factory
            .db()
            .table(primary)
            .and_then(|t| t.overflow)
            .ok_or_else(|| MappingError::TableUnresolved {
                class: self.class_name.clone(),
            })?;
        let stale: Vec<ColumnId> = map
            .columns()
            .into_iter()
            .filter(|c| factory.db().column(*c).is_some_and(|col| col.table != overflow))
            .collect();

        factory.set_overflow_flag();
        let mut moved = HashMap::new();
        let mut pairs = Vec::new();
        for old in stale {
            let allocated = factory.allocate_column(&ColumnRequest {
                property_name,
                column_name: factory.db().column_name(old).to_string(),
                sql_type: "BLOB",
            });
            let new = match allocated {
                Ok(new) => new,
                Err(err) => {
                    factory.reset_overflow_flag();
                    return Err(err);
                }
            };
            moved.insert(old, new);
            pairs.push((old, new));
        }
        factory.reset_overflow_flag();

        info!(
            "Moving {}.{} ({} column(s)) from {} to {}",
            self.class_name,
            property_name,
            pairs.len(),
            factory.db().table_name(primary),
            factory.db().table_name(overflow)
        );
        self.moves.push(PendingMove {
            class_ids: self.move_classes.clone(),
            property: property_name.to_string(),
            from_table: primary,
            to_table: overflow,
            columns: pairs,
        });
        Ok(Arc::new(remap_columns(&map, &moved)))
    }
}

/// Copy of `map` with its owning-row columns replaced through `moved`
fn remap_columns(map: &PropertyMap, moved: &HashMap<ColumnId, ColumnId>) -> PropertyMap {
    let remap = |c: &ColumnId| *moved.get(c).unwrap_or(c);
    match map {
        PropertyMap::Data(m) => PropertyMap::Data(DataPropertyMap {
            columns: m.columns.iter().map(remap).collect(),
            ..m.clone()
        }),
        PropertyMap::Navigation(m) => PropertyMap::Navigation(NavigationPropertyMap {
            id_column: remap(&m.id_column),
            rel_class_id_column: remap(&m.rel_class_id_column),
            ..m.clone()
        }),
        PropertyMap::Compound(m) if m.array_table.is_some() => map.clone(),
        PropertyMap::Compound(m) => PropertyMap::Compound(CompoundPropertyMap {
            members: m
                .members
                .iter()
                .map(|member| Arc::new(remap_columns(member, moved)))
                .collect(),
            ..m.clone()
        }),
    }
}
