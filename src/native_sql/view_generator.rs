//! Class views
//!
//! A class reference in ECSQL reads through a view: one SELECT per physical
//! table holding rows of the class or of a mapped subclass, filtered by
//! `ECClassId` and combined with `UNION ALL`. Every view exposes
//! `ECInstanceId`, `ECClassId`, the link columns of relationship classes and
//! one column per leaf access string of the class (`Addr.Street`, `Loc.X`,
//! `Parent.Id`), so expressions address every table the same way.

use std::collections::HashMap;

use log::debug;

use crate::db_mapping::db_schema::{CLASS_ID_COLUMN, INSTANCE_ID_COLUMN};
use crate::db_mapping::{ColumnId, DbColumnKind, MappingSnapshot, TableId};
use crate::ec_catalog::{ClassId, SchemaCatalog};
use crate::ecsql_prepare::finalize::{property_shape, PropertyShape};
use crate::utils::quote_ident;

use super::errors::NativeSqlError;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassView {
    pub sql: String,
    pub columns: Vec<String>,
}

/// Leaf access strings of a class in property order; struct array members
/// are not leaves of the owning row
pub fn leaf_access_strings(catalog: &SchemaCatalog, class_id: ClassId) -> Result<Vec<String>, NativeSqlError> {
    let mut leaves = Vec::new();
    collect_leaves(catalog, class_id, "", &mut leaves)?;
    Ok(leaves)
}

fn collect_leaves(
    catalog: &SchemaCatalog,
    class_id: ClassId,
    prefix: &str,
    leaves: &mut Vec<String>,
) -> Result<(), NativeSqlError> {
    for property in catalog.all_properties(class_id) {
        let access = format!("{}{}", prefix, property.property.name);
        match property_shape(catalog, &property)? {
            PropertyShape::Primitive(_) | PropertyShape::PrimitiveArray(_) => leaves.push(access),
            PropertyShape::Point(pt) => {
                leaves.extend(pt.components().iter().map(|c| format!("{}.{}", access, c)));
            }
            PropertyShape::Struct(struct_class) => {
                collect_leaves(catalog, struct_class, &format!("{}.", access), leaves)?
            }
            PropertyShape::StructArray(_) => {}
            PropertyShape::Navigation { .. } => {
                leaves.push(format!("{}.Id", access));
                leaves.push(format!("{}.RelECClassId", access));
            }
            PropertyShape::Coordinate | PropertyShape::NavigationId | PropertyShape::NavigationRelClassId => {
                unreachable!("member shapes never describe a whole property")
            }
        }
    }
    Ok(())
}

/// View over the rows of `class_id` (and its mapped subclasses unless `only`)
pub fn class_view(snapshot: &MappingSnapshot, class_id: ClassId, only: bool) -> Result<ClassView, NativeSqlError> {
    let catalog = &snapshot.catalog;
    let entry = catalog
        .get(class_id)
        .ok_or_else(|| NativeSqlError::Internal(format!("unknown class id {}", class_id)))?;
    let is_relationship = entry.class.is_relationship();

    let mut columns = vec![INSTANCE_ID_COLUMN.to_string(), CLASS_ID_COLUMN.to_string()];
    if is_relationship {
        columns.extend(DbColumnKind::LINK_COLUMNS.iter().map(|(_, name)| name.to_string()));
    }
    columns.extend(leaf_access_strings(catalog, class_id)?);

    let groups = table_groups(snapshot, class_id, only);

    if groups.is_empty() {
        debug!("Null view for {}", catalog.full_name(class_id));
        return Ok(ClassView {
            sql: null_view(&columns),
            columns,
        });
    }

    let selects = groups
        .iter()
        .map(|(table, ids)| table_select(snapshot, *table, ids, &columns, is_relationship))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "View for {}{} spans {} table(s)",
        if only { "ONLY " } else { "" },
        catalog.full_name(class_id),
        groups.len()
    );
    Ok(ClassView {
        sql: selects.join(" UNION ALL "),
        columns,
    })
}

/// Classes holding rows of `class_id` (itself only with `only`), grouped by
/// primary table in hierarchy order
pub fn table_groups(snapshot: &MappingSnapshot, class_id: ClassId, only: bool) -> Vec<(TableId, Vec<ClassId>)> {
    let classes = if only {
        snapshot
            .class_map(class_id)
            .filter(|m| m.is_mapped())
            .map(|_| vec![class_id])
            .unwrap_or_default()
    } else {
        snapshot.mapped_classes(class_id)
    };

    let mut groups: Vec<(TableId, Vec<ClassId>)> = Vec::new();
    for class in classes {
        let Some(table) = snapshot.class_map(class).and_then(|m| m.primary_table) else {
            continue;
        };
        match groups.iter_mut().find(|(t, _)| *t == table) {
            Some((_, ids)) => ids.push(class),
            None => groups.push((table, vec![class])),
        }
    }
    groups
}

/// A view without rows, used for classes no table holds
fn null_view(columns: &[String]) -> String {
    let exprs: Vec<String> = columns
        .iter()
        .map(|c| format!("NULL AS {}", quote_ident(c)))
        .collect();
    format!("SELECT {} WHERE 0", exprs.join(", "))
}

fn table_select(
    snapshot: &MappingSnapshot,
    table: TableId,
    class_ids: &[ClassId],
    columns: &[String],
    is_relationship: bool,
) -> Result<String, NativeSqlError> {
    let db = &snapshot.db_schema;
    let representative = snapshot.class_map(class_ids[0]).ok_or_else(|| NativeSqlError::UnmappedClass {
        class: snapshot.catalog.full_name(class_ids[0]),
    })?;
    let leaf_columns: HashMap<String, ColumnId> = representative
        .property_maps
        .iter()
        .flat_map(|map| map.leaf_columns())
        .map(|leaf| (leaf.access_string.to_lowercase(), leaf.column))
        .collect();
    let overflow = db.table(table).and_then(|t| t.overflow);
    let mut uses_overflow = false;

    let mut exprs = Vec::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let quoted = quote_ident(name);
        let system_kind = match i {
            0 => Some(DbColumnKind::InstanceId),
            1 => Some(DbColumnKind::ClassId),
            2..=5 if is_relationship => Some(DbColumnKind::LINK_COLUMNS[i - 2].0),
            _ => None,
        };
        let source = match system_kind {
            Some(kind) => db
                .system_column(table, kind)
                .map(|c| format!("t.{}", quote_ident(db.column_name(c)))),
            None => leaf_columns.get(&name.to_lowercase()).and_then(|c| db.column(*c)).map(|column| {
                if Some(column.table) == overflow {
                    uses_overflow = true;
                    format!("o.{}", quote_ident(&column.name))
                } else {
                    format!("t.{}", quote_ident(&column.name))
                }
            }),
        };
        exprs.push(format!("{} AS {}", source.unwrap_or_else(|| "NULL".to_string()), quoted));
    }

    let mut sql = format!("SELECT {} FROM {} t", exprs.join(", "), quote_ident(db.table_name(table)));
    if let (true, Some(overflow)) = (uses_overflow, overflow) {
        sql.push_str(&format!(
            " LEFT JOIN {} o ON o.[ECInstanceId] = t.[ECInstanceId]",
            quote_ident(db.table_name(overflow))
        ));
    }
    let ids: Vec<String> = class_ids.iter().map(|id| id.to_string()).collect();
    sql.push_str(&format!(" WHERE t.[ECClassId] IN ({})", ids.join(",")));
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcDbConfig;
    use crate::db_mapping::{ClassMapRegistry, ClassMappingManager, DbSchema};
    use crate::ec_catalog::{ClassMapHint, EcClass, EcProperty, EcSchema, PrimitiveType};

    fn snapshot(schema: EcSchema) -> MappingSnapshot {
        let catalog = SchemaCatalog::build(vec![schema], &[]).unwrap();
        let mut db = DbSchema::new();
        let mut maps = ClassMapRegistry::new();
        let report = ClassMappingManager::new(&catalog, &EcDbConfig::default(), &mut db, &mut maps).map_classes();
        assert!(!report.has_errors(), "{:?}", report.errors);
        MappingSnapshot {
            catalog,
            db_schema: db,
            class_maps: maps,
        }
    }

    fn hierarchy() -> MappingSnapshot {
        snapshot(
            EcSchema::new("TestSchema", "ts")
                .with_class(
                    EcClass::entity("Base")
                        .with_map(ClassMapHint::shared_table())
                        .with_property(EcProperty::primitive("X", PrimitiveType::Integer))
                        .with_property(EcProperty::primitive("Origin", PrimitiveType::Point2d)),
                )
                .with_class(
                    EcClass::entity("Derived")
                        .with_base("Base")
                        .with_property(EcProperty::primitive("Y", PrimitiveType::Double)),
                )
                .with_class(
                    EcClass::entity("Split")
                        .with_base("Base")
                        .with_map(ClassMapHint::own_table()),
                )
                .with_class(EcClass::entity("Ghost").with_map(ClassMapHint::not_mapped())),
        )
    }

    fn class(snapshot: &MappingSnapshot, name: &str) -> ClassId {
        snapshot.catalog.find_class(Some("ts"), name).unwrap()
    }

    #[test]
    fn test_leaf_access_strings() {
        let snapshot = hierarchy();
        let leaves = leaf_access_strings(&snapshot.catalog, class(&snapshot, "Derived")).unwrap();
        assert_eq!(leaves, vec!["X", "Origin.X", "Origin.Y", "Y"]);
    }

    #[test]
    fn test_polymorphic_view_unions_tables() {
        let snapshot = hierarchy();
        let view = class_view(&snapshot, class(&snapshot, "Base"), false).unwrap();
        assert_eq!(view.sql.matches(" UNION ALL ").count(), 1);
        assert!(view.sql.contains("AS [Origin.X]"));
        assert_eq!(view.columns[..2], ["ECInstanceId", "ECClassId"]);
    }

    #[test]
    fn test_only_restricts_to_class() {
        let snapshot = hierarchy();
        let base = class(&snapshot, "Base");
        let view = class_view(&snapshot, base, true).unwrap();
        assert!(!view.sql.contains("UNION ALL"));
        assert!(view.sql.ends_with(&format!("IN ({})", base)));
    }

    #[test]
    fn test_unmapped_class_gets_null_view() {
        let snapshot = hierarchy();
        let view = class_view(&snapshot, class(&snapshot, "Ghost"), false).unwrap();
        assert_eq!(view.sql, "SELECT NULL AS [ECInstanceId], NULL AS [ECClassId] WHERE 0");
    }
}
