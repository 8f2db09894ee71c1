//! Embedded statements for struct arrays
//!
//! A struct array is never flattened into its owner's row: the owner exposes
//! its own `ECInstanceId` and an [`EmbeddedPlan`] reads the element rows of
//! the array table for that id. Plans are compiled in a nested prepare
//! context scoped to the struct class and cached per (parent ECSQL, access
//! string). [`ArrayWritePlan`]s are the INSERT-side counterpart.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::db_mapping::db_schema::{
    ARRAY_INDEX_COLUMN, CLASS_ID_COLUMN, INSTANCE_ID_COLUMN, PARENT_INSTANCE_ID_COLUMN,
};
use crate::db_mapping::{CompoundPropertyMap, MappingSnapshot, PropertyMap};
use crate::ec_catalog::{PrimitiveType, SchemaCatalog};
use crate::ecsql_prepare::finalize::{property_shape, PropertyShape};
use crate::ecsql_prepare::prepare_ctx::{PrepareContext, RangeClass};
use crate::utils::{quote_ident, LockedCache};

use super::errors::NativeSqlError;
use super::plan::{ArrayMemberColumn, ArrayWritePlan, ColumnInfo, EmbeddedPlan, ValueShape};

/// Compiled embedded plans keyed by (parent ECSQL, access string)
pub type EmbeddedPlanCache = LockedCache<(String, String), Arc<EmbeddedPlan>>;

/// Where the columns of a value come from while expanding it
pub trait ColumnSource {
    /// SQL expression of the leaf column `access`
    fn leaf(&self, access: &str) -> String;
    /// SQL expression of the id struct array elements are keyed by
    fn row_id(&self) -> String;
    fn struct_array(&mut self, access: &str) -> Result<Arc<EmbeddedPlan>, NativeSqlError>;
}

/// Push the native columns of a value of `shape` found at `access` and
/// return how to read them back
pub fn expand_value(
    catalog: &SchemaCatalog,
    shape: &PropertyShape,
    access: &str,
    source: &mut dyn ColumnSource,
    out: &mut Vec<String>,
) -> Result<ValueShape, NativeSqlError> {
    Ok(match shape {
        PropertyShape::Primitive(pt) => {
            out.push(source.leaf(access));
            ValueShape::Scalar(Some(*pt))
        }
        PropertyShape::Coordinate => {
            out.push(source.leaf(access));
            ValueShape::Scalar(Some(PrimitiveType::Double))
        }
        PropertyShape::NavigationId | PropertyShape::NavigationRelClassId => {
            out.push(source.leaf(access));
            ValueShape::Scalar(Some(PrimitiveType::Long))
        }
        PropertyShape::PrimitiveArray(pt) => {
            out.push(source.leaf(access));
            ValueShape::PrimitiveArray(*pt)
        }
        PropertyShape::Point(pt) => {
            for component in pt.components() {
                out.push(source.leaf(&format!("{}.{}", access, component)));
            }
            ValueShape::Point(*pt)
        }
        PropertyShape::Navigation { .. } => {
            out.push(source.leaf(&format!("{}.Id", access)));
            out.push(source.leaf(&format!("{}.RelECClassId", access)));
            ValueShape::Navigation
        }
        PropertyShape::Struct(struct_class) => {
            let mut members = Vec::new();
            for property in catalog.all_properties(*struct_class) {
                let member_shape = property_shape(catalog, &property)?;
                let member_access = format!("{}.{}", access, property.property.name);
                let value = expand_value(catalog, &member_shape, &member_access, source, out)?;
                members.push((property.property.name.clone(), value));
            }
            ValueShape::Struct(members)
        }
        PropertyShape::StructArray(_) => {
            out.push(source.row_id());
            ValueShape::StructArray(source.struct_array(access)?)
        }
    })
}

fn compound<'m>(map: &'m PropertyMap, access: &str) -> Result<(&'m CompoundPropertyMap, i64), NativeSqlError> {
    match map {
        PropertyMap::Compound(compound) => match compound.array_table {
            Some(table) => Ok((compound, table)),
            None => Err(NativeSqlError::Internal(format!("'{}' is not a struct array", access))),
        },
        _ => Err(NativeSqlError::Internal(format!("'{}' is not a struct array", access))),
    }
}

/// Member map at a dotted path below a compound map
fn member_at<'m>(members: &'m [Arc<PropertyMap>], path: &str) -> Option<&'m Arc<PropertyMap>> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = members.iter().find(|m| m.name().eq_ignore_ascii_case(first))?;
    for segment in segments {
        current = current.member(segment)?;
    }
    Some(current)
}

pub struct EmbeddedPlanner<'e> {
    pub snapshot: &'e MappingSnapshot,
    pub cache: &'e EmbeddedPlanCache,
    pub ecsql: &'e str,
}

impl EmbeddedPlanner<'_> {
    /// Cached plan for the struct array at `access` mapped by `map`
    pub fn plan(
        &self,
        access: &str,
        map: &PropertyMap,
        ctx: &PrepareContext<'_>,
    ) -> Result<Arc<EmbeddedPlan>, NativeSqlError> {
        let key = (self.ecsql.to_string(), access.to_string());
        self.cache
            .get_or_try_build(&key, |_| self.build(access, map, ctx).map(Arc::new))
    }

    /// Compile without the cache; nested arrays are built inline so the
    /// cache lock is never taken twice
    fn build(&self, access: &str, map: &PropertyMap, ctx: &PrepareContext<'_>) -> Result<EmbeddedPlan, NativeSqlError> {
        let (compound, table) = compound(map, access)?;
        let catalog = &self.snapshot.catalog;
        let db = &self.snapshot.db_schema;

        let mut nested = ctx.nested();
        let frame = vec![RangeClass {
            id: 0,
            alias: Some(access.to_string()),
            class_id: Some(compound.struct_class),
            name: catalog.full_name(compound.struct_class),
            only: true,
            function: None,
            node: None,
        }];

        let built = nested.scoped(frame, |nested| {
            let mut source = ArrayColumns {
                planner: self,
                compound,
                access,
                leaves: compound
                    .members
                    .iter()
                    .flat_map(|m| m.leaf_columns())
                    .map(|leaf| (leaf.access_string.to_lowercase(), db.column_name(leaf.column).to_string()))
                    .collect(),
                ctx: &*nested,
            };
            let mut exprs = Vec::new();
            let mut columns = Vec::new();
            for property in catalog.all_properties(compound.struct_class) {
                let shape = property_shape(catalog, &property)?;
                let first = exprs.len();
                let value = expand_value(catalog, &shape, &property.property.name, &mut source, &mut exprs)?;
                columns.push(ColumnInfo {
                    name: property.property.name.clone(),
                    shape: value,
                    first,
                });
            }
            Ok::<_, NativeSqlError>((exprs, columns))
        });
        let (mut exprs, columns) = built?;

        let issues = nested.take_issues();
        if let Some(issue) = issues.iter().find(|i| i.is_error()) {
            return Err(NativeSqlError::Embedded {
                access_string: access.to_string(),
                message: issue.message.clone(),
            });
        }
        for issue in issues {
            warn!("{}", issue);
        }
        if exprs.is_empty() {
            exprs.push("NULL".to_string());
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
            exprs.join(", "),
            quote_ident(db.table_name(table)),
            quote_ident(PARENT_INSTANCE_ID_COLUMN),
            quote_ident(ARRAY_INDEX_COLUMN)
        );
        debug!("Embedded statement for '{}': {}", access, sql);
        Ok(EmbeddedPlan {
            access_string: access.to_string(),
            sql,
            columns,
        })
    }
}

/// Columns of a struct array element row
struct ArrayColumns<'a, 'e> {
    planner: &'a EmbeddedPlanner<'e>,
    compound: &'a CompoundPropertyMap,
    access: &'a str,
    leaves: HashMap<String, String>,
    ctx: &'a PrepareContext<'a>,
}

impl ColumnSource for ArrayColumns<'_, '_> {
    fn leaf(&self, access: &str) -> String {
        match self.leaves.get(&access.to_lowercase()) {
            Some(column) => quote_ident(column),
            None => {
                debug!("No column for struct array member '{}.{}'", self.access, access);
                "NULL".to_string()
            }
        }
    }

    fn row_id(&self) -> String {
        quote_ident(INSTANCE_ID_COLUMN)
    }

    fn struct_array(&mut self, access: &str) -> Result<Arc<EmbeddedPlan>, NativeSqlError> {
        let full = format!("{}.{}", self.access, access);
        let Some(member) = member_at(&self.compound.members, access) else {
            return Err(NativeSqlError::Embedded {
                access_string: full,
                message: "member is not mapped".to_string(),
            });
        };
        self.planner.build(&full, member, self.ctx).map(Arc::new)
    }
}

/// Write plan for the struct array mapped by `map`; `access` is relative to
/// the value the array is read from
pub fn array_write_plan(
    snapshot: &MappingSnapshot,
    access: &str,
    map: &PropertyMap,
) -> Result<ArrayWritePlan, NativeSqlError> {
    let (compound, table) = compound(map, access)?;
    let db = &snapshot.db_schema;

    let mut members = Vec::new();
    let mut nested = Vec::new();
    for member in &compound.members {
        collect_write_columns(snapshot, member, &mut members, &mut nested)?;
    }

    let mut columns: Vec<String> = [
        INSTANCE_ID_COLUMN,
        CLASS_ID_COLUMN,
        PARENT_INSTANCE_ID_COLUMN,
        ARRAY_INDEX_COLUMN,
    ]
    .iter()
    .map(|c| quote_ident(c))
    .collect();
    columns.extend(members.iter().map(|m| quote_ident(&m.column)));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    Ok(ArrayWritePlan {
        access_string: access.to_string(),
        table: db.table_name(table).to_string(),
        struct_class: compound.struct_class,
        insert_sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(db.table_name(table)),
            columns.join(", "),
            placeholders.join(", ")
        ),
        members,
        nested,
    })
}

fn collect_write_columns(
    snapshot: &MappingSnapshot,
    map: &Arc<PropertyMap>,
    members: &mut Vec<ArrayMemberColumn>,
    nested: &mut Vec<Arc<ArrayWritePlan>>,
) -> Result<(), NativeSqlError> {
    let db = &snapshot.db_schema;
    match map.as_ref() {
        PropertyMap::Data(data) if data.is_array => {
            if let Some(column) = data.columns.first() {
                members.push(ArrayMemberColumn {
                    column: db.column_name(*column).to_string(),
                    leaf: data.access_string.clone(),
                    json: true,
                });
            }
        }
        PropertyMap::Data(_) | PropertyMap::Navigation(_) => {
            members.extend(map.leaf_columns().into_iter().map(|leaf| ArrayMemberColumn {
                column: db.column_name(leaf.column).to_string(),
                leaf: leaf.access_string,
                json: false,
            }));
        }
        PropertyMap::Compound(compound) if compound.array_table.is_some() => {
            nested.push(Arc::new(array_write_plan(snapshot, &compound.access_string, map)?));
        }
        PropertyMap::Compound(compound) => {
            for member in &compound.members {
                collect_write_columns(snapshot, member, members, nested)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcDbConfig;
    use crate::db_mapping::{ClassMapRegistry, ClassMappingManager, DbSchema};
    use crate::ec_catalog::{EcClass, EcProperty, EcSchema};

    fn snapshot() -> MappingSnapshot {
        let schema = EcSchema::new("TestSchema", "ts")
            .with_class(
                EcClass::struct_class("Part")
                    .with_property(EcProperty::primitive("Code", PrimitiveType::String)),
            )
            .with_class(
                EcClass::struct_class("Line")
                    .with_property(EcProperty::primitive("Qty", PrimitiveType::Integer))
                    .with_property(EcProperty::primitive("At", PrimitiveType::Point2d))
                    .with_property(EcProperty::primitive_array("Tags", PrimitiveType::String))
                    .with_property(EcProperty::struct_array("Parts", "Part")),
            )
            .with_class(EcClass::entity("Order").with_property(EcProperty::struct_array("Lines", "Line")));
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

    fn lines_map(snapshot: &MappingSnapshot) -> Arc<PropertyMap> {
        let order = snapshot.catalog.find_class(Some("ts"), "Order").unwrap();
        snapshot
            .class_map(order)
            .unwrap()
            .property_maps
            .get("Lines")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_embedded_plan_columns_and_cache() {
        let snapshot = snapshot();
        let cache = EmbeddedPlanCache::unbounded();
        let planner = EmbeddedPlanner {
            snapshot: &snapshot,
            cache: &cache,
            ecsql: "SELECT Lines FROM ts.Order",
        };
        let ctx = PrepareContext::new();
        let map = lines_map(&snapshot);
        let plan = planner.plan("Lines", &map, &ctx).unwrap();

        let names: Vec<&str> = plan.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Qty", "At", "Tags", "Parts"]);
        assert_eq!(plan.columns[2].first, 3);
        assert!(plan.sql.ends_with("WHERE [ParentECInstanceId] = ?1 ORDER BY [ECArrayIndex]"));
        let ValueShape::StructArray(parts) = &plan.columns[3].shape else {
            panic!("nested struct array expected");
        };
        assert_eq!(parts.access_string, "Lines.Parts");

        let again = planner.plan("Lines", &map, &ctx).unwrap();
        assert!(Arc::ptr_eq(&plan, &again));
        assert_eq!(cache.len(), 1);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_array_write_plan() {
        let snapshot = snapshot();
        let plan = array_write_plan(&snapshot, "Lines", &lines_map(&snapshot)).unwrap();
        let leaves: Vec<(&str, bool)> = plan.members.iter().map(|m| (m.leaf.as_str(), m.json)).collect();
        assert_eq!(
            leaves,
            vec![("Qty", false), ("At.X", false), ("At.Y", false), ("Tags", true)]
        );
        assert_eq!(plan.nested.len(), 1);
        assert_eq!(plan.nested[0].access_string, "Parts");
        assert!(plan.insert_sql.contains("?8"));
        assert!(!plan.insert_sql.contains("?9"));
    }
}
