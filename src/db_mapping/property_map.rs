//! Property Map Tree
//!
//! A [`PropertyMap`] records where one property of one class lives:
//!
//! - [`DataPropertyMap`]: primitive, point (one column per coordinate) and
//!   primitive-array (JSON text) properties
//! - [`CompoundPropertyMap`]: struct properties (members inline in the class's
//!   tables) and struct arrays (members in a dedicated array table, one row
//!   per element keyed by `ParentECInstanceId`)
//! - [`NavigationPropertyMap`]: the `Id`/`RelECClassId` column pair of a
//!   foreign-key relationship
//!
//! Maps are shared through `Arc` between classes of one table and are never
//! mutated in place: an incremental import builds an updated copy.
//!
//! Access strings are dotted paths from the owning scope: `Addr.Street` for a
//! struct member, `Origin.X` for a point coordinate, `Parent.Id` for a
//! navigation id. Members of a struct-array element are relative to the element.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::ec_catalog::{ClassId, NavigationDirection, PrimitiveType};

use super::db_schema::{ColumnId, DbSchema, TableId};

pub const NAV_ID_MEMBER: &str = "Id";
pub const NAV_REL_CLASS_ID_MEMBER: &str = "RelECClassId";

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyMap {
    Data(DataPropertyMap),
    Compound(CompoundPropertyMap),
    Navigation(NavigationPropertyMap),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPropertyMap {
    pub access_string: String,
    pub primitive_type: PrimitiveType,
    pub is_array: bool,
    /// One column, or one per coordinate for points
    pub columns: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundPropertyMap {
    pub access_string: String,
    pub struct_class: ClassId,
    /// Set for struct arrays: the table holding the element rows
    pub array_table: Option<TableId>,
    pub members: Vec<Arc<PropertyMap>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPropertyMap {
    pub access_string: String,
    pub relationship: ClassId,
    pub direction: NavigationDirection,
    pub id_column: ColumnId,
    pub rel_class_id_column: ColumnId,
}

/// A column exposed under a dotted access string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafColumn {
    pub access_string: String,
    pub column: ColumnId,
}

impl PropertyMap {
    pub fn access_string(&self) -> &str {
        match self {
            PropertyMap::Data(m) => &m.access_string,
            PropertyMap::Compound(m) => &m.access_string,
            PropertyMap::Navigation(m) => &m.access_string,
        }
    }

    /// Last segment of the access string
    pub fn name(&self) -> &str {
        let access = self.access_string();
        access.rsplit('.').next().unwrap_or(access)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, PropertyMap::Compound(_))
    }

    pub fn is_struct_array(&self) -> bool {
        matches!(self, PropertyMap::Compound(CompoundPropertyMap { array_table: Some(_), .. }))
    }

    /// Columns in the owning row's tables. Struct-array element columns are
    /// not included; they belong to the array table.
    pub fn columns(&self) -> Vec<ColumnId> {
        match self {
            PropertyMap::Data(m) => m.columns.clone(),
            PropertyMap::Navigation(m) => vec![m.id_column, m.rel_class_id_column],
            PropertyMap::Compound(m) if m.array_table.is_some() => Vec::new(),
            PropertyMap::Compound(m) => m.members.iter().flat_map(|p| p.columns()).collect(),
        }
    }

    /// Tables the owning-row columns of this map live in
    pub fn tables(&self, db: &DbSchema) -> BTreeSet<TableId> {
        self.columns()
            .into_iter()
            .filter_map(|c| db.column(c).map(|col| col.table))
            .collect()
    }

    /// Owning-row columns with the access strings they are exposed under
    pub fn leaf_columns(&self) -> Vec<LeafColumn> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves(&self, leaves: &mut Vec<LeafColumn>) {
        match self {
            PropertyMap::Data(m) => {
                let components = m.primitive_type.components();
                if components.is_empty() || m.is_array {
                    if let Some(column) = m.columns.first() {
                        leaves.push(LeafColumn {
                            access_string: m.access_string.clone(),
                            column: *column,
                        });
                    }
                } else {
                    for (component, column) in components.iter().zip(&m.columns) {
                        leaves.push(LeafColumn {
                            access_string: format!("{}.{}", m.access_string, component),
                            column: *column,
                        });
                    }
                }
            }
            PropertyMap::Navigation(m) => {
                leaves.push(LeafColumn {
                    access_string: format!("{}.{}", m.access_string, NAV_ID_MEMBER),
                    column: m.id_column,
                });
                leaves.push(LeafColumn {
                    access_string: format!("{}.{}", m.access_string, NAV_REL_CLASS_ID_MEMBER),
                    column: m.rel_class_id_column,
                });
            }
            PropertyMap::Compound(m) if m.array_table.is_some() => {}
            PropertyMap::Compound(m) => {
                for member in &m.members {
                    member.collect_leaves(leaves);
                }
            }
        }
    }

    /// Rows of `ec_PropertyMap` for this map: full access string and column.
    /// A struct array contributes one row pointing at its table's
    /// `ParentECInstanceId` column, followed by its members prefixed with its
    /// own access string.
    pub fn persisted_rows(&self, db: &DbSchema) -> Vec<(String, ColumnId)> {
        let mut rows = Vec::new();
        self.collect_rows("", db, &mut rows);
        rows
    }

    fn collect_rows(&self, prefix: &str, db: &DbSchema, rows: &mut Vec<(String, ColumnId)>) {
        match self {
            PropertyMap::Data(_) | PropertyMap::Navigation(_) => {
                for leaf in self.leaf_columns() {
                    rows.push((format!("{}{}", prefix, leaf.access_string), leaf.column));
                }
            }
            PropertyMap::Compound(m) => match m.array_table {
                Some(table) => {
                    let access = format!("{}{}", prefix, m.access_string);
                    if let Some(parent_column) = db.system_column(
                        table,
                        super::db_schema::DbColumnKind::ParentInstanceId,
                    ) {
                        rows.push((access.clone(), parent_column));
                    }
                    let nested_prefix = format!("{}.", access);
                    for member in &m.members {
                        member.collect_rows(&nested_prefix, db, rows);
                    }
                }
                None => {
                    for member in &m.members {
                        member.collect_rows(prefix, db, rows);
                    }
                }
            },
        }
    }

    /// Member of a compound map by name (case-insensitive)
    pub fn member(&self, name: &str) -> Option<&Arc<PropertyMap>> {
        match self {
            PropertyMap::Compound(m) => m.members.iter().find(|p| p.name().eq_ignore_ascii_case(name)),
            PropertyMap::Data(_) | PropertyMap::Navigation(_) => None,
        }
    }
}

/// Property maps of one class in declaration order, inherited first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMapCollection {
    maps: Vec<Arc<PropertyMap>>,
    index: HashMap<String, usize>,
}

impl PropertyMapCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PropertyMap>> {
        self.index.get(&name.to_lowercase()).map(|i| &self.maps[*i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Add a map for a property not yet in the collection. Returns false (and
    /// leaves the collection unchanged) if the name is already taken.
    pub fn insert(&mut self, map: Arc<PropertyMap>) -> bool {
        let key = map.name().to_lowercase();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.maps.len());
        self.maps.push(map);
        true
    }

    /// Replace the map of an existing property, keeping its position
    pub fn replace(&mut self, map: Arc<PropertyMap>) -> bool {
        match self.index.get(&map.name().to_lowercase()) {
            Some(i) => {
                self.maps[*i] = map;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PropertyMap>> {
        self.maps.iter()
    }

    /// Resolve a dotted access string through compound members
    pub fn find(&self, access_string: &str) -> Option<&Arc<PropertyMap>> {
        let mut segments = access_string.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.member(segment)?;
        }
        Some(current)
    }

    /// Every owning-row column mapped by this collection
    pub fn columns(&self) -> Vec<ColumnId> {
        self.maps.iter().flat_map(|m| m.columns()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_mapping::db_schema::{DbColumnKind, DbTableType};

    fn data(access: &str, t: PrimitiveType, columns: Vec<ColumnId>) -> Arc<PropertyMap> {
        Arc::new(PropertyMap::Data(DataPropertyMap {
            access_string: access.into(),
            primitive_type: t,
            is_array: false,
            columns,
        }))
    }

    #[test]
    fn test_leaf_columns_for_struct_and_point() {
        let addr = PropertyMap::Compound(CompoundPropertyMap {
            access_string: "Addr".into(),
            struct_class: 9,
            array_table: None,
            members: vec![
                data("Addr.Street", PrimitiveType::String, vec![3]),
                data("Addr.Loc", PrimitiveType::Point2d, vec![4, 5]),
            ],
        });
        let leaves: Vec<String> = addr.leaf_columns().into_iter().map(|l| l.access_string).collect();
        assert_eq!(leaves, vec!["Addr.Street", "Addr.Loc.X", "Addr.Loc.Y"]);
        assert_eq!(addr.columns(), vec![3, 4, 5]);
        assert_eq!(addr.member("street").unwrap().name(), "Street");
    }

    #[test]
    fn test_struct_array_rows() {
        let mut db = DbSchema::new();
        let primary = db.create_table("ts_A", DbTableType::Primary, None);
        let arr = db.create_table("ts_A_Items", DbTableType::StructArray, Some(primary));
        let name_col = db.add_column(arr, "Name", DbColumnKind::Data, Some("TEXT"));
        let items = PropertyMap::Compound(CompoundPropertyMap {
            access_string: "Items".into(),
            struct_class: 3,
            array_table: Some(arr),
            members: vec![data("Name", PrimitiveType::String, vec![name_col])],
        });
        assert!(items.columns().is_empty());
        let rows = items.persisted_rows(&db);
        let parent_col = db.system_column(arr, DbColumnKind::ParentInstanceId).unwrap();
        assert_eq!(
            rows,
            vec![("Items".to_string(), parent_col), ("Items.Name".to_string(), name_col)]
        );
    }

    #[test]
    fn test_collection_case_insensitive_and_ordered() {
        let mut maps = PropertyMapCollection::new();
        assert!(maps.insert(data("X", PrimitiveType::Integer, vec![1])));
        assert!(maps.insert(data("Y", PrimitiveType::Double, vec![2])));
        assert!(!maps.insert(data("x", PrimitiveType::Integer, vec![3])));
        assert_eq!(maps.get("x").unwrap().columns(), vec![1]);
        let names: Vec<&str> = maps.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["X", "Y"]);
        assert!(maps.replace(data("X", PrimitiveType::Integer, vec![7])));
        assert_eq!(maps.columns(), vec![7, 2]);
    }

    #[test]
    fn test_navigation_leaves() {
        let nav = PropertyMap::Navigation(NavigationPropertyMap {
            access_string: "Parent".into(),
            relationship: 4,
            direction: NavigationDirection::Forward,
            id_column: 10,
            rel_class_id_column: 11,
        });
        let mut maps = PropertyMapCollection::new();
        maps.insert(Arc::new(nav));
        let leaves = maps.get("Parent").unwrap().leaf_columns();
        assert_eq!(leaves[0].access_string, "Parent.Id");
        assert_eq!(leaves[1].access_string, "Parent.RelECClassId");
    }
}
