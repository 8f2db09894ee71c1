//! Resolved view over a set of EC schemas
//!
//! [`SchemaCatalog`] assigns class ids, resolves base classes and cross-class
//! references, and answers hierarchy questions (`is_a`, descendants, the
//! inherited property list). A catalog is immutable; an import builds a new
//! one with [`SchemaCatalog::merge`] and swaps it in only on success.
//!
//! Class references inside a schema may be unqualified (`Address`, same
//! schema) or qualified by schema name or alias (`ts.Address`, `TestSchema.Address`).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::ec_schema::{EcClass, EcProperty, EcSchema, PropertyKind};
use super::errors::SchemaError;

pub type ClassId = i64;

/// Persisted assignment of an id to a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIdEntry {
    pub id: ClassId,
    pub schema: String,
    pub class: String,
}

#[derive(Debug, Clone)]
pub struct CatalogClass {
    pub id: ClassId,
    pub schema_name: String,
    pub schema_alias: String,
    pub class: EcClass,
    pub base: Option<ClassId>,
    schema_index: usize,
}

impl CatalogClass {
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// `Schema.Class`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.class.name)
    }
}

/// A property together with the class that declares it
#[derive(Debug, Clone, Copy)]
pub struct PropertyRef<'a> {
    pub declaring_class: ClassId,
    pub property: &'a EcProperty,
}

/// A navigation property that realizes a foreign-key relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRef {
    pub holder: ClassId,
    pub property: String,
    pub direction: super::ec_schema::NavigationDirection,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: Vec<EcSchema>,
    classes: BTreeMap<ClassId, CatalogClass>,
    by_name: HashMap<String, ClassId>,
    derived: HashMap<ClassId, Vec<ClassId>>,
}

fn name_key(schema: &str, class: &str) -> String {
    format!("{}.{}", schema.to_lowercase(), class.to_lowercase())
}

impl SchemaCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a catalog from schemas, reusing the ids in `known_ids` and
    /// assigning new ids (in declaration order) to classes seen for the first time.
    pub fn build(schemas: Vec<EcSchema>, known_ids: &[ClassIdEntry]) -> Result<Self, Vec<SchemaError>> {
        let known: HashMap<String, ClassId> = known_ids
            .iter()
            .map(|e| (name_key(&e.schema, &e.class), e.id))
            .collect();
        let mut next_id = known_ids.iter().map(|e| e.id).max().unwrap_or(0) + 1;

        let mut catalog = SchemaCatalog {
            schemas,
            ..Default::default()
        };

        for (schema_index, schema) in catalog.schemas.iter().enumerate() {
            for class in &schema.classes {
                let key = name_key(&schema.name, &class.name);
                let id = match known.get(&key) {
                    Some(id) => *id,
                    None => {
                        let id = next_id;
                        next_id += 1;
                        id
                    }
                };
                catalog.by_name.insert(key, id);
                catalog
                    .by_name
                    .entry(name_key(&schema.alias, &class.name))
                    .or_insert(id);
                catalog.classes.insert(
                    id,
                    CatalogClass {
                        id,
                        schema_name: schema.name.clone(),
                        schema_alias: schema.alias.clone(),
                        class: class.clone(),
                        base: None,
                        schema_index,
                    },
                );
            }
        }

        let mut errors = Vec::new();
        let mut bases = Vec::new();
        for entry in catalog.classes.values() {
            if let Some(base_name) = &entry.class.base_class {
                match catalog.resolve_in_schema(entry.schema_index, base_name) {
                    Some(base_id) => bases.push((entry.id, base_id)),
                    None => errors.push(SchemaError::BaseClassNotFound {
                        class: entry.full_name(),
                        base: base_name.clone(),
                    }),
                }
            }
        }
        for (id, base_id) in bases {
            if let Some(entry) = catalog.classes.get_mut(&id) {
                entry.base = Some(base_id);
            }
            catalog.derived.entry(base_id).or_default().push(id);
        }

        for id in catalog.classes.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(*id);
            while let Some(c) = current {
                if !seen.insert(c) {
                    errors.push(SchemaError::InheritanceCycle {
                        class: catalog.full_name(*id),
                    });
                    break;
                }
                current = catalog.classes.get(&c).and_then(|e| e.base);
            }
        }

        if errors.is_empty() {
            Ok(catalog)
        } else {
            Err(errors)
        }
    }

    /// New catalog with `incoming` schemas added or replacing same-named ones
    pub fn merge(&self, incoming: Vec<EcSchema>) -> Result<Self, Vec<SchemaError>> {
        let mut schemas = self.schemas.clone();
        for schema in incoming {
            match schemas
                .iter_mut()
                .find(|s| s.name.eq_ignore_ascii_case(&schema.name))
            {
                Some(existing) => *existing = schema,
                None => schemas.push(schema),
            }
        }
        Self::build(schemas, &self.class_id_entries())
    }

    pub fn class_id_entries(&self) -> Vec<ClassIdEntry> {
        self.classes
            .values()
            .map(|c| ClassIdEntry {
                id: c.id,
                schema: c.schema_name.clone(),
                class: c.class.name.clone(),
            })
            .collect()
    }

    pub fn schemas(&self) -> &[EcSchema] {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&EcSchema> {
        self.schemas
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name) || s.alias.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, id: ClassId) -> Option<&CatalogClass> {
        self.classes.get(&id)
    }

    pub fn classes(&self) -> impl Iterator<Item = &CatalogClass> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn full_name(&self, id: ClassId) -> String {
        self.classes
            .get(&id)
            .map(|c| c.full_name())
            .unwrap_or_else(|| format!("<class {}>", id))
    }

    /// Resolve a reference written inside schema `schema_index`
    fn resolve_in_schema(&self, schema_index: usize, reference: &str) -> Option<ClassId> {
        match reference.split_once(['.', ':']) {
            Some((qualifier, name)) => self.by_name.get(&name_key(qualifier, name)).copied(),
            None => {
                let schema = self.schemas.get(schema_index)?;
                self.by_name.get(&name_key(&schema.name, reference)).copied()
            }
        }
    }

    /// Resolve a class reference made by a property or constraint of `context`
    pub fn resolve_reference(&self, context: ClassId, reference: &str) -> Result<ClassId, SchemaError> {
        let entry = self.classes.get(&context).ok_or_else(|| SchemaError::ClassNotFound {
            class: format!("<class {}>", context),
        })?;
        self.resolve_in_schema(entry.schema_index, reference)
            .ok_or_else(|| SchemaError::ClassNotFound {
                class: reference.to_string(),
            })
    }

    /// Lookup by optional schema name/alias and class name. Without a schema
    /// the class name must be unique across all schemas.
    pub fn find_class(&self, schema: Option<&str>, name: &str) -> Result<ClassId, SchemaError> {
        match schema {
            Some(schema) => self
                .by_name
                .get(&name_key(schema, name))
                .copied()
                .ok_or_else(|| SchemaError::ClassNotFound {
                    class: format!("{}.{}", schema, name),
                }),
            None => {
                let matches: Vec<ClassId> = self
                    .classes
                    .values()
                    .filter(|c| c.class.name.eq_ignore_ascii_case(name))
                    .map(|c| c.id)
                    .collect();
                match matches.as_slice() {
                    [id] => Ok(*id),
                    [] => Err(SchemaError::ClassNotFound {
                        class: name.to_string(),
                    }),
                    _ => Err(SchemaError::InvalidName {
                        name: name.to_string(),
                        reason: "class name is ambiguous; qualify it with a schema".into(),
                    }),
                }
            }
        }
    }

    pub fn base(&self, id: ClassId) -> Option<ClassId> {
        self.classes.get(&id).and_then(|c| c.base)
    }

    /// `id` followed by its ancestors, nearest first
    pub fn ancestors_or_self(&self, id: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if chain.contains(&c) {
                break;
            }
            chain.push(c);
            current = self.base(c);
        }
        chain
    }

    pub fn is_a(&self, id: ClassId, base: ClassId) -> bool {
        self.ancestors_or_self(id).contains(&base)
    }

    pub fn direct_derived(&self, id: ClassId) -> &[ClassId] {
        self.derived.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All transitive subclasses of `id` in id order, excluding `id`
    pub fn descendants(&self, id: ClassId) -> Vec<ClassId> {
        let mut result = Vec::new();
        let mut pending = vec![id];
        while let Some(c) = pending.pop() {
            for d in self.direct_derived(c) {
                if !result.contains(d) && *d != id {
                    result.push(*d);
                    pending.push(*d);
                }
            }
        }
        result.sort_unstable();
        result
    }

    pub fn self_and_descendants(&self, id: ClassId) -> Vec<ClassId> {
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        ids
    }

    /// Class ids with every base before its subclasses; ties keep id order
    pub fn hierarchy_order(&self) -> Vec<ClassId> {
        let mut ordered: Vec<(usize, ClassId)> = self
            .classes
            .keys()
            .map(|id| (self.ancestors_or_self(*id).len(), *id))
            .collect();
        ordered.sort_unstable();
        ordered.into_iter().map(|(_, id)| id).collect()
    }

    /// Inherited properties first (root base first), then the class's own
    pub fn all_properties(&self, id: ClassId) -> Vec<PropertyRef<'_>> {
        let mut chain = self.ancestors_or_self(id);
        chain.reverse();
        let mut result: Vec<PropertyRef<'_>> = Vec::new();
        for class_id in chain {
            let Some(entry) = self.classes.get(&class_id) else {
                continue;
            };
            for property in &entry.class.properties {
                if result
                    .iter()
                    .any(|p| p.property.name.eq_ignore_ascii_case(&property.name))
                {
                    continue;
                }
                result.push(PropertyRef {
                    declaring_class: class_id,
                    property,
                });
            }
        }
        result
    }

    pub fn find_property(&self, id: ClassId, name: &str) -> Option<PropertyRef<'_>> {
        self.all_properties(id)
            .into_iter()
            .find(|p| p.property.name.eq_ignore_ascii_case(name))
    }

    /// Struct class referenced by a struct or struct-array property
    pub fn struct_class_of(&self, property: &PropertyRef<'_>) -> Result<ClassId, SchemaError> {
        let struct_name = property
            .property
            .kind
            .struct_class()
            .ok_or_else(|| SchemaError::InvalidProperty {
                class: self.full_name(property.declaring_class),
                property: property.property.name.clone(),
                reason: "not a struct property".into(),
            })?;
        self.resolve_reference(property.declaring_class, struct_name)
    }

    /// Relationship class referenced by a navigation property
    pub fn relationship_of(&self, property: &PropertyRef<'_>) -> Result<ClassId, SchemaError> {
        match &property.property.kind {
            PropertyKind::Navigation { relationship, .. } => {
                self.resolve_reference(property.declaring_class, relationship)
            }
            _ => Err(SchemaError::InvalidProperty {
                class: self.full_name(property.declaring_class),
                property: property.property.name.clone(),
                reason: "not a navigation property".into(),
            }),
        }
    }

    /// Resolved (source, target) constraint classes of a relationship class.
    /// Constraints are inherited from the nearest base declaring them.
    pub fn relationship_ends(&self, id: ClassId) -> Result<(ClassId, ClassId), SchemaError> {
        for class_id in self.ancestors_or_self(id) {
            let Some(entry) = self.classes.get(&class_id) else {
                continue;
            };
            if let Some(constraints) = &entry.class.relationship {
                let source = self.resolve_reference(class_id, &constraints.source)?;
                let target = self.resolve_reference(class_id, &constraints.target)?;
                return Ok((source, target));
            }
        }
        Err(SchemaError::InvalidRelationship {
            class: self.full_name(id),
            reason: "missing source/target constraints".into(),
        })
    }

    pub fn relationship_classes(&self) -> impl Iterator<Item = &CatalogClass> {
        self.classes.values().filter(|c| c.class.is_relationship())
    }

    /// Navigation properties (declared anywhere) that realize relationship `rel`
    pub fn navigation_properties_for(&self, rel: ClassId) -> Vec<NavigationRef> {
        let mut result = Vec::new();
        for entry in self.classes.values() {
            for property in &entry.class.properties {
                if let PropertyKind::Navigation {
                    relationship,
                    direction,
                } = &property.kind
                {
                    if self.resolve_in_schema(entry.schema_index, relationship) == Some(rel) {
                        result.push(NavigationRef {
                            holder: entry.id,
                            property: property.name.clone(),
                            direction: *direction,
                        });
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec_catalog::ec_schema::{EcProperty, PrimitiveType};

    fn sample() -> EcSchema {
        EcSchema::new("TestSchema", "ts")
            .with_class(
                EcClass::entity("Base").with_property(EcProperty::primitive("X", PrimitiveType::Integer)),
            )
            .with_class(
                EcClass::entity("Derived")
                    .with_base("Base")
                    .with_property(EcProperty::primitive("Y", PrimitiveType::Double)),
            )
            .with_class(EcClass::entity("Leaf").with_base("ts.Derived"))
            .with_class(EcClass::entity("Sibling").with_base("Base"))
    }

    #[test]
    fn test_ids_and_hierarchy() {
        let catalog = SchemaCatalog::build(vec![sample()], &[]).unwrap();
        let base = catalog.find_class(Some("ts"), "Base").unwrap();
        let derived = catalog.find_class(Some("TestSchema"), "derived").unwrap();
        let leaf = catalog.find_class(None, "Leaf").unwrap();
        let sibling = catalog.find_class(None, "Sibling").unwrap();
        assert_eq!((base, derived, leaf, sibling), (1, 2, 3, 4));
        assert!(catalog.is_a(leaf, base));
        assert!(!catalog.is_a(sibling, derived));
        assert_eq!(catalog.descendants(base), vec![derived, leaf, sibling]);
        assert_eq!(catalog.ancestors_or_self(leaf), vec![leaf, derived, base]);
        assert_eq!(catalog.hierarchy_order(), vec![base, derived, sibling, leaf]);
    }

    #[test]
    fn test_inherited_properties_first() {
        let catalog = SchemaCatalog::build(vec![sample()], &[]).unwrap();
        let leaf = catalog.find_class(None, "Leaf").unwrap();
        let names: Vec<&str> = catalog
            .all_properties(leaf)
            .iter()
            .map(|p| p.property.name.as_str())
            .collect();
        assert_eq!(names, vec!["X", "Y"]);
        assert!(catalog.find_property(leaf, "y").is_some());
    }

    #[test]
    fn test_merge_keeps_ids() {
        let catalog = SchemaCatalog::build(vec![sample()], &[]).unwrap();
        let mut extended = sample();
        extended.classes.insert(0, EcClass::entity("First"));
        let merged = catalog.merge(vec![extended]).unwrap();
        assert_eq!(merged.find_class(None, "Base").unwrap(), 1);
        assert_eq!(merged.find_class(None, "First").unwrap(), 5);
    }

    #[test]
    fn test_missing_base_and_cycle() {
        let schema = EcSchema::new("S", "s")
            .with_class(EcClass::entity("A").with_base("Nope"))
            .with_class(EcClass::entity("B").with_base("C"))
            .with_class(EcClass::entity("C").with_base("B"));
        let errors = SchemaCatalog::build(vec![schema], &[]).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, SchemaError::BaseClassNotFound { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, SchemaError::InheritanceCycle { .. })));
    }

    #[test]
    fn test_ambiguous_unqualified_lookup() {
        let a = EcSchema::new("A", "a").with_class(EcClass::entity("Thing"));
        let b = EcSchema::new("B", "b").with_class(EcClass::entity("Thing"));
        let catalog = SchemaCatalog::build(vec![a, b], &[]).unwrap();
        assert!(catalog.find_class(None, "Thing").is_err());
        assert_eq!(catalog.find_class(Some("b"), "Thing").unwrap(), 2);
    }
}
