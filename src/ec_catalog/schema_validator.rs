//! Schema import validation
//!
//! Three passes, each collecting every problem instead of stopping at the first:
//!
//! 1. [`validate_schema_shapes`]: names, duplicates and per-class rules that can
//!    be checked on the raw definitions.
//! 2. [`validate_catalog`]: rules that need resolved references (struct and
//!    relationship targets, inheritance compatibility, struct cycles, mapping hints).
//! 3. [`validate_additive`]: an import may only add to what is already persisted.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::class_catalog::{ClassId, SchemaCatalog};
use super::ec_schema::{ClassModifier, EcSchema, MapStrategyHint, NavigationDirection, PropertyKind};
use super::errors::SchemaError;

/// EC names: a letter or underscore followed by letters, digits or underscores
static EC_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid EC name pattern"));

/// Property names that collide with system columns or system properties
const RESERVED_PROPERTY_NAMES: &[&str] = &[
    "ECInstanceId",
    "ECClassId",
    "ParentECInstanceId",
    "ECArrayIndex",
    "SourceECInstanceId",
    "SourceECClassId",
    "TargetECInstanceId",
    "TargetECClassId",
];

pub fn is_valid_name(name: &str) -> bool {
    EC_NAME_PATTERN.is_match(name)
}

fn check_name(name: &str, what: &str, errors: &mut Vec<SchemaError>) {
    if !is_valid_name(name) {
        errors.push(SchemaError::InvalidName {
            name: name.to_string(),
            reason: format!("{} names must match {}", what, EC_NAME_PATTERN.as_str()),
        });
    }
}

/// Per-definition checks that need no name resolution
pub fn validate_schema_shapes(schemas: &[EcSchema]) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    let mut seen_schemas = HashSet::new();
    let mut seen_aliases = HashSet::new();

    for schema in schemas {
        check_name(&schema.name, "schema", &mut errors);
        check_name(&schema.alias, "schema alias", &mut errors);
        if !seen_schemas.insert(schema.name.to_lowercase()) {
            errors.push(SchemaError::DuplicateSchema {
                schema: schema.name.clone(),
            });
        }
        if !seen_aliases.insert(schema.alias.to_lowercase()) {
            errors.push(SchemaError::InvalidName {
                name: schema.alias.clone(),
                reason: "schema alias is used by more than one schema".into(),
            });
        }

        let mut seen_classes = HashSet::new();
        for class in &schema.classes {
            check_name(&class.name, "class", &mut errors);
            if !seen_classes.insert(class.name.to_lowercase()) {
                errors.push(SchemaError::DuplicateClass {
                    schema: schema.name.clone(),
                    class: class.name.clone(),
                });
            }
            let full_name = format!("{}.{}", schema.name, class.name);

            if class.is_struct() && class.map.is_some() {
                errors.push(SchemaError::InvalidMapHint {
                    class: full_name.clone(),
                    reason: "struct classes are never mapped to tables".into(),
                });
            }
            if class.relationship.is_some() && !class.is_relationship() {
                errors.push(SchemaError::InvalidRelationship {
                    class: full_name.clone(),
                    reason: "only relationship classes may declare source/target constraints".into(),
                });
            }
            if class.is_relationship() && class.relationship.is_none() && class.base_class.is_none() {
                errors.push(SchemaError::InvalidRelationship {
                    class: full_name.clone(),
                    reason: "missing source/target constraints".into(),
                });
            }

            let mut seen_properties = HashSet::new();
            for property in &class.properties {
                check_name(&property.name, "property", &mut errors);
                if !seen_properties.insert(property.name.to_lowercase()) {
                    errors.push(SchemaError::DuplicateProperty {
                        class: full_name.clone(),
                        property: property.name.clone(),
                    });
                }
                if RESERVED_PROPERTY_NAMES
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(&property.name))
                {
                    errors.push(SchemaError::InvalidProperty {
                        class: full_name.clone(),
                        property: property.name.clone(),
                        reason: "name is reserved for a system property".into(),
                    });
                }
                if class.is_struct() && matches!(property.kind, PropertyKind::Navigation { .. }) {
                    errors.push(SchemaError::InvalidProperty {
                        class: full_name.clone(),
                        property: property.name.clone(),
                        reason: "struct classes cannot have navigation properties".into(),
                    });
                }
            }
        }
    }
    errors
}

/// Checks that need the resolved catalog
pub fn validate_catalog(catalog: &SchemaCatalog) -> Vec<SchemaError> {
    let mut errors = Vec::new();

    for entry in catalog.classes() {
        let class_name = entry.full_name();

        if let Some(base_id) = entry.base {
            if let Some(base) = catalog.get(base_id) {
                if base.class.class_type != entry.class.class_type {
                    errors.push(SchemaError::InvalidBaseClass {
                        class: class_name.clone(),
                        base: base.full_name(),
                        reason: "base class has a different class type".into(),
                    });
                }
                if base.class.modifier == ClassModifier::Sealed {
                    errors.push(SchemaError::InvalidBaseClass {
                        class: class_name.clone(),
                        base: base.full_name(),
                        reason: "base class is sealed".into(),
                    });
                }
                for property in &entry.class.properties {
                    if catalog.find_property(base_id, &property.name).is_some() {
                        errors.push(SchemaError::DuplicateProperty {
                            class: class_name.clone(),
                            property: property.name.clone(),
                        });
                    }
                }
            }
        }

        validate_map_hint(catalog, entry.id, &mut errors);

        if entry.class.is_relationship() {
            if let Err(e) = catalog.relationship_ends(entry.id) {
                errors.push(e);
            }
        }

        for property in catalog.all_properties(entry.id) {
            if property.declaring_class != entry.id {
                continue;
            }
            match &property.property.kind {
                PropertyKind::Primitive { .. } | PropertyKind::PrimitiveArray { .. } => {}
                PropertyKind::Struct { .. } | PropertyKind::StructArray { .. } => {
                    match catalog.struct_class_of(&property) {
                        Ok(struct_id) => {
                            let is_struct = catalog
                                .get(struct_id)
                                .map(|c| c.class.is_struct())
                                .unwrap_or(false);
                            if !is_struct {
                                errors.push(SchemaError::InvalidProperty {
                                    class: class_name.clone(),
                                    property: property.property.name.clone(),
                                    reason: format!(
                                        "`{}` is not a struct class",
                                        catalog.full_name(struct_id)
                                    ),
                                });
                            }
                        }
                        Err(e) => errors.push(SchemaError::InvalidProperty {
                            class: class_name.clone(),
                            property: property.property.name.clone(),
                            reason: e.to_string(),
                        }),
                    }
                }
                PropertyKind::Navigation { direction, .. } => {
                    validate_navigation(catalog, entry.id, &property, *direction, &mut errors)
                }
            }
        }
    }

    errors.extend(find_struct_cycles(catalog));
    errors
}

fn validate_navigation(
    catalog: &SchemaCatalog,
    holder: ClassId,
    property: &super::class_catalog::PropertyRef<'_>,
    direction: NavigationDirection,
    errors: &mut Vec<SchemaError>,
) {
    let class_name = catalog.full_name(holder);
    let property_name = property.property.name.clone();
    let rel_id = match catalog.relationship_of(property) {
        Ok(id) => id,
        Err(e) => {
            errors.push(SchemaError::InvalidProperty {
                class: class_name,
                property: property_name,
                reason: e.to_string(),
            });
            return;
        }
    };
    let is_relationship = catalog
        .get(rel_id)
        .map(|c| c.class.is_relationship())
        .unwrap_or(false);
    if !is_relationship {
        errors.push(SchemaError::InvalidProperty {
            class: class_name,
            property: property_name,
            reason: format!("`{}` is not a relationship class", catalog.full_name(rel_id)),
        });
        return;
    }
    if let Ok((source, target)) = catalog.relationship_ends(rel_id) {
        let end = match direction {
            NavigationDirection::Forward => source,
            NavigationDirection::Backward => target,
        };
        if !catalog.is_a(holder, end) {
            errors.push(SchemaError::InvalidProperty {
                class: class_name,
                property: property_name,
                reason: format!(
                    "{} navigation requires the class to derive from `{}`",
                    direction,
                    catalog.full_name(end)
                ),
            });
        }
    }
}

fn validate_map_hint(catalog: &SchemaCatalog, id: ClassId, errors: &mut Vec<SchemaError>) {
    let Some(entry) = catalog.get(id) else {
        return;
    };
    let Some(hint) = entry.class.map else {
        return;
    };
    if let Some(shared) = hint.shared_columns {
        if hint.strategy != MapStrategyHint::SharedTable {
            errors.push(SchemaError::InvalidMapHint {
                class: entry.full_name(),
                reason: "shared columns require the shared_table strategy".into(),
            });
        }
        if shared.max_shared_columns == Some(0) {
            errors.push(SchemaError::InvalidMapHint {
                class: entry.full_name(),
                reason: "max_shared_columns must be at least 1".into(),
            });
        }
    }
    let shared_ancestor = catalog
        .ancestors_or_self(id)
        .into_iter()
        .skip(1)
        .find(|a| {
            catalog
                .get(*a)
                .and_then(|c| c.class.map)
                .map(|h| h.strategy == MapStrategyHint::SharedTable)
                .unwrap_or(false)
        });
    if let Some(ancestor) = shared_ancestor {
        if hint.strategy != MapStrategyHint::SharedTable || hint.shared_columns.is_some() {
            errors.push(SchemaError::InvalidMapHint {
                class: entry.full_name(),
                reason: format!(
                    "the class is part of the shared-table hierarchy of `{}` and cannot change its mapping",
                    catalog.full_name(ancestor)
                ),
            });
        }
    }
}

/// Struct classes that contain themselves through struct or struct-array members
fn find_struct_cycles(catalog: &SchemaCatalog) -> Vec<SchemaError> {
    let mut edges: HashMap<ClassId, Vec<ClassId>> = HashMap::new();
    for entry in catalog.classes().filter(|c| c.class.is_struct()) {
        let members = catalog
            .all_properties(entry.id)
            .iter()
            .filter_map(|p| catalog.struct_class_of(p).ok())
            .collect();
        edges.insert(entry.id, members);
    }

    let mut errors = Vec::new();
    let mut reported: HashSet<ClassId> = HashSet::new();
    for start in edges.keys().copied() {
        let mut path = vec![start];
        if let Some(cycle) = walk_struct_edges(&edges, &mut path) {
            if cycle.iter().any(|c| reported.contains(c)) {
                continue;
            }
            reported.extend(cycle.iter().copied());
            let names: Vec<String> = cycle.iter().map(|c| catalog.full_name(*c)).collect();
            errors.push(SchemaError::StructCycle {
                path: names.join(" -> "),
            });
        }
    }
    errors
}

fn walk_struct_edges(edges: &HashMap<ClassId, Vec<ClassId>>, path: &mut Vec<ClassId>) -> Option<Vec<ClassId>> {
    let current = *path.last()?;
    for next in edges.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
        if let Some(pos) = path.iter().position(|c| c == next) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(*next);
            return Some(cycle);
        }
        path.push(*next);
        if let Some(cycle) = walk_struct_edges(edges, path) {
            return Some(cycle);
        }
        path.pop();
    }
    None
}

/// Normalized property type: struct and relationship references replaced by
/// the referenced class's full name so that `Address` and `ts.Address` compare equal.
fn normalized_kind(catalog: &SchemaCatalog, class: ClassId, kind: &PropertyKind) -> PropertyKind {
    let resolve = |name: &str| {
        catalog
            .resolve_reference(class, name)
            .map(|id| catalog.full_name(id))
            .unwrap_or_else(|_| name.to_string())
    };
    match kind {
        PropertyKind::Struct { struct_class } => PropertyKind::Struct {
            struct_class: resolve(struct_class),
        },
        PropertyKind::StructArray { struct_class } => PropertyKind::StructArray {
            struct_class: resolve(struct_class),
        },
        PropertyKind::Navigation {
            relationship,
            direction,
        } => PropertyKind::Navigation {
            relationship: resolve(relationship),
            direction: *direction,
        },
        other => other.clone(),
    }
}

/// Everything in `existing` must still be present, unchanged, in `incoming`
pub fn validate_additive(existing: &SchemaCatalog, incoming: &SchemaCatalog) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    for old in existing.classes() {
        let Ok(new_id) = incoming.find_class(Some(&old.schema_name), old.name()) else {
            errors.push(SchemaError::ClassRemoved {
                schema: old.schema_name.clone(),
                class: old.name().to_string(),
            });
            continue;
        };
        let Some(new) = incoming.get(new_id) else {
            continue;
        };
        let class_name = old.full_name();

        let old_base = old.base.map(|b| existing.full_name(b));
        let new_base = new.base.map(|b| incoming.full_name(b));
        if old_base != new_base {
            errors.push(SchemaError::ClassChanged {
                class: class_name.clone(),
                what: "its base class".into(),
            });
        }
        if old.class.class_type != new.class.class_type {
            errors.push(SchemaError::ClassChanged {
                class: class_name.clone(),
                what: "its class type".into(),
            });
        }
        if old.class.map != new.class.map {
            errors.push(SchemaError::ClassChanged {
                class: class_name.clone(),
                what: "its mapping hint".into(),
            });
        }

        for property in &old.class.properties {
            match new.class.property(&property.name) {
                None => errors.push(SchemaError::PropertyRemoved {
                    class: class_name.clone(),
                    property: property.name.clone(),
                }),
                Some(new_property) => {
                    let old_kind = normalized_kind(existing, old.id, &property.kind);
                    let new_kind = normalized_kind(incoming, new.id, &new_property.kind);
                    if old_kind != new_kind {
                        errors.push(SchemaError::PropertyRetyped {
                            class: class_name.clone(),
                            property: property.name.clone(),
                            old: old_kind.to_string(),
                            new: new_kind.to_string(),
                        });
                    }
                }
            }
        }
    }
    errors
}
