//! EC schema model
//!
//! Classes, properties and relationship constraints as they are declared in a
//! schema definition. These types are what schema files deserialize into and
//! what gets persisted (as JSON) in `ec_Schema`; resolution of names, ids and
//! inheritance happens in [`super::class_catalog`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcSchema {
    pub name: String,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub classes: Vec<EcClass>,
}

impl EcSchema {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        EcSchema {
            name: name.into(),
            alias: alias.into(),
            description: None,
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: EcClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Case-insensitive class lookup
    pub fn class(&self, name: &str) -> Option<&EcClass> {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut EcClass> {
        self.classes
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    #[default]
    Entity,
    Struct,
    Relationship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassModifier {
    #[default]
    None,
    Abstract,
    Sealed,
}

/// Requested mapping strategy. Subclasses inherit the strategy of their base
/// unless they declare one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapStrategyHint {
    /// The class gets its own table holding all of its properties
    OwnTable,
    /// The class and all of its subclasses share one table
    SharedTable,
    /// The class has no table and contributes no rows
    NotMapped,
}

/// Shared-column settings of a shared-table hierarchy. Unset fields fall back
/// to the store configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SharedColumnsHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_shared_columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_overflow_columns: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapHint {
    pub strategy: MapStrategyHint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_columns: Option<SharedColumnsHint>,
}

impl ClassMapHint {
    pub fn own_table() -> Self {
        ClassMapHint {
            strategy: MapStrategyHint::OwnTable,
            shared_columns: None,
        }
    }

    pub fn shared_table() -> Self {
        ClassMapHint {
            strategy: MapStrategyHint::SharedTable,
            shared_columns: None,
        }
    }

    pub fn shared_columns(max_shared_columns: u32) -> Self {
        ClassMapHint {
            strategy: MapStrategyHint::SharedTable,
            shared_columns: Some(SharedColumnsHint {
                max_shared_columns: Some(max_shared_columns),
                ..Default::default()
            }),
        }
    }

    pub fn not_mapped() -> Self {
        ClassMapHint {
            strategy: MapStrategyHint::NotMapped,
            shared_columns: None,
        }
    }
}

/// Source and target of a relationship class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipConstraints {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcClass {
    pub name: String,
    #[serde(default, rename = "type")]
    pub class_type: ClassType,
    #[serde(default)]
    pub modifier: ClassModifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<ClassMapHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipConstraints>,
    #[serde(default)]
    pub properties: Vec<EcProperty>,
}

impl EcClass {
    pub fn entity(name: impl Into<String>) -> Self {
        EcClass {
            name: name.into(),
            class_type: ClassType::Entity,
            modifier: ClassModifier::None,
            base_class: None,
            map: None,
            relationship: None,
            properties: Vec::new(),
        }
    }

    pub fn struct_class(name: impl Into<String>) -> Self {
        EcClass {
            class_type: ClassType::Struct,
            ..Self::entity(name)
        }
    }

    pub fn relationship(
        name: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        EcClass {
            class_type: ClassType::Relationship,
            relationship: Some(RelationshipConstraints {
                source: source.into(),
                target: target.into(),
            }),
            ..Self::entity(name)
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_class = Some(base.into());
        self
    }

    pub fn with_map(mut self, hint: ClassMapHint) -> Self {
        self.map = Some(hint);
        self
    }

    pub fn with_modifier(mut self, modifier: ClassModifier) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_property(mut self, property: EcProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Case-insensitive lookup among the properties declared on this class
    pub fn property(&self, name: &str) -> Option<&EcProperty> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn is_struct(&self) -> bool {
        self.class_type == ClassType::Struct
    }

    pub fn is_relationship(&self) -> bool {
        self.class_type == ClassType::Relationship
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcProperty {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl EcProperty {
    pub fn primitive(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        EcProperty {
            name: name.into(),
            kind: PropertyKind::Primitive { primitive_type },
        }
    }

    pub fn primitive_array(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        EcProperty {
            name: name.into(),
            kind: PropertyKind::PrimitiveArray { primitive_type },
        }
    }

    pub fn struct_property(name: impl Into<String>, struct_class: impl Into<String>) -> Self {
        EcProperty {
            name: name.into(),
            kind: PropertyKind::Struct {
                struct_class: struct_class.into(),
            },
        }
    }

    pub fn struct_array(name: impl Into<String>, struct_class: impl Into<String>) -> Self {
        EcProperty {
            name: name.into(),
            kind: PropertyKind::StructArray {
                struct_class: struct_class.into(),
            },
        }
    }

    pub fn navigation(
        name: impl Into<String>,
        relationship: impl Into<String>,
        direction: NavigationDirection,
    ) -> Self {
        EcProperty {
            name: name.into(),
            kind: PropertyKind::Navigation {
                relationship: relationship.into(),
                direction,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    Primitive {
        #[serde(rename = "type")]
        primitive_type: PrimitiveType,
    },
    PrimitiveArray {
        #[serde(rename = "type")]
        primitive_type: PrimitiveType,
    },
    Struct {
        struct_class: String,
    },
    StructArray {
        struct_class: String,
    },
    Navigation {
        relationship: String,
        #[serde(default)]
        direction: NavigationDirection,
    },
}

impl PropertyKind {
    pub fn struct_class(&self) -> Option<&str> {
        match self {
            PropertyKind::Struct { struct_class } | PropertyKind::StructArray { struct_class } => {
                Some(struct_class)
            }
            PropertyKind::Primitive { .. }
            | PropertyKind::PrimitiveArray { .. }
            | PropertyKind::Navigation { .. } => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Primitive { primitive_type } => write!(f, "{}", primitive_type),
            PropertyKind::PrimitiveArray { primitive_type } => write!(f, "{}[]", primitive_type),
            PropertyKind::Struct { struct_class } => write!(f, "struct {}", struct_class),
            PropertyKind::StructArray { struct_class } => write!(f, "struct {}[]", struct_class),
            PropertyKind::Navigation {
                relationship,
                direction,
            } => write!(f, "navigation {} ({})", relationship, direction),
        }
    }
}

/// Which end of the relationship the navigation property's class plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDirection {
    /// The holding class is the relationship source; the property points at the target
    #[default]
    Forward,
    /// The holding class is the relationship target; the property points at the source
    Backward,
}

impl fmt::Display for NavigationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationDirection::Forward => write!(f, "forward"),
            NavigationDirection::Backward => write!(f, "backward"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveType {
    Binary,
    Boolean,
    #[serde(alias = "datetime")]
    DateTime,
    Double,
    #[serde(alias = "int")]
    Integer,
    Long,
    String,
    Point2d,
    Point3d,
}

impl PrimitiveType {
    /// Coordinate names of point types; empty for single-column types
    pub fn components(self) -> &'static [&'static str] {
        match self {
            PrimitiveType::Point2d => &["X", "Y"],
            PrimitiveType::Point3d => &["X", "Y", "Z"],
            _ => &[],
        }
    }

    /// Number of physical columns a value of this type occupies
    pub fn column_count(self) -> usize {
        self.components().len().max(1)
    }

    pub fn is_point(self) -> bool {
        !self.components().is_empty()
    }

    /// Declared SQLite type of a column holding this type (or one point coordinate)
    pub fn sql_type(self) -> &'static str {
        match self {
            PrimitiveType::Binary => "BLOB",
            PrimitiveType::Boolean => "BOOLEAN",
            PrimitiveType::DateTime => "TIMESTAMP",
            PrimitiveType::Double | PrimitiveType::Point2d | PrimitiveType::Point3d => "REAL",
            PrimitiveType::Integer | PrimitiveType::Long => "INTEGER",
            PrimitiveType::String => "TEXT",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Binary => "binary",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::DateTime => "dateTime",
            PrimitiveType::Double => "double",
            PrimitiveType::Integer => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::String => "string",
            PrimitiveType::Point2d => "point2d",
            PrimitiveType::Point3d => "point3d",
        };
        f.write_str(name)
    }
}
