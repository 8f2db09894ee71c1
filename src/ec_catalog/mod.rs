//! EC schema catalog: class/property model, schema files and import validation

pub mod class_catalog;
pub mod config;
pub mod ec_schema;
pub mod errors;
pub mod schema_validator;

pub use class_catalog::{CatalogClass, ClassId, ClassIdEntry, PropertyRef, SchemaCatalog};
pub use config::EcSchemaConfig;
pub use ec_schema::{
    ClassMapHint, ClassModifier, ClassType, EcClass, EcProperty, EcSchema, MapStrategyHint,
    NavigationDirection, PrimitiveType, PropertyKind, RelationshipConstraints, SharedColumnsHint,
};
pub use errors::SchemaError;
