//! # Schema Error Types
//!
//! Errors raised while loading, validating and comparing EC schemas.
//!
//! ## Error Categories
//!
//! - **Shape errors**: invalid names, duplicates, unknown base/struct/relationship classes
//! - **Composition errors**: struct cycles, inheritance cycles, strategy conflicts
//! - **Evolution errors**: removing or retyping something an earlier import mapped
//! - **Configuration errors**: file I/O and YAML parsing

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("Invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Duplicate schema `{schema}`")]
    DuplicateSchema { schema: String },

    #[error("Duplicate class `{class}` in schema `{schema}`")]
    DuplicateClass { schema: String, class: String },

    #[error("Duplicate property `{property}` on class `{class}`")]
    DuplicateProperty { class: String, property: String },

    #[error("Class `{class}` not found")]
    ClassNotFound { class: String },

    #[error("Schema `{schema}` not found")]
    SchemaNotFound { schema: String },

    #[error("Base class `{base}` of `{class}` not found")]
    BaseClassNotFound { class: String, base: String },

    #[error("Class `{class}` cannot derive from `{base}`: {reason}")]
    InvalidBaseClass {
        class: String,
        base: String,
        reason: String,
    },

    #[error("Inheritance cycle through `{class}`")]
    InheritanceCycle { class: String },

    #[error("Struct composition cycle: {path}")]
    StructCycle { path: String },

    #[error("Property `{class}.{property}`: {reason}")]
    InvalidProperty {
        class: String,
        property: String,
        reason: String,
    },

    #[error("Relationship `{class}`: {reason}")]
    InvalidRelationship { class: String, reason: String },

    #[error("Class `{class}`: invalid mapping hint: {reason}")]
    InvalidMapHint { class: String, reason: String },

    #[error("Class `{class}` was removed from schema `{schema}`; imports may only add")]
    ClassRemoved { schema: String, class: String },

    #[error("Property `{class}.{property}` was removed; imports may only add")]
    PropertyRemoved { class: String, property: String },

    #[error("Property `{class}.{property}` changed from {old} to {new}; retyping is not supported")]
    PropertyRetyped {
        class: String,
        property: String,
        old: String,
        new: String,
    },

    #[error("Class `{class}` changed {what}; imports may only add")]
    ClassChanged { class: String, what: String },

    #[error("Failed to read schema file: {error}")]
    ConfigReadError { error: String },

    #[error("Failed to parse schema definition: {error}")]
    ConfigParseError { error: String },
}

impl SchemaError {
    /// Name of the class the error is about, when there is one
    pub fn class_name(&self) -> Option<&str> {
        match self {
            SchemaError::DuplicateClass { class, .. }
            | SchemaError::DuplicateProperty { class, .. }
            | SchemaError::ClassNotFound { class }
            | SchemaError::BaseClassNotFound { class, .. }
            | SchemaError::InvalidBaseClass { class, .. }
            | SchemaError::InheritanceCycle { class }
            | SchemaError::InvalidProperty { class, .. }
            | SchemaError::InvalidRelationship { class, .. }
            | SchemaError::InvalidMapHint { class, .. }
            | SchemaError::ClassRemoved { class, .. }
            | SchemaError::PropertyRemoved { class, .. }
            | SchemaError::PropertyRetyped { class, .. }
            | SchemaError::ClassChanged { class, .. } => Some(class),
            SchemaError::InvalidName { .. }
            | SchemaError::DuplicateSchema { .. }
            | SchemaError::SchemaNotFound { .. }
            | SchemaError::StructCycle { .. }
            | SchemaError::ConfigReadError { .. }
            | SchemaError::ConfigParseError { .. } => None,
        }
    }

    /// Name of the property the error is about, when there is one
    pub fn property_name(&self) -> Option<&str> {
        match self {
            SchemaError::DuplicateProperty { property, .. }
            | SchemaError::InvalidProperty { property, .. }
            | SchemaError::PropertyRemoved { property, .. }
            | SchemaError::PropertyRetyped { property, .. } => Some(property),
            _ => None,
        }
    }
}
