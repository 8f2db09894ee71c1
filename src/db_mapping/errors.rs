//! Error types for class mapping, column allocation and map persistence.

use thiserror::Error;

use crate::ec_catalog::SchemaError;
use crate::store::StoreError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MappingError {
    #[error("Property `{class}.{property}` is already mapped")]
    AlreadyMapped { class: String, property: String },

    #[error("No column available for `{class}.{property}` in table `{table}`: {reason}")]
    ColumnsExhausted {
        class: String,
        property: String,
        table: String,
        reason: String,
    },

    #[error("Class `{class}` has no resolvable table")]
    TableUnresolved { class: String },

    #[error("No class map for `{class}`")]
    ClassMapNotFound { class: String },

    #[error("Property `{class}.{property}` spans tables {tables} outside of an incremental shared-column update")]
    IllegalMove {
        class: String,
        property: String,
        tables: String,
    },

    #[error("Persisted map `{access_string}` of `{class}` is missing")]
    MissingPropertyMap { class: String, access_string: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for MappingError {
    fn from(err: StoreError) -> Self {
        MappingError::Store(err.to_string())
    }
}

impl From<rusqlite::Error> for MappingError {
    fn from(err: rusqlite::Error) -> Self {
        MappingError::Store(err.to_string())
    }
}
