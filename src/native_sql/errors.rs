use thiserror::Error;

use crate::ec_catalog::SchemaError;

/// Errors raised while translating a finalized tree into SQLite SQL
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NativeSqlError {
    #[error("'{construct}' cannot be translated: {reason}")]
    Unsupported { construct: String, reason: String },

    #[error("Class {class} is not mapped to a table")]
    UnmappedClass { class: String },

    #[error("Class {class} has no column for '{access_string}'")]
    UnmappedProperty {
        class: String,
        access_string: String,
    },

    #[error("Embedded statement for '{access_string}' failed: {message}")]
    Embedded {
        access_string: String,
        message: String,
    },

    #[error("Schema error during translation: {0}")]
    Schema(#[from] SchemaError),

    #[error("Internal translation error: {0}")]
    Internal(String),
}

impl NativeSqlError {
    pub fn unsupported(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        NativeSqlError::Unsupported {
            construct: construct.into(),
            reason: reason.into(),
        }
    }
}
