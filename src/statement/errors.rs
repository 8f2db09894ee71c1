use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while binding, stepping or reading a prepared statement
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Statement is closed")]
    Closed,

    #[error("Parameter index {index} is out of range (statement has {count} parameter(s))")]
    ParameterOutOfRange { index: usize, count: usize },

    #[error("Unknown parameter name ':{0}'")]
    UnknownParameter(String),

    #[error("Column index {index} is out of range (statement has {count} column(s))")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("No current row")]
    NoRow,

    #[error("Invalid value for {target}: {reason}")]
    InvalidValue { target: String, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StatementError {
    pub fn invalid_value(target: impl Into<String>, reason: impl Into<String>) -> Self {
        StatementError::InvalidValue {
            target: target.into(),
            reason: reason.into(),
        }
    }
}
