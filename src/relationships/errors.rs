use thiserror::Error;

use crate::ec_catalog::{ClassId, SchemaError};
use crate::ecsql_prepare::PrepareError;
use crate::statement::StatementError;

#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("Class {0} is not in the catalog")]
    UnknownClass(ClassId),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Relationship query failed to prepare: {0}")]
    Prepare(#[from] PrepareError),

    #[error("Relationship query failed: {0}")]
    Statement(#[from] StatementError),
}
