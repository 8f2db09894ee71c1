//! Statement execution
//!
//! Binding, stepping and typed reads over compiled ECSQL plans.

pub mod ecsql_statement;
pub mod errors;
pub mod value;

pub use ecsql_statement::{EcSqlStatement, StepResult};
pub use errors::StatementError;
pub use value::EcValue;
