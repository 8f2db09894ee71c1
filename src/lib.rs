//! ECDb - object schemas over SQLite
//!
//! This crate maps EC schemas (classes with inheritance, structs, arrays and
//! relationships) onto SQLite tables and runs ECSQL against them:
//! - Schema import with additive evolution and shared/overflow columns
//! - Persisted property-to-column maps
//! - ECSQL parsing, name resolution and translation to SQLite SQL
//! - Prepared statements with typed binding and reads

pub mod utils;

pub mod config;
pub mod db_mapping;
pub mod ec_catalog;
pub mod ecdb;
pub mod ecsql_parser;
pub mod ecsql_prepare;
pub mod native_sql;
pub mod relationships;
pub mod statement;
pub mod store;

pub use config::EcDbConfig;
pub use ecdb::{EcDb, EcDbError, ImportError, ImportReport};
pub use statement::{EcSqlStatement, EcValue, StatementError, StepResult};
