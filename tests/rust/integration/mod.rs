//! Integration tests - Tests that run schema import and ECSQL against a real store
//!
//! Every test opens its own SQLite store (in memory, or in a temp dir when the
//! file itself is under test), so tests share no state.

mod config_tests;
mod persistence_tests;
mod related_instance_tests;
mod schema_import_tests;
mod statement_tests;
mod test_schemas;
