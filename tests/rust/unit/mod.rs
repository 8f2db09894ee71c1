//! Unit tests - Tests that exercise one component through the public API
//!
//! None of these touch a store file; the ECSQL parser and the value and id
//! encodings are tested in isolation.

mod ecsql_parser_tests;
mod id_encoding_tests;
mod value_tests;
