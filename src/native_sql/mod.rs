//! Native SQL generation
//!
//! Turns a finalized ECSQL expression tree into SQLite statements over the
//! mapped tables: class views for reads, per-table writes for INSERT, UPDATE
//! and DELETE, and embedded statements for struct arrays.

pub mod embedded;
pub mod errors;
pub mod function_registry;
pub mod plan;
pub mod to_sql;
pub mod translator;
pub mod view_generator;

pub use embedded::{EmbeddedPlanCache, EmbeddedPlanner};
pub use errors::NativeSqlError;
pub use function_registry::{FunctionDef, FunctionKind, FunctionRegistry};
pub use plan::{
    ArrayWritePlan, Binding, ColumnInfo, CompiledPlan, EmbeddedPlan, IdSource, NativeStep, SqlStep,
    ValueShape, DML_TARGETS_TABLE,
};
pub use translator::translate;
pub use view_generator::{class_view, ClassView};
