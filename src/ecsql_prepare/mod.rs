//! ECSQL preparation
//!
//! Parse, finalize and translate one ECSQL statement into a
//! [`CompiledPlan`]. The pipeline is pure over a [`MappingSnapshot`]; running
//! the plan is the job of [`EcSqlStatement`](crate::statement::EcSqlStatement).

pub mod errors;
pub mod finalize;
pub mod issues;
pub mod prepare_ctx;

pub use errors::PrepareError;
pub use issues::{Issue, IssueCategory, IssueListener, IssueReporter, IssueSeverity};
pub use prepare_ctx::PrepareContext;

use log::debug;

use crate::db_mapping::MappingSnapshot;
use crate::ecsql_parser::parse_ecsql;
use crate::native_sql::{translate, CompiledPlan, EmbeddedPlanCache, EmbeddedPlanner, FunctionRegistry};

/// A compiled statement and the warnings found while compiling it
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: CompiledPlan,
    pub warnings: Vec<Issue>,
}

/// Compile `ecsql` against `snapshot`. Any error-severity issue fails the
/// whole statement.
pub fn compile(
    ecsql: &str,
    snapshot: &MappingSnapshot,
    functions: &FunctionRegistry,
    embedded: &EmbeddedPlanCache,
) -> Result<Prepared, PrepareError> {
    let mut tree = parse_ecsql(ecsql)?;
    let mut ctx = PrepareContext::new();
    let semantics = finalize::finalize(&mut tree, snapshot, functions, &mut ctx);
    debug_assert_eq!(ctx.depth(), 0, "finalize left frames on the stack");
    if ctx.has_errors() {
        return Err(PrepareError::Semantic {
            ecsql: ecsql.to_string(),
            issues: ctx.take_issues(),
        });
    }

    let planner = EmbeddedPlanner {
        snapshot,
        cache: embedded,
        ecsql,
    };
    let plan = translate(ecsql, &tree, &semantics, snapshot, functions, &planner, &ctx)?;
    let warnings = ctx.take_issues();
    debug!("Prepared '{}' ({} warning(s))", ecsql, warnings.len());
    Ok(Prepared { plan, warnings })
}
