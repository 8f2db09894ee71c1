use thiserror::Error;

use crate::ecsql_parser::EcSqlParseError;
use crate::native_sql::NativeSqlError;
use crate::store::StoreError;

use super::issues::Issue;

/// Errors raised while preparing an ECSQL statement
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Syntax(#[from] EcSqlParseError),

    #[error("Failed to prepare '{ecsql}': {}", format_issues(.issues))]
    Semantic { ecsql: String, issues: Vec<Issue> },

    #[error("Failed to translate ECSQL: {0}")]
    Translation(#[from] NativeSqlError),

    #[error("Store error while preparing: {0}")]
    Store(#[from] StoreError),
}

impl PrepareError {
    /// Error-severity issues behind a semantic failure
    pub fn issues(&self) -> &[Issue] {
        match self {
            PrepareError::Semantic { issues, .. } => issues,
            _ => &[],
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
