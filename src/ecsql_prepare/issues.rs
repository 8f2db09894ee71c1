//! Diagnostics
//!
//! Every problem found while importing schemas or compiling and running ECSQL
//! is an [`Issue`]. Issues are collected by the component that found them and
//! forwarded to the listeners registered on the [`IssueReporter`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use log::{error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCategory {
    SchemaImport,
    BusinessRule,
    EcsqlSyntax,
    Execution,
    InternalError,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueCategory::SchemaImport => "schema import",
            IssueCategory::BusinessRule => "business rule",
            IssueCategory::EcsqlSyntax => "ECSQL syntax",
            IssueCategory::Execution => "execution",
            IssueCategory::InternalError => "internal error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub message: String,
}

impl Issue {
    pub fn error(category: IssueCategory, message: impl Into<String>) -> Self {
        Issue {
            severity: IssueSeverity::Error,
            category,
            message: message.into(),
        }
    }

    pub fn warning(category: IssueCategory, message: impl Into<String>) -> Self {
        Issue {
            severity: IssueSeverity::Warning,
            category,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Receives every issue reported through an [`IssueReporter`]
#[cfg_attr(test, mockall::automock)]
pub trait IssueListener: Send + Sync {
    fn on_issue(&self, issue: &Issue);
}

/// Fan-out of issues to registered listeners; every issue is also logged
#[derive(Default)]
pub struct IssueReporter {
    listeners: RwLock<Vec<Arc<dyn IssueListener>>>,
}

impl IssueReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn IssueListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn clear_listeners(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn report(&self, issue: &Issue) {
        match issue.severity {
            IssueSeverity::Error => error!("{}", issue),
            IssueSeverity::Warning => warn!("{}", issue),
            IssueSeverity::Info => info!("{}", issue),
        }
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_issue(issue);
        }
    }

    pub fn report_all<'a>(&self, issues: impl IntoIterator<Item = &'a Issue>) {
        for issue in issues {
            self.report(issue);
        }
    }
}

impl fmt::Debug for IssueReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueReporter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
