use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::db_mapping::MappingError;
use crate::ec_catalog::SchemaError;
use crate::store::StoreError;

/// One rejected class or property of a failed import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportDiagnostic {
    pub class: Option<String>,
    pub property: Option<String>,
    pub reason: String,
}

impl fmt::Display for ImportDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.class, &self.property) {
            (Some(class), Some(property)) => write!(f, "{}.{}: {}", class, property, self.reason),
            (Some(class), None) => write!(f, "{}: {}", class, self.reason),
            _ => f.write_str(&self.reason),
        }
    }
}

/// A schema import that was rejected as a whole and rolled back
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Schema import rejected: {}", join(.0))]
    Schema(Vec<SchemaError>),

    #[error("Class mapping failed: {}", join(.0))]
    Mapping(Vec<MappingError>),

    #[error("Store error during import: {0}")]
    Store(#[from] StoreError),
}

impl From<SchemaError> for ImportError {
    fn from(err: SchemaError) -> Self {
        ImportError::Schema(vec![err])
    }
}

impl From<MappingError> for ImportError {
    fn from(err: MappingError) -> Self {
        ImportError::Mapping(vec![err])
    }
}

impl ImportError {
    /// Per class/property breakdown of the failure
    pub fn diagnostics(&self) -> Vec<ImportDiagnostic> {
        match self {
            ImportError::Schema(errors) => errors
                .iter()
                .map(|e| ImportDiagnostic {
                    class: e.class_name().map(str::to_string),
                    property: e.property_name().map(str::to_string),
                    reason: e.to_string(),
                })
                .collect(),
            ImportError::Mapping(errors) => errors.iter().map(mapping_diagnostic).collect(),
            ImportError::Store(err) => vec![ImportDiagnostic {
                class: None,
                property: None,
                reason: err.to_string(),
            }],
        }
    }
}

fn mapping_diagnostic(err: &MappingError) -> ImportDiagnostic {
    let (class, property) = match err {
        MappingError::AlreadyMapped { class, property }
        | MappingError::ColumnsExhausted { class, property, .. }
        | MappingError::IllegalMove { class, property, .. } => (Some(class.clone()), Some(property.clone())),
        MappingError::TableUnresolved { class }
        | MappingError::ClassMapNotFound { class }
        | MappingError::MissingPropertyMap { class, .. } => (Some(class.clone()), None),
        MappingError::Schema(inner) => (
            inner.class_name().map(str::to_string),
            inner.property_name().map(str::to_string),
        ),
        MappingError::Store(_) => (None, None),
    };
    ImportDiagnostic {
        class,
        property,
        reason: err.to_string(),
    }
}

fn join<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures opening a store
#[derive(Debug, Error)]
pub enum EcDbError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persisted mapping could not be loaded: {0}")]
    Mapping(#[from] MappingError),
}

impl From<validator::ValidationErrors> for EcDbError {
    fn from(err: validator::ValidationErrors) -> Self {
        EcDbError::Config(ConfigError::Validation(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_carry_class_and_property() {
        let err = ImportError::Schema(vec![SchemaError::PropertyRetyped {
            class: "ts.Person".into(),
            property: "Age".into(),
            old: "int".into(),
            new: "string".into(),
        }]);
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].class.as_deref(), Some("ts.Person"));
        assert_eq!(diagnostics[0].property.as_deref(), Some("Age"));
        assert!(err.to_string().starts_with("Schema import rejected"));
    }

    #[test]
    fn test_mapping_diagnostic() {
        let err = ImportError::from(MappingError::TableUnresolved {
            class: "ts.Foo".into(),
        });
        let diagnostic = &err.diagnostics()[0];
        assert_eq!(diagnostic.class.as_deref(), Some("ts.Foo"));
        assert_eq!(diagnostic.property, None);
        assert_eq!(diagnostic.to_string(), "ts.Foo: Class `ts.Foo` has no resolvable table");
    }
}
