//! Schema definition files
//!
//! Schemas are written as YAML (or JSON) documents holding one or more schemas:
//!
//! ```yaml
//! schemas:
//!   - name: TestSchema
//!     alias: ts
//!     classes:
//!       - name: Base
//!         map:
//!           strategy: shared_table
//!         properties:
//!           - name: X
//!             kind: primitive
//!             type: int
//!       - name: Derived
//!         base_class: Base
//!         properties:
//!           - name: Y
//!             kind: primitive
//!             type: double
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ec_schema::EcSchema;
use super::errors::SchemaError;
use super::schema_validator::validate_schema_shapes;

/// Schemas loaded from a definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcSchemaConfig {
    pub schemas: Vec<EcSchema>,
}

impl EcSchemaConfig {
    /// Load schema definitions from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|e| SchemaError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse schema definitions from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(yaml).map_err(|e| SchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Parse a single persisted schema definition
    pub fn schema_from_json(json: &str) -> Result<EcSchema, SchemaError> {
        serde_json::from_str(json).map_err(|e| SchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Shape validation of the definitions; returns the first problem found
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.schemas.is_empty() {
            return Err(SchemaError::ConfigParseError {
                error: "definition contains no schemas".to_string(),
            });
        }
        match validate_schema_shapes(&self.schemas).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn into_schemas(self) -> Vec<EcSchema> {
        self.schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec_catalog::ec_schema::{ClassType, MapStrategyHint, PrimitiveType, PropertyKind};
    use std::io::Write;

    const SAMPLE: &str = r#"
schemas:
  - name: TestSchema
    alias: ts
    classes:
      - name: Base
        map:
          strategy: shared_table
          shared_columns:
            max_shared_columns: 4
        properties:
          - name: X
            kind: primitive
            type: int
      - name: Derived
        base_class: Base
        properties:
          - name: Y
            kind: primitive
            type: double
      - name: Address
        type: struct
        properties:
          - name: Street
            kind: primitive
            type: string
"#;

    #[test]
    fn test_from_yaml_str() {
        let config = EcSchemaConfig::from_yaml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        let schema = &config.schemas[0];
        assert_eq!(schema.alias, "ts");
        let base = schema.class("base").unwrap();
        let hint = base.map.unwrap();
        assert_eq!(hint.strategy, MapStrategyHint::SharedTable);
        assert_eq!(hint.shared_columns.unwrap().max_shared_columns, Some(4));
        assert_eq!(schema.class("Address").unwrap().class_type, ClassType::Struct);
        assert_eq!(
            schema.class("Derived").unwrap().properties[0].kind,
            PropertyKind::Primitive {
                primitive_type: PrimitiveType::Double
            }
        );
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = EcSchemaConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.schemas.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let result = EcSchemaConfig::from_yaml_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(SchemaError::ConfigReadError { .. })));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = EcSchemaConfig::from_yaml_str("schemas: [ { name: 1 ");
        assert!(matches!(result, Err(SchemaError::ConfigParseError { .. })));
    }

    #[test]
    fn test_empty_definition_invalid() {
        let config = EcSchemaConfig { schemas: vec![] };
        assert!(config.validate().is_err());
    }
}
