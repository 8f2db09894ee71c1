use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Store configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct EcDbConfig {
    /// Shared columns in a primary table when a hierarchy enables shared
    /// columns without giving its own limit
    #[validate(range(
        min = 1,
        max = 1900,
        message = "Shared column count must be between 1 and 1900"
    ))]
    pub max_shared_columns: u32,

    /// Whether shared-column tables may spill into an overflow table
    pub overflow_enabled: bool,

    /// Upper bound of shared columns in one overflow table
    #[validate(range(
        min = 1,
        max = 1900,
        message = "Overflow column count must be between 1 and 1900"
    ))]
    pub max_overflow_columns: u32,

    /// Let sibling classes of a shared-column hierarchy reuse each other's
    /// shared columns. When off every class gets fresh columns.
    pub sibling_column_reuse: bool,

    /// Compiled ECSQL plans kept in the statement cache (0 disables caching)
    #[validate(range(max = 100000, message = "Statement cache capacity must be at most 100000"))]
    pub statement_cache_capacity: usize,

    /// Repository the instance id sequence is reset to when a store is created
    #[validate(range(
        max = 2147483647,
        message = "Repository id must fit in 31 bits"
    ))]
    pub repository_id: u32,
}

impl Default for EcDbConfig {
    fn default() -> Self {
        Self {
            max_shared_columns: 63,
            overflow_enabled: true,
            max_overflow_columns: 1024,
            sibling_column_reuse: true,
            statement_cache_capacity: 256,
            repository_id: 0,
        }
    }
}

impl EcDbConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            max_shared_columns: parse_env_var("ECDB_MAX_SHARED_COLUMNS", "63")?,
            overflow_enabled: parse_env_var("ECDB_OVERFLOW_ENABLED", "true")?,
            max_overflow_columns: parse_env_var("ECDB_MAX_OVERFLOW_COLUMNS", "1024")?,
            sibling_column_reuse: parse_env_var("ECDB_SIBLING_COLUMN_REUSE", "true")?,
            statement_cache_capacity: parse_env_var("ECDB_STATEMENT_CACHE_CAPACITY", "256")?,
            repository_id: parse_env_var("ECDB_REPOSITORY_ID", "0")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            max_shared_columns: cli.max_shared_columns,
            overflow_enabled: !cli.disable_overflow,
            max_overflow_columns: cli.max_overflow_columns,
            sibling_column_reuse: !cli.disable_sibling_column_reuse,
            statement_cache_capacity: cli.statement_cache_capacity,
            repository_id: cli.repository_id,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub max_shared_columns: u32,
    pub disable_overflow: bool,
    pub max_overflow_columns: u32,
    pub disable_sibling_column_reuse: bool,
    pub statement_cache_capacity: usize,
    pub repository_id: u32,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EcDbConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_shared_columns, 63);
        assert!(config.overflow_enabled);
    }

    #[test]
    fn test_invalid_shared_column_count() {
        let config = EcDbConfig {
            max_shared_columns: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_repository_id() {
        let config = EcDbConfig {
            repository_id: u32::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_cli() {
        let config = EcDbConfig::from_cli(CliConfig {
            max_shared_columns: 8,
            disable_overflow: true,
            max_overflow_columns: 16,
            disable_sibling_column_reuse: false,
            statement_cache_capacity: 0,
            repository_id: 5,
        })
        .unwrap();
        assert_eq!(config.max_shared_columns, 8);
        assert!(!config.overflow_enabled);
        assert!(config.sibling_column_reuse);
        assert_eq!(config.repository_id, 5);
    }

    #[test]
    fn test_from_yaml_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_shared_columns: 4\noverflow_enabled: false").unwrap();
        let config = EcDbConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_shared_columns, 4);
        assert!(!config.overflow_enabled);
        assert_eq!(config.max_overflow_columns, 1024);
    }
}
