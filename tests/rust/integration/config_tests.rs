//! Integration tests for store configuration

#[cfg(test)]
mod config_tests {
    use std::io::Write;

    use ecdb::config::{CliConfig, ConfigError, EcDbConfig};
    use ecdb::{EcDb, EcDbError};
    use validator::Validate;

    use crate::test_schemas::*;

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let cases = vec![
            EcDbConfig {
                max_shared_columns: 0,
                ..EcDbConfig::default()
            },
            EcDbConfig {
                max_overflow_columns: 5000,
                ..EcDbConfig::default()
            },
            EcDbConfig {
                repository_id: u32::MAX,
                ..EcDbConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
            assert!(matches!(
                EcDb::open_in_memory(config),
                Err(EcDbError::Config(ConfigError::Validation(_)))
            ));
        }
    }

    #[test]
    fn test_yaml_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_shared_columns: 2\nstatement_cache_capacity: 0").unwrap();
        let config = EcDbConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_shared_columns, 2);
        assert_eq!(config.statement_cache_capacity, 0);
        assert!(config.overflow_enabled);

        // a disabled cache compiles every time
        let mut ecdb = EcDb::open_in_memory(config).unwrap();
        ecdb.import_schemas(vec![base_derived_schema()]).unwrap();
        ecdb.prepare("SELECT X FROM ts.Base").unwrap();
        assert_eq!(ecdb.cached_plan_count(), 0);
    }

    #[test]
    fn test_cli_flags_map_to_config() {
        let config = EcDbConfig::from_cli(CliConfig {
            max_shared_columns: 8,
            disable_overflow: true,
            max_overflow_columns: 16,
            disable_sibling_column_reuse: true,
            statement_cache_capacity: 4,
            repository_id: 2,
        })
        .unwrap();
        assert!(!config.overflow_enabled);
        assert!(!config.sibling_column_reuse);
        assert_eq!(config.repository_id, 2);
    }

    #[test]
    fn test_store_default_limit_applies_without_hint() {
        let config = EcDbConfig {
            max_shared_columns: 1,
            ..EcDbConfig::default()
        };
        let mut ecdb = EcDb::open_in_memory(config).unwrap();
        let mut schema = wide_schema(1, 2);
        if let Some(map) = schema.classes[0].map.as_mut() {
            map.shared_columns = Some(Default::default());
        }
        ecdb.import_schemas(vec![schema]).unwrap();
        let layout = layout(&ecdb);
        assert_eq!(layout["TestSchema.Wide:P1"], "ts_Wide.ps1");
        assert!(layout["TestSchema.Wide:P2"].starts_with("ts_Wide_Overflow."));
    }
}
