use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ecdb::config::{CliConfig, EcDbConfig};
use ecdb::{EcDb, EcValue, StepResult};

/// ECDb - EC schemas and ECSQL over SQLite
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store file (created when missing)
    #[arg(long, global = true, default_value = "ecdb.db")]
    db: PathBuf,

    /// Read the configuration from a YAML file instead of the flags below
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read the configuration from ECDB_* environment variables (and .env)
    #[arg(long, global = true)]
    env_config: bool,

    /// Shared columns per table when a hierarchy gives no limit of its own
    #[arg(long, global = true, default_value_t = 63)]
    max_shared_columns: u32,

    /// Never spill shared columns into an overflow table
    #[arg(long, global = true)]
    disable_overflow: bool,

    /// Upper bound of columns in one overflow table
    #[arg(long, global = true, default_value_t = 1024)]
    max_overflow_columns: u32,

    /// Give every class of a shared-column hierarchy its own columns
    #[arg(long, global = true)]
    disable_sibling_column_reuse: bool,

    /// Compiled ECSQL plans to keep (0 disables the cache)
    #[arg(long, global = true, default_value_t = 256)]
    statement_cache_capacity: usize,

    /// Repository of generated ids for a new store
    #[arg(long, global = true, default_value_t = 0)]
    repository_id: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import one or more schema files (YAML or JSON)
    Import { files: Vec<PathBuf> },
    /// Run an ECSQL statement and print its rows as JSON lines
    Query {
        ecsql: String,
        /// Parameter value, `N=value` by position or `name=value` by name
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Print the SQLite SQL an ECSQL statement compiles to
    Explain { ecsql: String },
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        CliConfig {
            max_shared_columns: cli.max_shared_columns,
            disable_overflow: cli.disable_overflow,
            max_overflow_columns: cli.max_overflow_columns,
            disable_sibling_column_reuse: cli.disable_sibling_column_reuse,
            statement_cache_capacity: cli.statement_cache_capacity,
            repository_id: cli.repository_id,
        }
    }
}

fn load_config(cli: &Cli) -> Result<EcDbConfig> {
    let config = match (&cli.config, cli.env_config) {
        (Some(path), _) => EcDbConfig::from_yaml_file(path)?,
        (None, true) => EcDbConfig::from_env()?,
        (None, false) => EcDbConfig::from_cli(cli.into())?,
    };
    Ok(config)
}

/// `42`, `4.2`, `null`, `true`/`false`, anything else is a string
fn parse_value(text: &str) -> EcValue {
    if text.eq_ignore_ascii_case("null") {
        EcValue::Null
    } else if let Ok(v) = text.parse::<i64>() {
        EcValue::Integer(v)
    } else if let Ok(v) = text.parse::<f64>() {
        EcValue::Double(v)
    } else if let Ok(v) = text.parse::<bool>() {
        EcValue::Boolean(v)
    } else {
        EcValue::String(text.to_string())
    }
}

fn run_query(ecdb: &EcDb, ecsql: &str, params: &[String]) -> Result<()> {
    let mut stmt = ecdb.prepare(ecsql)?;
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            bail!("parameter '{}' is not of the form key=value", param);
        };
        match key.parse::<usize>() {
            Ok(index) => stmt.bind(index, parse_value(value))?,
            Err(_) => stmt.bind_by_name(key, parse_value(value))?,
        }
    }

    let mut rows = 0usize;
    while stmt.step()? == StepResult::Row {
        println!("{}", stmt.row_json()?);
        rows += 1;
    }
    match stmt.last_inserted_id() {
        Some(id) => eprintln!("Inserted instance {}", id),
        None if stmt.column_count() == 0 => eprintln!("{} instance(s) affected", stmt.affected_rows()),
        None => eprintln!("{} row(s)", rows),
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli).context("invalid configuration")?;
    let mut ecdb = EcDb::open(&cli.db, config)
        .with_context(|| format!("cannot open store {}", cli.db.display()))?;

    match &cli.command {
        Command::Import { files } => {
            if files.is_empty() {
                bail!("no schema files given");
            }
            for file in files {
                let report = ecdb.import_schema_file(file).map_err(|err| {
                    for diagnostic in err.diagnostics() {
                        eprintln!("  {}", diagnostic);
                    }
                    anyhow::Error::new(err).context(format!("import of {} failed", file.display()))
                })?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Query { ecsql, params } => run_query(&ecdb, ecsql, params)?,
        Command::Explain { ecsql } => {
            let stmt = ecdb.prepare(ecsql)?;
            print!("{}", stmt.native_sql());
        }
    }
    Ok(())
}
