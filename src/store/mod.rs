//! Embedded relational store
//!
//! Thin wrapper over a single SQLite connection. The store provides the
//! single-writer transactions the mapping engine layers on top of; this module
//! only adds transaction/savepoint scoping and the `be_Local` named-value table
//! used by the id sequences.

pub mod errors;
pub mod id_sequence;

use std::path::{Path, PathBuf};

use log::{debug, error};
use rusqlite::{Connection, OptionalExtension};

pub use errors::StoreError;
pub use id_sequence::RepositoryBasedIdSequence;

use crate::utils::quote_ident;

const LOCAL_VALUES_DDL: &str =
    "CREATE TABLE IF NOT EXISTS be_Local(Name TEXT PRIMARY KEY NOT NULL COLLATE NOCASE, Val ANY)";

pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Opens (or creates) a store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        debug!("Opened store at {}", path.as_ref().display());
        Self::init(conn, Some(path.as_ref().to_path_buf()))
    }

    /// Opens a private in-memory store
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        debug!("Opened in-memory store");
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(LOCAL_VALUES_DDL)?;
        Ok(Store { conn, path })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_statement_cache_capacity(&self, capacity: usize) {
        self.conn.set_prepared_statement_cache_capacity(capacity);
    }

    /// Run `f` inside an immediate transaction, committing on success and
    /// rolling back on error.
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(StoreError::from(e)))?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| E::from(StoreError::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    error!("Rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Run `f` inside a named savepoint. Nested use is allowed; outside of a
    /// transaction the savepoint opens one.
    pub fn with_savepoint<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        with_savepoint(&self.conn, name, f)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        table_exists(&self.conn, name)
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Read a value from `be_Local`
    pub fn local_value(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT Val FROM be_Local WHERE Name=?1", [name], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?)
    }
}

/// Savepoint scope over a bare connection
pub fn with_savepoint<T, E, F>(conn: &Connection, name: &str, f: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<StoreError>,
{
    let quoted = quote_ident(name);
    conn.execute_batch(&format!("SAVEPOINT {}", quoted))
        .map_err(|e| E::from(StoreError::from(e)))?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {}", quoted))
                .map_err(|e| E::from(StoreError::from(e)))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {q}; RELEASE {q}", q = quoted))
            {
                error!("Rollback to savepoint {} failed: {}", name, rollback_err);
            }
            Err(err)
        }
    }
}

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1 COLLATE NOCASE",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
