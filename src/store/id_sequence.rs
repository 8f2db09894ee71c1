//! Repository-scoped id sequence
//!
//! A sequence is a named counter row in `be_Local`. Its value is a packed
//! [`RepositoryBasedId`]; resetting to a repository stores the start of that
//! repository's range (local part 0) and every increment hands out the next
//! local id, so the first generated value is `(repository, 1)`.
//!
//! The increment is a single `UPDATE ... RETURNING` statement, so it is atomic
//! under the store's single-writer transaction without any extra locking.

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use super::errors::StoreError;
use crate::utils::id_encoding::{RepositoryBasedId, MAX_LOCAL_ID, MAX_REPOSITORY_ID};

/// Name of the counter that generates `ECInstanceId` values
pub const INSTANCE_ID_SEQUENCE: &str = "ec_instanceidsequence";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryBasedIdSequence {
    name: String,
}

impl RepositoryBasedIdSequence {
    pub fn new(name: impl Into<String>) -> Self {
        RepositoryBasedIdSequence { name: name.into() }
    }

    /// The sequence backing `ECInstanceId` generation
    pub fn instance_ids() -> Self {
        Self::new(INSTANCE_ID_SEQUENCE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make sure the counter row exists. An existing counter keeps its value.
    pub fn initialize(&self, conn: &Connection) -> Result<(), StoreError> {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO be_Local(Name, Val) VALUES (?1, ?2)",
            params![self.name, RepositoryBasedId::range_start(0).value()],
        )?;
        if inserted > 0 {
            debug!("Initialized id sequence {}", self.name);
        }
        Ok(())
    }

    /// Restart the sequence in the range of `repository_id`. The next value
    /// handed out is `(repository_id, 1)`.
    pub fn reset(&self, conn: &Connection, repository_id: u32) -> Result<(), StoreError> {
        if repository_id > MAX_REPOSITORY_ID {
            return Err(StoreError::InvalidRepositoryId {
                repository_id,
                max: MAX_REPOSITORY_ID,
            });
        }
        conn.execute(
            "INSERT OR REPLACE INTO be_Local(Name, Val) VALUES (?1, ?2)",
            params![
                self.name,
                RepositoryBasedId::range_start(repository_id).value()
            ],
        )?;
        info!(
            "Reset id sequence {} to repository {}",
            self.name, repository_id
        );
        Ok(())
    }

    /// Current value without incrementing
    pub fn current_value(&self, conn: &Connection) -> Result<RepositoryBasedId, StoreError> {
        let value: Option<i64> = conn
            .query_row(
                "SELECT Val FROM be_Local WHERE Name=?1",
                [&self.name],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(RepositoryBasedId::from_value)
            .ok_or_else(|| StoreError::SequenceNotInitialized {
                name: self.name.clone(),
            })
    }

    /// Atomically increment and return the next id
    pub fn get_next_i64_value(&self, conn: &Connection) -> Result<i64, StoreError> {
        let next: Option<i64> = conn
            .query_row(
                "UPDATE be_Local SET Val = Val + 1 \
                 WHERE Name = ?1 AND Val >= 0 AND (Val & ?2) < ?2 \
                 RETURNING Val",
                params![self.name, MAX_LOCAL_ID as i64],
                |row| row.get(0),
            )
            .optional()?;

        match next {
            Some(value) => {
                debug_assert!(RepositoryBasedId::from_value(value).is_valid());
                Ok(value)
            }
            None => {
                // Either the row is missing or the repository range is used up.
                let current = self.current_value(conn)?;
                Err(StoreError::SequenceExhausted {
                    name: self.name.clone(),
                    repository_id: current.repository_id(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn test_first_value_is_one() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::instance_ids();
        seq.initialize(store.connection()).unwrap();
        let first = seq.get_next_i64_value(store.connection()).unwrap();
        assert_eq!(first, 1);
        assert_eq!(seq.get_next_i64_value(store.connection()).unwrap(), 2);
    }

    #[test]
    fn test_initialize_keeps_existing_value() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::new("test_seq");
        seq.initialize(store.connection()).unwrap();
        seq.get_next_i64_value(store.connection()).unwrap();
        seq.initialize(store.connection()).unwrap();
        assert_eq!(seq.get_next_i64_value(store.connection()).unwrap(), 2);
    }

    #[test]
    fn test_reset_to_repository() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::new("test_seq");
        seq.initialize(store.connection()).unwrap();
        seq.reset(store.connection(), 5).unwrap();
        let id = RepositoryBasedId::from_value(seq.get_next_i64_value(store.connection()).unwrap());
        assert_eq!(id.repository_id(), 5);
        assert_eq!(id.local_id(), 1);
    }

    #[test]
    fn test_uninitialized_sequence_errors() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::new("never_created");
        assert!(matches!(
            seq.get_next_i64_value(store.connection()),
            Err(StoreError::SequenceNotInitialized { .. })
        ));
    }

    #[test]
    fn test_exhausted_range() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::new("test_seq");
        store
            .connection()
            .execute(
                "INSERT INTO be_Local(Name, Val) VALUES ('test_seq', ?1)",
                [RepositoryBasedId::new(2, MAX_LOCAL_ID - 1).value()],
            )
            .unwrap();
        let last = seq.get_next_i64_value(store.connection()).unwrap();
        assert_eq!(RepositoryBasedId::from_value(last).local_id(), MAX_LOCAL_ID);
        assert!(matches!(
            seq.get_next_i64_value(store.connection()),
            Err(StoreError::SequenceExhausted {
                repository_id: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_repository_id() {
        let store = Store::open_in_memory().unwrap();
        let seq = RepositoryBasedIdSequence::new("test_seq");
        assert!(seq.reset(store.connection(), u32::MAX).is_err());
    }
}
