use thiserror::Error;

/// Errors raised by the embedded store layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Id sequence `{name}` is not initialized")]
    SequenceNotInitialized { name: String },

    #[error("Id sequence `{name}` exhausted for repository {repository_id}")]
    SequenceExhausted { name: String, repository_id: u32 },

    #[error("Invalid repository id {repository_id} (must be at most {max})")]
    InvalidRepositoryId { repository_id: u32, max: u32 },

    #[error("Corrupt metadata: {0}")]
    CorruptMetadata(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
