//! Store error kinds callers branch on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("document (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{collection}/{key} not found")]
    NotFound { collection: String, key: String },

    /// A compare-and-swap precondition failed, e.g. a manifest that is no
    /// longer in the state the transition expected.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn not_found(collection: &str, key: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
