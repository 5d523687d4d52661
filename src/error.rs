use thiserror::Error;

/// Error type for the index core.
///
/// `Storage` wraps any failure from a `PersistentMap` or `IndexStorage`
/// backend (I/O, (de)serialization, or the backend's own error type).
/// `Cancelled` is only ever raised out of the preparation phase of
/// `update` and must never be converted into `Storage`. `ContractViolation`
/// is raised only in extra-sanity mode and is diagnostic, not fatal.
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O failure underneath a persistent map or the index storage.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// (De)serialization failure of a key, value, or indexed-data record.
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    /// sled backend failure.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    /// Generic storage fault, wrapping whatever the commit phase caught.
    #[error("storage error: {0}")]
    Storage(String),
    /// The corresponding data could not be found where an invariant
    /// assumed it would be (corrupted or truncated backing store).
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    /// Preparation was cancelled cooperatively; never wrapped as `Storage`.
    #[error("update cancelled")]
    Cancelled,
    /// Indexer non-determinism or Key/Value equality/hash breakage,
    /// detected only in extra-sanity mode. Not fatal; callers generally
    /// log and continue rather than propagate this.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl IndexError {
    /// True for the one error kind that must be propagated verbatim and
    /// never wrapped as `Storage` (see spec section 7).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Cancelled)
    }
}

/// Custom result type for `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
