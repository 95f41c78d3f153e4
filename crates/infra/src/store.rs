//! Error shared by the record, blob and vector store adapters.

use thiserror::Error;

/// Store operation error.
///
/// These are **infrastructure errors**. `Unavailable` covers anything a
/// re-invocation may cure (network, timeouts, backend restarts).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Safe to retry by re-invoking the whole operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
                Self::Corrupt(value.to_string())
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}
