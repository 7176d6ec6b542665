use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stored row could not be decoded.
    #[error("corrupt assignment row: {0}")]
    CorruptRow(String),

    /// Underlying database failure.
    #[error(transparent)]
    Database(#[from] libsql::Error),
}
