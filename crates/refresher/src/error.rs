use thiserror::Error;

/// Errors that can occur while reconciling assignments.
#[derive(Debug, Error)]
pub enum RefresherError {
    /// Catalog enumeration failure.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Assignment store failure.
    #[error(transparent)]
    Store(#[from] shardmaster_store::StoreError),
}
