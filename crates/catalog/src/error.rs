use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}
