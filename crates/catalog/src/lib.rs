//! Shard catalog enumeration for shardmaster.
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod filter;
mod fs;
mod shard;

pub use error::CatalogError;
pub use filter::{AcceptAll, DatasetPrefix, ShardFilter};
pub use fs::FsShardCatalog;
pub use shard::Shard;

use async_trait::async_trait;

/// Enumerates shards of sharded datasets.
///
/// Enumeration is finite and restartable: re-enumerating produces the same
/// result unless the underlying storage changed. Errors are scoped to one
/// dataset; a failing dataset never aborts enumeration of the others.
#[async_trait]
pub trait ShardCatalog: Send + Sync + 'static {
    /// Error type returned by this catalog.
    type Error: std::error::Error + Send + Sync + 'static;

    /// List the datasets known to the catalog.
    async fn datasets(&self) -> Result<Vec<String>, Self::Error>;

    /// List the shards of one dataset, filtered through the configured
    /// [`ShardFilter`].
    async fn shards(&self, dataset: &str) -> Result<Vec<Shard>, Self::Error>;
}
