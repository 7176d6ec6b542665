use serde::{Deserialize, Serialize};

/// A unit of a dataset's data, independently placeable and serveable.
///
/// Shards are enumerated, never created, by this crate; their lifecycle is
/// owned by the storage layer.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Shard {
    /// Dataset the shard belongs to.
    pub dataset: String,
    /// Catalog-relative path identifying the shard (`dataset/shard-name`).
    pub path: String,
}

impl Shard {
    /// Create a new shard reference.
    pub fn new(dataset: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            path: path.into(),
        }
    }
}
