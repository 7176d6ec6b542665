use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shardmaster_membership::Host;

/// One row of the assignment table: a host designated to serve a shard.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShardAssignment {
    /// Dataset the shard belongs to.
    pub dataset: String,
    /// Catalog-relative shard path.
    pub shard_path: String,
    /// Host designated to serve the shard.
    pub assigned_host: Host,
    /// When this row was last written or refreshed.
    pub last_updated: DateTime<Utc>,
}

impl ShardAssignment {
    /// Create a new assignment row.
    pub fn new(
        dataset: impl Into<String>,
        shard_path: impl Into<String>,
        assigned_host: Host,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            shard_path: shard_path.into(),
            assigned_host,
            last_updated,
        }
    }
}

/// The changes one reconciliation pass wants to commit for one dataset.
///
/// Applied atomically by [`crate::AssignmentStore::apply_delta`].
#[derive(Clone, Debug, Default)]
pub struct AssignmentDelta {
    /// Rows for newly observed shard/host pairs.
    pub additions: Vec<ShardAssignment>,
    /// Unchanged rows whose `last_updated` is bumped past the staleness
    /// threshold.
    pub refreshes: Vec<ShardAssignment>,
    /// Rows for shards no longer present or hosts no longer placed.
    pub deletions: Vec<ShardAssignment>,
}

impl AssignmentDelta {
    /// Whether the delta contains no changes at all.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.refreshes.is_empty() && self.deletions.is_empty()
    }
}
