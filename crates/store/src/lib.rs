//! Durable shard-assignment table for shardmaster, backed by
//! [libsql](https://github.com/tursodatabase/libsql).
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::AssignmentStore;
pub use types::{AssignmentDelta, ShardAssignment};
