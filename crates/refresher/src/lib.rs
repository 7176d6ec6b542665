//! Periodic reconciliation of shard assignments against the catalog and
//! cluster membership.
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod refresher;

pub use error::RefresherError;
pub use refresher::{AssignmentRefresher, PassSummary, RefresherConfig};
