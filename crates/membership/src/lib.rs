//! Cluster membership tracking for shardmaster.
//!
//! This crate provides:
//! - Host identity types (`Host`, `HostSet`)
//! - The `MembershipSource` trait and a file-backed implementation
//! - A checkpointed, drop-protected membership tracker
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod host;
mod source;
mod tracker;

pub use error::MembershipError;
pub use host::{Host, HostSet};
pub use source::{FileMembershipSource, MembershipSource};
pub use tracker::{MembershipTracker, MembershipTrackerConfig};

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
