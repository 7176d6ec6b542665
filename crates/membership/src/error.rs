//! Error types for membership tracking

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Checkpoint file could not be read or written.
    #[error("checkpoint {0}: {1}")]
    Checkpoint(&'static str, #[source] std::io::Error),

    /// Checkpoint contents could not be decoded.
    #[error("checkpoint decode: {0}")]
    CheckpointDecode(String),

    /// A host set could not be encoded for checkpointing.
    #[error("checkpoint encode: {0}")]
    CheckpointEncode(String),

    /// A host string did not parse as `name:port`.
    #[error("invalid host '{0}'")]
    InvalidHost(String),

    /// Members file could not be read.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The membership source failed to produce a member list.
    #[error("membership source: {0}")]
    Source(String),
}
