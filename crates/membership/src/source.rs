//! Membership source trait and file-backed implementation

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::{Host, MembershipError};

/// A source of cluster membership, polled on demand by the tracker.
///
/// Implementations answer "give me the current member list". The tracker owns
/// the polling cadence and applies drop-ratio protection before trusting the
/// result.
#[async_trait]
pub trait MembershipSource: Send + Sync + 'static {
    /// Error type returned by this source.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current member list.
    async fn members(&self) -> Result<Vec<Host>, Self::Error>;
}

/// Membership source backed by a file of `name:port` lines.
///
/// Blank lines and lines starting with `#` are skipped. The file is re-read on
/// every fetch, so edits take effect on the next tracker refresh.
#[derive(Clone, Debug)]
pub struct FileMembershipSource {
    path: PathBuf,
}

impl FileMembershipSource {
    /// Create a source reading from the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MembershipSource for FileMembershipSource {
    type Error = MembershipError;

    async fn members(&self) -> Result<Vec<Host>, Self::Error> {
        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| MembershipError::Io("error reading members file", e))?;

        let mut hosts = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            hosts.push(line.parse::<Host>()?);
        }

        Ok(hosts)
    }
}
