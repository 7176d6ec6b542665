//! Host identity types for cluster membership

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::MembershipError;

/// A serving host, identified by name and port.
///
/// Identity is by value: two `Host`s with the same name and port are the same
/// placement target.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Host {
    /// Host name (or address) the host serves on.
    pub name: String,
    /// Port the host serves on.
    pub port: u16,
}

impl Host {
    /// Create a new host.
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

impl FromStr for Host {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, port) = s
            .rsplit_once(':')
            .ok_or_else(|| MembershipError::InvalidHost(s.to_string()))?;

        if name.is_empty() {
            return Err(MembershipError::InvalidHost(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| MembershipError::InvalidHost(s.to_string()))?;

        Ok(Self::new(name, port))
    }
}

/// An immutable point-in-time snapshot of cluster membership.
///
/// Snapshots are shared by reference and superseded atomically by the next
/// snapshot, never mutated in place.
pub type HostSet = Arc<Vec<Host>>;
