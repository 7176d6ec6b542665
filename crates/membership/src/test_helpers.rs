//! In-memory membership source for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Host, MembershipError, MembershipSource};

/// A settable in-memory membership source.
#[derive(Clone, Debug)]
pub struct StaticMembershipSource {
    hosts: Arc<RwLock<Vec<Host>>>,
    failing: Arc<AtomicBool>,
}

impl StaticMembershipSource {
    /// Create a source serving the given host list.
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: Arc::new(RwLock::new(hosts)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the served host list.
    pub async fn set_hosts(&self, hosts: Vec<Host>) {
        *self.hosts.write().await = hosts;
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MembershipSource for StaticMembershipSource {
    type Error = MembershipError;

    async fn members(&self) -> Result<Vec<Host>, Self::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MembershipError::Source("forced failure".to_string()));
        }
        Ok(self.hosts.read().await.clone())
    }
}
