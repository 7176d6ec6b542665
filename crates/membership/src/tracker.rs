//! Checkpointed, drop-protected membership tracking

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::io::ErrorKind;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Host, HostSet, MembershipError, MembershipSource};

/// Default interval between membership refreshes.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default maximum fractional shrinkage accepted without rejection.
const DEFAULT_DROP_RATIO: f64 = 0.5;

/// State for the background refresh task.
struct TaskState {
    refresh_task: Option<JoinHandle<()>>,
    shutdown_signal: Option<oneshot::Sender<()>>,
}

/// Configuration for the membership tracker.
#[derive(Clone, Debug)]
pub struct MembershipTrackerConfig {
    /// Path of the local checkpoint of the last accepted host set.
    pub checkpoint_path: PathBuf,
    /// Candidate host sets smaller than `(1 - drop_ratio)` of the previous
    /// snapshot are rejected.
    pub drop_ratio: f64,
    /// Interval at which the source is polled.
    pub refresh_interval: Duration,
}

impl MembershipTrackerConfig {
    /// Configuration with default cadence and drop ratio.
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            drop_ratio: DEFAULT_DROP_RATIO,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Tracks cluster membership from a [`MembershipSource`].
///
/// The tracker publishes immutable [`HostSet`] snapshots. Each accepted
/// snapshot is persisted to a local checkpoint so a restart can bootstrap from
/// the last known-good set even when the source is unreachable. A candidate
/// set that shrinks past the drop ratio is rejected, guarding against a source
/// that returns a spuriously small list during a partial outage.
pub struct MembershipTracker<S>
where
    S: MembershipSource,
{
    source: Arc<S>,
    current: Arc<ArcSwap<Vec<Host>>>,
    config: MembershipTrackerConfig,
    /// Serializes refreshes: overlapping scheduled refreshes never run
    /// concurrently.
    refresh_guard: Arc<Mutex<()>>,
    task_state: Arc<RwLock<TaskState>>,
}

impl<S> MembershipTracker<S>
where
    S: MembershipSource,
{
    /// Create a new tracker. No snapshot is published until [`Self::start`]
    /// or [`Self::refresh`] runs.
    pub fn new(source: Arc<S>, config: MembershipTrackerConfig) -> Self {
        Self {
            source,
            current: Arc::new(ArcSwap::from_pointee(Vec::new())),
            config,
            refresh_guard: Arc::new(Mutex::new(())),
            task_state: Arc::new(RwLock::new(TaskState {
                refresh_task: None,
                shutdown_signal: None,
            })),
        }
    }

    /// The most recently accepted host-set snapshot.
    ///
    /// Lock-free; concurrent readers never observe a partially updated set.
    pub fn current_hosts(&self) -> HostSet {
        self.current.load_full()
    }

    /// Poll the source once and publish the candidate set if acceptable.
    ///
    /// Drop-ratio rejection is not an error: the previous snapshot is kept
    /// and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to produce a member list. The
    /// previous snapshot remains published.
    pub async fn refresh(&self) -> Result<(), MembershipError> {
        let _guard = self.refresh_guard.lock().await;

        let candidate = self
            .source
            .members()
            .await
            .map_err(|e| MembershipError::Source(e.to_string()))?;

        let previous = self.current.load();
        let minimum = (1.0 - self.config.drop_ratio) * previous.len() as f64;
        if (candidate.len() as f64) < minimum {
            warn!(
                "rejecting membership update: candidate has {} hosts, previous {} (drop ratio {})",
                candidate.len(),
                previous.len(),
                self.config.drop_ratio
            );
            return Ok(());
        }

        if let Err(e) = self.write_checkpoint(&candidate).await {
            warn!("failed to persist membership checkpoint: {}", e);
        }

        if **previous != candidate {
            info!("membership updated: {} hosts", candidate.len());
        } else {
            debug!("membership unchanged: {} hosts", candidate.len());
        }
        self.current.store(Arc::new(candidate));

        Ok(())
    }

    /// Start the tracker: bootstrap from checkpoint, refresh once, then keep
    /// refreshing on the configured cadence until shutdown.
    ///
    /// Source unavailability at startup is non-fatal as long as a checkpoint
    /// exists or membership can be empty for now.
    pub async fn start(&self) -> Result<(), MembershipError> {
        match self.load_checkpoint().await {
            Ok(Some(hosts)) => {
                info!("bootstrapped membership from checkpoint: {} hosts", hosts.len());
                self.current.store(Arc::new(hosts));
            }
            Ok(None) => debug!("no membership checkpoint found"),
            Err(e) => warn!("failed to load membership checkpoint: {}", e),
        }

        if let Err(e) = self.refresh().await {
            warn!("initial membership refresh failed, serving last snapshot: {}", e);
        }

        self.start_refresh_task().await;

        Ok(())
    }

    /// Stop the background refresh task.
    pub async fn shutdown(&self) {
        let mut state = self.task_state.write().await;

        if let Some(shutdown_signal) = state.shutdown_signal.take() {
            let _ = shutdown_signal.send(());
        }

        if let Some(task) = state.refresh_task.take() {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => debug!("membership refresh task completed"),
                Ok(Err(e)) => warn!("membership refresh task failed: {}", e),
                Err(_) => warn!("membership refresh task timed out"),
            }
        }
    }

    async fn start_refresh_task(&self) {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let tracker = self.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tracker.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The immediate first tick duplicates the startup refresh.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = tracker.refresh().await {
                            warn!("membership refresh failed, serving last snapshot: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("membership refresh task shutting down");
                        break;
                    }
                }
            }
        });

        let mut state = self.task_state.write().await;
        state.refresh_task = Some(task);
        state.shutdown_signal = Some(shutdown_tx);
    }

    async fn write_checkpoint(&self, hosts: &[Host]) -> Result<(), MembershipError> {
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&hosts, &mut encoded)
            .map_err(|e| MembershipError::CheckpointEncode(e.to_string()))?;

        if let Some(parent) = self.config.checkpoint_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MembershipError::Checkpoint("create dir", e))?;
        }

        tokio::fs::write(&self.config.checkpoint_path, encoded)
            .await
            .map_err(|e| MembershipError::Checkpoint("write", e))
    }

    async fn load_checkpoint(&self) -> Result<Option<Vec<Host>>, MembershipError> {
        let data = match tokio::fs::read(&self.config.checkpoint_path).await {
            Ok(data) => data,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MembershipError::Checkpoint("read", e)),
        };

        let hosts = ciborium::de::from_reader(data.as_slice())
            .map_err(|e| MembershipError::CheckpointDecode(e.to_string()))?;

        Ok(Some(hosts))
    }
}

impl<S> Clone for MembershipTracker<S>
where
    S: MembershipSource,
{
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            current: Arc::clone(&self.current),
            config: self.config.clone(),
            refresh_guard: Arc::clone(&self.refresh_guard),
            task_state: Arc::clone(&self.task_state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticMembershipSource;

    fn hosts(names: &[&str]) -> Vec<Host> {
        names.iter().map(|n| Host::new(*n, 9000)).collect()
    }

    fn tracker_with(
        source: StaticMembershipSource,
        checkpoint: PathBuf,
    ) -> MembershipTracker<StaticMembershipSource> {
        MembershipTracker::new(Arc::new(source), MembershipTrackerConfig::new(checkpoint))
    }

    #[tokio::test]
    async fn test_refresh_publishes_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticMembershipSource::new(hosts(&["a", "b", "c"]));
        let tracker = tracker_with(source, dir.path().join("hosts"));

        tracker.refresh().await.unwrap();

        assert_eq!(*tracker.current_hosts(), hosts(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_drop_ratio_rejects_shrunken_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticMembershipSource::new(hosts(&["a", "b", "c", "d"]));
        let tracker = tracker_with(source.clone(), dir.path().join("hosts"));
        tracker.refresh().await.unwrap();

        // 1 of 4 is below the 0.5 drop ratio floor of 2.
        source.set_hosts(hosts(&["a"])).await;
        tracker.refresh().await.unwrap();
        assert_eq!(*tracker.current_hosts(), hosts(&["a", "b", "c", "d"]));

        // Exactly half is accepted.
        source.set_hosts(hosts(&["a", "b"])).await;
        tracker.refresh().await.unwrap();
        assert_eq!(*tracker.current_hosts(), hosts(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_source_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticMembershipSource::new(hosts(&["a", "b"]));
        let tracker = tracker_with(source.clone(), dir.path().join("hosts"));
        tracker.refresh().await.unwrap();

        source.set_failing(true);
        assert!(tracker.refresh().await.is_err());
        assert_eq!(*tracker.current_hosts(), hosts(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_restart_bootstraps_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("hosts");

        let source = StaticMembershipSource::new(hosts(&["a", "b", "c"]));
        let tracker = tracker_with(source, checkpoint.clone());
        tracker.refresh().await.unwrap();

        // A fresh tracker whose source is down still serves the checkpoint.
        let dead = StaticMembershipSource::new(Vec::new());
        dead.set_failing(true);
        let restarted = tracker_with(dead, checkpoint);
        restarted.start().await.unwrap();

        assert_eq!(*restarted.current_hosts(), hosts(&["a", "b", "c"]));
        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_ignored_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = dir.path().join("hosts");
        tokio::fs::write(&checkpoint, b"not a checkpoint").await.unwrap();

        let dead = StaticMembershipSource::new(Vec::new());
        dead.set_failing(true);
        let tracker = tracker_with(dead, checkpoint);
        tracker.start().await.unwrap();

        assert!(tracker.current_hosts().is_empty());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_refresh_task() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticMembershipSource::new(hosts(&["a"]));
        let tracker = tracker_with(source, dir.path().join("hosts"));

        tracker.start().await.unwrap();
        tracker.shutdown().await;
    }
}
