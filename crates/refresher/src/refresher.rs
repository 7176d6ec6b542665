//! Assignment reconciliation passes

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use shardmaster_catalog::ShardCatalog;
use shardmaster_membership::{Host, MembershipSource, MembershipTracker};
use shardmaster_placement::ReplicaPlacer;
use shardmaster_store::{AssignmentDelta, AssignmentStore, ShardAssignment};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::RefresherError;

/// Default interval between reconciliation passes.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default bound on concurrently reconciled datasets.
const DEFAULT_WORKER_POOL_SIZE: usize = 5;

/// State for the background pass loop.
struct TaskState {
    pass_task: Option<JoinHandle<()>>,
    shutdown_signal: Option<oneshot::Sender<()>>,
}

/// Configuration for the assignment refresher.
#[derive(Clone, Debug)]
pub struct RefresherConfig {
    /// Interval between reconciliation passes.
    pub refresh_interval: Duration,
    /// Maximum number of datasets reconciled concurrently. Producers wait for
    /// a free slot rather than queueing unbounded work.
    pub worker_pool_size: usize,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PassSummary {
    /// Datasets reconciled successfully.
    pub reconciled: usize,
    /// Datasets skipped because of an error.
    pub failed: usize,
}

/// Reconciles the assignment table against the catalog and the current host
/// set.
///
/// Each pass snapshots membership once, computes the target replica set for
/// every shard of every dataset, and commits only the per-dataset deltas. A
/// failure in one dataset is logged and skipped; the other datasets proceed.
pub struct AssignmentRefresher<C, S, P>
where
    C: ShardCatalog,
    S: MembershipSource,
    P: ReplicaPlacer,
{
    catalog: Arc<C>,
    tracker: Arc<MembershipTracker<S>>,
    placer: Arc<P>,
    store: AssignmentStore,
    config: RefresherConfig,
    /// Serializes passes: a scheduled pass never overlaps an in-flight one.
    pass_guard: Arc<Mutex<()>>,
    task_state: Arc<RwLock<TaskState>>,
}

impl<C, S, P> AssignmentRefresher<C, S, P>
where
    C: ShardCatalog,
    S: MembershipSource,
    P: ReplicaPlacer,
{
    /// Create a new refresher.
    pub fn new(
        catalog: Arc<C>,
        tracker: Arc<MembershipTracker<S>>,
        placer: Arc<P>,
        store: AssignmentStore,
        config: RefresherConfig,
    ) -> Self {
        Self {
            catalog,
            tracker,
            placer,
            store,
            config,
            pass_guard: Arc::new(Mutex::new(())),
            task_state: Arc::new(RwLock::new(TaskState {
                pass_task: None,
                shutdown_signal: None,
            })),
        }
    }

    /// Run the first full pass. The service is not ready until this returns.
    ///
    /// # Errors
    ///
    /// Any error here is fatal to startup, including per-pass errors that
    /// would merely be logged once the refresher is running.
    pub async fn initialize(&self) -> Result<PassSummary, RefresherError> {
        info!("initializing shard assignments");
        self.run_once().await
    }

    /// Run one reconciliation pass.
    ///
    /// The host snapshot is fixed for the whole pass. Datasets are processed
    /// concurrently, bounded by the configured worker pool size.
    ///
    /// # Errors
    ///
    /// Returns an error only if the dataset list itself cannot be enumerated;
    /// per-dataset failures are counted in the summary instead.
    pub async fn run_once(&self) -> Result<PassSummary, RefresherError> {
        let _guard = self.pass_guard.lock().await;

        let hosts = self.tracker.current_hosts();
        let datasets = self
            .catalog
            .datasets()
            .await
            .map_err(|e| RefresherError::Catalog(e.to_string()))?;

        debug!(
            "starting pass over {} datasets with {} hosts",
            datasets.len(),
            hosts.len()
        );

        let results: Vec<(String, Result<(), RefresherError>)> = stream::iter(datasets)
            .map(|dataset| {
                let hosts = hosts.clone();
                async move {
                    let result = self.reconcile_dataset(&dataset, &hosts).await;
                    (dataset, result)
                }
            })
            .buffer_unordered(self.config.worker_pool_size)
            .collect()
            .await;

        let mut summary = PassSummary::default();
        for (dataset, result) in results {
            match result {
                Ok(()) => summary.reconciled += 1,
                Err(e) => {
                    warn!("skipping dataset {}: {}", dataset, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "pass complete: {} datasets reconciled, {} failed",
            summary.reconciled, summary.failed
        );
        Ok(summary)
    }

    /// Diff one dataset's target assignments against the stored rows and
    /// commit the delta.
    async fn reconcile_dataset(
        &self,
        dataset: &str,
        hosts: &[Host],
    ) -> Result<(), RefresherError> {
        let shards = self
            .catalog
            .shards(dataset)
            .await
            .map_err(|e| RefresherError::Catalog(e.to_string()))?;
        let existing = self.store.current_assignments(dataset).await?;
        let now = Utc::now();

        let mut existing_by_shard: HashMap<String, Vec<ShardAssignment>> = HashMap::new();
        for row in existing {
            existing_by_shard
                .entry(row.shard_path.clone())
                .or_default()
                .push(row);
        }

        let mut delta = AssignmentDelta::default();
        for shard in &shards {
            let target = self.placer.place(shard, hosts);
            let target_set: HashSet<&Host> = target.iter().collect();

            let mut kept = HashSet::new();
            for row in existing_by_shard.remove(&shard.path).unwrap_or_default() {
                if target_set.contains(&row.assigned_host) {
                    if self.store.is_stale(&row, now) {
                        delta.refreshes.push(ShardAssignment {
                            last_updated: now,
                            ..row.clone()
                        });
                    }
                    kept.insert(row.assigned_host);
                } else {
                    delta.deletions.push(row);
                }
            }

            for host in target {
                if !kept.contains(&host) {
                    delta
                        .additions
                        .push(ShardAssignment::new(dataset, &shard.path, host, now));
                }
            }
        }

        // Rows whose shard is gone from the catalog.
        for rows in existing_by_shard.into_values() {
            delta.deletions.extend(rows);
        }

        if !delta.is_empty() {
            self.store.apply_delta(dataset, &delta).await?;
        }
        Ok(())
    }

    /// Start the fixed-cadence pass loop.
    pub async fn start(&self) {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let refresher = self.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresher.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // initialize() already ran the first pass.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = refresher.run_once().await {
                            warn!("reconciliation pass failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("assignment refresher shutting down");
                        break;
                    }
                }
            }
        });

        let mut state = self.task_state.write().await;
        state.pass_task = Some(task);
        state.shutdown_signal = Some(shutdown_tx);
    }

    /// Stop the pass loop, letting an in-flight pass drain.
    pub async fn shutdown(&self) {
        let mut state = self.task_state.write().await;

        if let Some(shutdown_signal) = state.shutdown_signal.take() {
            let _ = shutdown_signal.send(());
        }

        if let Some(task) = state.pass_task.take() {
            match tokio::time::timeout(Duration::from_secs(30), task).await {
                Ok(Ok(())) => debug!("assignment refresher task completed"),
                Ok(Err(e)) => warn!("assignment refresher task failed: {}", e),
                Err(_) => warn!("assignment refresher task timed out"),
            }
        }
    }
}

impl<C, S, P> Clone for AssignmentRefresher<C, S, P>
where
    C: ShardCatalog,
    S: MembershipSource,
    P: ReplicaPlacer,
{
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            tracker: Arc::clone(&self.tracker),
            placer: Arc::clone(&self.placer),
            store: self.store.clone(),
            config: self.config.clone(),
            pass_guard: Arc::clone(&self.pass_guard),
            task_state: Arc::clone(&self.task_state),
        }
    }
}
