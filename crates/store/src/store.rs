//! libsql-backed assignment table

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, params};
use shardmaster_membership::Host;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{AssignmentDelta, ShardAssignment, StoreError};

static CREATE_TABLE_SQL: &str = include_str!("../sql/create_assignments_table.sql");
static CREATE_DATASET_INDEX_SQL: &str = include_str!("../sql/create_dataset_index.sql");
static CREATE_SHARD_INDEX_SQL: &str = include_str!("../sql/create_shard_index.sql");
static INSERT_SQL: &str = include_str!("../sql/insert_assignment.sql");
static REFRESH_SQL: &str = include_str!("../sql/refresh_assignment.sql");
static DELETE_SQL: &str = include_str!("../sql/delete_assignment.sql");
static SELECT_DATASET_SQL: &str = include_str!("../sql/select_dataset_assignments.sql");
static SELECT_SHARD_HOSTS_SQL: &str = include_str!("../sql/select_shard_hosts.sql");

/// Durable table of current shard assignments.
///
/// The store is the only mutable shared resource of the control plane: all
/// mutation goes through [`Self::apply_delta`], which commits one dataset's
/// changes as a unit. Deltas are serialized through a single-writer lock and
/// each runs on its own connection, so clones of the store can commit distinct
/// datasets concurrently and reads never join an open transaction. Reads after
/// a committed delta observe the new state.
#[derive(Clone)]
pub struct AssignmentStore {
    database: Arc<Database>,
    connection: Connection,
    write_guard: Arc<Mutex<()>>,
    staleness_threshold: chrono::Duration,
}

impl Debug for AssignmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentStore").finish()
    }
}

impl AssignmentStore {
    /// Open the database at `path` and bootstrap the schema if absent.
    ///
    /// Rows older than `staleness_threshold` are reported stale by
    /// [`Self::is_stale`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot
    /// be created.
    pub async fn connect(
        path: impl AsRef<Path> + Send,
        staleness_threshold: Duration,
    ) -> Result<Self, StoreError> {
        let database = Builder::new_local(path).build().await?;
        let connection = database.connect()?;

        // WAL persists in the database file and lets reads on this connection
        // proceed while a delta commits on a writer connection.
        connection.query("PRAGMA journal_mode = WAL", ()).await?;

        for statement in [CREATE_TABLE_SQL, CREATE_DATASET_INDEX_SQL, CREATE_SHARD_INDEX_SQL] {
            connection.execute(statement, ()).await?;
        }

        Ok(Self {
            database: Arc::new(database),
            connection,
            write_guard: Arc::new(Mutex::new(())),
            staleness_threshold: chrono::Duration::from_std(staleness_threshold)
                .unwrap_or(chrono::Duration::MAX),
        })
    }

    /// All assignment rows for one dataset, ordered by shard path and host.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn current_assignments(
        &self,
        dataset: &str,
    ) -> Result<Vec<ShardAssignment>, StoreError> {
        let mut rows = self
            .connection
            .query(SELECT_DATASET_SQL, params![dataset])
            .await?;

        let mut assignments = Vec::new();
        while let Some(row) = rows.next().await? {
            let shard_path = row.get::<String>(0)?;
            let host = row.get::<String>(1)?;
            let last_updated = row.get::<i64>(2)?;
            assignments.push(ShardAssignment::new(
                dataset,
                shard_path,
                parse_host(&host)?,
                parse_timestamp(last_updated)?,
            ));
        }

        Ok(assignments)
    }

    /// The hosts currently assigned to one shard, ordered by host.
    ///
    /// Unknown shards yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn shard_hosts(
        &self,
        dataset: &str,
        shard_path: &str,
    ) -> Result<Vec<Host>, StoreError> {
        let mut rows = self
            .connection
            .query(SELECT_SHARD_HOSTS_SQL, params![dataset, shard_path])
            .await?;

        let mut hosts = Vec::new();
        while let Some(row) = rows.next().await? {
            hosts.push(parse_host(&row.get::<String>(0)?)?);
        }

        Ok(hosts)
    }

    /// Commit one dataset's additions, refreshes and deletions as a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; no partial delta is ever
    /// visible.
    pub async fn apply_delta(
        &self,
        dataset: &str,
        delta: &AssignmentDelta,
    ) -> Result<(), StoreError> {
        // One writer at a time, on a dedicated connection. A transaction on
        // the shared read connection would be joined by any concurrent
        // statement on a clone of this store.
        let _guard = self.write_guard.lock().await;
        let connection = self.database.connect()?;
        let transaction = connection.transaction().await?;

        for row in &delta.deletions {
            transaction
                .execute(
                    DELETE_SQL,
                    params![dataset, row.shard_path.clone(), row.assigned_host.to_string()],
                )
                .await?;
        }

        for row in &delta.refreshes {
            transaction
                .execute(
                    REFRESH_SQL,
                    params![
                        dataset,
                        row.shard_path.clone(),
                        row.assigned_host.to_string(),
                        row.last_updated.timestamp_millis()
                    ],
                )
                .await?;
        }

        for row in &delta.additions {
            transaction
                .execute(
                    INSERT_SQL,
                    params![
                        dataset,
                        row.shard_path.clone(),
                        row.assigned_host.to_string(),
                        row.last_updated.timestamp_millis()
                    ],
                )
                .await?;
        }

        transaction.commit().await?;

        debug!(
            "committed delta for dataset {}: +{} ~{} -{}",
            dataset,
            delta.additions.len(),
            delta.refreshes.len(),
            delta.deletions.len()
        );
        Ok(())
    }

    /// Whether a row's age exceeds the staleness threshold at `now`.
    pub fn is_stale(&self, row: &ShardAssignment, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(row.last_updated) > self.staleness_threshold
    }
}

fn parse_host(text: &str) -> Result<Host, StoreError> {
    text.parse::<Host>()
        .map_err(|e| StoreError::CorruptRow(e.to_string()))
}

fn parse_timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::CorruptRow(format!("timestamp out of range: {millis}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn store_in(dir: &tempfile::TempDir) -> AssignmentStore {
        AssignmentStore::connect(dir.path().join("assignments.db"), HOUR)
            .await
            .unwrap()
    }

    fn row(dataset: &str, shard: &str, host: &str, at: DateTime<Utc>) -> ShardAssignment {
        ShardAssignment::new(dataset, shard, Host::new(host, 9000), at)
    }

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();

        let store = store_in(&dir).await;
        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    additions: vec![row("events", "events/shard.0", "h1", now)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        drop(store);

        // Reconnecting re-runs the bootstrap and keeps existing rows.
        let store = store_in(&dir).await;
        assert_eq!(store.current_assignments("events").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let rows = vec![
            row("events", "events/shard.0", "h1", now),
            row("events", "events/shard.0", "h2", now),
            row("events", "events/shard.1", "h1", now),
        ];
        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    additions: rows.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let read = store.current_assignments("events").await.unwrap();
        assert_eq!(read.len(), 3);
        assert_eq!(
            store
                .shard_hosts("events", "events/shard.0")
                .await
                .unwrap(),
            vec![Host::new("h1", 9000), Host::new("h2", 9000)]
        );
        assert!(
            store
                .shard_hosts("events", "events/shard.9")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deltas_commit_independently() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let mut tasks = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let dataset = format!("ds{n}");
                let delta = AssignmentDelta {
                    additions: vec![
                        row(&dataset, &format!("{dataset}/shard.0"), "h1", now),
                        row(&dataset, &format!("{dataset}/shard.0"), "h2", now),
                    ],
                    ..Default::default()
                };
                store.apply_delta(&dataset, &delta).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for n in 0..8 {
            let dataset = format!("ds{n}");
            assert_eq!(store.current_assignments(&dataset).await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_deltas_are_scoped_to_their_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    additions: vec![row("events", "events/shard.0", "h1", now)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .apply_delta(
                "metrics",
                &AssignmentDelta {
                    additions: vec![row("metrics", "metrics/shard.0", "h2", now)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    deletions: vec![row("events", "events/shard.0", "h1", now)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.current_assignments("events").await.unwrap().is_empty());
        assert_eq!(store.current_assignments("metrics").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_bumps_last_updated() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let old = Utc::now() - chrono::Duration::hours(2);
        let now = Utc::now();

        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    additions: vec![row("events", "events/shard.0", "h1", old)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store
            .apply_delta(
                "events",
                &AssignmentDelta {
                    refreshes: vec![row("events", "events/shard.0", "h1", now)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let read = store.current_assignments("events").await.unwrap();
        assert_eq!(read.len(), 1);
        assert!(!store.is_stale(&read[0], now));
    }

    #[tokio::test]
    async fn test_is_stale_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let over = row(
            "events",
            "events/shard.0",
            "h1",
            now - chrono::Duration::seconds(3601),
        );
        let fresh = row("events", "events/shard.0", "h1", now);

        assert!(store.is_stale(&over, now));
        assert!(!store.is_stale(&fresh, now));
    }
}
