//! Bootstraps all control-plane components into one process.
//!
//! Startup order matters: the store must open before anything writes to it,
//! membership must have a snapshot before the first reconciliation pass, and
//! the endpoint is only advertised once the first pass has completed and the
//! server is accepting connections.
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shardmaster_catalog::{AcceptAll, DatasetPrefix, FsShardCatalog};
use shardmaster_membership::{
    FileMembershipSource, Host, MembershipTracker, MembershipTrackerConfig,
};
use shardmaster_placement::RendezvousPlacer;
use shardmaster_refresher::{AssignmentRefresher, RefresherConfig};
use shardmaster_service::{AssignmentServer, EndpointRegistry, FsEndpointRegistry};
use shardmaster_store::AssignmentStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors fatal to daemon startup or shutdown.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Membership tracker failure.
    #[error(transparent)]
    Membership(#[from] shardmaster_membership::MembershipError),

    /// Initial reconciliation pass failure.
    #[error(transparent)]
    Refresher(#[from] shardmaster_refresher::RefresherError),

    /// Assignment service failure.
    #[error(transparent)]
    Service(#[from] shardmaster_service::ServiceError),

    /// Assignment store failure.
    #[error(transparent)]
    Store(#[from] shardmaster_store::StoreError),
}

/// Configuration for one daemon instance.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Host name advertised to clients via the endpoint registry.
    pub advertised_host: String,

    /// Root directory of the shard catalog.
    pub data_root: PathBuf,

    /// Only serve datasets whose name starts with this prefix.
    pub dataset_prefix: Option<String>,

    /// Path of the assignment database.
    pub db_path: PathBuf,

    /// Path of the local membership checkpoint.
    pub hosts_checkpoint: PathBuf,

    /// Candidate host sets shrinking past this ratio are rejected.
    pub hosts_drop_ratio: f64,

    /// File listing cluster members, one `name:port` per line.
    pub members_file: PathBuf,

    /// Interval at which the membership source is polled.
    pub membership_refresh_interval: Duration,

    /// Port the assignment service listens on. Zero binds an ephemeral port.
    pub port: u16,

    /// Interval between reconciliation passes.
    pub refresh_interval: Duration,

    /// Directory of the endpoint registry.
    pub registry_dir: PathBuf,

    /// Number of hosts each shard is assigned to.
    pub replication_factor: usize,

    /// Assignment rows older than this are refreshed in place.
    pub staleness_threshold: Duration,

    /// Maximum number of datasets reconciled concurrently.
    pub worker_pool_size: usize,
}

/// Run the daemon until `shutdown_token` is cancelled.
///
/// # Errors
///
/// Returns an error if any component fails to start. Failures after startup
/// are handled by the components themselves.
pub async fn run_daemon(
    config: DaemonConfig,
    shutdown_token: CancellationToken,
) -> Result<(), DaemonError> {
    let store = AssignmentStore::connect(&config.db_path, config.staleness_threshold).await?;
    info!("assignment store open at {}", config.db_path.display());

    let source = Arc::new(FileMembershipSource::new(&config.members_file));
    let mut tracker_config = MembershipTrackerConfig::new(&config.hosts_checkpoint);
    tracker_config.drop_ratio = config.hosts_drop_ratio;
    tracker_config.refresh_interval = config.membership_refresh_interval;
    let tracker = Arc::new(MembershipTracker::new(source, tracker_config));
    tracker.start().await?;

    let catalog = Arc::new(match &config.dataset_prefix {
        Some(prefix) => FsShardCatalog::new(&config.data_root, DatasetPrefix::new(prefix)),
        None => FsShardCatalog::new(&config.data_root, AcceptAll),
    });
    let placer = Arc::new(RendezvousPlacer::new(config.replication_factor));

    let refresher = AssignmentRefresher::new(
        catalog,
        Arc::clone(&tracker),
        placer,
        store.clone(),
        RefresherConfig {
            refresh_interval: config.refresh_interval,
            worker_pool_size: config.worker_pool_size,
        },
    );
    refresher.initialize().await?;
    refresher.start().await;

    let listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
    let server = AssignmentServer::new(store, listen_addr);
    let bound_addr = server.start().await?;

    let endpoint = Host::new(&config.advertised_host, bound_addr.port());
    let registry = FsEndpointRegistry::new(&config.registry_dir);
    registry.register(&endpoint).await?;

    info!("daemon ready, serving as {}", endpoint);
    shutdown_token.cancelled().await;
    info!("daemon shutting down");

    if let Err(e) = registry.deregister(&endpoint).await {
        warn!("failed to deregister endpoint: {}", e);
    }
    server.shutdown().await;
    refresher.shutdown().await;
    tracker.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use shardmaster_service::AssignmentClient;

    async fn write_fixture(root: &std::path::Path) -> DaemonConfig {
        tokio::fs::write(root.join("members"), "h1:9000\nh2:9000\nh3:9000\n")
            .await
            .unwrap();

        let data_root = root.join("data");
        for shard in ["shard.0", "shard.1"] {
            tokio::fs::create_dir_all(data_root.join("events").join(shard))
                .await
                .unwrap();
        }

        DaemonConfig {
            advertised_host: "localhost".to_string(),
            data_root,
            dataset_prefix: None,
            db_path: root.join("assignments.db"),
            hosts_checkpoint: root.join("hosts.checkpoint"),
            hosts_drop_ratio: 0.5,
            members_file: root.join("members"),
            membership_refresh_interval: Duration::from_secs(60),
            port: 0,
            refresh_interval: Duration::from_secs(900),
            registry_dir: root.join("endpoints"),
            replication_factor: 2,
            staleness_threshold: Duration::from_secs(3600),
            worker_pool_size: 5,
        }
    }

    #[tokio::test]
    async fn test_daemon_serves_after_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_fixture(dir.path()).await;
        let registry = FsEndpointRegistry::new(config.registry_dir.clone());

        let shutdown = CancellationToken::new();
        let daemon = tokio::spawn(run_daemon(config, shutdown.clone()));

        // Wait for the endpoint to be advertised, which happens last.
        let endpoint = loop {
            let endpoints = registry.endpoints().await.unwrap();
            if let Some(endpoint) = endpoints.first() {
                break endpoint.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        let mut client = AssignmentClient::connect(("127.0.0.1", endpoint.port))
            .await
            .unwrap();
        let hosts = client.get_assignment("events", "events/shard.0").await.unwrap();
        assert_eq!(hosts.len(), 2);

        shutdown.cancel();
        daemon.await.unwrap().unwrap();

        // Clean shutdown withdraws the registration.
        assert!(registry.endpoints().await.unwrap().is_empty());
    }
}
