//! Shardmaster daemon binary.
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use shardmaster_daemon::{DaemonConfig, DaemonError, run_daemon};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Host name advertised to clients
    #[arg(long, default_value = "localhost", env = "SHARDMASTER_ADVERTISED_HOST")]
    advertised_host: String,

    /// Root directory of the shard catalog
    #[arg(long, env = "SHARDMASTER_DATA_ROOT")]
    data_root: PathBuf,

    /// Only serve datasets whose name starts with this prefix
    #[arg(long, env = "SHARDMASTER_DATASET_PREFIX")]
    dataset_prefix: Option<String>,

    /// Path of the assignment database
    #[arg(long, env = "SHARDMASTER_DB_PATH")]
    db_path: PathBuf,

    /// Path of the local membership checkpoint
    #[arg(long, env = "SHARDMASTER_HOSTS_CHECKPOINT")]
    hosts_checkpoint: PathBuf,

    /// Reject candidate host sets shrinking past this ratio
    #[arg(long, default_value_t = 0.5, env = "SHARDMASTER_HOSTS_DROP_RATIO")]
    hosts_drop_ratio: f64,

    /// File listing cluster members, one name:port per line
    #[arg(long, env = "SHARDMASTER_MEMBERS_FILE")]
    members_file: PathBuf,

    /// Seconds between membership polls
    #[arg(
        long,
        default_value_t = 60,
        env = "SHARDMASTER_MEMBERSHIP_REFRESH_INTERVAL_SECS"
    )]
    membership_refresh_interval_secs: u64,

    /// Port the assignment service listens on (0 for ephemeral)
    #[arg(long, default_value_t = 0, env = "SHARDMASTER_PORT")]
    port: u16,

    /// Seconds between reconciliation passes
    #[arg(long, default_value_t = 900, env = "SHARDMASTER_REFRESH_INTERVAL_SECS")]
    refresh_interval_secs: u64,

    /// Directory of the endpoint registry
    #[arg(long, env = "SHARDMASTER_REGISTRY_DIR")]
    registry_dir: PathBuf,

    /// Number of hosts each shard is assigned to
    #[arg(long, default_value_t = 3, env = "SHARDMASTER_REPLICATION_FACTOR")]
    replication_factor: usize,

    /// Seconds after which an untouched assignment row is refreshed
    #[arg(
        long,
        default_value_t = 3600,
        env = "SHARDMASTER_STALENESS_THRESHOLD_SECS"
    )]
    staleness_threshold_secs: u64,

    /// Maximum number of datasets reconciled concurrently
    #[arg(long, default_value_t = 5, env = "SHARDMASTER_WORKER_POOL_SIZE")]
    worker_pool_size: usize,
}

impl From<Args> for DaemonConfig {
    fn from(args: Args) -> Self {
        Self {
            advertised_host: args.advertised_host,
            data_root: args.data_root,
            dataset_prefix: args.dataset_prefix,
            db_path: args.db_path,
            hosts_checkpoint: args.hosts_checkpoint,
            hosts_drop_ratio: args.hosts_drop_ratio,
            members_file: args.members_file,
            membership_refresh_interval: Duration::from_secs(
                args.membership_refresh_interval_secs,
            ),
            port: args.port,
            refresh_interval: Duration::from_secs(args.refresh_interval_secs),
            registry_dir: args.registry_dir,
            replication_factor: args.replication_factor,
            staleness_threshold: Duration::from_secs(args.staleness_threshold_secs),
            worker_pool_size: args.worker_pool_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = DaemonConfig::from(args);

    let shutdown_token = CancellationToken::new();

    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        if cfg!(unix) {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler failed");
            let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler failed");

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
        } else {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt signal");
        }

        signal_shutdown_token.cancel();
    });

    run_daemon(config, shutdown_token).await
}
