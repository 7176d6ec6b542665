//! TCP request/response server over the assignment table

use std::net::SocketAddr;
use std::sync::Arc;

use shardmaster_store::AssignmentStore;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::wire::{ApiRequest, ApiResponse, AssignmentRecord, read_frame, write_frame};
use crate::ServiceError;

/// Serves assignment lookups to query-routing clients.
///
/// Each connection is handled by its own task and may carry any number of
/// requests; each request is independent and stateless. All reads go straight
/// to the [`AssignmentStore`], so clients always see the most recently
/// committed state.
#[derive(Debug)]
pub struct AssignmentServer {
    store: AssignmentStore,
    listen_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    listener_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
    connections: TaskTracker,
}

impl AssignmentServer {
    /// Create a server over `store`, to be bound on `listen_addr`.
    ///
    /// Port 0 binds an ephemeral port; the actual address is returned by
    /// [`Self::start`].
    pub fn new(store: AssignmentStore, listen_addr: SocketAddr) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            listen_addr,
            shutdown_tx,
            listener_handle: Arc::new(RwLock::new(None)),
            connections: TaskTracker::new(),
        }
    }

    /// Bind the listener and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, ServiceError> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| ServiceError::Io("error binding listener", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServiceError::Io("error reading local address", e))?;
        info!("assignment service listening on {}", local_addr);

        let store = self.store.clone();
        let connections = self.connections.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                debug!("accepted connection from {}", addr);
                                let store = store.clone();
                                connections.spawn(async move {
                                    if let Err(e) = Self::handle_connection(stream, store).await {
                                        warn!("connection from {} failed: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("assignment service listener shutting down");
                        break;
                    }
                }
            }
        });

        *self.listener_handle.write().await = Some(handle);
        Ok(local_addr)
    }

    /// Stop accepting connections and drain in-flight requests.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.listener_handle.write().await.take() {
            if let Err(e) = handle.await {
                warn!("listener task failed: {}", e);
            }
        }

        self.connections.close();
        if tokio::time::timeout(Duration::from_secs(5), self.connections.wait())
            .await
            .is_err()
        {
            warn!("connections did not drain before timeout");
        }
    }

    /// Serve requests on one connection until the client disconnects.
    async fn handle_connection(
        mut stream: TcpStream,
        store: AssignmentStore,
    ) -> Result<(), ServiceError> {
        while let Some(request) = read_frame::<_, ApiRequest>(&mut stream).await? {
            let response = Self::handle_request(&store, request).await;
            write_frame(&mut stream, &response).await?;
        }
        Ok(())
    }

    /// Answer one request. Failures become an error response; they never
    /// tear down the connection.
    async fn handle_request(store: &AssignmentStore, request: ApiRequest) -> ApiResponse {
        match request {
            ApiRequest::GetAssignment {
                dataset,
                shard_path,
            } => match store.shard_hosts(&dataset, &shard_path).await {
                Ok(hosts) => ApiResponse::Hosts(hosts),
                Err(e) => {
                    warn!("get assignment failed for {}/{}: {}", dataset, shard_path, e);
                    ApiResponse::Error(e.to_string())
                }
            },
            ApiRequest::ListAssignments { dataset } => {
                match store.current_assignments(&dataset).await {
                    Ok(rows) => ApiResponse::Assignments(
                        rows.into_iter()
                            .map(|row| AssignmentRecord {
                                shard_path: row.shard_path,
                                assigned_host: row.assigned_host,
                                last_updated: row.last_updated,
                            })
                            .collect(),
                    ),
                    Err(e) => {
                        warn!("list assignments failed for {}: {}", dataset, e);
                        ApiResponse::Error(e.to_string())
                    }
                }
            }
        }
    }
}
