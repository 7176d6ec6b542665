//! Endpoint discovery seam

use std::path::PathBuf;

use async_trait::async_trait;
use shardmaster_membership::Host;
use tracing::info;

use crate::ServiceError;

/// Where a running daemon advertises its service endpoint.
///
/// Clients enumerate the registry namespace to find live servers. A
/// registration must be removed on clean shutdown; crashed daemons leave
/// their entry behind until an operator or external reaper clears it.
#[async_trait]
pub trait EndpointRegistry
where
    Self: Send + Sync,
{
    /// Errors thrown by the registry.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Advertise `endpoint` as a live assignment service.
    async fn register(&self, endpoint: &Host) -> Result<(), Self::Error>;

    /// Withdraw a previous registration of `endpoint`.
    async fn deregister(&self, endpoint: &Host) -> Result<(), Self::Error>;

    /// All currently advertised endpoints.
    async fn endpoints(&self) -> Result<Vec<Host>, Self::Error>;
}

/// Registry backed by marker files in a shared directory.
///
/// Each registered endpoint owns one file named after it. Suited to
/// single-machine and NFS-style deployments.
#[derive(Clone, Debug)]
pub struct FsEndpointRegistry {
    namespace: PathBuf,
}

impl FsEndpointRegistry {
    /// Create a registry rooted at `namespace`. The directory is created on
    /// first registration.
    pub fn new(namespace: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    fn marker_path(&self, endpoint: &Host) -> PathBuf {
        self.namespace.join(endpoint.to_string())
    }
}

#[async_trait]
impl EndpointRegistry for FsEndpointRegistry {
    type Error = ServiceError;

    async fn register(&self, endpoint: &Host) -> Result<(), Self::Error> {
        tokio::fs::create_dir_all(&self.namespace)
            .await
            .map_err(|e| ServiceError::Io("error creating registry namespace", e))?;
        tokio::fs::write(self.marker_path(endpoint), [])
            .await
            .map_err(|e| ServiceError::Io("error writing registry marker", e))?;
        info!("registered endpoint {}", endpoint);
        Ok(())
    }

    async fn deregister(&self, endpoint: &Host) -> Result<(), Self::Error> {
        match tokio::fs::remove_file(self.marker_path(endpoint)).await {
            Ok(()) => {
                info!("deregistered endpoint {}", endpoint);
                Ok(())
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::Io("error removing registry marker", e)),
        }
    }

    async fn endpoints(&self) -> Result<Vec<Host>, Self::Error> {
        let mut entries = match tokio::fs::read_dir(&self.namespace).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ServiceError::Io("error reading registry namespace", e)),
        };

        let mut endpoints = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServiceError::Io("error reading registry entry", e))?
        {
            let name = entry.file_name();
            if let Some(text) = name.to_str() {
                if let Ok(endpoint) = text.parse::<Host>() {
                    endpoints.push(endpoint);
                }
            }
        }

        endpoints.sort();
        Ok(endpoints)
    }
}
