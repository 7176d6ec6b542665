//! Client side of the assignment service protocol

use shardmaster_membership::Host;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::wire::{ApiRequest, ApiResponse, AssignmentRecord, read_frame, write_frame};
use crate::ServiceError;

/// A connection to an [`crate::AssignmentServer`].
///
/// Requests are issued one at a time over the connection. The client is not
/// shareable; open one per task.
#[derive(Debug)]
pub struct AssignmentClient {
    stream: TcpStream,
}

impl AssignmentClient {
    /// Connect to a server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ServiceError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ServiceError::Io("error connecting to assignment service", e))?;
        debug!("connected to assignment service");
        Ok(Self { stream })
    }

    /// The hosts currently serving one shard, in stable order.
    ///
    /// An unknown shard yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server reports a failure,
    /// or the connection is lost.
    pub async fn get_assignment(
        &mut self,
        dataset: &str,
        shard_path: &str,
    ) -> Result<Vec<Host>, ServiceError> {
        let response = self
            .round_trip(ApiRequest::GetAssignment {
                dataset: dataset.to_string(),
                shard_path: shard_path.to_string(),
            })
            .await?;

        match response {
            ApiResponse::Hosts(hosts) => Ok(hosts),
            ApiResponse::Error(message) => Err(ServiceError::Remote(message)),
            ApiResponse::Assignments(_) => Err(ServiceError::UnexpectedResponse),
        }
    }

    /// The current assignment rows of one dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server reports a failure,
    /// or the connection is lost.
    pub async fn list_assignments(
        &mut self,
        dataset: &str,
    ) -> Result<Vec<AssignmentRecord>, ServiceError> {
        let response = self
            .round_trip(ApiRequest::ListAssignments {
                dataset: dataset.to_string(),
            })
            .await?;

        match response {
            ApiResponse::Assignments(records) => Ok(records),
            ApiResponse::Error(message) => Err(ServiceError::Remote(message)),
            ApiResponse::Hosts(_) => Err(ServiceError::UnexpectedResponse),
        }
    }

    async fn round_trip(&mut self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        write_frame(&mut self.stream, &request).await?;
        read_frame(&mut self.stream)
            .await?
            .ok_or(ServiceError::Io(
                "connection closed before response",
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            ))
    }
}
