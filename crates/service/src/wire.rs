//! Wire protocol: 4-byte big-endian length prefix, CBOR body.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use shardmaster_membership::Host;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ServiceError;

/// Maximum accepted frame body size.
pub(crate) const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// A request from a query-routing client.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ApiRequest {
    /// Which hosts serve one shard of a dataset?
    GetAssignment {
        /// Dataset the shard belongs to.
        dataset: String,
        /// Catalog-relative shard path.
        shard_path: String,
    },
    /// List the current assignments of a dataset.
    ListAssignments {
        /// Dataset to list.
        dataset: String,
    },
}

/// One assignment row as seen by clients.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AssignmentRecord {
    /// Catalog-relative shard path.
    pub shard_path: String,
    /// Host assigned to the shard.
    pub assigned_host: Host,
    /// When the row was last written or refreshed.
    pub last_updated: DateTime<Utc>,
}

/// A response to an [`ApiRequest`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ApiResponse {
    /// Ordered replica host list; empty when the shard is unknown.
    Hosts(Vec<Host>),
    /// Assignment rows of the requested dataset.
    Assignments(Vec<AssignmentRecord>),
    /// The request failed; the connection stays usable.
    Error(String),
}

/// Write one length-prefixed CBOR frame.
pub(crate) async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), ServiceError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut body = Vec::new();
    ciborium::ser::into_writer(message, &mut body)
        .map_err(|e| ServiceError::Encode(e.to_string()))?;

    if body.len() > MAX_FRAME_SIZE {
        return Err(ServiceError::FrameTooLarge(body.len()));
    }

    writer
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .map_err(|e| ServiceError::Io("error writing frame length", e))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| ServiceError::Io("error writing frame body", e))?;
    writer
        .flush()
        .await
        .map_err(|e| ServiceError::Io("error flushing frame", e))?;

    Ok(())
}

/// Read one length-prefixed CBOR frame. Returns `None` on clean EOF.
pub(crate) async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ServiceError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ServiceError::Io("error reading frame length", e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ServiceError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| ServiceError::Io("error reading frame body", e))?;
    let body = Bytes::from(body);

    let message = ciborium::de::from_reader(body.as_ref())
        .map_err(|e| ServiceError::Decode(e.to_string()))?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let request = ApiRequest::GetAssignment {
            dataset: "events".to_string(),
            shard_path: "events/shard.0".to_string(),
        };

        let mut buffer = Vec::new();
        write_frame(&mut buffer, &request).await.unwrap();

        let mut reader = buffer.as_slice();
        let decoded: ApiRequest = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, request);

        // The stream is exhausted: next read is a clean EOF.
        let next: Option<ApiRequest> = read_frame(&mut reader).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(u32::MAX).to_be_bytes());
        buffer.extend_from_slice(&[0u8; 16]);

        let mut reader = buffer.as_slice();
        let result: Result<Option<ApiRequest>, _> = read_frame(&mut reader).await;
        assert!(matches!(result, Err(ServiceError::FrameTooLarge(_))));
    }
}
