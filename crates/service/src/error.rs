use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A frame body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame exceeded the size cap.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The server answered a request with a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// Assignment store failure.
    #[error(transparent)]
    Store(#[from] shardmaster_store::StoreError),

    /// The server answered with a response of the wrong kind.
    #[error("unexpected response kind")]
    UnexpectedResponse,
}
