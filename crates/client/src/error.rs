//! Error types for the client driver.

use ftecho_protocol::{FrameType, MetadataError, WireError};
use ftecho_transfer::TransferError;

/// Errors produced by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("connection timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    /// Text of an `E` frame, verbatim.
    #[error("{0}")]
    Server(String),

    /// An `E` reply to an upload whose data frames were already sent.
    ///
    /// The server may have rejected the upload before reading all of
    /// them, so further `E` replies can still be queued.
    #[error("{0}")]
    ServerAborted(String),

    #[error("unexpected response type: {0}")]
    UnexpectedFrame(FrameType),

    #[error("Checksum mismatch: local={local}, remote={remote}")]
    ChecksumMismatch { local: String, remote: String },

    #[error("invalid checksum from server: {0}")]
    InvalidDigest(String),

    #[error("Offset mismatch: expected {expected}, local file has {actual}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("invalid response metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl ClientError {
    /// Returns `true` if the connection is no longer at a command boundary.
    ///
    /// Server rejections, digest mismatches and local argument errors leave
    /// the connection usable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Wire(_)
                | Self::Timeout
                | Self::ServerAborted(_)
                | Self::UnexpectedFrame(_)
                | Self::Metadata(_)
                | Self::Transfer(_)
        )
    }
}
