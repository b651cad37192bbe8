//! Storage and chunk streaming for FT-Echo transfers.
//!
//! Files live in a flat directory. Uploads are staged under `<name>.part`
//! and committed by rename, so a committed name never exposes a partial
//! write. Every stream keeps a running SHA-256 so both ends can certify
//! the bytes they moved.

mod chunked;
mod storage;
mod validation;

pub use chunked::{ChunkReader, ChunkWriter, checksum_bytes, is_hex_digest};
pub use storage::Storage;
pub use validation::validate_file_name;

use ftecho_protocol::{FrameType, MetadataError};

/// Errors produced while serving or staging a transfer.
///
/// The `Display` text of each variant is sent verbatim in `E` frames.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Offset {offset} exceeds file size {size}")]
    OffsetOutOfRange { offset: u64, size: u64 },

    #[error("Size mismatch: expected {expected}, received {received}")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("Offset mismatch: expected {expected}, got {got}")]
    OffsetMismatch { expected: u64, got: u64 },

    #[error("Invalid checksum: {0}")]
    InvalidDigest(String),

    #[error("Checksum mismatch: server={server}, client={client}")]
    ChecksumMismatch { server: String, client: String },

    #[error("No partial file found for resume: {0}")]
    NoPartialUpload(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Unexpected message type: {0}")]
    UnexpectedFrame(FrameType),
}
