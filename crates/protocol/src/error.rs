//! Error types for the wire codec and payload parsing.

/// Transport-level failures while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("framing error: {0}")]
    Framing(String),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),
}

/// A command or acknowledgement payload could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8")]
    Utf8,

    #[error("bad listing line: {0:?}")]
    Listing(String),
}
