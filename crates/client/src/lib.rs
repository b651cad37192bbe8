//! Client driver for the FT-Echo protocol.
//!
//! [`Client`] holds one connection across many commands. The free
//! functions ([`list_files`], [`get_file`], [`put_file`], [`resume_file`])
//! open a fresh connection, run one operation and say goodbye.

pub mod client;
pub mod error;

pub use client::Client;
pub use error::ClientError;
pub use ftecho_protocol::{Direction, ListingEntry};

use std::path::Path;
use std::time::Duration;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a completed GET or PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Hex SHA-256 of the whole file, agreed by both sides.
    pub sha: String,
    /// Bytes moved over the wire in this exchange.
    pub size: u64,
}

/// Lists committed files on the server at `addr`.
pub async fn list_files(addr: &str) -> Result<Vec<ListingEntry>, ClientError> {
    let mut client = Client::connect_to(addr).await?;
    let result = client.list().await;
    client.quit().await;
    result
}

/// Downloads `name` to `dest`.
///
/// When resuming, the offset is the current size of `dest`.
pub async fn get_file(
    addr: &str,
    name: &str,
    dest: &Path,
    resume: bool,
) -> Result<TransferSummary, ClientError> {
    let offset = if resume {
        match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        }
    } else {
        0
    };

    let mut client = Client::connect_to(addr).await?;
    let result = client.get(name, dest, resume, offset).await;
    client.quit().await;
    result
}

/// Uploads `src` under its file name.
pub async fn put_file(addr: &str, src: &Path) -> Result<TransferSummary, ClientError> {
    let mut client = Client::connect_to(addr).await?;
    let result = client.put(src, false, 0).await;
    client.quit().await;
    result
}

/// Resumes a transfer of `name` at `offset`.
///
/// For [`Direction::Get`], `path` is the local destination; for
/// [`Direction::Put`], it is the local source.
pub async fn resume_file(
    addr: &str,
    name: &str,
    offset: u64,
    direction: Direction,
    path: &Path,
) -> Result<TransferSummary, ClientError> {
    let mut client = Client::connect_to(addr).await?;
    let result = match direction {
        Direction::Get => client.get(name, path, true, offset).await,
        Direction::Put => client.put_as(name, path, true, offset).await,
    };
    client.quit().await;
    result
}
