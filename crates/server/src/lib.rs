//! TCP server for the FT-Echo protocol.
//!
//! Accepts any number of clients. Each connection runs its own command
//! loop on a dedicated task and processes one command at a time; the
//! filesystem is the only state shared between connections.

mod connection;
mod handlers;
mod server;

#[cfg(test)]
mod test_support;

pub use connection::{Connection, ConnectionState};
pub use server::{Server, ServerConfig};

use ftecho_protocol::WireError;
use ftecho_transfer::TransferError;

/// Largest frame the server will read (16 MiB).
///
/// `F` frames carry at most 4 KiB of payload.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("{0}")]
    Protocol(String),
}

impl ServerError {
    /// Returns `true` if the connection can no longer be used.
    ///
    /// Everything else is reported to the client as an `E` frame and the
    /// command loop keeps going.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Wire(_))
    }
}
