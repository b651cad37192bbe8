//! FT-Echo listener.
//!
//! Binds a TCP port and spawns one [`Connection`] task per accepted
//! client. There is no cap on concurrent clients.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ftecho_protocol::constants::DEFAULT_PORT;
use ftecho_transfer::Storage;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::connection::Connection;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind_addr: SocketAddr,
    /// Directory holding committed files and staged uploads.
    pub storage_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            storage_root: PathBuf::from("storage"),
        }
    }
}

/// A bound FT-Echo server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    storage: Arc<Storage>,
    cancel: CancellationToken,
}

impl Server {
    /// Binds the listener. Connections are not accepted until [`run`](Self::run).
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            storage: Arc::new(Storage::new(config.storage_root)),
            cancel: CancellationToken::new(),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Token that stops the accept loop when cancelled.
    ///
    /// Connections already running finish on their own tasks.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accepts connections until the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            addr = %self.local_addr,
            storage = %self.storage.root().display(),
            "FT-Echo server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let storage = Arc::clone(&self.storage);
                            tokio::spawn(async move {
                                if let Err(e) = serve_stream(stream, peer_addr, storage).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }
}

async fn serve_stream(
    stream: TcpStream,
    peer_addr: SocketAddr,
    storage: Arc<Storage>,
) -> Result<(), ServerError> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Connection::new(reader, writer, storage, peer_addr.to_string())
        .serve()
        .await
}
