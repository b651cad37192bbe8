//! Per-connection command state machine.
//!
//! ```text
//! AwaitCommand --frame--> Dispatching --done/E--> AwaitCommand
//!                              |
//!                              +--Q or transport failure--> Closed
//! ```

use std::sync::Arc;

use ftecho_protocol::constants::{GOODBYE, UNEXPECTED_CHECKSUM};
use ftecho_protocol::{Frame, FrameType, WireError, read_frame_limited, write_frame};
use ftecho_transfer::Storage;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use crate::{MAX_FRAME_LEN, ServerError};

/// Where a connection is in its command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitCommand,
    Dispatching,
    Closed,
}

/// What the loop does after a command completes.
enum Flow {
    Continue,
    Close,
}

/// One client session over any byte stream.
pub struct Connection<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    pub(crate) storage: Arc<Storage>,
    pub(crate) peer: String,
    state: ConnectionState,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, storage: Arc<Storage>, peer: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            storage,
            peer: peer.into(),
            state: ConnectionState::AwaitCommand,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the command loop until QUIT or the peer goes away.
    ///
    /// A peer closing between commands is a normal end of session, not an
    /// error.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        info!(peer = %self.peer, "client connected");

        let result = self.command_loop().await;
        self.state = ConnectionState::Closed;
        let _ = self.writer.shutdown().await;

        match result {
            Ok(()) => {
                info!(peer = %self.peer, "connection closed");
                Ok(())
            }
            Err(ServerError::Wire(WireError::ConnectionClosed)) => {
                info!(peer = %self.peer, "client disconnected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn command_loop(&mut self) -> Result<(), ServerError> {
        loop {
            self.state = ConnectionState::AwaitCommand;
            let frame = self.recv().await?;

            self.state = ConnectionState::Dispatching;
            match self.dispatch(frame).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => return Ok(()),
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(peer = %self.peer, error = %e, "command failed");
                    self.send(Frame::error(&e)).await?;
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<Flow, ServerError> {
        match frame.frame_type {
            FrameType::List => self.handle_list().await?,
            FrameType::Get => {
                let name = frame.text().trim().to_string();
                self.handle_get(&name).await?;
            }
            FrameType::Put => self.handle_put(&frame.payload).await?,
            FrameType::Resume => self.handle_resume(&frame.payload).await?,
            FrameType::Quit => {
                info!(peer = %self.peer, "client requested QUIT");
                self.send(Frame::ok(GOODBYE)).await?;
                return Ok(Flow::Close);
            }
            FrameType::Checksum => {
                return Err(ServerError::Protocol(UNEXPECTED_CHECKSUM.into()));
            }
            other => {
                return Err(ServerError::Protocol(format!(
                    "Unknown message type: {other}"
                )));
            }
        }
        Ok(Flow::Continue)
    }

    /// Flushes pending output, then reads the next frame.
    ///
    /// Flushing here means a response is always on the wire before the
    /// connection waits on the peer.
    pub(crate) async fn recv(&mut self) -> Result<Frame, ServerError> {
        self.writer.flush().await.map_err(WireError::from)?;
        let frame = read_frame_limited(&mut self.reader, Some(MAX_FRAME_LEN)).await?;
        debug!(
            peer = %self.peer,
            frame_type = %frame.frame_type,
            len = frame.payload.len(),
            "received"
        );
        Ok(frame)
    }

    /// Queues a frame. Output is flushed by the next [`recv`](Self::recv).
    pub(crate) async fn send(&mut self, frame: Frame) -> Result<(), ServerError> {
        write_frame(&mut self.writer, &frame).await?;
        Ok(())
    }
}
