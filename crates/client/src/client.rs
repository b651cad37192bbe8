//! Connection-holding client driver.
//!
//! A [`Client`] owns at most one TCP connection and runs one command at a
//! time over it. Every operation reads the server's terminal frame before
//! returning, so the connection is always left at a command boundary
//! unless the operation fails with a transport-level error, in which case
//! the connection is dropped.

use std::path::Path;

use ftecho_protocol::messages::{from_payload, parse_listing, to_payload};
use ftecho_protocol::{
    Direction, Frame, FrameType, GetAck, ListingEntry, PutRequest, ResumeRequest, read_frame,
    write_frame,
};
use ftecho_transfer::{ChunkReader, ChunkWriter, is_hex_digest, validate_file_name};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::{CONNECT_TIMEOUT, TransferSummary};

/// One open connection to a server.
struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl Link {
    /// Queues a frame without flushing.
    async fn write(&mut self, frame: &Frame) -> Result<(), ClientError> {
        write_frame(&mut self.writer, frame).await?;
        Ok(())
    }

    /// Writes a frame and flushes it to the socket.
    async fn send(&mut self, frame: &Frame) -> Result<(), ClientError> {
        self.write(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame, ClientError> {
        let frame = read_frame(&mut self.reader).await?;
        debug!(frame_type = %frame.frame_type, len = frame.payload.len(), "received");
        Ok(frame)
    }

    /// Reads a reply that must be `O`. An `E` reply becomes [`ClientError::Server`].
    async fn expect_ok(&mut self) -> Result<Frame, ClientError> {
        let frame = self.recv().await?;
        match frame.frame_type {
            FrameType::Ok => Ok(frame),
            FrameType::Error => Err(ClientError::Server(frame.text())),
            other => Err(ClientError::UnexpectedFrame(other)),
        }
    }
}

/// FT-Echo client.
pub struct Client {
    addr: String,
    link: Option<Link>,
}

impl Client {
    /// Creates a disconnected client for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            link: None,
        }
    }

    /// Creates a client and connects it.
    pub async fn connect_to(addr: impl Into<String>) -> Result<Self, ClientError> {
        let mut client = Self::new(addr);
        client.connect().await?;
        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Opens the connection, replacing any existing one.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::Timeout),
        };
        stream.set_nodelay(true)?;
        info!(addr = %self.addr, "connected");

        let (reader, writer) = stream.into_split();
        self.link = Some(Link {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        });
        Ok(())
    }

    /// Drops the connection without sending `Q`.
    pub fn close(&mut self) {
        if self.link.take().is_some() {
            debug!(addr = %self.addr, "connection closed");
        }
    }

    /// Says goodbye and closes. Failures are logged and otherwise ignored.
    pub async fn quit(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        let result: Result<Frame, ClientError> = async {
            link.send(&Frame::empty(FrameType::Quit)).await?;
            link.expect_ok().await
        }
        .await;
        match result {
            Ok(reply) => info!(addr = %self.addr, reply = %reply.text(), "disconnected"),
            Err(e) => debug!(addr = %self.addr, "quit failed: {e}"),
        }
    }

    /// Lists committed files on the server.
    pub async fn list(&mut self) -> Result<Vec<ListingEntry>, ClientError> {
        let link = self.link()?;
        let result = list_exchange(link).await;
        self.settle(result)
    }

    /// Downloads `name` into `dest`.
    ///
    /// With `resume`, `dest` must already hold exactly `offset` bytes (a
    /// missing file counts as empty); the remainder is appended and the
    /// digest still covers the whole file.
    pub async fn get(
        &mut self,
        name: &str,
        dest: &Path,
        resume: bool,
        offset: u64,
    ) -> Result<TransferSummary, ClientError> {
        let offset = if resume {
            let local = local_len(dest).await?;
            if local != offset {
                return Err(ClientError::OffsetMismatch {
                    expected: offset,
                    actual: local,
                });
            }
            Some(offset)
        } else {
            None
        };

        let link = self.link()?;
        let result = get_exchange(link, name, dest, offset).await;
        self.settle(result)
    }

    /// Uploads `src` under its file name.
    ///
    /// With `resume`, the server's staged upload must hold exactly `offset`
    /// bytes; only `[offset, len)` is sent.
    pub async fn put(
        &mut self,
        src: &Path,
        resume: bool,
        offset: u64,
    ) -> Result<TransferSummary, ClientError> {
        let name = remote_name(src)?;
        self.put_as(&name, src, resume, offset).await
    }

    /// Uploads `src` under `name`.
    pub async fn put_as(
        &mut self,
        name: &str,
        src: &Path,
        resume: bool,
        offset: u64,
    ) -> Result<TransferSummary, ClientError> {
        validate_file_name(name).map_err(|_| ClientError::InvalidPath(name.to_string()))?;
        let reader = if resume {
            ChunkReader::open_at(src, offset).await?
        } else {
            ChunkReader::open(src).await?
        };

        let link = self.link()?;
        let result = put_exchange(link, name, reader, resume).await;
        self.settle(result)
    }

    fn link(&mut self) -> Result<&mut Link, ClientError> {
        self.link.as_mut().ok_or(ClientError::NotConnected)
    }

    /// Drops the connection if `result` left it in an unknown state.
    fn settle<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            if e.is_transport() {
                debug!(addr = %self.addr, "dropping connection after: {e}");
                self.link = None;
            }
        }
        result
    }
}

async fn list_exchange(link: &mut Link) -> Result<Vec<ListingEntry>, ClientError> {
    link.send(&Frame::empty(FrameType::List)).await?;
    let reply = link.expect_ok().await?;
    Ok(parse_listing(&reply.payload)?)
}

async fn get_exchange(
    link: &mut Link,
    name: &str,
    dest: &Path,
    offset: Option<u64>,
) -> Result<TransferSummary, ClientError> {
    let request = match offset {
        Some(offset) => Frame::new(
            FrameType::Resume,
            to_payload(&ResumeRequest {
                filename: name.to_string(),
                offset,
                direction: Direction::Get,
            })?,
        ),
        None => Frame::new(FrameType::Get, name.as_bytes().to_vec()),
    };
    link.send(&request).await?;

    let ack: GetAck = from_payload(&link.expect_ok().await?.payload)?;
    debug!(file = %name, size = ack.size, offset = ?ack.offset, "download accepted");

    let mut writer = match offset {
        Some(_) => ChunkWriter::append(dest).await?,
        None => ChunkWriter::create(dest).await?,
    };
    let start = writer.written();

    loop {
        let frame = link.recv().await?;
        match frame.frame_type {
            FrameType::FileData => writer.write_chunk(&frame.payload).await?,
            FrameType::Checksum => {
                let remote = server_digest(&frame)?;
                let size = writer.written() - start;
                let local = writer.finish().await?;
                if local != remote {
                    return Err(ClientError::ChecksumMismatch { local, remote });
                }
                info!(file = %name, size, sha = %local, "download complete");
                return Ok(TransferSummary { sha: local, size });
            }
            FrameType::Error => return Err(ClientError::Server(frame.text())),
            other => return Err(ClientError::UnexpectedFrame(other)),
        }
    }
}

async fn put_exchange(
    link: &mut Link,
    name: &str,
    mut reader: ChunkReader,
    resume: bool,
) -> Result<TransferSummary, ClientError> {
    let payload = if resume {
        to_payload(&ResumeRequest {
            filename: name.to_string(),
            offset: reader.offset(),
            direction: Direction::Put,
        })?
    } else {
        to_payload(&PutRequest {
            filename: name.to_string(),
            size: reader.file_size(),
        })?
    };
    let frame_type = if resume {
        FrameType::Resume
    } else {
        FrameType::Put
    };
    link.send(&Frame::new(frame_type, payload)).await?;

    let ack = link.expect_ok().await?;
    debug!(file = %name, ack = %ack.text(), "upload accepted");

    let mut size = 0u64;
    while let Some(chunk) = reader.next_chunk().await? {
        link.write(&Frame::file_data(&chunk)).await?;
        size += chunk.len() as u64;
    }

    let local = reader.finish();
    link.send(&Frame::checksum(&local)).await?;

    let reply = link.recv().await?;
    let remote = match reply.frame_type {
        FrameType::Ok => server_digest(&reply)?,
        FrameType::Error if size > 0 => return Err(ClientError::ServerAborted(reply.text())),
        FrameType::Error => return Err(ClientError::Server(reply.text())),
        other => return Err(ClientError::UnexpectedFrame(other)),
    };
    if remote != local {
        return Err(ClientError::ChecksumMismatch { local, remote });
    }
    info!(file = %name, size, sha = %local, "upload complete");
    Ok(TransferSummary { sha: local, size })
}

/// The digest carried by a server `S` frame or upload `O` reply.
fn server_digest(frame: &Frame) -> Result<String, ClientError> {
    let digest = frame.text();
    if !is_hex_digest(&digest) {
        return Err(ClientError::InvalidDigest(digest));
    }
    Ok(digest)
}

/// Remote name of a local upload: its final path component.
fn remote_name(src: &Path) -> Result<String, ClientError> {
    let name = src
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::InvalidPath(src.display().to_string()))?;
    validate_file_name(name).map_err(|_| ClientError::InvalidPath(name.to_string()))?;
    Ok(name.to_string())
}

/// Size of a local file, treating a missing file as empty.
async fn local_len(path: &Path) -> Result<u64, ClientError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
