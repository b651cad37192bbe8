//! Async frame reader/writer.
//!
//! # Wire format
//!
//! ```text
//! [4 bytes BE: LENGTH]   counts TYPE + PAYLOAD, always >= 1
//! [1 byte:     TYPE]     ASCII type byte (L G P R S O E Q F)
//! [LENGTH-1:   PAYLOAD]
//! ```
//!
//! Frame boundaries come only from the length prefix. Every read waits for
//! the exact byte count; a peer that closes early yields
//! [`WireError::ConnectionClosed`].

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{CHUNK_SIZE, LENGTH_PREFIX_LEN};
use crate::error::WireError;
use crate::frame::{Frame, FrameType};

/// Reads one frame with no upper bound on its length.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, WireError> {
    read_frame_limited(reader, None).await
}

/// Reads one frame, rejecting a length prefix above `max_len`.
///
/// The payload buffer grows as bytes arrive, so a bogus length prefix
/// does not allocate up front.
pub async fn read_frame_limited<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: Option<u32>,
) -> Result<Frame, WireError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_exact_or_closed(reader, &mut prefix).await?;
    let length = u32::from_be_bytes(prefix);

    if length < 1 {
        return Err(WireError::Framing(format!("invalid message length: {length}")));
    }
    if let Some(max) = max_len {
        if length > max {
            return Err(WireError::FrameTooLarge(u64::from(length)));
        }
    }

    let mut type_byte = [0u8; 1];
    read_exact_or_closed(reader, &mut type_byte).await?;

    let payload_len = u64::from(length - 1);
    let mut payload = Vec::with_capacity(payload_len.min(CHUNK_SIZE as u64) as usize);
    (&mut *reader)
        .take(payload_len)
        .read_to_end(&mut payload)
        .await?;
    if (payload.len() as u64) < payload_len {
        return Err(WireError::ConnectionClosed);
    }

    Ok(Frame {
        frame_type: FrameType::from(type_byte[0]),
        payload,
    })
}

/// Writes one frame. Does not flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), WireError> {
    let length = frame.wire_len()?;
    writer.write_u32(length).await?;
    writer.write_u8(frame.frame_type.as_byte()).await?;
    writer.write_all(&frame.payload).await?;
    Ok(())
}

async fn read_exact_or_closed<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), WireError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(WireError::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}
