use std::fmt;

use crate::constants::LENGTH_PREFIX_LEN;
use crate::error::WireError;

/// Frame type byte.
///
/// Unrecognized bytes are preserved in [`FrameType::Unknown`] so the server
/// can report them back instead of dropping the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// `L`: list committed files.
    List,
    /// `G`: download a file.
    Get,
    /// `P`: upload a file.
    Put,
    /// `R`: resume a download or upload.
    Resume,
    /// `S`: hex SHA-256 digest.
    Checksum,
    /// `O`: success response.
    Ok,
    /// `E`: error response.
    Error,
    /// `Q`: end the session.
    Quit,
    /// `F`: file data chunk.
    FileData,
    /// Any other byte.
    Unknown(u8),
}

impl FrameType {
    /// Returns the byte written on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::List => b'L',
            Self::Get => b'G',
            Self::Put => b'P',
            Self::Resume => b'R',
            Self::Checksum => b'S',
            Self::Ok => b'O',
            Self::Error => b'E',
            Self::Quit => b'Q',
            Self::FileData => b'F',
            Self::Unknown(b) => b,
        }
    }
}

impl From<u8> for FrameType {
    fn from(b: u8) -> Self {
        match b {
            b'L' => Self::List,
            b'G' => Self::Get,
            b'P' => Self::Put,
            b'R' => Self::Resume,
            b'S' => Self::Checksum,
            b'O' => Self::Ok,
            b'E' => Self::Error,
            b'Q' => Self::Quit,
            b'F' => Self::FileData,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.as_byte()))
    }
}

/// One length-prefixed, typed protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// A frame with no payload (`L`, `Q`).
    pub fn empty(frame_type: FrameType) -> Self {
        Self::new(frame_type, Vec::new())
    }

    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameType::Ok, payload)
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self::new(FrameType::Error, message.to_string().into_bytes())
    }

    pub fn checksum(hex_digest: &str) -> Self {
        Self::new(FrameType::Checksum, hex_digest.as_bytes())
    }

    pub fn file_data(chunk: &[u8]) -> Self {
        Self::new(FrameType::FileData, chunk)
    }

    /// Payload decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Value of the length prefix: payload length plus the type byte.
    pub fn wire_len(&self) -> Result<u32, WireError> {
        u32::try_from(self.payload.len() + 1)
            .map_err(|_| WireError::FrameTooLarge(self.payload.len() as u64 + 1))
    }

    /// Encodes as `length(4B BE) || type(1B) || payload`.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        encode_frame(self.frame_type, &self.payload)
    }
}

/// Encodes a frame without building a [`Frame`] first.
pub fn encode_frame(frame_type: FrameType, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let length = u32::try_from(payload.len() + 1)
        .map_err(|_| WireError::FrameTooLarge(payload.len() as u64 + 1))?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_LEN + 1 + payload.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.push(frame_type.as_byte());
    buf.extend_from_slice(payload);
    Ok(buf)
}
