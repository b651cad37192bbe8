use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::TransferError;
use ftecho_protocol::constants::{CHUNK_SIZE, DIGEST_HEX_LEN};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns `true` for a 64-character lowercase hex string.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Feeds up to `len` bytes from `reader` into `hasher`.
///
/// Returns the number of bytes hashed, which is short only at EOF.
async fn hash_prefix<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: u64,
    hasher: &mut Sha256,
) -> Result<u64, TransferError> {
    let mut buf = [0u8; 8192];
    let mut hashed = 0u64;
    while hashed < len {
        let want = (len - hashed).min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        hashed += n as u64;
    }
    Ok(hashed)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size chunks, keeping a running SHA-256.
///
/// When opened at an offset, the skipped prefix is hashed but not yielded,
/// so [`finish`](Self::finish) always certifies the whole file.
pub struct ChunkReader {
    file: File,
    offset: u64,
    file_size: u64,
    hasher: Sha256,
}

impl ChunkReader {
    /// Opens `path` for chunked reading from the start.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        Self::open_at(path, 0).await
    }

    /// Opens `path`, hashes `[0, offset)`, and positions at `offset`.
    pub async fn open_at(path: &Path, offset: u64) -> Result<Self, TransferError> {
        let mut file = File::open(path).await?;
        let file_size = file.metadata().await?.len();
        if offset > file_size {
            return Err(TransferError::OffsetOutOfRange {
                offset,
                size: file_size,
            });
        }

        let mut hasher = Sha256::new();
        let hashed = hash_prefix(&mut file, offset, &mut hasher).await?;
        if hashed != offset {
            return Err(TransferError::OffsetOutOfRange {
                offset,
                size: hashed,
            });
        }

        Ok(Self {
            file,
            offset,
            file_size,
            hasher,
        })
    }

    /// Reads and hashes the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let read_size = (self.file_size - self.offset).min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; read_size];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            // Truncated underneath us.
            return Ok(None);
        }
        buf.truncate(n);

        self.hasher.update(&buf);
        self.offset += n as u64;
        Ok(Some(buf))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Hex digest of every byte from the start of the file to the current offset.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Writes received chunks to a file, keeping a running SHA-256.
pub struct ChunkWriter {
    file: File,
    path: PathBuf,
    written: u64,
    hasher: Sha256,
}

impl ChunkWriter {
    /// Creates (or truncates) `path`.
    pub async fn create(path: &Path) -> Result<Self, TransferError> {
        let file = File::create(path).await?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
            hasher: Sha256::new(),
        })
    }

    /// Opens `path` for appending, seeding the digest with its current contents.
    ///
    /// A missing file is created empty.
    pub async fn append(path: &Path) -> Result<Self, TransferError> {
        let mut hasher = Sha256::new();
        let existing = match File::open(path).await {
            Ok(mut f) => hash_prefix(&mut f, u64::MAX, &mut hasher).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: existing,
            hasher,
        })
    }

    /// Writes and hashes one chunk.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        self.file.write_all(data).await?;
        self.hasher.update(data);
        self.written += data.len() as u64;
        Ok(())
    }

    /// Total bytes in the file, including any pre-existing prefix.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hex digest of the file contents so far.
    pub fn digest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Pushes buffered writes to the OS without syncing.
    pub async fn flush(&mut self) -> Result<(), TransferError> {
        self.file.flush().await?;
        Ok(())
    }

    /// Flushes and fsyncs the file, returning the final hex digest.
    pub async fn finish(mut self) -> Result<String, TransferError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(hex::encode(self.hasher.finalize()))
    }
}
