//! Flat-namespace file store with staged uploads.
//!
//! A committed file lives at `<root>/<name>`. An upload in progress lives at
//! `<root>/<name>.part` and becomes visible only when [`Storage::commit`]
//! renames it over the committed name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ftecho_protocol::ListingEntry;
use ftecho_protocol::constants::PART_SUFFIX;
use tracing::debug;

use crate::chunked::{ChunkReader, ChunkWriter};
use crate::{TransferError, validate_file_name};

/// File store rooted at one directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if it does not exist.
    pub async fn ensure_root(&self) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Path of the committed file `name`.
    pub fn committed_path(&self, name: &str) -> Result<PathBuf, TransferError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Path of the staged upload for `name`.
    pub fn staged_path(&self, name: &str) -> Result<PathBuf, TransferError> {
        validate_file_name(name)?;
        Ok(self.root.join(format!("{name}{PART_SUFFIX}")))
    }

    /// Lists committed regular files, sorted by name.
    ///
    /// Staged uploads and names that are not valid UTF-8 are skipped.
    pub async fn list(&self) -> Result<Vec<ListingEntry>, TransferError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.ends_with(PART_SUFFIX) {
                continue;
            }
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => m,
                // Removed or renamed between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if metadata.is_file() {
                entries.push(ListingEntry {
                    name,
                    size: metadata.len(),
                });
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Size of the committed file `name`.
    ///
    /// Missing names and non-regular files are [`TransferError::NotFound`].
    pub async fn committed_size(&self, name: &str) -> Result<u64, TransferError> {
        let path = self.committed_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(m.len()),
            Ok(_) => Err(TransferError::NotFound(name.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TransferError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Opens the committed file `name` for streaming from `offset`.
    pub async fn open_committed(
        &self,
        name: &str,
        offset: u64,
    ) -> Result<ChunkReader, TransferError> {
        self.committed_size(name).await?;
        ChunkReader::open_at(&self.committed_path(name)?, offset).await
    }

    /// Size of the staged upload for `name`, or `None` if there is none.
    pub async fn staged_size(&self, name: &str) -> Result<Option<u64>, TransferError> {
        let path = self.staged_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(Some(m.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Starts a fresh staged upload, truncating any stale one.
    pub async fn create_staged(&self, name: &str) -> Result<ChunkWriter, TransferError> {
        ChunkWriter::create(&self.staged_path(name)?).await
    }

    /// Reopens an existing staged upload for appending.
    pub async fn append_staged(&self, name: &str) -> Result<ChunkWriter, TransferError> {
        if self.staged_size(name).await?.is_none() {
            return Err(TransferError::NoPartialUpload(name.to_string()));
        }
        ChunkWriter::append(&self.staged_path(name)?).await
    }

    /// Syncs the staged upload and renames it over the committed name.
    ///
    /// Returns the digest of the committed contents.
    pub async fn commit(&self, name: &str, writer: ChunkWriter) -> Result<String, TransferError> {
        let committed = self.committed_path(name)?;
        let staged = writer.path().to_path_buf();
        let digest = writer.finish().await?;

        tokio::fs::rename(&staged, &committed).await?;
        debug!(file = %name, "staged upload committed");
        Ok(digest)
    }

    /// Deletes the staged upload for `name`, if any.
    pub async fn discard_staged(&self, name: &str) -> Result<(), TransferError> {
        match tokio::fs::remove_file(self.staged_path(name)?).await {
            Ok(()) => {
                debug!(file = %name, "staged upload discarded");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
