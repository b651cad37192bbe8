use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Payload of a `P` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub filename: String,
    pub size: u64,
}

/// Which way a resumed transfer flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server to client.
    Get,
    /// Client to server.
    Put,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("get"),
            Self::Put => f.write_str("put"),
        }
    }
}

/// Payload of an `R` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub filename: String,
    pub offset: u64,
    pub direction: Direction,
}

// ---------------------------------------------------------------------------
// Acknowledgement payloads
// ---------------------------------------------------------------------------

/// `O` payload acknowledging a GET or GET-RESUME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAck {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// `O` payload acknowledging a PUT-RESUME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResumeAck {
    pub offset: u64,
    pub ready: bool,
}

// ---------------------------------------------------------------------------
// JSON payload helpers
// ---------------------------------------------------------------------------

/// Serializes a structured payload to its wire bytes.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, MetadataError> {
    Ok(serde_json::to_vec(value)?)
}

/// Parses a structured payload from its wire bytes.
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, MetadataError> {
    Ok(serde_json::from_slice(payload)?)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// A committed file as reported by LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub size: u64,
}

/// Renders entries as `name|size` lines, each terminated by `\n`.
///
/// No entries renders as a single `\n`.
pub fn encode_listing(entries: &[ListingEntry]) -> String {
    if entries.is_empty() {
        return "\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.name);
        out.push('|');
        out.push_str(&entry.size.to_string());
        out.push('\n');
    }
    out
}

/// Parses LIST text. Blank lines are ignored.
pub fn parse_listing(payload: &[u8]) -> Result<Vec<ListingEntry>, MetadataError> {
    let text = std::str::from_utf8(payload).map_err(|_| MetadataError::Utf8)?;

    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        // Size is always the trailing field.
        let (name, size) = line
            .rsplit_once('|')
            .ok_or_else(|| MetadataError::Listing(line.to_string()))?;
        let size = size
            .trim()
            .parse::<u64>()
            .map_err(|_| MetadataError::Listing(line.to_string()))?;
        entries.push(ListingEntry {
            name: name.to_string(),
            size,
        });
    }
    Ok(entries)
}
