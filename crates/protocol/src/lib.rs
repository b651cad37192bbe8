//! Wire protocol for FT-Echo file transfers.
//!
//! A single persistent TCP connection carries length-prefixed, typed
//! frames. See [`wire`] for the byte layout and [`messages`] for the
//! structured command payloads.

pub mod constants;
pub mod error;
pub mod frame;
pub mod messages;
pub mod wire;

// Re-export primary types for convenience.
pub use error::{MetadataError, WireError};
pub use frame::{Frame, FrameType, encode_frame};
pub use messages::{Direction, GetAck, ListingEntry, PutRequest, PutResumeAck, ResumeRequest};
pub use wire::{read_frame, read_frame_limited, write_frame};
