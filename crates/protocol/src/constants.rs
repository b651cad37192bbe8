/// Default TCP port for the FT-Echo server.
pub const DEFAULT_PORT: u16 = 9000;

/// Maximum file bytes carried by a single `F` frame.
pub const CHUNK_SIZE: usize = 4096;

/// Size of the big-endian length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Suffix of a staged (uncommitted) upload in the storage root.
pub const PART_SUFFIX: &str = ".part";

/// `O` payload acknowledging a PUT command.
pub const READY_TO_RECEIVE: &str = "Ready to receive";

/// `O` payload acknowledging a QUIT command.
pub const GOODBYE: &str = "Goodbye";

/// `E` payload for an `S` frame received outside an upload.
pub const UNEXPECTED_CHECKSUM: &str = "unexpected checksum message";
