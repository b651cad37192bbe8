use std::path::{Component, Path};

use ftecho_protocol::constants::PART_SUFFIX;

use crate::TransferError;

/// Validates a name in the flat storage namespace.
///
/// Rejects:
/// - Empty names
/// - Anything with a path separator (`/` or `\`) or NUL byte
/// - Control characters, which would break the line-based LIST reply
/// - `.` and `..`
/// - Windows prefix components (`C:`)
/// - Names ending in `.part`, which are reserved for staged uploads
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidName(format!(
            "control characters not allowed: {}",
            name.escape_debug()
        )));
    }

    if name.ends_with(PART_SUFFIX) {
        return Err(TransferError::InvalidName(format!(
            "reserved suffix {PART_SUFFIX}: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(name.to_string())),
    }
}
