//! Filesystem type detection via raw magic-number signatures.
//!
//! Classification has to work before mounting and before tool availability
//! is known, so this reads a bounded prefix of the device and compares byte
//! ranges against each adapter's signature table. No write access is needed.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::FilesystemAdapter;
use crate::error::FsError;
use crate::types::FsMagicSignature;

/// Largest signature end offset across all supported filesystems: the btrfs
/// magic at 65600 plus its 8 magic bytes.
pub const MAX_DEVICE_READ_LENGTH: usize = 65_608;

/// Determine the filesystem type of a block device by magic numbers.
///
/// Scans the priority-ordered adapter list and returns the name of the first
/// adapter with an exact signature match. A device may legitimately match
/// several adapters' tables; callers wanting all candidates should probe
/// adapters individually via [`device_matches_signatures`].
pub fn detect_filesystem_type(
    device_path: &str,
    adapters: &[Arc<dyn FilesystemAdapter>],
) -> Result<String, FsError> {
    let buffer = read_device_prefix(device_path)?;
    if buffer.is_empty() {
        return Err(FsError::UnknownFilesystem(device_path.to_string()));
    }

    for adapter in adapters {
        for sig in adapter.signatures() {
            if signature_matches(&buffer, sig) {
                debug!(
                    device = device_path,
                    fstype = adapter.name(),
                    offset = sig.offset,
                    "signature match"
                );
                return Ok(adapter.name().to_string());
            }
        }
    }

    Err(FsError::UnknownFilesystem(device_path.to_string()))
}

/// Check one adapter's signature set against a device. No match (including
/// an empty or undersized device) is `Ok(false)`, not an error.
pub fn device_matches_signatures(
    device_path: &str,
    signatures: &[FsMagicSignature],
) -> Result<bool, FsError> {
    if signatures.is_empty() {
        return Ok(false);
    }

    let buffer = read_device_prefix(device_path)?;
    if buffer.is_empty() {
        return Ok(false);
    }

    Ok(signatures.iter().any(|sig| signature_matches(&buffer, sig)))
}

/// A signature whose byte range does not fit inside the bytes actually read
/// is skipped, never matched.
fn signature_matches(buffer: &[u8], sig: &FsMagicSignature) -> bool {
    let start = sig.offset as usize;
    let end = start + sig.magic.len();
    if end > buffer.len() {
        return false;
    }
    &buffer[start..end] == sig.magic
}

fn read_device_prefix(device_path: &str) -> Result<Vec<u8>, FsError> {
    let path = Path::new(device_path);
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FsError::DeviceNotFound(device_path.to_string()));
        }
        Err(e) => {
            return Err(FsError::DeviceAccess {
                path: device_path.to_string(),
                source: e,
            });
        }
    };

    let mut buffer = Vec::with_capacity(MAX_DEVICE_READ_LENGTH);
    file.take(MAX_DEVICE_READ_LENGTH as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| FsError::DeviceAccess {
            path: device_path.to_string(),
            source: e,
        })?;

    Ok(buffer)
}
