use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-host snapshot of what an adapter can currently do. Computed on
/// demand by probing PATH and the kernel filesystem list, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemSupport {
    pub can_mount: bool,
    pub can_format: bool,
    pub can_check: bool,
    pub can_set_label: bool,
    pub can_get_state: bool,
    /// Host package that provides the missing tools (e.g. "e2fsprogs").
    pub package_hint: String,
    pub missing_tools: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Filesystem label to set during formatting.
    pub label: Option<String>,
    /// Force formatting even if the device appears to be in use.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Automatically fix errors if possible.
    pub auto_fix: bool,
    /// Force check even if the filesystem appears clean.
    pub force: bool,
    /// Verbose tool output.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub success: bool,
    pub errors_found: bool,
    pub errors_fixed: bool,
    /// Raw tool output captured during the check.
    pub message: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesystemState {
    pub is_clean: bool,
    pub is_mounted: bool,
    pub has_errors: bool,
    pub state_description: String,
    /// Adapter-specific extras (mount counts, device stats, raw tool output).
    pub additional_info: HashMap<String, String>,
}

/// A single mount option in a filesystem's mount-flag vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountFlag {
    pub name: String,
    pub description: String,
    pub needs_value: bool,
    pub value_description: String,
    pub value_validation_regex: String,
}

impl MountFlag {
    /// A boolean flag that takes no value.
    pub fn simple(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    /// A flag that requires a value matching `regex`.
    pub fn with_value(name: &str, description: &str, value_description: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            needs_value: true,
            value_description: value_description.to_string(),
            value_validation_regex: regex.to_string(),
        }
    }
}

/// A fixed byte sequence at a fixed offset identifying a filesystem format
/// without parsing its superblock. Several may exist per filesystem
/// (e.g. FAT12/16/32).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMagicSignature {
    /// Byte offset from the start of the device.
    pub offset: u64,
    pub magic: &'static [u8],
}

impl FsMagicSignature {
    /// Offset of the first byte past the signature.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.magic.len() as u64
    }
}
