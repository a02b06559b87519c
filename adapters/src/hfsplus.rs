//! HFS+ adapter driving hfsprogs. No command-line label tooling exists on
//! Linux; labels are mkfs-time only.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fsprov_core::base::{BaseAdapter, ToolSet};
use fsprov_core::cache::CommandCache;
use fsprov_core::error::FsError;
use fsprov_core::progress::ProgressCallback;
use fsprov_core::types::{
    CheckOptions, CheckResult, FilesystemState, FormatOptions, FsMagicSignature, MountFlag,
};
use fsprov_core::FilesystemAdapter;

use crate::ops::{self, CheckVerdict};

const MKFS_CMD: &str = "mkfs.hfsplus";
const FSCK_CMD: &str = "fsck.hfsplus";

// "H+" (HFS+) and "HX" (HFSX case-sensitive) volume headers.
const SIGNATURES: &[FsMagicSignature] = &[
    FsMagicSignature {
        offset: 0x400,
        magic: &[0x48, 0x2B],
    },
    FsMagicSignature {
        offset: 0x400,
        magic: &[0x48, 0x58],
    },
];

pub struct HfsplusAdapter {
    base: BaseAdapter,
}

impl HfsplusAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "hfsplus",
                "HFS+ Filesystem",
                "hfsprogs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(FSCK_CMD),
                    label: None,
                    state: Some(FSCK_CMD),
                },
                SIGNATURES,
                cache,
            ),
        }
    }

    pub fn with_tool_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.base = self.base.with_tool_dir(dir);
        self
    }
}

#[async_trait]
impl FilesystemAdapter for HfsplusAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value("uid", "User ID for files", "User ID", r"^\d+$"),
            MountFlag::with_value("gid", "Group ID for files", "Group ID", r"^\d+$"),
            MountFlag::with_value(
                "umask",
                "File mode creation mask",
                "Octal mask (e.g., 022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::simple("force", "Force mount even with errors"),
            MountFlag::with_value(
                "nls",
                "Character set for filename conversion",
                "Charset name (e.g., utf8)",
                r"^[a-zA-Z0-9_-]+$",
            ),
            MountFlag::simple("decompose", "Decompose Unicode filenames"),
        ]
    }

    async fn format(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &FormatOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<(), FsError> {
        // mkfs.hfsplus has no force flag.
        let mut args = Vec::new();
        if let Some(label) = &options.label {
            args.push("-v".to_string());
            args.push(label.clone());
        }
        args.push(device.to_string());

        ops::format_with(&self.base, token, MKFS_CMD, &args, progress).await
    }

    async fn check(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &CheckOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<CheckResult, FsError> {
        let mut args = Vec::new();
        if options.force {
            args.push("-f".to_string());
        }
        args.push(device.to_string());

        // fsck.hfsplus reports repairs in its output, not its exit code.
        ops::check_with(&self.base, token, FSCK_CMD, &args, progress, |code, output| {
            let lower = output.to_lowercase();
            let fixed = lower.contains("repaired") || lower.contains("fixed");
            match code {
                0 if fixed => CheckVerdict::corrected(),
                0 => CheckVerdict::clean(),
                _ => CheckVerdict {
                    success: false,
                    errors_found: true,
                    errors_fixed: fixed,
                },
            }
        })
        .await
    }

    async fn get_label(&self, _device: &str) -> Result<String, FsError> {
        Err(FsError::UnsupportedOperation(
            "HFS+ label retrieval not supported via command line tools".to_string(),
        ))
    }

    async fn set_label(&self, _device: &str, _label: &str) -> Result<(), FsError> {
        self.base.invalidate_cache();
        Err(FsError::UnsupportedOperation(
            "HFS+ does not support changing labels after format. Label must be set during mkfs.hfsplus with -v option".to_string(),
        ))
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        ops::state_from_fsck(&self.base, FSCK_CMD, &[device.to_string()], device, "checkOutput")
            .await
    }
}
