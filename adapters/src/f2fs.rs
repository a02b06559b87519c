//! F2FS adapter driving f2fs-tools. F2FS has no standalone label tool;
//! labels are readable through fsck.f2fs debug output and settable only at
//! mkfs time.

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

const MKFS_CMD: &str = "mkfs.f2fs";
const FSCK_CMD: &str = "fsck.f2fs";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 0x400,
    magic: &[0x10, 0x20, 0xF5, 0xF2],
}];

pub struct F2fsAdapter {
    base: BaseAdapter,
}

impl F2fsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "f2fs",
                "Flash-Friendly Filesystem",
                "f2fs-tools",
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
impl FilesystemAdapter for F2fsAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value(
                "background_gc",
                "Background garbage collection mode",
                "One of: on, off, sync",
                r"^(on|off|sync)$",
            ),
            MountFlag::simple("disable_roll_forward", "Disable roll-forward recovery"),
            MountFlag::simple("discard", "Enable discard/TRIM support"),
            MountFlag::simple("no_heap", "Disable heap-style segment allocation"),
            MountFlag::simple("nouser_xattr", "Disable user extended attributes"),
            MountFlag::simple("noacl", "Disable POSIX Access Control Lists"),
            MountFlag::with_value(
                "active_logs",
                "Number of active logs",
                "2, 4, or 6",
                r"^[246]$",
            ),
            MountFlag::simple("inline_data", "Enable inline data"),
            MountFlag::simple("inline_dentry", "Enable inline directory entries"),
        ]
    }

    async fn format(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &FormatOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<(), FsError> {
        let mut args = Vec::new();
        if options.force {
            args.push("-f".to_string());
        }
        if let Some(label) = &options.label {
            args.push("-l".to_string());
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
        if options.auto_fix {
            args.push("-a".to_string());
        }
        if options.force {
            args.push("-f".to_string());
        }
        args.push(device.to_string());

        // fsck.f2fs reports fixes in its output, not its exit code.
        ops::check_with(&self.base, token, FSCK_CMD, &args, progress, |code, output| {
            match code {
                0 if output.to_lowercase().contains("fixed") => CheckVerdict::corrected(),
                0 => CheckVerdict::clean(),
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, device: &str) -> Result<String, FsError> {
        // Debug level 1 dumps the superblock, volume_name included.
        let out = ops::run_expect_success(
            &self.base,
            FSCK_CMD,
            &["-d".to_string(), "1".to_string(), device.to_string()],
        )
        .await?;
        Ok(parse_volume_name(&out.output))
    }

    async fn set_label(&self, _device: &str, _label: &str) -> Result<(), FsError> {
        self.base.invalidate_cache();
        Err(FsError::UnsupportedOperation(
            "F2FS does not support changing labels after format. Label must be set during mkfs.f2fs with -l option".to_string(),
        ))
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        ops::state_from_fsck(&self.base, FSCK_CMD, &[device.to_string()], device, "checkOutput")
            .await
    }
}

fn parse_volume_name(output: &str) -> String {
    for line in output.lines() {
        if line.contains("volume_name") {
            if let Some((_, value)) = line.split_once(':') {
                return value.trim().to_string();
            }
        }
    }
    String::new()
}
