//! XFS adapter driving xfsprogs. xfs_repair doubles as the check and
//! state tool since XFS ships no plain fsck.

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

const MKFS_CMD: &str = "mkfs.xfs";
const REPAIR_CMD: &str = "xfs_repair";
const ADMIN_CMD: &str = "xfs_admin";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 0,
    magic: b"XFSB",
}];

pub struct XfsAdapter {
    base: BaseAdapter,
}

impl XfsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "xfs",
                "XFS Filesystem",
                "xfsprogs-extra",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(REPAIR_CMD),
                    label: Some(ADMIN_CMD),
                    state: Some(REPAIR_CMD),
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
impl FilesystemAdapter for XfsAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::simple("inode64", "Enable 64-bit inode allocation for large filesystems"),
            MountFlag::simple("noquota", "Disable quota enforcement"),
            MountFlag::simple("usrquota", "Enable user quota enforcement"),
            MountFlag::simple("grpquota", "Enable group quota enforcement"),
            MountFlag::simple("prjquota", "Enable project quota enforcement"),
            MountFlag::simple("discard", "Enable discard/TRIM support"),
            MountFlag::simple("nouuid", "Ignore filesystem UUID to allow mounting duplicates"),
            MountFlag::with_value(
                "allocsize",
                "Set preferred allocation size",
                "Size in bytes optionally with K, M, or G suffix (e.g., 1G)",
                r"^[0-9]+([kKmMgG])?$",
            ),
            MountFlag::with_value(
                "sunit",
                "Set stripe unit size (in 512-byte blocks)",
                "Stripe unit in 512-byte blocks",
                r"^[0-9]+$",
            ),
            MountFlag::with_value(
                "swidth",
                "Set stripe width size (in 512-byte blocks)",
                "Stripe width in 512-byte blocks",
                r"^[0-9]+$",
            ),
            MountFlag::with_value(
                "logbufs",
                "Number of log buffers",
                "Integer between 2 and 8",
                r"^[2-8]$",
            ),
            MountFlag::with_value(
                "logbsize",
                "Log buffer size in bytes",
                "One of: 16384, 32768, 65536, 131072, 262144",
                r"^(16384|32768|65536|131072|262144)$",
            ),
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
            args.push("-L".to_string());
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
        // xfs_repair repairs by default; -n is the no-modify check mode.
        let mut args = Vec::new();
        if !options.auto_fix {
            args.push("-n".to_string());
        }
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        // xfs_repair exit codes: 0 clean, 1 errors found (corrected when
        // repairing), 2 errors needing an unmount or log replay first.
        let auto_fix = options.auto_fix;
        ops::check_with(&self.base, token, REPAIR_CMD, &args, progress, move |code, _| {
            match code {
                0 => CheckVerdict::clean(),
                1 => CheckVerdict::found(auto_fix),
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, device: &str) -> Result<String, FsError> {
        let out = ops::probe_expect_success(
            &self.base,
            ADMIN_CMD,
            &["-l".to_string(), device.to_string()],
        )
        .await?;
        Ok(parse_admin_label(&out.output))
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            ADMIN_CMD,
            &["-L".to_string(), label.to_string(), device.to_string()],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        let out = self
            .base
            .run_command_cached(REPAIR_CMD, &["-n".to_string(), device.to_string()])
            .await?;

        let mut state = FilesystemState {
            is_clean: out.exit_code == 0,
            has_errors: out.exit_code != 0,
            state_description: match out.exit_code {
                0 => "Clean",
                1 => "Has correctable errors",
                _ => "Has errors",
            }
            .to_string(),
            ..Default::default()
        };
        state
            .additional_info
            .insert("repairOutput".to_string(), out.output);
        state.is_mounted = self.base.is_device_mounted(device).await;
        Ok(state)
    }
}

/// Pull the label out of `xfs_admin -l` output: `label = "media"`.
fn parse_admin_label(output: &str) -> String {
    for line in output.lines() {
        if line.contains("label = ") {
            if let Some((_, value)) = line.split_once('=') {
                return value.trim().trim_matches('"').to_string();
            }
        }
    }
    String::new()
}
