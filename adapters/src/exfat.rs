//! exFAT adapter driving exfatprogs.

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

const MKFS_CMD: &str = "mkfs.exfat";
const FSCK_CMD: &str = "fsck.exfat";
const EXFATLABEL_CMD: &str = "exfatlabel";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 3,
    magic: b"EXFAT   ",
}];

pub struct ExfatAdapter {
    base: BaseAdapter,
}

impl ExfatAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "exfat",
                "exFAT Filesystem",
                "exfatprogs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(FSCK_CMD),
                    label: Some(EXFATLABEL_CMD),
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
impl FilesystemAdapter for ExfatAdapter {
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
            MountFlag::with_value(
                "dmask",
                "Directory mode creation mask",
                "Octal mask (e.g., 022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::with_value(
                "fmask",
                "File mode creation mask (alternative to umask)",
                "Octal mask (e.g., 022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::with_value(
                "iocharset",
                "Character set for filename conversion",
                "Charset name (e.g., utf8)",
                r"^[a-zA-Z0-9_-]+$",
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
        // mkfs.exfat has no force flag.
        let mut args = Vec::new();
        if let Some(label) = &options.label {
            args.push("-n".to_string());
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
        args.push(if options.auto_fix { "-y" } else { "-n" }.to_string());
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        // fsck.exfat exit codes: 0 clean, 1/2 corrected, 4 uncorrected.
        ops::check_with(&self.base, token, FSCK_CMD, &args, progress, |code, _| {
            match code {
                0 => CheckVerdict::clean(),
                1 | 2 => CheckVerdict::corrected(),
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, device: &str) -> Result<String, FsError> {
        let out =
            ops::probe_expect_success(&self.base, EXFATLABEL_CMD, &[device.to_string()]).await?;
        Ok(out.output.trim().to_string())
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            EXFATLABEL_CMD,
            &[device.to_string(), label.to_string()],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        ops::state_from_fsck(
            &self.base,
            FSCK_CMD,
            &["-n".to_string(), device.to_string()],
            device,
            "fsckOutput",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_tool, transcript, Transcript};

    #[test]
    fn signature_sits_in_boot_sector_oem_field() {
        let adapter = ExfatAdapter::new(Arc::new(CommandCache::new()));
        let sig = adapter.signatures()[0];
        assert_eq!(sig.offset, 3);
        assert_eq!(sig.magic, b"EXFAT   ");
    }

    #[tokio::test]
    async fn check_treats_corrected_codes_as_success() {
        for (exit, success, fixed) in [(0, true, false), (1, true, true), (2, true, true), (4, false, false)] {
            let dir = tempfile::tempdir().unwrap();
            fake_tool(dir.path(), FSCK_CMD, &format!("exit {exit}"));
            let adapter =
                ExfatAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

            let events = Transcript::default();
            let token = CancellationToken::new();
            let result = adapter
                .check(
                    &token,
                    "/dev/null",
                    &CheckOptions::default(),
                    &transcript(&events),
                )
                .await
                .unwrap();
            assert_eq!(result.success, success, "exit {exit}");
            assert_eq!(result.errors_fixed, fixed, "exit {exit}");
        }
    }

    #[tokio::test]
    async fn label_round_trip_through_exfatlabel() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), EXFATLABEL_CMD, "echo '  MEDIA  '");
        let adapter = ExfatAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());
        assert_eq!(adapter.get_label("/dev/null").await.unwrap(), "MEDIA");
    }
}
