//! FAT12/16/32 adapter driving dosfstools. Formats always create FAT32.

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

const MKFS_CMD: &str = "mkfs.vfat";
const FSCK_CMD: &str = "fsck.vfat";
const FATLABEL_CMD: &str = "fatlabel";

const SIGNATURES: &[FsMagicSignature] = &[
    FsMagicSignature {
        offset: 82,
        magic: b"FAT32   ",
    },
    FsMagicSignature {
        offset: 54,
        magic: b"FAT16   ",
    },
    FsMagicSignature {
        offset: 54,
        magic: b"FAT12   ",
    },
];

pub struct VfatAdapter {
    base: BaseAdapter,
}

impl VfatAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "vfat",
                "FAT32 Filesystem",
                "dosfstools",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(FSCK_CMD),
                    label: Some(FATLABEL_CMD),
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
impl FilesystemAdapter for VfatAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value(
                "uid",
                "Set owner of all files to user ID",
                "User ID (numeric)",
                r"^[0-9]+$",
            ),
            MountFlag::with_value(
                "gid",
                "Set group of all files to group ID",
                "Group ID (numeric)",
                r"^[0-9]+$",
            ),
            MountFlag::with_value(
                "fmask",
                "Set file permissions mask (octal)",
                "Octal permission mask (e.g., 0022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::with_value(
                "dmask",
                "Set directory permissions mask (octal)",
                "Octal permission mask (e.g., 0022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::with_value(
                "umask",
                "Set umask (octal) - overrides fmask/dmask",
                "Octal permission mask (e.g., 0022)",
                r"^[0-7]{3,4}$",
            ),
            MountFlag::with_value(
                "iocharset",
                "I/O character set (e.g., utf8)",
                "Character set name (e.g., utf8)",
                r"^[a-zA-Z0-9_-]+$",
            ),
            MountFlag::with_value(
                "codepage",
                "Codepage for short filenames (e.g., 437)",
                "Codepage number (e.g., 437)",
                r"^[0-9]+$",
            ),
            MountFlag::with_value(
                "shortname",
                "Shortname case (lower, win95, winnt, mixed)",
                "One of: lower, win95, winnt, mixed",
                r"^(lower|win95|winnt|mixed)$",
            ),
            MountFlag::with_value(
                "errors",
                "Behavior on error (remount-ro, continue, panic)",
                "One of: continue, remount-ro, panic",
                r"^(continue|remount-ro|panic)$",
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
        // Always FAT32; mkfs.vfat has no force flag.
        let mut args = vec!["-F".to_string(), "32".to_string()];
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
        args.push(if options.auto_fix { "-a" } else { "-n" }.to_string());
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        // fsck.vfat exit codes: 0 clean, 1/2 corrected, 4 uncorrected.
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
        // fatlabel with no new label prints the current one.
        let out =
            ops::probe_expect_success(&self.base, FATLABEL_CMD, &[device.to_string()]).await?;
        Ok(out.output.trim().to_string())
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            FATLABEL_CMD,
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
    use crate::test_support::fake_tool;
    use fsprov_core::progress::ProgressStatus;

    #[test]
    fn all_fat_variants_share_one_adapter() {
        let adapter = VfatAdapter::new(Arc::new(CommandCache::new()));
        assert_eq!(adapter.signatures().len(), 3);
        assert!(adapter
            .signatures()
            .iter()
            .any(|sig| sig.offset == 82 && sig.magic == b"FAT32   "));
    }

    #[test]
    fn valued_mount_flags_carry_validation() {
        let adapter = VfatAdapter::new(Arc::new(CommandCache::new()));
        for flag in adapter.mount_flags() {
            assert_eq!(flag.needs_value, !flag.value_validation_regex.is_empty());
        }
    }

    #[tokio::test]
    async fn format_always_requests_fat32() {
        let dir = tempfile::tempdir().unwrap();
        // Echo the arguments back so the test can inspect them.
        fake_tool(dir.path(), MKFS_CMD, "echo \"$@\"");
        let adapter = VfatAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let token = CancellationToken::new();
        let seen = std::sync::Mutex::new(String::new());
        adapter
            .format(
                &token,
                "/dev/null",
                &FormatOptions {
                    label: Some("USB".to_string()),
                    force: false,
                },
                &|status, _, note| {
                    if status == ProgressStatus::Running && note.contains("-F 32") {
                        *seen.lock().unwrap() = note.to_string();
                    }
                },
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.contains("-F 32"));
        assert!(seen.contains("-n USB"));
    }

    #[tokio::test]
    async fn state_maps_fsck_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), FSCK_CMD, "echo dirty bit set\nexit 1");
        fake_tool(dir.path(), "mount", "echo /dev/sda1 on /mnt");
        let adapter = VfatAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let state = adapter.get_state("/dev/sda1").await.unwrap();
        assert!(!state.is_clean);
        assert!(state.has_errors);
        assert_eq!(state.state_description, "Has errors");
        assert!(state.is_mounted);
        assert!(state.additional_info["fsckOutput"].contains("dirty bit"));
    }
}
