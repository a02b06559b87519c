//! NTFS adapter driving ntfs-3g userspace tools, mounting through the
//! in-kernel ntfs3 driver.

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

const MKFS_CMD: &str = "mkfs.ntfs";
const NTFSFIX_CMD: &str = "ntfsfix";
const NTFSLABEL_CMD: &str = "ntfslabel";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 3,
    magic: b"NTFS    ",
}];

pub struct NtfsAdapter {
    base: BaseAdapter,
}

impl NtfsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "ntfs",
                "NTFS Filesystem",
                "ntfs-3g-progs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(NTFSFIX_CMD),
                    label: Some(NTFSLABEL_CMD),
                    state: Some(NTFSFIX_CMD),
                },
                SIGNATURES,
                cache,
            )
            .with_fs_module("ntfs3"),
        }
    }

    pub fn with_tool_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.base = self.base.with_tool_dir(dir);
        self
    }
}

#[async_trait]
impl FilesystemAdapter for NtfsAdapter {
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
            MountFlag::simple("permissions", "Respect NTFS permissions"),
            MountFlag::simple("acl", "Enable POSIX Access Control Lists support"),
            MountFlag::simple("exec", "Allow executing files (use with caution)"),
        ]
    }

    async fn format(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &FormatOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<(), FsError> {
        // Quick format; a full zeroing pass takes hours on large disks.
        let mut args = vec!["-Q".to_string()];
        if options.force {
            args.push("-F".to_string());
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
        // ntfsfix repairs common inconsistencies; -n only reports them.
        let mut args = Vec::new();
        if !options.auto_fix {
            args.push("-n".to_string());
        }
        args.push(device.to_string());

        // Exit 0 covers both "clean" and "fixed"; the output decides which.
        ops::check_with(&self.base, token, NTFSFIX_CMD, &args, progress, |code, output| {
            match code {
                0 => {
                    let lower = output.to_lowercase();
                    if lower.contains("repaired") || lower.contains("fixed") {
                        CheckVerdict::corrected()
                    } else {
                        CheckVerdict::clean()
                    }
                }
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, device: &str) -> Result<String, FsError> {
        let out =
            ops::probe_expect_success(&self.base, NTFSLABEL_CMD, &[device.to_string()]).await?;
        Ok(out.output.trim().to_string())
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            NTFSLABEL_CMD,
            &[device.to_string(), label.to_string()],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        // ntfsfix cannot probe a mounted volume.
        if self.base.is_device_mounted(device).await {
            return Ok(FilesystemState {
                is_mounted: true,
                state_description: "Mounted (state cannot be determined)".to_string(),
                ..Default::default()
            });
        }

        let out = self
            .base
            .run_command_cached(NTFSFIX_CMD, &["-n".to_string(), device.to_string()])
            .await?;

        let has_errors = out.exit_code != 0 || out.output.to_lowercase().contains("error");
        let mut state = FilesystemState {
            is_clean: !has_errors,
            has_errors,
            state_description: if has_errors {
                "Has errors or inconsistencies"
            } else {
                "Clean"
            }
            .to_string(),
            ..Default::default()
        };
        state
            .additional_info
            .insert("ntfsfixOutput".to_string(), out.output);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_tool, transcript, Transcript};

    #[test]
    fn mounts_through_ntfs3_kernel_driver() {
        let adapter = NtfsAdapter::new(Arc::new(CommandCache::new()));
        assert_eq!(adapter.name(), "ntfs");
        assert_eq!(adapter.linux_fs_module(), "ntfs3");
    }

    #[tokio::test]
    async fn check_reads_fix_evidence_from_output() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), NTFSFIX_CMD, "echo 'NTFS volume successfully repaired.'");
        let adapter = NtfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let events = Transcript::default();
        let token = CancellationToken::new();
        let result = adapter
            .check(
                &token,
                "/dev/null",
                &CheckOptions {
                    auto_fix: true,
                    ..Default::default()
                },
                &transcript(&events),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.errors_found);
        assert!(result.errors_fixed);
    }

    #[tokio::test]
    async fn state_refuses_mounted_volume() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "mount", "echo /dev/sdb2 on /mnt/win type ntfs3");
        // ntfsfix would report clean, but it must never run while mounted.
        fake_tool(dir.path(), NTFSFIX_CMD, "exit 0");
        let adapter = NtfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let state = adapter.get_state("/dev/sdb2").await.unwrap();
        assert!(state.is_mounted);
        assert!(!state.is_clean);
        assert_eq!(
            state.state_description,
            "Mounted (state cannot be determined)"
        );
        assert!(state.additional_info.is_empty());
    }

    #[tokio::test]
    async fn state_flags_error_text_despite_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "mount", "exit 0");
        fake_tool(dir.path(), NTFSFIX_CMD, "echo 'error: MFT mismatch'");
        let adapter = NtfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let state = adapter.get_state("/dev/sdb2").await.unwrap();
        assert!(state.has_errors);
        assert_eq!(state.state_description, "Has errors or inconsistencies");
    }
}
