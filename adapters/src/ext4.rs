//! ext4 adapter driving the e2fsprogs tool suite.

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

const MKFS_CMD: &str = "mkfs.ext4";
const FSCK_CMD: &str = "fsck.ext4";
const TUNE2FS_CMD: &str = "tune2fs";

// ext2/3/4 superblock magic, little-endian 0xEF53.
const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 1080,
    magic: &[0x53, 0xEF],
}];

pub struct Ext4Adapter {
    base: BaseAdapter,
}

impl Ext4Adapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "ext4",
                "EXT4 Filesystem",
                "e2fsprogs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(FSCK_CMD),
                    label: Some(TUNE2FS_CMD),
                    state: Some(TUNE2FS_CMD),
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
impl FilesystemAdapter for Ext4Adapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value(
                "data",
                "Data journaling mode (ordered, writeback, journal)",
                "One of: journal, ordered, writeback",
                r"^(journal|ordered|writeback)$",
            ),
            MountFlag::with_value(
                "errors",
                "Behavior on error (remount-ro, continue, panic)",
                "One of: continue, remount-ro, panic",
                r"^(continue|remount-ro|panic)$",
            ),
            MountFlag::simple("discard", "Enable discard/TRIM support"),
            MountFlag::with_value(
                "barrier",
                "Enable/disable write barriers (0, 1)",
                "0 or 1",
                r"^[01]$",
            ),
            MountFlag::simple("noauto_da_alloc", "Disable delayed allocation"),
            MountFlag::simple("journal_checksum", "Enable journal checksumming"),
            MountFlag::simple("journal_async_commit", "Commit data blocks asynchronously"),
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
        let mut args = Vec::new();
        args.push(if options.auto_fix { "-y" } else { "-n" }.to_string());
        if options.force {
            args.push("-f".to_string());
        }
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        // fsck.ext4 exit codes:
        // 0 - no errors
        // 1 - errors corrected
        // 2 - errors corrected, reboot required
        // 4 - errors left uncorrected
        // 8 - operational error
        // 16 - usage or syntax error
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
        let out = ops::probe_expect_success(
            &self.base,
            TUNE2FS_CMD,
            &["-l".to_string(), device.to_string()],
        )
        .await?;
        Ok(parse_volume_name(&out.output))
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            TUNE2FS_CMD,
            &["-L".to_string(), label.to_string(), device.to_string()],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        let out = ops::probe_expect_success(
            &self.base,
            TUNE2FS_CMD,
            &["-l".to_string(), device.to_string()],
        )
        .await?;

        let mut state = parse_superblock_state(&out.output);
        state.is_mounted = self.base.is_device_mounted(device).await;
        Ok(state)
    }
}

fn parse_volume_name(output: &str) -> String {
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Filesystem volume name:") {
            let label = rest.trim();
            if label == "<none>" {
                return String::new();
            }
            return label.to_string();
        }
    }
    String::new()
}

fn parse_superblock_state(output: &str) -> FilesystemState {
    let mut state = FilesystemState::default();
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("Filesystem state:") {
            let desc = rest.trim();
            let lower = desc.to_lowercase();
            state.is_clean = lower.contains("clean");
            state.has_errors = lower.contains("error");
            state.state_description = desc.to_string();
        } else if let Some(rest) = line.strip_prefix("Mount count:") {
            state
                .additional_info
                .insert("mountCount".to_string(), rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Maximum mount count:") {
            state
                .additional_info
                .insert("maxMountCount".to_string(), rest.trim().to_string());
        }
    }
    if state.state_description.is_empty() {
        state.state_description = "Unknown".to_string();
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_tool, transcript, Transcript};
    use fsprov_core::progress::ProgressStatus;

    const TUNE2FS_OUTPUT: &str = "\
tune2fs 1.47.0 (5-Feb-2023)
Filesystem volume name:   media
Filesystem state:         clean
Mount count:              7
Maximum mount count:      -1
";

    #[test]
    fn parses_label_from_tune2fs_output() {
        assert_eq!(parse_volume_name(TUNE2FS_OUTPUT), "media");
        assert_eq!(
            parse_volume_name("Filesystem volume name:   <none>\n"),
            ""
        );
        assert_eq!(parse_volume_name("no such line"), "");
    }

    #[test]
    fn parses_superblock_state() {
        let state = parse_superblock_state(TUNE2FS_OUTPUT);
        assert!(state.is_clean);
        assert!(!state.has_errors);
        assert_eq!(state.state_description, "clean");
        assert_eq!(state.additional_info["mountCount"], "7");
        assert_eq!(state.additional_info["maxMountCount"], "-1");

        let dirty = parse_superblock_state("Filesystem state:  clean with errors\n");
        assert!(dirty.is_clean);
        assert!(dirty.has_errors);
    }

    #[test]
    fn state_defaults_to_unknown() {
        let state = parse_superblock_state("");
        assert_eq!(state.state_description, "Unknown");
        assert!(!state.is_clean);
    }

    #[test]
    fn valued_mount_flags_carry_validation() {
        let adapter = Ext4Adapter::new(Arc::new(CommandCache::new()));
        for flag in adapter.mount_flags() {
            assert_eq!(
                flag.needs_value,
                !flag.value_validation_regex.is_empty(),
                "flag {}",
                flag.name
            );
        }
    }

    #[tokio::test]
    async fn format_emits_full_progress_sequence() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), MKFS_CMD, "echo writing superblocks\nexit 0");
        let adapter = Ext4Adapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let events = Transcript::default();
        let token = CancellationToken::new();
        let options = FormatOptions {
            label: Some("data".to_string()),
            force: true,
        };
        adapter
            .format(&token, "/dev/null", &options, &transcript(&events))
            .await
            .unwrap();

        let events = events.take();
        assert_eq!(events.first().unwrap().0, ProgressStatus::Start);
        assert_eq!(events.last().unwrap(), &(ProgressStatus::Success, 100));
        assert_eq!(
            events
                .iter()
                .filter(|(s, _)| matches!(s, ProgressStatus::Success | ProgressStatus::Failure))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn format_failure_terminates_with_failure_status() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), MKFS_CMD, "echo bad device >&2\nexit 1");
        let adapter = Ext4Adapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let events = Transcript::default();
        let token = CancellationToken::new();
        let err = adapter
            .format(&token, "/dev/null", &FormatOptions::default(), &transcript(&events))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(1));
        let events = events.take();
        assert_eq!(events.last().unwrap(), &(ProgressStatus::Failure, 0));
    }

    #[tokio::test]
    async fn check_exit_codes_follow_fsck_taxonomy() {
        for (exit, success, found, fixed) in [
            (0, true, false, false),
            (1, true, true, true),
            (2, true, true, true),
            (4, false, true, false),
            (8, false, true, false),
        ] {
            let dir = tempfile::tempdir().unwrap();
            fake_tool(dir.path(), FSCK_CMD, &format!("exit {exit}"));
            let adapter =
                Ext4Adapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

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

            assert_eq!(result.exit_code, exit);
            assert_eq!(result.success, success, "exit {exit}");
            assert_eq!(result.errors_found, found, "exit {exit}");
            assert_eq!(result.errors_fixed, fixed, "exit {exit}");
        }
    }

    #[tokio::test]
    async fn set_label_flushes_cached_probes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("runs");
        fake_tool(
            dir.path(),
            TUNE2FS_CMD,
            &format!(
                "echo x >> {}\necho 'Filesystem volume name:   old'",
                marker.display()
            ),
        );
        let adapter = Ext4Adapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        adapter.get_label("/dev/null").await.unwrap();
        adapter.get_label("/dev/null").await.unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);

        adapter.set_label("/dev/null", "new").await.unwrap();
        adapter.get_label("/dev/null").await.unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 3);
    }
}
