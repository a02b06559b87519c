//! Btrfs adapter. Everything besides mkfs goes through the multiplexed
//! `btrfs` binary (check, filesystem show/label, device stats).

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

const MKFS_CMD: &str = "mkfs.btrfs";
const BTRFS_CMD: &str = "btrfs";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 0x10040,
    magic: b"_BHRfS_M",
}];

pub struct BtrfsAdapter {
    base: BaseAdapter,
}

impl BtrfsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "btrfs",
                "Btrfs Filesystem",
                "btrfs-progs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(BTRFS_CMD),
                    label: Some(BTRFS_CMD),
                    state: Some(BTRFS_CMD),
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
impl FilesystemAdapter for BtrfsAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value(
                "compress",
                "Enable compression",
                "One of: zlib, lzo, zstd, or none",
                r"^(zlib|lzo|zstd|none)$",
            ),
            MountFlag::with_value(
                "compress-force",
                "Force compression on all files",
                "One of: zlib, lzo, zstd",
                r"^(zlib|lzo|zstd)$",
            ),
            MountFlag::simple("autodefrag", "Enable automatic defragmentation"),
            MountFlag::simple("discard", "Enable discard/TRIM support"),
            MountFlag::simple("ssd", "Enable SSD-specific optimizations"),
            MountFlag::simple("nossd", "Disable SSD-specific optimizations"),
            MountFlag::with_value(
                "space_cache",
                "Enable space cache",
                "One of: v1, v2",
                r"^(v1|v2)$",
            ),
            MountFlag::with_value(
                "subvol",
                "Mount specific subvolume",
                "Subvolume path",
                r"^[a-zA-Z0-9/_-]+$",
            ),
            MountFlag::with_value(
                "subvolid",
                "Mount specific subvolume by ID",
                "Subvolume ID (numeric)",
                r"^[0-9]+$",
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
        let mut args = vec!["check".to_string()];
        args.push(if options.auto_fix { "--repair" } else { "--readonly" }.to_string());
        if options.force {
            args.push("--force".to_string());
        }
        args.push(device.to_string());

        // btrfs check only distinguishes 0 from non-zero; error evidence on
        // a clean exit lives in the output text.
        let auto_fix = options.auto_fix;
        ops::check_with(&self.base, token, BTRFS_CMD, &args, progress, move |code, output| {
            match code {
                0 if output.to_lowercase().contains("error") => CheckVerdict::found(auto_fix),
                0 => CheckVerdict::clean(),
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, device: &str) -> Result<String, FsError> {
        let out = ops::probe_expect_success(
            &self.base,
            BTRFS_CMD,
            &[
                "filesystem".to_string(),
                "show".to_string(),
                device.to_string(),
            ],
        )
        .await?;
        Ok(parse_show_label(&out.output))
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            BTRFS_CMD,
            &[
                "filesystem".to_string(),
                "label".to_string(),
                device.to_string(),
                label.to_string(),
            ],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        let mut state = FilesystemState::default();

        // Device stats are cheap and safe on a mounted filesystem; a
        // read-only check is the fallback when stats are unavailable.
        let stats = self
            .base
            .run_command_cached(
                BTRFS_CMD,
                &[
                    "device".to_string(),
                    "stats".to_string(),
                    device.to_string(),
                ],
            )
            .await;
        match stats {
            Ok(out) if out.exit_code == 0 => {
                state.has_errors = out.output.to_lowercase().contains("error");
                state.is_clean = !state.has_errors;
                state
                    .additional_info
                    .insert("deviceStats".to_string(), out.output);
            }
            _ => {
                let out = self
                    .base
                    .run_command_cached(
                        BTRFS_CMD,
                        &[
                            "check".to_string(),
                            "--readonly".to_string(),
                            device.to_string(),
                        ],
                    )
                    .await?;
                state.is_clean = out.exit_code == 0;
                state.has_errors = out.exit_code != 0;
                state
                    .additional_info
                    .insert("checkOutput".to_string(), out.output);
            }
        }

        state.state_description = if state.is_clean {
            "Clean"
        } else {
            "Has errors or inconsistencies"
        }
        .to_string();
        state.is_mounted = self.base.is_device_mounted(device).await;
        Ok(state)
    }
}

/// Pull the label out of `btrfs filesystem show` output, e.g.
/// `Label: 'media'  uuid: ...` or `Label: none  uuid: ...`.
fn parse_show_label(output: &str) -> String {
    for line in output.lines() {
        if let Some(idx) = line.find("Label:") {
            let rest = line[idx + 6..].trim_start();
            if let Some(quoted) = rest.strip_prefix('\'') {
                if let Some(end) = quoted.find('\'') {
                    return quoted[..end].to_string();
                }
            } else if rest.starts_with("none") {
                return String::new();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_tool, transcript, Transcript};

    #[test]
    fn parses_label_from_filesystem_show() {
        let output = "Label: 'media'  uuid: 1234-5678\n\tTotal devices 1\n";
        assert_eq!(parse_show_label(output), "media");
        assert_eq!(parse_show_label("Label: none  uuid: 1234\n"), "");
        assert_eq!(parse_show_label("garbage"), "");
        assert_eq!(parse_show_label("Label: 'with space'  uuid: x"), "with space");
    }

    #[tokio::test]
    async fn clean_exit_with_error_text_reports_errors_found() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), BTRFS_CMD, "echo 'found 2 errors in extent tree'");
        let adapter = BtrfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

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
        assert!(result.success);
        assert!(result.errors_found);
        // Read-only check cannot have fixed anything.
        assert!(!result.errors_fixed);
    }

    #[tokio::test]
    async fn state_prefers_device_stats() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(
            dir.path(),
            BTRFS_CMD,
            "case \"$1\" in device) echo '[/dev/sdc].write_io_errs 0';; *) exit 1;; esac",
        );
        fake_tool(dir.path(), "mount", "exit 0");
        let adapter = BtrfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let state = adapter.get_state("/dev/sdc").await.unwrap();
        assert!(state.is_clean);
        assert!(state.additional_info.contains_key("deviceStats"));
        assert!(!state.additional_info.contains_key("checkOutput"));
    }

    #[tokio::test]
    async fn state_falls_back_to_readonly_check() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(
            dir.path(),
            BTRFS_CMD,
            "case \"$1\" in device) exit 1;; check) echo checked; exit 0;; esac",
        );
        fake_tool(dir.path(), "mount", "exit 0");
        let adapter = BtrfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

        let state = adapter.get_state("/dev/sdc").await.unwrap();
        assert!(state.is_clean);
        assert_eq!(state.additional_info["checkOutput"], "checked");
    }
}
