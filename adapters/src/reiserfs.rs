//! ReiserFS adapter driving reiserfsprogs.

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

const MKFS_CMD: &str = "mkfs.reiserfs";
const FSCK_CMD: &str = "fsck.reiserfs";
const TUNE_CMD: &str = "reiserfstune";

// Format 3.5, 3.6 and journal-relocation variants.
const SIGNATURES: &[FsMagicSignature] = &[
    FsMagicSignature {
        offset: 0x10034,
        magic: b"ReIsErFs",
    },
    FsMagicSignature {
        offset: 0x10034,
        magic: b"ReIsEr2Fs",
    },
    FsMagicSignature {
        offset: 0x10034,
        magic: b"ReIsEr3Fs",
    },
];

pub struct ReiserfsAdapter {
    base: BaseAdapter,
}

impl ReiserfsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "reiserfs",
                "ReiserFS Filesystem",
                "reiserfsprogs",
                ToolSet {
                    mkfs: Some(MKFS_CMD),
                    fsck: Some(FSCK_CMD),
                    label: Some(TUNE_CMD),
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
impl FilesystemAdapter for ReiserfsAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::simple("conv", "Convert old format to new"),
            MountFlag::with_value(
                "hash",
                "Hash function to use",
                "One of: rupasov, tea, r5, detect",
                r"^(rupasov|tea|r5|detect)$",
            ),
            MountFlag::simple("hashed_relocation", "Use hashed relocation"),
            MountFlag::simple("no_unhashed_relocation", "Disable unhashed relocation"),
            MountFlag::simple("noborder", "Disable border allocator"),
            MountFlag::simple("nolog", "Disable journaling"),
            MountFlag::simple("notail", "Disable tail packing"),
            MountFlag::simple("replayonly", "Replay journal only"),
            MountFlag::with_value(
                "resize",
                "Resize filesystem",
                "New size in blocks",
                r"^\d+$",
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
        args.push(if options.auto_fix { "--fix-fixable" } else { "--check" }.to_string());
        args.push(device.to_string());

        // fsck.reiserfs exit codes: 0 clean, 1/2 corrected, 4/6 uncorrected.
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
        let out = ops::probe_expect_success(&self.base, TUNE_CMD, &[device.to_string()]).await?;
        Ok(parse_tune_label(&out.output))
    }

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError> {
        ops::set_label_with(
            &self.base,
            TUNE_CMD,
            &["-l".to_string(), label.to_string(), device.to_string()],
        )
        .await
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        ops::state_from_fsck(
            &self.base,
            FSCK_CMD,
            &["--check".to_string(), device.to_string()],
            device,
            "checkOutput",
        )
        .await
    }
}

fn parse_tune_label(output: &str) -> String {
    for line in output.lines() {
        if line.contains("LABEL:") {
            if let Some((_, value)) = line.split_once(':') {
                return value.trim().to_string();
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
    fn parses_label_from_reiserfstune_output() {
        let output = "Filesystem parameters:\nLABEL: archive\n";
        assert_eq!(parse_tune_label(output), "archive");
        assert_eq!(parse_tune_label("LABEL:\n"), "");
    }

    #[test]
    fn all_signature_variants_share_superblock_offset() {
        let adapter = ReiserfsAdapter::new(Arc::new(CommandCache::new()));
        assert_eq!(adapter.signatures().len(), 3);
        assert!(adapter.signatures().iter().all(|sig| sig.offset == 0x10034));
    }

    #[tokio::test]
    async fn check_maps_uncorrected_codes() {
        for exit in [4, 6] {
            let dir = tempfile::tempdir().unwrap();
            fake_tool(dir.path(), FSCK_CMD, &format!("exit {exit}"));
            let adapter =
                ReiserfsAdapter::new(Arc::new(CommandCache::new())).with_tool_dir(dir.path());

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
            assert!(!result.success);
            assert!(result.errors_found);
            assert!(!result.errors_fixed);
        }
    }
}
