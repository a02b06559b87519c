//! GFS2 adapter driving gfs2-utils. Formats are single-node
//! (lock_nolock); GFS2 has no label concept.

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

const MKFS_CMD: &str = "mkfs.gfs2";
const FSCK_CMD: &str = "fsck.gfs2";

const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 0x10,
    magic: &[0x01, 0x16, 0x19, 0x70],
}];

pub struct Gfs2Adapter {
    base: BaseAdapter,
}

impl Gfs2Adapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "gfs2",
                "Global Filesystem 2",
                "gfs2-utils",
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
impl FilesystemAdapter for Gfs2Adapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value(
                "lockproto",
                "Lock protocol name",
                "Protocol name (e.g., lock_dlm, lock_nolock)",
                r"^lock_[a-z]+$",
            ),
            MountFlag::with_value(
                "locktable",
                "Lock table name",
                "Table name",
                r"^[a-zA-Z0-9_:.-]+$",
            ),
            MountFlag::with_value("hostdata", "Host-specific data", "Host data string", r"^.+$"),
            MountFlag::simple("spectator", "Mount as a spectator (read-only)"),
            MountFlag::simple("norecovery", "Don't recover the journal"),
            MountFlag::with_value(
                "quota",
                "Quota enforcement mode",
                "One of: off, account, on",
                r"^(off|account|on)$",
            ),
            MountFlag::with_value(
                "data",
                "Data journaling mode",
                "One of: writeback, ordered",
                r"^(writeback|ordered)$",
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
        // Single-node locking; mkfs.gfs2 still requires a cluster:fs table
        // name even without DLM.
        let mut args = vec!["-p".to_string(), "lock_nolock".to_string()];
        if options.force {
            args.push("-O".to_string());
        }
        args.push("-t".to_string());
        args.push("local:gfs2".to_string());
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
        args.push(device.to_string());

        // fsck.gfs2 exit codes: 0 clean, 1/2 corrected, 4 uncorrected.
        ops::check_with(&self.base, token, FSCK_CMD, &args, progress, |code, _| {
            match code {
                0 => CheckVerdict::clean(),
                1 | 2 => CheckVerdict::corrected(),
                _ => CheckVerdict::uncorrected(),
            }
        })
        .await
    }

    async fn get_label(&self, _device: &str) -> Result<String, FsError> {
        Err(FsError::UnsupportedOperation(
            "GFS2 does not support filesystem labels".to_string(),
        ))
    }

    async fn set_label(&self, _device: &str, _label: &str) -> Result<(), FsError> {
        self.base.invalidate_cache();
        Err(FsError::UnsupportedOperation(
            "GFS2 does not support filesystem labels".to_string(),
        ))
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        ops::state_from_fsck(
            &self.base,
            FSCK_CMD,
            &["-n".to_string(), device.to_string()],
            device,
            "checkOutput",
        )
        .await
    }
}
