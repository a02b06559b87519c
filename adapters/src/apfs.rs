//! APFS adapter, read-only. Linux has no mkfs/fsck/label tooling for APFS;
//! mounting goes through the apfs-fuse userspace driver and metadata access
//! through apfsutil.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fsprov_core::base::{BaseAdapter, ToolSet};
use fsprov_core::cache::CommandCache;
use fsprov_core::error::FsError;
use fsprov_core::mount::{mount_flags_to_syscall, MountPoint};
use fsprov_core::progress::{ProgressCallback, ProgressStatus};
use fsprov_core::types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};
use fsprov_core::FilesystemAdapter;

const FUSE_CMD: &str = "apfs-fuse";
const FUSERMOUNT_CMD: &str = "fusermount3";
const APFSUTIL_CMD: &str = "apfsutil";

// NX container superblock magic.
const SIGNATURES: &[FsMagicSignature] = &[FsMagicSignature {
    offset: 0x20,
    magic: b"NXSB",
}];

pub struct ApfsAdapter {
    base: BaseAdapter,
}

impl ApfsAdapter {
    pub fn new(cache: Arc<CommandCache>) -> Self {
        Self {
            base: BaseAdapter::new(
                "apfs",
                "Apple File System (read-only)",
                "apfs-fuse",
                ToolSet {
                    mkfs: None,
                    fsck: None,
                    label: None,
                    state: Some(APFSUTIL_CMD),
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
impl FilesystemAdapter for ApfsAdapter {
    fn base(&self) -> &BaseAdapter {
        &self.base
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            MountFlag::with_value("uid", "User ID for files", "User ID", r"^\d+$"),
            MountFlag::with_value("gid", "Group ID for files", "Group ID", r"^\d+$"),
            MountFlag::with_value(
                "vol",
                "Volume index to mount",
                "Volume index (0-based)",
                r"^\d+$",
            ),
        ]
    }

    fn is_supported(&self) -> FilesystemSupport {
        let mut support = self.base.check_command_availability();
        // Mounting is FUSE-based and independent of the kernel list.
        support.can_mount = self.base.command_exists(FUSE_CMD);
        if !support.can_mount {
            support.missing_tools.push(FUSE_CMD.to_string());
        }
        support.can_format = false;
        support.can_check = false;
        support.can_set_label = false;
        support
    }

    async fn mount(
        &self,
        device: &str,
        target: &Path,
        flags: &[(MountFlag, Option<String>)],
    ) -> Result<MountPoint, FsError> {
        let (ms_flags, data) = mount_flags_to_syscall(flags);
        std::fs::create_dir_all(target)?;

        let mut args = Vec::new();
        if !data.is_empty() {
            args.push("-o".to_string());
            args.push(data.clone());
        }
        args.push(device.to_string());
        args.push(target.display().to_string());

        let out = self.base.run_command(FUSE_CMD, &args).await?;
        if out.exit_code != 0 {
            return Err(FsError::Mount(format!(
                "apfs-fuse mount of {device} on {} failed with exit code {}: {}",
                target.display(),
                out.exit_code,
                out.output
            )));
        }

        Ok(MountPoint {
            path: target.to_path_buf(),
            device: device.to_string(),
            fstype: "apfs".to_string(),
            flags: ms_flags,
            data,
        })
    }

    async fn unmount(&self, target: &Path, force: bool, lazy: bool) -> Result<(), FsError> {
        // FUSE mounts unmount via fusermount3; the plain umount2 path is the
        // fallback when it is missing or fails.
        if self.base.command_exists(FUSERMOUNT_CMD) {
            let args = vec!["-u".to_string(), target.display().to_string()];
            if let Ok(out) = self.base.run_command(FUSERMOUNT_CMD, &args).await {
                if out.exit_code == 0 {
                    return Ok(());
                }
            }
        }
        self.base.unmount(target, force, lazy)
    }

    async fn format(
        &self,
        _token: &CancellationToken,
        _device: &str,
        _options: &FormatOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<(), FsError> {
        self.base.invalidate_cache();
        progress(
            ProgressStatus::Failure,
            0,
            "APFS formatting is not supported on Linux",
        );
        Err(FsError::UnsupportedOperation(
            "APFS formatting is not supported on Linux. APFS is read-only on this system"
                .to_string(),
        ))
    }

    async fn check(
        &self,
        _token: &CancellationToken,
        _device: &str,
        _options: &CheckOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<CheckResult, FsError> {
        self.base.invalidate_cache();
        progress(
            ProgressStatus::Failure,
            0,
            "APFS filesystem checking is not supported on Linux",
        );
        Err(FsError::UnsupportedOperation(
            "APFS filesystem checking is not supported on Linux. APFS is read-only on this system"
                .to_string(),
        ))
    }

    async fn get_label(&self, _device: &str) -> Result<String, FsError> {
        Err(FsError::UnsupportedOperation(
            "APFS label retrieval is not supported on Linux. APFS is read-only on this system"
                .to_string(),
        ))
    }

    async fn set_label(&self, _device: &str, _label: &str) -> Result<(), FsError> {
        self.base.invalidate_cache();
        Err(FsError::UnsupportedOperation(
            "APFS label modification is not supported on Linux. APFS is read-only on this system"
                .to_string(),
        ))
    }

    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError> {
        // No consistency tools exist; report the fixed read-only state.
        let mut state = FilesystemState {
            is_clean: true,
            has_errors: false,
            state_description: "Read-only (no Linux tools)".to_string(),
            ..Default::default()
        };
        state
            .additional_info
            .insert("readOnly".to_string(), "true".to_string());
        state.additional_info.insert(
            "note".to_string(),
            "APFS is read-only on Linux. No format/check tools available.".to_string(),
        );
        state.is_mounted = self.base.is_device_mounted(device).await;
        Ok(state)
    }
}
