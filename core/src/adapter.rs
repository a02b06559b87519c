//! The uniform contract every filesystem adapter implements.
//!
//! Concrete adapters compose a [`BaseAdapter`] and implement the per-tool
//! operations; identity, detection, support probing and generic mounting
//! come from the default methods here.

use std::path::Path;

use async_trait::async_trait;
use nix::mount::MsFlags;
use tokio_util::sync::CancellationToken;

use crate::base::BaseAdapter;
use crate::detect;
use crate::error::FsError;
use crate::mount::{self, MountPoint};
use crate::progress::ProgressCallback;
use crate::types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

/// One filesystem's driver. Object-safe so the registry can hold a
/// heterogeneous set behind `Arc<dyn FilesystemAdapter>`.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    /// The shared base this adapter is built on.
    fn base(&self) -> &BaseAdapter;

    /// Canonical filesystem type name ("ext4", "vfat", ...), also the
    /// registry key.
    fn name(&self) -> &'static str {
        self.base().name()
    }

    fn description(&self) -> &'static str {
        self.base().description()
    }

    /// Kernel fstype passed to mount(2). Usually the adapter name.
    fn linux_fs_module(&self) -> &'static str {
        self.base().linux_fs_module()
    }

    /// Magic signatures identifying this filesystem on raw devices.
    fn signatures(&self) -> &'static [FsMagicSignature] {
        self.base().signatures()
    }

    /// Whether `device_path` carries this filesystem, by magic signature.
    fn is_device_supported(&self, device_path: &str) -> Result<bool, FsError> {
        detect::device_matches_signatures(device_path, self.signatures())
    }

    /// What this host can currently do for the filesystem.
    fn is_supported(&self) -> FilesystemSupport {
        self.base().check_command_availability()
    }

    /// The filesystem-specific mount options, on top of the shared
    /// [`mount::standard_mount_flags`] vocabulary.
    fn mount_flags(&self) -> Vec<MountFlag>;

    /// Mount `device` on `target` with the given flag selection.
    async fn mount(
        &self,
        device: &str,
        target: &Path,
        flags: &[(MountFlag, Option<String>)],
    ) -> Result<MountPoint, FsError> {
        let (ms_flags, data) = mount::mount_flags_to_syscall(flags);
        self.base()
            .mount(device, target, self.linux_fs_module(), &data, ms_flags)
    }

    async fn unmount(&self, target: &Path, force: bool, lazy: bool) -> Result<(), FsError> {
        self.base().unmount(target, force, lazy)
    }

    /// Remount an already-mounted filesystem with new flags.
    async fn remount(
        &self,
        device: &str,
        target: &Path,
        flags: &[(MountFlag, Option<String>)],
    ) -> Result<MountPoint, FsError> {
        let (ms_flags, data) = mount::mount_flags_to_syscall(flags);
        self.base().mount(
            device,
            target,
            self.linux_fs_module(),
            &data,
            ms_flags | MsFlags::MS_REMOUNT,
        )
    }

    /// Create the filesystem on `device`, destroying its contents.
    ///
    /// Emits the full progress sequence (one Start, streamed Running notes,
    /// one terminal Success or Failure) even on error paths.
    async fn format(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &FormatOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<(), FsError>;

    /// Check filesystem consistency, optionally repairing. Non-zero tool
    /// exit codes that mean "errors found/fixed" are reported in the result,
    /// not as errors.
    async fn check(
        &self,
        token: &CancellationToken,
        device: &str,
        options: &CheckOptions,
        progress: ProgressCallback<'_>,
    ) -> Result<CheckResult, FsError>;

    /// Current label, or empty string when none is set.
    async fn get_label(&self, device: &str) -> Result<String, FsError>;

    async fn set_label(&self, device: &str, label: &str) -> Result<(), FsError>;

    /// Health snapshot: cleanliness, mount status, adapter-specific extras.
    async fn get_state(&self, device: &str) -> Result<FilesystemState, FsError>;
}
