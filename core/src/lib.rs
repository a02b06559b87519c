//! Core abstractions for filesystem provisioning on Linux NAS hosts:
//! the adapter contract, magic-number detection, command execution with
//! caching and streaming progress, and generic mount plumbing.

pub mod adapter;
pub mod base;
pub mod cache;
pub mod detect;
pub mod error;
pub mod exec;
pub mod mount;
pub mod progress;
pub mod registry;
pub mod types;

pub use adapter::FilesystemAdapter;
pub use base::{BaseAdapter, ToolRun, ToolSet};
pub use cache::{CachedCommandResult, CommandCache, COMMAND_CACHE_TTL};
pub use detect::{detect_filesystem_type, device_matches_signatures, MAX_DEVICE_READ_LENGTH};
pub use error::FsError;
pub use exec::{run_command, spawn_streaming, CommandOutput, CommandResult, CommandStream};
pub use mount::{
    kernel_filesystems, mount_flags_to_syscall, standard_mount_flags, syscall_flag_for,
    KernelFilesystem, MountPoint,
};
pub use progress::{ProgressCallback, ProgressStatus, PERCENT_INDETERMINATE};
pub use registry::Registry;
pub use types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};
