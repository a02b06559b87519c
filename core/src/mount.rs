//! Generic Linux mount/unmount primitives and kernel filesystem probing.
//!
//! Adapters delegate here: a typed mount when the filesystem type is known,
//! an untyped "try every kernel-supported type" loop otherwise. Unmount is
//! force/lazy aware. The kernel filesystem list doubles as the mount
//! feasibility check in support probing, independent of userspace tools.

use std::path::{Path, PathBuf};

use nix::mount::{mount as sys_mount, umount2, MntFlags, MsFlags};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FsError;
use crate::types::MountFlag;

/// A successful mount, echoing back what was passed to the kernel.
#[derive(Debug, Clone)]
pub struct MountPoint {
    pub path: PathBuf,
    pub device: String,
    pub fstype: String,
    pub flags: MsFlags,
    pub data: String,
}

/// One line of /proc/filesystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelFilesystem {
    pub name: String,
    /// "nodev" filesystems are virtual and never back a block device.
    pub nodev: bool,
}

/// Filesystems the running kernel supports, read from /proc/filesystems.
pub fn kernel_filesystems() -> Result<Vec<KernelFilesystem>, FsError> {
    let content = std::fs::read_to_string("/proc/filesystems")?;
    Ok(parse_kernel_filesystems(&content))
}

/// Names only, for module-availability checks.
pub fn kernel_filesystem_names() -> Result<Vec<String>, FsError> {
    Ok(kernel_filesystems()?.into_iter().map(|fs| fs.name).collect())
}

fn parse_kernel_filesystems(content: &str) -> Vec<KernelFilesystem> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let first = parts.next()?;
            if first == "nodev" {
                parts.next().map(|name| KernelFilesystem {
                    name: name.to_string(),
                    nodev: true,
                })
            } else {
                Some(KernelFilesystem {
                    name: first.to_string(),
                    nodev: false,
                })
            }
        })
        .collect()
}

/// Mount `source` on `target` with an explicit filesystem type.
///
/// The target directory is created if missing. `data` carries the
/// comma-separated filesystem-specific options for the mount(2) data
/// argument.
pub fn mount(
    source: &str,
    target: &Path,
    fstype: &str,
    data: &str,
    flags: MsFlags,
) -> Result<MountPoint, FsError> {
    std::fs::create_dir_all(target)?;

    let data_opt = if data.is_empty() { None } else { Some(data) };
    sys_mount(Some(source), target, Some(fstype), flags, data_opt).map_err(|errno| {
        FsError::Mount(format!(
            "mount {source} on {} as {fstype}: {errno}",
            target.display()
        ))
    })?;

    debug!(source, target = %target.display(), fstype, "mounted");
    Ok(MountPoint {
        path: target.to_path_buf(),
        device: source.to_string(),
        fstype: fstype.to_string(),
        flags,
        data: data.to_string(),
    })
}

/// Mount without a known filesystem type by trying every block filesystem
/// the kernel supports, in /proc/filesystems order.
pub fn try_mount(
    source: &str,
    target: &Path,
    data: &str,
    flags: MsFlags,
) -> Result<MountPoint, FsError> {
    let candidates: Vec<String> = kernel_filesystems()?
        .into_iter()
        .filter(|fs| !fs.nodev)
        .map(|fs| fs.name)
        .collect();

    for fstype in &candidates {
        match mount(source, target, fstype, data, flags) {
            Ok(mp) => return Ok(mp),
            Err(err) => debug!(source, fstype, %err, "try_mount candidate failed"),
        }
    }

    Err(FsError::Mount(format!(
        "no kernel filesystem type could mount {source} on {}",
        target.display()
    )))
}

/// Unmount `target`. Force detaches busy mounts where the filesystem allows
/// it; lazy detaches the mount point immediately and cleans up references
/// once it is no longer busy.
pub fn unmount(target: &Path, force: bool, lazy: bool) -> Result<(), FsError> {
    let mut flags = MntFlags::empty();
    if force {
        flags |= MntFlags::MNT_FORCE;
    }
    if lazy {
        flags |= MntFlags::MNT_DETACH;
    }

    umount2(target, flags).map_err(|errno| {
        FsError::Unmount(format!(
            "umount {} (force={force}, lazy={lazy}): {errno}",
            target.display()
        ))
    })
}

/// Common, filesystem-agnostic mount flags every adapter's vocabulary is
/// layered on top of.
pub fn standard_mount_flags() -> Vec<MountFlag> {
    vec![
        MountFlag::simple("ro", "Mount read-only"),
        MountFlag::simple("rw", "Mount read-write (default)"),
        MountFlag::simple("sync", "All I/O to the filesystem should be done synchronously"),
        MountFlag::simple("async", "All I/O to the filesystem should be done asynchronously"),
        MountFlag::simple("atime", "Update inode access times (default)"),
        MountFlag::simple("noatime", "Do not update inode access times"),
        MountFlag::simple("diratime", "Update directory inode access times"),
        MountFlag::simple("nodiratime", "Do not update directory inode access times"),
        MountFlag::simple("dev", "Interpret character or block special devices"),
        MountFlag::simple("nodev", "Do not interpret character or block special devices"),
        MountFlag::simple("exec", "Permit execution of binaries"),
        MountFlag::simple("noexec", "Do not permit execution of binaries"),
        MountFlag::simple("suid", "Permit set-user-id or set-group-id bits to take effect"),
        MountFlag::simple("nosuid", "Do not permit set-user-id or set-group-id bits"),
        MountFlag::simple("remount", "Attempt to remount an already-mounted filesystem"),
        MountFlag::simple("defaults", "Use default options: rw, suid, dev, exec, auto, nouser, async"),
        MountFlag::simple("relatime", "Update inode access times relative to modify or change time"),
    ]
}

/// Kernel flag for a named mount option, if the name maps to an MS_* bit
/// rather than filesystem-specific data.
pub fn syscall_flag_for(name: &str) -> Option<MsFlags> {
    let flag = match name {
        "ro" => MsFlags::MS_RDONLY,
        "nosuid" => MsFlags::MS_NOSUID,
        "nodev" => MsFlags::MS_NODEV,
        "noexec" => MsFlags::MS_NOEXEC,
        "sync" => MsFlags::MS_SYNCHRONOUS,
        "remount" => MsFlags::MS_REMOUNT,
        "mand" => MsFlags::MS_MANDLOCK,
        "dirsync" => MsFlags::MS_DIRSYNC,
        "noatime" => MsFlags::MS_NOATIME,
        "nodiratime" => MsFlags::MS_NODIRATIME,
        "bind" => MsFlags::MS_BIND,
        "rec" => MsFlags::MS_REC,
        "silent" => MsFlags::MS_SILENT,
        "posixacl" | "acl" => MsFlags::MS_POSIXACL,
        "unbindable" => MsFlags::MS_UNBINDABLE,
        "private" => MsFlags::MS_PRIVATE,
        "slave" => MsFlags::MS_SLAVE,
        "shared" => MsFlags::MS_SHARED,
        "relatime" => MsFlags::MS_RELATIME,
        "strictatime" => MsFlags::MS_STRICTATIME,
        _ => return None,
    };
    Some(flag)
}

/// Split a mount-flag list into the MS_* bits and the data string for
/// mount(2). Flags with no kernel bit become `name` or `name=value` entries
/// in the data argument.
pub fn mount_flags_to_syscall(input: &[(MountFlag, Option<String>)]) -> (MsFlags, String) {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();

    for (flag, value) in input {
        if let Some(bit) = syscall_flag_for(&flag.name) {
            flags |= bit;
        } else if let Some(value) = value {
            data.push(format!("{}={value}", flag.name));
        } else {
            data.push(flag.name.clone());
        }
    }

    (flags, data.join(","))
}
