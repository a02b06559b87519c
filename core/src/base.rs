//! Shared scaffolding embedded by every concrete adapter: identity metadata,
//! tool-availability probing, cached command execution, streaming tool runs,
//! and the generic mount/unmount delegation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::mount::MsFlags;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CachedCommandResult, CommandCache};
use crate::detect;
use crate::error::FsError;
use crate::exec::{self, CommandOutput, CommandResult};
use crate::mount::{self, MountPoint};
use crate::progress::{ProgressCallback, ProgressStatus, PERCENT_INDETERMINATE};
use crate::types::{FilesystemSupport, FsMagicSignature};

/// The external CLI tools an adapter drives, by role. `None` means the
/// filesystem has no tool for that role (e.g. GFS2 has no label command).
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolSet {
    pub mkfs: Option<&'static str>,
    pub fsck: Option<&'static str>,
    pub label: Option<&'static str>,
    pub state: Option<&'static str>,
}

/// Collected output of a streamed tool run.
#[derive(Debug)]
pub struct ToolRun {
    /// Joined stdout lines.
    pub output: String,
    /// Joined stderr lines.
    pub stderr: String,
    pub result: CommandResult,
}

/// Shared base value composed into every concrete adapter.
///
/// Stateless besides the injected command cache; constructed once at
/// registry setup and kept for process lifetime.
pub struct BaseAdapter {
    name: &'static str,
    description: &'static str,
    /// Kernel module / fstype used for mounting when it differs from the
    /// adapter name (e.g. ntfs mounts through "ntfs3").
    linux_fs_module: Option<&'static str>,
    package_hint: &'static str,
    tools: ToolSet,
    signatures: &'static [FsMagicSignature],
    cache: Arc<CommandCache>,
    tool_dir: Option<PathBuf>,
}

impl BaseAdapter {
    pub fn new(
        name: &'static str,
        description: &'static str,
        package_hint: &'static str,
        tools: ToolSet,
        signatures: &'static [FsMagicSignature],
        cache: Arc<CommandCache>,
    ) -> Self {
        Self {
            name,
            description,
            linux_fs_module: None,
            package_hint,
            tools,
            signatures,
            cache,
            tool_dir: None,
        }
    }

    /// Override the kernel fstype used for mounting.
    pub fn with_fs_module(mut self, module: &'static str) -> Self {
        self.linux_fs_module = Some(module);
        self
    }

    /// Resolve tools from a fixed directory before falling back to PATH.
    /// Useful for appliances shipping their own tool bundle, and as an exec
    /// seam in tests.
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn linux_fs_module(&self) -> &'static str {
        self.linux_fs_module.unwrap_or(self.name)
    }

    pub fn package_hint(&self) -> &'static str {
        self.package_hint
    }

    pub fn tools(&self) -> ToolSet {
        self.tools
    }

    pub fn signatures(&self) -> &'static [FsMagicSignature] {
        self.signatures
    }

    /// Whether `command` can be launched: present in the tool directory (if
    /// configured) or on PATH.
    pub fn command_exists(&self, command: &str) -> bool {
        if let Some(dir) = &self.tool_dir {
            if dir.join(command).is_file() {
                return true;
            }
        }
        which::which(command).is_ok()
    }

    fn resolve_command(&self, command: &str) -> PathBuf {
        if let Some(dir) = &self.tool_dir {
            let candidate = dir.join(command);
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(command)
    }

    /// Probe which operations this host can perform for the filesystem.
    ///
    /// Mount feasibility comes from the kernel filesystem list; everything
    /// else from tool presence. Tool absence is reported, never an error.
    pub fn check_command_availability(&self) -> FilesystemSupport {
        match mount::kernel_filesystem_names() {
            Ok(names) => self.check_command_availability_with(&names),
            Err(err) => {
                // Unreadable kernel list is not evidence of a missing module.
                warn!(
                    filesystem = self.name,
                    %err,
                    "failed to read kernel filesystem list, skipping module gate"
                );
                self.probe_tools()
            }
        }
    }

    /// Same probe against an explicit kernel filesystem list.
    pub fn check_command_availability_with(&self, kernel_filesystems: &[String]) -> FilesystemSupport {
        if !kernel_filesystems.iter().any(|fs| fs == self.linux_fs_module()) {
            debug!(
                filesystem = self.linux_fs_module(),
                "kernel module not present, denying all operations"
            );
            let missing = [self.tools.mkfs, self.tools.fsck, self.tools.label, self.tools.state]
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();
            return FilesystemSupport {
                package_hint: self.package_hint.to_string(),
                missing_tools: missing,
                ..Default::default()
            };
        }

        self.probe_tools()
    }

    /// Tool-presence probe with mounting assumed possible.
    fn probe_tools(&self) -> FilesystemSupport {
        let mut support = FilesystemSupport {
            // Mounting does not depend on userspace tools.
            can_mount: true,
            package_hint: self.package_hint.to_string(),
            ..Default::default()
        };

        let mut probe = |tool: Option<&'static str>, capability: &mut bool| {
            if let Some(tool) = tool {
                *capability = self.command_exists(tool);
                if !*capability {
                    support_missing(&mut support.missing_tools, tool);
                }
            }
        };

        let mut can_format = false;
        let mut can_check = false;
        let mut can_set_label = false;
        let mut can_get_state = false;
        probe(self.tools.mkfs, &mut can_format);
        probe(self.tools.fsck, &mut can_check);
        probe(self.tools.label, &mut can_set_label);
        probe(self.tools.state, &mut can_get_state);
        support.can_format = can_format;
        support.can_check = can_check;
        support.can_set_label = can_set_label;
        support.can_get_state = can_get_state;

        support
    }

    /// Run a command to completion. Non-zero exit codes are returned in the
    /// output, not as errors.
    pub async fn run_command(&self, command: &str, args: &[String]) -> Result<CommandOutput, FsError> {
        exec::run_command(self.resolve_command(command), args).await
    }

    /// Memoized variant for read-only probes. At most one real execution per
    /// unique (command, args) key within the cache TTL.
    pub async fn run_command_cached(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutput, FsError> {
        let key = CommandCache::key(command, args);
        if let Some(cached) = self.cache.get(&key) {
            return match cached.error {
                Some(message) => Err(FsError::ToolExecutionFailure {
                    command: command.to_string(),
                    exit_code: cached.exit_code,
                    output: message,
                }),
                None => Ok(CommandOutput {
                    output: cached.output,
                    exit_code: cached.exit_code,
                }),
            };
        }

        let outcome = self.run_command(command, args).await;
        let entry = match &outcome {
            Ok(out) => CachedCommandResult {
                output: out.output.clone(),
                exit_code: out.exit_code,
                error: None,
            },
            Err(err) => CachedCommandResult {
                output: String::new(),
                exit_code: err.exit_code().unwrap_or(-1),
                error: Some(err.to_string()),
            },
        };
        self.cache.put(key, entry);
        outcome
    }

    /// Flush the shared command cache. Must be called after any mutating
    /// command so the next probe reads fresh on-disk state.
    pub fn invalidate_cache(&self) {
        self.cache.flush();
    }

    /// Run a long operation, forwarding every stdout/stderr line to the
    /// progress callback as an indeterminate `Running` note. Returns only
    /// after both pipes are drained and the tool has exited.
    pub async fn run_tool_streaming(
        &self,
        token: &CancellationToken,
        command: &str,
        args: &[String],
        progress: ProgressCallback<'_>,
    ) -> ToolRun {
        let mut stream = exec::spawn_streaming(token.clone(), self.resolve_command(command), args);

        let mut output_lines: Vec<String> = Vec::new();
        let mut stderr_lines: Vec<String> = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stream.stdout.recv(), if !stdout_done => match line {
                    Some(line) => {
                        progress(ProgressStatus::Running, PERCENT_INDETERMINATE, &line);
                        output_lines.push(line);
                    }
                    None => stdout_done = true,
                },
                line = stream.stderr.recv(), if !stderr_done => match line {
                    Some(line) => {
                        let note = format!("ERROR: {line}");
                        progress(ProgressStatus::Running, PERCENT_INDETERMINATE, &note);
                        stderr_lines.push(line);
                    }
                    None => stderr_done = true,
                },
            }
        }

        let result = match stream.result.await {
            Ok(result) => result,
            Err(_) => CommandResult {
                exit_code: -1,
                error: Some(FsError::ToolExecutionFailure {
                    command: command.to_string(),
                    exit_code: -1,
                    output: "command result channel closed unexpectedly".to_string(),
                }),
            },
        };

        ToolRun {
            output: output_lines.join("\n"),
            stderr: stderr_lines.join("\n"),
            result,
        }
    }

    /// Signature-based support check; works without any tool installed.
    pub fn is_device_supported(&self, device_path: &str) -> Result<bool, FsError> {
        detect::device_matches_signatures(device_path, self.signatures)
    }

    /// Generic mount: typed when `fstype` is given, otherwise try every
    /// kernel-supported block filesystem.
    pub fn mount(
        &self,
        source: &str,
        target: &Path,
        fstype: &str,
        data: &str,
        flags: MsFlags,
    ) -> Result<MountPoint, FsError> {
        if fstype.is_empty() {
            mount::try_mount(source, target, data, flags)
        } else {
            mount::mount(source, target, fstype, data, flags)
        }
    }

    pub fn unmount(&self, target: &Path, force: bool, lazy: bool) -> Result<(), FsError> {
        mount::unmount(target, force, lazy)
    }

    /// Cross-reference the live mount table for `device`. Uses the cached
    /// `mount` probe; callers mutating the device must invalidate first.
    pub async fn is_device_mounted(&self, device: &str) -> bool {
        match self.run_command_cached("mount", &[]).await {
            Ok(out) => out.output.contains(device),
            Err(err) => {
                warn!(device, %err, "failed to read mount table");
                false
            }
        }
    }
}

fn support_missing(missing: &mut Vec<String>, tool: &str) {
    if !missing.iter().any(|t| t == tool) {
        missing.push(tool.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGS: &[FsMagicSignature] = &[FsMagicSignature {
        offset: 0,
        magic: b"TEST",
    }];

    fn base(tools: ToolSet) -> BaseAdapter {
        BaseAdapter::new(
            "testfs",
            "Test Filesystem",
            "testfs-tools",
            tools,
            SIGS,
            Arc::new(CommandCache::new()),
        )
    }

    #[test]
    fn fs_module_defaults_to_name() {
        let adapter = base(ToolSet::default());
        assert_eq!(adapter.linux_fs_module(), "testfs");
        let overridden = base(ToolSet::default()).with_fs_module("testfs3");
        assert_eq!(overridden.linux_fs_module(), "testfs3");
    }

    #[test]
    fn missing_kernel_module_denies_everything() {
        let adapter = base(ToolSet {
            mkfs: Some("mkfs.testfs"),
            fsck: Some("fsck.testfs"),
            label: Some("testfs-label"),
            state: Some("fsck.testfs"),
        });
        let support = adapter.check_command_availability_with(&["ext4".to_string()]);
        assert!(!support.can_mount);
        assert!(!support.can_format);
        assert!(!support.can_check);
        assert_eq!(support.package_hint, "testfs-tools");
        assert!(support.missing_tools.contains(&"mkfs.testfs".to_string()));
        assert!(support.missing_tools.contains(&"fsck.testfs".to_string()));
    }

    #[test]
    fn kernel_module_present_enables_mount() {
        let adapter = base(ToolSet::default());
        let support = adapter.check_command_availability_with(&["testfs".to_string()]);
        assert!(support.can_mount);
        // No tools configured, nothing probed, nothing missing.
        assert!(!support.can_format);
        assert!(support.missing_tools.is_empty());
    }

    #[test]
    fn unreadable_kernel_list_still_probes_tools() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mkfs.testfs");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = base(ToolSet {
            mkfs: Some("mkfs.testfs"),
            fsck: Some("fsck.testfs"),
            ..Default::default()
        })
        .with_tool_dir(dir.path());

        // The path taken when /proc/filesystems cannot be read: mounting is
        // assumed possible and tools are still probed individually.
        let support = adapter.probe_tools();
        assert!(support.can_mount);
        assert!(support.can_format);
        assert!(!support.can_check);
        assert_eq!(support.missing_tools, vec!["fsck.testfs".to_string()]);
    }

    #[test]
    fn tool_probe_uses_tool_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mkfs.testfs");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = base(ToolSet {
            mkfs: Some("mkfs.testfs"),
            ..Default::default()
        })
        .with_tool_dir(dir.path());

        let support = adapter.check_command_availability_with(&["testfs".to_string()]);
        assert!(support.can_format);
        assert!(support.missing_tools.is_empty());
    }

    #[tokio::test]
    async fn cached_run_executes_once_per_ttl() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // Appends to a counter file on every real execution.
        let marker = dir.path().join("count");
        let tool = dir.path().join("probe");
        std::fs::write(
            &tool,
            format!("#!/bin/sh\necho x >> {}\necho probed\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = base(ToolSet::default()).with_tool_dir(dir.path());

        let first = adapter.run_command_cached("probe", &[]).await.unwrap();
        let second = adapter.run_command_cached("probe", &[]).await.unwrap();
        assert_eq!(first.output, "probed");
        assert_eq!(second.output, "probed");
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);

        adapter.invalidate_cache();
        adapter.run_command_cached("probe", &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn streaming_forwards_lines_to_progress() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mkfs.testfs");
        std::fs::write(&tool, "#!/bin/sh\necho creating\necho oops >&2\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let adapter = base(ToolSet::default()).with_tool_dir(dir.path());
        let notes: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let token = CancellationToken::new();

        let run = adapter
            .run_tool_streaming(&token, "mkfs.testfs", &[], &|status, percent, note| {
                assert_eq!(status, ProgressStatus::Running);
                assert_eq!(percent, PERCENT_INDETERMINATE);
                notes.lock().unwrap().push(note.to_string());
            })
            .await;

        assert_eq!(run.output, "creating");
        assert_eq!(run.stderr, "oops");
        assert_eq!(run.result.exit_code, 0);
        let notes = notes.into_inner().unwrap();
        assert!(notes.contains(&"creating".to_string()));
        assert!(notes.contains(&"ERROR: oops".to_string()));
    }
}
