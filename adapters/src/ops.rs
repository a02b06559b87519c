//! Shared choreography for the long-running adapter operations.
//!
//! Every format and check follows the same sequence: one `Start`, an
//! indeterminate-progress note, every tool output line as a `Running` note,
//! cache invalidation, then exactly one terminal `Success` or `Failure`.
//! Only the argument lists and exit-code interpretation differ per
//! filesystem, so those stay in the adapters.

use fsprov_core::base::BaseAdapter;
use fsprov_core::error::FsError;
use fsprov_core::exec::CommandOutput;
use fsprov_core::progress::{ProgressCallback, ProgressStatus, PERCENT_INDETERMINATE};
use fsprov_core::types::{CheckResult, FilesystemState};
use tokio_util::sync::CancellationToken;

/// Per-filesystem reading of a check tool's exit code and output.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CheckVerdict {
    pub success: bool,
    pub errors_found: bool,
    pub errors_fixed: bool,
}

impl CheckVerdict {
    pub(crate) fn clean() -> Self {
        Self {
            success: true,
            errors_found: false,
            errors_fixed: false,
        }
    }

    pub(crate) fn corrected() -> Self {
        Self {
            success: true,
            errors_found: true,
            errors_fixed: true,
        }
    }

    pub(crate) fn uncorrected() -> Self {
        Self {
            success: false,
            errors_found: true,
            errors_fixed: false,
        }
    }

    /// Errors detected by a completed run; fixed only when repair was on.
    pub(crate) fn found(fixed: bool) -> Self {
        Self {
            success: true,
            errors_found: true,
            errors_fixed: fixed,
        }
    }
}

/// Run a mkfs tool with full progress choreography. The command cache is
/// flushed regardless of outcome since the device may have been written.
pub(crate) async fn format_with(
    base: &BaseAdapter,
    token: &CancellationToken,
    command: &str,
    args: &[String],
    progress: ProgressCallback<'_>,
) -> Result<(), FsError> {
    progress(
        ProgressStatus::Start,
        0,
        &format!("Starting {} format", base.name()),
    );
    progress(
        ProgressStatus::Running,
        PERCENT_INDETERMINATE,
        "Progress Status Not Supported",
    );

    let run = base.run_tool_streaming(token, command, args, progress).await;
    base.invalidate_cache();

    match run.result.error {
        Some(err) => {
            progress(ProgressStatus::Failure, 0, &format!("Format failed: {err}"));
            Err(err)
        }
        None if run.result.exit_code == 0 => {
            progress(ProgressStatus::Success, 100, "Format completed successfully");
            Ok(())
        }
        None => {
            progress(
                ProgressStatus::Failure,
                0,
                &format!("{command} failed with exit code {}", run.result.exit_code),
            );
            Err(FsError::ToolExecutionFailure {
                command: command.to_string(),
                exit_code: run.result.exit_code,
                output: run.output,
            })
        }
    }
}

/// Run a fsck tool with full progress choreography, mapping its exit code
/// and output through `interpret`. Launch failures and cancellation are
/// errors; any exit code that `interpret` can read is a result.
pub(crate) async fn check_with(
    base: &BaseAdapter,
    token: &CancellationToken,
    command: &str,
    args: &[String],
    progress: ProgressCallback<'_>,
    interpret: impl FnOnce(i32, &str) -> CheckVerdict,
) -> Result<CheckResult, FsError> {
    progress(
        ProgressStatus::Start,
        0,
        &format!("Starting {} filesystem check", base.name()),
    );
    progress(
        ProgressStatus::Running,
        PERCENT_INDETERMINATE,
        "Progress Status Not Supported",
    );

    let run = base.run_tool_streaming(token, command, args, progress).await;
    base.invalidate_cache();

    if let Some(err) = run.result.error {
        progress(ProgressStatus::Failure, 0, &format!("Check failed: {err}"));
        return Err(err);
    }

    let verdict = interpret(run.result.exit_code, &run.output);
    if verdict.success {
        let note = if verdict.errors_fixed {
            "Check completed: errors corrected"
        } else if verdict.errors_found {
            "Check completed: errors found"
        } else {
            "Check completed: no errors found"
        };
        progress(ProgressStatus::Success, 100, note);
    } else {
        progress(
            ProgressStatus::Failure,
            0,
            &format!("Check failed with exit code {}", run.result.exit_code),
        );
    }

    Ok(CheckResult {
        success: verdict.success,
        errors_found: verdict.errors_found,
        errors_fixed: verdict.errors_fixed,
        message: run.output,
        exit_code: run.result.exit_code,
    })
}

/// Run a command and treat any non-zero exit as a hard failure.
pub(crate) async fn run_expect_success(
    base: &BaseAdapter,
    command: &str,
    args: &[String],
) -> Result<CommandOutput, FsError> {
    let out = base.run_command(command, args).await?;
    if out.exit_code != 0 {
        return Err(FsError::ToolExecutionFailure {
            command: command.to_string(),
            exit_code: out.exit_code,
            output: out.output,
        });
    }
    Ok(out)
}

/// Cached variant of [`run_expect_success`] for read-only probes (label
/// reads, state queries).
pub(crate) async fn probe_expect_success(
    base: &BaseAdapter,
    command: &str,
    args: &[String],
) -> Result<CommandOutput, FsError> {
    let out = base.run_command_cached(command, args).await?;
    if out.exit_code != 0 {
        return Err(FsError::ToolExecutionFailure {
            command: command.to_string(),
            exit_code: out.exit_code,
            output: out.output,
        });
    }
    Ok(out)
}

/// State snapshot for filesystems whose only health probe is their fsck
/// tool in read-only mode: exit 0 means clean, anything else means errors.
pub(crate) async fn state_from_fsck(
    base: &BaseAdapter,
    command: &str,
    args: &[String],
    device: &str,
    info_key: &str,
) -> Result<FilesystemState, FsError> {
    let out = base.run_command_cached(command, args).await?;
    let clean = out.exit_code == 0;
    let mut state = FilesystemState {
        is_clean: clean,
        has_errors: !clean,
        state_description: if clean { "Clean" } else { "Has errors" }.to_string(),
        ..Default::default()
    };
    if !out.output.is_empty() {
        state.additional_info.insert(info_key.to_string(), out.output);
    }
    state.is_mounted = base.is_device_mounted(device).await;
    Ok(state)
}

/// Label-change wrapper: the cache is flushed even when the tool fails,
/// since it may have partially applied the change.
pub(crate) async fn set_label_with(
    base: &BaseAdapter,
    command: &str,
    args: &[String],
) -> Result<(), FsError> {
    let result = run_expect_success(base, command, args).await.map(|_| ());
    base.invalidate_cache();
    result
}
