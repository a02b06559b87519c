use serde::{Deserialize, Serialize};

/// Status stream for long-running operations (format, check).
///
/// The contract: exactly one `Start`, zero or more `Running`, then exactly
/// one terminal `Success` or `Failure`. Percent is 100 on success, 0 on
/// failure, and [`PERCENT_INDETERMINATE`] or 0-100 while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Start,
    Running,
    Success,
    Failure,
}

/// Reported while running when the underlying tool exposes no native
/// percentage. None of the mkfs/fsck tools driven here do.
pub const PERCENT_INDETERMINATE: u16 = 999;

/// Caller-supplied callback invoked with (status, percent, note).
///
/// Callbacks run synchronously on the operation's reader tasks and must not
/// block indefinitely. Every tool output line is delivered as a `Running`
/// note before the terminal status.
pub type ProgressCallback<'a> = &'a (dyn Fn(ProgressStatus, u16, &str) + Send + Sync);
