use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to access device {path}: {source}")]
    DeviceAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown filesystem type on {0}")]
    UnknownFilesystem(String),

    #[error("No adapter registered for filesystem type: {0}")]
    AdapterNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{command} failed with exit code {exit_code}: {output}")]
    ToolExecutionFailure {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Mount failed: {0}")]
    Mount(String),

    #[error("Unmount failed: {0}")]
    Unmount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Exit code carried by the error, if the underlying tool produced one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FsError::ToolExecutionFailure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
