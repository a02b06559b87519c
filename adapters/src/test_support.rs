//! Helpers for adapter tests: fake CLI tools on disk and progress
//! transcripts.

use std::path::Path;
use std::sync::Mutex;

use fsprov_core::progress::ProgressStatus;

/// Records the (status, percent) sequence of a progress stream.
#[derive(Default)]
pub(crate) struct Transcript(Mutex<Vec<(ProgressStatus, u16)>>);

impl Transcript {
    pub(crate) fn push(&self, status: ProgressStatus, percent: u16) {
        self.0.lock().unwrap().push((status, percent));
    }

    pub(crate) fn take(&self) -> Vec<(ProgressStatus, u16)> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) fn transcript(
    events: &Transcript,
) -> impl Fn(ProgressStatus, u16, &str) + Send + Sync + '_ {
    move |status, percent, _note| events.push(status, percent)
}

/// Write an executable shell script standing in for a filesystem tool.
pub(crate) fn fake_tool(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
