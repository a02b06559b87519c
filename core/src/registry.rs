//! Adapter registry: the single lookup point mapping filesystem type names
//! to their drivers, preserving registration order for detection priority.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::adapter::FilesystemAdapter;
use crate::detect;
use crate::error::FsError;
use crate::types::FilesystemSupport;

#[derive(Default)]
pub struct Registry {
    adapters: HashMap<String, Arc<dyn FilesystemAdapter>>,
    /// Registration order, which is also signature-detection priority.
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its canonical name. Re-registering a name
    /// replaces the previous adapter but keeps its original priority slot.
    pub fn register(&mut self, adapter: Arc<dyn FilesystemAdapter>) {
        let name = adapter.name().to_string();
        info!(filesystem = %name, "registering filesystem adapter");
        if self.adapters.insert(name.clone(), adapter).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn FilesystemAdapter>, FsError> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| FsError::AdapterNotFound(name.to_string()))
    }

    /// All adapters in registration order.
    pub fn get_all(&self) -> Vec<Arc<dyn FilesystemAdapter>> {
        self.order
            .iter()
            .filter_map(|name| self.adapters.get(name).cloned())
            .collect()
    }

    /// Registered filesystem type names, in registration order.
    pub fn list_supported_types(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Host capability snapshot for every registered filesystem.
    pub fn get_supported_filesystems(&self) -> HashMap<String, FilesystemSupport> {
        self.get_all()
            .into_iter()
            .map(|adapter| (adapter.name().to_string(), adapter.is_supported()))
            .collect()
    }

    /// Classify a device by magic signatures, in registration order.
    pub fn detect_filesystem_type(&self, device_path: &str) -> Result<String, FsError> {
        detect::detect_filesystem_type(device_path, &self.get_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{BaseAdapter, ToolSet};
    use crate::cache::CommandCache;
    use crate::progress::ProgressCallback;
    use crate::types::{
        CheckOptions, CheckResult, FilesystemState, FormatOptions, FsMagicSignature, MountFlag,
    };
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct StubAdapter {
        base: BaseAdapter,
    }

    impl StubAdapter {
        fn new(name: &'static str, signatures: &'static [FsMagicSignature]) -> Self {
            Self {
                base: BaseAdapter::new(
                    name,
                    "stub",
                    "stub-tools",
                    ToolSet::default(),
                    signatures,
                    Arc::new(CommandCache::new()),
                ),
            }
        }
    }

    #[async_trait]
    impl FilesystemAdapter for StubAdapter {
        fn base(&self) -> &BaseAdapter {
            &self.base
        }

        fn mount_flags(&self) -> Vec<MountFlag> {
            Vec::new()
        }

        async fn format(
            &self,
            _token: &CancellationToken,
            _device: &str,
            _options: &FormatOptions,
            _progress: ProgressCallback<'_>,
        ) -> Result<(), FsError> {
            Ok(())
        }

        async fn check(
            &self,
            _token: &CancellationToken,
            _device: &str,
            _options: &CheckOptions,
            _progress: ProgressCallback<'_>,
        ) -> Result<CheckResult, FsError> {
            Ok(CheckResult::default())
        }

        async fn get_label(&self, _device: &str) -> Result<String, FsError> {
            Ok(String::new())
        }

        async fn set_label(&self, _device: &str, _label: &str) -> Result<(), FsError> {
            Ok(())
        }

        async fn get_state(&self, _device: &str) -> Result<FilesystemState, FsError> {
            Ok(FilesystemState::default())
        }
    }

    const ALPHA_SIG: &[FsMagicSignature] = &[FsMagicSignature {
        offset: 0,
        magic: b"ALFA",
    }];
    const BETA_SIG: &[FsMagicSignature] = &[FsMagicSignature {
        offset: 0,
        magic: b"BETA",
    }];

    #[test]
    fn lookup_by_name() {
        let mut registry = Registry::new();
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        assert_eq!(registry.get("alphafs").unwrap().name(), "alphafs");
        assert!(matches!(
            registry.get("missing"),
            Err(FsError::AdapterNotFound(_))
        ));
    }

    #[test]
    fn iteration_preserves_registration_order() {
        let mut registry = Registry::new();
        registry.register(Arc::new(StubAdapter::new("betafs", BETA_SIG)));
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        assert_eq!(registry.list_supported_types(), vec!["betafs", "alphafs"]);
        let names: Vec<_> = registry.get_all().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["betafs", "alphafs"]);
    }

    #[test]
    fn reregistration_replaces_without_duplicating() {
        let mut registry = Registry::new();
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detection_uses_registration_priority() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"BETA").unwrap();
        let path = file.path().to_str().unwrap();

        let mut registry = Registry::new();
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        registry.register(Arc::new(StubAdapter::new("betafs", BETA_SIG)));
        assert_eq!(registry.detect_filesystem_type(path).unwrap(), "betafs");
    }

    #[test]
    fn detection_of_blank_device_is_unknown() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let mut registry = Registry::new();
        registry.register(Arc::new(StubAdapter::new("alphafs", ALPHA_SIG)));
        assert!(matches!(
            registry.detect_filesystem_type(path),
            Err(FsError::UnknownFilesystem(_))
        ));
    }
}
