//! Built-in adapter registration.

use std::sync::Arc;

use fsprov_core::cache::CommandCache;
use fsprov_core::registry::Registry;

use crate::apfs::ApfsAdapter;
use crate::btrfs::BtrfsAdapter;
use crate::exfat::ExfatAdapter;
use crate::ext4::Ext4Adapter;
use crate::f2fs::F2fsAdapter;
use crate::gfs2::Gfs2Adapter;
use crate::hfsplus::HfsplusAdapter;
use crate::ntfs::NtfsAdapter;
use crate::reiserfs::ReiserfsAdapter;
use crate::vfat::VfatAdapter;
use crate::xfs::XfsAdapter;

/// Build a registry holding every built-in adapter, all sharing one command
/// cache. Registration order is signature-detection priority: filesystems
/// with deep, specific magic offsets come before the FAT family, whose
/// signatures sit in the first sectors where stale boot-sector remnants are
/// common.
pub fn builtin_registry() -> Registry {
    let cache = Arc::new(CommandCache::new());
    let mut registry = Registry::new();
    registry.register(Arc::new(Ext4Adapter::new(cache.clone())));
    registry.register(Arc::new(BtrfsAdapter::new(cache.clone())));
    registry.register(Arc::new(XfsAdapter::new(cache.clone())));
    registry.register(Arc::new(F2fsAdapter::new(cache.clone())));
    registry.register(Arc::new(Gfs2Adapter::new(cache.clone())));
    registry.register(Arc::new(HfsplusAdapter::new(cache.clone())));
    registry.register(Arc::new(ReiserfsAdapter::new(cache.clone())));
    registry.register(Arc::new(ApfsAdapter::new(cache.clone())));
    registry.register(Arc::new(NtfsAdapter::new(cache.clone())));
    registry.register(Arc::new(ExfatAdapter::new(cache.clone())));
    registry.register(Arc::new(VfatAdapter::new(cache)));
    registry
}
