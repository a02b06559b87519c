//! Filesystem adapters for fsprov: one driver per on-disk format, all
//! implementing the [`fsprov_core::FilesystemAdapter`] contract and sharing
//! a single command cache through [`registration::builtin_registry`].

pub mod apfs;
pub mod btrfs;
pub mod exfat;
pub mod ext4;
pub mod f2fs;
pub mod gfs2;
pub mod hfsplus;
pub mod ntfs;
mod ops;
pub mod registration;
pub mod reiserfs;
pub mod vfat;
pub mod xfs;

#[cfg(test)]
pub(crate) mod test_support;

pub use apfs::ApfsAdapter;
pub use btrfs::BtrfsAdapter;
pub use exfat::ExfatAdapter;
pub use ext4::Ext4Adapter;
pub use f2fs::F2fsAdapter;
pub use gfs2::Gfs2Adapter;
pub use hfsplus::HfsplusAdapter;
pub use ntfs::NtfsAdapter;
pub use registration::builtin_registry;
pub use reiserfs::ReiserfsAdapter;
pub use vfat::VfatAdapter;
pub use xfs::XfsAdapter;
