//! On-disk format model.
//!
//! A [`Format`] describes how a block of storage is interpreted: a
//! filesystem, swap space, an LVM physical volume, a RAID member
//! superblock, a disklabel, or nothing at all. Capability flags
//! (formattable, resizable, migratable, bootable, size limits) are derived
//! from the kind tag, so kind-specific behavior dispatches on a closed sum
//! type instead of a class hierarchy.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

/// Preference order used to pick the default filesystem kind.
pub const DEFAULT_FSTYPES: [FormatKind; 3] = [FormatKind::Ext4, FormatKind::Ext3, FormatKind::Ext2];

/// Tag identifying what a format is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum FormatKind {
    #[strum(serialize = "ext2")]
    Ext2,
    #[strum(serialize = "ext3")]
    Ext3,
    #[strum(serialize = "ext4")]
    Ext4,
    /// FAT32, also used for the EFI System Partition
    #[strum(serialize = "vfat")]
    Vfat,
    #[strum(serialize = "swap")]
    Swap,
    /// LVM physical volume metadata
    #[strum(serialize = "lvmpv")]
    LvmPv,
    /// Software RAID member superblock
    #[strum(serialize = "mdmember")]
    MdMember,
    /// Partition table on a whole disk
    #[strum(serialize = "disklabel")]
    DiskLabel,
    /// Kernel filesystems with no backing device (tmpfs and friends)
    #[strum(serialize = "nodev")]
    NoDev,
    /// No format at all
    #[default]
    #[strum(serialize = "null")]
    Null,
}

impl FormatKind {
    /// Can formats of this kind be created by a tool we drive?
    pub fn formattable(self) -> bool {
        !matches!(self, Self::NoDev | Self::Null)
    }

    /// Is this kind supported by the running environment?
    pub fn supported(self) -> bool {
        !matches!(self, Self::Null)
    }

    /// Can formats of this kind be resized at all? Whether a concrete
    /// format is resizable also depends on it existing on disk.
    pub fn resizable(self) -> bool {
        matches!(self, Self::Ext2 | Self::Ext3 | Self::Ext4)
    }

    /// Is this kind suitable for a boot partition?
    pub fn bootable(self) -> bool {
        matches!(self, Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Vfat)
    }

    /// Is this kind native to Linux? Drives the clear-linux-only
    /// auto-partitioning filter.
    pub fn linux_native(self) -> bool {
        matches!(
            self,
            Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Swap | Self::LvmPv | Self::MdMember
        )
    }

    /// Can this kind be mounted as a filesystem?
    pub fn mountable(self) -> bool {
        matches!(self, Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Vfat | Self::NoDev)
    }

    /// The kind an in-place migration upgrades to, if any.
    pub fn migration_target(self) -> Option<FormatKind> {
        match self {
            Self::Ext2 => Some(Self::Ext3),
            _ => None,
        }
    }

    /// Minimum size in MiB for a format of this kind (0 = no limit).
    pub fn min_size(self) -> u64 {
        match self {
            Self::Ext2 | Self::Ext3 | Self::Ext4 => 8,
            Self::Vfat => 32,
            Self::Swap => 40,
            _ => 0,
        }
    }

    /// Maximum size in MiB for a format of this kind (0 = no limit).
    pub fn max_size(self) -> u64 {
        match self {
            Self::Ext2 | Self::Ext3 => 8 * 1024 * 1024,
            Self::Ext4 => 16 * 1024 * 1024,
            Self::Vfat => 2 * 1024 * 1024,
            _ => 0,
        }
    }

    /// Partition flag the partitioner sets for this kind, if any.
    pub fn parted_flag(self) -> Option<&'static str> {
        match self {
            Self::LvmPv => Some("lvm"),
            Self::MdMember => Some("raid"),
            Self::Vfat => Some("boot"),
            _ => None,
        }
    }

    /// External tool that writes this format, if one exists.
    pub fn create_tool(self) -> Option<&'static str> {
        match self {
            Self::Ext2 => Some("mkfs.ext2"),
            Self::Ext3 => Some("mkfs.ext3"),
            Self::Ext4 => Some("mkfs.ext4"),
            Self::Vfat => Some("mkfs.vfat"),
            Self::Swap => Some("mkswap"),
            Self::LvmPv => Some("pvcreate"),
            // mdmember superblocks are written by mdadm when the array is
            // assembled; disklabels go through parted mklabel
            _ => None,
        }
    }
}

/// Pick the default filesystem kind: the first supported entry of
/// [`DEFAULT_FSTYPES`].
pub fn default_filesystem_type() -> Result<FormatKind> {
    DEFAULT_FSTYPES
        .iter()
        .copied()
        .find(|kind| kind.supported())
        .ok_or_else(|| {
            StorageError::format(format!(
                "none of {:?} is supported by your kernel",
                DEFAULT_FSTYPES
            ))
        })
}

/// A concrete format value, attached to at most one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    kind: FormatKind,
    /// Full path to the device this format occupies, when known.
    device: Option<PathBuf>,
    uuid: Option<String>,
    label: Option<String>,
    /// Present on disk vs. declared but not yet written.
    exists: bool,
    current_size: u64,
    target_size: u64,
    /// Filesystems only.
    mountpoint: Option<String>,
    /// Scheduled for in-place migration to `kind.migration_target()`.
    migrate: bool,
}

impl Format {
    /// Create a non-existent format of the given kind.
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            device: None,
            uuid: None,
            label: None,
            exists: false,
            current_size: 0,
            target_size: 0,
            mountpoint: None,
            migrate: false,
        }
    }

    /// The null format ("no format").
    pub fn null() -> Self {
        Self::new(FormatKind::Null)
    }

    /// Attach the device path this format occupies. The path must be
    /// fully qualified.
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Result<Self> {
        self.set_device(Some(device.into()))?;
        Ok(self)
    }

    /// Mark the format as already present on disk.
    pub fn with_exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    /// Set the current (and target) size in MiB.
    pub fn with_size(mut self, size: u64) -> Self {
        self.current_size = size;
        self.target_size = size;
        self
    }

    /// Set the mountpoint (filesystems only; ignored for kinds that
    /// cannot be mounted).
    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        if self.kind.mountable() {
            self.mountpoint = Some(mountpoint.into());
        }
        self
    }

    /// Set the volume label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    /// True for the null format.
    pub fn is_null(&self) -> bool {
        self.kind == FormatKind::Null
    }

    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    /// Set or clear the device path. Paths must be absolute.
    pub fn set_device(&mut self, device: Option<PathBuf>) -> Result<()> {
        if let Some(path) = &device {
            if !path.is_absolute() {
                return Err(StorageError::invalid_argument(
                    "device must be a fully qualified path",
                ));
            }
        }
        self.device = device;
        Ok(())
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn set_uuid(&mut self, uuid: Option<String>) {
        self.uuid = uuid;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn target_size(&self) -> u64 {
        self.target_size
    }

    pub fn set_target_size(&mut self, size: u64) {
        self.target_size = size;
    }

    pub fn mountpoint(&self) -> Option<&str> {
        self.mountpoint.as_deref()
    }

    pub fn migrate(&self) -> bool {
        self.migrate
    }

    pub fn set_migrate(&mut self, migrate: bool) {
        self.migrate = migrate;
    }

    /// Can this format be resized? Requires both a resizable kind and
    /// presence on disk.
    pub fn resizable(&self) -> bool {
        self.kind.resizable() && self.exists
    }

    /// Can this format be migrated in place? The migration itself
    /// additionally requires the format to exist.
    pub fn migratable(&self) -> bool {
        self.kind.migration_target().is_some()
    }

    pub fn formattable(&self) -> bool {
        self.kind.formattable()
    }

    pub fn supported(&self) -> bool {
        self.kind.supported()
    }

    pub fn bootable(&self) -> bool {
        self.kind.bootable()
    }

    pub fn linux_native(&self) -> bool {
        self.kind.linux_native()
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exist = if self.exists { "existing" } else { "non-existent" };
        write!(f, "{} {}", exist, self.kind)
    }
}

/// Return a [`Format`] for the given kind name (`"ext4"`, `"swap"`,
/// `"lvmpv"`, ...). Unknown names fall back to the null format, matching
/// the behavior of probing an unrecognized signature.
pub fn get_format(name: &str) -> Format {
    let kind = name.parse::<FormatKind>().unwrap_or(FormatKind::Null);
    Format::new(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(FormatKind::from_str("ext4").unwrap(), FormatKind::Ext4);
        assert_eq!(FormatKind::from_str("lvmpv").unwrap(), FormatKind::LvmPv);
        assert_eq!(FormatKind::from_str("mdmember").unwrap(), FormatKind::MdMember);
        assert!(FormatKind::from_str("zfs").is_err());
    }

    #[test]
    fn test_get_format_unknown_is_null() {
        assert_eq!(get_format("ext3").kind(), FormatKind::Ext3);
        assert!(get_format("reiserfs").is_null());
    }

    #[test]
    fn test_default_filesystem_type() {
        assert_eq!(default_filesystem_type().unwrap(), FormatKind::Ext4);
    }

    #[test]
    fn test_resizable_requires_exists() {
        let fmt = Format::new(FormatKind::Ext4).with_size(1000);
        assert!(!fmt.resizable());
        let fmt = fmt.with_exists(true);
        assert!(fmt.resizable());

        // swap is never resizable
        let swap = Format::new(FormatKind::Swap).with_exists(true);
        assert!(!swap.resizable());
    }

    #[test]
    fn test_migration_chain() {
        assert_eq!(FormatKind::Ext2.migration_target(), Some(FormatKind::Ext3));
        assert_eq!(FormatKind::Ext3.migration_target(), None);
        assert!(Format::new(FormatKind::Ext2).migratable());
        assert!(!Format::new(FormatKind::Swap).migratable());
    }

    #[test]
    fn test_device_path_must_be_absolute() {
        let result = Format::new(FormatKind::Ext4).with_device("sda1");
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));

        let fmt = Format::new(FormatKind::Ext4).with_device("/dev/sda1").unwrap();
        assert_eq!(fmt.device().unwrap(), Path::new("/dev/sda1"));
    }

    #[test]
    fn test_mountpoint_only_on_mountable_kinds() {
        let fmt = Format::new(FormatKind::Ext4).with_mountpoint("/home");
        assert_eq!(fmt.mountpoint(), Some("/home"));

        let pv = Format::new(FormatKind::LvmPv).with_mountpoint("/home");
        assert_eq!(pv.mountpoint(), None);
    }

    #[test]
    fn test_display() {
        let fmt = Format::new(FormatKind::Swap);
        assert_eq!(fmt.to_string(), "non-existent swap");
        let fmt = fmt.with_exists(true);
        assert_eq!(fmt.to_string(), "existing swap");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = Format::new(FormatKind::Ext4)
            .with_device("/dev/sda1")
            .unwrap()
            .with_mountpoint("/")
            .with_size(4096);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: Format = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
