//! Data-driven description of the default storage layout.
//!
//! The auto-partitioner does not hardcode the target layout; it realizes a
//! list of [`PartitionRequest`]s (mountpoint, format kind, size bounds,
//! grow flag). The built-in default is a small `/boot`, swap, and a
//! growable root, and installers can ship their own layout as a JSON file.

use crate::error::{Result, StorageError};
use crate::format::{default_filesystem_type, FormatKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default size of the boot partition, in MiB.
pub const DEFAULT_BOOT_SIZE: u64 = 500;

/// Default swap size, in MiB.
pub const DEFAULT_SWAP_SIZE: u64 = 2_000;

/// Minimum root size for the default layout, in MiB.
pub const DEFAULT_ROOT_MIN_SIZE: u64 = 4_096;

/// One entry of the desired layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRequest {
    /// Where the filesystem gets mounted, if it is a filesystem.
    pub mountpoint: Option<String>,
    /// Format to write.
    pub format: FormatKind,
    /// Requested size in MiB.
    pub size: u64,
    /// Upper bound for growable requests (0 = unbounded).
    pub max_size: u64,
    /// Take a share of the remaining free space.
    pub grow: bool,
}

impl PartitionRequest {
    pub fn new(format: FormatKind, size: u64) -> Self {
        Self {
            mountpoint: None,
            format,
            size,
            max_size: 0,
            grow: false,
        }
    }

    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    pub fn growable(mut self) -> Self {
        self.grow = true;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }
}

/// The layout the auto-partitioner realizes after clearing space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Put root and swap inside an LVM volume group.
    pub use_lvm: bool,
    /// Volume group name when `use_lvm` is set.
    pub vg_name: String,
    pub requests: Vec<PartitionRequest>,
}

impl LayoutConfig {
    /// The standard layout: `/boot`, swap, and a growable root, using the
    /// default filesystem kind.
    pub fn default_partitioning() -> Result<Self> {
        let fstype = default_filesystem_type()?;
        Ok(Self {
            use_lvm: false,
            vg_name: "sysvg".to_string(),
            requests: vec![
                PartitionRequest::new(fstype, DEFAULT_BOOT_SIZE).with_mountpoint("/boot"),
                PartitionRequest::new(FormatKind::Swap, DEFAULT_SWAP_SIZE),
                PartitionRequest::new(fstype, DEFAULT_ROOT_MIN_SIZE)
                    .with_mountpoint("/")
                    .growable(),
            ],
        })
    }

    /// Same layout, but root and swap live in a volume group.
    pub fn default_lvm_partitioning() -> Result<Self> {
        let mut layout = Self::default_partitioning()?;
        layout.use_lvm = true;
        Ok(layout)
    }

    /// Save the layout as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a layout from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let layout: Self = serde_json::from_str(&content)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Reject layouts that cannot be realized.
    pub fn validate(&self) -> Result<()> {
        if self.requests.is_empty() {
            return Err(StorageError::invalid_argument("layout has no requests"));
        }
        if self.use_lvm && self.vg_name.is_empty() {
            return Err(StorageError::invalid_argument(
                "LVM layout requires a volume group name",
            ));
        }
        for request in &self.requests {
            if request.size == 0 {
                return Err(StorageError::invalid_argument(
                    "layout request with zero size",
                ));
            }
            if request.max_size != 0 && request.max_size < request.size {
                return Err(StorageError::invalid_argument(
                    "layout request max size below its base size",
                ));
            }
            if request.mountpoint.is_some() && !request.format.mountable() {
                return Err(StorageError::invalid_argument(format!(
                    "{} cannot be mounted",
                    request.format
                )));
            }
        }
        Ok(())
    }

    /// Sum of the non-growable base sizes, the minimum space the layout
    /// needs.
    pub fn minimum_size(&self) -> u64 {
        self.requests.iter().map(|r| r.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_layout_shape() {
        let layout = LayoutConfig::default_partitioning().unwrap();
        assert_eq!(layout.requests.len(), 3);
        assert!(!layout.use_lvm);
        assert_eq!(layout.requests[0].mountpoint.as_deref(), Some("/boot"));
        assert_eq!(layout.requests[1].format, FormatKind::Swap);
        assert!(layout.requests[2].grow);
        assert_eq!(layout.requests[2].mountpoint.as_deref(), Some("/"));
        layout.validate().unwrap();
    }

    #[test]
    fn test_lvm_layout_flag() {
        let layout = LayoutConfig::default_lvm_partitioning().unwrap();
        assert!(layout.use_lvm);
        assert!(!layout.vg_name.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("layout.json");

        let layout = LayoutConfig::default_partitioning().unwrap();
        layout.save_to_file(&path).unwrap();
        let loaded = LayoutConfig::load_from_file(&path).unwrap();
        assert_eq!(layout, loaded);
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        let mut layout = LayoutConfig::default_partitioning().unwrap();
        layout.requests.clear();
        assert!(layout.validate().is_err());

        let mut layout = LayoutConfig::default_partitioning().unwrap();
        layout.requests[0].size = 0;
        assert!(layout.validate().is_err());

        // swap cannot carry a mountpoint
        let mut layout = LayoutConfig::default_partitioning().unwrap();
        layout.requests[1].mountpoint = Some("/swap".to_string());
        assert!(layout.validate().is_err());

        let mut layout = LayoutConfig::default_lvm_partitioning().unwrap();
        layout.vg_name.clear();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("layout.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(LayoutConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_minimum_size() {
        let layout = LayoutConfig::default_partitioning().unwrap();
        assert_eq!(
            layout.minimum_size(),
            DEFAULT_BOOT_SIZE + DEFAULT_SWAP_SIZE + DEFAULT_ROOT_MIN_SIZE
        );
    }
}
