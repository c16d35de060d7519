//! Device model.
//!
//! A [`Device`] is a node in the storage graph: a disk, a partition, a RAID
//! array, an LVM volume group or logical volume, a device-mapper node, a
//! file-backed device, or a no-dev placeholder. Kind-specific payloads live
//! in [`DeviceKind`]; parent links are id sequences resolved against the
//! [`DeviceTree`](crate::tree::DeviceTree) arena, and the `kids` counter is
//! a shadow maintained by the tree's add/remove paths.

use crate::error::{Result, StorageError};
use crate::format::Format;
use crate::session::{DeviceId, Session};
use crate::sizes::align_up;
use crate::tree::DeviceTree;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

/// Directory device-mapper nodes live in.
pub const DEV_MAPPER_DIR: &str = "/dev/mapper";

/// Default LVM physical-extent size in MiB.
pub const DEFAULT_PE_SIZE: u64 = 4;

/// Partition slot type within a disklabel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    #[default]
    #[strum(serialize = "normal")]
    Normal,
    #[strum(serialize = "extended")]
    Extended,
    #[strum(serialize = "logical")]
    Logical,
}

/// Software RAID level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum RaidLevel {
    #[strum(serialize = "raid0")]
    Raid0,
    #[strum(serialize = "raid1")]
    Raid1,
    #[strum(serialize = "raid4")]
    Raid4,
    #[strum(serialize = "raid5")]
    Raid5,
    #[strum(serialize = "raid6")]
    Raid6,
    #[strum(serialize = "raid10")]
    Raid10,
}

impl RaidLevel {
    /// Minimum number of active members an array of this level needs.
    pub fn min_members(self) -> u32 {
        match self {
            Self::Raid0 | Self::Raid1 => 2,
            Self::Raid4 | Self::Raid5 => 3,
            Self::Raid6 | Self::Raid10 => 4,
        }
    }
}

/// Hardware identity of a whole disk, as reported by the prober.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub model: String,
    pub serial: Option<String>,
    pub vendor: String,
    pub bus: String,
    /// Logical sector size in bytes.
    pub sector_size: u64,
}

/// Optional settings for a new logical volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvArgs {
    /// Number of copies in the VG (>1 for mirrored LVs).
    pub stripes: u32,
    /// Size of the log volume in MiB (mirrored LVs).
    pub log_size: u64,
    /// Sum of sizes of snapshots of this LV, in MiB.
    pub snapshot_space: u64,
    /// Pin this LV to a single physical volume.
    pub single_pv: bool,
}

/// Kind tag plus kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    Disk {
        info: DiskInfo,
        media_present: bool,
    },
    Partition {
        number: u32,
        part_type: PartitionType,
        bootable: bool,
        /// MiB offset on the owning disk; 0 until placed.
        start: u64,
    },
    RaidArray {
        level: RaidLevel,
        minor: u32,
        member_devices: u32,
        total_devices: u32,
        spares: u32,
    },
    VolumeGroup {
        /// Physical-extent size in MiB.
        pe_size: u64,
    },
    LogicalVolume {
        /// The LV's own name, without the VG prefix.
        lv_name: String,
        stripes: u32,
        log_size: u64,
        snapshot_space: u64,
        single_pv: bool,
    },
    DeviceMapper,
    FileBacked,
    NoDev,
}

impl DeviceKind {
    /// Short type name, used in operation descriptions and type filters.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Disk { .. } => "disk",
            Self::Partition { .. } => "partition",
            Self::RaidArray { .. } => "raidarray",
            Self::VolumeGroup { .. } => "lvmvg",
            Self::LogicalVolume { .. } => "lvmlv",
            Self::DeviceMapper => "dm",
            Self::FileBacked => "file",
            Self::NoDev => "nodev",
        }
    }
}

/// A node in the device tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    exists: bool,
    /// Active (set up) on the host right now.
    status: bool,
    parents: Vec<DeviceId>,
    /// Count of live devices listing this one as a parent. Maintained by
    /// the tree, not by the device itself.
    kids: u32,
    current_size: u64,
    target_size: u64,
    format: Format,
}

impl Device {
    fn new(id: DeviceId, name: String, kind: DeviceKind, exists: bool, size: u64, parents: Vec<DeviceId>) -> Self {
        Self {
            id,
            name,
            kind,
            exists,
            status: false,
            parents,
            kids: 0,
            current_size: size,
            target_size: size,
            format: Format::null(),
        }
    }

    /// Create a whole disk. Disks always exist.
    pub fn new_disk(session: &mut Session, name: impl Into<String>, size: u64, info: DiskInfo) -> Self {
        let media_present = size != 0;
        Self::new(
            session.next_device_id(),
            name.into(),
            DeviceKind::Disk { info, media_present },
            true,
            size,
            Vec::new(),
        )
    }

    /// Create a partition on `disk`. The partition number is derived from
    /// the name (`sda2` -> 2, `nvme0n1p3` -> 3).
    pub fn new_partition(
        session: &mut Session,
        name: impl Into<String>,
        disk: &Device,
        size: u64,
        part_type: PartitionType,
        exists: bool,
    ) -> Result<Self> {
        let name = name.into();
        if !matches!(disk.kind, DeviceKind::Disk { .. }) {
            return Err(StorageError::invalid_argument(format!(
                "partition {} requires a disk parent, got {}",
                name,
                disk.kind.type_name()
            )));
        }
        let number = partition_number(&disk.name, &name)?;
        Ok(Self::new(
            session.next_device_id(),
            name,
            DeviceKind::Partition {
                number,
                part_type,
                bootable: false,
                start: 0,
            },
            exists,
            size,
            vec![disk.id],
        ))
    }

    /// Create a software RAID array over the given member devices.
    pub fn new_raid_array(
        session: &mut Session,
        name: impl Into<String>,
        level: RaidLevel,
        minor: u32,
        size: u64,
        member_devices: u32,
        total_devices: u32,
        members: &[&Device],
        exists: bool,
    ) -> Result<Self> {
        let name = name.into();
        if member_devices < level.min_members() {
            return Err(StorageError::invalid_argument(format!(
                "{} requires at least {} members, got {}",
                level,
                level.min_members(),
                member_devices
            )));
        }
        if total_devices < member_devices {
            return Err(StorageError::invalid_argument(
                "total device count below active member count",
            ));
        }
        Ok(Self::new(
            session.next_device_id(),
            name,
            DeviceKind::RaidArray {
                level,
                minor,
                member_devices,
                total_devices,
                spares: total_devices - member_devices,
            },
            exists,
            size,
            members.iter().map(|d| d.id).collect(),
        ))
    }

    /// Create a volume group over PV-formatted devices. The VG's size is
    /// derived from its physical volumes.
    pub fn new_volume_group(
        session: &mut Session,
        name: impl Into<String>,
        pvs: &[&Device],
        pe_size: Option<u64>,
        exists: bool,
    ) -> Result<Self> {
        let name = name.into();
        for pv in pvs {
            if pv.format.kind() != crate::format::FormatKind::LvmPv {
                return Err(StorageError::invalid_argument(format!(
                    "volume group {} parent {} does not carry an lvmpv format",
                    name, pv.name
                )));
            }
        }
        let pe_size = pe_size.unwrap_or(DEFAULT_PE_SIZE);
        let size = pvs
            .iter()
            .map(|pv| crate::sizes::align_down(pv.current_size, pe_size))
            .sum();
        Ok(Self::new(
            session.next_device_id(),
            name,
            DeviceKind::VolumeGroup { pe_size },
            exists,
            size,
            pvs.iter().map(|d| d.id).collect(),
        ))
    }

    /// Create a logical volume inside `vg` (which must be in the tree).
    ///
    /// The requested size is aligned up to the VG's extent size and checked
    /// against the VG's free space; a single-PV volume must additionally
    /// fit on at least one physical volume.
    pub fn new_logical_volume(
        session: &mut Session,
        tree: &DeviceTree,
        lv_name: impl Into<String>,
        vg_id: DeviceId,
        size: u64,
        exists: bool,
        args: LvArgs,
    ) -> Result<Self> {
        let lv_name = lv_name.into();
        let vg = tree.get_device(vg_id).ok_or_else(|| {
            StorageError::invalid_argument("logical volume requires a volume group in the tree")
        })?;
        let DeviceKind::VolumeGroup { pe_size } = vg.kind else {
            return Err(StorageError::invalid_argument(format!(
                "logical volume parent {} is not a volume group",
                vg.name
            )));
        };

        let size = align_up(size, pe_size);
        let stripes = args.stripes.max(1);
        if !exists {
            let used = align_up(size, pe_size) * u64::from(stripes) + args.log_size;
            let free = tree.vg_free_space(vg_id);
            if used > free {
                return Err(StorageError::invalid_argument(format!(
                    "not enough free space in volume group {}: {} MiB short",
                    vg.name,
                    used - free
                )));
            }
        }
        if args.single_pv {
            let fits = tree
                .pvs_of(vg_id)
                .iter()
                .any(|pv| pv.current_size() >= size);
            if !fits {
                return Err(StorageError::single_pv(format!(
                    "{} is restricted to a single physical volume on this platform. \
                     No physical volumes available in volume group {} with {} MiB of available space.",
                    lv_name, vg.name, size
                )));
            }
        }

        let name = format!("{}-{}", vg.name, lv_name);
        Ok(Self::new(
            session.next_device_id(),
            name,
            DeviceKind::LogicalVolume {
                lv_name,
                stripes,
                log_size: args.log_size,
                snapshot_space: args.snapshot_space,
                single_pv: args.single_pv,
            },
            exists,
            size,
            vec![vg_id],
        ))
    }

    /// Create a device-mapper node.
    pub fn new_device_mapper(
        session: &mut Session,
        name: impl Into<String>,
        size: u64,
        parents: &[&Device],
        exists: bool,
    ) -> Self {
        Self::new(
            session.next_device_id(),
            name.into(),
            DeviceKind::DeviceMapper,
            exists,
            size,
            parents.iter().map(|d| d.id).collect(),
        )
    }

    /// Create a file-backed device (swap files). The name is the file's
    /// absolute path.
    pub fn new_file_backed(
        session: &mut Session,
        path: impl Into<String>,
        size: u64,
        exists: bool,
    ) -> Result<Self> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(StorageError::invalid_argument(
                "file-backed device requires an absolute path",
            ));
        }
        Ok(Self::new(
            session.next_device_id(),
            path,
            DeviceKind::FileBacked,
            exists,
            size,
            Vec::new(),
        ))
    }

    /// Create a no-dev placeholder for kernel filesystems like tmpfs.
    pub fn new_nodev(session: &mut Session, format: Format) -> Self {
        let name = if format.is_null() {
            "none".to_string()
        } else {
            format.kind().to_string()
        };
        let mut device = Self::new(
            session.next_device_id(),
            name,
            DeviceKind::NoDev,
            true,
            0,
            Vec::new(),
        );
        device.format = format;
        device
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn set_status(&mut self, status: bool) {
        self.status = status;
    }

    pub fn parents(&self) -> &[DeviceId] {
        &self.parents
    }

    pub fn kids(&self) -> u32 {
        self.kids
    }

    /// True if no live device references this one as a parent.
    pub fn is_leaf(&self) -> bool {
        self.kids == 0
    }

    pub(crate) fn add_child(&mut self) {
        self.kids += 1;
    }

    pub(crate) fn remove_child(&mut self) {
        debug_assert!(self.kids > 0, "kids underflow on {}", self.name);
        self.kids = self.kids.saturating_sub(1);
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

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn format_mut(&mut self) -> &mut Format {
        &mut self.format
    }

    /// Replace the attached format, returning the previous one.
    pub fn replace_format(&mut self, format: Format) -> Format {
        std::mem::replace(&mut self.format, format)
    }

    /// Can this device be resized? Only partitions and logical volumes
    /// that already exist on disk.
    pub fn resizable(&self) -> bool {
        matches!(
            self.kind,
            DeviceKind::Partition { .. } | DeviceKind::LogicalVolume { .. }
        ) && self.exists
    }

    /// Whether destroying this device can touch real media.
    pub fn media_present(&self) -> bool {
        match &self.kind {
            DeviceKind::Disk { media_present, .. } => *media_present,
            _ => true,
        }
    }

    /// Device node representing this device.
    pub fn path(&self) -> PathBuf {
        match &self.kind {
            DeviceKind::LogicalVolume { .. } | DeviceKind::DeviceMapper => {
                PathBuf::from(format!("{}/{}", DEV_MAPPER_DIR, self.map_name()))
            }
            DeviceKind::FileBacked | DeviceKind::NoDev => PathBuf::from(&self.name),
            _ => PathBuf::from(format!("/dev/{}", self.name)),
        }
    }

    /// The device-mapper map name. LVM doubles dashes in the LV component.
    pub fn map_name(&self) -> String {
        match &self.kind {
            DeviceKind::LogicalVolume { lv_name, .. } => {
                let vg_part = self.name[..self.name.len() - lv_name.len() - 1].replace('-', "--");
                format!("{}-{}", vg_part, lv_name.replace('-', "--"))
            }
            _ => self.name.replace('-', "--"),
        }
    }

    /// Partition number within the owning disk, if this is a partition.
    pub fn partition_number(&self) -> Option<u32> {
        match self.kind {
            DeviceKind::Partition { number, .. } => Some(number),
            _ => None,
        }
    }

    /// The owning disk of a partition (its single allocation parent).
    pub fn partition_disk(&self) -> Option<DeviceId> {
        match self.kind {
            DeviceKind::Partition { .. } => self.parents.first().copied(),
            _ => None,
        }
    }

    pub(crate) fn set_partition_start(&mut self, start_mib: u64) {
        if let DeviceKind::Partition { start, .. } = &mut self.kind {
            *start = start_mib;
        }
    }

    /// The LV's own name, without the VG prefix.
    pub fn lv_name(&self) -> Option<&str> {
        match &self.kind {
            DeviceKind::LogicalVolume { lv_name, .. } => Some(lv_name),
            _ => None,
        }
    }

    /// The volume group of a logical volume.
    pub fn vg_id(&self) -> Option<DeviceId> {
        match self.kind {
            DeviceKind::LogicalVolume { .. } => self.parents.first().copied(),
            _ => None,
        }
    }

    /// Whether this LV is pinned to a single physical volume.
    pub fn single_pv(&self) -> bool {
        matches!(self.kind, DeviceKind::LogicalVolume { single_pv: true, .. })
    }

    /// VG space occupied by this LV, not including snapshots.
    pub fn vg_space_used(&self, pe_size: u64) -> u64 {
        match &self.kind {
            DeviceKind::LogicalVolume { stripes, log_size, .. } => {
                align_up(self.current_size, pe_size) * u64::from(*stripes) + log_size
            }
            _ => 0,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exist = if self.exists { "existing" } else { "non-existent" };
        write!(
            f,
            "{} {} MiB {} {} ({})",
            exist,
            self.current_size,
            self.type_name(),
            self.name,
            self.id
        )?;
        if !self.format.is_null() {
            write!(f, " with {}", self.format)?;
        }
        Ok(())
    }
}

/// Derive a partition's number from its name and its disk's name
/// (`sda2` -> 2, `nvme0n1p3` -> 3).
pub fn partition_number(disk_name: &str, partition_name: &str) -> Result<u32> {
    let suffix = partition_name.strip_prefix(disk_name).ok_or_else(|| {
        StorageError::invalid_argument(format!(
            "partition {} is not named after disk {}",
            partition_name, disk_name
        ))
    })?;
    let digits = suffix.strip_prefix('p').unwrap_or(suffix);
    digits.parse::<u32>().map_err(|_| {
        StorageError::invalid_argument(format!(
            "cannot derive a partition number from {}",
            partition_name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{get_format, FormatKind};

    fn disk(session: &mut Session, name: &str, size: u64) -> Device {
        Device::new_disk(session, name, size, DiskInfo::default())
    }

    #[test]
    fn test_partition_number_parsing() {
        assert_eq!(partition_number("sda", "sda1").unwrap(), 1);
        assert_eq!(partition_number("sda", "sda12").unwrap(), 12);
        assert_eq!(partition_number("nvme0n1", "nvme0n1p3").unwrap(), 3);
        assert!(partition_number("sda", "sdb1").is_err());
        assert!(partition_number("sda", "sda").is_err());
    }

    #[test]
    fn test_disk_always_exists() {
        let mut session = Session::new();
        let sda = disk(&mut session, "sda", 100_000);
        assert!(sda.exists());
        assert!(sda.media_present());
        assert_eq!(sda.path(), PathBuf::from("/dev/sda"));

        // zero-size disks are treated as media-less (cpqarray-style
        // controllers expose nodes with no disk attached)
        let ghost = disk(&mut session, "sdz", 0);
        assert!(!ghost.media_present());
    }

    #[test]
    fn test_partition_requires_disk_parent() {
        let mut session = Session::new();
        let sda = disk(&mut session, "sda", 100_000);
        let sda1 =
            Device::new_partition(&mut session, "sda1", &sda, 500, PartitionType::Normal, false)
                .unwrap();
        assert_eq!(sda1.partition_number(), Some(1));
        assert_eq!(sda1.partition_disk(), Some(sda.id()));

        let not_a_disk = sda1.clone();
        let err =
            Device::new_partition(&mut session, "sda11", &not_a_disk, 10, PartitionType::Normal, false);
        assert!(matches!(err, Err(StorageError::InvalidArgument(_))));
    }

    #[test]
    fn test_raid_member_minimums() {
        let mut session = Session::new();
        let sda = disk(&mut session, "sda", 100_000);
        let sdb = disk(&mut session, "sdb", 100_000);
        let a =
            Device::new_partition(&mut session, "sda1", &sda, 40_000, PartitionType::Normal, false)
                .unwrap();
        let b =
            Device::new_partition(&mut session, "sdb1", &sdb, 40_000, PartitionType::Normal, false)
                .unwrap();

        let md0 = Device::new_raid_array(
            &mut session,
            "md0",
            RaidLevel::Raid0,
            0,
            80_000,
            2,
            2,
            &[&a, &b],
            false,
        )
        .unwrap();
        assert_eq!(md0.parents().len(), 2);

        let err = Device::new_raid_array(
            &mut session,
            "md1",
            RaidLevel::Raid5,
            1,
            80_000,
            2,
            2,
            &[&a, &b],
            false,
        );
        assert!(matches!(err, Err(StorageError::InvalidArgument(_))));
    }

    #[test]
    fn test_vg_requires_pv_formats() {
        let mut session = Session::new();
        let sda = disk(&mut session, "sda", 100_000);
        let mut sda2 =
            Device::new_partition(&mut session, "sda2", &sda, 99_500, PartitionType::Normal, false)
                .unwrap();

        // without the lvmpv format the VG constructor refuses
        let err = Device::new_volume_group(&mut session, "vg", &[&sda2], None, false);
        assert!(matches!(err, Err(StorageError::InvalidArgument(_))));

        sda2.replace_format(get_format("lvmpv"));
        let vg = Device::new_volume_group(&mut session, "vg", &[&sda2], None, false).unwrap();
        // VG size is PV capacity aligned down to whole extents
        assert_eq!(vg.current_size(), 99_500);
        assert_eq!(vg.format().kind(), FormatKind::Null);
    }

    #[test]
    fn test_lv_map_name_doubles_dashes() {
        let mut session = Session::new();
        let mut tree = crate::tree::DeviceTree::new();
        let sda = disk(&mut session, "sda", 100_000);
        let mut sda2 =
            Device::new_partition(&mut session, "sda2", &sda, 99_500, PartitionType::Normal, true)
                .unwrap();
        sda2.replace_format(get_format("lvmpv").with_exists(true));
        let vg = Device::new_volume_group(&mut session, "my-vg", &[&sda2], None, true).unwrap();
        let vg_id = vg.id();
        tree.add_device(sda).unwrap();
        tree.add_device(sda2).unwrap();
        tree.add_device(vg).unwrap();

        let lv = Device::new_logical_volume(
            &mut session,
            &tree,
            "lv-root",
            vg_id,
            30_000,
            true,
            LvArgs::default(),
        )
        .unwrap();
        assert_eq!(lv.name(), "my-vg-lv-root");
        assert_eq!(lv.map_name(), "my--vg-lv--root");
        assert_eq!(lv.path(), PathBuf::from("/dev/mapper/my--vg-lv--root"));
    }

    #[test]
    fn test_file_backed_requires_absolute_path() {
        let mut session = Session::new();
        assert!(Device::new_file_backed(&mut session, "swapfile", 2048, false).is_err());
        let dev = Device::new_file_backed(&mut session, "/swapfile", 2048, false).unwrap();
        assert_eq!(dev.path(), PathBuf::from("/swapfile"));
    }

    #[test]
    fn test_resizable_requires_exists() {
        let mut session = Session::new();
        let sda = disk(&mut session, "sda", 100_000);
        assert!(!sda.resizable());

        let planned =
            Device::new_partition(&mut session, "sda1", &sda, 500, PartitionType::Normal, false)
                .unwrap();
        assert!(!planned.resizable());

        let existing =
            Device::new_partition(&mut session, "sda2", &sda, 500, PartitionType::Normal, true)
                .unwrap();
        assert!(existing.resizable());
    }

    #[test]
    fn test_display_mentions_format() {
        let mut session = Session::new();
        let mut sda = disk(&mut session, "sda", 100_000);
        assert_eq!(sda.to_string(), "existing 100000 MiB disk sda (0)");
        sda.replace_format(get_format("disklabel").with_exists(true));
        assert_eq!(
            sda.to_string(),
            "existing 100000 MiB disk sda (0) with existing disklabel"
        );
    }
}
