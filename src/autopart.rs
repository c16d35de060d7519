//! Auto-partitioning: translates a high-level choice (clear the disks,
//! clear Linux partitions, use free space, shrink something) into a
//! sequence of operation registrations that the planner then prunes and
//! orders.
//!
//! The target layout itself is data-driven (see
//! [`LayoutConfig`](crate::layout::LayoutConfig)); this module only clears
//! space and realizes the requested layout in the free extents, either as
//! plain partitions or inside a fresh LVM volume group.

use crate::device::{Device, DiskInfo, LvArgs, PartitionType};
use crate::error::{Result, StorageError};
use crate::format::{Format, FormatKind};
use crate::layout::LayoutConfig;
use crate::operation::Operation;
use crate::session::{DeviceId, Session};
use crate::sizes::align_down;
use crate::tree::DeviceTree;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, info};

/// MiB reserved at the start of a disk for the partition table and
/// alignment.
const DISK_HEADER: u64 = 1;

/// The user's partitioning choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum AutoPartMethod {
    /// Destroy every partition on the selected disks.
    #[default]
    #[strum(serialize = "use_all_space")]
    UseAllSpace,
    /// Destroy only Linux-native partitions.
    #[strum(serialize = "replace_existing_linux")]
    ReplaceExistingLinux,
    /// Touch nothing; build in the existing free space.
    #[strum(serialize = "use_free_space")]
    UseFreeSpace,
    /// Shrink one partition and build in the freed space.
    #[strum(serialize = "shrink_current")]
    ShrinkCurrent,
}

/// Shrink target for [`AutoPartMethod::ShrinkCurrent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkRequest {
    pub device: DeviceId,
    /// New size for both the filesystem and the partition, in MiB.
    pub new_size: u64,
}

/// Everything the auto-partitioner needs from the wizard.
#[derive(Debug, Clone)]
pub struct AutoPartRequest {
    pub method: AutoPartMethod,
    /// Names of the disks selected for installation.
    pub clear_disks: Vec<String>,
    /// Required when `method` is `ShrinkCurrent`.
    pub shrink: Option<ShrinkRequest>,
    pub layout: LayoutConfig,
}

/// Stable default disk comparator. The environment may supply its own
/// (BIOS order); this one falls back to name order.
pub fn compare_disks(a: &Device, b: &Device) -> Ordering {
    a.name().cmp(b.name())
}

/// Disks eligible for auto-partitioning: media present and big enough to
/// hold the layout.
pub fn candidate_disks<'a>(tree: &'a DeviceTree, layout: &LayoutConfig) -> Vec<&'a Device> {
    tree.disks()
        .into_iter()
        .filter(|d| d.media_present() && d.current_size() >= layout.minimum_size())
        .collect()
}

/// Schedule destruction of one device: its on-disk format first (when
/// there is one), then the device itself.
pub fn schedule_destroy_device(
    tree: &mut DeviceTree,
    session: &mut Session,
    id: DeviceId,
) -> Result<()> {
    let device = tree
        .get_device(id)
        .ok_or_else(|| StorageError::device_tree(format!("device {} not in tree", id)))?;
    if device.format().exists() && !device.format().is_null() {
        let op = Operation::destroy_format(session, device);
        tree.add_operation(op)?;
    }
    let device = tree.get_device(id).expect("still attached");
    let op = Operation::destroy_device(session, device);
    tree.add_operation(op)?;
    Ok(())
}

/// Schedule destruction of a device and everything stacked on it,
/// leaves first.
pub fn schedule_destroy_subtree(
    tree: &mut DeviceTree,
    session: &mut Session,
    id: DeviceId,
) -> Result<()> {
    let mut pending: Vec<DeviceId> = tree.descendants(id).iter().map(|d| d.id()).collect();
    while !pending.is_empty() {
        let leaves: Vec<DeviceId> = pending
            .iter()
            .copied()
            .filter(|id| tree.get_device(*id).is_some_and(Device::is_leaf))
            .collect();
        if leaves.is_empty() {
            return Err(StorageError::device_tree(format!(
                "no removable leaves among the dependents of device {}",
                id
            )));
        }
        for leaf in leaves {
            schedule_destroy_device(tree, session, leaf)?;
            pending.retain(|p| *p != leaf);
        }
    }
    schedule_destroy_device(tree, session, id)
}

/// Destroy partitions on the given disks, descending partition numbers
/// first. With `linux_only`, partitions carrying non-Linux formats are
/// left alone.
pub fn clear_partitions(
    tree: &mut DeviceTree,
    session: &mut Session,
    disks: &[DeviceId],
    linux_only: bool,
) -> Result<()> {
    for &disk in disks {
        let mut partitions: Vec<(u32, DeviceId, bool)> = tree
            .partitions_of(disk)
            .iter()
            .map(|p| {
                (
                    p.partition_number().unwrap_or(0),
                    p.id(),
                    p.format().linux_native(),
                )
            })
            .collect();
        // destroy high numbers first so parted never renumbers under us
        partitions.sort_by(|a, b| b.0.cmp(&a.0));
        for (number, id, linux_native) in partitions {
            if linux_only && !linux_native {
                debug!("leaving non-linux partition {} (number {})", id, number);
                continue;
            }
            schedule_destroy_subtree(tree, session, id)?;
        }
    }
    Ok(())
}

/// Register the shrink of one partition's filesystem and then of the
/// partition itself.
pub fn schedule_shrink(
    tree: &mut DeviceTree,
    session: &mut Session,
    shrink: ShrinkRequest,
) -> Result<()> {
    let device = tree
        .get_device(shrink.device)
        .ok_or_else(|| StorageError::device_tree("shrink target not in tree"))?;
    if !device.resizable() || !device.format().resizable() {
        return Err(StorageError::invalid_argument(format!(
            "{} cannot be shrunk",
            device.name()
        )));
    }
    let min_size = device.format().kind().min_size().max(1);
    if shrink.new_size < min_size {
        return Err(StorageError::invalid_argument(format!(
            "{} cannot shrink below {} MiB",
            device.name(),
            min_size
        )));
    }
    if shrink.new_size >= device.current_size() {
        return Err(StorageError::invalid_argument(
            "shrink target size is not smaller than the current size",
        ));
    }

    // the filesystem must be shrunk before its container
    let resize_format = Operation::resize_format(session, device, shrink.new_size)?;
    tree.add_operation(resize_format)?;
    let device = tree.get_device(shrink.device).expect("still attached");
    let resize_device = Operation::resize_device(session, device, shrink.new_size)?;
    tree.add_operation(resize_device)?;
    Ok(())
}

/// Entry point: apply the user's choice, then realize the layout in the
/// resulting free space.
pub fn do_auto_partition(
    tree: &mut DeviceTree,
    session: &mut Session,
    request: &AutoPartRequest,
    compare: impl Fn(&Device, &Device) -> Ordering,
) -> Result<()> {
    request.layout.validate()?;
    if request.clear_disks.is_empty() {
        return Err(StorageError::invalid_argument(
            "you must select at least one drive to be used for installation",
        ));
    }

    let mut disks: Vec<&Device> = Vec::with_capacity(request.clear_disks.len());
    for name in &request.clear_disks {
        let disk = tree.get_device_by_name(name).ok_or_else(|| {
            StorageError::device_tree(format!("selected disk {} not in tree", name))
        })?;
        if !disk.media_present() {
            return Err(StorageError::invalid_argument(format!(
                "disk {} has no media present",
                name
            )));
        }
        disks.push(disk);
    }
    disks.sort_by(|a, b| compare(a, b));
    let disk_ids: Vec<DeviceId> = disks.iter().map(|d| d.id()).collect();

    info!(
        "auto-partitioning ({}) over {} disk(s)",
        request.method,
        disk_ids.len()
    );
    match request.method {
        AutoPartMethod::UseAllSpace => clear_partitions(tree, session, &disk_ids, false)?,
        AutoPartMethod::ReplaceExistingLinux => clear_partitions(tree, session, &disk_ids, true)?,
        AutoPartMethod::UseFreeSpace => {}
        AutoPartMethod::ShrinkCurrent => {
            let shrink = request.shrink.ok_or_else(|| {
                StorageError::invalid_argument("shrink method selected without a shrink target")
            })?;
            schedule_shrink(tree, session, shrink)?;
        }
    }

    realize_layout(tree, session, &disk_ids, &request.layout)
}

/// Free MiB on a disk once live partitions (at their target sizes) and the
/// header are accounted for.
pub fn disk_free_space(tree: &DeviceTree, disk: DeviceId) -> u64 {
    let Some(device) = tree.get_device(disk) else {
        return 0;
    };
    let used: u64 = tree
        .partitions_of(disk)
        .iter()
        .map(|p| p.target_size())
        .sum();
    device
        .current_size()
        .saturating_sub(used)
        .saturating_sub(DISK_HEADER)
}

/// Build a partition device name from the disk name and a slot number
/// (`sda` -> `sda1`, `nvme0n1` -> `nvme0n1p1`).
pub fn partition_name(disk_name: &str, number: u32) -> String {
    if disk_name.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk_name, number)
    } else {
        format!("{}{}", disk_name, number)
    }
}

fn next_partition_number(tree: &DeviceTree, disk: DeviceId) -> u32 {
    tree.partitions_of(disk)
        .iter()
        .filter_map(|p| p.partition_number())
        .max()
        .unwrap_or(0)
        + 1
}

fn next_partition_start(tree: &DeviceTree, disk: DeviceId) -> u64 {
    DISK_HEADER
        + tree
            .partitions_of(disk)
            .iter()
            .map(|p| p.target_size())
            .sum::<u64>()
}

/// Logical-volume name for a layout request.
fn lv_name_for(request: &crate::layout::PartitionRequest) -> String {
    match request.mountpoint.as_deref() {
        Some("/") => "root".to_string(),
        Some(mountpoint) => mountpoint.trim_start_matches('/').replace('/', "_"),
        None => request.format.to_string(),
    }
}

/// Create one partition plus its format on `disk`, returning the new
/// device's id.
fn create_partition(
    tree: &mut DeviceTree,
    session: &mut Session,
    disk: DeviceId,
    size: u64,
    format: Format,
) -> Result<DeviceId> {
    let disk_device = tree
        .get_device(disk)
        .ok_or_else(|| StorageError::device_tree("target disk not in tree"))?;
    let number = next_partition_number(tree, disk);
    let start = next_partition_start(tree, disk);
    let name = partition_name(disk_device.name(), number);

    let mut partition =
        Device::new_partition(session, name, disk_device, size, PartitionType::Normal, false)?;
    partition.set_partition_start(start);
    let id = partition.id();
    let create = Operation::create_device(session, partition)?;
    tree.add_operation(create)?;

    let device = tree.get_device(id).expect("just created");
    let create_format = Operation::create_format(session, device, format);
    tree.add_operation(create_format)?;
    Ok(id)
}

/// Split free space across the layout's requests: every request gets its
/// base size, growable ones share the remainder (respecting max sizes).
fn request_sizes(layout: &LayoutConfig, requests: &[usize], free: u64) -> Result<Vec<u64>> {
    let base: u64 = requests.iter().map(|&i| layout.requests[i].size).sum();
    if base > free {
        return Err(StorageError::invalid_argument(format!(
            "not enough free space: need {} MiB, have {} MiB",
            base, free
        )));
    }
    let growers = requests
        .iter()
        .filter(|&&i| layout.requests[i].grow)
        .count() as u64;
    let share = if growers == 0 { 0 } else { (free - base) / growers };

    Ok(requests
        .iter()
        .map(|&i| {
            let request = &layout.requests[i];
            if !request.grow {
                return request.size;
            }
            let mut size = request.size + share;
            if request.max_size != 0 {
                size = size.min(request.max_size);
            }
            size
        })
        .collect())
}

/// Realize the layout on the first selected disk with enough free space.
fn realize_layout(
    tree: &mut DeviceTree,
    session: &mut Session,
    disks: &[DeviceId],
    layout: &LayoutConfig,
) -> Result<()> {
    let target = disks
        .iter()
        .copied()
        .find(|&d| disk_free_space(tree, d) >= layout.minimum_size())
        .ok_or_else(|| {
            StorageError::invalid_argument(format!(
                "no selected disk has {} MiB of free space for the default layout",
                layout.minimum_size()
            ))
        })?;
    let free = disk_free_space(tree, target);

    if layout.use_lvm {
        realize_lvm_layout(tree, session, target, free, layout)
    } else {
        realize_plain_layout(tree, session, target, free, layout)
    }
}

fn realize_plain_layout(
    tree: &mut DeviceTree,
    session: &mut Session,
    disk: DeviceId,
    free: u64,
    layout: &LayoutConfig,
) -> Result<()> {
    let all: Vec<usize> = (0..layout.requests.len()).collect();
    let sizes = request_sizes(layout, &all, free)?;
    for (index, size) in all.into_iter().zip(sizes) {
        let request = &layout.requests[index];
        let mut format = Format::new(request.format).with_size(size);
        if let Some(mountpoint) = &request.mountpoint {
            format = format.with_mountpoint(mountpoint.clone());
        }
        create_partition(tree, session, disk, size, format)?;
    }
    Ok(())
}

fn realize_lvm_layout(
    tree: &mut DeviceTree,
    session: &mut Session,
    disk: DeviceId,
    free: u64,
    layout: &LayoutConfig,
) -> Result<()> {
    // /boot stays a raw partition; everything else goes into the VG
    let boot: Vec<usize> = (0..layout.requests.len())
        .filter(|&i| layout.requests[i].mountpoint.as_deref() == Some("/boot"))
        .collect();
    let volumes: Vec<usize> = (0..layout.requests.len())
        .filter(|&i| layout.requests[i].mountpoint.as_deref() != Some("/boot"))
        .collect();

    let boot_size: u64 = boot.iter().map(|&i| layout.requests[i].size).sum();
    for &index in &boot {
        let request = &layout.requests[index];
        let mut format = Format::new(request.format).with_size(request.size);
        if let Some(mountpoint) = &request.mountpoint {
            format = format.with_mountpoint(mountpoint.clone());
        }
        create_partition(tree, session, disk, request.size, format)?;
    }

    // one PV partition spanning the rest of the free space
    let pv_size = free.saturating_sub(boot_size);
    let pv_id = create_partition(
        tree,
        session,
        disk,
        pv_size,
        Format::new(FormatKind::LvmPv).with_size(pv_size),
    )?;

    let pv = tree.get_device(pv_id).expect("just created");
    let vg = Device::new_volume_group(session, layout.vg_name.clone(), &[pv], None, false)?;
    let vg_id = vg.id();
    let create_vg = Operation::create_device(session, vg)?;
    tree.add_operation(create_vg)?;

    let vg_free = tree.vg_free_space(vg_id);
    let sizes = request_sizes(layout, &volumes, vg_free)?;
    for (&index, size) in volumes.iter().zip(sizes) {
        let request = &layout.requests[index];
        // keep LV sizes extent-aligned so the VG accounting stays exact
        let size = align_down(size, crate::device::DEFAULT_PE_SIZE).max(request.format.min_size());
        let lv = Device::new_logical_volume(
            session,
            tree,
            lv_name_for(request),
            vg_id,
            size,
            false,
            LvArgs::default(),
        )?;
        let lv_id = lv.id();
        let create_lv = Operation::create_device(session, lv)?;
        tree.add_operation(create_lv)?;

        let mut format = Format::new(request.format).with_size(size);
        if let Some(mountpoint) = &request.mountpoint {
            format = format.with_mountpoint(mountpoint.clone());
        }
        let device = tree.get_device(lv_id).expect("just created");
        let create_format = Operation::create_format(session, device, format);
        tree.add_operation(create_format)?;
    }
    Ok(())
}

/// Convenience used by tests and probers to seed a disk.
pub fn seed_disk(tree: &mut DeviceTree, session: &mut Session, name: &str, size: u64) -> Result<DeviceId> {
    let mut disk = Device::new_disk(session, name, size, DiskInfo::default());
    disk.replace_format(
        crate::format::get_format("disklabel")
            .with_device(disk.path())?
            .with_exists(true),
    );
    let id = disk.id();
    tree.add_device(disk)?;
    Ok(id)
}
