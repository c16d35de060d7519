//! Operation model.
//!
//! An [`Operation`] is a single mutation atom scheduled against the device
//! tree: create/destroy/resize of a device or a format, plus in-place
//! format migration. Operations are constructed through checked
//! constructors, registered into the tree (which eagerly reflects their
//! intent), and later pruned and topologically ordered.
//!
//! The `requires` relation means "the other operation must execute strictly
//! before this one"; `obsoletes` means "the other operation can be pruned".
//! Both are pattern-matched over the closed [`OpKind`] sum so every legal
//! pairing is handled exhaustively.

use crate::device::{Device, DeviceKind};
use crate::error::{Result, StorageError};
use crate::format::{Format, FormatKind};
use crate::library;
use crate::progress::Progress;
use crate::session::{DeviceId, OperationId, Session};
use crate::tree::DeviceTree;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;
use tracing::info;

/// Whether a resize shrinks or grows its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ResizeDirection {
    Shrink,
    Grow,
}

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OpType {
    Create,
    Destroy,
    Resize,
    Migrate,
}

/// What an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OpObject {
    Device,
    Format,
}

/// The closed set of legal operation variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    CreateDevice,
    DestroyDevice,
    ResizeDevice {
        new_size: u64,
        direction: ResizeDirection,
    },
    CreateFormat {
        new_format: Format,
    },
    DestroyFormat,
    ResizeFormat {
        new_size: u64,
        direction: ResizeDirection,
    },
    MigrateFormat {
        target: FormatKind,
    },
}

/// The exact tree mutation a registration applied, so cancel can reverse it.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum Patch {
    /// Not registered yet, or registration had nothing to change.
    #[default]
    None,
    /// Registration added the device to the tree.
    AddedDevice,
    /// Registration removed the device from the tree.
    RemovedDevice,
    /// Registration replaced the device's format; `previous` restores it.
    ReplacedFormat { previous: Format },
    /// Registration retargeted the device size.
    RetargetedDevice { previous: u64 },
    /// Registration retargeted the format size.
    RetargetedFormat { previous: u64 },
    /// Registration set the format's migrate flag.
    SetMigrate,
}

/// A scheduled mutation of one device or its format.
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    device_id: DeviceId,
    kind: OpKind,
    // identity captured at construction so messages survive the device
    // leaving the tree
    device_name: String,
    device_type: &'static str,
    format_desc: FormatKind,
    /// `device.exists` at construction.
    device_existed: bool,
    /// The relevant format's `exists` at construction (the saved format for
    /// destroy, the new format for create, the current one otherwise).
    format_existed: bool,
    /// CreateDevice only: the device to insert at registration.
    pending_device: Option<Box<Device>>,
    pub(crate) patch: Patch,
}

impl Operation {
    fn new(
        session: &mut Session,
        device: &Device,
        kind: OpKind,
        format_desc: FormatKind,
        format_existed: bool,
    ) -> Self {
        Self {
            id: session.next_operation_id(),
            device_id: device.id(),
            kind,
            device_name: device.name().to_string(),
            device_type: device.type_name(),
            format_desc,
            device_existed: device.exists(),
            format_existed,
            pending_device: None,
            patch: Patch::None,
        }
    }

    /// Schedule creation of a new device. The device is inserted into the
    /// tree when the operation is registered.
    ///
    /// Fails if the device already exists on disk.
    pub fn create_device(session: &mut Session, device: Device) -> Result<Self> {
        if device.exists() {
            return Err(StorageError::invalid_argument("device already exists"));
        }
        let format_existed = device.format().exists();
        let mut op = Self::new(
            session,
            &device,
            OpKind::CreateDevice,
            device.format().kind(),
            format_existed,
        );
        op.pending_device = Some(Box::new(device));
        Ok(op)
    }

    /// Schedule destruction of a device. Registration removes it from the
    /// tree (and fails on non-leaves); construction itself never fails.
    pub fn destroy_device(session: &mut Session, device: &Device) -> Self {
        let format_existed = device.format().exists();
        Self::new(
            session,
            device,
            OpKind::DestroyDevice,
            device.format().kind(),
            format_existed,
        )
    }

    /// Schedule a device resize.
    ///
    /// Fails when the device is not resizable or the new size equals the
    /// current size.
    pub fn resize_device(session: &mut Session, device: &Device, new_size: u64) -> Result<Self> {
        if !device.resizable() {
            return Err(StorageError::invalid_argument("device is not resizable"));
        }
        if device.current_size() == new_size {
            return Err(StorageError::invalid_argument("new size same as old size"));
        }
        let direction = if new_size > device.current_size() {
            ResizeDirection::Grow
        } else {
            ResizeDirection::Shrink
        };
        let format_existed = device.format().exists();
        Ok(Self::new(
            session,
            device,
            OpKind::ResizeDevice { new_size, direction },
            device.format().kind(),
            format_existed,
        ))
    }

    /// Schedule writing a new format to a device. Registration replaces the
    /// attached format and saves the previous one for cancel.
    pub fn create_format(session: &mut Session, device: &Device, new_format: Format) -> Self {
        let format_existed = new_format.exists();
        let desc = new_format.kind();
        Self::new(
            session,
            device,
            OpKind::CreateFormat { new_format },
            desc,
            format_existed,
        )
    }

    /// Schedule removal of a device's format. Registration installs the
    /// null format and saves the previous one.
    pub fn destroy_format(session: &mut Session, device: &Device) -> Self {
        let format_existed = device.format().exists();
        Self::new(
            session,
            device,
            OpKind::DestroyFormat,
            device.format().kind(),
            format_existed,
        )
    }

    /// Schedule a format resize.
    ///
    /// Fails when the format kind is not resizable, the format does not
    /// exist on disk, or the new size equals the current size.
    pub fn resize_format(session: &mut Session, device: &Device, new_size: u64) -> Result<Self> {
        let format = device.format();
        if !format.kind().resizable() {
            return Err(StorageError::invalid_argument("format is not resizable"));
        }
        if !format.exists() {
            return Err(StorageError::invalid_argument("format does not exist"));
        }
        if format.current_size() == new_size {
            return Err(StorageError::invalid_argument("new size same as old size"));
        }
        let direction = if new_size > format.current_size() {
            ResizeDirection::Grow
        } else {
            ResizeDirection::Shrink
        };
        Ok(Self::new(
            session,
            device,
            OpKind::ResizeFormat { new_size, direction },
            format.kind(),
            true,
        ))
    }

    /// Schedule an in-place format migration (e.g. ext2 to ext3).
    ///
    /// Fails when the format kind is not migratable or the format does not
    /// exist on disk.
    pub fn migrate_format(session: &mut Session, device: &Device) -> Result<Self> {
        let format = device.format();
        let Some(target) = format.kind().migration_target() else {
            return Err(StorageError::invalid_argument("device format is not migratable"));
        };
        if !format.exists() {
            return Err(StorageError::invalid_argument("device format is not migratable"));
        }
        Ok(Self::new(
            session,
            device,
            OpKind::MigrateFormat { target },
            format.kind(),
            true,
        ))
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn op_type(&self) -> OpType {
        match self.kind {
            OpKind::CreateDevice | OpKind::CreateFormat { .. } => OpType::Create,
            OpKind::DestroyDevice | OpKind::DestroyFormat => OpType::Destroy,
            OpKind::ResizeDevice { .. } | OpKind::ResizeFormat { .. } => OpType::Resize,
            OpKind::MigrateFormat { .. } => OpType::Migrate,
        }
    }

    pub fn object(&self) -> OpObject {
        match self.kind {
            OpKind::CreateDevice | OpKind::DestroyDevice | OpKind::ResizeDevice { .. } => {
                OpObject::Device
            }
            _ => OpObject::Format,
        }
    }

    pub fn is_create(&self) -> bool {
        self.op_type() == OpType::Create
    }

    pub fn is_destroy(&self) -> bool {
        self.op_type() == OpType::Destroy
    }

    pub fn is_resize(&self) -> bool {
        self.op_type() == OpType::Resize
    }

    pub fn is_migrate(&self) -> bool {
        self.op_type() == OpType::Migrate
    }

    pub fn is_device(&self) -> bool {
        self.object() == OpObject::Device
    }

    pub fn is_format(&self) -> bool {
        self.object() == OpObject::Format
    }

    pub fn direction(&self) -> Option<ResizeDirection> {
        match self.kind {
            OpKind::ResizeDevice { direction, .. } | OpKind::ResizeFormat { direction, .. } => {
                Some(direction)
            }
            _ => None,
        }
    }

    pub fn is_shrink(&self) -> bool {
        self.direction() == Some(ResizeDirection::Shrink)
    }

    pub fn is_grow(&self) -> bool {
        self.direction() == Some(ResizeDirection::Grow)
    }

    pub fn new_size(&self) -> Option<u64> {
        match self.kind {
            OpKind::ResizeDevice { new_size, .. } | OpKind::ResizeFormat { new_size, .. } => {
                Some(new_size)
            }
            _ => None,
        }
    }

    /// Destructive operations run in the first phase of the sorted plan:
    /// format/device destruction and every shrink.
    pub fn is_destructive(&self) -> bool {
        self.is_destroy() || self.is_shrink()
    }

    pub(crate) fn device_existed(&self) -> bool {
        self.device_existed
    }

    pub(crate) fn take_pending_device(&mut self) -> Option<Box<Device>> {
        self.pending_device.take()
    }

    /// The `exists` flag relevant to obsolescence guards: the new format
    /// for create, the saved format for destroy, the device's current
    /// format otherwise.
    fn guard_format_exists(&self, tree: &DeviceTree) -> bool {
        match &self.kind {
            OpKind::CreateFormat { new_format } => new_format.exists(),
            OpKind::DestroyFormat => self.format_existed,
            _ => tree
                .record(self.device_id)
                .map(|d| d.format().exists())
                .unwrap_or(false),
        }
    }

    /// Return true if `self` must execute strictly after `other`.
    pub fn requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        match &self.kind {
            OpKind::CreateDevice => self.create_device_requires(other, tree),
            OpKind::DestroyDevice => self.destroy_device_requires(other, tree),
            OpKind::ResizeDevice { .. } => self.resize_device_requires(other, tree),
            OpKind::CreateFormat { .. } => self.create_format_requires(other, tree),
            OpKind::DestroyFormat => self.destroy_format_requires(other, tree),
            OpKind::ResizeFormat { .. } => self.resize_format_requires(other, tree),
            // a migration only needs its (existing) device set up; it joins
            // no ordering edges beyond phase membership
            OpKind::MigrateFormat { .. } => false,
        }
    }

    /// Device create operations require other operations when:
    ///   - this operation's device depends on the other operation's device
    ///   - both create partitions on the same disk and this partition has
    ///     a higher number (create in ascending numerical order)
    ///   - both create LVs in the same VG, the other is pinned to a single
    ///     PV and this one is not (pinned volumes placed first)
    fn create_device_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        if tree.depends_on(self.device_id, other.device_id) {
            return true;
        }
        if !(other.is_create() && other.is_device()) {
            return false;
        }
        let (Some(a), Some(b)) = (tree.record(self.device_id), tree.record(other.device_id)) else {
            return false;
        };
        match (a.kind(), b.kind()) {
            (DeviceKind::Partition { number: a_num, .. }, DeviceKind::Partition { number: b_num, .. }) => {
                a.partition_disk() == b.partition_disk() && a_num > b_num
            }
            (DeviceKind::LogicalVolume { single_pv: a_pinned, .. }, DeviceKind::LogicalVolume { single_pv: b_pinned, .. }) => {
                a.vg_id() == b.vg_id() && *b_pinned && !a_pinned
            }
            _ => false,
        }
    }

    /// Device destroy operations require other operations when:
    ///   - the other operation's device depends on this one's and the
    ///     other is a destroy (children torn down before parents)
    ///   - both destroy partitions on the same disk and this partition has
    ///     a lower number (destroy in descending numerical order)
    ///   - the other destroys this device's format (content wiped before
    ///     the device goes away)
    fn destroy_device_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        if other.is_destroy() && tree.depends_on(other.device_id, self.device_id) {
            return true;
        }
        if other.is_destroy() && other.is_device() {
            if let (Some(a), Some(b)) = (tree.record(self.device_id), tree.record(other.device_id)) {
                if let (
                    DeviceKind::Partition { number: a_num, .. },
                    DeviceKind::Partition { number: b_num, .. },
                ) = (a.kind(), b.kind())
                {
                    if a.partition_disk() == b.partition_disk() && a_num < b_num {
                        return true;
                    }
                }
            }
        }
        matches!(other.kind, OpKind::DestroyFormat) && other.device_id == self.device_id
    }

    /// A device resize requires another resize when:
    ///   - the other resizes this device's format and both shrink (the
    ///     filesystem shrinks before its container)
    ///   - the other grows something this device depends on
    ///   - the other shrinks something that depends on this device
    fn resize_device_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        if !other.is_resize() {
            return false;
        }
        if self.device_id == other.device_id
            && self.direction() == other.direction()
            && other.is_format()
            && self.is_shrink()
        {
            return true;
        }
        if other.is_grow() && tree.depends_on(self.device_id, other.device_id) {
            return true;
        }
        other.is_shrink() && tree.depends_on(other.device_id, self.device_id)
    }

    /// A format resize requires another resize when:
    ///   - the other resizes this format's device and both grow (the
    ///     container grows before the filesystem)
    ///   - the other shrinks something that depends on this device
    ///   - the other grows something this device depends on
    fn resize_format_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        if !other.is_resize() {
            return false;
        }
        if self.device_id == other.device_id
            && self.direction() == other.direction()
            && other.is_device()
            && self.is_grow()
        {
            return true;
        }
        if other.is_shrink() && tree.depends_on(other.device_id, self.device_id) {
            return true;
        }
        other.is_grow() && tree.depends_on(self.device_id, other.device_id)
    }

    /// A format create requires:
    ///   - any non-destroy-device operation on a device this one depends on
    ///   - a create or resize of the device the format lands on
    fn create_format_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        if tree.depends_on(self.device_id, other.device_id)
            && !(other.is_destroy() && other.is_device())
        {
            return true;
        }
        other.is_device()
            && (other.is_create() || other.is_resize())
            && self.device_id == other.device_id
    }

    /// A format destroy requires destroy operations on devices that depend
    /// on this format's device (formats on children go first).
    fn destroy_format_requires(&self, other: &Operation, tree: &DeviceTree) -> bool {
        other.is_destroy() && tree.depends_on(other.device_id, self.device_id)
    }

    /// Return true if `self` makes `other` irrelevant.
    ///
    /// The default is "same device, same type/object, higher id". Format
    /// create and destroy, and device destroy, widen that per their
    /// documented rules.
    pub fn obsoletes(&self, other: &Operation, tree: &DeviceTree) -> bool {
        match &self.kind {
            OpKind::CreateFormat { .. } => {
                // obsoletes earlier format operations on the same device,
                // but never a pending wipe of existing content
                self.device_id == other.device_id
                    && other.is_format()
                    && !matches!(other.kind, OpKind::DestroyFormat)
                    && self.id > other.id
            }
            OpKind::DestroyFormat => {
                self.device_id == other.device_id
                    && other.is_format()
                    && (self.id > other.id || (self.id == other.id && !self.format_existed))
                    && !(other.guard_format_exists(tree) && !self.format_existed)
            }
            OpKind::DestroyDevice => {
                if self.device_id != other.device_id {
                    return false;
                }
                if !self.device_existed {
                    // a destroy of a never-created device erases every
                    // earlier operation on it, itself included
                    self.id >= other.id
                } else {
                    self.id > other.id && !matches!(other.kind, OpKind::DestroyFormat)
                }
            }
            _ => {
                self.device_id == other.device_id
                    && self.op_type() == other.op_type()
                    && self.object() == other.object()
                    && self.id > other.id
            }
        }
    }

    /// Perform the real change through the external drivers. Planner-side
    /// state is already final; this only touches hardware (or logs, in
    /// dry-run mode).
    pub fn execute(&self, tree: &DeviceTree, progress: Option<&mut dyn Progress>) -> Result<()> {
        if let Some(progress) = progress {
            progress.status(&self.to_string());
        }
        info!("executing {}", self);
        let device = tree.record(self.device_id).ok_or_else(|| {
            StorageError::device_tree(format!("unknown device {} at execute time", self.device_name))
        })?;
        match &self.kind {
            OpKind::CreateDevice => execute_create_device(tree, device),
            OpKind::DestroyDevice => execute_destroy_device(tree, device),
            OpKind::ResizeDevice { new_size, .. } => execute_resize_device(tree, device, *new_size),
            OpKind::CreateFormat { new_format } => execute_create_format(device, new_format),
            OpKind::DestroyFormat => library::wipefs(&device.path().display().to_string()),
            OpKind::ResizeFormat { new_size, .. } => execute_resize_format(device, *new_size),
            OpKind::MigrateFormat { target } => execute_migrate_format(device, *target),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.id, self.op_type(), self.object())?;
        if let Some(direction) = self.direction() {
            write!(f, " ({})", direction)?;
        }
        if self.is_format() {
            write!(f, " {}", self.format_desc)?;
            if let OpKind::MigrateFormat { target } = &self.kind {
                write!(f, " to {}", target)?;
            }
            write!(f, " on")?;
        }
        write!(
            f,
            " {} {} (id {})",
            self.device_type, self.device_name, self.device_id
        )
    }
}

fn paths_of(tree: &DeviceTree, ids: &[DeviceId]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| tree.record(*id))
        .map(|d| d.path().display().to_string())
        .collect()
}

fn execute_create_device(tree: &DeviceTree, device: &Device) -> Result<()> {
    let path = device.path().display().to_string();
    match device.kind() {
        DeviceKind::Partition { number, part_type, start, .. } => {
            let disk = device
                .partition_disk()
                .and_then(|id| tree.record(id))
                .ok_or_else(|| StorageError::device_tree("partition has no disk"))?;
            let disk_path = disk.path().display().to_string();
            let start_arg = format!("{}MiB", start);
            let end_arg = format!("{}MiB", start + device.target_size());
            library::run_tool(
                "parted",
                &[
                    "-s",
                    &disk_path,
                    "--",
                    "mkpart",
                    &part_type.to_string(),
                    &start_arg,
                    &end_arg,
                ],
            )?;
            tracing::debug!("created partition {} (number {})", device.name(), number);
            Ok(())
        }
        DeviceKind::RaidArray { level, member_devices, spares, .. } => {
            let members = paths_of(tree, device.parents());
            let member_refs: Vec<&str> = members.iter().map(String::as_str).collect();
            library::raid::mdcreate(&path, *level, *member_devices, *spares, &member_refs)
        }
        DeviceKind::VolumeGroup { pe_size } => {
            let pvs = paths_of(tree, device.parents());
            let pv_refs: Vec<&str> = pvs.iter().map(String::as_str).collect();
            library::lvm::vgcreate(device.name(), *pe_size, &pv_refs)
        }
        DeviceKind::LogicalVolume { lv_name, single_pv, .. } => {
            let vg = device
                .vg_id()
                .and_then(|id| tree.record(id))
                .ok_or_else(|| StorageError::device_tree("logical volume has no volume group"))?;
            let pinned = if *single_pv {
                tree.pvs_of(vg.id())
                    .into_iter()
                    .find(|pv| pv.current_size() >= device.target_size())
                    .map(|pv| pv.path().display().to_string())
            } else {
                None
            };
            library::lvm::lvcreate(vg.name(), lv_name, device.target_size(), pinned.as_deref())
        }
        DeviceKind::FileBacked => {
            let length = format!("{}MiB", device.target_size());
            library::run_tool("fallocate", &["-l", &length, &path])?;
            Ok(())
        }
        _ => Err(StorageError::invalid_argument(format!(
            "cannot create a {} device",
            device.type_name()
        ))),
    }
}

fn execute_destroy_device(tree: &DeviceTree, device: &Device) -> Result<()> {
    if !device.media_present() {
        return Err(StorageError::invalid_argument(format!(
            "cannot destroy {} with no media",
            device.name()
        )));
    }
    let path = device.path().display().to_string();
    match device.kind() {
        DeviceKind::Partition { number, .. } => {
            let disk = device
                .partition_disk()
                .and_then(|id| tree.record(id))
                .ok_or_else(|| StorageError::device_tree("partition has no disk"))?;
            let disk_path = disk.path().display().to_string();
            library::run_tool("parted", &["-s", &disk_path, "rm", &number.to_string()])?;
            Ok(())
        }
        DeviceKind::RaidArray { .. } => {
            library::raid::mddeactivate(&path)?;
            for member in paths_of(tree, device.parents()) {
                library::raid::mddestroy(&member)?;
            }
            Ok(())
        }
        DeviceKind::VolumeGroup { .. } => library::lvm::vgremove(device.name()),
        DeviceKind::LogicalVolume { lv_name, .. } => {
            let vg = device
                .vg_id()
                .and_then(|id| tree.record(id))
                .ok_or_else(|| StorageError::device_tree("logical volume has no volume group"))?;
            library::lvm::lvremove(vg.name(), lv_name)
        }
        DeviceKind::FileBacked => {
            if library::is_dry_run() {
                return Ok(());
            }
            std::fs::remove_file(&path)?;
            Ok(())
        }
        DeviceKind::NoDev => Ok(()),
        _ => Err(StorageError::invalid_argument(format!(
            "cannot destroy a {} device",
            device.type_name()
        ))),
    }
}

fn execute_resize_device(tree: &DeviceTree, device: &Device, new_size: u64) -> Result<()> {
    match device.kind() {
        DeviceKind::LogicalVolume { lv_name, .. } => {
            // the VG prefix is part of the full name only
            let vg_name = &device.name()[..device.name().len() - lv_name.len() - 1];
            library::lvm::lvresize(vg_name, lv_name, new_size)
        }
        DeviceKind::Partition { number, start, .. } => {
            let disk = device
                .partition_disk()
                .and_then(|id| tree.record(id))
                .ok_or_else(|| StorageError::device_tree("partition has no disk"))?;
            let disk_path = disk.path().display().to_string();
            let end = format!("{}MiB", start + new_size);
            library::run_tool("parted", &["-s", &disk_path, "resizepart", &number.to_string(), &end])?;
            Ok(())
        }
        _ => Err(StorageError::invalid_argument(format!(
            "cannot resize a {} device",
            device.type_name()
        ))),
    }
}

fn execute_create_format(device: &Device, format: &Format) -> Result<()> {
    let path = device.path().display().to_string();
    match format.kind() {
        FormatKind::DiskLabel => {
            library::run_tool("parted", &["-s", &path, "mklabel", "gpt"])?;
            Ok(())
        }
        kind => {
            let Some(tool) = kind.create_tool() else {
                return Err(StorageError::format(format!(
                    "no tool available to create a {} format",
                    kind
                )));
            };
            let mut args: Vec<&str> = Vec::new();
            if matches!(kind, FormatKind::Ext2 | FormatKind::Ext3 | FormatKind::Ext4) {
                args.push("-F");
            }
            if matches!(kind, FormatKind::LvmPv) {
                args.extend_from_slice(&["-ff", "-y"]);
            }
            args.push(&path);
            library::run_tool(tool, &args)?;
            Ok(())
        }
    }
}

fn execute_resize_format(device: &Device, new_size: u64) -> Result<()> {
    let format = device.format();
    if !format.kind().resizable() {
        return Err(StorageError::format(format!(
            "{} filesystems cannot be resized",
            format.kind()
        )));
    }
    let path = device.path().display().to_string();
    let size_arg = format!("{}M", new_size);
    library::run_tool("resize2fs", &["-f", &path, &size_arg])?;
    Ok(())
}

fn execute_migrate_format(device: &Device, target: FormatKind) -> Result<()> {
    let path = device.path().display().to_string();
    match target {
        // adding a journal takes ext2 to ext3 in place
        FormatKind::Ext3 => {
            library::run_tool("tune2fs", &["-j", &path])?;
            Ok(())
        }
        other => Err(StorageError::format(format!(
            "no migration path to {}",
            other
        ))),
    }
}
