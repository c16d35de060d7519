//! The device tree: every known device plus the pending operation list.
//!
//! Devices live in an arena keyed by id; parent links are id sequences and
//! each device's `kids` counter is a shadow maintained exclusively by
//! [`DeviceTree::add_device`] / [`DeviceTree::remove_device`]. Registering
//! an operation eagerly mutates the tree so subsequent constructions see
//! the world as it will be; cancelling reverses the exact mutation.
//!
//! Devices removed from the tree (by a registered destroy) stay in the
//! arena as detached records, because ordering decisions still need their
//! parent links and partition numbers. Lookups by name or liveness only
//! ever see attached devices.

use crate::device::{Device, DeviceKind};
use crate::error::{Result, StorageError};
use crate::format::Format;
use crate::operation::{OpKind, OpObject, OpType, Operation, Patch};
use crate::session::{DeviceId, OperationId};
use crate::tsort::{create_graph, tsort};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Filter for [`DeviceTree::find_operations`]. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationFilter {
    pub device: Option<DeviceId>,
    pub op_type: Option<OpType>,
    pub object: Option<OpObject>,
}

impl OperationFilter {
    pub fn device(device: DeviceId) -> Self {
        Self { device: Some(device), ..Self::default() }
    }

    pub fn with_type(mut self, op_type: OpType) -> Self {
        self.op_type = Some(op_type);
        self
    }

    pub fn with_object(mut self, object: OpObject) -> Self {
        self.object = Some(object);
        self
    }

    fn matches(&self, op: &Operation) -> bool {
        self.device.is_none_or(|d| op.device_id() == d)
            && self.op_type.is_none_or(|t| op.op_type() == t)
            && self.object.is_none_or(|o| op.object() == o)
    }
}

/// Owner of all devices and pending operations for one planning run.
#[derive(Debug, Default)]
pub struct DeviceTree {
    /// Arena of every device seen this session, attached or not.
    devices: BTreeMap<DeviceId, Device>,
    /// Ids of devices currently in the tree.
    attached: BTreeSet<DeviceId>,
    /// Name index over attached devices.
    names: BTreeMap<String, DeviceId>,
    operations: Vec<Operation>,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Device management
    // ------------------------------------------------------------------

    /// Insert a device, incrementing each parent's child count.
    ///
    /// Fails when a device with the same id or name is already attached,
    /// or when a listed parent is not in the tree.
    pub fn add_device(&mut self, device: Device) -> Result<()> {
        let id = device.id();
        if self.attached.contains(&id) {
            return Err(StorageError::device_tree(format!(
                "device {} already in tree",
                device.name()
            )));
        }
        if self.names.contains_key(device.name()) {
            return Err(StorageError::device_tree(format!(
                "device name {} already in tree",
                device.name()
            )));
        }
        for parent in device.parents() {
            if !self.attached.contains(parent) {
                return Err(StorageError::device_tree(format!(
                    "parent {} of device {} not in tree",
                    parent,
                    device.name()
                )));
            }
        }
        for parent in device.parents().to_vec() {
            if let Some(parent) = self.devices.get_mut(&parent) {
                parent.add_child();
            }
        }
        debug!("added {} to the device tree", device);
        self.names.insert(device.name().to_string(), id);
        self.attached.insert(id);
        self.devices.insert(id, device);
        Ok(())
    }

    /// Remove a device. Only leaves may be removed; the record stays in
    /// the arena so pending operations can still be ordered.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let device = self.devices.get(&id).ok_or_else(|| {
            StorageError::device_tree(format!("device {} not known to this tree", id))
        })?;
        if !self.attached.contains(&id) {
            return Err(StorageError::device_tree(format!(
                "device {} not in tree",
                device.name()
            )));
        }
        if !device.is_leaf() {
            return Err(StorageError::device_tree(format!(
                "cannot remove non-leaf device {}",
                device.name()
            )));
        }
        let name = device.name().to_string();
        let parents = device.parents().to_vec();
        for parent in parents {
            if let Some(parent) = self.devices.get_mut(&parent) {
                parent.remove_child();
            }
        }
        self.attached.remove(&id);
        self.names.remove(&name);
        debug!("removed {} from the device tree", name);
        Ok(())
    }

    /// Re-attach a detached device record, restoring parent child counts.
    fn relink_device(&mut self, id: DeviceId) -> Result<()> {
        let device = self.devices.get(&id).ok_or_else(|| {
            StorageError::device_tree(format!("device {} not known to this tree", id))
        })?;
        if self.attached.contains(&id) {
            return Ok(());
        }
        let name = device.name().to_string();
        let parents = device.parents().to_vec();
        for parent in &parents {
            if !self.attached.contains(parent) {
                return Err(StorageError::device_tree(format!(
                    "cannot restore {}: parent {} no longer in tree",
                    name, parent
                )));
            }
        }
        for parent in parents {
            if let Some(parent) = self.devices.get_mut(&parent) {
                parent.add_child();
            }
        }
        self.attached.insert(id);
        self.names.insert(name, id);
        Ok(())
    }

    /// Whether the device is currently in the tree.
    pub fn contains(&self, id: DeviceId) -> bool {
        self.attached.contains(&id)
    }

    /// Look up an attached device by id.
    pub fn get_device(&self, id: DeviceId) -> Option<&Device> {
        self.attached.contains(&id).then(|| &self.devices[&id])
    }

    /// Look up an attached device by name.
    pub fn get_device_by_name(&self, name: &str) -> Option<&Device> {
        self.names.get(name).map(|id| &self.devices[id])
    }

    /// All attached devices, in id order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.attached.iter().map(|id| &self.devices[id])
    }

    /// All attached devices of the given type name (`"disk"`,
    /// `"partition"`, `"lvmvg"`, `"lvmlv"`, ...).
    pub fn get_devices_by_type(&self, type_name: &str) -> Vec<&Device> {
        self.devices().filter(|d| d.type_name() == type_name).collect()
    }

    /// Arena access: attached or detached.
    pub(crate) fn record(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    fn record_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    // ------------------------------------------------------------------
    // Graph queries
    // ------------------------------------------------------------------

    /// True when `ancestor` is a transitive parent of `descendant`.
    pub fn depends_on(&self, descendant: DeviceId, ancestor: DeviceId) -> bool {
        let Some(device) = self.devices.get(&descendant) else {
            return false;
        };
        for parent in device.parents() {
            if *parent == ancestor || self.depends_on(*parent, ancestor) {
                return true;
            }
        }
        false
    }

    /// Attached devices that transitively depend on `id`, in id order.
    pub fn descendants(&self, id: DeviceId) -> Vec<&Device> {
        self.devices()
            .filter(|d| self.depends_on(d.id(), id))
            .collect()
    }

    /// Attached whole disks.
    pub fn disks(&self) -> Vec<&Device> {
        self.get_devices_by_type("disk")
    }

    /// Attached partitions on the given disk, in partition-number order.
    pub fn partitions_of(&self, disk: DeviceId) -> Vec<&Device> {
        let mut partitions: Vec<&Device> = self
            .devices()
            .filter(|d| d.partition_disk() == Some(disk))
            .collect();
        partitions.sort_by_key(|d| d.partition_number());
        partitions
    }

    /// The physical volumes backing a volume group (its parents).
    pub fn pvs_of(&self, vg: DeviceId) -> Vec<&Device> {
        let Some(vg) = self.devices.get(&vg) else {
            return Vec::new();
        };
        vg.parents()
            .iter()
            .filter_map(|id| self.devices.get(id))
            .collect()
    }

    /// Attached logical volumes of a volume group.
    pub fn lvs_of(&self, vg: DeviceId) -> Vec<&Device> {
        self.devices()
            .filter(|d| d.vg_id() == Some(vg))
            .collect()
    }

    /// Unallocated extent space in a volume group, in MiB.
    pub fn vg_free_space(&self, vg: DeviceId) -> u64 {
        let Some(vg_dev) = self.devices.get(&vg) else {
            return 0;
        };
        let DeviceKind::VolumeGroup { pe_size } = *vg_dev.kind() else {
            return 0;
        };
        let used: u64 = self.lvs_of(vg).iter().map(|lv| lv.vg_space_used(pe_size)).sum();
        vg_dev.current_size().saturating_sub(used)
    }

    /// Verify the kids shadow counters against actual parent references.
    pub fn kids_consistent(&self) -> bool {
        self.devices().all(|device| {
            let actual = self
                .devices()
                .filter(|d| d.parents().contains(&device.id()))
                .count() as u32;
            device.kids() == actual
        })
    }

    // ------------------------------------------------------------------
    // Operation management
    // ------------------------------------------------------------------

    /// Register an operation: validate it against tree state, apply its
    /// eager mutation, and append it to the pending list.
    ///
    /// Fails with a device-tree error when a non-create operation targets a
    /// device that is not in the tree, or a destroy targets a non-leaf.
    /// Registering duplicate intent succeeds; pruning collapses it later.
    pub fn add_operation(&mut self, mut op: Operation) -> Result<()> {
        match op.kind().clone() {
            OpKind::CreateDevice => {
                let device = op.take_pending_device();
                match device {
                    Some(device) if !self.attached.contains(&device.id()) => {
                        self.add_device(*device)?;
                        op.patch = Patch::AddedDevice;
                    }
                    _ => {
                        // duplicate intent: the device is already scheduled
                        debug!("device for {} already in tree, registering as duplicate", op);
                        op.patch = Patch::None;
                    }
                }
            }
            OpKind::DestroyDevice => {
                self.require_attached(&op)?;
                self.remove_device(op.device_id())?;
                op.patch = Patch::RemovedDevice;
            }
            OpKind::CreateFormat { new_format } => {
                self.require_attached(&op)?;
                let device = self.record_mut(op.device_id()).expect("attached device");
                let mut format = new_format;
                let path = device.path();
                if path.is_absolute() {
                    format.set_device(Some(path))?;
                }
                let previous = device.replace_format(format);
                op.patch = Patch::ReplacedFormat { previous };
            }
            OpKind::DestroyFormat => {
                self.require_attached(&op)?;
                let device = self.record_mut(op.device_id()).expect("attached device");
                let previous = device.replace_format(Format::null());
                op.patch = Patch::ReplacedFormat { previous };
            }
            OpKind::ResizeDevice { new_size, .. } => {
                self.require_attached(&op)?;
                let device = self.record_mut(op.device_id()).expect("attached device");
                let previous = device.target_size();
                device.set_target_size(new_size);
                op.patch = Patch::RetargetedDevice { previous };
            }
            OpKind::ResizeFormat { new_size, .. } => {
                self.require_attached(&op)?;
                let device = self.record_mut(op.device_id()).expect("attached device");
                let previous = device.format().target_size();
                device.format_mut().set_target_size(new_size);
                op.patch = Patch::RetargetedFormat { previous };
            }
            OpKind::MigrateFormat { .. } => {
                self.require_attached(&op)?;
                let device = self.record_mut(op.device_id()).expect("attached device");
                device.format_mut().set_migrate(true);
                op.patch = Patch::SetMigrate;
            }
        }
        info!("registered operation: {}", op);
        self.operations.push(op);
        Ok(())
    }

    fn require_attached(&self, op: &Operation) -> Result<()> {
        if self.attached.contains(&op.device_id()) {
            Ok(())
        } else {
            Err(StorageError::device_tree(format!(
                "operation {} targets a device not in the tree",
                op
            )))
        }
    }

    /// Cancel a registered operation: reverse its eager mutation and drop
    /// it from the pending list.
    pub fn remove_operation(&mut self, id: OperationId) -> Result<()> {
        let index = self
            .operations
            .iter()
            .position(|op| op.id() == id)
            .ok_or_else(|| StorageError::device_tree(format!("no pending operation {}", id)))?;

        let patch = std::mem::take(&mut self.operations[index].patch);
        let device_id = self.operations[index].device_id();
        match patch {
            Patch::None => {}
            Patch::AddedDevice => {
                if let Err(e) = self.remove_device(device_id) {
                    self.operations[index].patch = Patch::AddedDevice;
                    return Err(e);
                }
            }
            Patch::RemovedDevice => {
                if let Err(e) = self.relink_device(device_id) {
                    self.operations[index].patch = Patch::RemovedDevice;
                    return Err(e);
                }
            }
            Patch::ReplacedFormat { previous } => {
                if let Some(device) = self.record_mut(device_id) {
                    device.replace_format(previous);
                }
            }
            Patch::RetargetedDevice { previous } => {
                if let Some(device) = self.record_mut(device_id) {
                    device.set_target_size(previous);
                }
            }
            Patch::RetargetedFormat { previous } => {
                if let Some(device) = self.record_mut(device_id) {
                    device.format_mut().set_target_size(previous);
                }
            }
            Patch::SetMigrate => {
                if let Some(device) = self.record_mut(device_id) {
                    device.format_mut().set_migrate(false);
                }
            }
        }
        let op = self.operations.remove(index);
        info!("cancelled operation: {}", op);
        Ok(())
    }

    /// The pending operations, in registration order (or sorted order
    /// after [`Self::process_operations`]).
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Pending operations matching the filter.
    pub fn find_operations(&self, filter: &OperationFilter) -> Vec<&Operation> {
        self.operations.iter().filter(|op| filter.matches(op)).collect()
    }

    // ------------------------------------------------------------------
    // Pruning and sorting
    // ------------------------------------------------------------------

    /// Reduce the pending set to a fixed point:
    ///
    /// 1. drop every operation some other pending operation obsoletes
    ///    (evaluated against the full set each round, so the result does
    ///    not depend on iteration order);
    /// 2. erase create/destroy cycles: a never-existing device with both a
    ///    pending create and destroy loses all of its operations;
    /// 3. drop leftovers targeting devices that are gone and never existed.
    pub fn prune_operations(&mut self) {
        loop {
            let before = self.operations.len();

            let dead: HashSet<OperationId> = {
                let tree: &DeviceTree = self;
                let mut dead = HashSet::new();
                for a in &tree.operations {
                    for b in &tree.operations {
                        if a.obsoletes(b, tree) {
                            dead.insert(b.id());
                        }
                    }
                }
                dead
            };
            if !dead.is_empty() {
                debug!("pruning {} obsoleted operations", dead.len());
                self.operations.retain(|op| !dead.contains(&op.id()));
            }

            let cycle_devices: HashSet<DeviceId> = {
                let mut created = HashSet::new();
                let mut destroyed = HashSet::new();
                for op in &self.operations {
                    match op.kind() {
                        OpKind::CreateDevice => {
                            created.insert(op.device_id());
                        }
                        OpKind::DestroyDevice if !op.device_existed() => {
                            destroyed.insert(op.device_id());
                        }
                        _ => {}
                    }
                }
                created.intersection(&destroyed).copied().collect()
            };
            if !cycle_devices.is_empty() {
                self.operations
                    .retain(|op| !cycle_devices.contains(&op.device_id()));
                for id in cycle_devices {
                    if self.attached.contains(&id) && self.devices[&id].is_leaf() {
                        let _ = self.remove_device(id);
                    }
                }
            }

            let attached = self.attached.clone();
            self.operations
                .retain(|op| attached.contains(&op.device_id()) || op.device_existed());

            if self.operations.len() == before {
                break;
            }
        }
    }

    /// Order the pending operations: all destructive operations (destroys
    /// and shrinks) first, then all constructive ones, each phase
    /// topologically sorted over the `requires` relation with ids breaking
    /// ties.
    pub fn sort_operations(&mut self) -> Result<()> {
        let order = self.sorted_ids()?;
        let position: HashMap<OperationId, usize> = order
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();
        self.operations.sort_by_key(|op| position[&op.id()]);
        Ok(())
    }

    fn sorted_ids(&self) -> Result<Vec<OperationId>> {
        let mut destructive = Vec::new();
        let mut constructive = Vec::new();
        for op in &self.operations {
            if op.is_destructive() {
                destructive.push(op.id());
            } else {
                constructive.push(op.id());
            }
        }
        destructive.sort();
        constructive.sort();

        let mut order = self.phase_order(&destructive)?;
        order.extend(self.phase_order(&constructive)?);
        Ok(order)
    }

    fn phase_order(&self, ids: &[OperationId]) -> Result<Vec<OperationId>> {
        let by_id: HashMap<OperationId, &Operation> = self
            .operations
            .iter()
            .map(|op| (op.id(), op))
            .collect();
        let mut edges = Vec::new();
        for &a in ids {
            for &b in ids {
                if a != b && by_id[&a].requires(by_id[&b], self) {
                    // b must sort before a
                    edges.push((b, a));
                }
            }
        }
        let graph = create_graph(ids.to_vec(), edges);
        tsort(&graph)
    }

    /// Prune and sort the pending operations, returning them ready to
    /// execute.
    pub fn process_operations(&mut self) -> Result<&[Operation]> {
        self.prune_operations();
        self.sort_operations()?;
        info!("processed {} pending operations", self.operations.len());
        for op in &self.operations {
            debug!("  {}", op);
        }
        Ok(&self.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DiskInfo, PartitionType};
    use crate::format::get_format;
    use crate::session::Session;

    fn disk(session: &mut Session, name: &str) -> Device {
        let mut d = Device::new_disk(session, name, 100_000, DiskInfo::default());
        d.replace_format(get_format("disklabel").with_exists(true));
        d
    }

    fn partition(session: &mut Session, name: &str, disk: &Device, size: u64, exists: bool) -> Device {
        Device::new_partition(session, name, disk, size, PartitionType::Normal, exists).unwrap()
    }

    #[test]
    fn test_add_remove_maintains_kids() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_id = sda.id();
        let sda1 = partition(&mut session, "sda1", &sda, 500, true);
        let sda1_id = sda1.id();

        tree.add_device(sda).unwrap();
        tree.add_device(sda1).unwrap();
        assert_eq!(tree.get_device(sda_id).unwrap().kids(), 1);
        assert!(!tree.get_device(sda_id).unwrap().is_leaf());
        assert!(tree.kids_consistent());

        // the disk is not a leaf while its partition is attached
        let err = tree.remove_device(sda_id);
        assert!(matches!(err, Err(StorageError::DeviceTree(_))));

        tree.remove_device(sda1_id).unwrap();
        assert_eq!(tree.get_device(sda_id).unwrap().kids(), 0);
        assert!(tree.get_device_by_name("sda1").is_none());
        assert!(tree.kids_consistent());
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let copy = sda.clone();
        tree.add_device(sda).unwrap();
        let err = tree.add_device(copy);
        assert!(matches!(err, Err(StorageError::DeviceTree(_))));
    }

    #[test]
    fn test_create_device_registration_adds_device() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();

        let sda1 = partition(&mut session, "sda1", &sda_ref, 500, false);
        let sda1_id = sda1.id();
        assert!(tree.get_device_by_name("sda1").is_none());

        let op = Operation::create_device(&mut session, sda1).unwrap();
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        assert!(tree.get_device_by_name("sda1").is_some());

        // cancel restores the previous tree
        tree.remove_operation(op_id).unwrap();
        assert!(tree.get_device_by_name("sda1").is_none());
        assert!(!tree.contains(sda1_id));
        assert!(tree.operations().is_empty());
        assert!(tree.kids_consistent());
    }

    #[test]
    fn test_destroy_device_registration_removes_device() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        let sda1 = partition(&mut session, "sda1", &sda_ref, 500, true);
        let sda1_id = sda1.id();
        tree.add_device(sda1).unwrap();

        let op = Operation::destroy_device(&mut session, tree.get_device(sda1_id).unwrap());
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        assert!(tree.get_device_by_name("sda1").is_none());

        tree.remove_operation(op_id).unwrap();
        assert!(tree.get_device_by_name("sda1").is_some());
        assert_eq!(tree.get_device(sda_ref.id()).unwrap().kids(), 1);
        assert!(tree.kids_consistent());
    }

    #[test]
    fn test_destroy_non_leaf_rejected() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_id = sda.id();
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        tree.add_device(partition(&mut session, "sda1", &sda_ref, 500, true))
            .unwrap();

        let op = Operation::destroy_device(&mut session, tree.get_device(sda_id).unwrap());
        let err = tree.add_operation(op);
        assert!(matches!(err, Err(StorageError::DeviceTree(_))));
        // the failed registration left no pending operation behind
        assert!(tree.operations().is_empty());
    }

    #[test]
    fn test_operations_on_unknown_device_rejected() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sdc = disk(&mut session, "sdc");
        let sdc_ref = sdc.clone();
        tree.add_device(sdc).unwrap();

        // sdc1 exists on disk but was never added to the tree
        let mut sdc1 = partition(&mut session, "sdc1", &sdc_ref, 100_000, true);
        sdc1.replace_format(get_format("ext2").with_exists(true).with_size(100_000));

        let create_format = Operation::create_format(
            &mut session,
            &sdc1,
            get_format("ext2").with_mountpoint("/"),
        );
        assert!(matches!(
            tree.add_operation(create_format),
            Err(StorageError::DeviceTree(_))
        ));

        let migrate = Operation::migrate_format(&mut session, &sdc1).unwrap();
        assert!(matches!(tree.add_operation(migrate), Err(StorageError::DeviceTree(_))));

        let resize_format = Operation::resize_format(&mut session, &sdc1, 90_000).unwrap();
        assert!(matches!(
            tree.add_operation(resize_format),
            Err(StorageError::DeviceTree(_))
        ));

        let resize = Operation::resize_device(&mut session, &sdc1, 90_000).unwrap();
        assert!(matches!(tree.add_operation(resize), Err(StorageError::DeviceTree(_))));

        let destroy_format = Operation::destroy_format(&mut session, &sdc1);
        assert!(matches!(
            tree.add_operation(destroy_format),
            Err(StorageError::DeviceTree(_))
        ));

        let destroy = Operation::destroy_device(&mut session, &sdc1);
        assert!(matches!(tree.add_operation(destroy), Err(StorageError::DeviceTree(_))));
    }

    #[test]
    fn test_format_registration_and_cancel() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        let mut sda1 = partition(&mut session, "sda1", &sda_ref, 500, true);
        sda1.replace_format(get_format("ext4").with_exists(true).with_size(500));
        let sda1_id = sda1.id();
        tree.add_device(sda1).unwrap();

        let new_format = get_format("swap");
        let op = Operation::create_format(&mut session, tree.get_device(sda1_id).unwrap(), new_format);
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        let attached = tree.get_device(sda1_id).unwrap().format();
        assert_eq!(attached.kind(), crate::format::FormatKind::Swap);
        // invariant: the attached format carries the device's path
        assert_eq!(attached.device().unwrap(), tree.get_device(sda1_id).unwrap().path());

        tree.remove_operation(op_id).unwrap();
        assert_eq!(
            tree.get_device(sda1_id).unwrap().format().kind(),
            crate::format::FormatKind::Ext4
        );

        // destroy format installs the null format
        let op = Operation::destroy_format(&mut session, tree.get_device(sda1_id).unwrap());
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        assert!(tree.get_device(sda1_id).unwrap().format().is_null());
        tree.remove_operation(op_id).unwrap();
        assert_eq!(
            tree.get_device(sda1_id).unwrap().format().kind(),
            crate::format::FormatKind::Ext4
        );
    }

    #[test]
    fn test_resize_registration_and_cancel() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        let mut sda1 = partition(&mut session, "sda1", &sda_ref, 32_768, true);
        sda1.replace_format(get_format("ext4").with_exists(true).with_size(32_768));
        let sda1_id = sda1.id();
        tree.add_device(sda1).unwrap();

        let op =
            Operation::resize_device(&mut session, tree.get_device(sda1_id).unwrap(), 30_000).unwrap();
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        assert_eq!(tree.get_device(sda1_id).unwrap().target_size(), 30_000);
        tree.remove_operation(op_id).unwrap();
        assert_eq!(tree.get_device(sda1_id).unwrap().target_size(), 32_768);

        let op =
            Operation::resize_format(&mut session, tree.get_device(sda1_id).unwrap(), 30_000).unwrap();
        let op_id = op.id();
        tree.add_operation(op).unwrap();
        assert_eq!(tree.get_device(sda1_id).unwrap().format().target_size(), 30_000);
        tree.remove_operation(op_id).unwrap();
        assert_eq!(tree.get_device(sda1_id).unwrap().format().target_size(), 32_768);
    }

    #[test]
    fn test_redundant_resize_pruned() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        let mut lv = partition(&mut session, "sda1", &sda_ref, 160_000, true);
        lv.replace_format(get_format("ext4").with_exists(true).with_size(160_000));
        let lv_id = lv.id();
        tree.add_device(lv).unwrap();

        let first =
            Operation::resize_format(&mut session, tree.get_device(lv_id).unwrap(), 155_000).unwrap();
        tree.add_operation(first).unwrap();
        let second =
            Operation::resize_format(&mut session, tree.get_device(lv_id).unwrap(), 150_000).unwrap();
        let second_id = second.id();
        tree.add_operation(second).unwrap();

        assert_eq!(tree.operations().len(), 2);
        tree.prune_operations();
        let remaining = tree.find_operations(&OperationFilter::device(lv_id));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), second_id);
        assert_eq!(remaining[0].new_size(), Some(150_000));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();

        let sda1 = partition(&mut session, "sda1", &sda_ref, 40_000, false);
        let create = Operation::create_device(&mut session, sda1).unwrap();
        let device_id = create.device_id();
        tree.add_operation(create).unwrap();
        let format_op = Operation::create_format(
            &mut session,
            tree.get_device(device_id).unwrap(),
            get_format("ext4"),
        );
        tree.add_operation(format_op).unwrap();
        let destroy = Operation::destroy_device(&mut session, tree.record(device_id).unwrap());
        tree.add_operation(destroy).unwrap();

        tree.prune_operations();
        let after_first: Vec<OperationId> = tree.operations().iter().map(|op| op.id()).collect();
        tree.prune_operations();
        let after_second: Vec<OperationId> = tree.operations().iter().map(|op| op.id()).collect();
        assert_eq!(after_first, after_second);
        assert!(after_first.is_empty());
    }

    #[test]
    fn test_find_operations_filters() {
        let mut session = Session::new();
        let mut tree = DeviceTree::new();
        let sda = disk(&mut session, "sda");
        let sda_ref = sda.clone();
        tree.add_device(sda).unwrap();
        let sda1 = partition(&mut session, "sda1", &sda_ref, 500, false);
        let sda1_id = sda1.id();
        let create = Operation::create_device(&mut session, sda1).unwrap();
        tree.add_operation(create).unwrap();
        let format_op = Operation::create_format(
            &mut session,
            tree.get_device(sda1_id).unwrap(),
            get_format("ext4").with_mountpoint("/boot"),
        );
        tree.add_operation(format_op).unwrap();

        assert_eq!(tree.find_operations(&OperationFilter::default()).len(), 2);
        assert_eq!(
            tree.find_operations(&OperationFilter::device(sda1_id)).len(),
            2
        );
        assert_eq!(
            tree.find_operations(
                &OperationFilter::device(sda1_id).with_object(OpObject::Format)
            )
            .len(),
            1
        );
        assert_eq!(
            tree.find_operations(
                &OperationFilter::default()
                    .with_type(OpType::Create)
                    .with_object(OpObject::Device)
            )
            .len(),
            1
        );
    }
}
