//! diskplan: storage planning engine for Linux system installers.
//!
//! Given a probed inventory of block devices and the user's desired final
//! layout, the planner assembles a list of operations (create, destroy,
//! resize, migrate of devices and their on-disk formats), validates it
//! against the device tree's invariants, prunes redundant and cancelling
//! intent, and emits the operations in a safe two-phase execution order:
//! destructive work first, constructive work last.
//!
//! Planning never touches real block devices; all state lives in an
//! in-memory [`DeviceTree`]. Real I/O happens only when the caller walks
//! the processed plan and invokes [`Operation::execute`] on each entry.

pub mod autopart;
pub mod device;
pub mod error;
pub mod format;
pub mod layout;
pub mod library;
pub mod operation;
pub mod progress;
pub mod session;
pub mod sizes;
pub mod tree;
pub mod tsort;

// Re-export main types for convenience
pub use autopart::{
    candidate_disks, compare_disks, do_auto_partition, AutoPartMethod, AutoPartRequest,
    ShrinkRequest,
};
pub use device::{Device, DeviceKind, DiskInfo, LvArgs, PartitionType, RaidLevel};
pub use error::{Result, StorageError};
pub use format::{default_filesystem_type, get_format, Format, FormatKind};
pub use layout::{LayoutConfig, PartitionRequest};
pub use library::{disable_dry_run, enable_dry_run, is_dry_run};
pub use operation::{OpKind, OpObject, OpType, Operation, ResizeDirection};
pub use progress::{LogProgress, Progress};
pub use session::{DeviceId, OperationId, Session};
pub use tree::{DeviceTree, OperationFilter};
