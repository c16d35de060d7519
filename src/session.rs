//! Planning session and identifier allocation.
//!
//! Devices and operations each draw from an independent, monotonically
//! increasing id sequence. The counters live in a [`Session`] value that is
//! threaded through the planner APIs, so parallel test cases and repeated
//! planning runs never see each other's ids. Ids are never reused within a
//! session; operation id order defines "earlier" vs "later" for the
//! obsoletes rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a device within a planning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a scheduled operation within a planning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id allocator for one planning run.
#[derive(Debug, Default)]
pub struct Session {
    next_device: u64,
    next_operation: u64,
}

impl Session {
    /// Create a fresh session with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next device id.
    pub fn next_device_id(&mut self) -> DeviceId {
        let id = DeviceId(self.next_device);
        self.next_device += 1;
        id
    }

    /// Allocate the next operation id.
    pub fn next_operation_id(&mut self) -> OperationId {
        let id = OperationId(self.next_operation);
        self.next_operation += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_ids_monotonic() {
        let mut session = Session::new();
        let a = session.next_device_id();
        let b = session.next_device_id();
        let c = session.next_device_id();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_counters_independent() {
        let mut session = Session::new();
        let d = session.next_device_id();
        let o = session.next_operation_id();
        // both sequences start at zero and advance separately
        assert_eq!(d.to_string(), "0");
        assert_eq!(o.to_string(), "0");
        assert_eq!(session.next_device_id().to_string(), "1");
        assert_eq!(session.next_operation_id().to_string(), "1");
    }

    #[test]
    fn test_sessions_isolated() {
        let mut a = Session::new();
        let mut b = Session::new();
        a.next_device_id();
        a.next_device_id();
        // a's allocations do not advance b
        assert_eq!(b.next_device_id().to_string(), "0");
    }
}
