//! Error handling module for diskplan
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the planner should use these types for consistency.

use thiserror::Error;

/// Main error type for the storage planner
#[derive(Error, Debug)]
pub enum StorageError {
    /// Constructor precondition failures (non-resizable device, absolute
    /// path required, new size equal to old size, etc.)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Registration violates device-tree state (operation on a missing
    /// device, destroy of a non-leaf, duplicate device id)
    #[error("Device tree error: {0}")]
    DeviceTree(String),

    /// A single-PV logical volume cannot fit on any physical volume
    #[error("Single physical volume error: {0}")]
    SinglePv(String),

    /// Topological sort cannot order the pending operations
    #[error("Cyclic graph: {0}")]
    CyclicGraph(String),

    /// Format driver refused (execute time only)
    #[error("Format error: {0}")]
    Format(String),

    /// External tool (LVM/RAID/dm) returned nonzero (execute time only)
    #[error("Storage library error: {0}")]
    Library(String),

    /// IO errors (layout files, device nodes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for planner operations
pub type Result<T> = std::result::Result<T, StorageError>;

// Convenient error constructors
impl StorageError {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a device-tree error
    pub fn device_tree(msg: impl Into<String>) -> Self {
        Self::DeviceTree(msg.into())
    }

    /// Create a single-PV error
    pub fn single_pv(msg: impl Into<String>) -> Self {
        Self::SinglePv(msg.into())
    }

    /// Create a cyclic-graph error
    pub fn cyclic_graph(msg: impl Into<String>) -> Self {
        Self::CyclicGraph(msg.into())
    }

    /// Create a format-driver error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a library error
    pub fn library(msg: impl Into<String>) -> Self {
        Self::Library(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::invalid_argument("device is not resizable");
        assert_eq!(err.to_string(), "Invalid argument: device is not resizable");

        let err = StorageError::device_tree("cannot remove non-leaf device sda");
        assert_eq!(
            err.to_string(),
            "Device tree error: cannot remove non-leaf device sda"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = StorageError::cyclic_graph("no root nodes");
        assert!(matches!(err, StorageError::CyclicGraph(_)));

        let err = StorageError::single_pv("no physical volumes available");
        assert!(matches!(err, StorageError::SinglePv(_)));
    }
}
