//! Execute-time wrappers around the external storage tools.
//!
//! The planner mutates only its in-memory model; every real change to a
//! block device goes through one of these thin wrappers at execute time.
//! All of them honor the global dry-run toggle, which logs the exact
//! command instead of spawning it.

pub mod devicemapper;
pub mod lvm;
pub mod raid;

use crate::error::{Result, StorageError};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Serializes tests that flip the global dry-run flag.
#[cfg(test)]
pub(crate) static DRY_RUN_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Enable dry-run mode: commands are logged, never spawned.
pub fn enable_dry_run() {
    DRY_RUN.store(true, Ordering::SeqCst);
}

/// Disable dry-run mode.
pub fn disable_dry_run() {
    DRY_RUN.store(false, Ordering::SeqCst);
}

/// Whether dry-run mode is active.
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst)
}

/// Run an external tool, returning its stdout on success.
///
/// A nonzero exit status maps to [`StorageError::Library`] with the tool's
/// stderr attached.
pub fn run_tool(tool: &str, args: &[&str]) -> Result<String> {
    if is_dry_run() {
        info!("[dry run] {} {}", tool, args.join(" "));
        return Ok(String::new());
    }

    debug!("running {} {}", tool, args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| StorageError::library(format!("failed to spawn {}: {}", tool, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(StorageError::library(format!(
            "{} exited with {}: {}",
            tool,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

/// Wipe every known signature from a device (`wipefs -a`).
pub fn wipefs(device: &str) -> Result<()> {
    run_tool("wipefs", &["-a", device]).map_err(|e| {
        StorageError::format(format!("error wiping old signatures from {}: {}", device, e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_never_spawns() {
        let _guard = DRY_RUN_TEST_LOCK.lock().unwrap();
        enable_dry_run();
        // a tool that cannot exist; dry-run must still succeed
        let out = run_tool("no-such-tool-diskplan", &["--frobnicate"]).unwrap();
        assert!(out.is_empty());
        assert!(is_dry_run());
        disable_dry_run();
        assert!(!is_dry_run());
    }

    #[test]
    fn test_missing_tool_is_library_error() {
        let _guard = DRY_RUN_TEST_LOCK.lock().unwrap();
        disable_dry_run();
        let err = run_tool("no-such-tool-diskplan", &[]).unwrap_err();
        assert!(matches!(err, StorageError::Library(_)));
    }
}
