//! Device-mapper node resolution.

use crate::error::{Result, StorageError};
use super::run_tool;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Return the `dm-X` node name for a device-mapper map name.
///
/// Resolution prefers the `/dev/mapper/<name>` symlink; when the symlink is
/// absent (udev has not settled, or the node was created by hand) it falls
/// back to `dmsetup info`.
pub fn dm_node_from_name(name: &str) -> Result<String> {
    let mapper_path = format!("{}/{}", crate::device::DEV_MAPPER_DIR, name);
    if let Ok(target) = fs::read_link(&mapper_path) {
        if let Some(node) = target.file_name().and_then(|n| n.to_str()) {
            debug!("dm_node_from_name({}) returning '{}'", name, node);
            return Ok(node.to_string());
        }
    }

    let devnum = run_tool(
        "dmsetup",
        &["info", "--columns", "--noheadings", "-o", "devno", name],
    )?;
    let devnum = devnum.trim();
    let Some((_major, minor)) = devnum.split_once(':') else {
        return Err(StorageError::library("dm device does not exist"));
    };
    let minor: u32 = minor
        .parse()
        .map_err(|_| StorageError::library(format!("unparseable dm device number {}", devnum)))?;
    let node = format!("dm-{}", minor);
    debug!("dm_node_from_name({}) returning '{}'", name, node);
    Ok(node)
}

/// Return the map name for a `dm-X` node name, via `dmsetup info` on the
/// node's major:minor pair.
pub fn name_from_dm_node(dm_node: &str) -> Result<String> {
    let sys_path = format!("/sys/block/{}/dev", dm_node);
    let devnum = match fs::read_to_string(&sys_path) {
        Ok(contents) => contents.trim().to_string(),
        Err(_) => {
            return Err(StorageError::library(format!(
                "no such device-mapper node {}",
                dm_node
            )))
        }
    };
    let Some((major, minor)) = devnum.split_once(':') else {
        return Err(StorageError::library(format!(
            "unparseable device number for {}",
            dm_node
        )));
    };

    let name = run_tool(
        "dmsetup",
        &[
            "info", "--columns", "--noheadings", "-o", "name", "-j", major, "-m", minor,
        ],
    )?;
    let name = name.trim().to_string();
    debug!("name_from_dm_node({}) returning '{}'", dm_node, name);
    Ok(name)
}

/// True when the given path looks like a device-mapper node path.
pub fn is_mapper_path(path: &Path) -> bool {
    path.starts_with(crate::device::DEV_MAPPER_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_mapper_path() {
        assert!(is_mapper_path(&PathBuf::from("/dev/mapper/vg-root")));
        assert!(!is_mapper_path(&PathBuf::from("/dev/sda1")));
    }

    #[test]
    fn test_missing_node_errors() {
        let err = name_from_dm_node("dm-diskplan-does-not-exist").unwrap_err();
        assert!(matches!(err, StorageError::Library(_)));
    }
}
