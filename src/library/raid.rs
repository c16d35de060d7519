//! Software RAID tool wrappers (`mdadm`).

use super::run_tool;
use crate::device::RaidLevel;
use crate::error::Result;

/// Assemble a new array over the member devices.
pub fn mdcreate(
    array_path: &str,
    level: RaidLevel,
    member_devices: u32,
    spares: u32,
    members: &[&str],
) -> Result<()> {
    let level_arg = format!("--level={}", level);
    let members_arg = format!("--raid-devices={}", member_devices);
    let spares_arg = format!("--spare-devices={}", spares);
    let mut args = vec![
        "--create",
        array_path,
        "--run",
        level_arg.as_str(),
        members_arg.as_str(),
    ];
    if spares > 0 {
        args.push(spares_arg.as_str());
    }
    args.extend_from_slice(members);
    run_tool("mdadm", &args)?;
    Ok(())
}

/// Stop a running array.
pub fn mddeactivate(array_path: &str) -> Result<()> {
    run_tool("mdadm", &["--stop", array_path])?;
    Ok(())
}

/// Start an existing array from its members.
pub fn mdactivate(array_path: &str, members: &[&str]) -> Result<()> {
    let mut args = vec!["--assemble", array_path, "--run"];
    args.extend_from_slice(members);
    run_tool("mdadm", &args)?;
    Ok(())
}

/// Erase the RAID member superblock from a device.
pub fn mddestroy(member_device: &str) -> Result<()> {
    run_tool("mdadm", &["--zero-superblock", member_device])?;
    Ok(())
}
