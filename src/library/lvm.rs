//! LVM tool wrappers (`pvcreate`, `vgcreate`, `lvcreate`, ...).

use super::run_tool;
use crate::error::Result;

pub fn pvcreate(device: &str) -> Result<()> {
    run_tool("lvm", &["pvcreate", "-ff", "-y", device])?;
    Ok(())
}

pub fn pvremove(device: &str) -> Result<()> {
    run_tool("lvm", &["pvremove", "-ff", "-y", device])?;
    Ok(())
}

pub fn vgcreate(vg_name: &str, pe_size_mib: u64, pv_devices: &[&str]) -> Result<()> {
    let pe_size = format!("{}m", pe_size_mib);
    let mut args = vec!["vgcreate", "-s", pe_size.as_str(), vg_name];
    args.extend_from_slice(pv_devices);
    run_tool("lvm", &args)?;
    Ok(())
}

pub fn vgremove(vg_name: &str) -> Result<()> {
    run_tool("lvm", &["vgremove", "--force", vg_name])?;
    Ok(())
}

pub fn vgactivate(vg_name: &str) -> Result<()> {
    run_tool("lvm", &["vgchange", "-a", "y", vg_name])?;
    Ok(())
}

pub fn vgdeactivate(vg_name: &str) -> Result<()> {
    run_tool("lvm", &["vgchange", "-a", "n", vg_name])?;
    Ok(())
}

/// Create a logical volume. `pv_device` restricts allocation to one
/// physical volume (single-PV LVs).
pub fn lvcreate(vg_name: &str, lv_name: &str, size_mib: u64, pv_device: Option<&str>) -> Result<()> {
    let size = format!("{}m", size_mib);
    let mut args = vec!["lvcreate", "-L", size.as_str(), "-n", lv_name, vg_name];
    if let Some(pv) = pv_device {
        args.push(pv);
    }
    run_tool("lvm", &args)?;
    Ok(())
}

pub fn lvremove(vg_name: &str, lv_name: &str) -> Result<()> {
    let target = format!("{}/{}", vg_name, lv_name);
    run_tool("lvm", &["lvremove", "--force", &target])?;
    Ok(())
}

pub fn lvresize(vg_name: &str, lv_name: &str, size_mib: u64) -> Result<()> {
    let target = format!("{}/{}", vg_name, lv_name);
    let size = format!("{}m", size_mib);
    run_tool("lvm", &["lvresize", "--force", "-L", &size, &target])?;
    Ok(())
}

pub fn lvactivate(vg_name: &str, lv_name: &str) -> Result<()> {
    let target = format!("{}/{}", vg_name, lv_name);
    run_tool("lvm", &["lvchange", "-a", "y", &target])?;
    Ok(())
}

pub fn lvdeactivate(vg_name: &str, lv_name: &str) -> Result<()> {
    let target = format!("{}/{}", vg_name, lv_name);
    run_tool("lvm", &["lvchange", "-a", "n", &target])?;
    Ok(())
}
