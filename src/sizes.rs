//! Size arithmetic helpers.
//!
//! The planner's canonical size unit is the MiB (2^20 bytes). Partition
//! geometry in sectors is confined to the partition internals and the
//! execute-time tool wrappers; everything crossing the public API is MiB.

/// One MiB in bytes.
pub const MIB: u64 = 1 << 20;

/// Classic 512-byte sector.
pub const SECTOR_SIZE: u64 = 512;

/// Sectors per MiB at 512-byte sector size.
pub const SECTORS_PER_MIB: u64 = MIB / SECTOR_SIZE;

/// Convert a byte count to MiB, rounding down.
pub fn bytes_to_mib_floor(bytes: u64) -> u64 {
    bytes / MIB
}

/// Convert a byte count to MiB, rounding up.
pub fn bytes_to_mib_ceil(bytes: u64) -> u64 {
    bytes.div_ceil(MIB)
}

/// Convert a sector count (512-byte sectors) to MiB, rounding down.
pub fn sectors_to_mib_floor(sectors: u64) -> u64 {
    sectors / SECTORS_PER_MIB
}

/// Convert MiB to 512-byte sectors.
pub fn mib_to_sectors(mib: u64) -> u64 {
    mib * SECTORS_PER_MIB
}

/// Round `size` down to a multiple of `extent`. An extent of zero leaves
/// the size untouched.
pub fn align_down(size: u64, extent: u64) -> u64 {
    if extent == 0 {
        return size;
    }
    (size / extent) * extent
}

/// Round `size` up to a multiple of `extent`. An extent of zero leaves
/// the size untouched.
pub fn align_up(size: u64, extent: u64) -> u64 {
    if extent == 0 {
        return size;
    }
    size.div_ceil(extent) * extent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_mib() {
        assert_eq!(bytes_to_mib_floor(MIB), 1);
        assert_eq!(bytes_to_mib_floor(MIB + 1), 1);
        assert_eq!(bytes_to_mib_ceil(MIB + 1), 2);
        assert_eq!(bytes_to_mib_ceil(0), 0);
    }

    #[test]
    fn test_sector_conversion() {
        assert_eq!(mib_to_sectors(1), 2048);
        assert_eq!(sectors_to_mib_floor(2048), 1);
        assert_eq!(sectors_to_mib_floor(2047), 0);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(align_down(1023, 4), 1020);
        assert_eq!(align_up(1021, 4), 1024);
        assert_eq!(align_down(1024, 4), 1024);
        assert_eq!(align_up(1024, 4), 1024);
        // zero extent is a no-op
        assert_eq!(align_down(37, 0), 37);
        assert_eq!(align_up(37, 0), 37);
    }
}
