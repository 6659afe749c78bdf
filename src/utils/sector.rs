//! Sector alignment and calculation utilities

use crate::types::SECTOR_SIZE;

/// Align a byte count to the next sector boundary
pub fn align_to_sector(value: u64) -> u64 {
    value.div_ceil(SECTOR_SIZE as u64) * SECTOR_SIZE as u64
}

/// Number of sectors needed to hold a byte count
pub fn sectors_for_bytes(byte_count: u64) -> u64 {
    byte_count.div_ceil(SECTOR_SIZE as u64)
}

/// Convert a sector number to a byte offset
pub fn sector_to_byte(sector: u64) -> u64 {
    sector * SECTOR_SIZE as u64
}

/// Check whether a byte offset sits on a sector boundary
pub fn is_sector_aligned(value: u64) -> bool {
    value % SECTOR_SIZE as u64 == 0
}
