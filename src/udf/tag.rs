//! UDF descriptor tags (ECMA-167 7.2)
//!
//! Every UDF descriptor opens with a 16-byte tag: identifier, a
//! mod-256 checksum over the tag bytes themselves, a CRC over the
//! descriptor body, and the block the descriptor claims to live at.

use crc::{Crc, CRC_16_XMODEM};

use crate::error::FormatError;

/// CRC algorithm used by descriptor tags
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Tag identifier values
pub mod ids {
    /// Primary Volume Descriptor
    pub const PRIMARY_VOLUME: u16 = 1;
    /// Anchor Volume Descriptor Pointer
    pub const ANCHOR: u16 = 2;
    /// Partition Descriptor
    pub const PARTITION: u16 = 5;
    /// Logical Volume Descriptor
    pub const LOGICAL_VOLUME: u16 = 6;
    /// Unallocated Space Descriptor
    pub const UNALLOCATED_SPACE: u16 = 7;
    /// Terminating Descriptor
    pub const TERMINATING: u16 = 8;
    /// File Set Descriptor
    pub const FILE_SET: u16 = 256;
    /// File Identifier Descriptor
    pub const FILE_IDENTIFIER: u16 = 257;
    /// Terminal Entry
    pub const TERMINAL_ENTRY: u16 = 260;
    /// File Entry
    pub const FILE_ENTRY: u16 = 261;
    /// Extended File Entry
    pub const EXTENDED_FILE_ENTRY: u16 = 266;
}

/// Parsed descriptor tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTag {
    /// Tag identifier
    pub tag_id: u16,

    /// Descriptor version (2 or 3)
    pub version: u16,

    /// Tag serial number
    pub serial: u16,

    /// CRC over the descriptor body
    pub crc: u16,

    /// Number of body bytes the CRC covers
    pub crc_length: u16,

    /// Block the descriptor claims to occupy
    pub location: u32,
}

/// Checksum over the tag bytes, skipping the checksum byte itself
fn checksum(tag: &[u8]) -> u8 {
    let mut sum = 0u8;
    for (i, b) in tag.iter().enumerate().take(16) {
        if i != 4 {
            sum = sum.wrapping_add(*b);
        }
    }
    sum
}

impl DescriptorTag {
    /// Parse and verify a tag from the start of a descriptor block
    ///
    /// `block` is only used for error reporting; location consistency
    /// is the caller's concern since partition-relative addressing
    /// makes the expected value context dependent.
    pub fn parse(data: &[u8], block: u64) -> Result<Self, FormatError> {
        if data.len() < 16 {
            return Err(FormatError::BadTag {
                block,
                reason: "truncated",
            });
        }
        let tag = Self {
            tag_id: u16::from_le_bytes([data[0], data[1]]),
            version: u16::from_le_bytes([data[2], data[3]]),
            serial: u16::from_le_bytes([data[6], data[7]]),
            crc: u16::from_le_bytes([data[8], data[9]]),
            crc_length: u16::from_le_bytes([data[10], data[11]]),
            location: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        };
        if tag.tag_id == 0 {
            return Err(FormatError::BadTag {
                block,
                reason: "blank tag",
            });
        }
        if checksum(data) != data[4] {
            return Err(FormatError::BadTag {
                block,
                reason: "checksum mismatch",
            });
        }
        let body_end = 16usize.saturating_add(tag.crc_length as usize);
        if tag.crc_length > 0 {
            if body_end > data.len() {
                return Err(FormatError::BadTag {
                    block,
                    reason: "crc length exceeds block",
                });
            }
            if CRC16.checksum(&data[16..body_end]) != tag.crc {
                return Err(FormatError::BadTag {
                    block,
                    reason: "crc mismatch",
                });
            }
        }
        Ok(tag)
    }

    /// Write a tag for `body` into the first 16 bytes of `block_data`
    ///
    /// Used by tests and tools that synthesize descriptors; the body is
    /// everything after the tag.
    pub fn write(block_data: &mut [u8], tag_id: u16, location: u32) {
        let body_len = (block_data.len() - 16) as u16;
        let crc = CRC16.checksum(&block_data[16..]);
        block_data[0..2].copy_from_slice(&tag_id.to_le_bytes());
        block_data[2..4].copy_from_slice(&2u16.to_le_bytes());
        block_data[4] = 0;
        block_data[5] = 0;
        block_data[6..8].copy_from_slice(&0u16.to_le_bytes());
        block_data[8..10].copy_from_slice(&crc.to_le_bytes());
        block_data[10..12].copy_from_slice(&body_len.to_le_bytes());
        block_data[12..16].copy_from_slice(&location.to_le_bytes());
        block_data[4] = checksum(block_data);
    }
}
