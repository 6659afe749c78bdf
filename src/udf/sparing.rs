//! Sparing tables for sparable (rewritable) partitions
//!
//! A sparable partition remaps defective packets: the table pairs an
//! original partition-relative packet address with the absolute
//! location of its replacement. Unused entries carry 0xFFFFFFF0 or
//! higher in the original field.

use tracing::debug;

use crate::error::FormatError;

/// Entity identifier text carried by every sparing table
const SPARING_IDENTIFIER: &[u8] = b"*UDF Sparing Table";

/// Parsed sparing table: original packet to mapped absolute location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparingTable {
    entries: Vec<(u32, u32)>,
}

impl SparingTable {
    /// Parse a sparing table read from one of its recorded locations
    pub fn parse(data: &[u8], block: u64) -> Result<Self, FormatError> {
        if data.len() < 56 {
            return Err(FormatError::BadTag {
                block,
                reason: "sparing table truncated",
            });
        }
        // Entity identifier text at bytes 17..40 (flags byte precedes)
        if !data[17..40].starts_with(SPARING_IDENTIFIER) {
            return Err(FormatError::BadTag {
                block,
                reason: "not a sparing table",
            });
        }
        let count = u16::from_le_bytes(data[48..50].try_into().unwrap_or_default()) as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let off = 56 + i * 8;
            if off + 8 > data.len() {
                return Err(FormatError::BadTag {
                    block,
                    reason: "sparing table truncated",
                });
            }
            let original = u32::from_le_bytes(data[off..off + 4].try_into().unwrap_or_default());
            let mapped = u32::from_le_bytes(data[off + 4..off + 8].try_into().unwrap_or_default());
            if original < 0xFFFF_FFF0 {
                entries.push((original, mapped));
            }
        }
        debug!(remapped = entries.len(), "sparing table loaded");
        Ok(Self { entries })
    }

    /// Absolute location of a packet's replacement, when remapped
    pub fn remap(&self, original_packet: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|(orig, _)| *orig == original_packet)
            .map(|(_, mapped)| *mapped)
    }

    /// Number of live remappings
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is remapped
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn encode(entries: &[(u32, u32)]) -> Vec<u8> {
        let mut d = vec![0u8; 56 + entries.len() * 8];
        d[17..17 + SPARING_IDENTIFIER.len()].copy_from_slice(SPARING_IDENTIFIER);
        d[48..50].copy_from_slice(&(entries.len() as u16).to_le_bytes());
        for (i, (orig, mapped)) in entries.iter().enumerate() {
            let off = 56 + i * 8;
            d[off..off + 4].copy_from_slice(&orig.to_le_bytes());
            d[off + 4..off + 8].copy_from_slice(&mapped.to_le_bytes());
        }
        d
    }

    #[test]
    fn remap_hits_and_misses() {
        let table = SparingTable::parse(&encode(&[(64, 9000), (128, 9032)]), 0).unwrap();
        assert_eq!(table.remap(64), Some(9000));
        assert_eq!(table.remap(128), Some(9032));
        assert_eq!(table.remap(96), None);
    }

    #[test]
    fn available_entries_skipped() {
        let table = SparingTable::parse(&encode(&[(0xFFFF_FFFF, 9000)]), 0).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn wrong_identifier_rejected() {
        let mut bytes = encode(&[]);
        bytes[17] = b'X';
        assert!(SparingTable::parse(&bytes, 0).is_err());
    }
}
