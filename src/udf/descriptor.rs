//! UDF volume-level descriptors
//!
//! Covers the anchor pointer, the volume descriptor sequence members
//! the reader needs (Partition and Logical Volume descriptors), the
//! File Set Descriptor, and the OSTA CS0 compressed string format used
//! by identifiers throughout.

use tracing::{debug, trace};

use crate::error::FormatError;
use crate::source::{read_sector, ExtentSource};
use crate::types::{SECTOR_SIZE, UDF_ANCHOR_SECTOR};
use crate::udf::tag::{ids, DescriptorTag};

/// Short extent: length and absolute location (ECMA-167 3/7.1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtentAd {
    /// Length in bytes
    pub length: u32,
    /// Absolute logical sector
    pub location: u32,
}

impl ExtentAd {
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            length: u32::from_le_bytes(data[0..4].try_into().unwrap_or_default()),
            location: u32::from_le_bytes(data[4..8].try_into().unwrap_or_default()),
        }
    }
}

/// Long allocation descriptor: length plus a partition-relative address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LongAd {
    /// Length in bytes; the top two bits carry the extent type
    pub length: u32,
    /// Partition-relative block
    pub block: u32,
    /// Partition reference number (index into the LVD partition maps)
    pub partition: u16,
}

impl LongAd {
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            length: u32::from_le_bytes(data[0..4].try_into().unwrap_or_default()),
            block: u32::from_le_bytes(data[4..8].try_into().unwrap_or_default()),
            partition: u16::from_le_bytes(data[8..10].try_into().unwrap_or_default()),
        }
    }

    /// Extent length with the type bits masked off
    pub fn byte_length(&self) -> u32 {
        self.length & 0x3FFF_FFFF
    }
}

/// Anchor Volume Descriptor Pointer contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdfAnchor {
    /// Main volume descriptor sequence extent
    pub main_vds: ExtentAd,
    /// Reserve volume descriptor sequence extent
    pub reserve_vds: ExtentAd,
}

/// Probe the fixed anchor locations for a valid AVDP
///
/// Sector 256 is tried first, then the mirrors near the end of the
/// medium. Read failures and invalid tags mean "not UDF", never an
/// error: ISO9660-only media are smaller than the anchor sector all
/// the time.
pub fn probe_anchor<S: ExtentSource>(source: &S) -> crate::error::Result<Option<UdfAnchor>> {
    let total_sectors = source.len() / SECTOR_SIZE as u64;
    let mut candidates = vec![UDF_ANCHOR_SECTOR];
    if total_sectors > 0 {
        candidates.push(total_sectors - 1);
    }
    if total_sectors > UDF_ANCHOR_SECTOR {
        candidates.push(total_sectors - UDF_ANCHOR_SECTOR);
    }

    let mut buffer = [0u8; SECTOR_SIZE];
    for sector in candidates {
        if (sector + 1) * SECTOR_SIZE as u64 > source.len() {
            continue;
        }
        if read_sector(source, sector, &mut buffer).is_err() {
            continue;
        }
        let Ok(tag) = DescriptorTag::parse(&buffer, sector) else {
            continue;
        };
        if tag.tag_id != ids::ANCHOR {
            trace!(sector, tag_id = tag.tag_id, "anchor candidate has wrong tag");
            continue;
        }
        let anchor = UdfAnchor {
            main_vds: ExtentAd::parse(&buffer[16..24]),
            reserve_vds: ExtentAd::parse(&buffer[24..32]),
        };
        debug!(sector, ?anchor, "udf anchor found");
        return Ok(Some(anchor));
    }
    Ok(None)
}

/// Partition Descriptor fields the reader uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// Partition number referenced by partition maps
    pub number: u16,
    /// First absolute sector of the partition
    pub start: u32,
    /// Partition length in sectors
    pub length: u32,
}

impl PartitionDescriptor {
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            number: u16::from_le_bytes(data[22..24].try_into().unwrap_or_default()),
            start: u32::from_le_bytes(data[188..192].try_into().unwrap_or_default()),
            length: u32::from_le_bytes(data[192..196].try_into().unwrap_or_default()),
        }
    }
}

/// One partition map from the Logical Volume Descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionMap {
    /// Type 1: direct mapping onto a partition number
    Plain {
        /// Referenced partition number
        number: u16,
    },
    /// Type 2 sparable map: packet remapping via sparing tables
    Sparable {
        /// Referenced partition number
        number: u16,
        /// Packet length in sectors
        packet_length: u16,
        /// Sparing table size in bytes
        table_size: u32,
        /// Absolute sectors holding sparing table copies
        table_locations: Vec<u32>,
    },
    /// Unrecognized type 2 map; entries resolving through it are
    /// marked unreadable rather than failing the open
    Unsupported,
}

/// Logical Volume Descriptor fields the reader uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalVolumeDescriptor {
    /// Logical volume identifier
    pub volume_id: String,
    /// Logical block size in bytes
    pub block_size: u32,
    /// Location of the File Set Descriptor
    pub fsd: LongAd,
    /// Partition maps, indexed by partition reference number
    pub maps: Vec<PartitionMap>,
}

impl LogicalVolumeDescriptor {
    pub(crate) fn parse(data: &[u8], block: u64) -> Result<Self, FormatError> {
        let block_size = u32::from_le_bytes(data[212..216].try_into().unwrap_or_default());
        let fsd = LongAd::parse(&data[248..264]);
        let map_count = u32::from_le_bytes(data[268..272].try_into().unwrap_or_default());
        let mut maps = Vec::new();
        let mut pos = 440;
        for _ in 0..map_count {
            if pos + 2 > data.len() {
                return Err(FormatError::BadTag {
                    block,
                    reason: "truncated partition maps",
                });
            }
            let map_type = data[pos];
            let map_len = data[pos + 1] as usize;
            if map_len < 2 || pos + map_len > data.len() {
                return Err(FormatError::BadTag {
                    block,
                    reason: "malformed partition map",
                });
            }
            let map = &data[pos..pos + map_len];
            maps.push(match map_type {
                1 if map_len >= 6 => PartitionMap::Plain {
                    number: u16::from_le_bytes(map[4..6].try_into().unwrap_or_default()),
                },
                2 if map_len >= 64 => parse_type2_map(map),
                _ => PartitionMap::Unsupported,
            });
            pos += map_len;
        }
        Ok(Self {
            volume_id: decode_cs0(&data[84..212]),
            block_size,
            fsd,
            maps,
        })
    }
}

fn parse_type2_map(map: &[u8]) -> PartitionMap {
    // Entity identifier text occupies bytes 5..28 of the map's type
    // identifier field at offset 4
    let ident = &map[5..28];
    if ident.starts_with(b"*UDF Sparable Partition") {
        let number = u16::from_le_bytes(map[38..40].try_into().unwrap_or_default());
        let packet_length = u16::from_le_bytes(map[40..42].try_into().unwrap_or_default());
        let table_count = map[42] as usize;
        let table_size = u32::from_le_bytes(map[44..48].try_into().unwrap_or_default());
        let mut table_locations = Vec::new();
        for i in 0..table_count.min(4) {
            let off = 48 + i * 4;
            if off + 4 <= map.len() {
                table_locations.push(u32::from_le_bytes(
                    map[off..off + 4].try_into().unwrap_or_default(),
                ));
            }
        }
        PartitionMap::Sparable {
            number,
            packet_length,
            table_size,
            table_locations,
        }
    } else {
        trace!("unrecognized type 2 partition map");
        PartitionMap::Unsupported
    }
}

/// File Set Descriptor: locates the root directory ICB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSetDescriptor {
    /// Root directory ICB
    pub root_icb: LongAd,
}

impl FileSetDescriptor {
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            root_icb: LongAd::parse(&data[400..416]),
        }
    }
}

/// Decode an OSTA CS0 d-string or compressed identifier
///
/// The first byte selects the compression: 8 for latin-1, 16 for
/// UCS-2BE. Fixed-width d-string fields store the text length in the
/// final byte; callers pass the full field and this trims to it.
pub fn decode_cs0(field: &[u8]) -> String {
    if field.len() < 2 {
        return String::new();
    }
    // Fixed d-string fields carry the used length in the last byte
    let used = field[field.len() - 1] as usize;
    let bytes = if used > 0 && used < field.len() {
        &field[..used]
    } else {
        field
    };
    decode_cs0_chars(bytes)
}

/// Decode a CS0 identifier whose length is exact (no trailing length byte)
pub fn decode_cs0_chars(bytes: &[u8]) -> String {
    match bytes.first() {
        Some(8) => bytes[1..]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect(),
        Some(16) => crate::extensions::joliet::decode_ucs2_be(&bytes[1..]),
        _ => String::new(),
    }
}

/// Encode a CS0 identifier with 8-bit compression (tests and tools)
pub fn encode_cs0_chars(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + name.len());
    out.push(8);
    for c in name.chars() {
        out.push(if (c as u32) < 256 { c as u8 } else { b'_' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn cs0_latin1_round_trip() {
        let encoded = encode_cs0_chars("Backup Volume");
        assert_eq!(decode_cs0_chars(&encoded), "Backup Volume");
    }

    #[test]
    fn cs0_ucs2_decodes() {
        let mut bytes = vec![16u8];
        bytes.extend_from_slice(&crate::extensions::joliet::encode_ucs2_be("Dísc"));
        assert_eq!(decode_cs0_chars(&bytes), "Dísc");
    }

    #[test]
    fn anchor_probe_finds_sector_256() {
        let mut image = vec![0u8; 300 * SECTOR_SIZE];
        let start = 256 * SECTOR_SIZE;
        let block = &mut image[start..start + SECTOR_SIZE];
        block[16..24].copy_from_slice(&[0, 8, 0, 0, 32, 0, 0, 0]); // 2048 bytes at 32
        DescriptorTag::write(block, ids::ANCHOR, 256);
        let source = MemorySource::new(image);

        let anchor = probe_anchor(&source).unwrap().expect("anchor");
        assert_eq!(anchor.main_vds.location, 32);
        assert_eq!(anchor.main_vds.length, 2048);
    }

    #[test]
    fn short_image_has_no_anchor() {
        let source = MemorySource::new(vec![0u8; 64 * SECTOR_SIZE]);
        assert!(probe_anchor(&source).unwrap().is_none());
    }
}
