//! Information Control Blocks: File Entries and File Identifiers
//!
//! A UDF file or directory is described by a File Entry (or Extended
//! File Entry) whose ICB tag selects how content is allocated: short,
//! long or extended allocation descriptors, or data embedded directly
//! in the entry block.

use crate::error::EntryError;
use crate::udf::descriptor::{decode_cs0_chars, LongAd};
use crate::udf::tag::{ids, DescriptorTag};

/// ICB file types the reader distinguishes
pub mod file_types {
    /// Directory
    pub const DIRECTORY: u8 = 4;
    /// Regular file
    pub const FILE: u8 = 5;
    /// Symbolic link
    pub const SYMLINK: u8 = 12;
}

/// Allocation descriptor forms, from the low bits of the ICB flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdForm {
    /// 8-byte short descriptors, addresses relative to the ICB's partition
    Short,
    /// 16-byte long descriptors carrying their own partition reference
    Long,
    /// 20-byte extended descriptors
    Extended,
    /// Content embedded in the entry block itself
    Inline,
}

impl AdForm {
    fn from_flags(flags: u16) -> Option<Self> {
        match flags & 0x07 {
            0 => Some(Self::Short),
            1 => Some(Self::Long),
            2 => Some(Self::Extended),
            3 => Some(Self::Inline),
            _ => None,
        }
    }
}

/// One decoded allocation descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Partition-relative block
    pub block: u32,

    /// Partition reference; `None` inherits the ICB's own partition
    pub partition: Option<u16>,

    /// Extent length in bytes, type bits masked off
    pub length: u32,

    /// Extent type from the top two bits (0 recorded, 1 and 2
    /// unrecorded, 3 continuation of the descriptor chain)
    pub extent_type: u8,
}

impl Allocation {
    /// Chain pointer to a further block of allocation descriptors
    pub fn is_chain(&self) -> bool {
        self.extent_type == 3
    }

    /// Extent holds recorded data
    pub fn is_recorded(&self) -> bool {
        self.extent_type == 0
    }
}

/// Parsed File Entry or Extended File Entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// ICB file type
    pub file_type: u8,

    /// Allocation descriptor form
    pub ad_form: AdForm,

    /// Information length in bytes
    pub info_length: u64,

    /// Decoded allocation descriptors, chain pointers included
    pub allocations: Vec<Allocation>,

    /// Byte range of embedded content within the entry block, for the
    /// inline form
    pub inline: Option<(usize, usize)>,
}

impl FileEntry {
    /// Parse a File Entry (tag 261) or Extended File Entry (tag 266)
    pub fn parse(data: &[u8], tag: &DescriptorTag) -> Result<Self, EntryError> {
        let (lengths_at, data_base) = match tag.tag_id {
            ids::FILE_ENTRY => (168, 176),
            ids::EXTENDED_FILE_ENTRY => (208, 216),
            _ => return Err(EntryError::BadRecord),
        };
        if data.len() < data_base {
            return Err(EntryError::BadRecord);
        }
        let file_type = data[16 + 11];
        let flags = u16::from_le_bytes(data[16 + 18..16 + 20].try_into().unwrap_or_default());
        let ad_form = AdForm::from_flags(flags).ok_or(EntryError::BadAllocation)?;
        let info_length =
            u64::from_le_bytes(data[56..64].try_into().unwrap_or_default());
        let l_ea = u32::from_le_bytes(
            data[lengths_at..lengths_at + 4].try_into().unwrap_or_default(),
        ) as usize;
        let l_ad = u32::from_le_bytes(
            data[lengths_at + 4..lengths_at + 8].try_into().unwrap_or_default(),
        ) as usize;
        let ad_start = data_base + l_ea;
        let ad_end = ad_start.checked_add(l_ad).ok_or(EntryError::BadAllocation)?;
        if ad_end > data.len() {
            return Err(EntryError::BadAllocation);
        }

        let mut entry = Self {
            file_type,
            ad_form,
            info_length,
            allocations: Vec::new(),
            inline: None,
        };
        match ad_form {
            AdForm::Inline => {
                if info_length as usize != l_ad {
                    return Err(EntryError::BadAllocation);
                }
                entry.inline = Some((ad_start, l_ad));
            }
            _ => {
                entry.allocations = parse_allocations(&data[ad_start..ad_end], ad_form)?;
            }
        }
        Ok(entry)
    }
}

/// Decode a run of allocation descriptors of one form
pub fn parse_allocations(data: &[u8], form: AdForm) -> Result<Vec<Allocation>, EntryError> {
    let stride = match form {
        AdForm::Short => 8,
        AdForm::Long => 16,
        AdForm::Extended => 20,
        AdForm::Inline => return Err(EntryError::BadAllocation),
    };
    if data.len() % stride != 0 {
        return Err(EntryError::BadAllocation);
    }
    let mut out = Vec::with_capacity(data.len() / stride);
    for ad in data.chunks_exact(stride) {
        let raw_length = u32::from_le_bytes(ad[0..4].try_into().unwrap_or_default());
        let length = raw_length & 0x3FFF_FFFF;
        if length == 0 {
            // A zero-length descriptor terminates the run
            break;
        }
        let (block, partition) = match form {
            AdForm::Short => (
                u32::from_le_bytes(ad[4..8].try_into().unwrap_or_default()),
                None,
            ),
            AdForm::Long => (
                u32::from_le_bytes(ad[4..8].try_into().unwrap_or_default()),
                Some(u16::from_le_bytes(ad[8..10].try_into().unwrap_or_default())),
            ),
            AdForm::Extended => (
                u32::from_le_bytes(ad[12..16].try_into().unwrap_or_default()),
                Some(u16::from_le_bytes(ad[16..18].try_into().unwrap_or_default())),
            ),
            AdForm::Inline => unreachable!(),
        };
        out.push(Allocation {
            block,
            partition,
            length,
            extent_type: (raw_length >> 30) as u8,
        });
    }
    Ok(out)
}

/// One File Identifier Descriptor from a directory's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentifier {
    /// Characteristics bits (0x02 directory, 0x04 deleted, 0x08 parent)
    pub characteristics: u8,

    /// ICB of the named file or directory
    pub icb: LongAd,

    /// Decoded file identifier
    pub name: String,

    /// Total encoded length, 4-byte padded
    pub encoded_len: usize,
}

impl FileIdentifier {
    /// Directory bit
    pub fn is_directory(&self) -> bool {
        self.characteristics & 0x02 != 0
    }

    /// Deleted bit
    pub fn is_deleted(&self) -> bool {
        self.characteristics & 0x04 != 0
    }

    /// Parent-directory bit
    pub fn is_parent(&self) -> bool {
        self.characteristics & 0x08 != 0
    }

    /// Parse one FID from the start of `data`
    pub fn parse(data: &[u8], block: u64) -> Result<Self, EntryError> {
        let tag = DescriptorTag::parse(data, block).map_err(|_| EntryError::BadRecord)?;
        if tag.tag_id != ids::FILE_IDENTIFIER {
            return Err(EntryError::BadRecord);
        }
        if data.len() < 38 {
            return Err(EntryError::BadRecord);
        }
        let characteristics = data[18];
        let l_fi = data[19] as usize;
        let icb = LongAd::parse(&data[20..36]);
        let l_iu = u16::from_le_bytes(data[36..38].try_into().unwrap_or_default()) as usize;
        let name_start = 38 + l_iu;
        let name_end = name_start + l_fi;
        let encoded_len = (name_end + 3) & !3;
        if encoded_len > data.len() {
            return Err(EntryError::BadRecord);
        }
        let name = if l_fi == 0 {
            String::new()
        } else {
            decode_cs0_chars(&data[name_start..name_end])
        };
        Ok(Self {
            characteristics,
            icb,
            name,
            encoded_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udf::descriptor::encode_cs0_chars;

    fn encode_fid(name: &str, characteristics: u8, icb_block: u32) -> Vec<u8> {
        let id = encode_cs0_chars(name);
        let mut d = vec![0u8; 38 + id.len()];
        d[16..18].copy_from_slice(&1u16.to_le_bytes()); // file version
        d[18] = characteristics;
        d[19] = id.len() as u8;
        d[20..24].copy_from_slice(&0u32.to_le_bytes()); // icb length (unused here)
        d[24..28].copy_from_slice(&icb_block.to_le_bytes());
        d[38..].copy_from_slice(&id);
        while d.len() % 4 != 0 {
            d.push(0);
        }
        DescriptorTag::write(&mut d, ids::FILE_IDENTIFIER, 0);
        d
    }

    #[test]
    fn fid_round_trip() {
        let bytes = encode_fid("notes.txt", 0, 77);
        let fid = FileIdentifier::parse(&bytes, 0).unwrap();
        assert_eq!(fid.name, "notes.txt");
        assert_eq!(fid.icb.block, 77);
        assert!(!fid.is_directory());
        assert!(!fid.is_deleted());
        assert_eq!(fid.encoded_len, bytes.len());
    }

    #[test]
    fn short_allocations_decode() {
        let mut ads = Vec::new();
        ads.extend_from_slice(&4096u32.to_le_bytes());
        ads.extend_from_slice(&100u32.to_le_bytes());
        // Second descriptor marked as a chain pointer
        ads.extend_from_slice(&(2048u32 | (3 << 30)).to_le_bytes());
        ads.extend_from_slice(&200u32.to_le_bytes());
        let allocs = parse_allocations(&ads, AdForm::Short).unwrap();
        assert_eq!(allocs.len(), 2);
        assert!(allocs[0].is_recorded());
        assert_eq!(allocs[0].length, 4096);
        assert!(allocs[1].is_chain());
        assert_eq!(allocs[1].block, 200);
    }

    #[test]
    fn misaligned_allocations_rejected() {
        assert!(parse_allocations(&[0u8; 10], AdForm::Short).is_err());
    }
}
