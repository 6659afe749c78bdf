//! Primary and Supplementary Volume Descriptor layout
//!
//! Both descriptor types share one fixed 2048-byte layout (ECMA-119 8.4
//! and 8.5); the Supplementary form differs only in its type code and in
//! carrying Joliet escape sequences where the Primary reserves bytes.

use crate::error::FormatError;
use crate::utils::datetime::{encode_vd_datetime, DateTime7};
use crate::utils::string::copy_padded;

/// Primary/Supplementary Volume Descriptor (fixed layout)
///
/// See ECMA-119 8.4 for the full field list; trailing metadata fields
/// (volume set, publisher, timestamps, ...) are accessed by offset when
/// encoding and left opaque when parsing.
#[derive(Debug)]
#[repr(C, packed)]
pub struct VolumeDescriptor {
    /// Type code (1 primary, 2 supplementary)
    pub type_code: u8,
    /// Standard identifier "CD001"
    pub identifier: [u8; 5],
    /// Version (1)
    pub version: u8,

    /// Unused in the Primary form; flags byte in the Supplementary
    pub flags: u8,

    /// System identifier (32 a-characters)
    pub system_id: [u8; 32],

    /// Volume identifier (32 d-characters; UCS-2 in a Joliet SVD)
    pub volume_id: [u8; 32],

    /// Unused (8 bytes)
    pub unused1: [u8; 8],

    /// Volume space size (both-endian 32-bit)
    pub volume_space_size: BothEndian32,

    /// Unused in the Primary form; Joliet escape sequences in the SVD
    pub escape_sequences: [u8; 32],

    /// Volume set size (both-endian 16-bit)
    pub volume_set_size: BothEndian16,

    /// Volume sequence number (both-endian 16-bit)
    pub volume_sequence_number: BothEndian16,

    /// Logical block size (both-endian 16-bit, usually 2048)
    pub logical_block_size: BothEndian16,

    /// Path table size in bytes (both-endian 32-bit)
    pub path_table_size: BothEndian32,

    /// Type L path table location (32-bit LE)
    pub type_l_path_table: [u8; 4],

    /// Optional type L path table location (32-bit LE)
    pub optional_type_l_path_table: [u8; 4],

    /// Type M path table location (32-bit BE)
    pub type_m_path_table: [u8; 4],

    /// Optional type M path table location (32-bit BE)
    pub optional_type_m_path_table: [u8; 4],

    /// Root directory record (34 bytes)
    pub root_directory_record: [u8; 34],
    // Remainder: volume set / publisher / preparer / application
    // identifiers, file identifiers, four 17-byte timestamps, file
    // structure version. Total size: 2048 bytes.
}

/// Both-endian 32-bit value (stored as LE then BE)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BothEndian32 {
    /// Little-endian value
    pub le: [u8; 4],
    /// Big-endian value
    pub be: [u8; 4],
}

impl BothEndian32 {
    /// Get value (uses the little-endian half)
    pub fn get(&self) -> u32 {
        u32::from_le_bytes(self.le)
    }

    /// Encode a value into both halves
    pub fn encode(value: u32, dst: &mut [u8]) {
        dst[0..4].copy_from_slice(&value.to_le_bytes());
        dst[4..8].copy_from_slice(&value.to_be_bytes());
    }
}

/// Both-endian 16-bit value (stored as LE then BE)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct BothEndian16 {
    /// Little-endian value
    pub le: [u8; 2],
    /// Big-endian value
    pub be: [u8; 2],
}

impl BothEndian16 {
    /// Get value (uses the little-endian half)
    pub fn get(&self) -> u16 {
        u16::from_le_bytes(self.le)
    }

    /// Encode a value into both halves
    pub fn encode(value: u16, dst: &mut [u8]) {
        dst[0..2].copy_from_slice(&value.to_le_bytes());
        dst[2..4].copy_from_slice(&value.to_be_bytes());
    }
}

impl VolumeDescriptor {
    /// Type L path table LBA
    pub fn type_l_path_table_lba(&self) -> u32 {
        u32::from_le_bytes(self.type_l_path_table)
    }

    /// Type M path table LBA
    pub fn type_m_path_table_lba(&self) -> u32 {
        u32::from_be_bytes(self.type_m_path_table)
    }

    /// Whether the escape sequence field announces Joliet (levels 1-3)
    pub fn joliet_level(&self) -> Option<u8> {
        match &self.escape_sequences[0..3] {
            b"%/@" => Some(1),
            b"%/C" => Some(2),
            b"%/E" => Some(3),
            _ => None,
        }
    }
}

/// Parse a volume descriptor from a 2048-byte sector
pub fn parse(data: &[u8], sector: u64) -> Result<&VolumeDescriptor, FormatError> {
    if data.len() < core::mem::size_of::<VolumeDescriptor>() {
        return Err(FormatError::BadSignature { sector });
    }

    // Cast is safe: length checked, struct is packed with no invalid
    // bit patterns.
    let vd = unsafe { &*(data.as_ptr() as *const VolumeDescriptor) };

    if &vd.identifier != b"CD001" {
        return Err(FormatError::BadSignature { sector });
    }
    if vd.version != 1 {
        return Err(FormatError::UnsupportedVersion(vd.version));
    }

    Ok(vd)
}

/// Inputs for encoding a Primary or Supplementary descriptor
pub struct VolumeDescriptorParams<'a> {
    /// 1 for Primary, 2 for Supplementary
    pub type_code: u8,
    /// Volume identifier (already in the target alphabet)
    pub volume_id: &'a str,
    /// System identifier
    pub system_id: &'a str,
    /// Total volume size in logical blocks
    pub volume_space_size: u32,
    /// Path table size in bytes
    pub path_table_size: u32,
    /// Type L path table LBA
    pub type_l_path_table: u32,
    /// Type M path table LBA
    pub type_m_path_table: u32,
    /// Encoded 34-byte root directory record
    pub root_record: [u8; 34],
    /// Joliet escape sequence bytes, when encoding an SVD
    pub joliet: bool,
    /// Recording timestamp for the four descriptor datetime fields
    pub recorded_at: DateTime7,
}

/// Encode a 2048-byte Primary or Supplementary Volume Descriptor
pub fn encode(params: &VolumeDescriptorParams<'_>) -> Vec<u8> {
    let mut d = vec![0u8; 2048];
    d[0] = params.type_code;
    d[1..6].copy_from_slice(b"CD001");
    d[6] = 1;

    if params.joliet {
        copy_padded(&mut d[8..40], "");
        encode_ucs2_padded(&mut d[40..72], params.volume_id);
        // UCS-2 level 3 escape sequence
        d[88..91].copy_from_slice(b"%/E");
    } else {
        copy_padded(&mut d[8..40], params.system_id);
        copy_padded(&mut d[40..72], params.volume_id);
        // The Primary form reserves the escape field as zero
    }

    BothEndian32::encode(params.volume_space_size, &mut d[80..88]);
    BothEndian16::encode(1, &mut d[120..124]); // volume set size
    BothEndian16::encode(1, &mut d[124..128]); // volume sequence number
    BothEndian16::encode(2048, &mut d[128..132]);
    BothEndian32::encode(params.path_table_size, &mut d[132..140]);
    d[140..144].copy_from_slice(&params.type_l_path_table.to_le_bytes());
    d[148..152].copy_from_slice(&params.type_m_path_table.to_be_bytes());
    d[156..190].copy_from_slice(&params.root_record);

    if params.joliet {
        encode_ucs2_padded(&mut d[190..318], ""); // volume set id
        encode_ucs2_padded(&mut d[318..446], ""); // publisher
        encode_ucs2_padded(&mut d[446..574], ""); // preparer
        encode_ucs2_padded(&mut d[574..702], "DISCFS");
    } else {
        copy_padded(&mut d[190..318], "");
        copy_padded(&mut d[318..446], "");
        copy_padded(&mut d[446..574], "");
        copy_padded(&mut d[574..702], "DISCFS");
        copy_padded(&mut d[702..739], "");
        copy_padded(&mut d[739..776], "");
        copy_padded(&mut d[776..813], "");
    }

    let dt = encode_vd_datetime(&params.recorded_at);
    d[813..830].copy_from_slice(&dt); // creation
    d[830..847].copy_from_slice(&dt); // modification
    d[847..864].copy_from_slice(&encode_vd_datetime(&DateTime7::default())); // expiration
    d[864..881].copy_from_slice(&encode_vd_datetime(&DateTime7::default())); // effective
    d[881] = 1; // file structure version

    d
}

/// Encode a string as UCS-2BE into a fixed field, space padded
fn encode_ucs2_padded(dst: &mut [u8], src: &str) {
    // UCS-2 space padding
    for pair in dst.chunks_exact_mut(2) {
        pair[0] = 0x00;
        pair[1] = b' ';
    }
    let mut i = 0;
    for unit in src.encode_utf16() {
        if i + 2 > dst.len() {
            break;
        }
        dst[i..i + 2].copy_from_slice(&unit.to_be_bytes());
        i += 2;
    }
}

/// Encode a 2048-byte Volume Descriptor Set Terminator
pub fn encode_terminator() -> Vec<u8> {
    let mut d = vec![0u8; 2048];
    d[0] = 255;
    d[1..6].copy_from_slice(b"CD001");
    d[6] = 1;
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> VolumeDescriptorParams<'static> {
        VolumeDescriptorParams {
            type_code: 1,
            volume_id: "TESTVOL",
            system_id: "TEST",
            volume_space_size: 64,
            path_table_size: 10,
            type_l_path_table: 20,
            type_m_path_table: 21,
            root_record: [0; 34],
            joliet: false,
            recorded_at: DateTime7::default(),
        }
    }

    #[test]
    fn encode_parse_round_trip() {
        let bytes = encode(&params());
        let vd = parse(&bytes, 16).expect("valid descriptor");
        assert_eq!(vd.type_code, 1);
        assert_eq!(vd.volume_space_size.get(), 64);
        assert_eq!(vd.logical_block_size.get(), 2048);
        assert_eq!(vd.path_table_size.get(), 10);
        assert_eq!(vd.type_l_path_table_lba(), 20);
        assert_eq!(vd.type_m_path_table_lba(), 21);
        assert!(vd.joliet_level().is_none());
    }

    #[test]
    fn joliet_escape_detected() {
        let mut p = params();
        p.type_code = 2;
        p.joliet = true;
        let bytes = encode(&p);
        let vd = parse(&bytes, 17).expect("valid descriptor");
        assert_eq!(vd.joliet_level(), Some(3));
    }

    #[test]
    fn bad_signature_rejected() {
        let mut bytes = encode(&params());
        bytes[1..6].copy_from_slice(b"XXXXX");
        assert_eq!(
            parse(&bytes, 16).unwrap_err(),
            FormatError::BadSignature { sector: 16 }
        );
    }
}
