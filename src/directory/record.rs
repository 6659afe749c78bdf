//! Directory record parsing and encoding
//!
//! Records are variable length (minimum 34 bytes): a fixed 33-byte
//! header, the file identifier, an alignment pad when the identifier
//! length is even, and an optional system-use area for SUSP entries.

use crate::error::EntryError;
use crate::types::{FileFlags, SECTOR_SIZE};
use crate::utils::datetime::DateTime7;

/// Fixed header size preceding the file identifier
pub const RECORD_HEADER_LEN: usize = 33;

/// A parsed directory record borrowing its backing bytes
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRecord<'a> {
    data: &'a [u8],
}

impl<'a> DirectoryRecord<'a> {
    /// Parse one record from the start of `data`
    ///
    /// Fails when the declared record length or identifier length does
    /// not fit the buffer. A zero-length byte is not a record; callers
    /// treat it as a skip to the next sector.
    pub fn parse(data: &'a [u8]) -> Result<Self, EntryError> {
        if data.is_empty() {
            return Err(EntryError::BadRecord);
        }
        let len = data[0] as usize;
        if len < RECORD_HEADER_LEN + 1 || len > data.len() {
            return Err(EntryError::BadRecord);
        }
        let id_len = data[32] as usize;
        if RECORD_HEADER_LEN + id_len > len {
            return Err(EntryError::BadRecord);
        }
        Ok(Self { data: &data[..len] })
    }

    /// Declared record length in bytes
    pub fn len(&self) -> usize {
        self.data[0] as usize
    }

    /// True only for the degenerate empty slice, which `parse` rejects
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extended attribute record length in blocks
    pub fn ext_attr_length(&self) -> u8 {
        self.data[1]
    }

    /// First logical block of the extent
    pub fn extent_lba(&self) -> u32 {
        u32::from_le_bytes(self.data[2..6].try_into().unwrap_or_default())
    }

    /// Extent length in bytes
    pub fn data_length(&self) -> u32 {
        u32::from_le_bytes(self.data[10..14].try_into().unwrap_or_default())
    }

    /// Recording timestamp
    pub fn recorded_at(&self) -> DateTime7 {
        DateTime7::from_bytes(self.data[18..25].try_into().unwrap_or(&[0; 7]))
    }

    /// Decoded file flags
    pub fn flags(&self) -> FileFlags {
        FileFlags::from_byte(self.data[25])
    }

    /// Multi-extent chain continues past this record
    pub fn has_more_extents(&self) -> bool {
        self.flags().not_final
    }

    /// File unit size, nonzero only for interleaved files
    pub fn file_unit_size(&self) -> u8 {
        self.data[26]
    }

    /// Interleave gap size in sectors
    pub fn interleave_gap(&self) -> u8 {
        self.data[27]
    }

    /// File identifier length
    pub fn identifier_len(&self) -> usize {
        self.data[32] as usize
    }

    /// Raw file identifier bytes
    pub fn raw_identifier(&self) -> &'a [u8] {
        &self.data[RECORD_HEADER_LEN..RECORD_HEADER_LEN + self.identifier_len()]
    }

    /// Record identifies the directory itself (single 0x00 byte)
    pub fn is_self(&self) -> bool {
        self.raw_identifier() == [0x00]
    }

    /// Record identifies the parent directory (single 0x01 byte)
    pub fn is_parent(&self) -> bool {
        self.raw_identifier() == [0x01]
    }

    /// System-use area following the identifier and its pad byte
    pub fn system_use(&self) -> &'a [u8] {
        let mut start = RECORD_HEADER_LEN + self.identifier_len();
        if self.identifier_len() % 2 == 0 {
            start += 1;
        }
        if start >= self.data.len() {
            &[]
        } else {
            &self.data[start..]
        }
    }
}

/// Iterator over the records of one directory extent
///
/// A zero length byte means the remaining bytes of the current sector
/// hold no record; iteration resumes at the next sector boundary.
pub struct RecordIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordIter<'a> {
    /// Iterate records in a fully read directory extent
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<DirectoryRecord<'a>, EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.data.len() {
                return None;
            }
            if self.data[self.pos] == 0 {
                // Skip to the next sector boundary
                self.pos = (self.pos / SECTOR_SIZE + 1) * SECTOR_SIZE;
                continue;
            }
            return match DirectoryRecord::parse(&self.data[self.pos..]) {
                Ok(record) => {
                    self.pos += record.len();
                    Some(Ok(record))
                }
                Err(e) => {
                    // A malformed record poisons the rest of the extent
                    self.pos = self.data.len();
                    Some(Err(e))
                }
            };
        }
    }
}

/// Inputs for encoding one directory record
pub struct RecordParams<'a> {
    /// File identifier bytes (already in the target alphabet)
    pub identifier: &'a [u8],
    /// First logical block of the extent
    pub extent_lba: u32,
    /// Extent length in bytes
    pub data_length: u32,
    /// Record flags
    pub flags: FileFlags,
    /// Recording timestamp
    pub recorded_at: DateTime7,
    /// System-use bytes (SUSP entries), empty when none
    pub system_use: &'a [u8],
}

/// Encoded length of a record with the given identifier and system-use
/// sizes, pad byte included
pub fn encoded_len(identifier_len: usize, system_use_len: usize) -> usize {
    let mut len = RECORD_HEADER_LEN + identifier_len;
    if identifier_len % 2 == 0 {
        len += 1;
    }
    len + system_use_len
}

/// Encode one directory record
pub fn encode(params: &RecordParams<'_>) -> Vec<u8> {
    let len = encoded_len(params.identifier.len(), params.system_use.len());
    debug_assert!(len <= u8::MAX as usize);
    let mut d = vec![0u8; len];
    d[0] = len as u8;
    d[2..6].copy_from_slice(&params.extent_lba.to_le_bytes());
    d[6..10].copy_from_slice(&params.extent_lba.to_be_bytes());
    d[10..14].copy_from_slice(&params.data_length.to_le_bytes());
    d[14..18].copy_from_slice(&params.data_length.to_be_bytes());
    d[18..25].copy_from_slice(&params.recorded_at.to_bytes());
    d[25] = params.flags.to_byte();
    // Volume sequence number 1
    d[28..30].copy_from_slice(&1u16.to_le_bytes());
    d[30..32].copy_from_slice(&1u16.to_be_bytes());
    d[32] = params.identifier.len() as u8;
    d[RECORD_HEADER_LEN..RECORD_HEADER_LEN + params.identifier.len()]
        .copy_from_slice(params.identifier);
    let su_start = len - params.system_use.len();
    d[su_start..].copy_from_slice(params.system_use);
    d
}
