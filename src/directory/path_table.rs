//! Path tables
//!
//! The path table lists every directory of the hierarchy, sorted by
//! depth and then by identifier, with 1-based parent numbers pointing
//! at earlier entries. Both a little-endian (type L) and a big-endian
//! (type M) copy are recorded; parsing validates structure fatally
//! since a broken table implies a broken hierarchy.

use crate::error::FormatError;

/// One path table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTableEntry {
    /// Directory identifier bytes; a single 0x00 for the root
    pub identifier: Vec<u8>,

    /// First logical block of the directory extent
    pub extent_lba: u32,

    /// 1-based number of the parent directory's own entry
    pub parent: u16,
}

impl PathTableEntry {
    fn encoded_len(&self) -> usize {
        let mut len = 8 + self.identifier.len();
        if self.identifier.len() % 2 == 1 {
            len += 1;
        }
        len
    }
}

/// Parse a path table copy
///
/// `big_endian` selects the type M byte order. Structure is validated:
/// every parent number must reference an earlier entry, and the first
/// entry must be the root (identifier 0x00, parent 1).
pub fn parse(data: &[u8], big_endian: bool) -> Result<Vec<PathTableEntry>, FormatError> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + 8 > data.len() {
            return Err(FormatError::BadPathTable("truncated entry header"));
        }
        let id_len = data[pos] as usize;
        if id_len == 0 {
            return Err(FormatError::BadPathTable("zero-length identifier"));
        }
        let lba_bytes: [u8; 4] = data[pos + 2..pos + 6].try_into().unwrap_or_default();
        let parent_bytes: [u8; 2] = data[pos + 6..pos + 8].try_into().unwrap_or_default();
        let (extent_lba, parent) = if big_endian {
            (u32::from_be_bytes(lba_bytes), u16::from_be_bytes(parent_bytes))
        } else {
            (u32::from_le_bytes(lba_bytes), u16::from_le_bytes(parent_bytes))
        };

        let id_end = pos + 8 + id_len;
        if id_end > data.len() {
            return Err(FormatError::BadPathTable("truncated identifier"));
        }
        let identifier = data[pos + 8..id_end].to_vec();

        if parent as usize > entries.len() + 1 || parent == 0 {
            return Err(FormatError::BadPathTable("parent references later entry"));
        }
        if entries.is_empty() && (identifier != [0x00] || parent != 1) {
            return Err(FormatError::BadPathTable("first entry is not the root"));
        }

        entries.push(PathTableEntry {
            identifier,
            extent_lba,
            parent,
        });
        pos = id_end + (id_len % 2); // pad byte after odd identifiers
    }
    if entries.is_empty() {
        return Err(FormatError::BadPathTable("empty table"));
    }
    Ok(entries)
}

/// Total encoded size of a table, identical for both byte orders
pub fn encoded_len(entries: &[PathTableEntry]) -> usize {
    entries.iter().map(PathTableEntry::encoded_len).sum()
}

/// Encode one path table copy; `big_endian` selects the type M order
///
/// Entries must already be in (depth, identifier) order with parent
/// numbers assigned; the layout planner owns that ordering.
pub fn encode(entries: &[PathTableEntry], big_endian: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(entries));
    for entry in entries {
        out.push(entry.identifier.len() as u8);
        out.push(0); // extended attribute record length
        if big_endian {
            out.extend_from_slice(&entry.extent_lba.to_be_bytes());
            out.extend_from_slice(&entry.parent.to_be_bytes());
        } else {
            out.extend_from_slice(&entry.extent_lba.to_le_bytes());
            out.extend_from_slice(&entry.parent.to_le_bytes());
        }
        out.extend_from_slice(&entry.identifier);
        if entry.identifier.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}
