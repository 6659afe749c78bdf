//! Rock Ridge / SUSP system-use entries
//!
//! SUSP packs tagged entries into the system-use area of directory
//! records: SP announces the protocol, NM carries a long name, PX the
//! POSIX attributes, TF timestamps, SL a symlink target, and CE points
//! at a continuation area when a record runs out of room. Unknown
//! signatures are skipped.

use tracing::{trace, warn};

use crate::source::ExtentSource;
use crate::types::SECTOR_SIZE;
use crate::utils::datetime::DateTime7;

/// SP entry check bytes
pub const SP_CHECK: [u8; 2] = [0xBE, 0xEF];

/// Maximum CE hops followed before giving up on a record
const MAX_CONTINUATIONS: usize = 8;

/// One raw SUSP entry
#[derive(Debug, Clone, Copy)]
pub struct SuspEntry<'a> {
    /// Two-byte signature
    pub signature: [u8; 2],
    /// Entry version
    pub version: u8,
    /// Payload after the 4-byte entry header
    pub data: &'a [u8],
}

/// Iterator over the SUSP entries of one system-use area
pub struct SuspIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SuspIter<'a> {
    /// Iterate a system-use area or continuation slice
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for SuspIter<'a> {
    type Item = SuspEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        if rest.len() < 4 {
            return None;
        }
        let len = rest[2] as usize;
        if len < 4 || len > rest.len() {
            return None;
        }
        self.pos += len;
        Some(SuspEntry {
            signature: [rest[0], rest[1]],
            version: rest[3],
            data: &rest[4..len],
        })
    }
}

/// Whether a system-use area opens with a valid SP entry
pub fn has_sp_entry(system_use: &[u8]) -> bool {
    SuspIter::new(system_use)
        .next()
        .is_some_and(|e| e.signature == *b"SP" && e.data.len() >= 2 && e.data[0..2] == SP_CHECK)
}

/// Decoded Rock Ridge attributes for one directory record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RockRidge {
    /// Alternate name assembled from NM entries
    pub name: Option<String>,

    /// Symlink target assembled from SL component records
    pub symlink_target: Option<String>,

    /// POSIX file mode from PX
    pub mode: Option<u32>,

    /// Modification time from TF
    pub modified: Option<DateTime7>,
}

/// Decode the Rock Ridge entries of a record, following CE chains
///
/// Malformed or unknown entries are skipped. A continuation pointer
/// that cannot be read only ends the chain; the fields already parsed
/// from the record stay usable.
pub fn decode<S: ExtentSource + ?Sized>(source: &S, system_use: &[u8]) -> RockRidge {
    let mut rr = RockRidge::default();
    let mut name = String::new();
    let mut name_continues = true;
    let mut area: Vec<u8> = system_use.to_vec();
    let mut hops = 0;

    loop {
        let mut continuation: Option<(u64, u64, u64)> = None;
        for entry in SuspIter::new(&area) {
            match &entry.signature {
                b"NM" => {
                    if !entry.data.is_empty() && name_continues {
                        let flags = entry.data[0];
                        // CURRENT and PARENT forms carry no text
                        if flags & 0x06 == 0 {
                            name.push_str(&String::from_utf8_lossy(&entry.data[1..]));
                        }
                        name_continues = flags & 0x01 != 0;
                    }
                }
                b"PX" => {
                    if entry.data.len() >= 8 {
                        rr.mode = Some(u32::from_le_bytes(
                            entry.data[0..4].try_into().unwrap_or_default(),
                        ));
                    }
                }
                b"TF" => {
                    decode_tf(entry.data, &mut rr);
                }
                b"SL" => {
                    decode_sl(entry.data, &mut rr);
                }
                b"CE" => {
                    if entry.data.len() >= 24 {
                        let block = u32::from_le_bytes(
                            entry.data[0..4].try_into().unwrap_or_default(),
                        ) as u64;
                        let offset = u32::from_le_bytes(
                            entry.data[8..12].try_into().unwrap_or_default(),
                        ) as u64;
                        let length = u32::from_le_bytes(
                            entry.data[16..20].try_into().unwrap_or_default(),
                        ) as u64;
                        continuation = Some((block, offset, length));
                    }
                }
                b"SP" | b"ST" | b"ER" | b"RR" => {}
                other => {
                    trace!(signature = ?core::str::from_utf8(other).ok(), "skipping system-use entry");
                }
            }
        }

        let Some((block, offset, length)) = continuation else {
            break;
        };
        hops += 1;
        if hops > MAX_CONTINUATIONS || length == 0 || length > SECTOR_SIZE as u64 {
            break;
        }
        let mut buf = vec![0u8; length as usize];
        if let Err(e) = source.read_exact_at(block * SECTOR_SIZE as u64 + offset, &mut buf) {
            warn!(block, error = %e, "unreadable continuation area");
            break;
        }
        area = buf;
    }

    if !name.is_empty() {
        rr.name = Some(name);
    }
    rr
}

fn decode_tf(data: &[u8], rr: &mut RockRidge) {
    if data.is_empty() || data[0] & 0x80 != 0 {
        // Long-form (17-byte) timestamps are not recorded by this codec
        return;
    }
    let flags = data[0];
    let mut pos = 1;
    // Timestamps appear in flag-bit order: creation, modify, access, ...
    for bit in 0..7u8 {
        if flags & (1 << bit) == 0 {
            continue;
        }
        if pos + 7 > data.len() {
            return;
        }
        if bit == 1 {
            let bytes: [u8; 7] = data[pos..pos + 7].try_into().unwrap_or_default();
            rr.modified = Some(DateTime7::from_bytes(&bytes));
        }
        pos += 7;
    }
}

fn decode_sl(data: &[u8], rr: &mut RockRidge) {
    if data.is_empty() {
        return;
    }
    let mut target = rr.symlink_target.take().unwrap_or_default();
    let mut pos = 1; // skip the SL flags byte
    while pos + 2 <= data.len() {
        let cflags = data[pos];
        let clen = data[pos + 1] as usize;
        if pos + 2 + clen > data.len() {
            break;
        }
        let content = &data[pos + 2..pos + 2 + clen];
        let text;
        let component: &str = if cflags & 0x02 != 0 {
            "."
        } else if cflags & 0x04 != 0 {
            ".."
        } else if cflags & 0x08 != 0 {
            ""
        } else {
            text = String::from_utf8_lossy(content);
            text.as_ref()
        };
        if cflags & 0x08 != 0 {
            target.clear();
            target.push('/');
        } else {
            if !target.is_empty() && !target.ends_with('/') {
                target.push('/');
            }
            target.push_str(component);
        }
        pos += 2 + clen;
    }
    if !target.is_empty() {
        rr.symlink_target = Some(target);
    }
}

/// Encode the SP entry placed on the root directory's "." record
pub fn encode_sp() -> [u8; 7] {
    [b'S', b'P', 7, 1, SP_CHECK[0], SP_CHECK[1], 0]
}

/// Encode a PX entry
pub fn encode_px(mode: u32, links: u32, uid: u32, gid: u32) -> [u8; 36] {
    let mut d = [0u8; 36];
    d[0] = b'P';
    d[1] = b'X';
    d[2] = 36;
    d[3] = 1;
    for (i, value) in [(4, mode), (12, links), (20, uid), (28, gid)] {
        d[i..i + 4].copy_from_slice(&value.to_le_bytes());
        d[i + 4..i + 8].copy_from_slice(&value.to_be_bytes());
    }
    d
}

/// Encode an NM entry; `continued` sets the continue flag
pub fn encode_nm(name: &[u8], continued: bool) -> Vec<u8> {
    debug_assert!(name.len() + 5 <= u8::MAX as usize);
    let mut d = Vec::with_capacity(5 + name.len());
    d.extend_from_slice(b"NM");
    d.push((5 + name.len()) as u8);
    d.push(1);
    d.push(if continued { 0x01 } else { 0x00 });
    d.extend_from_slice(name);
    d
}

/// Encode a TF entry carrying one modification timestamp
pub fn encode_tf(modified: &DateTime7) -> [u8; 12] {
    let mut d = [0u8; 12];
    d[0] = b'T';
    d[1] = b'F';
    d[2] = 12;
    d[3] = 1;
    d[4] = 0x02; // modify bit
    d[5..12].copy_from_slice(&modified.to_bytes());
    d
}

/// Encode a CE entry pointing at a continuation area
pub fn encode_ce(block: u32, offset: u32, length: u32) -> [u8; 28] {
    let mut d = [0u8; 28];
    d[0] = b'C';
    d[1] = b'E';
    d[2] = 28;
    d[3] = 1;
    for (i, value) in [(4, block), (12, offset), (20, length)] {
        d[i..i + 4].copy_from_slice(&value.to_le_bytes());
        d[i + 4..i + 8].copy_from_slice(&value.to_be_bytes());
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn sp_entry_detected() {
        assert!(has_sp_entry(&encode_sp()));
        assert!(!has_sp_entry(b""));
        assert!(!has_sp_entry(&encode_px(0o644, 1, 0, 0)));
    }

    #[test]
    fn nm_and_px_decode() {
        let mut su = Vec::new();
        su.extend_from_slice(&encode_sp());
        su.extend_from_slice(&encode_nm(b"readme.txt", false));
        su.extend_from_slice(&encode_px(0o100644, 1, 1000, 1000));
        let source = MemorySource::new(Vec::new());
        let rr = decode(&source, &su);
        assert_eq!(rr.name.as_deref(), Some("readme.txt"));
        assert_eq!(rr.mode, Some(0o100644));
    }

    #[test]
    fn name_spans_continuation_area() {
        // In-record part: NM with continue flag, then CE pointing at
        // sector 5 where the rest of the name lives.
        let mut area = vec![0u8; 6 * SECTOR_SIZE];
        let tail = encode_nm(b"-part-two", false);
        area[5 * SECTOR_SIZE..5 * SECTOR_SIZE + tail.len()].copy_from_slice(&tail);
        let source = MemorySource::new(area);

        let mut su = Vec::new();
        su.extend_from_slice(&encode_nm(b"part-one", true));
        su.extend_from_slice(&encode_ce(5, 0, tail.len() as u32));

        let rr = decode(&source, &su);
        assert_eq!(rr.name.as_deref(), Some("part-one-part-two"));
    }

    #[test]
    fn unreadable_continuation_keeps_parsed_fields() {
        // CE points far past the end of a 4-sector medium
        let source = MemorySource::new(vec![0u8; 4 * SECTOR_SIZE]);
        let mut su = Vec::new();
        su.extend_from_slice(&encode_nm(b"base", true));
        su.extend_from_slice(&encode_px(0o100644, 1, 0, 0));
        su.extend_from_slice(&encode_ce(5000, 0, 40));

        let rr = decode(&source, &su);
        assert_eq!(rr.name.as_deref(), Some("base"));
        assert_eq!(rr.mode, Some(0o100644));
    }

    #[test]
    fn tf_modify_timestamp_decodes() {
        let dt = DateTime7 {
            year: 126,
            month: 8,
            day: 30,
            hour: 10,
            minute: 0,
            second: 0,
            gmt_offset: 0,
        };
        let source = MemorySource::new(Vec::new());
        let rr = decode(&source, &encode_tf(&dt));
        assert_eq!(rr.modified, Some(dt));
    }

    #[test]
    fn symlink_components_join() {
        // SL: flags 0, components "usr" and "bin" after a root component
        let mut sl = vec![b'S', b'L', 0, 1, 0];
        sl.extend_from_slice(&[0x08, 0]); // root
        sl.extend_from_slice(&[0x00, 3]);
        sl.extend_from_slice(b"usr");
        sl.extend_from_slice(&[0x00, 3]);
        sl.extend_from_slice(b"bin");
        sl[2] = sl.len() as u8;
        let source = MemorySource::new(Vec::new());
        let rr = decode(&source, &sl);
        assert_eq!(rr.symlink_target.as_deref(), Some("/usr/bin"));
    }

    #[test]
    fn unknown_signatures_skipped() {
        let mut su = Vec::new();
        su.extend_from_slice(&[b'Z', b'Z', 6, 1, 0xAA, 0xBB]);
        su.extend_from_slice(&encode_nm(b"after", false));
        let source = MemorySource::new(Vec::new());
        let rr = decode(&source, &su);
        assert_eq!(rr.name.as_deref(), Some("after"));
    }
}
