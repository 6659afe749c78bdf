//! Two-pass image layout
//!
//! The planner walks the source hierarchy bottom-up to size every
//! directory extent (Rock Ridge system-use and continuation areas
//! included), then places everything top-down in path-table order:
//! descriptors, boot catalog, path tables, plain directories, Joliet
//! directories, continuation areas, then file content. The serializer
//! replays the same decisions, so every address is final before the
//! first byte is written.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{LayoutError, Result};
use crate::extensions::joliet;
use crate::types::{EntryKind, MAX_DIRECTORY_DEPTH, MAX_EXTENT_LENGTH, SECTOR_SIZE};
use crate::utils::datetime::DateTime7;
use crate::utils::sector::{align_to_sector, sectors_for_bytes};
use crate::utils::string::to_dchar_identifier;
use crate::write::tree::{SourceId, SourceTree};

/// Options controlling the written image
pub struct ImageOptions {
    /// Volume identifier for the Primary descriptor
    pub volume_id: String,

    /// System identifier for the Primary descriptor
    pub system_id: String,

    /// Write a Joliet supplementary hierarchy
    pub joliet: bool,

    /// Decorate records with Rock Ridge names and attributes
    pub rock_ridge: bool,

    /// Raw El Torito boot catalog sector; when set, a Boot Record
    /// descriptor referencing it is written
    pub boot_catalog: Option<Vec<u8>>,

    /// Recording timestamp for descriptors and records
    pub modified: DateTime7,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            volume_id: "UNTITLED".to_string(),
            system_id: String::new(),
            joliet: true,
            rock_ridge: true,
            boot_catalog: None,
            modified: DateTime7::default(),
        }
    }
}

/// Largest usable directory record length; the length field is a byte
/// and records must stay even
const MAX_RECORD_LEN: usize = 254;

/// Fixed sizes of the Rock Ridge entries the writer emits
const SP_LEN: usize = 7;
const PX_LEN: usize = 36;
const TF_LEN: usize = 12;
const CE_LEN: usize = 28;

/// Planned placement of one directory
pub(crate) struct DirPlan {
    /// Source node
    pub source: SourceId,

    /// Path table identifier; a single 0x00 for the root
    pub iso_id: Vec<u8>,

    /// 1-based path table number of the parent directory
    pub parent_number: u16,

    /// Plain extent location and size
    pub lba: u32,
    pub size: u64,

    /// Joliet extent location and size (0 when Joliet is off)
    pub joliet_lba: u32,
    pub joliet_size: u64,

    /// Rock Ridge continuation area location and size
    pub ce_lba: u32,
    pub ce_size: u64,
}

/// Planned placement of one file
pub(crate) struct FilePlan {
    /// First content sector
    pub lba: u32,
    /// Content size in bytes
    pub size: u64,
}

/// Complete image plan
pub(crate) struct Plan {
    /// Directories in path-table order; index 0 is the root
    pub dirs: Vec<DirPlan>,

    /// Directory index by source node
    pub dir_index: HashMap<SourceId, usize>,

    /// File placements by source node
    pub files: HashMap<SourceId, FilePlan>,

    /// ISO9660 identifier per node (version suffix included for files)
    pub ids: HashMap<SourceId, Vec<u8>>,

    /// Joliet UCS-2 identifier per node
    pub joliet_ids: HashMap<SourceId, Vec<u8>>,

    /// Path table size in bytes (same for both byte orders)
    pub path_table_size: u64,
    pub l_path_table_lba: u32,
    pub m_path_table_lba: u32,

    /// Joliet path table placement (0 when Joliet is off)
    pub joliet_path_table_size: u64,
    pub joliet_l_path_table_lba: u32,
    pub joliet_m_path_table_lba: u32,

    /// Boot catalog sector, when an El Torito catalog was supplied
    pub catalog_lba: Option<u32>,

    /// Total image size in sectors
    pub total_sectors: u64,
}

/// Number of extent chunks a file of `size` bytes needs
pub(crate) fn extent_chunks(size: u64) -> u64 {
    if size == 0 {
        1
    } else {
        size.div_ceil(MAX_EXTENT_LENGTH)
    }
}

/// Rock Ridge system-use split for one child record
///
/// Returns the in-record system-use length and the bytes spilled to
/// the continuation area. NM and TF move out together when the record
/// would overflow; PX always stays in the record.
pub(crate) fn rr_split(id_len: usize, name: &str) -> (usize, usize) {
    let nm_total = nm_encoded_len(name);
    let full = PX_LEN + TF_LEN + nm_total;
    if record_len_with_su(id_len, full) <= MAX_RECORD_LEN {
        (full, 0)
    } else {
        (PX_LEN + CE_LEN, nm_total + TF_LEN)
    }
}

/// Encoded length of the NM entries for a name, chunked at 250 bytes
pub(crate) fn nm_encoded_len(name: &str) -> usize {
    let bytes = name.len();
    let chunks = bytes.div_ceil(250).max(1);
    bytes + 5 * chunks
}

fn record_len_with_su(id_len: usize, su_len: usize) -> usize {
    crate::directory::record::encoded_len(id_len, su_len)
}

/// Simulate record placement within a directory extent
///
/// Records never cross a sector boundary; a record that does not fit
/// pads the sector and starts the next one.
pub(crate) fn directory_size(record_lens: &[usize]) -> u64 {
    let mut pos = 0u64;
    for &len in record_lens {
        let within = pos % SECTOR_SIZE as u64;
        if within + len as u64 > SECTOR_SIZE as u64 {
            pos += SECTOR_SIZE as u64 - within;
        }
        pos += len as u64;
    }
    align_to_sector(pos.max(1))
}

/// Lay out continuation-area spills; each spill stays within one block
///
/// Returns the byte offset of each spill and the total area size.
pub(crate) fn ce_layout(spills: &[usize]) -> (Vec<u64>, u64) {
    let mut offsets = Vec::with_capacity(spills.len());
    let mut pos = 0u64;
    for &len in spills {
        let within = pos % SECTOR_SIZE as u64;
        if within + len as u64 > SECTOR_SIZE as u64 {
            pos += SECTOR_SIZE as u64 - within;
        }
        offsets.push(pos);
        pos += len as u64;
    }
    (offsets, align_to_sector(pos))
}

/// Map a source name onto its ISO9660 identifier
pub(crate) fn iso_identifier(name: &str, kind: EntryKind) -> Result<Vec<u8>> {
    match kind {
        EntryKind::Directory => {
            let mapped: String = to_dchar_identifier(name)
                .chars()
                .filter(|&c| c != '.')
                .take(8)
                .collect();
            if mapped.is_empty() {
                return Err(LayoutError::NameTooLong(name.to_string()).into());
            }
            Ok(mapped.into_bytes())
        }
        EntryKind::File => {
            let (base, ext) = match name.rsplit_once('.') {
                Some((b, e)) if !b.is_empty() => (b, e),
                _ => (name, ""),
            };
            let base: String = to_dchar_identifier(base)
                .chars()
                .filter(|&c| c != '.')
                .take(8)
                .collect();
            let ext: String = to_dchar_identifier(ext)
                .chars()
                .filter(|&c| c != '.')
                .take(3)
                .collect();
            if base.is_empty() {
                return Err(LayoutError::NameTooLong(name.to_string()).into());
            }
            Ok(format!("{base}.{ext};1").into_bytes())
        }
    }
}

/// Map a source name onto its Joliet UCS-2 identifier
pub(crate) fn joliet_identifier(name: &str, kind: EntryKind) -> Result<Vec<u8>> {
    let mut text = name.to_string();
    if kind == EntryKind::File {
        text.push_str(";1");
    }
    let encoded = joliet::encode_ucs2_be(&text);
    if encoded.len() > 220 {
        return Err(LayoutError::NameTooLong(name.to_string()).into());
    }
    Ok(encoded)
}

/// Children of a directory sorted by their mapped identifier, with
/// duplicate detection
fn sorted_children(
    tree: &SourceTree,
    dir: SourceId,
    ids: &HashMap<SourceId, Vec<u8>>,
) -> Result<Vec<SourceId>> {
    let mut children: Vec<SourceId> = tree.children(dir).to_vec();
    children.sort_by(|a, b| ids[a].cmp(&ids[b]));
    for pair in children.windows(2) {
        if ids[&pair[0]] == ids[&pair[1]] {
            let text = String::from_utf8_lossy(&ids[&pair[0]]).into_owned();
            return Err(LayoutError::DuplicateName(text).into());
        }
    }
    Ok(children)
}

/// Build the full image plan
pub(crate) fn plan(tree: &SourceTree, options: &ImageOptions) -> Result<Plan> {
    // Identifier mapping for every node
    let mut ids = HashMap::new();
    let mut joliet_ids = HashMap::new();
    for id in tree.ids() {
        let node = tree.node(id);
        if id == tree.root() {
            ids.insert(id, vec![0x00]);
            joliet_ids.insert(id, vec![0x00]);
            continue;
        }
        ids.insert(id, iso_identifier(&node.name, node.kind)?);
        if options.joliet {
            joliet_ids.insert(id, joliet_identifier(&node.name, node.kind)?);
        }
    }

    // Breadth-first directory list: exactly path-table order once each
    // level's children are visited in sorted order
    let mut dirs: Vec<DirPlan> = Vec::new();
    let mut dir_index = HashMap::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back((tree.root(), 1u16, 1usize));
    while let Some((dir, parent_number, depth)) = queue.pop_front() {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(LayoutError::DepthExceeded {
                depth,
                limit: MAX_DIRECTORY_DEPTH,
            }
            .into());
        }
        let number = dirs.len() + 1;
        // Path table entry numbers are 16-bit
        if number > u16::MAX as usize {
            return Err(LayoutError::TooManyDirectories { count: number }.into());
        }
        dir_index.insert(dir, dirs.len());
        dirs.push(DirPlan {
            source: dir,
            iso_id: ids[&dir].clone(),
            parent_number,
            lba: 0,
            size: 0,
            joliet_lba: 0,
            joliet_size: 0,
            ce_lba: 0,
            ce_size: 0,
        });
        for child in sorted_children(tree, dir, &ids)? {
            if tree.node(child).kind == EntryKind::Directory {
                queue.push_back((child, number as u16, depth + 1));
            }
        }
    }

    // Directory extent sizes
    for plan_idx in 0..dirs.len() {
        let dir = dirs[plan_idx].source;
        let mut record_lens = Vec::new();
        let mut spills = Vec::new();

        // "." and ".." records; the root's own record carries SP and PX
        let root_su = if options.rock_ridge && plan_idx == 0 {
            SP_LEN + PX_LEN
        } else {
            0
        };
        record_lens.push(record_len_with_su(1, root_su));
        record_lens.push(record_len_with_su(1, 0));

        let mut joliet_lens = vec![record_len_with_su(1, 0), record_len_with_su(1, 0)];
        for child in sorted_children(tree, dir, &ids)? {
            let node = tree.node(child);
            let id_len = ids[&child].len();
            let (su, spill) = if options.rock_ridge {
                rr_split(id_len, &node.name)
            } else {
                (0, 0)
            };
            let chunks = if node.kind == EntryKind::File {
                extent_chunks(node.size)
            } else {
                1
            };
            for chunk in 0..chunks {
                // Rock Ridge decorates only the first record of a chain
                let su_len = if chunk == 0 { su } else { 0 };
                record_lens.push(record_len_with_su(id_len, su_len));
            }
            if spill > 0 {
                spills.push(spill);
            }
            if options.joliet {
                let jid_len = joliet_ids[&child].len();
                for _ in 0..chunks {
                    joliet_lens.push(record_len_with_su(jid_len, 0));
                }
            }
        }

        dirs[plan_idx].size = directory_size(&record_lens);
        let (_, ce_total) = ce_layout(&spills);
        dirs[plan_idx].ce_size = ce_total;
        if options.joliet {
            dirs[plan_idx].joliet_size = directory_size(&joliet_lens);
        }
    }

    // Path table sizes (identical for both byte orders)
    let path_table_size: u64 = dirs
        .iter()
        .map(|d| {
            let id_len = d.iso_id.len();
            (8 + id_len + id_len % 2) as u64
        })
        .sum();
    let joliet_path_table_size: u64 = if options.joliet {
        dirs.iter()
            .map(|d| {
                let id_len = if d.source == tree.root() {
                    1
                } else {
                    joliet_ids[&d.source].len()
                };
                (8 + id_len + id_len % 2) as u64
            })
            .sum()
    } else {
        0
    };

    // Placement
    let mut cursor = 16u64; // system area stays zeroed
    cursor += 1; // PVD
    if options.joliet {
        cursor += 1; // SVD
    }
    let mut catalog_lba = None;
    if options.boot_catalog.is_some() {
        cursor += 1; // Boot Record descriptor
    }
    cursor += 1; // terminator
    if options.boot_catalog.is_some() {
        catalog_lba = Some(cursor as u32);
        cursor += 1;
    }

    let l_path_table_lba = cursor as u32;
    cursor += sectors_for_bytes(path_table_size);
    let m_path_table_lba = cursor as u32;
    cursor += sectors_for_bytes(path_table_size);

    let (joliet_l_path_table_lba, joliet_m_path_table_lba) = if options.joliet {
        let l = cursor as u32;
        cursor += sectors_for_bytes(joliet_path_table_size);
        let m = cursor as u32;
        cursor += sectors_for_bytes(joliet_path_table_size);
        (l, m)
    } else {
        (0, 0)
    };

    for dir in dirs.iter_mut() {
        dir.lba = cursor as u32;
        cursor += sectors_for_bytes(dir.size);
    }
    if options.joliet {
        for dir in dirs.iter_mut() {
            dir.joliet_lba = cursor as u32;
            cursor += sectors_for_bytes(dir.joliet_size);
        }
    }
    for dir in dirs.iter_mut() {
        if dir.ce_size > 0 {
            dir.ce_lba = cursor as u32;
            cursor += sectors_for_bytes(dir.ce_size);
        }
    }

    // File content, in directory order then identifier order
    let mut files = HashMap::new();
    for dir in &dirs {
        for child in sorted_children(tree, dir.source, &ids)? {
            let node = tree.node(child);
            if node.kind != EntryKind::File {
                continue;
            }
            files.insert(
                child,
                FilePlan {
                    lba: cursor as u32,
                    size: node.size,
                },
            );
            cursor += sectors_for_bytes(node.size);
        }
    }

    if cursor > u32::MAX as u64 {
        return Err(LayoutError::VolumeTooLarge { sectors: cursor }.into());
    }

    debug!(
        sectors = cursor,
        directories = dirs.len(),
        files = files.len(),
        "image layout planned"
    );

    Ok(Plan {
        dirs,
        dir_index,
        files,
        ids,
        joliet_ids,
        path_table_size,
        l_path_table_lba,
        m_path_table_lba,
        joliet_path_table_size,
        joliet_l_path_table_lba,
        joliet_m_path_table_lba,
        catalog_lba,
        total_sectors: cursor,
    })
}
