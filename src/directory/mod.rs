//! ISO9660 directory hierarchy reader
//!
//! The directory records are the authoritative hierarchy; the path
//! table is validated up front (a broken table implies a broken image)
//! but the tree itself comes from a recursive walk of the records.
//! Joliet names are merged in afterwards from the parallel
//! Supplementary hierarchy, which references the same file extents.

pub mod path_table;
pub mod record;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{EntryError, FormatError, Result};
use crate::extensions::{joliet, rock_ridge};
use crate::source::ExtentSource;
use crate::types::{Entry, EntryId, EntryKind, EntryTree, Extent, SECTOR_SIZE};
use crate::utils::datetime::DateTime7;
use crate::utils::string::strip_version;
use crate::volume::VolumeInfo;
use record::{DirectoryRecord, RecordIter};

/// Recursion guard for hostile or looping hierarchies
const WALK_DEPTH_GUARD: usize = 64;

/// Build the entry tree for an ISO9660 volume
///
/// `supplementary` merges Joliet names when present; `rock_ridge`
/// enables SUSP decoding of each record's system-use area.
pub(crate) fn read_tree<S: ExtentSource>(
    source: &S,
    primary: &VolumeInfo,
    supplementary: Option<&VolumeInfo>,
    rock_ridge: bool,
) -> Result<EntryTree> {
    validate_path_table(source, primary)?;

    let volume_blocks = primary.volume_space_size as u64;
    let root_extent = Extent::new(
        primary.root_extent_lba as u64,
        primary.root_extent_len as u64,
    );
    if root_extent.length == 0 || root_extent.end_block() > volume_blocks {
        return Err(FormatError::OutOfBounds {
            block: root_extent.block,
            blocks: root_extent.sector_count(),
            volume_blocks,
        }
        .into());
    }

    let mut tree = EntryTree::new(directory_entry(String::new(), root_extent));
    let mut visited = HashSet::new();
    visited.insert(root_extent.block);
    let root = tree.root();
    walk(
        source,
        &mut tree,
        root,
        root_extent,
        volume_blocks,
        rock_ridge,
        1,
        &mut visited,
    )?;

    if let Some(svd) = supplementary {
        let joliet_root = Extent::new(svd.root_extent_lba as u64, svd.root_extent_len as u64);
        if joliet_root.length == 0 || joliet_root.end_block() > volume_blocks {
            warn!("joliet root extent out of bounds, names not merged");
        } else {
            let mut jvisited = HashSet::new();
            jvisited.insert(joliet_root.block);
            merge_joliet(source, &mut tree, root, joliet_root, 1, &mut jvisited)?;
        }
    }

    debug!(entries = tree.len(), "directory hierarchy read");
    Ok(tree)
}

fn directory_entry(name: String, extent: Extent) -> Entry {
    Entry {
        plain_name: name,
        rock_ridge_name: None,
        joliet_name: None,
        kind: EntryKind::Directory,
        size: extent.length,
        recorded_at: DateTime7::default(),
        flags: crate::types::FileFlags {
            directory: true,
            ..Default::default()
        },
        symlink_target: None,
        extents: vec![extent],
        parent: EntryId(0),
        children: Vec::new(),
        error: None,
    }
}

/// Read and structurally validate the type L path table
fn validate_path_table<S: ExtentSource>(source: &S, info: &VolumeInfo) -> Result<()> {
    let size = info.path_table_size as u64;
    if size == 0 {
        return Err(FormatError::BadPathTable("zero size").into());
    }
    let table_extent = Extent::new(info.path_table_lba as u64, size);
    if table_extent.end_block() > info.volume_space_size as u64 {
        return Err(FormatError::OutOfBounds {
            block: table_extent.block,
            blocks: table_extent.sector_count(),
            volume_blocks: info.volume_space_size as u64,
        }
        .into());
    }
    let mut data = vec![0u8; size as usize];
    source.read_exact_at(table_extent.block * SECTOR_SIZE as u64, &mut data)?;
    let entries = path_table::parse(&data, false)?;
    debug!(directories = entries.len(), "path table validated");
    Ok(())
}

fn read_extent<S: ExtentSource>(source: &S, extent: Extent) -> std::io::Result<Vec<u8>> {
    let mut data = vec![0u8; extent.length as usize];
    source.read_exact_at(extent.block * SECTOR_SIZE as u64 + extent.offset, &mut data)?;
    Ok(data)
}

#[allow(clippy::too_many_arguments)]
fn walk<S: ExtentSource>(
    source: &S,
    tree: &mut EntryTree,
    parent: EntryId,
    dir_extent: Extent,
    volume_blocks: u64,
    rock_ridge: bool,
    depth: usize,
    visited: &mut HashSet<u64>,
) -> Result<()> {
    let data = read_extent(source, dir_extent)?;
    let mut chain: Option<EntryId> = None;

    for item in RecordIter::new(&data) {
        let record = match item {
            Ok(r) => r,
            Err(e) => {
                // Remaining records of this directory are unreachable;
                // the directory itself is marked, children so far stay.
                warn!(block = dir_extent.block, "malformed directory record");
                tree.entry_mut(parent).error = Some(e);
                break;
            }
        };
        if record.is_self() || record.is_parent() {
            continue;
        }

        let extent = Extent::new(record.extent_lba() as u64, record.data_length() as u64);

        // Continuation of a multi-extent chain started by an earlier
        // record of the same file
        if let Some(id) = chain {
            let entry = tree.entry_mut(id);
            if extent.end_block() > volume_blocks {
                entry.error = Some(EntryError::OutOfBounds {
                    block: extent.block,
                    length: extent.length,
                    limit_blocks: volume_blocks,
                });
                entry.extents.clear();
            } else {
                entry.size += extent.length;
                entry.extents.push(extent);
            }
            chain = record.has_more_extents().then_some(id);
            continue;
        }

        let mut entry = entry_from_record(&record);
        if rock_ridge {
            let rr = rock_ridge::decode(source, record.system_use());
            entry.rock_ridge_name = rr.name;
            entry.symlink_target = rr.symlink_target;
            if let Some(modified) = rr.modified {
                entry.recorded_at = modified;
            }
        }

        if extent.end_block() > volume_blocks {
            entry.error = Some(EntryError::OutOfBounds {
                block: extent.block,
                length: extent.length,
                limit_blocks: volume_blocks,
            });
            entry.extents.clear();
            entry.size = 0;
        }

        let is_dir = entry.kind == EntryKind::Directory;
        let has_error = entry.error.is_some();
        let id = tree.push(entry);
        tree.attach(parent, id);

        if record.has_more_extents() && !is_dir && !has_error {
            chain = Some(id);
        }

        if is_dir && !has_error {
            if depth + 1 > WALK_DEPTH_GUARD {
                tree.entry_mut(id).error = Some(EntryError::DepthExceeded(WALK_DEPTH_GUARD));
            } else if visited.insert(extent.block) {
                walk(
                    source,
                    tree,
                    id,
                    extent,
                    volume_blocks,
                    rock_ridge,
                    depth + 1,
                    visited,
                )?;
            }
        }
    }
    Ok(())
}

fn entry_from_record(record: &DirectoryRecord<'_>) -> Entry {
    let flags = record.flags();
    let kind = if flags.directory {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let raw = String::from_utf8_lossy(record.raw_identifier());
    let plain_name = strip_version(&raw).to_string();
    let extent = Extent::new(record.extent_lba() as u64, record.data_length() as u64);
    Entry {
        plain_name,
        rock_ridge_name: None,
        joliet_name: None,
        kind,
        size: extent.length,
        recorded_at: record.recorded_at(),
        flags,
        symlink_target: None,
        extents: vec![extent],
        parent: EntryId(0),
        children: Vec::new(),
        error: None,
    }
}

/// One Joliet record reduced to what the merge needs
struct JolietChild {
    name: String,
    extent: Extent,
    is_dir: bool,
}

/// Merge Joliet names into an already built plain hierarchy
///
/// Children are paired by first-extent block, then by case-folded
/// identifier, then by record position. Unpaired children keep their
/// plain names.
fn merge_joliet<S: ExtentSource>(
    source: &S,
    tree: &mut EntryTree,
    node: EntryId,
    dir_extent: Extent,
    depth: usize,
    visited: &mut HashSet<u64>,
) -> Result<()> {
    if depth > WALK_DEPTH_GUARD {
        return Ok(());
    }
    // Joliet is advisory; an unreadable supplementary directory only
    // means its names are not merged.
    let Ok(data) = read_extent(source, dir_extent) else {
        warn!(block = dir_extent.block, "unreadable joliet directory");
        return Ok(());
    };

    let mut jchildren = Vec::new();
    let mut continuing = false;
    for item in RecordIter::new(&data) {
        let record = match item {
            Ok(r) => r,
            Err(_) => break,
        };
        if record.is_self() || record.is_parent() {
            continue;
        }
        if continuing {
            continuing = record.has_more_extents();
            continue;
        }
        continuing = record.has_more_extents();
        let decoded = joliet::decode_ucs2_be(record.raw_identifier());
        jchildren.push(JolietChild {
            name: strip_version(&decoded).to_string(),
            extent: Extent::new(record.extent_lba() as u64, record.data_length() as u64),
            is_dir: record.flags().directory,
        });
    }

    let children: Vec<EntryId> = tree.children(node).to_vec();
    let mut used = vec![false; jchildren.len()];
    for (pos, child) in children.into_iter().enumerate() {
        let first_block = tree.entry(child).extents.first().map(|e| e.block);
        let plain = tree.entry(child).plain_name.clone();

        let matched = (0..jchildren.len())
            .find(|&i| !used[i] && Some(jchildren[i].extent.block) == first_block)
            .or_else(|| {
                (0..jchildren.len())
                    .find(|&i| !used[i] && jchildren[i].name.eq_ignore_ascii_case(&plain))
            })
            .or_else(|| (pos < jchildren.len() && !used[pos]).then_some(pos));

        let Some(i) = matched else { continue };
        used[i] = true;
        tree.entry_mut(child).joliet_name = Some(jchildren[i].name.clone());

        if jchildren[i].is_dir && tree.entry(child).is_directory() {
            let jextent = jchildren[i].extent;
            if jextent.length > 0 && visited.insert(jextent.block) {
                merge_joliet(source, tree, child, jextent, depth + 1, visited)?;
            }
        }
    }
    Ok(())
}
