//! UDF (ECMA-167) filesystem reader
//!
//! The chain runs anchor, volume descriptor sequence, partition and
//! logical volume descriptors, file set descriptor, then the ICB tree.
//! All addresses below the logical volume are partition relative;
//! resolution to absolute sectors (sparing remap included) happens here
//! so the rest of the crate only ever sees absolute extents.

pub mod descriptor;
pub mod icb;
pub mod sparing;
pub mod tag;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{EntryError, FormatError, Result};
use crate::source::{read_sector, ExtentSource};
use crate::types::{Entry, EntryId, EntryKind, EntryTree, Extent, FileFlags, SECTOR_SIZE};
use crate::utils::datetime::DateTime7;
use descriptor::{
    decode_cs0_chars, FileSetDescriptor, LogicalVolumeDescriptor, LongAd, PartitionDescriptor,
    PartitionMap, UdfAnchor,
};
use icb::{Allocation, FileEntry, FileIdentifier};
use sparing::SparingTable;

/// Cap on directory content size; a directory extent larger than this
/// is treated as corrupted
const MAX_DIRECTORY_BYTES: u64 = 64 * 1024 * 1024;

/// A partition map resolved against its Partition Descriptor
struct ResolvedPartition {
    start: u32,
    length: u32,
    sparing: Option<(u16, SparingTable)>,
}

/// Partition reference resolution for the whole logical volume
struct PartitionSet {
    partitions: Vec<Option<ResolvedPartition>>,
}

impl PartitionSet {
    fn build<S: ExtentSource>(
        source: &S,
        lvd: &LogicalVolumeDescriptor,
        pds: &[PartitionDescriptor],
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(lvd.maps.len());
        for map in &lvd.maps {
            let resolved = match map {
                PartitionMap::Plain { number } => pds
                    .iter()
                    .find(|pd| pd.number == *number)
                    .map(|pd| ResolvedPartition {
                        start: pd.start,
                        length: pd.length,
                        sparing: None,
                    }),
                PartitionMap::Sparable {
                    number,
                    packet_length,
                    table_size,
                    table_locations,
                } => pds.iter().find(|pd| pd.number == *number).map(|pd| {
                    let table = load_sparing_table(source, *table_size, table_locations);
                    ResolvedPartition {
                        start: pd.start,
                        length: pd.length,
                        sparing: Some((*packet_length, table)),
                    }
                }),
                PartitionMap::Unsupported => None,
            };
            partitions.push(resolved);
        }
        Ok(Self { partitions })
    }

    /// Resolve a partition-relative extent to an absolute one
    fn resolve(&self, partition: u16, block: u32, length: u64) -> std::result::Result<Extent, EntryError> {
        let part = self
            .partitions
            .get(partition as usize)
            .and_then(Option::as_ref)
            .ok_or(EntryError::UnmappedPartition(partition))?;
        let blocks = length.div_ceil(SECTOR_SIZE as u64);
        if block as u64 + blocks > part.length as u64 {
            return Err(EntryError::OutOfBounds {
                block: block as u64,
                length,
                limit_blocks: part.length as u64,
            });
        }
        let absolute = match &part.sparing {
            Some((packet_length, table)) if *packet_length > 0 => {
                let packet = block - block % *packet_length as u32;
                match table.remap(packet) {
                    Some(mapped) => mapped + (block - packet),
                    None => part.start + block,
                }
            }
            _ => part.start + block,
        };
        Ok(Extent {
            block: absolute as u64,
            offset: 0,
            length,
            partition,
        })
    }
}

fn load_sparing_table<S: ExtentSource>(
    source: &S,
    table_size: u32,
    locations: &[u32],
) -> SparingTable {
    let size = (table_size as usize).clamp(56, 16 * SECTOR_SIZE);
    for &location in locations {
        let mut data = vec![0u8; size];
        if source
            .read_exact_at(location as u64 * SECTOR_SIZE as u64, &mut data)
            .is_err()
        {
            continue;
        }
        match SparingTable::parse(&data, location as u64) {
            Ok(table) => return table,
            Err(e) => warn!(location, error = %e, "unusable sparing table copy"),
        }
    }
    SparingTable::default()
}

/// Read the UDF hierarchy; returns the tree and the logical volume id
pub(crate) fn read_tree<S: ExtentSource>(
    source: &S,
    anchor: &UdfAnchor,
    max_depth: usize,
) -> Result<(EntryTree, String)> {
    let (pds, lvd) = read_vds(source, anchor)?;
    if lvd.block_size != 0 && lvd.block_size as usize != SECTOR_SIZE {
        return Err(FormatError::IncompleteChain("2048-byte logical block size").into());
    }
    let parts = PartitionSet::build(source, &lvd, &pds)?;

    let fsd_extent = parts
        .resolve(lvd.fsd.partition, lvd.fsd.block, lvd.fsd.byte_length() as u64)
        .map_err(|_| FormatError::IncompleteChain("file set descriptor"))?;
    let mut sector = [0u8; SECTOR_SIZE];
    read_sector(source, fsd_extent.block, &mut sector)?;
    let fsd_tag = tag::DescriptorTag::parse(&sector, fsd_extent.block)?;
    if fsd_tag.tag_id != tag::ids::FILE_SET {
        return Err(FormatError::IncompleteChain("file set descriptor").into());
    }
    let fsd = FileSetDescriptor::parse(&sector);

    let (root_fe, root_block) = read_icb(source, &parts, &fsd.root_icb)
        .map_err(|_| FormatError::IncompleteChain("root directory ICB"))?;

    let mut tree = EntryTree::new(Entry {
        plain_name: String::new(),
        rock_ridge_name: None,
        joliet_name: None,
        kind: EntryKind::Directory,
        size: root_fe.info_length,
        recorded_at: DateTime7::default(),
        flags: FileFlags {
            directory: true,
            ..Default::default()
        },
        symlink_target: None,
        extents: Vec::new(),
        parent: EntryId(0),
        children: Vec::new(),
        error: None,
    });

    let mut visited = HashSet::new();
    visited.insert((fsd.root_icb.partition, fsd.root_icb.block));
    let root = tree.root();
    match content_extents(source, &parts, &root_fe, root_block, fsd.root_icb.partition) {
        Ok(extents) => {
            tree.entry_mut(root).extents = extents;
            walk_directory(source, &parts, &mut tree, root, max_depth, 1, &mut visited)?;
        }
        Err(e) => tree.entry_mut(root).error = Some(e),
    }

    debug!(entries = tree.len(), volume = %lvd.volume_id, "udf hierarchy read");
    Ok((tree, lvd.volume_id))
}

/// Read the volume descriptor sequence, falling back to the reserve copy
fn read_vds<S: ExtentSource>(
    source: &S,
    anchor: &UdfAnchor,
) -> Result<(Vec<PartitionDescriptor>, LogicalVolumeDescriptor)> {
    let mut failure = FormatError::IncompleteChain("volume descriptor sequence");
    for extent in [anchor.main_vds, anchor.reserve_vds] {
        if extent.length == 0 {
            continue;
        }
        match read_vds_extent(source, extent) {
            Ok(found) => return Ok(found),
            Err(e) => {
                warn!(location = extent.location, error = %e, "descriptor sequence unusable");
                if let crate::error::ImageError::Format(f) = e {
                    failure = f;
                }
            }
        }
    }
    Err(failure.into())
}

fn read_vds_extent<S: ExtentSource>(
    source: &S,
    extent: descriptor::ExtentAd,
) -> Result<(Vec<PartitionDescriptor>, LogicalVolumeDescriptor)> {
    let mut pds = Vec::new();
    let mut lvd = None;
    let mut sector = [0u8; SECTOR_SIZE];
    let blocks = (extent.length as u64).div_ceil(SECTOR_SIZE as u64);

    for i in 0..blocks {
        let block = extent.location as u64 + i;
        read_sector(source, block, &mut sector)?;
        let tag = match tag::DescriptorTag::parse(&sector, block) {
            Ok(t) => t,
            Err(_) => break,
        };
        match tag.tag_id {
            tag::ids::PARTITION => pds.push(PartitionDescriptor::parse(&sector)),
            tag::ids::LOGICAL_VOLUME => {
                lvd = Some(LogicalVolumeDescriptor::parse(&sector, block)?);
            }
            tag::ids::TERMINATING => break,
            _ => {}
        }
    }

    if pds.is_empty() {
        return Err(FormatError::IncompleteChain("partition descriptor").into());
    }
    let lvd = lvd.ok_or(FormatError::IncompleteChain("logical volume descriptor"))?;
    Ok((pds, lvd))
}

/// Read and parse the File Entry behind a long allocation descriptor
fn read_icb<S: ExtentSource>(
    source: &S,
    parts: &PartitionSet,
    icb: &LongAd,
) -> std::result::Result<(FileEntry, u64), EntryError> {
    let extent = parts.resolve(icb.partition, icb.block, SECTOR_SIZE as u64)?;
    let mut sector = [0u8; SECTOR_SIZE];
    read_sector(source, extent.block, &mut sector).map_err(|_| EntryError::BadRecord)?;
    let tag = tag::DescriptorTag::parse(&sector, extent.block).map_err(|_| EntryError::BadRecord)?;
    let fe = FileEntry::parse(&sector, &tag)?;
    Ok((fe, extent.block))
}

/// Resolve a File Entry's content to absolute extents
///
/// Follows chained allocation descriptor blocks; embedded content
/// becomes a single intra-block extent pointing into the entry itself.
fn content_extents<S: ExtentSource>(
    source: &S,
    parts: &PartitionSet,
    fe: &FileEntry,
    fe_block: u64,
    fe_partition: u16,
) -> std::result::Result<Vec<Extent>, EntryError> {
    if let Some((offset, length)) = fe.inline {
        return Ok(vec![Extent {
            block: fe_block,
            offset: offset as u64,
            length: length as u64,
            partition: fe_partition,
        }]);
    }

    let mut extents = Vec::new();
    let mut allocations = fe.allocations.clone();
    let mut hops = 0;
    while let Some(alloc) = pop_front(&mut allocations) {
        if alloc.is_chain() {
            hops += 1;
            if hops > 8 {
                return Err(EntryError::BadAllocation);
            }
            let partition = alloc.partition.unwrap_or(fe_partition);
            let chain = parts.resolve(partition, alloc.block, alloc.length as u64)?;
            let mut block = vec![0u8; alloc.length as usize];
            source
                .read_exact_at(chain.block * SECTOR_SIZE as u64, &mut block)
                .map_err(|_| EntryError::BadAllocation)?;
            let mut more = icb::parse_allocations(&block, fe.ad_form)?;
            more.append(&mut allocations);
            allocations = more;
            continue;
        }
        if !alloc.is_recorded() {
            // Unrecorded (sparse) extents are not representable
            return Err(EntryError::BadAllocation);
        }
        let partition = alloc.partition.unwrap_or(fe_partition);
        extents.push(parts.resolve(partition, alloc.block, alloc.length as u64)?);
    }
    Ok(extents)
}

fn pop_front(allocations: &mut Vec<Allocation>) -> Option<Allocation> {
    if allocations.is_empty() {
        None
    } else {
        Some(allocations.remove(0))
    }
}

/// Read an ICB's content given its resolved extents
///
/// Used for directories and symlink path data, both capped at
/// [`MAX_DIRECTORY_BYTES`].
fn read_content<S: ExtentSource>(
    source: &S,
    extents: &[Extent],
    info_length: u64,
) -> std::result::Result<Vec<u8>, EntryError> {
    if info_length > MAX_DIRECTORY_BYTES {
        return Err(EntryError::BadAllocation);
    }
    let mut data = Vec::with_capacity(info_length as usize);
    for extent in extents {
        let mut chunk = vec![0u8; extent.length as usize];
        source
            .read_exact_at(
                extent.block * SECTOR_SIZE as u64 + extent.offset,
                &mut chunk,
            )
            .map_err(|_| EntryError::BadRecord)?;
        data.append(&mut chunk);
    }
    data.truncate(info_length as usize);
    Ok(data)
}

/// Decode a symlink ICB's pathname component sequence
fn decode_symlink_target<S: ExtentSource>(
    source: &S,
    extents: &[Extent],
    info_length: u64,
) -> std::result::Result<Option<String>, EntryError> {
    let data = read_content(source, extents, info_length)?;
    let mut target = String::new();
    let mut pos = 0;
    while pos + 4 <= data.len() {
        let component_type = data[pos];
        let len = data[pos + 1] as usize;
        pos += 4;
        if pos + len > data.len() {
            return Err(EntryError::BadRecord);
        }
        match component_type {
            1 => {
                target.clear();
                target.push('/');
            }
            2 => push_component(&mut target, ".."),
            3 => push_component(&mut target, "."),
            5 => push_component(&mut target, &decode_cs0_chars(&data[pos..pos + len])),
            _ => return Err(EntryError::BadRecord),
        }
        pos += len;
    }
    Ok((!target.is_empty()).then_some(target))
}

fn push_component(target: &mut String, component: &str) {
    if !target.is_empty() && !target.ends_with('/') {
        target.push('/');
    }
    target.push_str(component);
}

fn walk_directory<S: ExtentSource>(
    source: &S,
    parts: &PartitionSet,
    tree: &mut EntryTree,
    parent: EntryId,
    max_depth: usize,
    depth: usize,
    visited: &mut HashSet<(u16, u32)>,
) -> Result<()> {
    let (extents, info_length) = {
        let entry = tree.entry(parent);
        (entry.extents.clone(), entry.size)
    };
    let data = match read_content(source, &extents, info_length) {
        Ok(d) => d,
        Err(e) => {
            tree.entry_mut(parent).error = Some(e);
            return Ok(());
        }
    };

    let mut pos = 0;
    while pos + 16 <= data.len() {
        let fid = match FileIdentifier::parse(&data[pos..], extents.first().map_or(0, |e| e.block))
        {
            Ok(f) => f,
            Err(e) => {
                warn!(offset = pos, "malformed file identifier");
                tree.entry_mut(parent).error = Some(e);
                break;
            }
        };
        pos += fid.encoded_len;
        if fid.is_parent() || fid.is_deleted() {
            continue;
        }

        let mut entry = Entry {
            plain_name: fid.name.clone(),
            rock_ridge_name: None,
            joliet_name: None,
            kind: if fid.is_directory() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: 0,
            recorded_at: DateTime7::default(),
            flags: FileFlags {
                directory: fid.is_directory(),
                ..Default::default()
            },
            symlink_target: None,
            extents: Vec::new(),
            parent: EntryId(0),
            children: Vec::new(),
            error: None,
        };

        let mut child_fe = None;
        match read_icb(source, parts, &fid.icb) {
            Ok((fe, fe_block)) => {
                entry.size = fe.info_length;
                if fe.file_type == icb::file_types::SYMLINK {
                    entry.kind = EntryKind::File;
                }
                match content_extents(source, parts, &fe, fe_block, fid.icb.partition) {
                    Ok(ext) => {
                        if fe.file_type == icb::file_types::SYMLINK {
                            match decode_symlink_target(source, &ext, fe.info_length) {
                                Ok(target) => entry.symlink_target = target,
                                Err(e) => entry.error = Some(e),
                            }
                        }
                        entry.extents = ext;
                    }
                    Err(e) => entry.error = Some(e),
                }
                child_fe = Some(fe);
            }
            Err(e) => entry.error = Some(e),
        }

        let is_dir = entry.kind == EntryKind::Directory;
        let has_error = entry.error.is_some();
        let id = tree.push(entry);
        tree.attach(parent, id);

        if is_dir && !has_error && child_fe.is_some() {
            if depth + 1 > max_depth {
                tree.entry_mut(id).error = Some(EntryError::DepthExceeded(max_depth));
            } else if visited.insert((fid.icb.partition, fid.icb.block)) {
                walk_directory(source, parts, tree, id, max_depth, depth + 1, visited)?;
            }
        }
    }
    Ok(())
}

/// Re-exported for the volume scanner
pub use descriptor::probe_anchor;
