//! Sequential image serialization
//!
//! Replays the layout plan into an output stream: every structure is
//! emitted in ascending sector order, so the writer never seeks. Sizes
//! are asserted against the plan as each extent is produced.

use std::io::Write;

use tracing::debug;

use crate::directory::path_table::{self, PathTableEntry};
use crate::directory::record::{self, RecordParams};
use crate::error::Result;
use crate::extensions::rock_ridge;
use crate::types::{EntryKind, FileFlags, MAX_EXTENT_LENGTH, SECTOR_SIZE};
use crate::utils::datetime::DateTime7;
use crate::volume::{boot_record, primary};
use crate::write::layout::{ce_layout, extent_chunks, rr_split, ImageOptions, Plan};
use crate::write::tree::{SourceId, SourceTree};

/// Sectors per file extent chunk
const CHUNK_SECTORS: u64 = MAX_EXTENT_LENGTH / SECTOR_SIZE as u64;

/// Sector-padding writer adapter
struct SectorSink<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> SectorSink<W> {
    fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.out.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Zero-fill up to a sector boundary
    fn pad_to_sector(&mut self) -> std::io::Result<()> {
        let within = (self.written % SECTOR_SIZE as u64) as usize;
        if within > 0 {
            self.write_all(&vec![0u8; SECTOR_SIZE - within])?;
        }
        Ok(())
    }

    /// Zero-fill up to an absolute sector
    fn pad_to_lba(&mut self, lba: u64) -> std::io::Result<()> {
        self.pad_to_sector()?;
        let current = self.written / SECTOR_SIZE as u64;
        debug_assert!(current <= lba);
        for _ in current..lba {
            self.write_all(&[0u8; SECTOR_SIZE])?;
        }
        Ok(())
    }
}

/// POSIX modes emitted in PX entries
const DIR_MODE: u32 = 0o040_755;
const FILE_MODE: u32 = 0o100_644;

/// Serialize a planned image; returns total bytes written
pub(crate) fn serialize<W: Write>(
    tree: &SourceTree,
    options: &ImageOptions,
    plan: &Plan,
    out: W,
) -> Result<u64> {
    let mut sink = SectorSink::new(out);
    sink.pad_to_lba(16)?;

    // Volume descriptor set
    let root = &plan.dirs[0];
    let root_record = root_descriptor_record(root.lba, root.size, &options.modified);
    sink.write_all(&primary::encode(&primary::VolumeDescriptorParams {
        type_code: 1,
        volume_id: &options.volume_id,
        system_id: &options.system_id,
        volume_space_size: plan.total_sectors as u32,
        path_table_size: plan.path_table_size as u32,
        type_l_path_table: plan.l_path_table_lba,
        type_m_path_table: plan.m_path_table_lba,
        root_record,
        joliet: false,
        recorded_at: options.modified,
    }))?;
    if options.joliet {
        let joliet_root = root_descriptor_record(root.joliet_lba, root.joliet_size, &options.modified);
        sink.write_all(&primary::encode(&primary::VolumeDescriptorParams {
            type_code: 2,
            volume_id: &options.volume_id,
            system_id: &options.system_id,
            volume_space_size: plan.total_sectors as u32,
            path_table_size: plan.joliet_path_table_size as u32,
            type_l_path_table: plan.joliet_l_path_table_lba,
            type_m_path_table: plan.joliet_m_path_table_lba,
            root_record: joliet_root,
            joliet: true,
            recorded_at: options.modified,
        }))?;
    }
    if let Some(catalog_lba) = plan.catalog_lba {
        sink.write_all(&boot_record::encode(catalog_lba))?;
    }
    sink.write_all(&primary::encode_terminator())?;

    if let (Some(catalog_lba), Some(catalog)) = (plan.catalog_lba, options.boot_catalog.as_ref()) {
        sink.pad_to_lba(catalog_lba as u64)?;
        let mut sector = catalog.clone();
        sector.resize(SECTOR_SIZE, 0);
        sink.write_all(&sector[..SECTOR_SIZE])?;
    }

    // Path tables
    let plain_entries: Vec<PathTableEntry> = plan
        .dirs
        .iter()
        .map(|d| PathTableEntry {
            identifier: d.iso_id.clone(),
            extent_lba: d.lba,
            parent: d.parent_number,
        })
        .collect();
    sink.pad_to_lba(plan.l_path_table_lba as u64)?;
    sink.write_all(&path_table::encode(&plain_entries, false))?;
    sink.pad_to_lba(plan.m_path_table_lba as u64)?;
    sink.write_all(&path_table::encode(&plain_entries, true))?;

    if options.joliet {
        let joliet_entries: Vec<PathTableEntry> = plan
            .dirs
            .iter()
            .map(|d| PathTableEntry {
                identifier: plan.joliet_ids[&d.source].clone(),
                extent_lba: d.joliet_lba,
                parent: d.parent_number,
            })
            .collect();
        sink.pad_to_lba(plan.joliet_l_path_table_lba as u64)?;
        sink.write_all(&path_table::encode(&joliet_entries, false))?;
        sink.pad_to_lba(plan.joliet_m_path_table_lba as u64)?;
        sink.write_all(&path_table::encode(&joliet_entries, true))?;
    }

    // Directory extents, plain then Joliet, with CE spills collected
    let mut ce_areas: Vec<Vec<u8>> = Vec::with_capacity(plan.dirs.len());
    for (index, dir) in plan.dirs.iter().enumerate() {
        sink.pad_to_lba(dir.lba as u64)?;
        let (bytes, ce_bytes) = build_directory(tree, options, plan, index, false)?;
        debug_assert_eq!(bytes.len() as u64, dir.size);
        debug_assert_eq!(ce_bytes.len() as u64, dir.ce_size);
        sink.write_all(&bytes)?;
        ce_areas.push(ce_bytes);
    }
    if options.joliet {
        for (index, dir) in plan.dirs.iter().enumerate() {
            sink.pad_to_lba(dir.joliet_lba as u64)?;
            let (bytes, _) = build_directory(tree, options, plan, index, true)?;
            debug_assert_eq!(bytes.len() as u64, dir.joliet_size);
            sink.write_all(&bytes)?;
        }
    }
    for (dir, ce_bytes) in plan.dirs.iter().zip(&ce_areas) {
        if !ce_bytes.is_empty() {
            sink.pad_to_lba(dir.ce_lba as u64)?;
            sink.write_all(ce_bytes)?;
        }
    }

    // File content, streamed
    let mut buffer = vec![0u8; 64 * 1024];
    for dir in &plan.dirs {
        let mut children: Vec<SourceId> = tree.children(dir.source).to_vec();
        children.sort_by(|a, b| plan.ids[a].cmp(&plan.ids[b]));
        for child in children {
            let node = tree.node(child);
            if node.kind != EntryKind::File {
                continue;
            }
            let file = &plan.files[&child];
            sink.pad_to_lba(file.lba as u64)?;
            if let Some(content) = tree.content(child) {
                let mut offset = 0u64;
                while offset < file.size {
                    let take = buffer.len().min((file.size - offset) as usize);
                    content.read_exact_at(offset, &mut buffer[..take])?;
                    sink.write_all(&buffer[..take])?;
                    offset += take as u64;
                }
            }
            sink.pad_to_sector()?;
        }
    }

    sink.pad_to_lba(plan.total_sectors)?;
    debug!(bytes = sink.written, "image serialized");
    Ok(sink.written)
}

/// Encode the 34-byte root record embedded in a volume descriptor
fn root_descriptor_record(lba: u32, size: u64, modified: &DateTime7) -> [u8; 34] {
    let bytes = record::encode(&RecordParams {
        identifier: &[0x00],
        extent_lba: lba,
        data_length: size as u32,
        flags: FileFlags {
            directory: true,
            ..Default::default()
        },
        recorded_at: *modified,
        system_use: &[],
    });
    let mut out = [0u8; 34];
    out.copy_from_slice(&bytes);
    out
}

/// Append a record to a directory extent, honoring sector boundaries
fn push_record(extent: &mut Vec<u8>, bytes: &[u8]) {
    let within = extent.len() % SECTOR_SIZE;
    if within + bytes.len() > SECTOR_SIZE {
        extent.resize(extent.len() + SECTOR_SIZE - within, 0);
    }
    extent.extend_from_slice(bytes);
}

/// Build one directory extent and its continuation area
fn build_directory(
    tree: &SourceTree,
    options: &ImageOptions,
    plan: &Plan,
    index: usize,
    joliet: bool,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let dir = &plan.dirs[index];
    let parent = &plan.dirs[usize::from(dir.parent_number) - 1];
    let (self_lba, self_size) = pick(dir, joliet);
    let (parent_lba, parent_size) = pick(parent, joliet);
    let rock_ridge = options.rock_ridge && !joliet;

    let modified = |id: SourceId| {
        let m = tree.node(id).modified;
        if m == DateTime7::default() {
            options.modified
        } else {
            m
        }
    };

    let mut extent = Vec::new();
    let mut spills: Vec<Vec<u8>> = Vec::new();

    // "." record; the root's carries the SP announcement
    let mut self_su = Vec::new();
    if rock_ridge && index == 0 {
        self_su.extend_from_slice(&rock_ridge::encode_sp());
        self_su.extend_from_slice(&rock_ridge::encode_px(DIR_MODE, 2, 0, 0));
    }
    push_record(
        &mut extent,
        &record::encode(&RecordParams {
            identifier: &[0x00],
            extent_lba: self_lba,
            data_length: self_size as u32,
            flags: dir_flags(),
            recorded_at: modified(dir.source),
            system_use: &self_su,
        }),
    );
    push_record(
        &mut extent,
        &record::encode(&RecordParams {
            identifier: &[0x01],
            extent_lba: parent_lba,
            data_length: parent_size as u32,
            flags: dir_flags(),
            recorded_at: modified(parent.source),
            system_use: &[],
        }),
    );

    // Children in identifier order; the plan already validated them
    let ids = if joliet { &plan.joliet_ids } else { &plan.ids };
    let mut children: Vec<SourceId> = tree.children(dir.source).to_vec();
    children.sort_by(|a, b| plan.ids[a].cmp(&plan.ids[b]));

    // Precompute CE offsets so each spilled record can point at its slot
    let spill_lens: Vec<usize> = if rock_ridge {
        children
            .iter()
            .filter_map(|c| {
                let node = tree.node(*c);
                let (_, spill) = rr_split(plan.ids[c].len(), &node.name);
                (spill > 0).then_some(spill)
            })
            .collect()
    } else {
        Vec::new()
    };
    let (ce_offsets, ce_total) = ce_layout(&spill_lens);
    let mut spill_index = 0usize;

    for child in children {
        let node = tree.node(child);
        let identifier = &ids[&child];
        let recorded_at = modified(child);

        let (extent_lba, data_size, is_dir) = match node.kind {
            EntryKind::Directory => {
                let child_plan = &plan.dirs[plan.dir_index[&child]];
                let (lba, size) = pick(child_plan, joliet);
                (lba, size, true)
            }
            EntryKind::File => {
                let file = &plan.files[&child];
                (file.lba, file.size, false)
            }
        };

        let mut system_use = Vec::new();
        if rock_ridge {
            let (_, spill) = rr_split(plan.ids[&child].len(), &node.name);
            let mode = if is_dir { DIR_MODE } else { FILE_MODE };
            let links = if is_dir { 2 } else { 1 };
            system_use.extend_from_slice(&rock_ridge::encode_px(mode, links, 0, 0));
            if spill > 0 {
                let offset = ce_offsets[spill_index];
                spill_index += 1;
                let mut area = Vec::with_capacity(spill);
                append_nm_chunks(&mut area, node.name.as_bytes());
                area.extend_from_slice(&rock_ridge::encode_tf(&recorded_at));
                debug_assert_eq!(area.len(), spill);
                spills.push(area);
                system_use.extend_from_slice(&rock_ridge::encode_ce(
                    dir.ce_lba + (offset / SECTOR_SIZE as u64) as u32,
                    (offset % SECTOR_SIZE as u64) as u32,
                    spill as u32,
                ));
            } else {
                system_use.extend_from_slice(&rock_ridge::encode_tf(&recorded_at));
                append_nm_chunks(&mut system_use, node.name.as_bytes());
            }
        }

        let chunks = if is_dir { 1 } else { extent_chunks(data_size) };
        let mut remaining = data_size;
        for chunk in 0..chunks {
            let this_len = if is_dir {
                data_size
            } else {
                remaining.min(MAX_EXTENT_LENGTH)
            };
            remaining = remaining.saturating_sub(this_len);
            let flags = FileFlags {
                directory: is_dir,
                hidden: node.hidden,
                not_final: chunk + 1 < chunks,
                ..Default::default()
            };
            let su: &[u8] = if chunk == 0 { &system_use } else { &[] };
            push_record(
                &mut extent,
                &record::encode(&RecordParams {
                    identifier,
                    extent_lba: extent_lba + (chunk * CHUNK_SECTORS) as u32,
                    data_length: this_len as u32,
                    flags,
                    recorded_at,
                    system_use: su,
                }),
            );
        }
    }

    // Pad the extent and assemble the continuation area
    let target = if joliet { dir.joliet_size } else { dir.size };
    debug_assert!(extent.len() as u64 <= target);
    extent.resize(target as usize, 0);

    let mut ce_area = Vec::new();
    if rock_ridge && ce_total > 0 {
        for (offset, area) in ce_offsets.iter().zip(&spills) {
            ce_area.resize(*offset as usize, 0);
            ce_area.extend_from_slice(area);
        }
        ce_area.resize(ce_total as usize, 0);
    }
    Ok((extent, ce_area))
}

fn dir_flags() -> FileFlags {
    FileFlags {
        directory: true,
        ..Default::default()
    }
}

fn pick(dir: &crate::write::layout::DirPlan, joliet: bool) -> (u32, u64) {
    if joliet {
        (dir.joliet_lba, dir.joliet_size)
    } else {
        (dir.lba, dir.size)
    }
}

/// Append NM entries for a name, splitting at the entry size limit
fn append_nm_chunks(out: &mut Vec<u8>, name: &[u8]) {
    let mut chunks = name.chunks(250).peekable();
    if name.is_empty() {
        out.extend_from_slice(&rock_ridge::encode_nm(b"", false));
        return;
    }
    while let Some(chunk) = chunks.next() {
        let continued = chunks.peek().is_some();
        out.extend_from_slice(&rock_ridge::encode_nm(chunk, continued));
    }
}
