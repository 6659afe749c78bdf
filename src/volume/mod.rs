//! Volume descriptor scanning and format detection
//!
//! The descriptor set starts at sector 16, one descriptor per sector,
//! and ends with a Terminator. Joliet lives in a Supplementary
//! descriptor within the same set; UDF is detected independently via
//! its anchor at sector 256, so hybrid media report both.

pub mod boot_record;
pub mod primary;

use tracing::{debug, trace, warn};

use crate::directory::record::DirectoryRecord;
use crate::error::{FormatError, Result};
use crate::extensions::{joliet, rock_ridge};
use crate::source::{read_sector, ExtentSource};
use crate::types::{DESCRIPTOR_SCAN_WINDOW, SECTOR_SIZE, VOLUME_DESCRIPTOR_START};
use crate::udf::descriptor::UdfAnchor;
use crate::utils::string;

/// Filesystem flavors an image may carry, in tree-selection priority
/// order: UDF > Rock Ridge > Joliet > plain ISO9660
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiscFormat {
    /// UDF (ECMA-167)
    Udf,
    /// ISO9660 with Rock Ridge system-use extensions
    RockRidge,
    /// ISO9660 with a Joliet supplementary hierarchy
    Joliet,
    /// Plain ISO9660
    Iso9660,
}

/// Parsed volume metadata from a Primary or Supplementary descriptor
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Volume identifier, trimmed
    pub volume_id: String,

    /// System identifier, trimmed
    pub system_id: String,

    /// Application identifier, trimmed
    pub application_id: String,

    /// Logical block size (usually 2048)
    pub logical_block_size: u16,

    /// Volume space size in logical blocks
    pub volume_space_size: u32,

    /// Path table size in bytes
    pub path_table_size: u32,

    /// Type L path table location
    pub path_table_lba: u32,

    /// Root directory extent location
    pub root_extent_lba: u32,

    /// Root directory extent length in bytes
    pub root_extent_len: u32,

    /// El Torito boot catalog LBA, when a Boot Record descriptor exists
    pub boot_catalog_lba: Option<u32>,
}

/// Result of scanning the descriptor area
#[derive(Debug, Clone)]
pub struct Detection {
    /// Detected formats in priority order
    pub formats: Vec<DiscFormat>,

    /// Primary descriptor metadata
    pub primary: Option<VolumeInfo>,

    /// Joliet supplementary metadata
    pub supplementary: Option<VolumeInfo>,

    /// UDF anchor contents, when sector 256 (or its mirror) holds one
    pub udf_anchor: Option<UdfAnchor>,
}

impl Detection {
    /// Best available format for tree selection
    pub fn best(&self) -> Option<DiscFormat> {
        self.formats.first().copied()
    }
}

/// Identifiers used by the ECMA-167 volume recognition sequence; these
/// may legitimately follow the ISO9660 descriptors on hybrid media
const VRS_IDENTIFIERS: [&[u8; 5]; 5] = [b"BEA01", b"NSR02", b"NSR03", b"BOOT2", b"TEA01"];

/// Scan the volume descriptor area and probe the UDF anchor
///
/// Fails with [`FormatError::MissingTerminator`] when ISO9660
/// descriptors never terminate inside the scan window, and with
/// [`FormatError::MissingPrimary`] when the image is ISO9660-only but
/// carries no Primary descriptor.
pub fn scan<S: ExtentSource>(source: &S) -> Result<Detection> {
    let mut buffer = [0u8; SECTOR_SIZE];
    let mut primary: Option<VolumeInfo> = None;
    let mut supplementary: Option<VolumeInfo> = None;
    let mut boot_catalog_lba: Option<u32> = None;
    let mut saw_cd001 = false;
    let mut terminated = false;

    for offset in 0..DESCRIPTOR_SCAN_WINDOW {
        let sector = VOLUME_DESCRIPTOR_START + offset;
        if (sector + 1) * SECTOR_SIZE as u64 > source.len() {
            break;
        }
        read_sector(source, sector, &mut buffer)?;

        let identifier: &[u8] = &buffer[1..6];
        if identifier == b"CD001" {
            saw_cd001 = true;
            match buffer[0] {
                0 => {
                    if let Some(record) = boot_record::parse(&buffer) {
                        debug!(catalog_lba = record.catalog_lba(), "el torito boot record");
                        boot_catalog_lba = Some(record.catalog_lba());
                    }
                }
                1 => {
                    let vd = primary::parse(&buffer, sector)?;
                    primary = Some(volume_info(vd, &buffer, false));
                }
                2 => {
                    let vd = primary::parse(&buffer, sector)?;
                    if let Some(level) = vd.joliet_level() {
                        debug!(level, "joliet supplementary descriptor");
                        supplementary = Some(volume_info(vd, &buffer, true));
                    } else {
                        trace!(sector, "supplementary descriptor without joliet escapes");
                    }
                }
                255 => {
                    terminated = true;
                    break;
                }
                other => {
                    trace!(sector, type_code = other, "skipping descriptor");
                }
            }
        } else if VRS_IDENTIFIERS.iter().any(|id| identifier == &id[..]) {
            // ECMA-167 recognition descriptor; UDF presence is decided
            // by the anchor probe, not by these.
            trace!(sector, "volume recognition descriptor");
            if identifier == b"TEA01" {
                break;
            }
        } else {
            trace!(sector, "unrecognized descriptor area contents");
            break;
        }
    }

    if saw_cd001 && !terminated {
        return Err(FormatError::MissingTerminator {
            window: DESCRIPTOR_SCAN_WINDOW,
        }
        .into());
    }

    if let Some(info) = primary.as_mut() {
        info.boot_catalog_lba = boot_catalog_lba;
    }

    let udf_anchor = crate::udf::descriptor::probe_anchor(source)?;

    if primary.is_none() && udf_anchor.is_none() {
        return Err(if saw_cd001 {
            FormatError::MissingPrimary.into()
        } else {
            FormatError::BadSignature {
                sector: VOLUME_DESCRIPTOR_START,
            }
            .into()
        });
    }

    // A damaged ISO9660 root must not block the UDF tree on hybrid media
    let rock_ridge = match primary.as_ref() {
        Some(info) => match detect_rock_ridge(source, info) {
            Ok(found) => found,
            Err(e) if udf_anchor.is_some() => {
                warn!(error = %e, "iso9660 root unreadable, keeping udf");
                false
            }
            Err(e) => return Err(e),
        },
        None => false,
    };

    let mut formats = Vec::new();
    if udf_anchor.is_some() {
        formats.push(DiscFormat::Udf);
    }
    if primary.is_some() && rock_ridge {
        formats.push(DiscFormat::RockRidge);
    }
    if supplementary.is_some() {
        formats.push(DiscFormat::Joliet);
    }
    if primary.is_some() {
        formats.push(DiscFormat::Iso9660);
    }
    debug!(?formats, "detected disc formats");

    Ok(Detection {
        formats,
        primary,
        supplementary,
        udf_anchor,
    })
}

fn volume_info(vd: &primary::VolumeDescriptor, raw: &[u8; SECTOR_SIZE], joliet: bool) -> VolumeInfo {
    let root = DirectoryRecord::parse(&vd.root_directory_record);
    let (root_extent_lba, root_extent_len) = match root {
        Ok(record) => (record.extent_lba(), record.data_length()),
        Err(_) => (0, 0),
    };
    // Application identifier field (ECMA-119 8.4.22)
    let application = &raw[574..702];
    let (volume_id, system_id, application_id) = if joliet {
        (
            joliet::decode_ucs2_be(&vd.volume_id).trim_end().to_string(),
            String::new(),
            joliet::decode_ucs2_be(application).trim_end().to_string(),
        )
    } else {
        (
            string::dchars_to_str(&vd.volume_id)
                .unwrap_or_default()
                .to_string(),
            string::dchars_to_str(&vd.system_id)
                .unwrap_or_default()
                .to_string(),
            string::dchars_to_str(application)
                .unwrap_or_default()
                .to_string(),
        )
    };
    VolumeInfo {
        volume_id,
        system_id,
        application_id,
        logical_block_size: vd.logical_block_size.get(),
        volume_space_size: vd.volume_space_size.get(),
        path_table_size: vd.path_table_size.get(),
        path_table_lba: vd.type_l_path_table_lba(),
        root_extent_lba,
        root_extent_len,
        boot_catalog_lba: None,
    }
}

/// Rock Ridge announces itself with an SP entry in the system-use area
/// of the root directory's first ("." ) record
fn detect_rock_ridge<S: ExtentSource>(source: &S, info: &VolumeInfo) -> Result<bool> {
    if info.root_extent_lba == 0 || info.root_extent_len == 0 {
        return Err(FormatError::UnreadableRoot.into());
    }
    let mut buffer = [0u8; SECTOR_SIZE];
    read_sector(source, info.root_extent_lba as u64, &mut buffer)?;
    let record = match DirectoryRecord::parse(&buffer) {
        Ok(r) => r,
        Err(_) => {
            warn!("root directory first record unparseable");
            return Err(FormatError::UnreadableRoot.into());
        }
    };
    Ok(rock_ridge::has_sp_entry(record.system_use()))
}
