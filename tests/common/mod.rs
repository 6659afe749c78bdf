//! Shared fixtures: written-and-reopened images plus hand-assembled
//! minimal images for failure-path coverage

use discfs::directory::path_table::{self, PathTableEntry};
use discfs::directory::record::{self, RecordParams};
use discfs::extensions::rock_ridge;
use discfs::utils::datetime::DateTime7;
use discfs::volume::primary::{self, VolumeDescriptorParams};
use discfs::{write_image, FileFlags, ImageOptions, SourceTree};

pub const SECTOR: usize = 2048;

/// Serialize a source tree to image bytes
pub fn build_image(tree: &SourceTree, options: &ImageOptions) -> Vec<u8> {
    let mut out = Vec::new();
    write_image(tree, options, &mut out).expect("image serializes");
    out
}

/// A small hierarchy exercising nesting and mixed names
pub fn sample_tree() -> SourceTree {
    let mut tree = SourceTree::new();
    tree.add_file_bytes(tree.root(), "readme.txt", b"hello world\n".to_vec())
        .unwrap();
    let sub = tree.add_dir(tree.root(), "sub").unwrap();
    tree.add_file_bytes(sub, "a.txt", b"nested content".to_vec())
        .unwrap();
    tree
}

fn put(image: &mut [u8], sector: usize, data: &[u8]) {
    image[sector * SECTOR..sector * SECTOR + data.len()].copy_from_slice(data);
}

/// Hand-assemble a 22-sector plain ISO9660 image
///
/// The root holds GOOD.TXT (4 bytes at sector 21) and FILE.TXT whose
/// extent starts at `file_extent_lba`, letting callers point it out of
/// bounds.
pub fn tiny_iso(file_extent_lba: u32) -> Vec<u8> {
    let mut image = vec![0u8; 22 * SECTOR];

    let table = vec![PathTableEntry {
        identifier: vec![0x00],
        extent_lba: 20,
        parent: 1,
    }];
    let table_bytes_l = path_table::encode(&table, false);
    let table_bytes_m = path_table::encode(&table, true);

    let dir_flags = FileFlags {
        directory: true,
        ..Default::default()
    };
    let mut root_record = [0u8; 34];
    root_record.copy_from_slice(&record::encode(&RecordParams {
        identifier: &[0x00],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));

    put(
        &mut image,
        16,
        &primary::encode(&VolumeDescriptorParams {
            type_code: 1,
            volume_id: "TINY",
            system_id: "TEST",
            volume_space_size: 22,
            path_table_size: table_bytes_l.len() as u32,
            type_l_path_table: 18,
            type_m_path_table: 19,
            root_record,
            joliet: false,
            recorded_at: DateTime7::default(),
        }),
    );
    put(&mut image, 17, &primary::encode_terminator());
    put(&mut image, 18, &table_bytes_l);
    put(&mut image, 19, &table_bytes_m);

    let mut dir = Vec::new();
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: &[0x00],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: &[0x01],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: b"FILE.TXT;1",
        extent_lba: file_extent_lba,
        data_length: 5,
        flags: FileFlags::default(),
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: b"GOOD.TXT;1",
        extent_lba: 21,
        data_length: 4,
        flags: FileFlags::default(),
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));
    put(&mut image, 20, &dir);
    put(&mut image, 21, b"good");

    image
}

/// Hand-assemble a 22-sector Rock Ridge image
///
/// The root's "." record carries SP. BADCE.TXT carries an in-record NM
/// plus a CE pointing at `ce_block`, letting callers aim the
/// continuation area off the medium; GOOD.TXT carries a plain NM.
pub fn tiny_rock_ridge_iso(ce_block: u32) -> Vec<u8> {
    let mut image = vec![0u8; 22 * SECTOR];

    let table = vec![PathTableEntry {
        identifier: vec![0x00],
        extent_lba: 20,
        parent: 1,
    }];
    let table_bytes_l = path_table::encode(&table, false);
    let table_bytes_m = path_table::encode(&table, true);

    let dir_flags = FileFlags {
        directory: true,
        ..Default::default()
    };
    let mut root_record = [0u8; 34];
    root_record.copy_from_slice(&record::encode(&RecordParams {
        identifier: &[0x00],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));

    put(
        &mut image,
        16,
        &primary::encode(&VolumeDescriptorParams {
            type_code: 1,
            volume_id: "TINYRR",
            system_id: "TEST",
            volume_space_size: 22,
            path_table_size: table_bytes_l.len() as u32,
            type_l_path_table: 18,
            type_m_path_table: 19,
            root_record,
            joliet: false,
            recorded_at: DateTime7::default(),
        }),
    );
    put(&mut image, 17, &primary::encode_terminator());
    put(&mut image, 18, &table_bytes_l);
    put(&mut image, 19, &table_bytes_m);

    let mut dir = Vec::new();
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: &[0x00],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &rock_ridge::encode_sp(),
    }));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: &[0x01],
        extent_lba: 20,
        data_length: SECTOR as u32,
        flags: dir_flags,
        recorded_at: DateTime7::default(),
        system_use: &[],
    }));
    let mut bad_su = Vec::new();
    bad_su.extend_from_slice(&rock_ridge::encode_nm(b"badce", true));
    bad_su.extend_from_slice(&rock_ridge::encode_ce(ce_block, 0, 40));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: b"BADCE.TXT;1",
        extent_lba: 21,
        data_length: 4,
        flags: FileFlags::default(),
        recorded_at: DateTime7::default(),
        system_use: &bad_su,
    }));
    dir.extend_from_slice(&record::encode(&RecordParams {
        identifier: b"GOOD.TXT;1",
        extent_lba: 21,
        data_length: 4,
        flags: FileFlags::default(),
        recorded_at: DateTime7::default(),
        system_use: &rock_ridge::encode_nm(b"good.txt", false),
    }));
    put(&mut image, 20, &dir);
    put(&mut image, 21, b"good");

    image
}
