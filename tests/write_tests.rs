//! Layout planning and serialization: structure of written images

mod common;

use common::{build_image, sample_tree, SECTOR};
use discfs::directory::path_table;
use discfs::volume::primary;
use discfs::{DiscImage, ImageError, LayoutError, MemorySource, SourceTree};

#[test]
fn image_is_sector_aligned_and_descriptors_in_place() {
    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    assert_eq!(image.len() % SECTOR, 0);

    // System area stays zeroed
    assert!(image[..16 * SECTOR].iter().all(|&b| b == 0));

    // PVD, SVD, terminator
    assert_eq!(image[16 * SECTOR], 1);
    assert_eq!(&image[16 * SECTOR + 1..16 * SECTOR + 6], b"CD001");
    assert_eq!(image[17 * SECTOR], 2);
    assert_eq!(&image[17 * SECTOR + 88..17 * SECTOR + 91], b"%/E");
    assert_eq!(image[18 * SECTOR], 255);
}

#[test]
fn declared_volume_size_matches_output() {
    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    let vd = primary::parse(&image[16 * SECTOR..17 * SECTOR], 16).unwrap();
    assert_eq!(vd.volume_space_size.get() as usize * SECTOR, image.len());
}

#[test]
fn path_table_is_depth_then_name_ordered() {
    let mut tree = SourceTree::new();
    let b = tree.add_dir(tree.root(), "beta").unwrap();
    let a = tree.add_dir(tree.root(), "alpha").unwrap();
    tree.add_dir(b, "inner").unwrap();
    let _ = a;

    let options = discfs::ImageOptions {
        joliet: false,
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&tree, &options);

    let vd = primary::parse(&image[16 * SECTOR..17 * SECTOR], 16).unwrap();
    let pt_start = vd.type_l_path_table_lba() as usize * SECTOR;
    let pt_size = vd.path_table_size.get() as usize;
    let entries = path_table::parse(&image[pt_start..pt_start + pt_size], false).unwrap();

    let names: Vec<&[u8]> = entries.iter().map(|e| e.identifier.as_slice()).collect();
    assert_eq!(names, vec![&[0x00][..], b"ALPHA", b"BETA", b"INNER"]);
    // INNER hangs off BETA, the third entry
    assert_eq!(entries[3].parent, 3);
    // Both byte orders agree
    let m_start = vd.type_m_path_table_lba() as usize * SECTOR;
    let m_entries = path_table::parse(&image[m_start..m_start + pt_size], true).unwrap();
    assert_eq!(entries, m_entries);
}

#[test]
fn root_directory_references_itself() {
    let options = discfs::ImageOptions {
        joliet: false,
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let vd = primary::parse(&image[16 * SECTOR..17 * SECTOR], 16).unwrap();

    let root_lba =
        u32::from_le_bytes(vd.root_directory_record[2..6].try_into().unwrap()) as usize;
    let first = discfs::directory::record::DirectoryRecord::parse(&image[root_lba * SECTOR..])
        .unwrap();
    assert!(first.is_self());
    assert_eq!(first.extent_lba() as usize, root_lba);
}

#[test]
fn colliding_identifiers_fail_planning() {
    let mut tree = SourceTree::new();
    tree.add_file_bytes(tree.root(), "read me.txt", Vec::new()).unwrap();
    tree.add_file_bytes(tree.root(), "read_me.txt", Vec::new()).unwrap();

    let err = discfs::write_image(&tree, &discfs::ImageOptions::default(), Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Layout(LayoutError::DuplicateName(_))
    ));
}

#[test]
fn depth_limit_enforced() {
    let mut tree = SourceTree::new();
    let mut dir = tree.root();
    for name in ["a", "b", "c", "d", "e", "f", "g", "h"] {
        dir = tree.add_dir(dir, name).unwrap();
    }
    let err = discfs::write_image(&tree, &discfs::ImageOptions::default(), Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Layout(LayoutError::DepthExceeded { depth: 9, limit: 8 })
    ));
}

#[test]
fn planned_extents_are_pairwise_disjoint() {
    let mut tree = sample_tree();
    tree.add_file_bytes(tree.root(), "big.bin", vec![0xA5; 3 * SECTOR + 7])
        .unwrap();
    tree.add_file_bytes(tree.root(), "empty.txt", Vec::new()).unwrap();

    let image = build_image(&tree, &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let extents: Vec<_> = disc
        .tree()
        .iter()
        .flat_map(|(_, entry)| entry.extents.iter().copied())
        .collect();
    for (i, a) in extents.iter().enumerate() {
        for b in &extents[i + 1..] {
            assert!(a.disjoint(b), "{a:?} overlaps {b:?}");
        }
    }
}

#[test]
fn path_table_numbering_overflow_rejected() {
    // 1 + 64 + 64*64 + 64*64*16 directories, past the 65535 ceiling
    let mut tree = SourceTree::new();
    for i in 0..64 {
        let a = tree.add_dir(tree.root(), &format!("a{i:02}")).unwrap();
        for j in 0..64 {
            let b = tree.add_dir(a, &format!("b{j:02}")).unwrap();
            for k in 0..16 {
                tree.add_dir(b, &format!("c{k:02}")).unwrap();
            }
        }
    }
    let err = discfs::write_image(&tree, &discfs::ImageOptions::default(), Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Layout(LayoutError::TooManyDirectories { .. })
    ));
}

#[test]
fn empty_tree_round_trips() {
    let image = build_image(&SourceTree::new(), &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();
    assert!(disc.tree().children(disc.tree().root()).is_empty());
}

#[test]
fn unicode_joliet_names_round_trip() {
    let mut tree = SourceTree::new();
    tree.add_file_bytes(tree.root(), "naïve café.txt", b"accents".to_vec())
        .unwrap();
    let options = discfs::ImageOptions {
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&tree, &options);
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let id = disc.lookup("naïve café.txt").expect("joliet name resolved");
    assert_eq!(disc.entry(id).joliet_name.as_deref(), Some("naïve café.txt"));
}

#[test]
fn file_backed_image_opens() {
    use std::io::Write;

    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&image).unwrap();
    tmp.flush().unwrap();

    let disc = DiscImage::open(discfs::FileSource::open(tmp.path()).unwrap()).unwrap();
    assert!(disc.lookup("readme.txt").is_some());
    assert!(disc.lookup("sub/a.txt").is_some());
}

#[test]
fn larger_payload_round_trips_intact() {
    use std::io::Read;

    let payload: Vec<u8> = (0..100_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let mut tree = SourceTree::new();
    tree.add_file_bytes(tree.root(), "data.bin", payload.clone()).unwrap();

    let image = build_image(&tree, &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();
    let mut reader = disc.open_path("data.bin").unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert_eq!(out, payload);
}
