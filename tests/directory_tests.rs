//! Hierarchy reading: names, extensions, lookup, streaming, and
//! per-entry error isolation

mod common;

use std::io::Read;

use common::{build_image, sample_tree, tiny_iso, tiny_rock_ridge_iso};
use discfs::{DiscImage, EntryError, EntryKind, ImageError, MemorySource};

fn read_all<S: discfs::ExtentSource>(disc: &DiscImage<S>, path: &str) -> Vec<u8> {
    let mut reader = disc.open_path(path).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn rock_ridge_names_win() {
    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let readme = disc.lookup("readme.txt").expect("entry by long name");
    let entry = disc.entry(readme);
    assert_eq!(entry.name(), "readme.txt");
    assert_eq!(entry.rock_ridge_name.as_deref(), Some("readme.txt"));
    assert_eq!(entry.plain_name, "README.TXT");
    assert_eq!(entry.kind, EntryKind::File);
}

#[test]
fn joliet_names_used_without_rock_ridge() {
    let options = discfs::ImageOptions {
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let readme = disc.lookup("readme.txt").unwrap();
    let entry = disc.entry(readme);
    assert!(entry.rock_ridge_name.is_none());
    assert_eq!(entry.joliet_name.as_deref(), Some("readme.txt"));
    assert_eq!(entry.name(), "readme.txt");
}

#[test]
fn plain_names_are_8_3_uppercase() {
    let options = discfs::ImageOptions {
        joliet: false,
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let readme = disc.lookup("README.TXT").unwrap();
    assert_eq!(disc.entry(readme).name(), "README.TXT");
    assert!(disc.lookup("sub/A.TXT").is_some());
}

#[test]
fn nested_lookup_and_content() {
    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    assert_eq!(read_all(&disc, "readme.txt"), b"hello world\n");
    assert_eq!(read_all(&disc, "sub/a.txt"), b"nested content");
    assert_eq!(read_all(&disc, "/SUB/A.TXT"), b"nested content");

    let sub = disc.lookup("sub").unwrap();
    assert_eq!(disc.entry(sub).kind, EntryKind::Directory);
    assert_eq!(disc.tree().children(sub).len(), 1);
}

#[test]
fn missing_path_reports_not_found() {
    let image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();
    let err = disc.open_path("no/such/file").unwrap_err();
    assert!(matches!(err, ImageError::NotFound(p) if p == "no/such/file"));
}

#[test]
fn long_name_survives_continuation_area() {
    let long_name = format!("{}.txt", "x".repeat(180));
    let mut tree = discfs::SourceTree::new();
    tree.add_file_bytes(tree.root(), &long_name, b"spilled".to_vec())
        .unwrap();
    let image = build_image(&tree, &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    let id = disc.lookup(&long_name).expect("long name resolved");
    assert_eq!(disc.entry(id).name(), long_name);
    assert_eq!(read_all(&disc, &long_name), b"spilled");
}

#[test]
fn out_of_bounds_extent_marks_only_that_entry() {
    // FILE.TXT points at sector 100 of a 22-sector volume
    let disc = DiscImage::open(MemorySource::new(tiny_iso(100))).unwrap();

    let bad = disc.lookup("FILE.TXT").expect("entry still listed");
    assert!(matches!(
        disc.entry(bad).error,
        Some(EntryError::OutOfBounds { .. })
    ));
    let err = disc.open_entry(bad).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Entry(EntryError::OutOfBounds { .. })
    ));

    // The sibling is untouched
    assert_eq!(read_all(&disc, "GOOD.TXT"), b"good");
}

#[test]
fn unreadable_continuation_keeps_base_record() {
    // BADCE.TXT's continuation area sits far past the 22-sector medium
    let disc = DiscImage::open(MemorySource::new(tiny_rock_ridge_iso(5000))).unwrap();

    let bad = disc.lookup("badce").expect("entry still listed");
    assert_eq!(disc.entry(bad).rock_ridge_name.as_deref(), Some("badce"));
    assert!(disc.entry(bad).error.is_none());
    assert_eq!(read_all(&disc, "good.txt"), b"good");
}

#[test]
fn deep_hierarchy_round_trips() {
    let mut tree = discfs::SourceTree::new();
    let mut dir = tree.root();
    for name in ["a", "b", "c", "d", "e", "f", "g"] {
        dir = tree.add_dir(dir, name).unwrap();
    }
    tree.add_file_bytes(dir, "leaf.txt", b"deep".to_vec()).unwrap();

    let image = build_image(&tree, &discfs::ImageOptions::default());
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();
    assert_eq!(read_all(&disc, "a/b/c/d/e/f/g/leaf.txt"), b"deep");
}
