//! Descriptor scanning and format detection against written and
//! hand-assembled images

mod common;

use common::{build_image, sample_tree, tiny_iso, SECTOR};
use discfs::volume::primary;
use discfs::{DiscFormat, DiscImage, FormatError, ImageError, MemorySource};

#[test]
fn detects_all_written_formats() {
    let options = discfs::ImageOptions::default(); // joliet + rock ridge
    let image = build_image(&sample_tree(), &options);
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    assert_eq!(disc.format(), DiscFormat::RockRidge);
    assert_eq!(
        disc.formats(),
        &[DiscFormat::RockRidge, DiscFormat::Joliet, DiscFormat::Iso9660]
    );
}

#[test]
fn plain_image_detects_only_iso9660() {
    let options = discfs::ImageOptions {
        joliet: false,
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();
    assert_eq!(disc.formats(), &[DiscFormat::Iso9660]);
}

#[test]
fn volume_metadata_round_trips() {
    let options = discfs::ImageOptions {
        volume_id: "BACKUP_2026".to_string(),
        joliet: false,
        rock_ridge: false,
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let total_sectors = (image.len() / SECTOR) as u32;
    let disc = DiscImage::open(MemorySource::new(image)).unwrap();

    assert_eq!(disc.volume_id(), "BACKUP_2026");
    let info = disc.detection().primary.as_ref().unwrap();
    assert_eq!(info.logical_block_size, 2048);
    assert_eq!(info.volume_space_size, total_sectors);
    assert_eq!(info.application_id, "DISCFS");
}

#[test]
fn missing_terminator_fails_the_open() {
    let mut image = build_image(&sample_tree(), &discfs::ImageOptions::default());
    // Blank out every sector after the PVD so the set never terminates
    image[17 * SECTOR..].fill(0);
    let err = DiscImage::open(MemorySource::new(image)).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Format(FormatError::MissingTerminator { .. })
    ));
}

#[test]
fn terminator_without_primary_fails() {
    let mut image = vec![0u8; 32 * SECTOR];
    image[16 * SECTOR..17 * SECTOR].copy_from_slice(&primary::encode_terminator());
    let err = DiscImage::open(MemorySource::new(image)).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Format(FormatError::MissingPrimary)
    ));
}

#[test]
fn garbage_image_is_rejected() {
    let image = vec![0u8; 300 * SECTOR];
    let err = DiscImage::open(MemorySource::new(image)).unwrap_err();
    assert!(matches!(
        err,
        ImageError::Format(FormatError::BadSignature { sector: 16 })
    ));
}

#[test]
fn boot_record_reports_catalog_location() {
    let catalog = vec![0xAA; 64];
    let options = discfs::ImageOptions {
        boot_catalog: Some(catalog.clone()),
        ..Default::default()
    };
    let image = build_image(&sample_tree(), &options);
    let disc = DiscImage::open(MemorySource::new(image.clone())).unwrap();

    let lba = disc
        .detection()
        .primary
        .as_ref()
        .unwrap()
        .boot_catalog_lba
        .expect("catalog lba recorded");
    let start = lba as usize * SECTOR;
    assert_eq!(&image[start..start + 64], &catalog[..]);
}

#[test]
fn hand_assembled_image_opens() {
    let disc = DiscImage::open(MemorySource::new(tiny_iso(21))).unwrap();
    assert_eq!(disc.format(), DiscFormat::Iso9660);
    assert_eq!(disc.volume_id(), "TINY");
    assert!(disc.lookup("GOOD.TXT").is_some());
}
