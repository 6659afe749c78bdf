//! Optical disc filesystem image codec
//!
//! Reads ISO9660 images (with Joliet, Rock Ridge and UDF support) into
//! an entry tree and streams file content out of them, and writes new
//! ISO9660/Joliet/Rock Ridge images from a caller-built source
//! hierarchy.
//!
//! # Reading
//!
//! ```no_run
//! use discfs::{DiscImage, FileSource};
//! use std::io::Read;
//!
//! # fn main() -> discfs::Result<()> {
//! let image = DiscImage::open(FileSource::open("disc.iso")?)?;
//! println!("{} ({:?})", image.volume_id(), image.format());
//! let mut reader = image.open_path("docs/readme.txt")?;
//! let mut text = String::new();
//! reader.read_to_string(&mut text)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Writing
//!
//! ```no_run
//! use discfs::{write_image, ImageOptions, SourceTree};
//!
//! # fn main() -> discfs::Result<()> {
//! let mut tree = SourceTree::new();
//! let docs = tree.add_dir(tree.root(), "docs")?;
//! tree.add_file_bytes(docs, "readme.txt", b"hello".to_vec())?;
//! let out = std::fs::File::create("new.iso")?;
//! write_image(&tree, &ImageOptions::default(), out)?;
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod extensions;
pub mod source;
pub mod stream;
pub mod types;
pub mod udf;
pub mod utils;
pub mod volume;
pub mod write;

use tracing::info;

pub use error::{EntryError, FormatError, ImageError, LayoutError, Result};
pub use source::{BlockDeviceSource, ExtentSource, FileSource, MemorySource};
pub use stream::EntryReader;
pub use types::{Entry, EntryId, EntryKind, EntryTree, Extent, FileFlags};
pub use volume::{Detection, DiscFormat, VolumeInfo};
pub use write::{write_image, ImageOptions, SourceId, SourceTree};

/// Knobs for opening an image
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Directory recursion guard for UDF hierarchies
    pub udf_max_depth: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { udf_max_depth: 64 }
    }
}

/// An opened disc image: detected formats plus the entry tree of the
/// best available hierarchy
///
/// The tree is built once at open; all later operations are reads
/// against the immutable tree and the underlying byte source.
#[derive(Debug)]
pub struct DiscImage<S: ExtentSource> {
    source: S,
    detection: Detection,
    format: DiscFormat,
    tree: EntryTree,
    volume_id: String,
}

impl<S: ExtentSource> DiscImage<S> {
    /// Open an image with default options
    pub fn open(source: S) -> Result<Self> {
        Self::open_with(source, &OpenOptions::default())
    }

    /// Open an image
    ///
    /// Scans the volume descriptors, picks the richest detected format
    /// (UDF over Rock Ridge over Joliet over plain ISO9660) and builds
    /// the entry tree for it.
    pub fn open_with(source: S, options: &OpenOptions) -> Result<Self> {
        let detection = volume::scan(&source)?;
        let format = detection.best().ok_or(FormatError::MissingPrimary)?;

        let (tree, volume_id) = match format {
            DiscFormat::Udf => {
                let anchor = detection
                    .udf_anchor
                    .as_ref()
                    .ok_or(FormatError::IncompleteChain("anchor descriptor"))?;
                udf::read_tree(&source, anchor, options.udf_max_depth)?
            }
            _ => {
                let primary = detection
                    .primary
                    .as_ref()
                    .ok_or(FormatError::MissingPrimary)?;
                let rock_ridge = detection.formats.contains(&DiscFormat::RockRidge);
                let tree = directory::read_tree(
                    &source,
                    primary,
                    detection.supplementary.as_ref(),
                    rock_ridge,
                )?;
                (tree, primary.volume_id.clone())
            }
        };

        info!(
            ?format,
            volume = %volume_id,
            entries = tree.len(),
            "disc image opened"
        );
        Ok(Self {
            source,
            detection,
            format,
            tree,
            volume_id,
        })
    }

    /// Format the entry tree was built from
    pub fn format(&self) -> DiscFormat {
        self.format
    }

    /// All detected formats, in priority order
    pub fn formats(&self) -> &[DiscFormat] {
        &self.detection.formats
    }

    /// Full detection result, volume metadata included
    pub fn detection(&self) -> &Detection {
        &self.detection
    }

    /// Volume identifier
    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// The entry tree
    pub fn tree(&self) -> &EntryTree {
        &self.tree
    }

    /// Entry by index
    pub fn entry(&self, id: EntryId) -> &Entry {
        self.tree.entry(id)
    }

    /// Find an entry by slash-separated path (case-insensitive)
    pub fn lookup(&self, path: &str) -> Option<EntryId> {
        self.tree.lookup(path)
    }

    /// Stream an entry's content
    ///
    /// Entries marked unreadable during the open surface their stored
    /// error here.
    pub fn open_entry(&self, id: EntryId) -> Result<EntryReader<'_, S>> {
        EntryReader::new(&self.source, self.tree.entry(id))
    }

    /// Stream content by path
    pub fn open_path(&self, path: &str) -> Result<EntryReader<'_, S>> {
        let id = self
            .lookup(path)
            .ok_or_else(|| ImageError::NotFound(path.to_string()))?;
        self.open_entry(id)
    }

    /// Recover the underlying byte source
    pub fn into_source(self) -> S {
        self.source
    }
}
