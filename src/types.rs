//! Common types and constants shared by the read and write paths

use crate::error::EntryError;
use crate::utils::datetime::DateTime7;

/// ISO9660 sector size (always 2048 bytes)
pub const SECTOR_SIZE: usize = 2048;

/// Volume descriptor set starts at sector 16
pub const VOLUME_DESCRIPTOR_START: u64 = 16;

/// Bounded scan window for the descriptor set; no Terminator within
/// this many sectors fails the open
pub const DESCRIPTOR_SCAN_WINDOW: u64 = 64;

/// UDF anchor volume descriptor pointer lives at logical sector 256
pub const UDF_ANCHOR_SECTOR: u64 = 256;

/// Maximum path length
pub const MAX_PATH_LENGTH: usize = 255;

/// Maximum directory depth for strict ISO9660
pub const MAX_DIRECTORY_DEPTH: usize = 8;

/// Largest extent a single directory record can describe, rounded down
/// to a sector multiple; longer files become multi-extent chains
pub const MAX_EXTENT_LENGTH: u64 = 0xFFFF_F800;

/// A contiguous run of logical blocks holding entry content
///
/// Blocks are volume-absolute: the UDF reader resolves partition-relative
/// addresses before building extents, so the stream resolver never needs
/// partition context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First logical block (volume-absolute)
    pub block: u64,

    /// Byte offset within the first block; nonzero only for content
    /// embedded inside a UDF information control block
    pub offset: u64,

    /// Length in bytes
    pub length: u64,

    /// Partition reference the extent was resolved from (0 for ISO9660)
    pub partition: u16,
}

impl Extent {
    /// Create a new block-aligned extent in partition 0
    pub fn new(block: u64, length: u64) -> Self {
        Self {
            block,
            offset: 0,
            length,
            partition: 0,
        }
    }

    /// Number of sectors covered
    pub fn sector_count(&self) -> u64 {
        (self.offset + self.length).div_ceil(SECTOR_SIZE as u64)
    }

    /// End block (exclusive)
    pub fn end_block(&self) -> u64 {
        self.block + self.sector_count()
    }

    /// Whether two extents cover disjoint block ranges
    pub fn disjoint(&self, other: &Extent) -> bool {
        self.end_block() <= other.block || other.end_block() <= self.block
    }
}

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// File flags from the directory record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileFlags {
    /// Hidden file
    pub hidden: bool,

    /// Directory (not a file)
    pub directory: bool,

    /// Associated file
    pub associated: bool,

    /// Extended attribute record format
    pub extended_format: bool,

    /// Owner/group permissions in extended attributes
    pub extended_permissions: bool,

    /// Not the final directory record for this file (multi-extent chain)
    pub not_final: bool,
}

impl FileFlags {
    /// Decode the record flags byte
    pub fn from_byte(b: u8) -> Self {
        Self {
            hidden: b & 0x01 != 0,
            directory: b & 0x02 != 0,
            associated: b & 0x04 != 0,
            extended_format: b & 0x08 != 0,
            extended_permissions: b & 0x10 != 0,
            not_final: b & 0x80 != 0,
        }
    }

    /// Encode into the record flags byte
    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.hidden {
            b |= 0x01;
        }
        if self.directory {
            b |= 0x02;
        }
        if self.associated {
            b |= 0x04;
        }
        if self.extended_format {
            b |= 0x08;
        }
        if self.extended_permissions {
            b |= 0x10;
        }
        if self.not_final {
            b |= 0x80;
        }
        b
    }
}

/// Index of an entry in its [`EntryTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    /// Arena index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One node of the entry tree
///
/// Parent and children are arena indices, never owning pointers: the
/// format's own self/parent records are cyclic at the root, and indices
/// sidestep the ownership problem entirely.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Plain ISO9660 identifier (8.3 d-characters), version suffix
    /// stripped; for UDF trees, the file identifier. Never discarded
    /// even when an alternate name is present.
    pub plain_name: String,

    /// Rock Ridge alternate name, when an NM field decorated the record
    pub rock_ridge_name: Option<String>,

    /// Joliet name from the supplementary hierarchy, when present
    pub joliet_name: Option<String>,

    /// File or directory
    pub kind: EntryKind,

    /// Content size in bytes (sum across a multi-extent chain)
    pub size: u64,

    /// Recording timestamp
    pub recorded_at: DateTime7,

    /// Record flags
    pub flags: FileFlags,

    /// Rock Ridge symlink target, when an SL field decorated the record
    pub symlink_target: Option<String>,

    /// Ordered, volume-absolute extents holding the content
    pub extents: Vec<Extent>,

    /// Parent entry index; the root is its own parent
    pub parent: EntryId,

    /// Child entry indices (directories only)
    pub children: Vec<EntryId>,

    /// Set when the entry's metadata or allocation was unresolvable;
    /// surfaced when the entry is visited, siblings are unaffected
    pub error: Option<EntryError>,
}

impl Entry {
    /// Canonical name: Rock Ridge wins, then Joliet, then the plain
    /// identifier as fallback
    pub fn name(&self) -> &str {
        self.rock_ridge_name
            .as_deref()
            .or(self.joliet_name.as_deref())
            .unwrap_or(&self.plain_name)
    }

    /// Is this a directory?
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Arena of entries forming the filesystem tree of an opened image
///
/// Built once per open and immutable afterwards.
#[derive(Debug, Clone)]
pub struct EntryTree {
    entries: Vec<Entry>,
    root: EntryId,
}

impl EntryTree {
    pub(crate) fn new(root_entry: Entry) -> Self {
        Self {
            entries: vec![root_entry],
            root: EntryId(0),
        }
    }

    pub(crate) fn push(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(entry);
        id
    }

    pub(crate) fn attach(&mut self, parent: EntryId, child: EntryId) {
        self.entries[child.index()].parent = parent;
        self.entries[parent.index()].children.push(child);
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.index()]
    }

    /// Root directory entry index
    pub fn root(&self) -> EntryId {
        self.root
    }

    /// Entry by index
    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.index()]
    }

    /// Child indices of a directory entry
    pub fn children(&self, id: EntryId) -> &[EntryId] {
        &self.entries[id.index()].children
    }

    /// Total number of entries, root included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the tree holds only the root
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    /// Iterate all entries with their indices, in arena order
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (EntryId(i as u32), e))
    }

    /// Find an entry by slash-separated path
    ///
    /// Matching is case-insensitive and accepts any of the entry's names
    /// (canonical or plain fallback). Empty components are ignored, so
    /// `""`, `"/"` and `"//"` all resolve to the root.
    pub fn lookup(&self, path: &str) -> Option<EntryId> {
        let mut current = self.root;
        for component in path.split(['/', '\\']).filter(|c| !c.is_empty()) {
            let next = self
                .children(current)
                .iter()
                .copied()
                .find(|&child| {
                    let e = self.entry(child);
                    e.name().eq_ignore_ascii_case(component)
                        || e.plain_name.eq_ignore_ascii_case(component)
                })?;
            current = next;
        }
        Some(current)
    }

    /// Depth of an entry, root = 1
    pub fn depth(&self, id: EntryId) -> usize {
        let mut depth = 1;
        let mut current = id;
        while current != self.root {
            current = self.entry(current).parent;
            depth += 1;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str) -> Entry {
        Entry {
            plain_name: name.to_string(),
            rock_ridge_name: None,
            joliet_name: None,
            kind: EntryKind::Directory,
            size: 0,
            recorded_at: DateTime7::default(),
            flags: FileFlags {
                directory: true,
                ..FileFlags::default()
            },
            symlink_target: None,
            extents: Vec::new(),
            parent: EntryId(0),
            children: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut tree = EntryTree::new(dir(""));
        let sub = tree.push(dir("SUB"));
        tree.attach(tree.root(), sub);

        assert_eq!(tree.lookup("/sub"), Some(sub));
        assert_eq!(tree.lookup("SUB"), Some(sub));
        assert_eq!(tree.lookup("//SUB/"), Some(sub));
        assert_eq!(tree.lookup("/missing"), None);
    }

    #[test]
    fn root_paths_resolve_to_root() {
        let tree = EntryTree::new(dir(""));
        for path in ["", "/", "//", "\\"] {
            assert_eq!(tree.lookup(path), Some(tree.root()));
        }
    }

    #[test]
    fn name_priority_prefers_rock_ridge() {
        let mut e = dir("SUB");
        e.joliet_name = Some("Sub Directory".into());
        assert_eq!(e.name(), "Sub Directory");
        e.rock_ridge_name = Some("sub-directory".into());
        assert_eq!(e.name(), "sub-directory");
        assert_eq!(e.plain_name, "SUB");
    }

    #[test]
    fn extent_disjointness() {
        let a = Extent::new(10, 4096);
        let b = Extent::new(12, 2048);
        let c = Extent::new(11, 100);
        assert!(a.disjoint(&b));
        assert!(!a.disjoint(&c));
    }
}
