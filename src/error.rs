//! Error types for disc image operations
//!
//! The taxonomy separates failures by blast radius: a `FormatError` kills
//! the whole open, an `EntryError` only marks one entry unreadable, a
//! `LayoutError` aborts a write before any byte is emitted, and medium
//! I/O errors are propagated unchanged (retry policy belongs to the
//! medium, not the codec).

use thiserror::Error;

/// Result type for disc image operations
pub type Result<T> = core::result::Result<T, ImageError>;

/// Top-level error for opening, reading and writing disc images
#[derive(Debug, Error)]
pub enum ImageError {
    /// Structurally invalid descriptor or table; the open fails atomically
    #[error("invalid image: {0}")]
    Format(#[from] FormatError),

    /// One entry's metadata or allocation is unresolvable
    #[error("unreadable entry: {0}")]
    Entry(#[from] EntryError),

    /// Write-path size or depth limit exceeded
    #[error("layout: {0}")]
    Layout(#[from] LayoutError),

    /// The underlying byte source failed; never retried internally
    #[error("medium I/O: {0}")]
    Medium(#[from] std::io::Error),

    /// Path lookup found no matching entry
    #[error("no entry at path {0:?}")]
    NotFound(String),
}

/// Fatal structural errors detected while opening an image
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Descriptor at the given sector lacks the "CD001" identifier
    #[error("bad volume descriptor signature at sector {sector}")]
    BadSignature {
        /// Absolute sector of the offending descriptor
        sector: u64,
    },

    /// Descriptor version field is not 1
    #[error("unsupported volume descriptor version {0}")]
    UnsupportedVersion(u8),

    /// No Primary Volume Descriptor in the descriptor set
    #[error("no primary volume descriptor")]
    MissingPrimary,

    /// No Terminator descriptor within the bounded scan window
    #[error("no terminator descriptor within {window} sectors")]
    MissingTerminator {
        /// Number of descriptor sectors scanned
        window: u64,
    },

    /// Path table is truncated or internally inconsistent
    #[error("malformed path table: {0}")]
    BadPathTable(&'static str),

    /// Root directory extent could not be parsed
    #[error("unreadable root directory")]
    UnreadableRoot,

    /// A root-level or path-table address lies outside the volume
    #[error("address out of bounds: block {block} + {blocks} blocks exceeds volume of {volume_blocks}")]
    OutOfBounds {
        /// First logical block of the offending extent
        block: u64,
        /// Extent length in blocks
        blocks: u64,
        /// Declared volume size in blocks
        volume_blocks: u64,
    },

    /// UDF descriptor tag failed its checksum or CRC
    #[error("bad descriptor tag at block {block}: {reason}")]
    BadTag {
        /// Logical block holding the tag
        block: u64,
        /// Which check failed
        reason: &'static str,
    },

    /// UDF volume descriptor sequence is missing a required descriptor
    #[error("incomplete UDF descriptor chain: missing {0}")]
    IncompleteChain(&'static str),
}

/// Per-entry errors; the entry is marked unreadable, siblings survive.
///
/// Stored on the entry and surfaced lazily when the entry is visited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    /// An extent lies outside the volume or its partition
    #[error("extent out of bounds: block {block} + {length} bytes exceeds limit of {limit_blocks} blocks")]
    OutOfBounds {
        /// First logical block of the extent
        block: u64,
        /// Extent length in bytes
        length: u64,
        /// Partition or volume size in blocks
        limit_blocks: u64,
    },

    /// Allocation descriptor references a partition number that was never declared
    #[error("unresolvable partition reference {0}")]
    UnmappedPartition(u16),

    /// Allocation descriptors are truncated or self-inconsistent
    #[error("malformed allocation descriptors")]
    BadAllocation,

    /// Directory record could not be parsed
    #[error("corrupted directory record")]
    BadRecord,

    /// Directory recursion exceeded the configured guard
    #[error("directory depth exceeds guard of {0}")]
    DepthExceeded(usize),
}

/// Write-path errors; detected by the planner before any byte is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Planned image exceeds 32-bit sector addressing
    #[error("planned volume of {sectors} sectors exceeds maximum addressable size")]
    VolumeTooLarge {
        /// Total sectors the plan requires
        sectors: u64,
    },

    /// Source hierarchy deeper than ISO9660 permits
    #[error("directory depth {depth} exceeds ISO9660 limit of {limit}")]
    DepthExceeded {
        /// Offending depth (root = 1)
        depth: usize,
        /// Format limit
        limit: usize,
    },

    /// More directories than the 16-bit path table numbering allows
    #[error("{count} directories exceed the path table limit of 65535")]
    TooManyDirectories {
        /// Directory count the plan reached
        count: usize,
    },

    /// Identifier cannot be represented even after substitution
    #[error("identifier too long: {0:?}")]
    NameTooLong(String),

    /// Source tree contains two siblings that map to the same identifier
    #[error("duplicate identifier {0:?} in one directory")]
    DuplicateName(String),

    /// Attempted to add a child under a file node
    #[error("{0:?} is not a directory")]
    NotADirectory(String),
}
