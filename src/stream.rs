//! Streaming access to entry content
//!
//! An [`EntryReader`] adapts an entry's extent list to `io::Read` and
//! `io::Seek`, so callers stream file content without loading whole
//! files. Reads crossing extent boundaries are split transparently.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{ImageError, Result};
use crate::source::ExtentSource;
use crate::types::{Entry, Extent, SECTOR_SIZE};

/// Reader over one entry's content
#[derive(Debug)]
pub struct EntryReader<'a, S: ExtentSource + ?Sized> {
    source: &'a S,
    extents: Vec<Extent>,
    size: u64,
    pos: u64,
}

impl<'a, S: ExtentSource + ?Sized> EntryReader<'a, S> {
    /// Open a reader over an entry's extents
    ///
    /// An entry marked unreadable during the open surfaces its stored
    /// error here; healthy siblings are unaffected.
    pub(crate) fn new(source: &'a S, entry: &Entry) -> Result<Self> {
        if let Some(e) = &entry.error {
            return Err(ImageError::Entry(e.clone()));
        }
        Ok(Self {
            source,
            extents: entry.extents.clone(),
            size: entry.size,
            pos: 0,
        })
    }

    /// Content size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Locate the extent containing `pos` and the offset within it
    fn locate(&self, pos: u64) -> Option<(usize, u64)> {
        let mut base = 0u64;
        for (i, extent) in self.extents.iter().enumerate() {
            if pos < base + extent.length {
                return Some((i, pos - base));
            }
            base += extent.length;
        }
        None
    }
}

impl<S: ExtentSource + ?Sized> Read for EntryReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let Some((index, within)) = self.locate(self.pos) else {
            return Ok(0);
        };
        let extent = self.extents[index];
        let remaining_in_extent = extent.length - within;
        let remaining_total = self.size - self.pos;
        let take = (buf.len() as u64)
            .min(remaining_in_extent)
            .min(remaining_total) as usize;

        let offset = extent.block * SECTOR_SIZE as u64 + extent.offset + within;
        self.source.read_exact_at(offset, &mut buf[..take])?;
        self.pos += take as u64;
        Ok(take)
    }
}

impl<S: ExtentSource + ?Sized> Seek for EntryReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(n) => {
                // Seeking past the end is allowed; reads there return 0
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            )),
        }
    }
}
