//! Byte sources backing an opened image
//!
//! Every reader component depends only on [`ExtentSource`]: a seekable,
//! range-readable, read-only byte medium. Reads take `&self`, so
//! concurrent reads of disjoint or overlapping ranges need no external
//! coordination.

use std::fs::File;
use std::io;
use std::path::Path;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;
use parking_lot::Mutex;

use crate::types::SECTOR_SIZE;

/// Abstract random-access byte medium
pub trait ExtentSource {
    /// Total size in bytes
    fn len(&self) -> u64;

    /// Read exactly `buf.len()` bytes starting at `offset`
    ///
    /// Fails with `UnexpectedEof` when the range extends past the end of
    /// the medium.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// True when the medium holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read one 2048-byte sector
pub(crate) fn read_sector<S: ExtentSource + ?Sized>(
    source: &S,
    sector: u64,
    buf: &mut [u8; SECTOR_SIZE],
) -> io::Result<()> {
    source.read_exact_at(sector * SECTOR_SIZE as u64, buf)
}

/// In-memory byte source
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap raw image bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrow the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Recover the underlying bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl ExtentSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "offset beyond medium"))?;
        let end = start.checked_add(buf.len()).filter(|&e| e <= self.data.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "read beyond end of medium")
        })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// File-backed byte source using positional reads
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
    #[cfg(not(any(unix, windows)))]
    guard: Mutex<()>,
}

impl FileSource {
    /// Open a file read-only
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_file(File::open(path)?)
    }

    /// Wrap an already opened file
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            #[cfg(not(any(unix, windows)))]
            guard: Mutex::new(()),
        })
    }
}

impl ExtentSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    #[cfg(unix)]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_exact_at(&self, offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut pos = offset;
        while !buf.is_empty() {
            let n = self.file.seek_read(buf, pos)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read beyond end of medium",
                ));
            }
            pos += n as u64;
            buf = &mut buf[n..];
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        let _guard = self.guard.lock();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// Block-device byte source over a [`gpt_disk_io::BlockIo`] backend
///
/// The backend's `&mut self` read API is serialized behind a mutex;
/// the source itself still exposes `&self` range reads.
pub struct BlockDeviceSource<B: BlockIo> {
    device: Mutex<B>,
    block_size: u64,
    len: u64,
}

impl<B: BlockIo> BlockDeviceSource<B> {
    /// Wrap a block device, capturing its geometry
    pub fn new(mut device: B) -> io::Result<Self> {
        let block_size = device.block_size().to_u64();
        let blocks = device
            .num_blocks()
            .map_err(|e| io::Error::other(format!("{e:?}")))?;
        Ok(Self {
            device: Mutex::new(device),
            block_size,
            len: blocks * block_size,
        })
    }
}

impl<B: BlockIo> ExtentSource for BlockDeviceSource<B> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if offset + buf.len() as u64 > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        let mut device = self.device.lock();
        let mut block_buf = vec![0u8; self.block_size as usize];
        let mut remaining = buf;
        let mut pos = offset;
        while !remaining.is_empty() {
            let block = pos / self.block_size;
            let in_block = (pos % self.block_size) as usize;
            device
                .read_blocks(Lba(block), &mut block_buf)
                .map_err(|e| io::Error::other(format!("{e:?}")))?;
            let take = remaining.len().min(self.block_size as usize - in_block);
            remaining[..take].copy_from_slice(&block_buf[in_block..in_block + take]);
            remaining = &mut remaining[take..];
            pos += take as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_bounds() {
        let src = MemorySource::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];
        src.read_exact_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
        assert!(src.read_exact_at(3, &mut buf).is_err());
    }

    #[test]
    fn sector_read() {
        let mut data = vec![0u8; 3 * SECTOR_SIZE];
        data[2 * SECTOR_SIZE] = 0xAB;
        let src = MemorySource::new(data);
        let mut sector = [0u8; SECTOR_SIZE];
        read_sector(&src, 2, &mut sector).unwrap();
        assert_eq!(sector[0], 0xAB);
    }
}
