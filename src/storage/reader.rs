//! Block readers
//!
//! Positional reads of raw block bytes, either through the file handle or
//! through a read-only memory mapping. The engine picks one at open time and
//! only ever talks to the trait.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use memmap2::Mmap;

use crate::error::Result;

/// Reads byte ranges of the storage file by absolute offset
pub trait ByOffsetBlockReader {
    /// Read exactly `len` bytes at `offset`.
    ///
    /// Returns `Ok(None)` when the file ends before `offset + len`; that is
    /// the normal end-of-chain signal, not an error.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Option<&[u8]>>;
}

// =============================================================================
// File-backed reader
// =============================================================================

/// Reader issuing seek + read system calls
pub struct FileBlockReader {
    file: File,
    buf: Vec<u8>,
}

impl FileBlockReader {
    pub fn new(file: File) -> Self {
        Self {
            file,
            buf: Vec::new(),
        }
    }
}

impl ByOffsetBlockReader for FileBlockReader {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Option<&[u8]>> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.buf.resize(len, 0);

        // Short reads are retried until EOF
        let mut filled = 0;
        while filled < len {
            match self.file.read(&mut self.buf[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Some(&self.buf[..len]))
    }
}

// =============================================================================
// Memory-mapped reader
// =============================================================================

/// Reader addressing a read-only mapping of the whole file
pub struct MmapBlockReader {
    /// `None` for an empty file, which cannot be mapped on every platform
    map: Option<Mmap>,
}

impl MmapBlockReader {
    /// Map `file` once for the lifetime of the reader
    pub fn new(file: &File) -> Result<Self> {
        let map = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: the store is opened read-only and callers guarantee no
            // writer runs concurrently, so the mapped bytes do not change.
            Some(unsafe { Mmap::map(file)? })
        };
        Ok(Self { map })
    }

    /// Size of the mapping in bytes
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByOffsetBlockReader for MmapBlockReader {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Option<&[u8]>> {
        let map = match &self.map {
            Some(map) => map,
            None => return Ok(None),
        };

        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(len).map(|end| start..end))
            .filter(|range| range.end <= map.len());

        Ok(range.map(|range| &map[range]))
    }
}
