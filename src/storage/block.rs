//! Block Cache
//!
//! The single resident block: one decompressed `BLOCK_SIZE` payload, where
//! it lives in the file, and a status tag driving flush decisions.
//!
//! ## Status transitions
//! ```text
//! Invalid ──allocate──▶ New ──append──▶ New
//!    │                   │
//!    └──load──▶ Loaded ──append──▶ Modified
//!                 ▲                   │
//!                 └──────flush────────┘   (New flushes to Loaded as well)
//! ```
//!
//! Records are read and written through explicit length-prefixed cursor
//! calls; the payload buffer is never reinterpreted as typed records.

use bytes::{Buf, BufMut, Bytes};

use crate::error::DecodeError;

use super::{BLOCK_HEADER_SIZE, BLOCK_SIZE, RECORD_HEADER_SIZE};

/// Lifecycle of the resident block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Nothing loaded or allocated yet
    Invalid,
    /// Allocated in memory, never persisted
    New,
    /// Matches what is on disk
    Loaded,
    /// Loaded from disk, then appended to
    Modified,
}

/// One decompressed block plus its file placement
#[derive(Debug)]
pub struct Block {
    status: BlockStatus,
    /// File offset of the block header
    offset: u64,
    /// On-disk payload size as of the last load or flush (0 while `New`)
    compressed_size: u32,
    /// Decompressed payload; empty while `Invalid`, otherwise BLOCK_SIZE bytes
    data: Vec<u8>,
}

impl Block {
    /// The empty cache slot
    pub fn invalid() -> Self {
        Self {
            status: BlockStatus::Invalid,
            offset: 0,
            compressed_size: 0,
            data: Vec::new(),
        }
    }

    /// Fresh zeroed block that will be written at `offset`
    pub fn new_at(offset: u64) -> Self {
        Self {
            status: BlockStatus::New,
            offset,
            compressed_size: 0,
            data: vec![0u8; BLOCK_SIZE],
        }
    }

    /// Block read back from disk
    pub fn loaded(
        offset: u64,
        compressed_size: u32,
        data: Vec<u8>,
    ) -> Result<Self, DecodeError> {
        if data.len() != BLOCK_SIZE {
            return Err(DecodeError::Corrupt(format!(
                "block at offset {} holds {} bytes, expected {}",
                offset,
                data.len(),
                BLOCK_SIZE
            )));
        }
        Ok(Self {
            status: BlockStatus::Loaded,
            offset,
            compressed_size,
            data,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// Decompressed payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_invalid(&self) -> bool {
        self.status == BlockStatus::Invalid
    }

    /// Has changes that are not on disk yet
    pub fn is_dirty(&self) -> bool {
        matches!(self.status, BlockStatus::New | BlockStatus::Modified)
    }

    /// File offset right after this block, where the next block starts
    pub fn end_offset(&self) -> u64 {
        self.offset + BLOCK_HEADER_SIZE + u64::from(self.compressed_size)
    }

    /// Record the result of a successful flush
    pub fn mark_flushed(&mut self, compressed_size: u32) {
        self.compressed_size = compressed_size;
        self.status = BlockStatus::Loaded;
    }

    // =========================================================================
    // Record Cursor API
    // =========================================================================

    /// Whether a record of `len` bytes fits at `cursor`
    pub fn fits(&self, cursor: usize, len: usize) -> bool {
        cursor
            .checked_add(RECORD_HEADER_SIZE)
            .and_then(|end| end.checked_add(len))
            .map_or(false, |end| end <= BLOCK_SIZE)
    }

    /// Write `record` at `cursor` and return the cursor past it.
    ///
    /// Caller checks `fits` first; a `New` block stays `New` until flushed.
    pub fn append_record(&mut self, cursor: usize, record: &[u8]) -> usize {
        debug_assert!(!self.is_invalid(), "append into an unallocated block");
        debug_assert!(self.fits(cursor, record.len()));

        let body = cursor + RECORD_HEADER_SIZE;
        let end = body + record.len();

        (&mut self.data[cursor..body]).put_u64_le(record.len() as u64);
        self.data[body..end].copy_from_slice(record);

        if self.status == BlockStatus::Loaded {
            self.status = BlockStatus::Modified;
        }
        end
    }

    /// Length prefix at `cursor`, `None` at the sentinel or when no header fits
    pub fn record_len_at(&self, cursor: usize) -> Option<u64> {
        if self.data.is_empty() || cursor + RECORD_HEADER_SIZE > BLOCK_SIZE {
            return None;
        }
        let len = (&self.data[cursor..cursor + RECORD_HEADER_SIZE]).get_u64_le();
        (len != 0).then_some(len)
    }

    /// Record at `cursor` and the cursor past it
    pub fn record_at(&self, cursor: usize) -> Result<Option<(Bytes, usize)>, DecodeError> {
        let len = match self.record_len_at(cursor) {
            Some(len) => len,
            None => return Ok(None),
        };
        let body = cursor + RECORD_HEADER_SIZE;
        let end = self.record_end(cursor, body, len)?;

        Ok(Some((Bytes::copy_from_slice(&self.data[body..end]), end)))
    }

    /// Scan from offset 0 to the first sentinel; that is the append cursor.
    ///
    /// A block filled to the last byte has no sentinel and yields `BLOCK_SIZE`,
    /// as does one ending with fewer than a header's worth of free bytes.
    pub fn find_sentinel(&self) -> Result<usize, DecodeError> {
        let mut cursor = 0;
        while let Some(len) = self.record_len_at(cursor) {
            let body = cursor + RECORD_HEADER_SIZE;
            cursor = self.record_end(cursor, body, len)?;
        }
        Ok(cursor)
    }

    /// Iterate over the records stored in this block
    pub fn records(&self) -> BlockRecords<'_> {
        BlockRecords {
            block: self,
            cursor: 0,
            failed: false,
        }
    }

    fn record_end(&self, cursor: usize, body: usize, len: u64) -> Result<usize, DecodeError> {
        usize::try_from(len)
            .ok()
            .and_then(|len| body.checked_add(len))
            .filter(|&end| end <= BLOCK_SIZE)
            .ok_or_else(|| {
                DecodeError::Corrupt(format!(
                    "record at {} in block {} claims {} bytes, overrunning the block",
                    cursor, self.offset, len
                ))
            })
    }
}

/// Iterator over a block's records, borrowing the payload
pub struct BlockRecords<'a> {
    block: &'a Block,
    cursor: usize,
    failed: bool,
}

impl<'a> BlockRecords<'a> {
    /// Offset of the next slot (after iteration: bytes in use)
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for BlockRecords<'a> {
    type Item = Result<&'a [u8], DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let block = self.block;
        let len = block.record_len_at(self.cursor)?;
        let body = self.cursor + RECORD_HEADER_SIZE;

        match block.record_end(self.cursor, body, len) {
            Ok(end) => {
                self.cursor = end;
                Some(Ok(&block.data[body..end]))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
