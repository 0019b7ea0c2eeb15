//! Whole-file verification
//!
//! Walks the block chain from the first block, checking every checksum and
//! decompression, and cross-checks the header's tail pointer.

use std::fs::File;
use std::path::Path;

use crate::codec::BlockCodec;
use crate::config::DEFAULT_ACCELERATION;
use crate::error::{DecodeError, Result, StoreError};

use super::layout::{read_block_at, read_header, FileHeader};
use super::reader::FileBlockReader;
use super::FILE_HEADER_SIZE;

/// Per-block report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub offset: u64,
    pub compressed_size: u32,
    pub checksum: u32,
    pub record_count: u64,
    /// Bytes of the decompressed payload holding records and their headers
    pub used_bytes: usize,
}

/// Report for a whole storage file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub file_size: u64,
    pub header: FileHeader,
    pub blocks: Vec<BlockSummary>,
    pub record_count: u64,
}

impl FileSummary {
    /// Total compressed bytes across blocks
    pub fn compressed_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.compressed_size)).sum()
    }

    /// Total record bytes (with length prefixes) across blocks
    pub fn used_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.used_bytes as u64).sum()
    }
}

/// Verify every block of the file at `path` without modifying it
pub fn inspect(path: &Path) -> Result<FileSummary> {
    let mut file = File::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let file_size = file.metadata()?.len();
    let header = read_header(&mut file, true)?;

    let codec = BlockCodec::new(DEFAULT_ACCELERATION)?;
    let mut reader = FileBlockReader::new(file);

    let mut blocks = Vec::new();
    let mut record_count = 0;
    let mut offset = FILE_HEADER_SIZE;

    while let Some((block_header, block)) = read_block_at(&mut reader, &codec, offset)? {
        let mut records = block.records();
        let mut count = 0u64;
        for record in records.by_ref() {
            record?;
            count += 1;
        }

        tracing::debug!(offset, records = count, "verified block");
        blocks.push(BlockSummary {
            offset,
            compressed_size: block_header.compressed_size,
            checksum: block_header.checksum,
            record_count: count,
            used_bytes: records.cursor(),
        });
        record_count += count;
        offset = block.end_offset();
    }

    if offset < file_size {
        return Err(DecodeError::Corrupt(format!(
            "{} trailing bytes after the last block at offset {}",
            file_size - offset,
            offset
        ))
        .into());
    }

    if let Some(last) = blocks.last() {
        if last.offset != header.last_block_offset {
            return Err(DecodeError::Corrupt(format!(
                "header names block {} as the tail, chain ends with block {}",
                header.last_block_offset, last.offset
            ))
            .into());
        }
    }

    Ok(FileSummary {
        file_size,
        header,
        blocks,
        record_count,
    })
}
