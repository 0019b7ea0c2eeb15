//! File Layout
//!
//! Maps the block chain onto file offsets and (de)serializes the fixed-width
//! file and block headers.
//!
//! The first block starts right after the file header; every later block
//! starts right after its predecessor's header and payload. There is no free
//! space or alignment padding anywhere in the chain.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::codec::{self, BlockCodec};
use crate::error::{DecodeError, Result};

use super::block::Block;
use super::reader::ByOffsetBlockReader;
use super::{BLOCK_HEADER_SIZE, BLOCK_SIZE, FILE_HEADER_SIZE};

/// Header at offset 0 of the storage file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Offset of the tail block's header
    pub last_block_offset: u64,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            last_block_offset: FILE_HEADER_SIZE,
        }
    }
}

/// Header preceding each compressed block payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Bytes of compressed payload that follow
    pub compressed_size: u32,
    /// CRC-32C of those bytes
    pub checksum: u32,
}

impl BlockHeader {
    /// Header describing `compressed` payload bytes
    pub fn for_payload(compressed: &[u8]) -> Result<Self> {
        let compressed_size = u32::try_from(compressed.len()).map_err(|_| {
            crate::StoreError::Compression(format!(
                "compressed block of {} bytes does not fit the header",
                compressed.len()
            ))
        })?;
        Ok(Self {
            compressed_size,
            checksum: codec::checksum(compressed),
        })
    }
}

// =============================================================================
// File Header
// =============================================================================

/// Read the file header, bootstrapping a brand-new file.
///
/// An empty file yields the default header, which is also written back
/// unless the store is read-only.
pub fn read_header(file: &mut File, readonly: bool) -> Result<FileHeader> {
    file.seek(SeekFrom::Start(0))?;

    let mut buf = [0u8; FILE_HEADER_SIZE as usize];
    let read = read_up_to(file, &mut buf)?;

    if read == 0 {
        let header = FileHeader::default();
        if !readonly {
            tracing::debug!("bootstrapping empty storage file");
            write_header(file, &header)?;
        }
        return Ok(header);
    }

    if read < buf.len() {
        return Err(DecodeError::Corrupt(format!(
            "file header truncated to {} bytes",
            read
        ))
        .into());
    }

    let header: FileHeader = bincode::deserialize(&buf)?;
    if header.last_block_offset < FILE_HEADER_SIZE {
        return Err(DecodeError::Corrupt(format!(
            "last block offset {} points inside the file header",
            header.last_block_offset
        ))
        .into());
    }
    Ok(header)
}

/// Overwrite the file header in place
pub fn write_header(file: &mut File, header: &FileHeader) -> Result<()> {
    let bytes = bincode::serialize(header)?;
    debug_assert_eq!(bytes.len() as u64, FILE_HEADER_SIZE);

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&bytes)?;
    Ok(())
}

// =============================================================================
// Blocks
// =============================================================================

/// Load, verify and decompress the block whose header sits at `offset`.
///
/// Returns `Ok(None)` if fewer than a block header's worth of bytes remain:
/// the end of the chain. An impossible payload size, a checksum mismatch, a
/// payload cut short, or a bad decompressed length is corruption.
pub fn read_block_at<R>(
    reader: &mut R,
    codec: &BlockCodec,
    offset: u64,
) -> Result<Option<(BlockHeader, Block)>>
where
    R: ByOffsetBlockReader + ?Sized,
{
    let header: BlockHeader = match reader.read_at(offset, BLOCK_HEADER_SIZE as usize)? {
        Some(bytes) => bincode::deserialize(bytes)?,
        None => return Ok(None),
    };

    // Bound the size field before it sizes a read buffer
    if header.compressed_size as usize > codec.max_compressed_size() {
        tracing::warn!(offset, compressed_size = header.compressed_size, "block size out of range");
        return Err(DecodeError::Corrupt(format!(
            "block at offset {} claims {} payload bytes, at most {} are possible",
            offset,
            header.compressed_size,
            codec.max_compressed_size()
        ))
        .into());
    }

    let payload_offset = offset + BLOCK_HEADER_SIZE;
    let compressed = reader
        .read_at(payload_offset, header.compressed_size as usize)?
        .ok_or_else(|| {
            DecodeError::Corrupt(format!(
                "block at offset {} truncated: expected {} payload bytes",
                offset, header.compressed_size
            ))
        })?;

    if let Err(e) = codec::verify_checksum(compressed, header.checksum) {
        tracing::warn!(offset, compressed_size = header.compressed_size, "block checksum mismatch");
        return Err(e.into());
    }

    let data = codec.decompress(compressed, BLOCK_SIZE).map_err(|e| {
        tracing::warn!(offset, "block failed to decompress");
        e
    })?;

    let block = Block::loaded(offset, header.compressed_size, data)?;
    tracing::trace!(offset, compressed_size = header.compressed_size, "block loaded");

    Ok(Some((header, block)))
}

/// Write a block header and its compressed payload contiguously at `offset`.
///
/// Durability is the caller's job.
pub fn write_block_at(
    file: &mut File,
    offset: u64,
    header: &BlockHeader,
    compressed: &[u8],
) -> Result<()> {
    debug_assert_eq!(header.compressed_size as usize, compressed.len());

    let header_bytes = bincode::serialize(header)?;
    debug_assert_eq!(header_bytes.len() as u64, BLOCK_HEADER_SIZE);

    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&header_bytes)?;
    file.write_all(compressed)?;
    Ok(())
}

/// Fill `buf` as far as the file allows; returns the byte count
fn read_up_to(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
