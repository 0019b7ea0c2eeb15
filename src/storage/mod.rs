//! Storage Module
//!
//! Single-file block storage: header, chain of compressed blocks, and the
//! one-block cache used by the engine.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ FileHeader (8 bytes)                   │
//! │   last_block_offset: u64               │
//! ├────────────────────────────────────────┤
//! │ Block                                  │
//! │ ┌──────────────────┬─────────────────┐ │
//! │ │ compressed_size  │ checksum        │ │
//! │ │ u32              │ u32 (CRC-32C)   │ │
//! │ └──────────────────┴─────────────────┘ │
//! │   compressed payload (LZ4)             │
//! ├────────────────────────────────────────┤
//! │ ... (next block follows immediately)   │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Block Payload (decompressed, always BLOCK_SIZE bytes)
//! ```text
//! [length: u64][record bytes] [length: u64][record bytes] ... [0u64] 0-padding
//! ```
//! A zero length is the sentinel: no more records in this block.
//!
//! All integers are little-endian.

mod block;
mod inspect;
mod layout;
mod reader;

pub use block::{Block, BlockRecords, BlockStatus};
pub use inspect::{inspect, BlockSummary, FileSummary};
pub use layout::{
    read_block_at, read_header, write_block_at, write_header, BlockHeader, FileHeader,
};
pub use reader::{ByOffsetBlockReader, FileBlockReader, MmapBlockReader};

// =============================================================================
// Format Constants
// =============================================================================

/// Decompressed size of every block
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Encoded size of `FileHeader`
pub const FILE_HEADER_SIZE: u64 = 8;

/// Encoded size of `BlockHeader`
pub const BLOCK_HEADER_SIZE: u64 = 8;

/// Encoded size of a record's length prefix
pub const RECORD_HEADER_SIZE: usize = 8;

/// Largest record payload that fits in one block
pub const MAX_RECORD_SIZE: usize = BLOCK_SIZE - RECORD_HEADER_SIZE;
