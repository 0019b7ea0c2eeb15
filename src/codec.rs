//! Block Codec
//!
//! LZ4 compression of fixed-size block payloads and CRC-32C checksums over
//! the compressed bytes.
//!
//! The checksum algorithm is part of the file format: CRC-32C (Castagnoli),
//! computed over exactly the `compressed_size` bytes following a block header.

use lz4::block::{self, CompressionMode};

use crate::error::{DecodeError, Result, StoreError};
use crate::storage::BLOCK_SIZE;

/// Compresses and decompresses block payloads
///
/// Owns a scratch buffer sized to the LZ4 worst-case bound for `BLOCK_SIZE`
/// input, so compression never reallocates.
pub struct BlockCodec {
    /// LZ4 acceleration (>= 1)
    acceleration: i32,
    /// Output buffer for compression, `compress_bound(BLOCK_SIZE)` bytes
    scratch: Vec<u8>,
}

impl BlockCodec {
    /// Create a codec with the given acceleration
    pub fn new(acceleration: i32) -> Result<Self> {
        let bound = block::compress_bound(BLOCK_SIZE)
            .map_err(|e| StoreError::Compression(format!("cannot size output buffer: {}", e)))?;

        Ok(Self {
            acceleration: acceleration.max(1),
            scratch: vec![0u8; bound],
        })
    }

    /// Get the acceleration level
    pub fn acceleration(&self) -> i32 {
        self.acceleration
    }

    /// Largest compressed payload a full block can produce
    pub fn max_compressed_size(&self) -> usize {
        self.scratch.len()
    }

    /// Compress a full block payload
    ///
    /// The returned slice borrows the codec's scratch buffer and is valid
    /// until the next call.
    pub fn compress(&mut self, payload: &[u8]) -> Result<&[u8]> {
        if payload.len() != BLOCK_SIZE {
            return Err(StoreError::Compression(format!(
                "payload is {} bytes, expected {}",
                payload.len(),
                BLOCK_SIZE
            )));
        }

        let written = block::compress_to_buffer(
            payload,
            Some(CompressionMode::FAST(self.acceleration)),
            false,
            &mut self.scratch,
        )
        .map_err(|e| StoreError::Compression(e.to_string()))?;

        Ok(&self.scratch[..written])
    }

    /// Decompress into a freshly allocated buffer of exactly `expected_size` bytes
    pub fn decompress(
        &self,
        compressed: &[u8],
        expected_size: usize,
    ) -> std::result::Result<Vec<u8>, DecodeError> {
        let mut out = vec![0u8; expected_size];
        self.decompress_into(compressed, &mut out)?;
        Ok(out)
    }

    /// Decompress into `out`; anything but exactly `out.len()` bytes is corruption
    pub fn decompress_into(
        &self,
        compressed: &[u8],
        out: &mut [u8],
    ) -> std::result::Result<(), DecodeError> {
        let expected = out.len();
        let expected_i32 = i32::try_from(expected)
            .map_err(|_| DecodeError::Corrupt(format!("block size {} too large", expected)))?;

        let written = block::decompress_to_buffer(compressed, Some(expected_i32), out)
            .map_err(|e| DecodeError::Corrupt(format!("decompression failed: {}", e)))?;

        if written != expected {
            return Err(DecodeError::Corrupt(format!(
                "decompressed {} bytes, expected {}",
                written, expected
            )));
        }
        Ok(())
    }
}

/// CRC-32C of `bytes`
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

/// Check `bytes` against a stored checksum
pub fn verify_checksum(bytes: &[u8], expected: u32) -> std::result::Result<(), DecodeError> {
    let actual = checksum(bytes);
    if actual != expected {
        return Err(DecodeError::Corrupt(format!(
            "checksum mismatch: stored {:#010x}, computed {:#010x}",
            expected, actual
        )));
    }
    Ok(())
}
