//! # tuplestore
//!
//! A minimal append-only record store for cold, bulk-loaded data:
//! - Opaque variable-length records ("tuples") in a single file
//! - Records packed into fixed-size 1 MiB blocks, LZ4-compressed
//! - CRC-32C checksum per compressed block; mismatches are fatal
//! - Append-with-repack inserts, sequential cursor reads
//! - Optional memory-mapped read path
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Table (options + RwLock)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Engine (facade)                             │
//! │        insert / read_next / flush / close                    │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌────────────┐       ┌──────────────┐       ┌─────────────┐
//!  │ Block      │       │ File Layout  │       │ Codec       │
//!  │ (1 slot)   │       │ + readers    │       │ LZ4 + CRC   │
//!  └────────────┘       └──────────────┘       └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tuplestore::{Engine, StoreConfig};
//!
//! # fn main() -> tuplestore::Result<()> {
//! let config = StoreConfig::builder().path("/tmp/tuples.dat").build();
//! let mut engine = Engine::open(config.clone())?;
//! engine.insert(b"first")?;
//! engine.insert(b"second")?;
//! engine.close()?;
//!
//! let mut reader = Engine::open(config.for_reading())?;
//! while let Some(record) = reader.read_next()? {
//!     println!("{:?}", record);
//! }
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod storage;
pub mod engine;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DecodeError, Result, StoreError};
pub use config::{StoreConfig, TableOptions};
pub use engine::Engine;
pub use table::Table;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tuplestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
