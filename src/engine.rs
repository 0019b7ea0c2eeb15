//! Engine Module
//!
//! The storage engine facade: owns the open file, the block reader, the codec
//! and the single resident block.
//!
//! ## Responsibilities
//! - Bootstrap the file header on open
//! - Append records to the tail block, starting new blocks when full
//! - Repack (recompress and rewrite) the tail block on flush
//! - Sequential reads across the block chain
//!
//! ## Access Model
//!
//! One engine instance is either a write session or a read session, decided
//! by the first `insert` or `read_next`. Both paths share the resident block
//! and its cursor, so mixing them is rejected with `MixedAccess`.
//!
//! A fatal error (I/O, corruption, codec) poisons the engine: every later
//! `insert`, `flush` or `read_next` returns `Poisoned` with the original cause.
//!
//! There is no internal locking: callers guarantee a single writer and no
//! reader while a write session is open (see `Table` for an in-process guard).

use std::borrow::BorrowMut;
use std::fs::{File, OpenOptions};
use std::path::Path;

use bytes::Bytes;

use crate::codec::BlockCodec;
use crate::config::StoreConfig;
use crate::error::{DecodeError, Result, StoreError};
use crate::storage::{
    read_block_at, read_header, write_block_at, write_header, Block, BlockHeader, BlockStatus,
    ByOffsetBlockReader, FileBlockReader, FileHeader, MmapBlockReader, BLOCK_HEADER_SIZE,
    FILE_HEADER_SIZE, MAX_RECORD_SIZE,
};

/// What the engine has been used for so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Idle,
    Writing,
    Reading,
}

/// The block storage engine
pub struct Engine {
    /// Engine configuration
    config: StoreConfig,

    /// Handle used for header and block writes
    file: File,

    /// Block reads go through here (file or mmap, chosen at open)
    reader: Box<dyn ByOffsetBlockReader + Send>,

    /// LZ4 codec with its compression scratch buffer
    codec: BlockCodec,

    /// In-memory copy of the file header
    header: FileHeader,

    /// The one resident block
    block: Block,

    /// Offset of the next record slot within `block`
    cursor: usize,

    session: Session,

    /// Cause of the first fatal error, if any
    poisoned: Option<String>,

    /// Set once `close` has flushed
    closed: bool,
}

impl Engine {
    /// Open or create the storage file described by `config`
    ///
    /// Writable opens create a missing file and persist a default header into
    /// an empty one. Read-only opens never write.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut options = OpenOptions::new();
        options.read(true);
        if !config.readonly {
            options.write(true).create(true);
        }
        let mut file = options.open(&config.path).map_err(|source| StoreError::Open {
            path: config.path.clone(),
            source,
        })?;

        let was_empty = file.metadata()?.len() == 0;
        let header = read_header(&mut file, config.readonly)?;
        if was_empty && !config.readonly {
            file.sync_all()?;
        }

        let reader: Box<dyn ByOffsetBlockReader + Send> = if config.use_mmap {
            Box::new(MmapBlockReader::new(&file)?)
        } else {
            Box::new(FileBlockReader::new(file.try_clone()?))
        };

        let codec = BlockCodec::new(config.acceleration)?;

        tracing::info!(
            path = %config.path.display(),
            readonly = config.readonly,
            mmap = config.use_mmap,
            last_block_offset = header.last_block_offset,
            "opened storage file"
        );

        Ok(Self {
            config,
            file,
            reader,
            codec,
            header,
            block: Block::invalid(),
            cursor: 0,
            session: Session::Idle,
            poisoned: None,
            closed: false,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config for everything but the three open flags
    pub fn open_path(path: &Path, readonly: bool, use_mmap: bool) -> Result<Self> {
        let config = StoreConfig::builder()
            .path(path)
            .readonly(readonly)
            .use_mmap(use_mmap)
            .build();
        Self::open(config)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Append one record
    ///
    /// Steps:
    /// 1. Reject records that can never fit a block
    /// 2. On the first insert, load the tail block and find its sentinel
    /// 3. Flush and start a new block if the record does not fit
    /// 4. Copy the record in at the cursor
    pub fn insert(&mut self, record: &[u8]) -> Result<()> {
        self.check_poisoned()?;
        let result = self.insert_record(record);
        self.track(result)
    }

    fn insert_record(&mut self, record: &[u8]) -> Result<()> {
        if self.config.readonly {
            return Err(StoreError::ReadOnly);
        }
        if self.session == Session::Reading {
            return Err(StoreError::MixedAccess(
                "cannot insert after reading from the same engine".to_string(),
            ));
        }
        if record.is_empty() {
            return Err(StoreError::EmptyRecord);
        }
        if record.len() > MAX_RECORD_SIZE {
            return Err(StoreError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        if self.block.is_invalid() {
            self.load_tail()?;
        }
        self.session = Session::Writing;

        if !self.block.fits(self.cursor, record.len()) {
            self.flush_block()?;
            self.allocate_next();
        }

        self.cursor = self.block.append_record(self.cursor, record);
        tracing::trace!(len = record.len(), cursor = self.cursor, "record appended");
        Ok(())
    }

    /// Persist the resident block if it has unwritten changes
    ///
    /// Compresses the whole payload, rewrites it at the block's offset, cuts
    /// the file at the block end (the tail always ends the file) and syncs.
    /// A block flushed for the first time also becomes the header's tail.
    pub fn flush(&mut self) -> Result<()> {
        if !self.block.is_dirty() {
            return Ok(());
        }
        self.check_poisoned()?;
        let result = self.flush_block();
        self.track(result)
    }

    fn flush_block(&mut self) -> Result<()> {
        if !self.block.is_dirty() {
            return Ok(());
        }

        let was_new = self.block.status() == BlockStatus::New;
        let offset = self.block.offset();

        let compressed = self.codec.compress(self.block.data())?;
        let block_header = BlockHeader::for_payload(compressed)?;

        write_block_at(&mut self.file, offset, &block_header, compressed)?;
        self.file
            .set_len(offset + BLOCK_HEADER_SIZE + u64::from(block_header.compressed_size))?;
        self.file.sync_all()?;

        if was_new {
            self.header.last_block_offset = offset;
            write_header(&mut self.file, &self.header)?;
            self.file.sync_all()?;
        }

        self.block.mark_flushed(block_header.compressed_size);

        tracing::debug!(
            offset,
            compressed_size = block_header.compressed_size,
            new_tail = was_new,
            "flushed block"
        );
        Ok(())
    }

    /// Load the block the header names as the tail and resume after its last record
    fn load_tail(&mut self) -> Result<()> {
        let offset = self.header.last_block_offset;

        match read_block_at(&mut *self.reader, &self.codec, offset)? {
            Some((_, block)) => {
                self.cursor = block.find_sentinel()?;
                self.block = block;
                tracing::debug!(offset, cursor = self.cursor, "resuming tail block");
            }
            None if offset == FILE_HEADER_SIZE => {
                self.block = Block::new_at(offset);
                self.cursor = 0;
                tracing::debug!(offset, "allocated first block");
            }
            None => {
                return Err(DecodeError::Corrupt(format!(
                    "header names tail block at {} but the file ends before it",
                    offset
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Start an empty block right after the current one
    fn allocate_next(&mut self) {
        let offset = if self.block.is_invalid() {
            FILE_HEADER_SIZE
        } else {
            self.block.end_offset()
        };

        self.block = Block::new_at(offset);
        self.cursor = 0;
        tracing::debug!(offset, "allocated new block");
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Next record in file order, `None` at the end of the chain
    ///
    /// Moves to the following block when the current one is exhausted;
    /// blocks are visited once, front to back.
    pub fn read_next(&mut self) -> Result<Option<Bytes>> {
        self.check_poisoned()?;
        let result = self.next_record();
        self.track(result)
    }

    fn next_record(&mut self) -> Result<Option<Bytes>> {
        if self.session == Session::Writing {
            return Err(StoreError::MixedAccess(
                "cannot read after inserting into the same engine".to_string(),
            ));
        }
        self.session = Session::Reading;

        if self.block.is_invalid() || self.block.record_len_at(self.cursor).is_none() {
            let next = if self.block.is_invalid() {
                FILE_HEADER_SIZE
            } else {
                self.block.end_offset()
            };

            match read_block_at(&mut *self.reader, &self.codec, next)? {
                Some((_, block)) => {
                    self.block = block;
                    self.cursor = 0;
                }
                None => return Ok(None),
            }
        }

        match self.block.record_at(self.cursor)? {
            Some((record, next)) => {
                self.cursor = next;
                Ok(Some(record))
            }
            // A block without records: report end of data
            None => Ok(None),
        }
    }

    /// Iterate over the remaining records
    pub fn records(&mut self) -> Records<&mut Engine> {
        Records::new(self)
    }

    /// Consume the engine into an iterator over its records
    pub fn into_records(self) -> Records<Engine> {
        Records::new(self)
    }

    // =========================================================================
    // Failure Tracking
    // =========================================================================

    fn check_poisoned(&self) -> Result<()> {
        match &self.poisoned {
            Some(cause) => Err(StoreError::Poisoned(cause.clone())),
            None => Ok(()),
        }
    }

    /// Remember the first fatal error of the session
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.poisoned.is_none() {
                tracing::warn!(path = %self.config.path.display(), "engine poisoned: {}", e);
                self.poisoned = Some(e.to_string());
            }
        }
        result
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Flushes a pending block, then releases the file and any mapping
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;

        tracing::info!(path = %self.config.path.display(), "closed storage file");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the in-memory file header
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Status of the resident block
    pub fn block_status(&self) -> BlockStatus {
        self.block.status()
    }

    /// File offset of the resident block
    pub fn block_offset(&self) -> u64 {
        self.block.offset()
    }

    /// Cursor within the resident block
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_readonly(&self) -> bool {
        self.config.readonly
    }

    /// Whether an earlier fatal error has disabled the engine
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.closed || self.poisoned.is_some() || !self.block.is_dirty() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!(
                path = %self.config.path.display(),
                "failed to flush pending block on drop: {}",
                e
            );
        }
    }
}

/// Iterator over an engine's records; stops after the first error
///
/// Holds the engine either borrowed (`records`) or owned (`into_records`).
pub struct Records<E> {
    engine: E,
    done: bool,
}

impl<E: BorrowMut<Engine>> Records<E> {
    fn new(engine: E) -> Self {
        Self {
            engine,
            done: false,
        }
    }
}

impl<E: BorrowMut<Engine>> Iterator for Records<E> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.engine.borrow_mut().read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
