//! Table adapter
//!
//! The call-site glue around `Engine`: turns validated table options into
//! engine sessions and enforces, within one process, the locking discipline
//! the engine expects of its callers.
//!
//! ## Locking
//! - Write sessions (`insert_all`) hold the table lock exclusively from open
//!   to close, so there is one writer and no concurrent reader
//! - Scans hold it shared; any number may run at once

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::config::{StoreConfig, TableOptions};
use crate::engine::{Engine, Records};
use crate::error::Result;

/// A storage file plus the lock guarding sessions on it
pub struct Table {
    config: StoreConfig,
    lock: RwLock<()>,
}

impl Table {
    /// Create a table over `config`'s file (nothing is opened yet)
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            lock: RwLock::new(()),
        }
    }

    /// Create a table from raw `(name, value)` options
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let options = TableOptions::from_options(options)?;
        Ok(Self::new(options.to_config()))
    }

    /// Append all `records` in one write session, returning how many were stored
    ///
    /// Stops at the first failing record; records before it are still flushed
    /// when the session closes.
    pub fn insert_all<I, R>(&self, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[u8]>,
    {
        let _write_guard = self.lock.write();

        let mut engine = Engine::open(self.config.for_writing())?;
        let mut count = 0u64;
        for record in records {
            if let Err(e) = engine.insert(record.as_ref()) {
                // The rejected record's error wins over a failing close
                if let Err(close_err) = engine.close() {
                    tracing::error!(
                        path = %self.config.path.display(),
                        "failed to close after rejected insert: {}",
                        close_err
                    );
                }
                return Err(e);
            }
            count += 1;
        }
        engine.close()?;

        tracing::debug!(path = %self.config.path.display(), count, "write session finished");
        Ok(count)
    }

    /// Start a sequential scan under a shared lock
    pub fn scan(&self) -> Result<TableScan<'_>> {
        let guard = self.lock.read();
        let engine = Engine::open(self.config.for_reading())?;

        Ok(TableScan {
            records: engine.into_records(),
            _guard: guard,
        })
    }

    /// Read every record into memory
    pub fn read_all(&self) -> Result<Vec<Bytes>> {
        self.scan()?.collect()
    }

    /// Declared sort order, for a planner to exploit
    pub fn sort_order(&self) -> &[String] {
        &self.config.sort_order
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// A running scan; releases the shared lock when dropped
pub struct TableScan<'a> {
    records: Records<Engine>,
    _guard: RwLockReadGuard<'a, ()>,
}

impl Iterator for TableScan<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}
