//! Configuration for tuplestore
//!
//! Centralized configuration with sensible defaults, plus validation of the
//! string options an adapter layer hands over (`filename`, `use_mmap`, ...).

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// LZ4 fast-mode default acceleration
pub const DEFAULT_ACCELERATION: i32 = 1;

/// Main configuration for a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // File Configuration
    // -------------------------------------------------------------------------
    /// Storage file (created on first writable open if absent)
    pub path: PathBuf,

    /// Open without write access; never bootstraps the header
    pub readonly: bool,

    /// Serve block reads from a memory mapping (read-only stores only)
    pub use_mmap: bool,

    // -------------------------------------------------------------------------
    // Codec Configuration
    // -------------------------------------------------------------------------
    /// LZ4 acceleration: higher is faster with a worse ratio
    pub acceleration: i32,

    // -------------------------------------------------------------------------
    // Planner Hints
    // -------------------------------------------------------------------------
    /// Declared sort order over logical fields. Never affects the file layout.
    pub sort_order: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tuples.dat"),
            readonly: false,
            use_mmap: false,
            acceleration: DEFAULT_ACCELERATION,
            sort_order: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check option combinations before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::Config("storage file path is empty".to_string()));
        }
        if self.use_mmap && !self.readonly {
            return Err(StoreError::Config(
                "memory mapping is only allowed for read-only stores".to_string(),
            ));
        }
        if self.acceleration < 1 {
            return Err(StoreError::Config(format!(
                "acceleration must be at least 1, got {}",
                self.acceleration
            )));
        }
        Ok(())
    }

    /// Same settings, opened for reading only
    pub fn for_reading(&self) -> Self {
        Self {
            readonly: true,
            ..self.clone()
        }
    }

    /// Same settings, opened for writing (mapping switched off)
    pub fn for_writing(&self) -> Self {
        Self {
            readonly: false,
            use_mmap: false,
            ..self.clone()
        }
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: StoreConfig,
}

impl ConfigBuilder {
    /// Set the storage file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Open read-only
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.config.readonly = readonly;
        self
    }

    /// Read blocks through a memory mapping
    pub fn use_mmap(mut self, use_mmap: bool) -> Self {
        self.config.use_mmap = use_mmap;
        self
    }

    /// Set the LZ4 acceleration level
    pub fn acceleration(mut self, acceleration: i32) -> Self {
        self.config.acceleration = acceleration;
        self
    }

    /// Declare the sort order of the stored records
    pub fn sort_order<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.sort_order = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

// =============================================================================
// Adapter Options
// =============================================================================

/// Validated string options as attached to a table definition.
///
/// Recognised names: `filename` (required), `use_mmap`, `acceleration`, `sorted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub filename: PathBuf,
    pub use_mmap: bool,
    pub acceleration: i32,
    pub sorted: Vec<String>,
}

impl TableOptions {
    /// Parse and validate `(name, value)` option pairs
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filename = None;
        let mut use_mmap = false;
        let mut acceleration = DEFAULT_ACCELERATION;
        let mut sorted = Vec::new();

        for (name, value) in options {
            let value = value.as_ref();
            match name.as_ref() {
                "filename" => {
                    if value.is_empty() {
                        return Err(StoreError::Config("filename must not be empty".to_string()));
                    }
                    filename = Some(PathBuf::from(value));
                }
                "use_mmap" => use_mmap = parse_bool("use_mmap", value)?,
                "acceleration" => {
                    acceleration = value.trim().parse().map_err(|_| {
                        StoreError::Config(format!("invalid acceleration: '{}'", value))
                    })?;
                    if acceleration < 1 {
                        return Err(StoreError::Config(format!(
                            "acceleration must be at least 1, got {}",
                            acceleration
                        )));
                    }
                }
                "sorted" => {
                    sorted = value
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|field| !field.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                other => {
                    return Err(StoreError::Config(format!("unknown option: '{}'", other)));
                }
            }
        }

        let filename =
            filename.ok_or_else(|| StoreError::Config("filename is required".to_string()))?;

        Ok(Self {
            filename,
            use_mmap,
            acceleration,
            sorted,
        })
    }

    /// Writable store config for these options
    pub fn to_config(&self) -> StoreConfig {
        StoreConfig::builder()
            .path(&self.filename)
            .use_mmap(self.use_mmap)
            .acceleration(self.acceleration)
            .sort_order(self.sorted.iter().cloned())
            .build()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(StoreError::Config(format!(
            "invalid boolean for {}: '{}'",
            name, value
        ))),
    }
}
