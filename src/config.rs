//! TOML-backed store configuration.
//!
//! ```toml
//! [store]
//! path = "/var/lib/lucent"      # omit for an in-memory store
//! adjacency = "filter"          # or "id_list"
//!
//! [buffer]
//! flush_threshold = 1000
//! flush_interval_ms = 1000
//! reopen_interval_ms = 250
//! high_water_multiplier = 2
//! writer_heap_bytes = 50000000
//!
//! [query]
//! page_size = 10
//! ```
//!
//! Every key is optional; absent keys keep the [`GraphOptions`] defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{AdjacencyStrategy, GraphOptions, Storage};

/// Errors raised while loading a [`StoreConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read store config {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The TOML is malformed or has unknown shapes.
    #[error("failed to parse store config: {source}")]
    Parse {
        /// Parser error.
        source: toml::de::Error,
    },
    /// The config could not be rendered as TOML.
    #[error("failed to serialize store config: {source}")]
    Serialize {
        /// Serializer error.
        source: toml::ser::Error,
    },
    /// A size or interval was set to zero.
    #[error("'{key}' must be greater than zero")]
    Zero {
        /// Offending key.
        key: &'static str,
    },
    /// Unknown adjacency strategy name.
    #[error("adjacency strategy '{value}' is invalid, expected 'filter' or 'id_list'")]
    InvalidAdjacency {
        /// Value found in the file.
        value: String,
    },
}

/// Parsed store configuration.
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    buffer: BufferSection,
    #[serde(default)]
    query: QuerySection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
struct StoreSection {
    path: Option<PathBuf>,
    adjacency: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
struct BufferSection {
    flush_threshold: Option<usize>,
    flush_interval_ms: Option<u64>,
    reopen_interval_ms: Option<u64>,
    high_water_multiplier: Option<usize>,
    writer_heap_bytes: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
struct QuerySection {
    page_size: Option<usize>,
}

impl StoreConfig {
    /// Reads and validates the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, Option<u64>); 6] = [
            ("buffer.flush_threshold", self.buffer.flush_threshold.map(|v| v as u64)),
            ("buffer.flush_interval_ms", self.buffer.flush_interval_ms),
            ("buffer.reopen_interval_ms", self.buffer.reopen_interval_ms),
            (
                "buffer.high_water_multiplier",
                self.buffer.high_water_multiplier.map(|v| v as u64),
            ),
            ("buffer.writer_heap_bytes", self.buffer.writer_heap_bytes.map(|v| v as u64)),
            ("query.page_size", self.query.page_size.map(|v| v as u64)),
        ];
        for (key, value) in checks {
            if value == Some(0) {
                return Err(ConfigError::Zero { key });
            }
        }
        self.adjacency()?;
        Ok(())
    }

    fn adjacency(&self) -> Result<Option<AdjacencyStrategy>, ConfigError> {
        match self.store.adjacency.as_deref() {
            None => Ok(None),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "filter" => Ok(Some(AdjacencyStrategy::Filter)),
                "id_list" | "idlist" => Ok(Some(AdjacencyStrategy::IdList)),
                _ => Err(ConfigError::InvalidAdjacency {
                    value: value.to_string(),
                }),
            },
        }
    }

    /// Builds [`GraphOptions`] from the configured keys.
    pub fn to_options(&self) -> Result<GraphOptions, ConfigError> {
        let storage = match &self.store.path {
            Some(path) => Storage::Directory(path.clone()),
            None => Storage::InMemory,
        };
        let mut opts = GraphOptions::new(storage);
        if let Some(strategy) = self.adjacency()? {
            opts = opts.adjacency(strategy);
        }
        if let Some(ops) = self.buffer.flush_threshold {
            opts = opts.flush_threshold(ops);
        }
        if let Some(ms) = self.buffer.flush_interval_ms {
            opts = opts.flush_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.buffer.reopen_interval_ms {
            opts = opts.reopen_interval(Duration::from_millis(ms));
        }
        if let Some(multiplier) = self.buffer.high_water_multiplier {
            opts = opts.high_water_multiplier(multiplier);
        }
        if let Some(bytes) = self.buffer.writer_heap_bytes {
            opts = opts.writer_heap_bytes(bytes);
        }
        if let Some(size) = self.query.page_size {
            opts = opts.page_size(size);
        }
        Ok(opts)
    }
}
