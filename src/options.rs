//! Options accepted when opening a graph.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::DEFAULT_PAGE_SIZE;
use crate::metrics::StoreMetrics;

/// Where the engine keeps its segments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Storage {
    /// RAM-backed directory, lost on close.
    InMemory,
    /// On-disk directory, created when missing and reopened otherwise.
    Directory(PathBuf),
}

/// How `Vertex::out_edges`/`in_edges` resolve incident edges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum AdjacencyStrategy {
    /// Filter sequence over edges whose endpoint field equals the vertex.
    #[default]
    Filter,
    /// Resolve the id lists stored on the vertex record one by one.
    IdList,
}

/// Configuration options supplied when opening a [`crate::Graph`].
#[derive(Clone)]
pub struct GraphOptions {
    /// Engine storage backing.
    pub storage: Storage,
    /// Buffered operations that trigger a flush.
    pub flush_threshold: usize,
    /// Longest time a buffered operation waits for a flush.
    pub flush_interval: Duration,
    /// Period of the background reader reopen.
    pub reopen_interval: Duration,
    /// Producers block once the buffer holds `flush_threshold * high_water_multiplier` ops.
    pub high_water_multiplier: usize,
    /// Default page size of filter sequences.
    pub page_size: usize,
    /// Memory budget of the engine writer in bytes.
    pub writer_heap_bytes: usize,
    /// Incident edge resolution used by vertices.
    pub adjacency: AdjacencyStrategy,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn StoreMetrics>>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self::new(Storage::InMemory)
    }
}

impl GraphOptions {
    /// Creates options with default settings for `storage`.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            flush_threshold: 1000,
            flush_interval: Duration::from_secs(1),
            reopen_interval: Duration::from_millis(250),
            high_water_multiplier: 2,
            page_size: DEFAULT_PAGE_SIZE,
            writer_heap_bytes: 50_000_000,
            adjacency: AdjacencyStrategy::Filter,
            metrics: None,
        }
    }

    /// Options for an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Storage::InMemory)
    }

    /// Options for a store persisted under `path`.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(Storage::Directory(path.into()))
    }

    /// Sets the flush size threshold.
    pub fn flush_threshold(mut self, ops: usize) -> Self {
        self.flush_threshold = ops;
        self
    }

    /// Sets the flush time threshold.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the reader reopen period.
    pub fn reopen_interval(mut self, interval: Duration) -> Self {
        self.reopen_interval = interval;
        self
    }

    /// Sets the backpressure multiplier.
    pub fn high_water_multiplier(mut self, multiplier: usize) -> Self {
        self.high_water_multiplier = multiplier;
        self
    }

    /// Sets the default filter sequence page size.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the engine writer memory budget.
    pub fn writer_heap_bytes(mut self, bytes: usize) -> Self {
        self.writer_heap_bytes = bytes;
        self
    }

    /// Selects the incident edge strategy.
    pub fn adjacency(mut self, strategy: AdjacencyStrategy) -> Self {
        self.adjacency = strategy;
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Buffer length at which producers block.
    pub fn high_water_mark(&self) -> usize {
        self.flush_threshold
            .max(1)
            .saturating_mul(self.high_water_multiplier.max(1))
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.flush_threshold = self.flush_threshold.max(1);
        self.high_water_multiplier = self.high_water_multiplier.max(1);
        self.page_size = self.page_size.max(1);
        if self.flush_interval.is_zero() {
            self.flush_interval = Duration::from_millis(1);
        }
        if self.reopen_interval.is_zero() {
            self.reopen_interval = Duration::from_millis(1);
        }
        self
    }
}

impl fmt::Debug for GraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphOptions")
            .field("storage", &self.storage)
            .field("flush_threshold", &self.flush_threshold)
            .field("flush_interval", &self.flush_interval)
            .field("reopen_interval", &self.reopen_interval)
            .field("high_water_multiplier", &self.high_water_multiplier)
            .field("page_size", &self.page_size)
            .field("writer_heap_bytes", &self.writer_heap_bytes)
            .field("adjacency", &self.adjacency)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
