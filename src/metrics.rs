//! Operation counters reported by the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sink for store operation counters.
///
/// Implementations are called from request threads and from the background
/// flush and reopen workers, so every method must be cheap and thread-safe.
pub trait StoreMetrics: Send + Sync {
    /// Records the creation of a vertex.
    fn vertex_created(&self);

    /// Records the removal of a vertex.
    fn vertex_deleted(&self);

    /// Records the creation of an edge.
    fn edge_created(&self);

    /// Records the removal of an edge.
    fn edge_deleted(&self);

    /// Records a completed flush that applied `ops` buffered operations.
    fn flushed(&self, ops: usize);

    /// Records a point read served from the real-time cache.
    fn cache_hit(&self);

    /// Records a point read that went to the engine.
    ///
    /// # Parameters
    /// * `found` - Whether the engine returned a document.
    fn engine_read(&self, found: bool);

    /// Records a producer blocked on the buffer high-water mark.
    fn backpressure_wait(&self);

    /// Records a reader reopen.
    fn reopened(&self);
}

/// Discards every recorded metric.
#[derive(Default)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn vertex_created(&self) {}
    fn vertex_deleted(&self) {}
    fn edge_created(&self) {}
    fn edge_deleted(&self) {}
    fn flushed(&self, _ops: usize) {}
    fn cache_hit(&self) {}
    fn engine_read(&self, _found: bool) {}
    fn backpressure_wait(&self) {}
    fn reopened(&self) {}
}

/// Atomic counters for every [`StoreMetrics`] event.
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Vertices created.
    pub vertices_created: AtomicU64,
    /// Vertices removed.
    pub vertices_deleted: AtomicU64,
    /// Edges created.
    pub edges_created: AtomicU64,
    /// Edges removed.
    pub edges_deleted: AtomicU64,
    /// Completed flushes.
    pub flushes: AtomicU64,
    /// Operations applied by all flushes.
    pub flushed_ops: AtomicU64,
    /// Point reads answered by the real-time cache.
    pub cache_hits: AtomicU64,
    /// Engine point reads that found a document.
    pub engine_reads_found: AtomicU64,
    /// Engine point reads that found nothing.
    pub engine_reads_missed: AtomicU64,
    /// Producers that waited on backpressure.
    pub backpressure_waits: AtomicU64,
    /// Reader reopens.
    pub reopens: AtomicU64,
}

impl CounterMetrics {
    /// Reads a counter with relaxed ordering.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl StoreMetrics for CounterMetrics {
    fn vertex_created(&self) {
        self.vertices_created.fetch_add(1, Ordering::Relaxed);
    }

    fn vertex_deleted(&self) {
        self.vertices_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_created(&self) {
        self.edges_created.fetch_add(1, Ordering::Relaxed);
    }

    fn edge_deleted(&self) {
        self.edges_deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn flushed(&self, ops: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_ops.fetch_add(ops as u64, Ordering::Relaxed);
    }

    fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn engine_read(&self, found: bool) {
        if found {
            self.engine_reads_found.fetch_add(1, Ordering::Relaxed);
        } else {
            self.engine_reads_missed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn backpressure_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn reopened(&self) {
        self.reopens.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics sink, a [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn StoreMetrics> {
    Arc::new(NoopMetrics)
}
