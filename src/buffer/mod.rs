//! Write buffering and generation-tracked visibility.
//!
//! Mutations land in a concurrent pending map keyed by internal id, where the
//! latest op for an id replaces any earlier one. A background worker drains
//! the map into the engine on a size or time trigger and commits; the drained
//! batch stays readable through the [`RealTimeCache`] until the reader has
//! reopened past its generation. Point reads consult the pending map, then
//! the cache, then the engine, so a writer always reads its own writes.
//!
//! Lock order: `flush_epoch` before `signal`. The flush lock is never held
//! while waiting on either condvar.

mod cache;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::{GraphError, Result};
use crate::metrics::{default_metrics, StoreMetrics};
use crate::options::GraphOptions;
use crate::record::Record;
use crate::types::{ElementId, Generation};

use cache::{Batch, RealTimeCache};
use worker::WorkerSignal;

/// What a buffered op does to its document.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpKind {
    /// First write of a new element.
    Create,
    /// Replacement of an existing element.
    Update,
    /// Removal by internal id.
    Delete,
}

/// A pending mutation of one document.
#[derive(Clone, Debug)]
pub struct IndexOp {
    kind: OpKind,
    id: ElementId,
    record: Option<Arc<Record>>,
    tombstone_user_id: Option<String>,
    seq: u64,
}

impl IndexOp {
    pub(crate) fn create(record: Arc<Record>, seq: u64) -> Self {
        Self {
            kind: OpKind::Create,
            id: record.id(),
            record: Some(record),
            tombstone_user_id: None,
            seq,
        }
    }

    pub(crate) fn update(record: Arc<Record>, seq: u64) -> Self {
        Self {
            kind: OpKind::Update,
            ..Self::create(record, seq)
        }
    }

    pub(crate) fn delete(id: ElementId, user_id: Option<String>, seq: u64) -> Self {
        Self {
            kind: OpKind::Delete,
            id,
            record: None,
            tombstone_user_id: user_id,
            seq,
        }
    }

    /// Operation type.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Internal id of the target document.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Record to persist; `None` for deletes.
    pub fn record(&self) -> Option<&Arc<Record>> {
        self.record.as_ref()
    }

    /// User id of the element, kept on deletes as a tombstone.
    pub fn user_id(&self) -> Option<&str> {
        match &self.record {
            Some(record) => record.user_id(),
            None => self.tombstone_user_id.as_deref(),
        }
    }
}

/// State shared between the buffer handle and its workers.
pub(crate) struct Shared {
    engine: Engine,
    opts: GraphOptions,
    metrics: Arc<dyn StoreMetrics>,
    pending: DashMap<ElementId, IndexOp>,
    seq: AtomicU64,
    cache: RealTimeCache,
    flush_lock: Mutex<()>,
    flush_epoch: Mutex<u64>,
    flushed: Condvar,
    signal: Mutex<WorkerSignal>,
    flush_wakeup: Condvar,
    reopen_wakeup: Condvar,
    accepting: AtomicBool,
    failed: AtomicBool,
}

impl Shared {
    fn check_writable(&self) -> Result<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(GraphError::WriterFailed(
                "a previous flush failed fatally".into(),
            ));
        }
        if !self.accepting.load(Ordering::Acquire) {
            return Err(GraphError::Closed);
        }
        Ok(())
    }

    fn enqueue(&self, mut op: IndexOp) -> Result<()> {
        self.check_writable()?;
        self.wait_for_space()?;
        op.seq = self.seq.fetch_add(1, Ordering::AcqRel);
        match self.pending.entry(op.id) {
            Entry::Occupied(mut slot) => {
                if slot.get().kind == OpKind::Create && op.kind == OpKind::Update {
                    op.kind = OpKind::Create;
                }
                slot.insert(op);
            }
            Entry::Vacant(slot) => {
                slot.insert(op);
            }
        }
        if self.pending.len() >= self.opts.flush_threshold {
            self.request_flush();
        }
        Ok(())
    }

    /// Blocks the producer while the buffer is above its high-water mark.
    fn wait_for_space(&self) -> Result<()> {
        let high_water = self.opts.high_water_mark();
        if self.pending.len() < high_water {
            return Ok(());
        }
        self.metrics.backpressure_wait();
        debug!(pending = self.pending.len(), high_water, "buffer.backpressure");
        let mut epoch = self.flush_epoch.lock();
        let observed = *epoch;
        self.request_flush();
        while *epoch == observed {
            self.check_writable()?;
            self.flushed.wait_for(&mut epoch, self.opts.flush_interval);
        }
        Ok(())
    }

    fn request_flush(&self) {
        self.signal.lock().flush_requested = true;
        self.flush_wakeup.notify_one();
    }

    fn notify_flushed(&self) {
        *self.flush_epoch.lock() += 1;
        self.flushed.notify_all();
    }

    /// Drains every pending op into the engine and commits.
    fn flush(&self) -> Result<Generation> {
        let _exclusive = self.flush_lock.lock();
        if self.failed.load(Ordering::Acquire) {
            self.notify_flushed();
            return Err(GraphError::WriterFailed(
                "a previous flush failed fatally".into(),
            ));
        }
        let batch: Batch = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        if batch.is_empty() {
            self.notify_flushed();
            return Ok(self.engine.committed_generation());
        }

        let batch = Arc::new(batch);
        self.cache.begin(Arc::clone(&batch));
        for (id, op) in batch.iter() {
            self.pending.remove_if(id, |_, pending| pending.seq == op.seq);
        }

        let started = Instant::now();
        let result = self.apply(&batch);
        match &result {
            Ok(generation) => {
                self.cache.publish(*generation);
                self.metrics.flushed(batch.len());
                debug!(
                    ops = batch.len(),
                    generation = %generation,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "buffer.flush"
                );
            }
            Err(err) => {
                self.restore(&batch);
                self.cache.abort();
                if err.is_fatal() {
                    self.fail(err);
                }
            }
        }
        self.notify_flushed();
        result
    }

    fn apply(&self, batch: &Batch) -> Result<Generation> {
        for op in batch.values() {
            match op.record() {
                Some(record) => self.engine.add_or_replace(record)?,
                None => self.engine.delete(op.id)?,
            };
        }
        self.engine.commit()
    }

    /// Puts a failed batch back unless a newer op for the id arrived.
    fn restore(&self, batch: &Batch) {
        for (id, op) in batch.iter() {
            self.pending.entry(*id).or_insert_with(|| op.clone());
        }
    }

    fn fail(&self, err: &GraphError) {
        self.failed.store(true, Ordering::Release);
        self.engine.kill_writer();
        error!(error = %err, pending = self.pending.len(), "buffer.writer_failed");
    }

    fn reopen(&self) -> Result<Generation> {
        let generation = self.engine.reopen()?;
        self.metrics.reopened();
        let evicted = self.cache.evict_below(generation);
        if evicted > 0 {
            debug!(evicted, generation = %generation, "buffer.cache_evict");
        }
        Ok(generation)
    }

    /// Newest buffered or cached op for `id`.
    fn latest_op(&self, id: ElementId) -> Option<IndexOp> {
        if let Some(op) = self.pending.get(&id) {
            return Some(op.value().clone());
        }
        self.cache.get(id)
    }
}

/// Write buffer owning the engine and its flush and reopen workers.
pub struct WriteBuffer {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WriteBuffer {
    /// Opens the engine described by `opts` and starts the workers.
    pub fn open(opts: GraphOptions) -> Result<Self> {
        let opts = opts.normalized();
        let engine = Engine::open(&opts.storage, opts.writer_heap_bytes)?;
        let metrics = opts.metrics.clone().unwrap_or_else(default_metrics);
        let shared = Arc::new(Shared {
            engine,
            opts,
            metrics,
            pending: DashMap::new(),
            seq: AtomicU64::new(0),
            cache: RealTimeCache::default(),
            flush_lock: Mutex::new(()),
            flush_epoch: Mutex::new(0),
            flushed: Condvar::new(),
            signal: Mutex::new(WorkerSignal::default()),
            flush_wakeup: Condvar::new(),
            reopen_wakeup: Condvar::new(),
            accepting: AtomicBool::new(true),
            failed: AtomicBool::new(false),
        });
        let workers = vec![
            worker::spawn_flush(Arc::clone(&shared))?,
            worker::spawn_reopen(Arc::clone(&shared))?,
        ];
        info!(
            flush_threshold = shared.opts.flush_threshold,
            high_water = shared.opts.high_water_mark(),
            "buffer.open"
        );
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Engine behind the buffer.
    pub fn engine(&self) -> &Engine {
        &self.shared.engine
    }

    /// Effective options.
    pub fn options(&self) -> &GraphOptions {
        &self.shared.opts
    }

    pub(crate) fn metrics(&self) -> &dyn StoreMetrics {
        self.shared.metrics.as_ref()
    }

    /// Buffers the first write of a new element.
    pub fn create(&self, record: Record) -> Result<Arc<Record>> {
        let record = Arc::new(record);
        self.shared.enqueue(IndexOp::create(Arc::clone(&record), 0))?;
        Ok(record)
    }

    /// Buffers a full replacement of an element.
    pub fn put(&self, record: Record) -> Result<Arc<Record>> {
        let record = Arc::new(record);
        self.shared.enqueue(IndexOp::update(Arc::clone(&record), 0))?;
        Ok(record)
    }

    /// Buffers the removal of `id`.
    pub fn delete(&self, id: ElementId, user_id: Option<String>) -> Result<()> {
        self.shared.enqueue(IndexOp::delete(id, user_id, 0))
    }

    /// Latest version of `id`, including writes not yet searchable.
    pub fn find_by_id(&self, id: ElementId) -> Result<Option<Arc<Record>>> {
        if let Some(op) = self.shared.latest_op(id) {
            self.shared.metrics.cache_hit();
            return Ok(op.record().cloned());
        }
        let record = self.shared.engine.get(id)?;
        self.shared.metrics.engine_read(record.is_some());
        Ok(record.map(Arc::new))
    }

    /// Latest element carrying `user_id`, including writes not yet searchable.
    pub fn find_by_user_id(&self, user_id: &str) -> Result<Option<Arc<Record>>> {
        let mut candidates: Vec<ElementId> = self
            .shared
            .pending
            .iter()
            .filter(|entry| entry.value().user_id() == Some(user_id))
            .map(|entry| *entry.key())
            .collect();
        self.shared.cache.ids_with_user_id(user_id, &mut candidates);
        candidates.sort_unstable();
        candidates.dedup();
        for id in candidates {
            let live = self
                .shared
                .latest_op(id)
                .and_then(|op| op.record().cloned())
                .filter(|record| record.user_id() == Some(user_id));
            if live.is_some() {
                self.shared.metrics.cache_hit();
                return Ok(live);
            }
        }

        let found = self.shared.engine.get_by_user_id(user_id)?;
        self.shared.metrics.engine_read(found.is_some());
        let Some(record) = found else {
            return Ok(None);
        };
        match self.shared.latest_op(record.id()) {
            // a newer buffered op supersedes the searchable document
            Some(op) => Ok(op
                .record()
                .filter(|newer| newer.user_id() == Some(user_id))
                .cloned()),
            None => Ok(Some(Arc::new(record))),
        }
    }

    /// Newest buffered or cached op for `id`, if any.
    pub(crate) fn overlay(&self, id: ElementId) -> Option<IndexOp> {
        self.shared.latest_op(id)
    }

    /// Flushes synchronously and returns the committed generation.
    pub fn flush_now(&self) -> Result<Generation> {
        self.shared.flush()
    }

    /// Blocks until `generation` is searchable, flushing first if it has not
    /// been committed yet.
    pub fn flush(&self, generation: Generation) -> Result<()> {
        let engine = &self.shared.engine;
        if engine.committed_generation() < generation {
            self.flush_now()?;
            if engine.committed_generation() < generation {
                return Err(GraphError::InvalidArgument(format!(
                    "generation {generation} was never committed"
                )));
            }
        }
        engine.wait_for_generation(generation)
    }

    /// Flushes and reopens so every prior write is searchable.
    pub fn refresh(&self) -> Result<Generation> {
        let generation = self.flush_now()?;
        self.shared.reopen()?;
        self.shared.engine.wait_for_generation(generation)?;
        Ok(generation)
    }

    /// Ops waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Committed snapshots not yet evicted from the real-time cache.
    pub fn cached_snapshot_count(&self) -> usize {
        self.shared.cache.snapshot_count()
    }

    /// Whether a fatal flush failure poisoned the store.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    fn stop_workers(&self) {
        self.shared.signal.lock().stop = true;
        self.shared.flush_wakeup.notify_all();
        self.shared.reopen_wakeup.notify_all();
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("buffer.worker_panicked");
            }
        }
    }

    /// Stops the workers, flushes once more and closes the engine.
    ///
    /// Ops still buffered after the final flush are lost and logged.
    pub fn close(&self) -> Result<()> {
        if !self.shared.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.stop_workers();
        let flushed = if self.is_failed() {
            Ok(())
        } else {
            self.shared.flush().map(drop)
        };
        let remaining = self.shared.pending.len();
        if remaining > 0 {
            warn!(remaining, "buffer.close_unflushed");
        }
        let closed = self.shared.engine.close();
        info!(generation = %self.shared.engine.committed_generation(), "buffer.close");
        flushed.and(closed)
    }
}

impl Drop for WriteBuffer {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "buffer.close_on_drop_failed");
        }
    }
}
