use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::types::{ElementId, Generation};

use super::IndexOp;

/// Ops drained by one flush, keyed by internal id.
pub(crate) type Batch = FxHashMap<ElementId, IndexOp>;

/// Generation-tagged snapshots of writes the reader may not see yet.
///
/// A batch is parked in the in-flight slot while the flush applies it, then
/// moves under the generation its commit produced. Snapshots older than the
/// searchable generation are evicted by [`RealTimeCache::evict_below`].
#[derive(Default)]
pub(crate) struct RealTimeCache {
    in_flight: RwLock<Option<Arc<Batch>>>,
    committed: RwLock<BTreeMap<Generation, Arc<Batch>>>,
}

impl RealTimeCache {
    pub(crate) fn begin(&self, batch: Arc<Batch>) {
        *self.in_flight.write() = Some(batch);
    }

    /// Moves the in-flight batch under `generation`.
    ///
    /// The committed map is updated before the slot clears so a concurrent
    /// lookup always finds the batch in one of the two places.
    pub(crate) fn publish(&self, generation: Generation) {
        let batch = self.in_flight.read().clone();
        if let Some(batch) = batch {
            self.committed.write().insert(generation, batch);
        }
        self.in_flight.write().take();
    }

    pub(crate) fn abort(&self) {
        self.in_flight.write().take();
    }

    /// Newest cached op for `id`.
    pub(crate) fn get(&self, id: ElementId) -> Option<IndexOp> {
        if let Some(op) = self
            .in_flight
            .read()
            .as_ref()
            .and_then(|batch| batch.get(&id))
        {
            return Some(op.clone());
        }
        self.committed
            .read()
            .values()
            .rev()
            .find_map(|batch| batch.get(&id).cloned())
    }

    /// Ids of every cached op carrying `user_id`.
    pub(crate) fn ids_with_user_id(&self, user_id: &str, out: &mut Vec<ElementId>) {
        let matching = |batch: &Batch, out: &mut Vec<ElementId>| {
            out.extend(
                batch
                    .values()
                    .filter(|op| op.user_id() == Some(user_id))
                    .map(IndexOp::id),
            );
        };
        if let Some(batch) = self.in_flight.read().as_ref() {
            matching(batch, out);
        }
        for batch in self.committed.read().values() {
            matching(batch, out);
        }
    }

    /// Drops snapshots strictly older than `searchable`; returns how many.
    pub(crate) fn evict_below(&self, searchable: Generation) -> usize {
        let mut committed = self.committed.write();
        let keep = committed.split_off(&searchable);
        let evicted = committed.len();
        *committed = keep;
        evicted
    }

    pub(crate) fn snapshot_count(&self) -> usize {
        self.committed.read().len()
    }
}
