//! Boundary with the embedded inverted-index engine.
//!
//! [`Engine`] owns the single index writer, the near-real-time reader and the
//! generation bookkeeping. A *generation* is the opstamp returned by a
//! commit; it becomes *searchable* once the reader has been reloaded after
//! that commit. Writes reach the engine only through the write buffer.

mod filter;

use std::ops::{Bound, Deref};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Query, RangeQuery, TermQuery};
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument,
    TantivyError, Term,
};
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::options::Storage;
use crate::record::{DocumentCodec, Record};
use crate::schema::fields;
use crate::types::{ElementId, Generation};

pub use filter::{Filter, TokenMatch};

const MIN_WRITER_HEAP: usize = 15_000_000;
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Metadata stored with every commit.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CommitPayload {
    next_id: u64,
}

/// Searcher handle counted against the engine while alive.
pub struct SearcherLease {
    searcher: Searcher,
    open: Arc<AtomicUsize>,
}

impl Deref for SearcherLease {
    type Target = Searcher;

    fn deref(&self) -> &Searcher {
        &self.searcher
    }
}

impl Drop for SearcherLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One hit of a page, in ascending internal id order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Hit {
    /// Internal id of the document.
    pub id: ElementId,
    /// Engine address, valid for the searcher that produced it.
    pub address: DocAddress,
}

/// Embedded index engine wrapper.
pub struct Engine {
    codec: DocumentCodec,
    writer: Mutex<Option<IndexWriter>>,
    reader: IndexReader,
    committed: AtomicU64,
    searchable: Mutex<Generation>,
    visible: Condvar,
    open_searchers: Arc<AtomicUsize>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Engine {
    /// Opens the engine on `storage`.
    pub fn open(storage: &Storage, writer_heap_bytes: usize) -> Result<Self> {
        let codec = DocumentCodec::new();
        let index = match storage {
            Storage::InMemory => Index::create_in_ram(codec.engine_schema()),
            Storage::Directory(path) => {
                std::fs::create_dir_all(path)?;
                let dir = MmapDirectory::open(path).map_err(TantivyError::from)?;
                Index::open_or_create(dir, codec.engine_schema())?
            }
        };
        let metas = index.load_metas()?;
        let payload = match metas.payload.as_deref() {
            Some(text) => serde_json::from_str::<CommitPayload>(text)?,
            None => CommitPayload::default(),
        };
        let writer: IndexWriter =
            index.writer_with_num_threads(1, writer_heap_bytes.max(MIN_WRITER_HEAP))?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let generation = Generation(metas.opstamp);
        debug!(?storage, %generation, "engine.open");
        let engine = Self {
            codec,
            writer: Mutex::new(Some(writer)),
            reader,
            committed: AtomicU64::new(metas.opstamp),
            searchable: Mutex::new(generation),
            visible: Condvar::new(),
            open_searchers: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };
        let from_docs = engine.max_id()?.map_or(1, |id| id.0 + 1);
        engine
            .next_id
            .store(from_docs.max(payload.next_id).max(1), Ordering::Release);
        Ok(engine)
    }

    /// Codec shared with the layers above.
    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    /// Hands out the next internal id; ids are never reused, across reopens
    /// included.
    pub fn allocate_id(&self) -> ElementId {
        ElementId(self.next_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Id the next [`Engine::allocate_id`] call returns.
    pub fn peek_next_id(&self) -> ElementId {
        ElementId(self.next_id.load(Ordering::Acquire))
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GraphError::Closed);
        }
        let mut guard = self.writer.lock();
        match guard.as_mut() {
            Some(writer) => f(writer),
            None => Err(GraphError::WriterFailed("index writer was dropped".into())),
        }
    }

    /// Replaces the document with the record's internal id.
    pub fn add_or_replace(&self, record: &Record) -> Result<u64> {
        let doc = self.codec.to_document(record)?;
        let term = self.codec.id_term(record.id());
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(writer.add_document(doc)?)
        })
    }

    /// Deletes the document with internal id `id`.
    pub fn delete(&self, id: ElementId) -> Result<u64> {
        let term = self.codec.id_term(id);
        self.with_writer(|writer| Ok(writer.delete_term(term)))
    }

    /// Commits pending writes together with the id allocator position.
    pub fn commit(&self) -> Result<Generation> {
        let payload = serde_json::to_string(&CommitPayload {
            next_id: self.next_id.load(Ordering::Acquire),
        })?;
        let opstamp = self.with_writer(|writer| {
            let mut prepared = writer.prepare_commit()?;
            prepared.set_payload(&payload);
            Ok(prepared.commit()?)
        })?;
        self.committed.fetch_max(opstamp, Ordering::AcqRel);
        debug!(generation = opstamp, "engine.commit");
        Ok(Generation(opstamp))
    }

    /// Last committed generation.
    pub fn committed_generation(&self) -> Generation {
        Generation(self.committed.load(Ordering::Acquire))
    }

    /// Generation visible to newly acquired searchers.
    pub fn searchable_generation(&self) -> Generation {
        *self.searchable.lock()
    }

    /// Reloads the reader to the latest commit.
    pub fn reopen(&self) -> Result<Generation> {
        let target = self.committed.load(Ordering::Acquire);
        self.reader.reload()?;
        let mut searchable = self.searchable.lock();
        if target > searchable.0 {
            searchable.0 = target;
            debug!(generation = target, "engine.reopen");
        }
        let current = *searchable;
        drop(searchable);
        self.visible.notify_all();
        Ok(current)
    }

    /// Blocks until `generation` is searchable.
    ///
    /// Reloads the reader itself once the generation is committed, so the
    /// wait does not depend on the reopen cadence.
    pub fn wait_for_generation(&self, generation: Generation) -> Result<()> {
        loop {
            if self.searchable_generation() >= generation {
                return Ok(());
            }
            if self.committed_generation() >= generation {
                self.reopen()?;
                continue;
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(GraphError::Closed);
            }
            let mut searchable = self.searchable.lock();
            if *searchable < generation {
                self.visible.wait_for(&mut searchable, WAIT_SLICE);
            }
        }
    }

    /// Acquires a searcher on the current reader state.
    pub fn acquire_searcher(&self) -> SearcherLease {
        self.open_searchers.fetch_add(1, Ordering::AcqRel);
        SearcherLease {
            searcher: self.reader.searcher(),
            open: Arc::clone(&self.open_searchers),
        }
    }

    /// Number of searcher leases not yet released.
    pub fn open_searchers(&self) -> usize {
        self.open_searchers.load(Ordering::Acquire)
    }

    /// Fetches up to `limit` hits of `filter` with an id above `after`.
    pub fn search(
        &self,
        searcher: &Searcher,
        filter: &Filter,
        after: Option<ElementId>,
        limit: usize,
    ) -> Result<Vec<Hit>> {
        let base = filter.to_query(&self.codec);
        let query: Box<dyn Query> = match after {
            Some(last) => Box::new(BooleanQuery::intersection(vec![
                base,
                Box::new(RangeQuery::new_u64_bounds(
                    fields::ID.to_string(),
                    Bound::Excluded(last.0),
                    Bound::Unbounded,
                )),
            ])),
            None => base,
        };
        let collector = TopDocs::with_limit(limit.max(1)).order_by_u64_field(fields::ID, Order::Asc);
        let hits = searcher.search(&*query, &collector)?;
        Ok(hits
            .into_iter()
            .map(|(id, address)| Hit {
                id: ElementId(id),
                address,
            })
            .collect())
    }

    /// Loads and decodes the document at `address`.
    pub fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<Record> {
        let doc: TantivyDocument = searcher.doc(address)?;
        self.codec.from_document(&doc)
    }

    /// Point lookup by internal id against the searchable state.
    pub fn get(&self, id: ElementId) -> Result<Option<Record>> {
        self.first_by_term(self.codec.id_term(id))
    }

    /// Point lookup by user id against the searchable state.
    pub fn get_by_user_id(&self, user_id: &str) -> Result<Option<Record>> {
        self.first_by_term(self.codec.user_id_term(user_id))
    }

    fn first_by_term(&self, term: Term) -> Result<Option<Record>> {
        let searcher = self.acquire_searcher();
        let query = TermQuery::new(term, self.codec.record_option());
        let hits = searcher.search(&query, &TopDocs::with_limit(1))?;
        match hits.first() {
            Some((_, address)) => self.load(&searcher, *address).map(Some),
            None => Ok(None),
        }
    }

    /// Counts searchable documents matching `filter`.
    pub fn count(&self, filter: &Filter) -> Result<usize> {
        let searcher = self.acquire_searcher();
        let query = filter.to_query(&self.codec);
        Ok(searcher.search(&*query, &Count)?)
    }

    /// Largest internal id currently searchable.
    pub fn max_id(&self) -> Result<Option<ElementId>> {
        let searcher = self.acquire_searcher();
        let collector = TopDocs::with_limit(1).order_by_u64_field(fields::ID, Order::Desc);
        let hits = searcher.search(&AllQuery, &collector)?;
        Ok(hits.first().map(|(id, _)| ElementId(*id)))
    }

    /// Drops the writer after an unrecoverable failure.
    pub fn kill_writer(&self) {
        if let Some(writer) = self.writer.lock().take() {
            drop(writer);
            warn!("engine.writer_dropped");
        }
    }

    /// Whether the writer is still usable.
    pub fn is_writable(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.writer.lock().is_some()
    }

    /// Waits for merges and releases the writer; idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let writer = self.writer.lock().take();
        self.visible.notify_all();
        if let Some(writer) = writer {
            writer.wait_merging_threads()?;
        }
        info!(generation = %self.committed_generation(), "engine.close");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::types::ElementKind;

    fn engine() -> Engine {
        Engine::open(&Storage::InMemory, 0).unwrap()
    }

    fn vertex(id: u64) -> Record {
        let mut record = Record::vertex(ElementId(id), Some(format!("v{id}")));
        record.set_property("n", Value::Long(id as i64));
        record
    }

    #[test]
    fn commit_generations_increase() -> Result<()> {
        let engine = engine();
        engine.add_or_replace(&vertex(1))?;
        let first = engine.commit()?;
        engine.add_or_replace(&vertex(2))?;
        let second = engine.commit()?;
        assert!(second > first);
        engine.wait_for_generation(second)?;
        assert!(engine.searchable_generation() >= second);
        Ok(())
    }

    #[test]
    fn replace_keeps_a_single_document() -> Result<()> {
        let engine = engine();
        engine.add_or_replace(&vertex(1))?;
        let mut changed = vertex(1);
        changed.set_property("n", Value::Long(99));
        engine.add_or_replace(&changed)?;
        let generation = engine.commit()?;
        engine.wait_for_generation(generation)?;

        assert_eq!(engine.count(&Filter::All)?, 1);
        let stored = engine.get(ElementId(1))?.unwrap();
        assert_eq!(stored.property("n"), Some(&Value::Long(99)));
        assert_eq!(engine.get_by_user_id("v1")?.map(|r| r.id()), Some(ElementId(1)));
        Ok(())
    }

    #[test]
    fn search_after_pages_in_id_order() -> Result<()> {
        let engine = engine();
        for id in [5, 1, 4, 2, 3] {
            engine.add_or_replace(&vertex(id))?;
        }
        let generation = engine.commit()?;
        engine.wait_for_generation(generation)?;

        let searcher = engine.acquire_searcher();
        let filter = Filter::Kind(ElementKind::Vertex);
        let first = engine.search(&searcher, &filter, None, 2)?;
        let second = engine.search(&searcher, &filter, first.last().map(|h| h.id), 2)?;
        let third = engine.search(&searcher, &filter, second.last().map(|h| h.id), 2)?;
        let ids: Vec<u64> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|h| h.id.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn searcher_leases_are_counted() {
        let engine = engine();
        let a = engine.acquire_searcher();
        let b = engine.acquire_searcher();
        assert_eq!(engine.open_searchers(), 2);
        drop(a);
        drop(b);
        assert_eq!(engine.open_searchers(), 0);
    }

    #[test]
    fn ids_are_not_reused_after_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::Directory(dir.path().to_path_buf());
        {
            let engine = Engine::open(&storage, 0)?;
            let last = (0..6).map(|_| engine.allocate_id()).last().unwrap();
            engine.add_or_replace(&vertex(last.0))?;
            engine.delete(last)?;
            engine.commit()?;
            engine.close()?;
        }
        let engine = Engine::open(&storage, 0)?;
        assert_eq!(engine.peek_next_id(), ElementId(7));
        Ok(())
    }

    #[test]
    fn killed_writer_reports_failure() {
        let engine = engine();
        engine.kill_writer();
        assert!(!engine.is_writable());
        let err = engine.add_or_replace(&vertex(1)).unwrap_err();
        assert!(err.is_fatal());
    }
}
