//! Paginated, closeable iteration over engine search results.
//!
//! A [`FilterSequence`] fetches one page of hits at a time in ascending
//! internal id order and asks for the next page with "id greater than the
//! last hit", so deep scans never pay for skipped offsets. The searcher lease
//! is taken on the first fetch and kept until the sequence is exhausted,
//! fails, is closed or is dropped; every page of one sequence therefore reads
//! the same engine snapshot.
//!
//! Hits are overlaid with the write buffer before they are handed out: a
//! newer buffered version of a hit replaces it when it still matches the
//! filter, and a buffered delete hides it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::buffer::WriteBuffer;
use crate::engine::{Filter, Hit, SearcherLease};
use crate::error::{GraphError, Result};
use crate::record::Record;
use crate::types::{ElementId, ElementKind};

/// Default number of hits fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

type Materialize<T> = Box<dyn FnMut(Arc<Record>) -> T + Send>;
type Remover = Box<dyn FnMut(ElementId) -> Result<()> + Send>;

struct CursorState {
    buffer: Arc<WriteBuffer>,
    filter: Filter,
    page_size: usize,
    lease: Option<SearcherLease>,
    page: VecDeque<Hit>,
    last_page_full: bool,
    last_id: Option<ElementId>,
    peeked: Option<Arc<Record>>,
    current: Option<(ElementId, Option<String>)>,
    started: bool,
    closed: bool,
}

impl CursorState {
    fn fetch_page(&mut self) -> Result<()> {
        if self.lease.is_none() {
            self.lease = Some(self.buffer.engine().acquire_searcher());
        }
        let Some(lease) = self.lease.as_ref() else {
            return Err(GraphError::Closed);
        };
        let hits = self
            .buffer
            .engine()
            .search(lease, &self.filter, self.last_id, self.page_size)?;
        trace!(hits = hits.len(), after = ?self.last_id, "cursor.page");
        self.last_page_full = hits.len() >= self.page_size;
        if let Some(last) = hits.last() {
            self.last_id = Some(last.id);
        }
        self.page.extend(hits);
        self.started = true;
        Ok(())
    }

    /// Current version of a hit, or `None` when the buffer shadows it.
    fn resolve(&self, hit: Hit) -> Result<Option<Arc<Record>>> {
        if let Some(op) = self.buffer.overlay(hit.id) {
            return Ok(op
                .record()
                .filter(|record| self.filter.matches(record))
                .cloned());
        }
        let Some(lease) = self.lease.as_ref() else {
            return Err(GraphError::Closed);
        };
        self.buffer.engine().load(lease, hit.address).map(|r| Some(Arc::new(r)))
    }

    /// Moves to the next live record, fetching pages as needed.
    fn advance(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        loop {
            if let Some(hit) = self.page.pop_front() {
                if let Some(record) = self.resolve(hit)? {
                    self.peeked = Some(record);
                    return Ok(true);
                }
                continue;
            }
            if self.started && !self.last_page_full {
                self.close();
                return Ok(false);
            }
            self.fetch_page()?;
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.lease = None;
            self.page.clear();
            trace!("cursor.close");
        }
    }
}

/// Lazy cursor over documents matching a composed filter.
///
/// Not safe for concurrent use; one thread drives one sequence.
pub struct FilterSequence<T> {
    state: CursorState,
    materialize: Materialize<T>,
    remover: Option<Remover>,
}

impl FilterSequence<Arc<Record>> {
    /// Sequence over `kind` documents, optionally restricted by `extra`.
    pub fn new(
        buffer: Arc<WriteBuffer>,
        kind: ElementKind,
        extra: Option<Filter>,
        page_size: usize,
    ) -> Self {
        let filter = match extra {
            Some(extra) => Filter::Kind(kind).and(extra),
            None => Filter::Kind(kind),
        };
        Self {
            state: CursorState {
                buffer,
                filter,
                page_size: page_size.max(1),
                lease: None,
                page: VecDeque::new(),
                last_page_full: false,
                last_id: None,
                peeked: None,
                current: None,
                started: false,
                closed: false,
            },
            materialize: Box::new(|record| record),
            remover: None,
        }
    }
}

impl<T> FilterSequence<T> {
    /// Wraps every yielded item with `f`.
    pub fn map_items<U, F>(self, mut f: F) -> FilterSequence<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        T: 'static,
        U: 'static,
    {
        let mut inner = self.materialize;
        FilterSequence {
            state: self.state,
            materialize: Box::new(move |record| f(inner(record))),
            remover: self.remover,
        }
    }

    /// Routes [`FilterSequence::remove_current`] through `f` instead of a
    /// plain buffered delete of the one document.
    pub fn with_remover<F>(mut self, f: F) -> Self
    where
        F: FnMut(ElementId) -> Result<()> + Send + 'static,
    {
        self.remover = Some(Box::new(f));
        self
    }

    /// Composed filter driving the sequence.
    pub fn filter(&self) -> &Filter {
        &self.state.filter
    }

    /// Whether another element is available; fetches the next page if the
    /// current one is used up.
    pub fn has_next(&mut self) -> Result<bool> {
        let result = self.state.advance();
        if result.is_err() {
            self.state.close();
        }
        result
    }

    /// Deletes the element most recently returned by `next`.
    ///
    /// Uses the remover installed with [`FilterSequence::with_remover`] when
    /// there is one. Pages already fetched are unaffected.
    pub fn remove_current(&mut self) -> Result<()> {
        let Some((id, user_id)) = self.state.current.take() else {
            return Err(GraphError::InvalidArgument(
                "no current element to remove".into(),
            ));
        };
        match self.remover.as_mut() {
            Some(remove) => remove(id),
            None => self.state.buffer.delete(id, user_id),
        }
    }

    /// Releases the searcher lease; idempotent.
    pub fn close(&mut self) {
        self.state.peeked = None;
        self.state.close();
    }

    /// Whether the lease has been released.
    pub fn is_closed(&self) -> bool {
        self.state.closed
    }
}

impl<T> Iterator for FilterSequence<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => {
                let record = self.state.peeked.take()?;
                self.state.current = Some((record.id(), record.user_id().map(str::to_owned)));
                Some(Ok((self.materialize)(record)))
            }
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl<T> fmt::Debug for FilterSequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSequence")
            .field("filter", &self.state.filter)
            .field("page_size", &self.state.page_size)
            .field("buffered", &self.state.page.len())
            .field("closed", &self.state.closed)
            .field("custom_remover", &self.remover.is_some())
            .finish()
    }
}
