//! Property graph façade.
//!
//! [`Graph`] owns the write buffer, the schema and the automatic index table.
//! Vertices and edges are handed out as [`Vertex`] and [`Edge`] views over an
//! immutable [`Record`] snapshot; every mutation builds a new record from the
//! latest buffered version and replaces it by internal id.
//!
//! Operations touching more than one document (linking or unlinking an edge,
//! removing a vertex with its incident edges) and `close` run under the
//! exclusive side of the lifecycle lock; single-document writes take the
//! shared side.

mod edge;
mod vertex;

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::buffer::WriteBuffer;
use crate::cursor::FilterSequence;
use crate::engine::Filter;
use crate::error::{GraphError, Result};
use crate::index::{AutomaticIndex, IndexRegistry, KeySet};
use crate::options::GraphOptions;
use crate::record::{Record, Value};
use crate::schema::{fields, Schema, SemanticType};
use crate::types::{Direction, ElementId, ElementKind, Generation};

pub use edge::Edge;
pub use vertex::{IncidentEdges, ListedEdges, Vertex};

/// State shared by the graph and every element view it hands out.
pub(crate) struct GraphCore {
    buffer: Arc<WriteBuffer>,
    schema: Arc<Schema>,
    indices: IndexRegistry,
    claims: DashMap<String, ()>,
    lifecycle: RwLock<()>,
    element_locks: Vec<Mutex<()>>,
}

const ELEMENT_LOCK_SHARDS: usize = 64;

/// Holds a user id reserved until the element carrying it is buffered.
struct UserIdClaim<'a> {
    claims: &'a DashMap<String, ()>,
    user_id: String,
}

impl Drop for UserIdClaim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.user_id);
    }
}

impl GraphCore {
    pub(crate) fn buffer(&self) -> &Arc<WriteBuffer> {
        &self.buffer
    }

    fn page_size(&self) -> usize {
        self.buffer.options().page_size
    }

    /// Serializes property read-modify-write cycles on one element.
    fn element_lock(&self, id: ElementId) -> &Mutex<()> {
        &self.element_locks[(id.0 as usize) % self.element_locks.len()]
    }

    /// Reserves `user_id`, failing if a live element or a concurrent insert
    /// already holds it.
    fn claim(&self, user_id: &str) -> Result<UserIdClaim<'_>> {
        match self.claims.entry(user_id.to_owned()) {
            Entry::Occupied(_) => return Err(GraphError::DuplicateUserId(user_id.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        let claim = UserIdClaim {
            claims: &self.claims,
            user_id: user_id.to_owned(),
        };
        if self.buffer.find_by_user_id(user_id)?.is_some() {
            return Err(GraphError::DuplicateUserId(user_id.to_owned()));
        }
        Ok(claim)
    }

    fn find(&self, kind: ElementKind, id: ElementId) -> Result<Option<Arc<Record>>> {
        Ok(self
            .buffer
            .find_by_id(id)?
            .filter(|record| record.kind() == kind))
    }

    /// Owned copy of the latest version of an element.
    pub(crate) fn latest(&self, kind: ElementKind, id: ElementId) -> Result<Record> {
        self.find(kind, id)?
            .map(|record| (*record).clone())
            .ok_or(GraphError::ElementNotFound { kind, id })
    }

    fn check_settable(kind: ElementKind, key: &str) -> Result<()> {
        let reserved = fields::is_reserved(key)
            || key == "id"
            || (kind == ElementKind::Edge && key == "label");
        if reserved {
            return Err(GraphError::ReservedProperty(key.to_owned()));
        }
        Ok(())
    }

    /// Sets `key` on the latest version of an element and persists it.
    pub(crate) fn set_property(
        &self,
        kind: ElementKind,
        id: ElementId,
        key: &str,
        value: Value,
    ) -> Result<(Arc<Record>, Option<Value>)> {
        Self::check_settable(kind, key)?;
        let _lifecycle = self.lifecycle.read();
        let _element = self.element_lock(id).lock();
        let mut record = self.latest(kind, id)?;
        let previous = record.set_property(key, value);
        let stored = match self.indices.get(kind) {
            Some(index) => index.on_property_set(record, key)?,
            None => {
                self.schema.index_property(&mut record, key)?;
                self.buffer.put(record)?
            }
        };
        Ok((stored, previous))
    }

    /// Removes `key` from the latest version of an element.
    ///
    /// Nothing is written when the element does not carry `key`.
    pub(crate) fn remove_property(
        &self,
        kind: ElementKind,
        id: ElementId,
        key: &str,
    ) -> Result<(Arc<Record>, Option<Value>)> {
        Self::check_settable(kind, key)?;
        let _lifecycle = self.lifecycle.read();
        let _element = self.element_lock(id).lock();
        let mut record = self.latest(kind, id)?;
        let Some(previous) = record.remove_property(key) else {
            return Ok((Arc::new(record), None));
        };
        let stored = match self.indices.get(kind) {
            Some(index) => index.on_property_removed(record, key)?,
            None => self.buffer.put(record)?,
        };
        Ok((stored, Some(previous)))
    }

    /// Strips `edge` from the adjacency lists of its endpoints, skipping
    /// `except`. Missing endpoints are ignored.
    fn detach(&self, edge: &Record, except: Option<ElementId>) -> Result<()> {
        let out = edge.endpoint(Direction::Out);
        let inbound = edge.endpoint(Direction::In);
        let mut touched: Vec<ElementId> = out.into_iter().chain(inbound).collect();
        touched.dedup();
        for vertex_id in touched {
            if Some(vertex_id) == except {
                continue;
            }
            let Some(vertex) = self.find(ElementKind::Vertex, vertex_id)? else {
                continue;
            };
            let mut vertex = (*vertex).clone();
            let mut changed = false;
            if out == Some(vertex_id) {
                changed |= vertex.remove_edge(Direction::Out, edge.id());
            }
            if inbound == Some(vertex_id) {
                changed |= vertex.remove_edge(Direction::In, edge.id());
            }
            if changed {
                self.buffer.put(vertex)?;
            }
        }
        Ok(())
    }

    fn delete_edge(&self, edge: &Record, except: Option<ElementId>) -> Result<()> {
        self.detach(edge, except)?;
        self.buffer
            .delete(edge.id(), edge.user_id().map(str::to_owned))?;
        self.buffer.metrics().edge_deleted();
        debug!(id = %edge.id(), "graph.remove_edge");
        Ok(())
    }

    /// Deletes vertex `id` and every edge incident to it.
    pub(crate) fn remove_vertex(&self, id: ElementId) -> Result<()> {
        let _lifecycle = self.lifecycle.write();
        let record = self.latest(ElementKind::Vertex, id)?;
        let mut incident: Vec<ElementId> = record
            .edges(Direction::Out)
            .iter()
            .chain(record.edges(Direction::In))
            .copied()
            .collect();
        incident.sort_unstable();
        incident.dedup();
        for edge_id in incident {
            if let Some(edge) = self.find(ElementKind::Edge, edge_id)? {
                self.delete_edge(&edge, Some(id))?;
            }
        }
        self.buffer
            .delete(id, record.user_id().map(str::to_owned))?;
        self.buffer.metrics().vertex_deleted();
        debug!(%id, "graph.remove_vertex");
        Ok(())
    }

    /// Deletes edge `id` and unlinks it from both endpoints.
    pub(crate) fn remove_edge(&self, id: ElementId) -> Result<()> {
        let _lifecycle = self.lifecycle.write();
        let record = self.latest(ElementKind::Edge, id)?;
        self.delete_edge(&record, None)
    }

    /// Vertex sequence whose `remove_current` cascades like
    /// [`Graph::remove_vertex`].
    pub(crate) fn vertex_sequence(
        self: &Arc<Self>,
        extra: Option<Filter>,
    ) -> FilterSequence<Vertex> {
        let views = Arc::clone(self);
        let removals = Arc::clone(self);
        FilterSequence::new(
            Arc::clone(&self.buffer),
            ElementKind::Vertex,
            extra,
            self.page_size(),
        )
        .map_items(move |record| Vertex::new(Arc::clone(&views), record))
        .with_remover(move |id| removals.remove_vertex(id))
    }

    /// Edge sequence whose `remove_current` detaches like
    /// [`Graph::remove_edge`].
    pub(crate) fn edge_sequence(
        self: &Arc<Self>,
        extra: Option<Filter>,
    ) -> FilterSequence<Edge> {
        let views = Arc::clone(self);
        let removals = Arc::clone(self);
        FilterSequence::new(
            Arc::clone(&self.buffer),
            ElementKind::Edge,
            extra,
            self.page_size(),
        )
        .map_items(move |record| Edge::new(Arc::clone(&views), record))
        .with_remover(move |id| removals.remove_edge(id))
    }
}

/// Point-in-time view of store internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphStats {
    /// Operations waiting for the next flush.
    pub pending_ops: usize,
    /// Committed snapshots still held by the real-time cache.
    pub cached_snapshots: usize,
    /// Searcher leases currently open.
    pub open_searchers: usize,
    /// Generation of the last commit.
    pub committed: Generation,
    /// Generation visible to new searches.
    pub searchable: Generation,
}

/// A property graph stored as documents in an embedded search index.
pub struct Graph {
    core: Arc<GraphCore>,
}

impl Graph {
    /// Opens or creates a graph with the given options.
    pub fn open(opts: GraphOptions) -> Result<Self> {
        let buffer = Arc::new(WriteBuffer::open(opts)?);
        info!(storage = ?buffer.options().storage, "graph.open");
        Ok(Self {
            core: Arc::new(GraphCore {
                buffer,
                schema: Arc::new(Schema::new()),
                indices: IndexRegistry::default(),
                claims: DashMap::new(),
                lifecycle: RwLock::new(()),
                element_locks: (0..ELEMENT_LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
            }),
        })
    }

    /// Opens an empty in-memory graph with default options.
    pub fn in_memory() -> Result<Self> {
        Self::open(GraphOptions::in_memory())
    }

    /// Field mappings of both element kinds.
    pub fn schema(&self) -> &Schema {
        &self.core.schema
    }

    /// Write buffer behind the graph.
    pub fn buffer(&self) -> &WriteBuffer {
        &self.core.buffer
    }

    /// Effective options.
    pub fn options(&self) -> &GraphOptions {
        self.core.buffer.options()
    }

    // ------------------------------------------------------------------
    // Vertices
    // ------------------------------------------------------------------

    /// Adds a vertex, optionally identified by a store-wide unique `user_id`.
    pub fn add_vertex(&self, user_id: Option<&str>) -> Result<Vertex> {
        let _lifecycle = self.core.lifecycle.read();
        let _claim = user_id.map(|uid| self.core.claim(uid)).transpose()?;
        let id = self.core.buffer.engine().allocate_id();
        let record = self
            .core
            .buffer
            .create(Record::vertex(id, user_id.map(str::to_owned)))?;
        self.core.buffer.metrics().vertex_created();
        debug!(%id, user_id, "graph.add_vertex");
        Ok(Vertex::new(Arc::clone(&self.core), record))
    }

    /// Vertex carrying `user_id`.
    pub fn vertex(&self, user_id: &str) -> Result<Option<Vertex>> {
        Ok(self
            .core
            .buffer
            .find_by_user_id(user_id)?
            .filter(|record| record.kind() == ElementKind::Vertex)
            .map(|record| Vertex::new(Arc::clone(&self.core), record)))
    }

    /// Vertex with internal id `id`.
    pub fn vertex_by_id(&self, id: ElementId) -> Result<Option<Vertex>> {
        Ok(self
            .core
            .find(ElementKind::Vertex, id)?
            .map(|record| Vertex::new(Arc::clone(&self.core), record)))
    }

    /// Every searchable vertex in internal id order.
    ///
    /// `remove_current` on the sequence removes incident edges as well.
    pub fn vertices(&self) -> FilterSequence<Vertex> {
        self.core.vertex_sequence(None)
    }

    /// Removes a vertex together with every incident edge.
    pub fn remove_vertex(&self, vertex: &Vertex) -> Result<()> {
        self.core.remove_vertex(vertex.id())
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Links `out` to `inbound` with a labelled edge and records the edge on
    /// both endpoints.
    pub fn add_edge(
        &self,
        user_id: Option<&str>,
        out: &Vertex,
        inbound: &Vertex,
        label: &str,
    ) -> Result<Edge> {
        if label.is_empty() {
            return Err(GraphError::InvalidArgument("edge label must not be empty".into()));
        }
        let _lifecycle = self.core.lifecycle.write();
        let _claim = user_id.map(|uid| self.core.claim(uid)).transpose()?;
        let mut source = self.core.latest(ElementKind::Vertex, out.id())?;
        let mut target = if inbound.id() == out.id() {
            None
        } else {
            Some(self.core.latest(ElementKind::Vertex, inbound.id())?)
        };

        let id = self.core.buffer.engine().allocate_id();
        let edge = self.core.buffer.create(Record::edge(
            id,
            user_id.map(str::to_owned),
            label,
            out.id(),
            inbound.id(),
        ))?;
        source.push_edge(Direction::Out, id);
        match target.as_mut() {
            Some(target) => target.push_edge(Direction::In, id),
            None => source.push_edge(Direction::In, id),
        }
        self.core.buffer.put(source)?;
        if let Some(target) = target {
            self.core.buffer.put(target)?;
        }
        self.core.buffer.metrics().edge_created();
        debug!(%id, label, out = %out.id(), inbound = %inbound.id(), "graph.add_edge");
        Ok(Edge::new(Arc::clone(&self.core), edge))
    }

    /// Edge carrying `user_id`.
    pub fn edge(&self, user_id: &str) -> Result<Option<Edge>> {
        Ok(self
            .core
            .buffer
            .find_by_user_id(user_id)?
            .filter(|record| record.kind() == ElementKind::Edge)
            .map(|record| Edge::new(Arc::clone(&self.core), record)))
    }

    /// Edge with internal id `id`.
    pub fn edge_by_id(&self, id: ElementId) -> Result<Option<Edge>> {
        Ok(self
            .core
            .find(ElementKind::Edge, id)?
            .map(|record| Edge::new(Arc::clone(&self.core), record)))
    }

    /// Every searchable edge in internal id order.
    ///
    /// `remove_current` on the sequence unlinks the edge from its endpoints.
    pub fn edges(&self) -> FilterSequence<Edge> {
        self.core.edge_sequence(None)
    }

    /// Removes an edge and unlinks it from both endpoints.
    pub fn remove_edge(&self, edge: &Edge) -> Result<()> {
        self.core.remove_edge(edge.id())
    }

    // ------------------------------------------------------------------
    // Indexes and queries
    // ------------------------------------------------------------------

    /// Creates the automatic index of `kind`.
    ///
    /// Elements written before the index existed are not reindexed.
    pub fn create_automatic_index(
        &self,
        name: &str,
        kind: ElementKind,
        keys: KeySet,
    ) -> Result<Arc<AutomaticIndex>> {
        self.core.indices.register(
            name,
            kind,
            keys,
            &self.core.schema,
            &self.core.buffer,
            self.core.page_size(),
        )
    }

    /// Automatic index `name` of `kind`.
    pub fn automatic_index(&self, name: &str, kind: ElementKind) -> Result<Arc<AutomaticIndex>> {
        self.core.indices.by_name(name, kind)
    }

    /// Unregisters the index named `name`. Field mappings stay in place.
    pub fn drop_index(&self, name: &str) -> bool {
        self.core.indices.drop_index(name)
    }

    /// Every registered automatic index.
    pub fn indices(&self) -> Vec<Arc<AutomaticIndex>> {
        self.core.indices.all()
    }

    /// Makes `field` of `kind` searchable as `ty`.
    pub fn define_field(
        &self,
        kind: ElementKind,
        field: &str,
        ty: SemanticType,
    ) -> Result<Option<SemanticType>> {
        if fields::is_reserved(field) {
            return Err(GraphError::ReservedProperty(field.to_owned()));
        }
        self.core.schema.define(kind, field, ty)
    }

    fn property_filter(&self, kind: ElementKind, key: &str, value: &Value) -> Result<Filter> {
        let not_indexed = || GraphError::KeyNotIndexed {
            kind,
            key: key.to_owned(),
        };
        if fields::is_reserved(key) {
            return Err(not_indexed());
        }
        let (ty, tokens) = self
            .core
            .schema
            .encode_query(kind, key, value)?
            .ok_or_else(not_indexed)?;
        Ok(Filter::property(key, ty, tokens))
    }

    /// Searchable vertices whose mapped field `key` matches `value`.
    pub fn vertices_by(&self, key: &str, value: &Value) -> Result<FilterSequence<Vertex>> {
        let filter = self.property_filter(ElementKind::Vertex, key, value)?;
        Ok(self.core.vertex_sequence(Some(filter)))
    }

    /// Searchable edges whose mapped field `key` matches `value`.
    pub fn edges_by(&self, key: &str, value: &Value) -> Result<FilterSequence<Edge>> {
        let filter = self.property_filter(ElementKind::Edge, key, value)?;
        Ok(self.core.edge_sequence(Some(filter)))
    }

    /// Number of searchable `kind` elements whose mapped field `key` matches
    /// `value`.
    pub fn count(&self, kind: ElementKind, key: &str, value: &Value) -> Result<usize> {
        let filter = Filter::Kind(kind).and(self.property_filter(kind, key, value)?);
        self.core.buffer.engine().count(&filter)
    }

    // ------------------------------------------------------------------
    // Visibility and lifecycle
    // ------------------------------------------------------------------

    /// Flushes and waits until every prior write is searchable.
    pub fn refresh(&self) -> Result<Generation> {
        self.core.buffer.refresh()
    }

    /// Blocks until `generation` is searchable.
    pub fn flush(&self, generation: Generation) -> Result<()> {
        self.core.buffer.flush(generation)
    }

    /// Snapshot of buffer, cache and reader state.
    pub fn stats(&self) -> GraphStats {
        let buffer = &self.core.buffer;
        GraphStats {
            pending_ops: buffer.pending_len(),
            cached_snapshots: buffer.cached_snapshot_count(),
            open_searchers: buffer.engine().open_searchers(),
            committed: buffer.engine().committed_generation(),
            searchable: buffer.engine().searchable_generation(),
        }
    }

    /// Flushes outstanding writes and closes the engine; idempotent.
    pub fn close(&self) -> Result<()> {
        let _lifecycle = self.core.lifecycle.write();
        let result = self.core.buffer.close();
        info!("graph.close");
        result
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "graph.close_on_drop_failed");
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("options", self.options())
            .field("stats", &self.stats())
            .finish()
    }
}
