use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::vec;

use smallvec::SmallVec;

use crate::cursor::FilterSequence;
use crate::engine::Filter;
use crate::error::Result;
use crate::options::AdjacencyStrategy;
use crate::record::{Record, Value};
use crate::types::{Direction, ElementId, ElementKind};

use super::{Edge, GraphCore};

/// View over one vertex record.
///
/// The view holds the snapshot it was read or last written as; other
/// handles to the same vertex do not see its later mutations until
/// [`Vertex::reload`].
#[derive(Clone)]
pub struct Vertex {
    core: Arc<GraphCore>,
    record: Arc<Record>,
}

impl Vertex {
    pub(crate) fn new(core: Arc<GraphCore>, record: Arc<Record>) -> Self {
        Self { core, record }
    }

    /// Internal id.
    pub fn id(&self) -> ElementId {
        self.record.id()
    }

    /// User id, if one was given at creation.
    pub fn user_id(&self) -> Option<&str> {
        self.record.user_id()
    }

    /// Value of `key` in this view's snapshot.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.record.property(key)
    }

    /// All properties of the snapshot.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        self.record.properties()
    }

    /// Property names, sorted.
    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.record.properties().keys().map(String::as_str)
    }

    /// Underlying record snapshot.
    pub fn record(&self) -> &Arc<Record> {
        &self.record
    }

    /// Sets `key`, returning the previous value.
    ///
    /// The property is always stored; it is searchable only when its key is
    /// mapped in the schema.
    ///
    /// Writes to one element apply one at a time against its latest version,
    /// so concurrent writes of different keys all survive. Concurrent writes
    /// of the same key keep whichever lands last.
    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let (record, previous) =
            self.core
                .set_property(ElementKind::Vertex, self.id(), key, value.into())?;
        self.record = record;
        Ok(previous)
    }

    /// Removes `key`, returning its value.
    pub fn remove_property(&mut self, key: &str) -> Result<Option<Value>> {
        let (record, previous) = self
            .core
            .remove_property(ElementKind::Vertex, self.id(), key)?;
        self.record = record;
        Ok(previous)
    }

    /// Re-reads the latest version of the vertex.
    pub fn reload(&mut self) -> Result<()> {
        self.record = Arc::new(self.core.latest(ElementKind::Vertex, self.id())?);
        Ok(())
    }

    /// Searchable edges whose `direction` endpoint is this vertex, optionally
    /// restricted to `labels`.
    pub fn edges(&self, direction: Direction, labels: &[&str]) -> FilterSequence<Edge> {
        let mut filter = Filter::Endpoint {
            direction,
            vertex: self.id(),
        };
        if let Some(labels) = Filter::labels(labels.iter().copied()) {
            filter = filter.and(labels);
        }
        self.core.edge_sequence(Some(filter))
    }

    /// Edges listed on the latest version of this vertex, resolved one by one.
    ///
    /// Unlike [`Vertex::edges`], unflushed edges are included.
    pub fn adjacent_edges(&self, direction: Direction, labels: &[&str]) -> Result<ListedEdges> {
        let latest = self.core.latest(ElementKind::Vertex, self.id())?;
        Ok(ListedEdges {
            core: Arc::clone(&self.core),
            ids: latest.edges(direction).to_vec().into_iter(),
            labels: labels.iter().map(|label| (*label).to_owned()).collect(),
        })
    }

    /// Outgoing edges resolved with the configured [`AdjacencyStrategy`].
    pub fn out_edges(&self, labels: &[&str]) -> Result<IncidentEdges> {
        self.incident(Direction::Out, labels)
    }

    /// Incoming edges resolved with the configured [`AdjacencyStrategy`].
    pub fn in_edges(&self, labels: &[&str]) -> Result<IncidentEdges> {
        self.incident(Direction::In, labels)
    }

    fn incident(&self, direction: Direction, labels: &[&str]) -> Result<IncidentEdges> {
        match self.core.buffer().options().adjacency {
            AdjacencyStrategy::Filter => Ok(IncidentEdges::Filtered(self.edges(direction, labels))),
            AdjacencyStrategy::IdList => {
                self.adjacent_edges(direction, labels).map(IncidentEdges::Listed)
            }
        }
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Vertex {}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id())
            .field("user_id", &self.user_id())
            .field("properties", self.properties())
            .finish()
    }
}

/// Edges resolved from a vertex's adjacency id list.
///
/// Ids whose edge has since been removed are skipped.
pub struct ListedEdges {
    core: Arc<GraphCore>,
    ids: vec::IntoIter<ElementId>,
    labels: SmallVec<[String; 4]>,
}

impl Iterator for ListedEdges {
    type Item = Result<Edge>;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            let record = match self.core.buffer().find_by_id(id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            };
            let labelled = self.labels.is_empty()
                || record
                    .label()
                    .is_some_and(|label| self.labels.iter().any(|l| l == label));
            if record.kind() == ElementKind::Edge && labelled {
                return Some(Ok(Edge::new(Arc::clone(&self.core), record)));
            }
        }
        None
    }
}

/// Incident edges of a vertex, produced by either adjacency strategy.
pub enum IncidentEdges {
    /// Filter sequence over searchable edge documents.
    Filtered(FilterSequence<Edge>),
    /// Lazy resolution of the vertex's id list.
    Listed(ListedEdges),
}

impl IncidentEdges {
    /// Releases any engine resources; idempotent.
    pub fn close(&mut self) {
        if let IncidentEdges::Filtered(seq) = self {
            seq.close();
        }
    }
}

impl Iterator for IncidentEdges {
    type Item = Result<Edge>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            IncidentEdges::Filtered(seq) => seq.next(),
            IncidentEdges::Listed(list) => list.next(),
        }
    }
}
