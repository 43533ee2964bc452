use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::record::{Record, Value};
use crate::types::{Direction, ElementId, ElementKind};

use super::{GraphCore, Vertex};

/// View over one edge record.
#[derive(Clone)]
pub struct Edge {
    core: Arc<GraphCore>,
    record: Arc<Record>,
}

impl Edge {
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

    /// Label given at creation.
    pub fn label(&self) -> &str {
        self.record.label().unwrap_or_default()
    }

    /// Internal id of the `direction` endpoint.
    pub fn endpoint(&self, direction: Direction) -> Option<ElementId> {
        self.record.endpoint(direction)
    }

    /// Latest version of the `direction` endpoint.
    pub fn vertex(&self, direction: Direction) -> Result<Vertex> {
        let id = self
            .endpoint(direction)
            .ok_or_else(|| GraphError::Corruption(format!("edge {} has no {direction:?} vertex", self.id())))?;
        let record = self.core.latest(ElementKind::Vertex, id)?;
        Ok(Vertex::new(Arc::clone(&self.core), Arc::new(record)))
    }

    /// Source vertex.
    pub fn out_vertex(&self) -> Result<Vertex> {
        self.vertex(Direction::Out)
    }

    /// Destination vertex.
    pub fn in_vertex(&self) -> Result<Vertex> {
        self.vertex(Direction::In)
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

    /// Sets `key`, returning the previous value. `label` is reserved.
    ///
    /// Writes to one element apply one at a time against its latest version,
    /// so concurrent writes of different keys all survive. Concurrent writes
    /// of the same key keep whichever lands last.
    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        let (record, previous) =
            self.core
                .set_property(ElementKind::Edge, self.id(), key, value.into())?;
        self.record = record;
        Ok(previous)
    }

    /// Removes `key`, returning its value.
    pub fn remove_property(&mut self, key: &str) -> Result<Option<Value>> {
        let (record, previous) = self
            .core
            .remove_property(ElementKind::Edge, self.id(), key)?;
        self.record = record;
        Ok(previous)
    }

    /// Re-reads the latest version of the edge.
    pub fn reload(&mut self) -> Result<()> {
        self.record = Arc::new(self.core.latest(ElementKind::Edge, self.id())?);
        Ok(())
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Edge {}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("out", &self.endpoint(Direction::Out))
            .field("in", &self.endpoint(Direction::In))
            .finish()
    }
}
