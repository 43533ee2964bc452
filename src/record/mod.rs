//! Flat document representation of vertices and edges.
//!
//! A [`Record`] carries the reserved graph fields (kind, ids, label, adjacency)
//! plus user properties and the search tokens the schema derived from them.
//! Records are immutable once handed to the write buffer; a mutation builds a
//! new record and replaces the old one by internal id.

mod codec;
mod value;

use std::collections::BTreeMap;

use crate::types::{Direction, ElementId, ElementKind};

pub use codec::DocumentCodec;
pub use value::Value;

/// One vertex or edge document.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    kind: ElementKind,
    id: ElementId,
    user_id: Option<String>,
    label: Option<String>,
    out_vertex: Option<ElementId>,
    in_vertex: Option<ElementId>,
    out_edges: Vec<ElementId>,
    in_edges: Vec<ElementId>,
    properties: BTreeMap<String, Value>,
    terms: BTreeMap<String, Vec<String>>,
}

impl Record {
    /// Creates an empty vertex record.
    pub fn vertex(id: ElementId, user_id: Option<String>) -> Self {
        Self::empty(ElementKind::Vertex, id, user_id)
    }

    /// Creates an edge record linking `out` to `inbound`.
    pub fn edge(
        id: ElementId,
        user_id: Option<String>,
        label: impl Into<String>,
        out: ElementId,
        inbound: ElementId,
    ) -> Self {
        let mut record = Self::empty(ElementKind::Edge, id, user_id);
        record.label = Some(label.into());
        record.out_vertex = Some(out);
        record.in_vertex = Some(inbound);
        record
    }

    pub(crate) fn empty(kind: ElementKind, id: ElementId, user_id: Option<String>) -> Self {
        Self {
            kind,
            id,
            user_id,
            label: None,
            out_vertex: None,
            in_vertex: None,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            properties: BTreeMap::new(),
            terms: BTreeMap::new(),
        }
    }

    /// Whether this is a vertex or an edge.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Internal id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Caller-chosen unique id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Edge label; `None` for vertices.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Endpoint vertex of an edge record.
    pub fn endpoint(&self, direction: Direction) -> Option<ElementId> {
        match direction {
            Direction::Out => self.out_vertex,
            Direction::In => self.in_vertex,
        }
    }

    /// Incident edge ids of a vertex record.
    pub fn edges(&self, direction: Direction) -> &[ElementId] {
        match direction {
            Direction::Out => &self.out_edges,
            Direction::In => &self.in_edges,
        }
    }

    pub(crate) fn push_edge(&mut self, direction: Direction, edge: ElementId) {
        let list = self.edges_mut(direction);
        if !list.contains(&edge) {
            list.push(edge);
        }
    }

    pub(crate) fn remove_edge(&mut self, direction: Direction, edge: ElementId) -> bool {
        let list = self.edges_mut(direction);
        let before = list.len();
        list.retain(|e| *e != edge);
        list.len() != before
    }

    fn edges_mut(&mut self, direction: Direction) -> &mut Vec<ElementId> {
        match direction {
            Direction::Out => &mut self.out_edges,
            Direction::In => &mut self.in_edges,
        }
    }

    /// Value stored under `key`.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Every stored property, sorted by key.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.insert(key.into(), value)
    }

    /// Removes `key` and its search tokens, returning the previous value.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.terms.remove(key);
        self.properties.remove(key)
    }

    /// Search tokens per field.
    pub fn terms(&self) -> &BTreeMap<String, Vec<String>> {
        &self.terms
    }

    /// Replaces the search tokens of `field`.
    pub fn set_terms(&mut self, field: impl Into<String>, tokens: Vec<String>) {
        self.terms.insert(field.into(), tokens);
    }

    pub(crate) fn remove_terms(&mut self, field: &str) -> Option<Vec<String>> {
        self.terms.remove(field)
    }
}
