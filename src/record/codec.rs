//! Mapping between records and engine documents.

use std::collections::BTreeMap;

use tantivy::schema::{
    Field, IndexRecordOption, Schema as EngineSchema, Value as _, FAST, INDEXED, STORED, STRING,
};
use tantivy::{TantivyDocument, Term};

use crate::error::{GraphError, Result};
use crate::schema::{fields, split_term, term_text};
use crate::types::{Direction, ElementId, ElementKind};

use super::{Record, Value};

/// Translates [`Record`]s to and from engine documents.
#[derive(Clone, Debug)]
pub struct DocumentCodec {
    schema: EngineSchema,
    kind: Field,
    id: Field,
    user_id: Field,
    label: Field,
    vertex_out: Field,
    vertex_in: Field,
    edges_out: Field,
    edges_in: Field,
    properties: Field,
    terms: Field,
}

impl Default for DocumentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentCodec {
    /// Builds the engine schema shared by every store.
    pub fn new() -> Self {
        let mut builder = EngineSchema::builder();
        let kind = builder.add_text_field(fields::KIND, STRING | STORED);
        let id = builder.add_u64_field(fields::ID, INDEXED | STORED | FAST);
        let user_id = builder.add_text_field(fields::USER_ID, STRING | STORED);
        let label = builder.add_text_field(fields::LABEL, STRING | STORED);
        let vertex_out = builder.add_u64_field(fields::VERTEX_OUT, INDEXED | STORED);
        let vertex_in = builder.add_u64_field(fields::VERTEX_IN, INDEXED | STORED);
        let edges_out = builder.add_u64_field(fields::EDGES_OUT, INDEXED | STORED);
        let edges_in = builder.add_u64_field(fields::EDGES_IN, INDEXED | STORED);
        let properties = builder.add_text_field(fields::PROPERTIES, STORED);
        let terms = builder.add_text_field(fields::TERMS, STRING | STORED);
        Self {
            schema: builder.build(),
            kind,
            id,
            user_id,
            label,
            vertex_out,
            vertex_in,
            edges_out,
            edges_in,
            properties,
            terms,
        }
    }

    /// Engine schema the index is created with.
    pub fn engine_schema(&self) -> EngineSchema {
        self.schema.clone()
    }

    /// Primary-key term used for replace and delete.
    pub fn id_term(&self, id: ElementId) -> Term {
        Term::from_field_u64(self.id, id.0)
    }

    /// Term matching the document with `user_id`.
    pub fn user_id_term(&self, user_id: &str) -> Term {
        Term::from_field_text(self.user_id, user_id)
    }

    /// Term matching every document of `kind`.
    pub fn kind_term(&self, kind: ElementKind) -> Term {
        Term::from_field_text(self.kind, kind.as_str())
    }

    /// Term matching edges labelled `label`.
    pub fn label_term(&self, label: &str) -> Term {
        Term::from_field_text(self.label, label)
    }

    /// Term matching edges whose `direction` endpoint is `vertex`.
    pub fn endpoint_term(&self, direction: Direction, vertex: ElementId) -> Term {
        let field = match direction {
            Direction::Out => self.vertex_out,
            Direction::In => self.vertex_in,
        };
        Term::from_field_u64(field, vertex.0)
    }

    /// Term matching an encoded property token.
    pub fn property_term(&self, field: &str, token: &str) -> Term {
        Term::from_field_text(self.terms, &term_text(field, token))
    }

    pub(crate) fn record_option(&self) -> IndexRecordOption {
        IndexRecordOption::Basic
    }

    /// Encodes `record` as an engine document.
    pub fn to_document(&self, record: &Record) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.kind, record.kind().as_str());
        doc.add_u64(self.id, record.id().0);
        if let Some(user_id) = record.user_id() {
            doc.add_text(self.user_id, user_id);
        }
        if let Some(label) = record.label() {
            doc.add_text(self.label, label);
        }
        if let Some(out) = record.endpoint(Direction::Out) {
            doc.add_u64(self.vertex_out, out.0);
        }
        if let Some(inbound) = record.endpoint(Direction::In) {
            doc.add_u64(self.vertex_in, inbound.0);
        }
        for edge in record.edges(Direction::Out) {
            doc.add_u64(self.edges_out, edge.0);
        }
        for edge in record.edges(Direction::In) {
            doc.add_u64(self.edges_in, edge.0);
        }
        if !record.properties().is_empty() {
            doc.add_text(self.properties, serde_json::to_string(record.properties())?);
        }
        for (field, tokens) in record.terms() {
            for token in tokens {
                doc.add_text(self.terms, term_text(field, token));
            }
        }
        Ok(doc)
    }

    /// Decodes a stored engine document.
    pub fn from_document(&self, doc: &TantivyDocument) -> Result<Record> {
        let tag = doc
            .get_first(self.kind)
            .and_then(|v| v.as_str())
            .ok_or_else(|| GraphError::Corruption("document without kind".into()))?;
        let kind = ElementKind::from_tag(tag)
            .ok_or_else(|| GraphError::Corruption(format!("unknown kind tag '{tag}'")))?;
        let id = doc
            .get_first(self.id)
            .and_then(|v| v.as_u64())
            .map(ElementId)
            .ok_or_else(|| GraphError::Corruption("document without id".into()))?;
        let user_id = doc
            .get_first(self.user_id)
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        let mut record = Record::empty(kind, id, user_id);
        record.label = doc
            .get_first(self.label)
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        record.out_vertex = doc
            .get_first(self.vertex_out)
            .and_then(|v| v.as_u64())
            .map(ElementId);
        record.in_vertex = doc
            .get_first(self.vertex_in)
            .and_then(|v| v.as_u64())
            .map(ElementId);
        record.out_edges = doc
            .get_all(self.edges_out)
            .filter_map(|v| v.as_u64())
            .map(ElementId)
            .collect();
        record.in_edges = doc
            .get_all(self.edges_in)
            .filter_map(|v| v.as_u64())
            .map(ElementId)
            .collect();
        if let Some(json) = doc.get_first(self.properties).and_then(|v| v.as_str()) {
            record.properties = serde_json::from_str::<BTreeMap<String, Value>>(json)?;
        }
        for text in doc.get_all(self.terms).filter_map(|v| v.as_str()) {
            let (field, token) = split_term(text)
                .ok_or_else(|| GraphError::Corruption(format!("malformed term '{text}'")))?;
            record
                .terms
                .entry(field.to_owned())
                .or_default()
                .push(token.to_owned());
        }
        Ok(record)
    }
}
