//! Automatic secondary indexes.
//!
//! An [`AutomaticIndex`] subscribes one element kind to a set of property
//! keys. Every property write on that kind flows through the index, which
//! re-encodes the field through the [`Schema`] and replaces the whole record
//! in the write buffer. Queries are only accepted for keys the index handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::buffer::WriteBuffer;
use crate::cursor::FilterSequence;
use crate::engine::Filter;
use crate::error::{GraphError, Result};
use crate::record::{Record, Value};
use crate::schema::{fields, Schema, SemanticType};
use crate::types::ElementKind;

/// Keys an automatic index maintains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySet {
    /// Every property; unmapped keys are typed from their first value.
    All,
    /// Explicit keys with their semantic types.
    Keys(BTreeMap<String, SemanticType>),
}

impl KeySet {
    /// Parses `"name"` or `"name,TYPE"` specs; a bare name is STRING_LC.
    pub fn parse<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = BTreeMap::new();
        for spec in specs {
            let (name, ty) = parse_key_spec(spec.as_ref())?;
            if let Some(previous) = keys.insert(name.clone(), ty) {
                if previous != ty {
                    return Err(GraphError::InvalidArgument(format!(
                        "key '{name}' listed as both {previous} and {ty}"
                    )));
                }
            }
        }
        Ok(KeySet::Keys(keys))
    }
}

fn parse_key_spec(spec: &str) -> Result<(String, SemanticType)> {
    let (name, ty) = match spec.split_once(',') {
        Some((name, ty)) => (name.trim(), ty.parse::<SemanticType>()?),
        None => (spec.trim(), SemanticType::DEFAULT),
    };
    if name.is_empty() {
        return Err(GraphError::InvalidArgument(format!(
            "empty key name in '{spec}'"
        )));
    }
    if fields::is_reserved(name) {
        return Err(GraphError::ReservedProperty(name.to_owned()));
    }
    Ok((name.to_owned(), ty))
}

/// Secondary index over one element kind.
pub struct AutomaticIndex {
    name: String,
    kind: ElementKind,
    keys: KeySet,
    schema: Arc<Schema>,
    buffer: Arc<WriteBuffer>,
    page_size: usize,
}

impl AutomaticIndex {
    /// Name the index was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element kind the index covers.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Keys the index maintains; for an all-keys index, those seen so far.
    pub fn keys(&self) -> Vec<String> {
        match &self.keys {
            KeySet::All => self
                .schema
                .mapping(self.kind)
                .user_fields()
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
            KeySet::Keys(keys) => keys.keys().cloned().collect(),
        }
    }

    /// Whether `key` is queryable through this index.
    pub fn handles(&self, key: &str) -> bool {
        if fields::is_reserved(key) {
            return false;
        }
        match &self.keys {
            KeySet::All => self.schema.mapping(self.kind).contains(key),
            KeySet::Keys(keys) => keys.contains_key(key),
        }
    }

    /// Re-encodes `key` on `record` and persists the whole record.
    ///
    /// `record` already carries the new value.
    pub fn on_property_set(&self, mut record: Record, key: &str) -> Result<Arc<Record>> {
        if let (KeySet::All, Some(value)) = (&self.keys, record.property(key)) {
            if !self.schema.mapping(self.kind).contains(key) {
                self.schema.define(self.kind, key, SemanticType::infer(value))?;
            }
        }
        self.schema.index_property(&mut record, key)?;
        debug!(index = %self.name, id = %record.id(), key, "index.property_set");
        self.buffer.put(record)
    }

    /// Persists `record` after `key` was removed from it.
    pub fn on_property_removed(&self, mut record: Record, key: &str) -> Result<Arc<Record>> {
        record.remove_terms(key);
        debug!(index = %self.name, id = %record.id(), key, "index.property_removed");
        self.buffer.put(record)
    }

    fn property_filter(&self, key: &str, value: &Value) -> Result<Filter> {
        if !self.handles(key) {
            return Err(GraphError::KeyNotIndexed {
                kind: self.kind,
                key: key.to_owned(),
            });
        }
        let (ty, tokens) = self
            .schema
            .encode_query(self.kind, key, value)?
            .ok_or_else(|| GraphError::KeyNotIndexed {
                kind: self.kind,
                key: key.to_owned(),
            })?;
        Ok(Filter::property(key, ty, tokens))
    }

    /// Elements whose `key` matches `value` under the key's semantic type.
    ///
    /// Only searchable writes are found; see [`WriteBuffer::refresh`].
    pub fn get(&self, key: &str, value: &Value) -> Result<FilterSequence<Arc<Record>>> {
        let filter = self.property_filter(key, value)?;
        Ok(FilterSequence::new(
            Arc::clone(&self.buffer),
            self.kind,
            Some(filter),
            self.page_size,
        ))
    }

    /// Number of searchable elements whose `key` matches `value`.
    pub fn count(&self, key: &str, value: &Value) -> Result<usize> {
        let filter = Filter::Kind(self.kind).and(self.property_filter(key, value)?);
        self.buffer.engine().count(&filter)
    }
}

impl fmt::Debug for AutomaticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomaticIndex")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("keys", &self.keys)
            .finish()
    }
}

/// Fixed two-slot table of automatic indexes, one per element kind.
#[derive(Default)]
pub struct IndexRegistry {
    slots: RwLock<[Option<Arc<AutomaticIndex>>; 2]>,
}

impl IndexRegistry {
    /// Registers an index for `kind`, defining its keys in `schema`.
    ///
    /// Fails with [`GraphError::IndexExists`] if `kind` already has one and
    /// with [`GraphError::SchemaConflict`] if a key is mapped with another
    /// type; nothing is registered in either case.
    pub fn register(
        &self,
        name: &str,
        kind: ElementKind,
        keys: KeySet,
        schema: &Arc<Schema>,
        buffer: &Arc<WriteBuffer>,
        page_size: usize,
    ) -> Result<Arc<AutomaticIndex>> {
        let mut slots = self.slots.write();
        if slots[kind.slot()].is_some() {
            return Err(GraphError::IndexExists(kind));
        }
        if let KeySet::Keys(keys) = &keys {
            for (key, ty) in keys {
                if let Some(existing) = schema.mapping(kind).get(key) {
                    if existing != *ty {
                        return Err(GraphError::SchemaConflict {
                            kind,
                            field: key.clone(),
                            existing,
                            requested: *ty,
                        });
                    }
                }
            }
            for (key, ty) in keys {
                schema.define(kind, key, *ty)?;
            }
        }
        let index = Arc::new(AutomaticIndex {
            name: name.to_owned(),
            kind,
            keys,
            schema: Arc::clone(schema),
            buffer: Arc::clone(buffer),
            page_size,
        });
        slots[kind.slot()] = Some(Arc::clone(&index));
        info!(name, %kind, keys = ?index.keys, "index.create");
        Ok(index)
    }

    /// Index registered for `kind`.
    pub fn get(&self, kind: ElementKind) -> Option<Arc<AutomaticIndex>> {
        self.slots.read()[kind.slot()].clone()
    }

    /// Index named `name` registered for `kind`.
    pub fn by_name(&self, name: &str, kind: ElementKind) -> Result<Arc<AutomaticIndex>> {
        self.get(kind)
            .filter(|index| index.name == name)
            .ok_or_else(|| GraphError::IndexNotFound(name.to_owned()))
    }

    /// Unregisters the index named `name`; returns whether one was removed.
    pub fn drop_index(&self, name: &str) -> bool {
        let mut slots = self.slots.write();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|index| index.name == name) {
                slot.take();
                info!(name, "index.drop");
                return true;
            }
        }
        false
    }

    /// Every registered index, vertices first.
    pub fn all(&self) -> Vec<Arc<AutomaticIndex>> {
        self.slots.read().iter().flatten().cloned().collect()
    }
}
