//! Per-element-type field mapping.
//!
//! A [`Mapping`] records the [`SemanticType`] of every searchable field of one
//! element kind. The first definition of a field wins for the lifetime of the
//! store; redefining it with a different type is a schema conflict. Fields
//! without an entry are still stored on the record but produce no tokens.

mod encoding;

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::record::{Record, Value};
use crate::types::ElementKind;

pub use encoding::{
    encode_terms, minute_stamp, sortable_double, sortable_long, split_term, term_text, tokenize,
    TERM_SEPARATOR,
};

/// Reserved field names carried by every record.
pub mod fields {
    /// Element kind tag.
    pub const KIND: &str = "_kind";
    /// Internal id.
    pub const ID: &str = "_id";
    /// User id.
    pub const USER_ID: &str = "_uid";
    /// Edge label.
    pub const LABEL: &str = "_label";
    /// Source vertex of an edge.
    pub const VERTEX_OUT: &str = "_vout";
    /// Destination vertex of an edge.
    pub const VERTEX_IN: &str = "_vin";
    /// Edges leaving a vertex.
    pub const EDGES_OUT: &str = "_eout";
    /// Edges entering a vertex.
    pub const EDGES_IN: &str = "_ein";
    /// Stored user properties.
    pub const PROPERTIES: &str = "_props";
    /// Encoded per-field search tokens.
    pub const TERMS: &str = "_terms";

    /// Whether `name` collides with a reserved field.
    pub fn is_reserved(name: &str) -> bool {
        name.starts_with('_')
    }
}

/// How a property is encoded and matched.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SemanticType {
    /// Whole-value, case-sensitive match.
    String,
    /// Whole-value match after lower-casing both sides.
    StringLowercase,
    /// Tokenized free text.
    Text,
    /// Signed 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// Instant at minute resolution.
    Date,
}

impl SemanticType {
    /// Type given to index keys declared without an explicit type.
    pub const DEFAULT: SemanticType = SemanticType::StringLowercase;

    /// Canonical upper-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            SemanticType::String => "STRING",
            SemanticType::StringLowercase => "STRING_LC",
            SemanticType::Text => "TEXT",
            SemanticType::Long => "LONG",
            SemanticType::Double => "DOUBLE",
            SemanticType::Date => "DATE",
        }
    }

    /// Type an unmapped property takes when an all-keys index first sees it.
    pub fn infer(value: &Value) -> SemanticType {
        match value {
            Value::Str(_) => SemanticType::StringLowercase,
            Value::Long(_) => SemanticType::Long,
            Value::Double(_) => SemanticType::Double,
            Value::Date(_) => SemanticType::Date,
            Value::Bool(_) => SemanticType::String,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(SemanticType::String),
            "STRING_LC" | "STRING_LOWERCASE" => Ok(SemanticType::StringLowercase),
            "TEXT" => Ok(SemanticType::Text),
            "LONG" => Ok(SemanticType::Long),
            "DOUBLE" => Ok(SemanticType::Double),
            "DATE" => Ok(SemanticType::Date),
            other => Err(GraphError::InvalidArgument(format!(
                "unknown semantic type '{other}'"
            ))),
        }
    }
}

/// Field registry for one element kind.
pub struct Mapping {
    kind: ElementKind,
    fields: RwLock<FxHashMap<String, SemanticType>>,
}

impl Mapping {
    fn new(kind: ElementKind) -> Self {
        let mut fields = FxHashMap::default();
        fields.insert(fields::USER_ID.to_owned(), SemanticType::String);
        fields.insert(fields::KIND.to_owned(), SemanticType::String);
        fields.insert(fields::LABEL.to_owned(), SemanticType::String);
        Self {
            kind,
            fields: RwLock::new(fields),
        }
    }

    /// Element kind this mapping belongs to.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Registers `field` as `ty`, returning the type already registered.
    ///
    /// Redefining with the same type is accepted; a different type fails with
    /// [`GraphError::SchemaConflict`] and leaves the mapping untouched.
    pub fn define(&self, field: &str, ty: SemanticType) -> Result<Option<SemanticType>> {
        let mut fields = self.fields.write();
        match fields.get(field) {
            Some(existing) if *existing != ty => Err(GraphError::SchemaConflict {
                kind: self.kind,
                field: field.to_owned(),
                existing: *existing,
                requested: ty,
            }),
            Some(existing) => Ok(Some(*existing)),
            None => {
                fields.insert(field.to_owned(), ty);
                debug!(kind = %self.kind, field, ty = %ty, "schema.define");
                Ok(None)
            }
        }
    }

    /// Type registered for `field`, if any.
    pub fn get(&self, field: &str) -> Option<SemanticType> {
        self.fields.read().get(field).copied()
    }

    /// Whether `field` is searchable.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.read().contains_key(field)
    }

    /// Snapshot of every registered user field, sorted by name.
    pub fn user_fields(&self) -> Vec<(String, SemanticType)> {
        let mut out: Vec<_> = self
            .fields
            .read()
            .iter()
            .filter(|(name, _)| !fields::is_reserved(name))
            .map(|(name, ty)| (name.clone(), *ty))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("kind", &self.kind)
            .field("fields", &self.user_fields())
            .finish()
    }
}

/// Both element kinds' mappings, indexed by a fixed slot per kind.
#[derive(Debug)]
pub struct Schema {
    mappings: [Mapping; 2],
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Creates a schema holding only the reserved fields.
    pub fn new() -> Self {
        Self {
            mappings: [Mapping::new(ElementKind::Vertex), Mapping::new(ElementKind::Edge)],
        }
    }

    /// Mapping of `kind`.
    pub fn mapping(&self, kind: ElementKind) -> &Mapping {
        &self.mappings[kind.slot()]
    }

    /// See [`Mapping::define`].
    pub fn define(
        &self,
        kind: ElementKind,
        field: &str,
        ty: SemanticType,
    ) -> Result<Option<SemanticType>> {
        self.mapping(kind).define(field, ty)
    }

    /// Index-time tokens for `field`, or `None` when the field is unmapped.
    pub fn encode(&self, kind: ElementKind, field: &str, value: &Value) -> Result<Option<Vec<String>>> {
        match self.mapping(kind).get(field) {
            Some(ty) => encode_terms(field, ty, value).map(Some),
            None => Ok(None),
        }
    }

    /// Query-time tokens for `field`, mirroring [`Schema::encode`], together
    /// with the field's type so callers can decide how the tokens combine.
    pub fn encode_query(
        &self,
        kind: ElementKind,
        field: &str,
        value: &Value,
    ) -> Result<Option<(SemanticType, Vec<String>)>> {
        match self.mapping(kind).get(field) {
            Some(ty) => Ok(Some((ty, encode_terms(field, ty, value)?))),
            None => Ok(None),
        }
    }

    /// Refreshes the search tokens of `field` on `record`.
    ///
    /// Removed or unmapped fields lose their tokens; the stored value is kept.
    pub fn index_property(&self, record: &mut Record, field: &str) -> Result<()> {
        let tokens = match record.property(field) {
            Some(value) => self.encode(record.kind(), field, value)?,
            None => None,
        };
        match tokens {
            Some(tokens) => record.set_terms(field, tokens),
            None => {
                record.remove_terms(field);
            }
        }
        Ok(())
    }
}
