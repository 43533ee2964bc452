//! Lucent: a property graph stored as documents in an embedded inverted index.
//!
//! Vertices and edges are flat [`Record`]s persisted through `tantivy`.
//! Writes land in a [`WriteBuffer`] that flushes in the background and serves
//! reads of not-yet-searchable data from a generation-tagged real-time cache.
//! Properties become searchable through the per-kind [`Schema`] and the
//! [`AutomaticIndex`] of each element kind; all scans are paginated
//! [`FilterSequence`] cursors.
//!
//! ```no_run
//! use lucent::{ElementKind, Graph, KeySet, Result, Value};
//!
//! fn main() -> Result<()> {
//!     let graph = Graph::in_memory()?;
//!     let index = graph.create_automatic_index("people", ElementKind::Vertex, KeySet::parse(["name"])?)?;
//!     let mut peter = graph.add_vertex(Some("peter"))?;
//!     peter.set_property("name", "Peter")?;
//!     graph.refresh()?;
//!     assert_eq!(index.count("name", &Value::from("PETER"))?, 1);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]

pub mod buffer;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod graph;
pub mod index;
pub mod metrics;
pub mod options;
pub mod record;
pub mod schema;
pub mod types;

pub use buffer::{IndexOp, OpKind, WriteBuffer};
pub use config::{ConfigError, StoreConfig};
pub use cursor::FilterSequence;
pub use engine::{Engine, Filter, TokenMatch};
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, GraphStats, IncidentEdges, ListedEdges, Vertex};
pub use index::{AutomaticIndex, IndexRegistry, KeySet};
pub use metrics::{CounterMetrics, NoopMetrics, StoreMetrics};
pub use options::{AdjacencyStrategy, GraphOptions, Storage};
pub use record::{DocumentCodec, Record, Value};
pub use schema::{Mapping, Schema, SemanticType};
pub use types::{Direction, ElementId, ElementKind, Generation};
