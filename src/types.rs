//! Identity and tag types shared by every layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned internal identity of a vertex or edge.
///
/// Internal ids come from a per-store monotonic counter and are never reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ElementId {
    fn from(value: u64) -> Self {
        ElementId(value)
    }
}

/// Visibility generation reported by the engine after a commit.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed tag distinguishing the two element types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum ElementKind {
    /// A vertex record.
    Vertex,
    /// An edge record.
    Edge,
}

impl ElementKind {
    /// Both kinds, in slot order.
    pub const ALL: [ElementKind; 2] = [ElementKind::Vertex, ElementKind::Edge];

    /// Tag stored in the engine's type field.
    pub const fn as_str(self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }

    /// Parses the engine tag back into a kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "vertex" => Some(ElementKind::Vertex),
            "edge" => Some(ElementKind::Edge),
            _ => None,
        }
    }

    /// Position of this kind in fixed two-slot tables.
    pub(crate) const fn slot(self) -> usize {
        match self {
            ElementKind::Vertex => 0,
            ElementKind::Edge => 1,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an edge relative to a vertex.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Direction {
    /// Edges whose source is the vertex.
    Out,
    /// Edges whose destination is the vertex.
    In,
}
