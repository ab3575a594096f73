//! Type definitions for the non-destructive triangle mesh.

use serde::{Deserialize, Serialize};

/// Type-safe vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Type-safe edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Type-safe triangle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriangleId(pub u32);

macro_rules! impl_index {
    ($ty:ident) => {
        impl $ty {
            /// Index into the backing arrays.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }
    };
}

impl_index!(VertexId);
impl_index!(EdgeId);
impl_index!(TriangleId);

/// Canonical (ascending) key for the unordered vertex pair of an edge.
#[inline]
pub(crate) fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a < b { (a, b) } else { (b, a) }
}

/// Errors raised by connectivity operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("Vertex {0:?} does not exist or has been removed")]
    DeadVertex(VertexId),
    #[error("Triangle {0:?} does not exist or has been removed")]
    DeadTriangle(TriangleId),
    #[error("Triangle {0:?} repeats a vertex or has no area")]
    DegenerateTriangle([VertexId; 3]),
    #[error("Edge ({a:?}, {b:?}) would carry {count} triangles")]
    NonManifoldEdge { a: VertexId, b: VertexId, count: usize },
    #[error("Edge ({a:?}, {b:?}) is traversed the same way by both its triangles")]
    InconsistentOrientation { a: VertexId, b: VertexId },
    #[error("Invalid mesh topology: {0}")]
    InvalidTopology(String),
}
