//! Non-destructive triangle mesh connectivity
//!
//! Elements live in dense arrays indexed by [`VertexId`], [`EdgeId`] and
//! [`TriangleId`]. Removing an element tombstones its slot (`None` / `false`)
//! so every other index stays valid; liveness is an O(1) array lookup. A
//! later [`NonDestructiveTriMesh::defragment`] compacts the arrays and
//! reports the old-to-new index tables.
//!
//! Derived data kept incrementally:
//! - vertex → incident edges, vertex → incident triangles
//! - edge → incident triangles (0, 1 or 2 on a manifold)
//! - triangle → its three edges
//!
//! Edges are unordered vertex pairs stored in ascending order, so one pair
//! never maps to two edges.

mod construction;
mod modification;
mod queries;
mod types;
mod validation;

use std::collections::HashMap;

pub use modification::CompactionMap;
pub use types::{EdgeId, MeshError, TriangleId, VertexId};
pub use validation::ConnectivitySnapshot;

/// Triangle mesh connectivity with tombstone-based removal.
#[derive(Debug, Clone, Default)]
pub struct NonDestructiveTriMesh {
    /// Oriented vertex triples; `None` marks a removed triangle
    pub(crate) triangles: Vec<Option<[VertexId; 3]>>,
    /// Liveness of each vertex slot
    pub(crate) vertex_live: Vec<bool>,
    /// Ascending vertex pairs; `None` marks a removed edge
    pub(crate) edges: Vec<Option<[VertexId; 2]>>,
    pub(crate) vertex_to_edges: Vec<Vec<EdgeId>>,
    pub(crate) vertex_to_triangles: Vec<Vec<TriangleId>>,
    pub(crate) edge_to_triangles: Vec<Vec<TriangleId>>,
    /// Edges `(v0,v1)`, `(v1,v2)`, `(v2,v0)` of each triangle
    pub(crate) triangle_to_edges: Vec<[EdgeId; 3]>,
    /// Map from canonical vertex pair to edge
    pub(crate) edge_map: HashMap<(VertexId, VertexId), EdgeId>,
    pub(crate) live_vertex_count: usize,
    pub(crate) live_triangle_count: usize,
    /// Whether an edge may carry more than two triangles
    pub(crate) allow_non_manifold: bool,
}

#[cfg(test)]
pub(crate) mod test_meshes {
    use super::*;

    /// Closed tetrahedron with outward-facing triangles.
    pub fn tetrahedron() -> NonDestructiveTriMesh {
        NonDestructiveTriMesh::from_triangles(
            4,
            &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
        .unwrap()
    }

    /// Unit square split along the (0, 2) diagonal.
    ///
    /// ```text
    /// v3---v2
    /// |  / |
    /// | /  |
    /// v0---v1
    /// ```
    pub fn square() -> NonDestructiveTriMesh {
        NonDestructiveTriMesh::from_triangles(4, &[[0, 1, 2], [0, 2, 3]]).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_meshes::*;
    use super::*;

    #[test]
    fn test_tetrahedron_counts() {
        let mesh = tetrahedron();
        assert_eq!(mesh.live_vertex_count(), 4);
        assert_eq!(mesh.live_triangle_count(), 4);
        assert_eq!(mesh.live_edges().count(), 6);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_square_boundary() {
        let mesh = square();
        let diagonal = mesh.find_edge(VertexId(2), VertexId(0)).unwrap();
        assert!(!mesh.is_edge_boundary(diagonal));
        assert_eq!(mesh.edge_triangles(diagonal).len(), 2);

        let side = mesh.find_edge(VertexId(0), VertexId(1)).unwrap();
        assert!(mesh.is_edge_boundary(side));
        assert!(mesh.is_vertex_boundary(VertexId(0)));
    }
}
