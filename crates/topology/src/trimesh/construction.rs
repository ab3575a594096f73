//! Construction and full rebuild of the connectivity maps.

use std::collections::HashMap;

use super::types::{EdgeId, MeshError, TriangleId, VertexId};
use super::NonDestructiveTriMesh;

impl NonDestructiveTriMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mesh that accepts edges with more than two triangles.
    pub fn with_non_manifold(allow_non_manifold: bool) -> Self {
        Self {
            allow_non_manifold,
            ..Self::default()
        }
    }

    /// Build a mesh from `vertex_count` vertices and a triangle index list.
    ///
    /// Triangles are added in order, so triangle `i` of the input gets
    /// `TriangleId(i)`.
    pub fn from_triangles(
        vertex_count: usize,
        triangles: &[[usize; 3]],
    ) -> Result<Self, MeshError> {
        let mut mesh = Self::new();
        mesh.build(vertex_count, triangles)?;
        Ok(mesh)
    }

    /// Same as [`Self::from_triangles`] with explicit non-manifold policy.
    pub fn from_triangles_with_policy(
        vertex_count: usize,
        triangles: &[[usize; 3]],
        allow_non_manifold: bool,
    ) -> Result<Self, MeshError> {
        let mut mesh = Self::with_non_manifold(allow_non_manifold);
        mesh.build(vertex_count, triangles)?;
        Ok(mesh)
    }

    fn build(&mut self, vertex_count: usize, triangles: &[[usize; 3]]) -> Result<(), MeshError> {
        for _ in 0..vertex_count {
            self.add_vertex();
        }
        for tri in triangles {
            for &v in tri {
                if v >= vertex_count {
                    return Err(MeshError::DeadVertex(VertexId::from_index(v)));
                }
            }
            self.add_triangle(tri.map(VertexId::from_index))?;
        }
        tracing::debug!(
            "NonDestructiveTriMesh: built {} vertices, {} triangles, {} edges",
            self.live_vertex_count,
            self.live_triangle_count,
            self.edge_map.len()
        );
        Ok(())
    }

    /// Clear and rebuild every derived map from the raw triangle list.
    ///
    /// Used when incremental maintenance is suspect and after compaction.
    /// Edge ids are reassigned in triangle order; vertex and triangle ids are
    /// unchanged.
    pub fn update_connectivity(&mut self) {
        let vertex_count = self.vertex_live.len();

        self.edges.clear();
        self.edge_to_triangles.clear();
        self.edge_map = HashMap::new();
        self.vertex_to_edges = vec![Vec::new(); vertex_count];
        self.vertex_to_triangles = vec![Vec::new(); vertex_count];
        self.triangle_to_edges = vec![[EdgeId(0); 3]; self.triangles.len()];

        let mut live_triangles = 0;
        for index in 0..self.triangles.len() {
            if let Some(tri) = self.triangles[index] {
                self.attach_triangle(TriangleId::from_index(index), tri);
                live_triangles += 1;
            }
        }
        self.live_triangle_count = live_triangles;
        self.live_vertex_count = self.vertex_live.iter().filter(|&&live| live).count();
    }
}
