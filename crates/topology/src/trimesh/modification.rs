//! Modification methods for NonDestructiveTriMesh.

use tracing::trace;

use super::types::{edge_key, EdgeId, MeshError, TriangleId, VertexId};
use super::NonDestructiveTriMesh;

/// Result of mesh compaction - maps old ids to new ids.
///
/// Entry `i` holds the new id of old element `i`, or `None` if the element
/// was a tombstone and has been dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactionMap {
    pub vertex_map: Vec<Option<VertexId>>,
    pub triangle_map: Vec<Option<TriangleId>>,
}

impl CompactionMap {
    /// Whether every element kept its index.
    pub fn is_identity(&self) -> bool {
        self.vertex_map
            .iter()
            .enumerate()
            .all(|(i, v)| *v == Some(VertexId::from_index(i)))
            && self
                .triangle_map
                .iter()
                .enumerate()
                .all(|(i, t)| *t == Some(TriangleId::from_index(i)))
    }
}

/// The three directed edges of a triangle, in winding order.
#[inline]
pub(crate) fn triangle_edge_pairs(tri: [VertexId; 3]) -> [(VertexId, VertexId); 3] {
    [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])]
}

impl NonDestructiveTriMesh {
    /// Append a new isolated vertex.
    pub fn add_vertex(&mut self) -> VertexId {
        let id = VertexId::from_index(self.vertex_live.len());
        self.vertex_live.push(true);
        self.vertex_to_edges.push(Vec::new());
        self.vertex_to_triangles.push(Vec::new());
        self.live_vertex_count += 1;
        id
    }

    /// Tombstone a vertex.
    ///
    /// Only vertex-level bookkeeping happens here: incident triangles must
    /// already have been removed by the caller.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> Result<(), MeshError> {
        if !self.is_vertex_live(vertex) {
            return Err(MeshError::DeadVertex(vertex));
        }
        if !self.vertex_to_triangles[vertex.index()].is_empty() {
            return Err(MeshError::InvalidTopology(format!(
                "vertex {:?} still has {} incident triangles",
                vertex,
                self.vertex_to_triangles[vertex.index()].len()
            )));
        }
        // Isolated edges cannot exist without triangles, but clear defensively
        // against maps built by hand.
        let stale_edges = std::mem::take(&mut self.vertex_to_edges[vertex.index()]);
        for edge in stale_edges {
            self.remove_edge(edge);
        }
        self.vertex_live[vertex.index()] = false;
        self.live_vertex_count -= 1;
        Ok(())
    }

    /// Add an oriented triangle, creating any missing edges.
    pub fn add_triangle(&mut self, tri: [VertexId; 3]) -> Result<TriangleId, MeshError> {
        self.check_new_triangle(tri)?;

        let id = TriangleId::from_index(self.triangles.len());
        self.triangles.push(Some(tri));
        self.triangle_to_edges.push([EdgeId(0); 3]);
        self.attach_triangle(id, tri);
        self.live_triangle_count += 1;
        Ok(id)
    }

    /// Tombstone a triangle. Edges left without triangles are removed too.
    ///
    /// Returns the vertices the triangle had.
    pub fn remove_triangle(&mut self, triangle: TriangleId) -> Result<[VertexId; 3], MeshError> {
        let tri = self
            .triangle(triangle)
            .ok_or(MeshError::DeadTriangle(triangle))?;
        self.detach_triangle(triangle, tri);
        self.triangles[triangle.index()] = None;
        self.live_triangle_count -= 1;
        Ok(tri)
    }

    /// Replace the vertices of a live triangle while keeping its id.
    ///
    /// On failure the triangle is left unchanged.
    pub fn relabel_triangle(
        &mut self,
        triangle: TriangleId,
        tri: [VertexId; 3],
    ) -> Result<(), MeshError> {
        let old = self
            .triangle(triangle)
            .ok_or(MeshError::DeadTriangle(triangle))?;
        self.detach_triangle(triangle, old);
        if let Err(e) = self.check_new_triangle(tri) {
            self.attach_triangle(triangle, old);
            return Err(e);
        }
        self.triangles[triangle.index()] = Some(tri);
        self.attach_triangle(triangle, tri);
        Ok(())
    }

    /// Drop tombstoned triangles from storage and rebuild connectivity.
    ///
    /// Vertex ids are unchanged. Returns the old-to-new triangle table.
    pub fn clear_deleted_triangles(&mut self) -> Vec<Option<TriangleId>> {
        let mut triangle_map = Vec::with_capacity(self.triangles.len());
        let mut kept = Vec::with_capacity(self.live_triangle_count);
        for slot in self.triangles.drain(..) {
            match slot {
                Some(tri) => {
                    triangle_map.push(Some(TriangleId::from_index(kept.len())));
                    kept.push(Some(tri));
                }
                None => triangle_map.push(None),
            }
        }
        self.triangles = kept;
        self.update_connectivity();
        triangle_map
    }

    /// Remove every tombstone, reassign dense ids, and rebuild connectivity.
    ///
    /// Running this twice in a row yields an identity map the second time.
    pub fn defragment(&mut self) -> CompactionMap {
        let mut vertex_map = Vec::with_capacity(self.vertex_live.len());
        let mut next_vertex = 0usize;
        for &live in &self.vertex_live {
            if live {
                vertex_map.push(Some(VertexId::from_index(next_vertex)));
                next_vertex += 1;
            } else {
                vertex_map.push(None);
            }
        }

        let mut triangle_map = Vec::with_capacity(self.triangles.len());
        let mut kept = Vec::with_capacity(self.live_triangle_count);
        for slot in &self.triangles {
            let remapped = slot.and_then(|tri| {
                let mapped = [
                    vertex_map[tri[0].index()]?,
                    vertex_map[tri[1].index()]?,
                    vertex_map[tri[2].index()]?,
                ];
                Some(mapped)
            });
            match remapped {
                Some(tri) => {
                    triangle_map.push(Some(TriangleId::from_index(kept.len())));
                    kept.push(Some(tri));
                }
                None => triangle_map.push(None),
            }
        }

        trace!(
            "defragment: {} -> {} vertices, {} -> {} triangles",
            self.vertex_live.len(),
            next_vertex,
            self.triangles.len(),
            kept.len()
        );

        self.triangles = kept;
        self.vertex_live = vec![true; next_vertex];
        self.update_connectivity();

        CompactionMap {
            vertex_map,
            triangle_map,
        }
    }

    // =========================================================================
    // Incidence bookkeeping
    // =========================================================================

    fn check_new_triangle(&self, tri: [VertexId; 3]) -> Result<(), MeshError> {
        for v in tri {
            if !self.is_vertex_live(v) {
                return Err(MeshError::DeadVertex(v));
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(MeshError::DegenerateTriangle(tri));
        }
        if !self.allow_non_manifold {
            for (a, b) in triangle_edge_pairs(tri) {
                let count = self
                    .find_edge(a, b)
                    .map_or(0, |e| self.edge_to_triangles[e.index()].len());
                if count >= 2 {
                    return Err(MeshError::NonManifoldEdge {
                        a,
                        b,
                        count: count + 1,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn attach_triangle(&mut self, id: TriangleId, tri: [VertexId; 3]) {
        let mut edge_ids = [EdgeId(0); 3];
        for (slot, (a, b)) in triangle_edge_pairs(tri).into_iter().enumerate() {
            let edge = match self.find_edge(a, b) {
                Some(edge) => edge,
                None => self.create_edge(a, b),
            };
            self.edge_to_triangles[edge.index()].push(id);
            edge_ids[slot] = edge;
        }
        self.triangle_to_edges[id.index()] = edge_ids;
        for v in tri {
            self.vertex_to_triangles[v.index()].push(id);
        }
    }

    fn detach_triangle(&mut self, id: TriangleId, tri: [VertexId; 3]) {
        let edges = self.triangle_to_edges[id.index()];
        for edge in edges {
            let incident = &mut self.edge_to_triangles[edge.index()];
            incident.retain(|&t| t != id);
            if incident.is_empty() {
                self.remove_edge(edge);
            }
        }
        for v in tri {
            self.vertex_to_triangles[v.index()].retain(|&t| t != id);
        }
    }

    fn create_edge(&mut self, a: VertexId, b: VertexId) -> EdgeId {
        let key = edge_key(a, b);
        let id = EdgeId::from_index(self.edges.len());
        self.edges.push(Some([key.0, key.1]));
        self.edge_to_triangles.push(Vec::new());
        self.edge_map.insert(key, id);
        self.vertex_to_edges[a.index()].push(id);
        self.vertex_to_edges[b.index()].push(id);
        id
    }

    fn remove_edge(&mut self, edge: EdgeId) {
        if let Some([a, b]) = self.edges[edge.index()].take() {
            self.edge_map.remove(&(a, b));
            self.vertex_to_edges[a.index()].retain(|&e| e != edge);
            self.vertex_to_edges[b.index()].retain(|&e| e != edge);
            self.edge_to_triangles[edge.index()].clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use super::*;

    #[test]
    fn test_remove_triangle_tombstones_orphan_edges() {
        let mut mesh = square();
        let edge_count = mesh.live_edges().count();
        assert_eq!(edge_count, 5);

        mesh.remove_triangle(TriangleId(0)).unwrap();
        assert_eq!(mesh.live_triangle_count(), 1);
        // (0,1) and (1,2) lose their only triangle; the diagonal survives
        assert_eq!(mesh.live_edges().count(), 3);
        assert!(mesh.find_edge(VertexId(0), VertexId(1)).is_none());
        assert!(mesh.triangle(TriangleId(0)).is_none());
        assert!(mesh.triangle_edges(TriangleId(0)).is_none());
    }

    #[test]
    fn test_remove_dead_triangle_is_error() {
        let mut mesh = square();
        mesh.remove_triangle(TriangleId(1)).unwrap();
        assert_eq!(
            mesh.remove_triangle(TriangleId(1)),
            Err(MeshError::DeadTriangle(TriangleId(1)))
        );
    }

    #[test]
    fn test_remove_vertex_requires_no_triangles() {
        let mut mesh = square();
        assert!(mesh.remove_vertex(VertexId(1)).is_err());
        mesh.remove_triangle(TriangleId(0)).unwrap();
        mesh.remove_vertex(VertexId(1)).unwrap();
        assert!(!mesh.is_vertex_live(VertexId(1)));
        assert!(mesh.vertex_triangles(VertexId(1)).is_empty());
    }

    #[test]
    fn test_relabel_keeps_id() {
        let mut mesh = square();
        let extra = mesh.add_vertex();
        mesh.relabel_triangle(TriangleId(0), [VertexId(0), VertexId(1), extra])
            .unwrap();
        assert_eq!(
            mesh.triangle(TriangleId(0)),
            Some([VertexId(0), VertexId(1), extra])
        );
        assert!(mesh.find_edge(VertexId(1), VertexId(2)).is_none());
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_clear_deleted_then_rebuild_matches_incremental() {
        let mut mesh = tetrahedron();
        mesh.remove_triangle(TriangleId(1)).unwrap();
        let map = mesh.clear_deleted_triangles();
        assert_eq!(map, vec![Some(TriangleId(0)), None, Some(TriangleId(1)), Some(TriangleId(2))]);

        let incremental = mesh.snapshot();
        mesh.update_connectivity();
        assert_eq!(incremental, mesh.snapshot());
    }

    #[test]
    fn test_defragment_twice_is_identity() {
        let mut mesh = tetrahedron();
        mesh.remove_triangle(TriangleId(0)).unwrap();
        mesh.remove_triangle(TriangleId(1)).unwrap();
        mesh.remove_triangle(TriangleId(2)).unwrap();
        mesh.remove_vertex(VertexId(0)).unwrap();

        let first = mesh.defragment();
        assert_eq!(first.vertex_map[0], None);
        assert_eq!(first.vertex_map[1], Some(VertexId(0)));
        assert_eq!(mesh.triangle(TriangleId(0)), Some([VertexId(0), VertexId(1), VertexId(2)]));
        assert!(!first.is_identity());

        let second = mesh.defragment();
        assert!(second.is_identity());
    }
}
