//! Validation methods for NonDestructiveTriMesh.
//!
//! Provides:
//! - Consistency checks between raw triangles and every derived map
//! - Manifold edge checking (unless non-manifold edges are permitted)
//! - Duplicate triangle detection
//! - A canonical snapshot for comparing incremental and rebuilt maps

use std::collections::{BTreeMap, HashMap};

use super::modification::triangle_edge_pairs;
use super::types::{edge_key, MeshError, TriangleId, VertexId};
use super::NonDestructiveTriMesh;

/// Id-independent view of the connectivity, used to compare meshes whose
/// edge ids differ (incremental maintenance vs. a full rebuild).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub triangles: Vec<Option<[VertexId; 3]>>,
    /// Canonical vertex pair → sorted incident triangles
    pub edges: BTreeMap<(VertexId, VertexId), Vec<TriangleId>>,
    /// Per vertex: sorted incident triangles
    pub vertex_triangles: Vec<Vec<TriangleId>>,
    /// Per vertex: sorted canonical pairs of incident edges
    pub vertex_edges: Vec<Vec<(VertexId, VertexId)>>,
}

impl NonDestructiveTriMesh {
    /// Capture the connectivity independent of edge numbering.
    pub fn snapshot(&self) -> ConnectivitySnapshot {
        let mut edges = BTreeMap::new();
        for (edge, [a, b]) in self.live_edges() {
            let mut tris = self.edge_triangles(edge).to_vec();
            tris.sort();
            edges.insert((a, b), tris);
        }

        let vertex_triangles = (0..self.vertex_slots())
            .map(|i| {
                let mut tris = self.vertex_triangles(VertexId::from_index(i)).to_vec();
                tris.sort();
                tris
            })
            .collect();

        let vertex_edges = (0..self.vertex_slots())
            .map(|i| {
                let mut pairs: Vec<(VertexId, VertexId)> = self
                    .vertex_edges(VertexId::from_index(i))
                    .iter()
                    .filter_map(|&e| self.edge(e).map(|[a, b]| (a, b)))
                    .collect();
                pairs.sort();
                pairs
            })
            .collect();

        ConnectivitySnapshot {
            triangles: self.triangles.clone(),
            edges,
            vertex_triangles,
            vertex_edges,
        }
    }

    /// Validate the connectivity.
    ///
    /// Checks that:
    /// 1. Every live triangle references live, distinct vertices
    /// 2. Every live triangle's edges exist and list the triangle
    /// 3. Edge, vertex and triangle incidence lists agree with each other
    /// 4. No edge carries more than two triangles unless permitted
    /// 5. No two live triangles share a vertex set
    /// 6. The two triangles of a manifold edge traverse it in opposite
    ///    directions
    pub fn validate(&self) -> Result<(), MeshError> {
        let mut expected_edges: HashMap<(VertexId, VertexId), Vec<TriangleId>> = HashMap::new();
        let mut seen_sets: HashMap<[VertexId; 3], TriangleId> = HashMap::new();

        for (id, tri) in self.live_triangles() {
            for v in tri {
                if !self.is_vertex_live(v) {
                    return Err(MeshError::InvalidTopology(format!(
                        "triangle {:?} references dead vertex {:?}",
                        id, v
                    )));
                }
                if !self.vertex_to_triangles[v.index()].contains(&id) {
                    return Err(MeshError::InvalidTopology(format!(
                        "vertex {:?} does not list triangle {:?}",
                        v, id
                    )));
                }
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return Err(MeshError::DegenerateTriangle(tri));
            }

            let edges = self.triangle_to_edges[id.index()];
            for (slot, (a, b)) in triangle_edge_pairs(tri).into_iter().enumerate() {
                let key = edge_key(a, b);
                let Some(edge) = self.find_edge(a, b) else {
                    return Err(MeshError::InvalidTopology(format!(
                        "triangle {:?} edge {:?} missing from edge map",
                        id, key
                    )));
                };
                if edges[slot] != edge {
                    return Err(MeshError::InvalidTopology(format!(
                        "triangle {:?} slot {} points at {:?}, edge map says {:?}",
                        id, slot, edges[slot], edge
                    )));
                }
                expected_edges.entry(key).or_default().push(id);
            }

            let mut sorted = tri;
            sorted.sort();
            if let Some(&other) = seen_sets.get(&sorted) {
                return Err(MeshError::InvalidTopology(format!(
                    "triangles {:?} and {:?} share vertex set {:?}",
                    other, id, sorted
                )));
            }
            seen_sets.insert(sorted, id);
        }

        for (edge, [a, b]) in self.live_edges() {
            let listed = &self.edge_to_triangles[edge.index()];
            let expected = expected_edges.remove(&(a, b)).unwrap_or_default();
            if listed.len() != expected.len() || !expected.iter().all(|t| listed.contains(t)) {
                return Err(MeshError::InvalidTopology(format!(
                    "edge {:?} lists {:?}, triangles say {:?}",
                    edge, listed, expected
                )));
            }
            if listed.len() > 2 && !self.allow_non_manifold {
                return Err(MeshError::NonManifoldEdge {
                    a,
                    b,
                    count: listed.len(),
                });
            }
            if let &[t0, t1] = listed.as_slice() {
                if self.triangle_has_directed_edge(t0, a, b) == self.triangle_has_directed_edge(t1, a, b) {
                    return Err(MeshError::InconsistentOrientation { a, b });
                }
            }
            if !self.vertex_to_edges[a.index()].contains(&edge)
                || !self.vertex_to_edges[b.index()].contains(&edge)
            {
                return Err(MeshError::InvalidTopology(format!(
                    "edge {:?} missing from its endpoints' edge lists",
                    edge
                )));
            }
        }

        if let Some((key, _)) = expected_edges.into_iter().next() {
            return Err(MeshError::InvalidTopology(format!(
                "edge {:?} used by triangles but not live",
                key
            )));
        }

        Ok(())
    }

    /// Groups of live triangles sharing one vertex set (flaps and duplicates).
    pub fn duplicate_triangles(&self) -> Vec<Vec<TriangleId>> {
        let mut by_set: BTreeMap<[VertexId; 3], Vec<TriangleId>> = BTreeMap::new();
        for (id, tri) in self.live_triangles() {
            let mut sorted = tri;
            sorted.sort();
            by_set.entry(sorted).or_default().push(id);
        }
        by_set.into_values().filter(|group| group.len() > 1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use super::*;

    #[test]
    fn test_flap_detected() {
        let mesh = NonDestructiveTriMesh::from_triangles(3, &[[0, 1, 2], [0, 2, 1]]).unwrap();
        assert!(mesh.validate().is_err());
        assert_eq!(
            mesh.duplicate_triangles(),
            vec![vec![TriangleId(0), TriangleId(1)]]
        );
    }

    #[test]
    fn test_corrupted_edge_list_detected() {
        let mut mesh = square();
        mesh.edge_to_triangles[0].clear();
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::InvalidTopology(_))
        ));
        mesh.update_connectivity();
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_orientation_detected() {
        assert!(square().validate().is_ok());
        assert!(tetrahedron().validate().is_ok());

        // Both triangles run 2 -> 0 along the diagonal
        let mesh = NonDestructiveTriMesh::from_triangles(4, &[[0, 1, 2], [0, 3, 2]]).unwrap();
        assert_eq!(
            mesh.validate(),
            Err(MeshError::InconsistentOrientation {
                a: VertexId(0),
                b: VertexId(2),
            })
        );
    }

    #[test]
    fn test_snapshot_ignores_edge_numbering() {
        let a = NonDestructiveTriMesh::from_triangles(4, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let mut b = a.clone();
        b.update_connectivity();
        assert_eq!(a.snapshot(), b.snapshot());
    }
}
