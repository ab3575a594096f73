//! Read-only connectivity queries.
//!
//! Every query on a removed or out-of-range element returns an empty
//! answer (`None` or an empty slice) rather than panicking.

use super::types::{edge_key, EdgeId, TriangleId, VertexId};
use super::NonDestructiveTriMesh;

impl NonDestructiveTriMesh {
    // =========================================================================
    // Element access
    // =========================================================================

    /// Number of vertex slots, including tombstones.
    pub fn vertex_slots(&self) -> usize {
        self.vertex_live.len()
    }

    /// Number of triangle slots, including tombstones.
    pub fn triangle_slots(&self) -> usize {
        self.triangles.len()
    }

    /// Number of edge slots, including tombstones.
    pub fn edge_slots(&self) -> usize {
        self.edges.len()
    }

    pub fn live_vertex_count(&self) -> usize {
        self.live_vertex_count
    }

    pub fn live_triangle_count(&self) -> usize {
        self.live_triangle_count
    }

    pub fn allows_non_manifold(&self) -> bool {
        self.allow_non_manifold
    }

    pub fn is_vertex_live(&self, vertex: VertexId) -> bool {
        self.vertex_live.get(vertex.index()).copied().unwrap_or(false)
    }

    pub fn is_triangle_live(&self, triangle: TriangleId) -> bool {
        self.triangle(triangle).is_some()
    }

    pub fn is_edge_live(&self, edge: EdgeId) -> bool {
        self.edge(edge).is_some()
    }

    /// Vertices of a live triangle, in winding order.
    pub fn triangle(&self, triangle: TriangleId) -> Option<[VertexId; 3]> {
        self.triangles.get(triangle.index()).copied().flatten()
    }

    /// Endpoints of a live edge, ascending.
    pub fn edge(&self, edge: EdgeId) -> Option<[VertexId; 2]> {
        self.edges.get(edge.index()).copied().flatten()
    }

    /// Edges `(v0,v1)`, `(v1,v2)`, `(v2,v0)` of a live triangle.
    pub fn triangle_edges(&self, triangle: TriangleId) -> Option<[EdgeId; 3]> {
        self.triangle(triangle)?;
        self.triangle_to_edges.get(triangle.index()).copied()
    }

    pub fn live_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertex_live
            .iter()
            .enumerate()
            .filter(|(_, live)| **live)
            .map(|(i, _)| VertexId::from_index(i))
    }

    pub fn live_triangles(&self) -> impl Iterator<Item = (TriangleId, [VertexId; 3])> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|tri| (TriangleId::from_index(i), tri)))
    }

    pub fn live_edges(&self) -> impl Iterator<Item = (EdgeId, [VertexId; 2])> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.map(|pair| (EdgeId::from_index(i), pair)))
    }

    // =========================================================================
    // Incidence
    // =========================================================================

    pub fn vertex_triangles(&self, vertex: VertexId) -> &[TriangleId] {
        if !self.is_vertex_live(vertex) {
            return &[];
        }
        &self.vertex_to_triangles[vertex.index()]
    }

    pub fn vertex_edges(&self, vertex: VertexId) -> &[EdgeId] {
        if !self.is_vertex_live(vertex) {
            return &[];
        }
        &self.vertex_to_edges[vertex.index()]
    }

    pub fn edge_triangles(&self, edge: EdgeId) -> &[TriangleId] {
        if !self.is_edge_live(edge) {
            return &[];
        }
        &self.edge_to_triangles[edge.index()]
    }

    /// Edge joining two vertices, in either order.
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        self.edge_map.get(&edge_key(a, b)).copied()
    }

    /// Live triangle over the same vertex set, in any orientation.
    pub fn find_triangle(&self, tri: [VertexId; 3]) -> Option<TriangleId> {
        let mut wanted = tri;
        wanted.sort();
        self.vertex_triangles(tri[0]).iter().copied().find(|&t| {
            self.triangle(t).is_some_and(|mut other| {
                other.sort();
                other == wanted
            })
        })
    }

    /// Vertices sharing an edge with `vertex`.
    pub fn vertex_neighbors(&self, vertex: VertexId) -> Vec<VertexId> {
        self.vertex_edges(vertex)
            .iter()
            .filter_map(|&e| self.other_endpoint(e, vertex))
            .collect()
    }

    /// The endpoint of `edge` that is not `vertex`.
    pub fn other_endpoint(&self, edge: EdgeId, vertex: VertexId) -> Option<VertexId> {
        let [a, b] = self.edge(edge)?;
        if a == vertex {
            Some(b)
        } else if b == vertex {
            Some(a)
        } else {
            None
        }
    }

    /// The vertex of `triangle` not on edge `(a, b)`.
    pub fn opposite_vertex(
        &self,
        triangle: TriangleId,
        a: VertexId,
        b: VertexId,
    ) -> Option<VertexId> {
        self.triangle(triangle)?
            .into_iter()
            .find(|&v| v != a && v != b)
    }

    /// Whether `triangle` contains the directed edge `a → b`.
    pub fn triangle_has_directed_edge(&self, triangle: TriangleId, a: VertexId, b: VertexId) -> bool {
        self.triangle(triangle).is_some_and(|tri| {
            (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
        })
    }

    /// Triangles on the other side of each edge of `triangle`.
    pub fn triangle_neighbors(&self, triangle: TriangleId) -> Vec<TriangleId> {
        let Some(edges) = self.triangle_edges(triangle) else {
            return Vec::new();
        };
        let mut neighbors = Vec::new();
        for edge in edges {
            for &t in self.edge_triangles(edge) {
                if t != triangle && !neighbors.contains(&t) {
                    neighbors.push(t);
                }
            }
        }
        neighbors
    }

    pub fn is_edge_boundary(&self, edge: EdgeId) -> bool {
        self.edge_triangles(edge).len() == 1
    }

    pub fn is_edge_non_manifold(&self, edge: EdgeId) -> bool {
        self.edge_triangles(edge).len() > 2
    }

    /// Whether any edge at `vertex` has exactly one incident triangle.
    pub fn is_vertex_boundary(&self, vertex: VertexId) -> bool {
        self.vertex_edges(vertex)
            .iter()
            .any(|&e| self.is_edge_boundary(e))
    }

    /// Split the triangles around `vertex` into edge-connected fans.
    ///
    /// Two triangles belong to the same fan when they share an edge incident
    /// on `vertex`. A manifold vertex has exactly one fan.
    pub fn vertex_fans(&self, vertex: VertexId) -> Vec<Vec<TriangleId>> {
        let incident = self.vertex_triangles(vertex);
        let mut fans: Vec<Vec<TriangleId>> = Vec::new();
        let mut visited: Vec<TriangleId> = Vec::with_capacity(incident.len());

        for &seed in incident {
            if visited.contains(&seed) {
                continue;
            }
            let mut fan = vec![seed];
            visited.push(seed);
            let mut cursor = 0;
            while cursor < fan.len() {
                let current = fan[cursor];
                cursor += 1;
                let Some(edges) = self.triangle_edges(current) else {
                    continue;
                };
                for edge in edges {
                    let Some([a, b]) = self.edge(edge) else {
                        continue;
                    };
                    if a != vertex && b != vertex {
                        continue;
                    }
                    for &next in self.edge_triangles(edge) {
                        if !visited.contains(&next) {
                            visited.push(next);
                            fan.push(next);
                        }
                    }
                }
            }
            fans.push(fan);
        }
        fans
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_meshes::*;
    use super::*;

    #[test]
    fn test_dead_queries_are_empty() {
        let mesh = square();
        assert!(mesh.vertex_triangles(VertexId(99)).is_empty());
        assert!(mesh.edge_triangles(EdgeId(99)).is_empty());
        assert!(mesh.triangle(TriangleId(99)).is_none());
        assert!(!mesh.is_vertex_live(VertexId(99)));
    }

    #[test]
    fn test_find_triangle_any_orientation() {
        let mesh = square();
        assert_eq!(
            mesh.find_triangle([VertexId(2), VertexId(1), VertexId(0)]),
            Some(TriangleId(0))
        );
        assert!(mesh.find_triangle([VertexId(1), VertexId(2), VertexId(3)]).is_none());
    }

    #[test]
    fn test_opposite_vertex_and_directed_edge() {
        let mesh = square();
        assert_eq!(
            mesh.opposite_vertex(TriangleId(1), VertexId(0), VertexId(2)),
            Some(VertexId(3))
        );
        assert!(mesh.triangle_has_directed_edge(TriangleId(0), VertexId(2), VertexId(0)));
        assert!(!mesh.triangle_has_directed_edge(TriangleId(0), VertexId(0), VertexId(2)));
    }

    #[test]
    fn test_vertex_fans_bowtie() {
        // Two triangles touching only at vertex 0
        let mesh = NonDestructiveTriMesh::from_triangles(5, &[[0, 1, 2], [0, 3, 4]]).unwrap();
        assert_eq!(mesh.vertex_fans(VertexId(0)).len(), 2);
        assert_eq!(mesh.vertex_fans(VertexId(1)).len(), 1);

        let tet = tetrahedron();
        assert_eq!(tet.vertex_fans(VertexId(0)).len(), 1);
    }

    #[test]
    fn test_neighbors() {
        let mesh = tetrahedron();
        let mut neighbors = mesh.vertex_neighbors(VertexId(0));
        neighbors.sort();
        assert_eq!(neighbors, vec![VertexId(1), VertexId(2), VertexId(3)]);
        assert_eq!(mesh.triangle_neighbors(TriangleId(0)).len(), 3);
    }
}
