//! The tracked surface: connectivity, geometry and the broad phase kept in
//! step with every edit.

use glam::DVec3;
use topology::{EdgeId, MeshError, NonDestructiveTriMesh, TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::GeneralOptions;

use crate::ccd::{CcdSolver, MovingPoint};
use crate::error::TrackError;
use crate::geometry::{triangle_area, triangle_normal, tet_volume};
use crate::history::{MeshEvent, MeshHistory, VertexOrigin};
use crate::spatial::{Aabb, BroadPhaseGrid, ElementKind};

/// Triangle mesh with per-vertex positions, predicted positions and masses.
///
/// A vertex with infinite mass is solid: impulses never move it and edits
/// never relocate it. Vertex and triangle ids index straight into the
/// per-element arrays; deleted slots stay until [`DynamicSurface::defragment`].
#[derive(Debug, Clone)]
pub struct DynamicSurface {
    pub(crate) mesh: NonDestructiveTriMesh,
    pub(crate) positions: Vec<DVec3>,
    pub(crate) new_positions: Vec<DVec3>,
    pub(crate) masses: Vec<f64>,
    pub(crate) proximity_epsilon: f64,
    pub(crate) collision_safety: bool,
    pub(crate) ccd: CcdSolver,
    pub(crate) broad_phase: BroadPhaseGrid,
    pub(crate) history: MeshHistory,
}

impl DynamicSurface {
    pub fn new(
        positions: Vec<DVec3>,
        triangles: &[[usize; 3]],
        masses: Vec<f64>,
        options: &GeneralOptions,
    ) -> Result<Self, TrackError> {
        options.validate()?;
        if masses.len() != positions.len() {
            return Err(TrackError::LengthMismatch {
                what: "masses",
                expected: positions.len(),
                actual: masses.len(),
            });
        }
        if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
            return Err(TrackError::NonFinitePosition(i));
        }
        if let Some((i, &m)) = masses.iter().enumerate().find(|(_, m)| !(**m > 0.0)) {
            return Err(TrackError::InvalidMass { vertex: i, mass: m });
        }
        for (t, tri) in triangles.iter().enumerate() {
            if let Some(&v) = tri.iter().find(|&&v| v >= positions.len()) {
                return Err(TrackError::VertexOutOfRange {
                    triangle: t,
                    vertex: v,
                    vertex_count: positions.len(),
                });
            }
        }

        let mesh = NonDestructiveTriMesh::from_triangles_with_policy(
            positions.len(),
            triangles,
            options.allow_non_manifold,
        )?;
        if let Some(group) = mesh.duplicate_triangles().first() {
            return Err(MeshError::InvalidTopology(format!("triangles {group:?} share one vertex set")).into());
        }
        let flat = mesh.live_triangles().find(|&(_, tri)| {
            let [a, b, c] = tri.map(|v| positions[v.index()]);
            !(triangle_area(a, b, c) > 0.0)
        });
        if let Some((_, tri)) = flat {
            return Err(MeshError::DegenerateTriangle(tri).into());
        }

        let mut surface = Self {
            mesh,
            new_positions: positions.clone(),
            positions,
            masses,
            proximity_epsilon: options.proximity_epsilon,
            collision_safety: options.collision_safety,
            ccd: CcdSolver::new(options.ccd_strategy),
            broad_phase: BroadPhaseGrid::default(),
            history: MeshHistory::default(),
        };
        surface.rebuild_broad_phase()?;
        debug!(
            vertices = surface.mesh.live_vertex_count(),
            triangles = surface.mesh.live_triangle_count(),
            "Created dynamic surface"
        );
        Ok(surface)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn mesh(&self) -> &NonDestructiveTriMesh {
        &self.mesh
    }

    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    pub fn new_positions(&self) -> &[DVec3] {
        &self.new_positions
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    #[inline]
    pub fn position(&self, v: VertexId) -> DVec3 {
        self.positions[v.index()]
    }

    #[inline]
    pub fn is_solid(&self, v: VertexId) -> bool {
        self.masses[v.index()].is_infinite()
    }

    #[inline]
    pub fn inverse_mass(&self, v: VertexId) -> f64 {
        if self.is_solid(v) {
            0.0
        } else {
            1.0 / self.masses[v.index()]
        }
    }

    pub fn proximity_epsilon(&self) -> f64 {
        self.proximity_epsilon
    }

    pub fn collision_safety(&self) -> bool {
        self.collision_safety
    }

    pub fn ccd(&self) -> CcdSolver {
        self.ccd
    }

    pub fn history(&self) -> &MeshHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut MeshHistory {
        &mut self.history
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn triangle_points(&self, tri: [VertexId; 3]) -> [DVec3; 3] {
        tri.map(|v| self.position(v))
    }

    pub fn triangle_positions(&self, t: TriangleId) -> Option<[DVec3; 3]> {
        self.mesh.triangle(t).map(|tri| self.triangle_points(tri))
    }

    pub fn moving_point(&self, v: VertexId) -> MovingPoint {
        MovingPoint::new(self.positions[v.index()], self.new_positions[v.index()])
    }

    pub fn edge_length(&self, e: EdgeId) -> f64 {
        self.mesh
            .edge(e)
            .map_or(0.0, |[a, b]| self.position(a).distance(self.position(b)))
    }

    pub fn average_edge_length(&self) -> f64 {
        let (sum, count) = self
            .mesh
            .live_edges()
            .fold((0.0, 0usize), |(s, n), (_, [a, b])| {
                (s + self.position(a).distance(self.position(b)), n + 1)
            });
        if count == 0 { 0.0 } else { sum / count as f64 }
    }

    pub fn triangle_area(&self, t: TriangleId) -> f64 {
        self.triangle_positions(t)
            .map_or(0.0, |[a, b, c]| triangle_area(a, b, c))
    }

    /// Area-weighted vertex normal.
    pub fn vertex_normal(&self, v: VertexId) -> DVec3 {
        self.mesh
            .vertex_triangles(v)
            .iter()
            .filter_map(|&t| self.triangle_positions(t))
            .fold(DVec3::ZERO, |acc, [a, b, c]| acc + triangle_normal(a, b, c))
            .normalize_or_zero()
    }

    /// Signed enclosed volume; meaningful for closed surfaces.
    pub fn total_volume(&self) -> f64 {
        self.mesh
            .live_triangles()
            .map(|(_, tri)| {
                let [a, b, c] = self.triangle_points(tri);
                tet_volume(DVec3::ZERO, a, b, c)
            })
            .sum()
    }

    // =========================================================================
    // Broad phase
    // =========================================================================

    pub(crate) fn vertex_box(&self, v: VertexId) -> Aabb {
        let i = v.index();
        Aabb::from_points(&[self.positions[i], self.new_positions[i]])
            .padded(self.proximity_epsilon)
    }

    pub(crate) fn swept_box(&self, vertices: &[VertexId]) -> Aabb {
        vertices
            .iter()
            .fold(Aabb::empty(), |b, &v| b.union(self.vertex_box(v)))
    }

    fn edge_box(&self, e: EdgeId) -> Option<Aabb> {
        self.mesh.edge(e).map(|edge| self.swept_box(&edge))
    }

    fn triangle_box(&self, t: TriangleId) -> Option<Aabb> {
        self.mesh.triangle(t).map(|tri| self.swept_box(&tri))
    }

    /// Rebuild every grid from scratch around the current swept boxes.
    pub fn rebuild_broad_phase(&mut self) -> Result<(), TrackError> {
        let bounds = self
            .mesh
            .live_vertices()
            .fold(Aabb::empty(), |b, v| b.union(self.vertex_box(v)));
        let cell_length = self.average_edge_length();
        let mut grid = BroadPhaseGrid::sized_for(
            bounds,
            cell_length,
            [
                self.mesh.live_vertex_count(),
                self.mesh.edge_slots(),
                self.mesh.live_triangle_count(),
            ],
        );
        for v in self.mesh.live_vertices() {
            grid.update(ElementKind::Vertex, v.index(), self.vertex_box(v))?;
        }
        for (e, edge) in self.mesh.live_edges() {
            grid.update(ElementKind::Edge, e.index(), self.swept_box(&edge))?;
        }
        for (t, tri) in self.mesh.live_triangles() {
            grid.update(ElementKind::Triangle, t.index(), self.swept_box(&tri))?;
        }
        self.broad_phase = grid;
        Ok(())
    }

    /// Refresh the boxes of a vertex and everything incident on it.
    pub(crate) fn refresh_vertex(&mut self, v: VertexId) -> Result<(), TrackError> {
        self.broad_phase
            .update(ElementKind::Vertex, v.index(), self.vertex_box(v))?;
        for &e in self.mesh.vertex_edges(v) {
            if let Some(b) = self.edge_box(e) {
                self.broad_phase.update(ElementKind::Edge, e.index(), b)?;
            }
        }
        for &t in self.mesh.vertex_triangles(v) {
            if let Some(b) = self.triangle_box(t) {
                self.broad_phase.update(ElementKind::Triangle, t.index(), b)?;
            }
        }
        Ok(())
    }

    fn refresh_triangle(&mut self, t: TriangleId) -> Result<(), TrackError> {
        let Some(b) = self.triangle_box(t) else {
            return Ok(());
        };
        self.broad_phase.update(ElementKind::Triangle, t.index(), b)?;
        if let Some(edges) = self.mesh.triangle_edges(t) {
            for e in edges {
                if let Some(b) = self.edge_box(e) {
                    self.broad_phase.update(ElementKind::Edge, e.index(), b)?;
                }
            }
        }
        Ok(())
    }

    fn drop_dead_edges(&mut self, edges: Option<[EdgeId; 3]>) {
        for e in edges.into_iter().flatten() {
            if !self.mesh.is_edge_live(e) {
                self.broad_phase.remove(ElementKind::Edge, e.index());
            }
        }
    }

    // =========================================================================
    // Edits
    // =========================================================================

    pub fn add_vertex(
        &mut self,
        position: DVec3,
        mass: f64,
        origin: VertexOrigin,
    ) -> Result<VertexId, TrackError> {
        let v = self.mesh.add_vertex();
        self.positions.push(position);
        self.new_positions.push(position);
        self.masses.push(mass);
        self.history.record(MeshEvent::VertexAdded { vertex: v, origin });
        self.broad_phase
            .update(ElementKind::Vertex, v.index(), self.vertex_box(v))?;
        trace!(?v, ?origin, "Added vertex");
        Ok(v)
    }

    /// Remove a vertex that no longer has incident triangles.
    pub fn remove_vertex(&mut self, v: VertexId) -> Result<(), TrackError> {
        self.mesh.remove_vertex(v)?;
        self.broad_phase.remove(ElementKind::Vertex, v.index());
        self.history.record(MeshEvent::VertexRemoved { vertex: v });
        Ok(())
    }

    pub fn add_triangle(&mut self, tri: [VertexId; 3]) -> Result<TriangleId, TrackError> {
        let t = self.mesh.add_triangle(tri)?;
        self.history.record(MeshEvent::TriangleAdded {
            triangle: t,
            vertices: tri,
        });
        self.refresh_triangle(t)?;
        Ok(t)
    }

    pub fn remove_triangle(&mut self, t: TriangleId) -> Result<[VertexId; 3], TrackError> {
        let edges = self.mesh.triangle_edges(t);
        let tri = self.mesh.remove_triangle(t)?;
        self.broad_phase.remove(ElementKind::Triangle, t.index());
        self.drop_dead_edges(edges);
        self.history
            .record(MeshEvent::TriangleRemoved { triangle: t });
        Ok(tri)
    }

    /// Change a triangle's vertices in place; the triangle keeps its id.
    pub fn relabel_triangle(&mut self, t: TriangleId, tri: [VertexId; 3]) -> Result<(), TrackError> {
        let edges = self.mesh.triangle_edges(t);
        self.mesh.relabel_triangle(t, tri)?;
        self.drop_dead_edges(edges);
        self.refresh_triangle(t)
    }

    /// Move a vertex outright; both current and predicted positions change.
    pub fn set_position(&mut self, v: VertexId, p: DVec3) -> Result<(), TrackError> {
        self.positions[v.index()] = p;
        self.new_positions[v.index()] = p;
        self.refresh_vertex(v)
    }

    /// Replace every predicted position.
    pub fn set_new_positions(&mut self, new_positions: &[DVec3]) -> Result<(), TrackError> {
        if new_positions.len() != self.positions.len() {
            return Err(TrackError::LengthMismatch {
                what: "predicted positions",
                expected: self.positions.len(),
                actual: new_positions.len(),
            });
        }
        if let Some(i) = new_positions.iter().position(|p| !p.is_finite()) {
            return Err(TrackError::NonFinitePosition(i));
        }
        self.new_positions.copy_from_slice(new_positions);
        Ok(())
    }

    pub(crate) fn commit_new_positions(&mut self) {
        self.positions.copy_from_slice(&self.new_positions);
    }

    pub(crate) fn reset_new_positions(&mut self) {
        self.new_positions.copy_from_slice(&self.positions);
    }

    /// Compact the mesh and the per-vertex arrays. Broad phase is rebuilt.
    pub fn defragment(&mut self) -> Result<topology::CompactionMap, TrackError> {
        let map = self.mesh.defragment();
        let keep = |values: &[DVec3]| -> Vec<DVec3> {
            values
                .iter()
                .zip(&map.vertex_map)
                .filter(|(_, m)| m.is_some())
                .map(|(p, _)| *p)
                .collect()
        };
        self.positions = keep(&self.positions);
        self.new_positions = keep(&self.new_positions);
        self.masses = self
            .masses
            .iter()
            .zip(&map.vertex_map)
            .filter(|(_, m)| m.is_some())
            .map(|(m, _)| *m)
            .collect();
        self.rebuild_broad_phase()?;
        Ok(map)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Unit right tetrahedron with outward-facing triangles.
    pub fn tetrahedron(options: &GeneralOptions) -> DynamicSurface {
        let positions = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        let triangles = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        DynamicSurface::new(positions, &triangles, vec![1.0; 4], options)
            .expect("valid tetrahedron")
    }

    /// Flat `n × n` grid of quads split into triangles, spacing `h`, at height `z`.
    pub fn sheet(n: usize, h: f64, z: f64, options: &GeneralOptions) -> DynamicSurface {
        let (positions, triangles) = sheet_arrays(n, h, z, 0);
        let count = positions.len();
        DynamicSurface::new(positions, &triangles, vec![1.0; count], options)
            .expect("valid sheet")
    }

    pub fn sheet_arrays(n: usize, h: f64, z: f64, offset: usize) -> (Vec<DVec3>, Vec<[usize; 3]>) {
        let mut positions = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                positions.push(DVec3::new(i as f64 * h, j as f64 * h, z));
            }
        }
        let idx = |i: usize, j: usize| offset + j * (n + 1) + i;
        let mut triangles = Vec::new();
        for j in 0..n {
            for i in 0..n {
                triangles.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
                triangles.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        (positions, triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_rejects_bad_input() {
        let options = GeneralOptions::default();
        let err = DynamicSurface::new(vec![DVec3::ZERO; 3], &[[0, 1, 2]], vec![1.0; 2], &options);
        assert!(matches!(err, Err(TrackError::LengthMismatch { .. })));

        let err = DynamicSurface::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::new(f64::NAN, 0.0, 0.0)],
            &[[0, 1, 2]],
            vec![1.0; 3],
            &options,
        );
        assert!(matches!(err, Err(TrackError::NonFinitePosition(2))));

        let err = DynamicSurface::new(vec![DVec3::ZERO; 3], &[[0, 1, 5]], vec![1.0; 3], &options);
        assert!(matches!(err, Err(TrackError::VertexOutOfRange { vertex: 5, .. })));

        let err = DynamicSurface::new(vec![DVec3::ZERO; 3], &[[0, 1, 2]], vec![0.0; 3], &options);
        assert!(matches!(err, Err(TrackError::InvalidMass { vertex: 0, .. })));
    }

    #[test]
    fn test_rejects_duplicate_and_flat_triangles() {
        let options = GeneralOptions::default();
        let positions = vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::new(2.0, 0.0, 0.0)];

        let err = DynamicSurface::new(positions.clone(), &[[0, 1, 2], [1, 2, 0]], vec![1.0; 4], &options);
        assert!(matches!(err, Err(TrackError::Mesh(MeshError::InvalidTopology(_)))));
        let err = DynamicSurface::new(positions.clone(), &[[0, 1, 2], [0, 2, 1]], vec![1.0; 4], &options);
        assert!(matches!(err, Err(TrackError::Mesh(MeshError::InvalidTopology(_)))));

        // Collinear corners
        let err = DynamicSurface::new(positions.clone(), &[[0, 1, 2], [0, 3, 1]], vec![1.0; 4], &options);
        assert!(matches!(
            err,
            Err(TrackError::Mesh(MeshError::DegenerateTriangle(tri)))
                if tri == [VertexId(0), VertexId(3), VertexId(1)]
        ));

        // Coincident corners
        let mut stacked = positions.clone();
        stacked[3] = DVec3::X;
        let err = DynamicSurface::new(stacked, &[[0, 1, 2], [3, 2, 1]], vec![1.0; 4], &options);
        assert!(matches!(err, Err(TrackError::Mesh(MeshError::DegenerateTriangle(_)))));

        assert!(DynamicSurface::new(positions, &[[0, 1, 2], [1, 3, 2]], vec![1.0; 4], &options).is_ok());
    }

    #[test]
    fn test_tetrahedron_volume_and_normals() {
        let s = tetrahedron(&GeneralOptions::default());
        assert!((s.total_volume() - 1.0 / 6.0).abs() < 1e-12);
        let n = s.vertex_normal(VertexId(0));
        assert!(n.x < 0.0 && n.y < 0.0 && n.z < 0.0);
    }

    #[test]
    fn test_edits_record_history() {
        let mut s = tetrahedron(&GeneralOptions::default());
        let t = s.remove_triangle(TriangleId(0)).unwrap();
        assert_eq!(t, [VertexId(0), VertexId(2), VertexId(1)]);
        let v = s
            .add_vertex(DVec3::new(0.3, 0.3, -0.5), 1.0, VertexOrigin::Duplicate(VertexId(0)))
            .unwrap();
        s.add_triangle([VertexId(0), VertexId(2), v]).unwrap();
        s.add_triangle([VertexId(2), VertexId(1), v]).unwrap();
        s.add_triangle([VertexId(1), VertexId(0), v]).unwrap();
        assert_eq!(s.history().len(), 5);
        assert!(s.mesh().validate().is_ok());
    }

    #[test]
    fn test_solid_vertices_have_zero_inverse_mass() {
        let options = GeneralOptions::default();
        let s = DynamicSurface::new(
            vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            &[[0, 1, 2]],
            vec![f64::INFINITY, 2.0, 1.0],
            &options,
        )
        .unwrap();
        assert!(s.is_solid(VertexId(0)));
        assert_eq!(s.inverse_mass(VertexId(0)), 0.0);
        assert_eq!(s.inverse_mass(VertexId(1)), 0.5);
    }

    #[test]
    fn test_defragment_compacts_positions() {
        let mut s = tetrahedron(&GeneralOptions::default());
        for t in s.mesh().vertex_triangles(VertexId(1)).to_vec() {
            s.remove_triangle(t).unwrap();
        }
        s.remove_vertex(VertexId(1)).unwrap();
        let map = s.defragment().unwrap();
        assert_eq!(map.vertex_map[1], None);
        assert_eq!(s.positions().len(), 3);
        assert_eq!(s.positions()[1], DVec3::Y);
        assert_eq!(s.mesh().live_triangle_count(), 1);
    }
}
