use topology::{EdgeId, TriangleId, VertexId};

use super::{Collision, ProximityContact};
use crate::ccd::{edge_edge_proximity, point_triangle_proximity};
use crate::spatial::ElementKind;
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

impl DynamicSurface {
    #[inline]
    fn is_moving(&self, v: VertexId) -> bool {
        self.positions[v.index()] != self.new_positions[v.index()]
    }

    /// Point-triangle and edge-edge collisions along `positions → new_positions`.
    ///
    /// Pairs where no vertex moves are skipped since the start state is
    /// collision free, as are pairs made only of solid vertices.
    pub fn detect_collisions(&self, stats: &mut RunStats) -> Vec<Collision> {
        let mut collisions = Vec::new();

        for v in self.mesh.live_vertices() {
            let query = self.vertex_box(v);
            for t in self.broad_phase.overlapping(ElementKind::Triangle, &query) {
                let Some(tri) = self.mesh.triangle(TriangleId::from_index(t)) else {
                    continue;
                };
                if tri.contains(&v) {
                    continue;
                }
                let vertices = [v, tri[0], tri[1], tri[2]];
                if !self.worth_testing(&vertices) {
                    continue;
                }
                stats.ccd_tests += 1;
                if let Some(impact) = self.ccd.point_triangle(
                    self.moving_point(v),
                    tri.map(|u| self.moving_point(u)),
                    vertices.map(VertexId::index),
                ) {
                    collisions.push(Collision { vertices, impact });
                }
            }
        }

        for (e, [a, b]) in self.mesh.live_edges() {
            let query = self.swept_box(&[a, b]);
            for other in self.broad_phase.overlapping(ElementKind::Edge, &query) {
                if other <= e.index() {
                    continue;
                }
                let Some([c, d]) = self.mesh.edge(EdgeId::from_index(other)) else {
                    continue;
                };
                if c == a || c == b || d == a || d == b {
                    continue;
                }
                let vertices = [a, b, c, d];
                if !self.worth_testing(&vertices) {
                    continue;
                }
                stats.ccd_tests += 1;
                if let Some(impact) = self.ccd.edge_edge(
                    [self.moving_point(a), self.moving_point(b)],
                    [self.moving_point(c), self.moving_point(d)],
                    vertices.map(VertexId::index),
                ) {
                    collisions.push(Collision { vertices, impact });
                }
            }
        }

        stats.collisions_detected += collisions.len() as u64;
        collisions
    }

    fn worth_testing(&self, vertices: &[VertexId; 4]) -> bool {
        vertices.iter().any(|&u| self.is_moving(u))
            && !vertices.iter().all(|&u| self.is_solid(u))
    }

    /// Pairs closer than the proximity epsilon at the current positions.
    pub fn detect_proximities(&self) -> Vec<ProximityContact> {
        let eps = self.proximity_epsilon;
        let mut contacts = Vec::new();
        if eps <= 0.0 {
            return contacts;
        }

        for v in self.mesh.live_vertices() {
            let query = self.vertex_box(v);
            let x = self.position(v);
            for t in self.broad_phase.overlapping(ElementKind::Triangle, &query) {
                let Some(tri) = self.mesh.triangle(TriangleId::from_index(t)) else {
                    continue;
                };
                let vertices = [v, tri[0], tri[1], tri[2]];
                if tri.contains(&v) || vertices.iter().all(|&u| self.is_solid(u)) {
                    continue;
                }
                if let Some(proximity) = point_triangle_proximity(x, self.triangle_points(tri), eps)
                {
                    contacts.push(ProximityContact { vertices, proximity });
                }
            }
        }

        for (e, [a, b]) in self.mesh.live_edges() {
            let query = self.swept_box(&[a, b]);
            for other in self.broad_phase.overlapping(ElementKind::Edge, &query) {
                if other <= e.index() {
                    continue;
                }
                let Some([c, d]) = self.mesh.edge(EdgeId::from_index(other)) else {
                    continue;
                };
                let vertices = [a, b, c, d];
                if c == a || c == b || d == a || d == b || vertices.iter().all(|&u| self.is_solid(u))
                {
                    continue;
                }
                if let Some(proximity) = edge_edge_proximity(
                    [self.position(a), self.position(b)],
                    [self.position(c), self.position(d)],
                    eps,
                ) {
                    contacts.push(ProximityContact { vertices, proximity });
                }
            }
        }
        contacts
    }
}

#[cfg(test)]
mod tests {
    use eltopo_config::GeneralOptions;
    use glam::DVec3;

    use super::*;
    use crate::surface::fixtures::sheet_arrays;

    fn two_sheets(gap: f64) -> DynamicSurface {
        let (mut positions, mut triangles) = sheet_arrays(2, 0.5, 0.0, 0);
        let (upper, upper_tris) = sheet_arrays(2, 0.5, gap, positions.len());
        positions.extend(upper);
        triangles.extend(upper_tris);
        let n = positions.len();
        DynamicSurface::new(positions, &triangles, vec![1.0; n], &GeneralOptions::default())
            .unwrap()
    }

    #[test]
    fn test_sheet_pushed_through_sheet_collides() {
        let mut s = two_sheets(0.1);
        let mut targets = s.positions().to_vec();
        for p in targets.iter_mut().skip(9) {
            p.z = -0.1;
        }
        s.set_new_positions(&targets).unwrap();
        s.rebuild_broad_phase().unwrap();
        let mut stats = RunStats::default();
        let collisions = s.detect_collisions(&mut stats);
        assert!(!collisions.is_empty());
        assert!(stats.ccd_tests > 0);
        for c in &collisions {
            assert!(c.impact.time > 0.0 && c.impact.time < 1.0);
        }
    }

    #[test]
    fn test_static_step_has_no_collisions() {
        let s = two_sheets(0.1);
        let mut stats = RunStats::default();
        assert!(s.detect_collisions(&mut stats).is_empty());
        assert_eq!(stats.ccd_tests, 0);
    }

    #[test]
    fn test_close_sheets_report_proximity() {
        let s = two_sheets(5e-5);
        let contacts = s.detect_proximities();
        assert!(!contacts.is_empty());
        assert!(contacts.iter().all(|c| c.proximity.distance < 1e-4));
        assert!(two_sheets(0.1).detect_proximities().is_empty());
    }
}
