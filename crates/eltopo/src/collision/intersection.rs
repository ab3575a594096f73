//! Collision-safety checks used by mesh edits.
//!
//! Edits either keep geometry fixed and change connectivity (flip, merge),
//! which is checked statically against the new triangles, or move a few
//! vertices, which is checked as a pseudo-motion with continuous detection.

use glam::DVec3;
use topology::{EdgeId, TriangleId, VertexId};

use crate::ccd::MovingPoint;
use crate::geometry::segment_triangle_intersects;
use crate::spatial::{Aabb, ElementKind};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

const TRIANGLE_EDGES: [(usize, usize); 3] = [(0, 1), (1, 2), (2, 0)];

impl DynamicSurface {
    /// Whether two triangles intersect anywhere other than shared vertices.
    ///
    /// Edges touching a vertex of the other triangle are not tested, so
    /// neighbors meeting along a shared edge or corner never report.
    pub fn triangles_intersect(&self, a: [VertexId; 3], b: [VertexId; 3]) -> bool {
        let pa = self.triangle_points(a);
        let pb = self.triangle_points(b);
        let crosses = |edge_ids: [VertexId; 3], edge_pts: [DVec3; 3], tri: [VertexId; 3], tri_pts| {
            TRIANGLE_EDGES.iter().any(|&(i, j)| {
                let (p, q) = (edge_ids[i], edge_ids[j]);
                if tri.contains(&p) || tri.contains(&q) {
                    return false;
                }
                segment_triangle_intersects(
                    [edge_pts[i], edge_pts[j]],
                    tri_pts,
                    [p, q, tri[0], tri[1], tri[2]].map(VertexId::index),
                )
            })
        };
        crosses(a, pa, b, pb) || crosses(b, pb, a, pa)
    }

    /// Whether a prospective triangle would cut through the current mesh.
    pub fn triangle_intersects_mesh(&self, tri: [VertexId; 3], ignore: &[TriangleId]) -> bool {
        let query = Aabb::from_points(&self.triangle_points(tri)).padded(self.proximity_epsilon);
        self.broad_phase
            .overlapping(ElementKind::Triangle, &query)
            .into_iter()
            .map(TriangleId::from_index)
            .filter(|t| !ignore.contains(t))
            .filter_map(|t| self.mesh.triangle(t))
            .any(|other| self.triangles_intersect(tri, other))
    }

    /// Every pair of live triangles that intersect.
    pub fn intersecting_triangle_pairs(&self) -> Vec<(TriangleId, TriangleId)> {
        let mut pairs = Vec::new();
        for (t, tri) in self.mesh.live_triangles() {
            let query = Aabb::from_points(&self.triangle_points(tri));
            for other in self.broad_phase.overlapping(ElementKind::Triangle, &query) {
                if other <= t.index() {
                    continue;
                }
                let o = TriangleId::from_index(other);
                if let Some(other_tri) = self.mesh.triangle(o)
                    && self.triangles_intersect(tri, other_tri)
                {
                    pairs.push((t, o));
                }
            }
        }
        pairs
    }

    /// Whether moving vertices linearly to new positions would collide.
    ///
    /// Vertices listed in `identified` are treated as one vertex (they are
    /// about to be merged), and triangles in `ignore` are about to be
    /// deleted so they neither move nor obstruct.
    pub fn pseudo_motion_collides(
        &self,
        moves: &[(VertexId, DVec3)],
        identified: &[VertexId],
        ignore: &[TriangleId],
        stats: &mut RunStats,
    ) -> bool {
        let end = |v: VertexId| {
            moves
                .iter()
                .find(|(u, _)| *u == v)
                .map_or(self.position(v), |(_, p)| *p)
        };
        let motion = |v: VertexId| MovingPoint::new(self.position(v), end(v));
        let same = |u: VertexId, v: VertexId| {
            u == v || (identified.contains(&u) && identified.contains(&v))
        };
        let pad = moves
            .iter()
            .map(|(v, p)| self.position(*v).distance(*p))
            .fold(0.0, f64::max)
            + self.proximity_epsilon;
        let swept = |vs: &[VertexId]| {
            vs.iter()
                .fold(Aabb::empty(), |b, &v| b.include(self.position(v)).include(end(v)))
                .padded(pad)
        };
        let any_moving = |vs: &[VertexId]| vs.iter().any(|&v| motion(v).displacement() != DVec3::ZERO);

        for &(m, _) in moves {
            for t in self.broad_phase.overlapping(ElementKind::Triangle, &swept(&[m])) {
                let t = TriangleId::from_index(t);
                if ignore.contains(&t) {
                    continue;
                }
                let Some(tri) = self.mesh.triangle(t) else {
                    continue;
                };
                if tri.iter().any(|&u| same(u, m)) || !any_moving(&[m, tri[0], tri[1], tri[2]]) {
                    continue;
                }
                stats.ccd_tests += 1;
                if self
                    .ccd
                    .point_triangle(motion(m), tri.map(motion), [m, tri[0], tri[1], tri[2]].map(VertexId::index))
                    .is_some()
                {
                    return true;
                }
            }

            for &t in self.mesh.vertex_triangles(m) {
                if ignore.contains(&t) {
                    continue;
                }
                let Some(tri) = self.mesh.triangle(t) else {
                    continue;
                };
                for u in self.broad_phase.overlapping(ElementKind::Vertex, &swept(&tri)) {
                    let u = VertexId::from_index(u);
                    if !self.mesh.is_vertex_live(u) || tri.iter().any(|&w| same(w, u)) {
                        continue;
                    }
                    stats.ccd_tests += 1;
                    if self
                        .ccd
                        .point_triangle(motion(u), tri.map(motion), [u, tri[0], tri[1], tri[2]].map(VertexId::index))
                        .is_some()
                    {
                        return true;
                    }
                }
            }

            for &e in self.mesh.vertex_edges(m) {
                let Some([a, b]) = self.mesh.edge(e) else {
                    continue;
                };
                for other in self.broad_phase.overlapping(ElementKind::Edge, &swept(&[a, b])) {
                    if other == e.index() {
                        continue;
                    }
                    let Some([c, d]) = self.mesh.edge(EdgeId::from_index(other)) else {
                        continue;
                    };
                    if same(a, c) || same(a, d) || same(b, c) || same(b, d) {
                        continue;
                    }
                    stats.ccd_tests += 1;
                    if self
                        .ccd
                        .edge_edge(
                            [motion(a), motion(b)],
                            [motion(c), motion(d)],
                            [a, b, c, d].map(VertexId::index),
                        )
                        .is_some()
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Move vertices if the motion is collision free; returns whether moved.
    pub fn try_move_vertices(
        &mut self,
        moves: &[(VertexId, DVec3)],
        stats: &mut RunStats,
    ) -> Result<bool, crate::error::TrackError> {
        if self.collision_safety && self.pseudo_motion_collides(moves, &[], &[], stats) {
            return Ok(false);
        }
        for &(v, p) in moves {
            self.set_position(v, p)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use eltopo_config::GeneralOptions;

    use super::*;
    use crate::surface::fixtures::sheet_arrays;

    fn stacked_sheets() -> DynamicSurface {
        let (mut positions, mut triangles) = sheet_arrays(2, 0.5, 0.0, 0);
        let (upper, upper_tris) = sheet_arrays(2, 0.5, 0.2, positions.len());
        positions.extend(upper);
        triangles.extend(upper_tris);
        let n = positions.len();
        DynamicSurface::new(positions, &triangles, vec![1.0; n], &GeneralOptions::default())
            .unwrap()
    }

    #[test]
    fn test_stacked_sheets_do_not_intersect() {
        assert!(stacked_sheets().intersecting_triangle_pairs().is_empty());
    }

    #[test]
    fn test_pushing_vertex_through_sheet_collides() {
        let s = stacked_sheets();
        let mut stats = RunStats::default();
        // Centre vertex of the upper sheet
        let centre = VertexId(9 + 4);
        let through = DVec3::new(0.5, 0.5, -0.2);
        assert!(s.pseudo_motion_collides(&[(centre, through)], &[], &[], &mut stats));
        let nudge = DVec3::new(0.5, 0.5, 0.15);
        assert!(!s.pseudo_motion_collides(&[(centre, nudge)], &[], &[], &mut stats));
        assert!(stats.ccd_tests > 0);
    }

    #[test]
    fn test_vertical_triangle_intersects_sheet() {
        let mut s = stacked_sheets();
        let below = s
            .add_vertex(DVec3::new(0.6, 0.4, -0.5), 1.0, crate::history::VertexOrigin::Duplicate(VertexId(0)))
            .unwrap();
        // Upper sheet corner 9 down through the lower sheet to the new vertex
        let tri = [VertexId(9), VertexId(10), below];
        assert!(s.triangle_intersects_mesh(tri, &[]));
    }

    #[test]
    fn test_try_move_rejects_crossing() {
        let mut s = stacked_sheets();
        let mut stats = RunStats::default();
        let centre = VertexId(13);
        let before = s.position(centre);
        assert!(!s.try_move_vertices(&[(centre, DVec3::new(0.5, 0.5, -0.2))], &mut stats).unwrap());
        assert_eq!(s.position(centre), before);
        assert!(s.try_move_vertices(&[(centre, DVec3::new(0.5, 0.5, 0.25))], &mut stats).unwrap());
        assert_eq!(s.position(centre).z, 0.25);
    }
}
