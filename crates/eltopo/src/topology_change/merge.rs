//! Edge merging ("zippering").
//!
//! Each edge of a close pair is interior with two triangles. Deleting them
//! opens a four-vertex hole in each sheet:
//!
//! ```text
//!   sheet P:  p0 -- p1        sheet Q:  r0 -- r1
//!             |  \   |                  |   / |
//!             p3 -- p2                  r3 -- r2
//! ```
//!
//! The two holes are stitched with a tube of eight triangles, two per side
//! of the quad: `(p_k, p_k+1, r_k+1)` and `(p_k, r_k+1, r_k)`. The holes run
//! in opposite directions, so Q's loop is walked backwards, and of its four
//! rotations the one pairing each `p_k` with the nearest `r_k` is used.

use std::collections::HashMap;

use topology::{EdgeId, TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::StaticOptions;

use crate::error::TrackError;
use crate::geometry::{segment_segment_distance, triangle_area};
use crate::maintenance::{EditOutcome, Rejection};
use crate::spatial::{Aabb, ElementKind};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Result of zippering two edges.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub removed_triangles: Vec<TriangleId>,
    pub added_triangles: Vec<TriangleId>,
}

#[derive(Debug, Clone, Copy)]
pub struct MeshMerger {
    merge_epsilon: f64,
    min_area: f64,
}

impl MeshMerger {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            merge_epsilon: options.merge_proximity_epsilon,
            min_area: options.min_triangle_area,
        }
    }

    /// The hole left by deleting the two triangles of `e`, walked the way
    /// those triangles ran, plus the triangles themselves.
    fn hole(surface: &DynamicSurface, e: EdgeId) -> Option<([VertexId; 4], [TriangleId; 2])> {
        let mesh = surface.mesh();
        let [u, v] = mesh.edge(e)?;
        let &[t0, t1] = mesh.edge_triangles(e) else {
            return None;
        };
        let (a, b) = if mesh.triangle_has_directed_edge(t0, u, v) {
            (u, v)
        } else {
            (v, u)
        };
        if !mesh.triangle_has_directed_edge(t1, b, a) {
            return None;
        }
        let c = mesh.opposite_vertex(t0, a, b)?;
        let d = mesh.opposite_vertex(t1, a, b)?;
        Some(([b, c, a, d], [t0, t1]))
    }

    fn touches_solid(surface: &DynamicSurface, edge: [VertexId; 2]) -> bool {
        edge.iter().any(|&v| surface.is_solid(v))
    }

    /// Pairs of interior, non-solid edges closer than the merge distance,
    /// nearest first.
    pub fn candidates(&self, surface: &DynamicSurface) -> Vec<(f64, EdgeId, EdgeId)> {
        let mesh = surface.mesh();
        let mut pairs = Vec::new();
        for (e, [a, b]) in mesh.live_edges() {
            if mesh.edge_triangles(e).len() != 2 || Self::touches_solid(surface, [a, b]) {
                continue;
            }
            let (pa, pb) = (surface.position(a), surface.position(b));
            let query = Aabb::from_points(&[pa, pb]).padded(self.merge_epsilon);
            for other in surface.broad_phase.overlapping(ElementKind::Edge, &query) {
                if other <= e.index() {
                    continue;
                }
                let f = EdgeId::from_index(other);
                let Some([c, d]) = mesh.edge(f) else {
                    continue;
                };
                if [a, b].iter().any(|v| *v == c || *v == d)
                    || mesh.edge_triangles(f).len() != 2
                    || Self::touches_solid(surface, [c, d])
                {
                    continue;
                }
                let (distance, _, _) =
                    segment_segment_distance(pa, pb, surface.position(c), surface.position(d));
                if distance < self.merge_epsilon {
                    pairs.push((distance, e, f));
                }
            }
        }
        pairs.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));
        pairs
    }

    /// Zipper every close pair, nearest first. Returns whether anything merged.
    pub fn merge_pass(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        surface.rebuild_broad_phase()?;
        let mut merged = 0usize;
        for (distance, e0, e1) in self.candidates(surface) {
            if !surface.mesh().is_edge_live(e0) || !surface.mesh().is_edge_live(e1) {
                continue;
            }
            match self.zipper_edges(surface, e0, e1, stats)? {
                EditOutcome::Applied(_) => merged += 1,
                EditOutcome::Rejected(reason) => {
                    stats.edits_rejected += 1;
                    trace!(?e0, ?e1, distance, ?reason, "Merge rejected");
                }
            }
        }
        if merged > 0 {
            debug!(merged, "Merge pass");
        }
        Ok(merged > 0)
    }

    /// Replace the triangles of two edges with a connecting tube.
    pub fn zipper_edges(
        &self,
        surface: &mut DynamicSurface,
        e0: EdgeId,
        e1: EdgeId,
        stats: &mut RunStats,
    ) -> Result<EditOutcome<MergeResult>, TrackError> {
        let (Some((p, p_tris)), Some((q, q_tris))) = (Self::hole(surface, e0), Self::hole(surface, e1))
        else {
            return Ok(EditOutcome::Rejected(Rejection::Topology));
        };
        if [[p[0], p[2]], [q[0], q[2]]].into_iter().any(|edge| Self::touches_solid(surface, edge)) {
            return Ok(EditOutcome::Rejected(Rejection::SolidVertex));
        }

        let mut all: Vec<VertexId> = p.iter().chain(q.iter()).copied().collect();
        all.sort();
        all.dedup();
        if all.len() != 8 {
            return Ok(EditOutcome::Rejected(Rejection::Topology));
        }

        // Walk Q backwards from the rotation closest to P
        let spread = |s: usize| -> f64 {
            (0..4)
                .map(|k| surface.position(p[k]).distance_squared(surface.position(q[(s + 4 - k) % 4])))
                .sum()
        };
        let shift = (0..4)
            .min_by(|&x, &y| spread(x).total_cmp(&spread(y)))
            .unwrap_or(0);
        let r: [VertexId; 4] = std::array::from_fn(|k| q[(shift + 4 - k) % 4]);

        let mut tube = Vec::with_capacity(8);
        for k in 0..4 {
            let next = (k + 1) % 4;
            tube.push([p[k], p[next], r[next]]);
            tube.push([p[k], r[next], r[k]]);
        }

        let removed: Vec<TriangleId> = p_tris.iter().chain(q_tris.iter()).copied().collect();
        if let Err(reason) = self.check_tube(surface, &tube, &removed) {
            return Ok(EditOutcome::Rejected(reason));
        }

        for &t in &removed {
            surface.remove_triangle(t)?;
        }
        let mut added = Vec::with_capacity(8);
        for tri in tube {
            added.push(surface.add_triangle(tri)?);
        }
        stats.edges_merged += 1;
        trace!(?p, ?r, "Zippered edges");

        Ok(EditOutcome::Applied(MergeResult {
            removed_triangles: removed,
            added_triangles: added,
        }))
    }

    fn check_tube(
        &self,
        surface: &DynamicSurface,
        tube: &[[VertexId; 3]],
        removed: &[TriangleId],
    ) -> Result<(), Rejection> {
        let mesh = surface.mesh();
        if tube.iter().any(|&tri| mesh.find_triangle(tri).is_some()) {
            return Err(Rejection::Topology);
        }

        if !mesh.allows_non_manifold() {
            let mut loads: HashMap<EdgeId, usize> = HashMap::new();
            let mut fresh: HashMap<(VertexId, VertexId), usize> = HashMap::new();
            for tri in tube {
                for i in 0..3 {
                    let (u, v) = (tri[i], tri[(i + 1) % 3]);
                    match mesh.find_edge(u, v) {
                        Some(e) => *loads.entry(e).or_insert_with(|| {
                            mesh.edge_triangles(e)
                                .iter()
                                .filter(|&&t| !removed.contains(&t))
                                .count()
                        }) += 1,
                        None => *fresh.entry((u.min(v), u.max(v))).or_default() += 1,
                    }
                }
            }
            if loads.values().chain(fresh.values()).any(|&n| n > 2) {
                return Err(Rejection::Topology);
            }
        }

        for &tri in tube {
            let [a, b, c] = surface.triangle_points(tri);
            if !(triangle_area(a, b, c) >= self.min_area) {
                return Err(Rejection::Quality);
            }
        }

        if surface.collision_safety() {
            for (i, &tri) in tube.iter().enumerate() {
                if surface.triangle_intersects_mesh(tri, removed) {
                    return Err(Rejection::Collision);
                }
                if tube[i + 1..].iter().any(|&other| surface.triangles_intersect(tri, other)) {
                    return Err(Rejection::Collision);
                }
            }
        }
        Ok(())
    }
}
