//! Edge flip.
//!
//! ```text
//!     Before:              After:
//!        C                    C
//!       / \                  /|\
//!      /   \                / | \
//!     A-----B      ->      A  |  B
//!      \   /                \ | /
//!       \ /                  \|/
//!        D                    D
//! ```
//!
//! Triangles (A, B, C) and (B, A, D) become (A, D, C) and (B, C, D), keeping
//! the shared orientation. Only nearly planar quads are flipped, so the
//! surface barely moves, but the new triangles are still checked against
//! the rest of the mesh.

use topology::{EdgeId, TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::{FlipCriterion, StaticOptions};

use super::metrics::QualityLimits;
use super::{EditOutcome, Rejection};
use crate::error::TrackError;
use crate::geometry::{angle_between, tet_volume, triangle_normal};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Result of flipping an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipResult {
    pub old_edge: [VertexId; 2],
    pub new_edge: [VertexId; 2],
    pub removed_triangles: [TriangleId; 2],
    pub added_triangles: [TriangleId; 2],
}

/// The quad around an interior manifold edge.
struct Quad {
    a: VertexId,
    b: VertexId,
    c: VertexId,
    d: VertexId,
    triangles: [TriangleId; 2],
}

#[derive(Debug, Clone)]
pub struct EdgeFlipper {
    criterion: FlipCriterion,
    improvement: f64,
    max_dihedral: f64,
    max_volume_change: f64,
    limits: QualityLimits,
}

impl EdgeFlipper {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            criterion: options.flip_criterion,
            improvement: options.min_edge_length_improvement,
            max_dihedral: options.max_flip_dihedral.to_radians(),
            max_volume_change: options.max_volume_change,
            limits: QualityLimits::from_options(options),
        }
    }

    fn quad(surface: &DynamicSurface, e: EdgeId) -> Option<Quad> {
        let mesh = surface.mesh();
        let [u, v] = mesh.edge(e)?;
        let &[t0, t1] = mesh.edge_triangles(e) else {
            return None;
        };
        // Orient so that t0 runs a -> b
        let (a, b) = if mesh.triangle_has_directed_edge(t0, u, v) {
            (u, v)
        } else {
            (v, u)
        };
        if !mesh.triangle_has_directed_edge(t1, b, a) {
            return None;
        }
        Some(Quad {
            a,
            b,
            c: mesh.opposite_vertex(t0, a, b)?,
            d: mesh.opposite_vertex(t1, a, b)?,
            triangles: [t0, t1],
        })
    }

    fn improves(&self, surface: &DynamicSurface, q: &Quad) -> bool {
        let [pa, pb, pc, pd] = [q.a, q.b, q.c, q.d].map(|v| surface.position(v));
        match self.criterion {
            FlipCriterion::Length => pc.distance(pd) + self.improvement < pa.distance(pb),
            FlipCriterion::Delaunay => {
                let at_c = angle_between(pa - pc, pb - pc);
                let at_d = angle_between(pa - pd, pb - pd);
                at_c + at_d > std::f64::consts::PI + self.improvement
            }
        }
    }

    /// Flip every edge whose flip improves the mesh. Returns whether any
    /// edge was flipped.
    pub fn flip_pass(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        let mut edges: Vec<EdgeId> = surface.mesh().live_edges().map(|(e, _)| e).collect();
        edges.sort();

        let mut flipped = 0usize;
        for e in edges {
            let wants = Self::quad(surface, e).is_some_and(|q| self.improves(surface, &q));
            if !wants {
                continue;
            }
            match self.flip_edge(surface, e, stats)? {
                EditOutcome::Applied(_) => flipped += 1,
                EditOutcome::Rejected(reason) => {
                    stats.edits_rejected += 1;
                    trace!(?e, ?reason, "Flip rejected");
                }
            }
        }
        if flipped > 0 {
            debug!(flipped, "Flip pass");
        }
        Ok(flipped > 0)
    }

    /// Flip one edge if it is interior, manifold and the flip improves it.
    pub fn flip_edge(
        &self,
        surface: &mut DynamicSurface,
        e: EdgeId,
        stats: &mut RunStats,
    ) -> Result<EditOutcome<FlipResult>, TrackError> {
        if !surface.mesh().is_edge_live(e) {
            return Ok(EditOutcome::Rejected(Rejection::DeadElement));
        }
        let Some(q) = Self::quad(surface, e) else {
            return Ok(EditOutcome::Rejected(Rejection::Topology));
        };
        if !self.improves(surface, &q) {
            return Ok(EditOutcome::Rejected(Rejection::NoImprovement));
        }
        if q.c == q.d || surface.mesh().find_edge(q.c, q.d).is_some() {
            return Ok(EditOutcome::Rejected(Rejection::Topology));
        }

        let [pa, pb, pc, pd] = [q.a, q.b, q.c, q.d].map(|v| surface.position(v));
        let n0 = triangle_normal(pa, pb, pc);
        let n1 = triangle_normal(pb, pa, pd);
        if angle_between(n0, n1) > self.max_dihedral {
            return Ok(EditOutcome::Rejected(Rejection::Quality));
        }

        let new0 = [q.a, q.d, q.c];
        let new1 = [q.b, q.c, q.d];
        let m0 = triangle_normal(pa, pd, pc);
        let m1 = triangle_normal(pb, pc, pd);
        if self.limits.is_degenerate([pa, pd, pc]) || self.limits.is_degenerate([pb, pc, pd]) {
            return Ok(EditOutcome::Rejected(Rejection::Quality));
        }
        let facing = n0 + n1;
        if m0.dot(facing) <= 0.0 || m1.dot(facing) <= 0.0 || m0.dot(m1) <= 0.0 {
            return Ok(EditOutcome::Rejected(Rejection::Quality));
        }
        if tet_volume(pa, pb, pc, pd).abs() > self.max_volume_change {
            return Ok(EditOutcome::Rejected(Rejection::VolumeChange));
        }
        if surface.collision_safety()
            && (surface.triangle_intersects_mesh(new0, &q.triangles)
                || surface.triangle_intersects_mesh(new1, &q.triangles))
        {
            return Ok(EditOutcome::Rejected(Rejection::Collision));
        }

        for t in q.triangles {
            surface.remove_triangle(t)?;
        }
        let added = [surface.add_triangle(new0)?, surface.add_triangle(new1)?];
        stats.edges_flipped += 1;
        trace!(a = ?q.a, b = ?q.b, c = ?q.c, d = ?q.d, "Flipped edge");

        Ok(EditOutcome::Applied(FlipResult {
            old_edge: [q.a, q.b],
            new_edge: [q.c, q.d],
            removed_triangles: q.triangles,
            added_triangles: added,
        }))
    }
}
