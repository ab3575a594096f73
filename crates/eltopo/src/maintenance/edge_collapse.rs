//! Edge collapse (simplification).
//!
//! Collapsing an edge merges its endpoints into one vertex and deletes the
//! triangles that contained the edge:
//!
//! ```text
//!     Before:              After:
//!        C                    C
//!       /|\                  / \
//!      / | \                /   \
//!     /  |  \              /     \
//!    A---+---B    ->      A'------+
//!     \  |  /              \     /
//!      \ | /                \   /
//!       \|/                  \ /
//!        D                    D
//! ```
//!
//! The surviving vertex keeps its id and the removed vertex's triangles are
//! relabelled in place, so caller data attached to those triangles survives.
//!
//! ## Survivor and position
//!
//! A solid endpoint always survives and stays put. Otherwise a boundary
//! endpoint survives and stays put, so the boundary does not shrink. Two
//! interior endpoints meet at the subdivision point. Ties go to the lower id.
//!
//! ## Checks
//!
//! 1. No edge may end up carrying more than two triangles
//! 2. No duplicate triangle may appear while collision safety is on
//! 3. No surrounding triangle may degenerate or invert
//! 4. The enclosed volume may not change by more than allowed
//! 5. Both endpoints moving to the new position must not collide, and the
//!    relabelled triangles must not cut through the mesh

use std::collections::HashMap;

use glam::DVec3;
use topology::{EdgeId, TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::StaticOptions;

use super::curvature::edge_multiplier;
use super::metrics::QualityLimits;
use super::subdivision::{SubdivisionScheme, scheme_for};
use super::{EditOutcome, Rejection, replace_vertex};
use crate::error::TrackError;
use crate::geometry::{patch_volume, triangle_normal};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Result of collapsing an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseResult {
    /// The vertex that remains after collapse (one of the original endpoints)
    pub surviving_vertex: VertexId,
    /// The vertex that was removed
    pub removed_vertex: VertexId,
    /// Triangles that contained the collapsed edge
    pub removed_triangles: Vec<TriangleId>,
    /// Triangles of the removed vertex, now referencing the survivor
    pub relabelled_triangles: Vec<TriangleId>,
}

/// Collapses edges that are too short, and the shortest edge of triangles
/// with an angle below the minimum.
#[derive(Debug)]
pub struct EdgeCollapser {
    options: StaticOptions,
    limits: QualityLimits,
    scheme: Box<dyn SubdivisionScheme>,
}

/// Everything decided about a collapse before the mesh is touched.
struct CollapsePlan {
    keep: VertexId,
    drop: VertexId,
    target: DVec3,
    incident: Vec<TriangleId>,
    relabelled: Vec<(TriangleId, [VertexId; 3])>,
}

impl EdgeCollapser {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            options: options.clone(),
            limits: QualityLimits::from_options(options),
            scheme: scheme_for(options.subdivision_scheme),
        }
    }

    fn min_length(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> f64 {
        if self.options.use_curvature_when_collapsing {
            self.options.min_edge_length * edge_multiplier(surface, a, b, &self.options)
        } else {
            self.options.min_edge_length
        }
    }

    fn is_shortest_of_needle(&self, surface: &DynamicSurface, e: EdgeId) -> bool {
        let mesh = surface.mesh();
        let length = surface.edge_length(e);
        mesh.edge_triangles(e).iter().any(|&t| {
            let (Some(points), Some(edges)) = (surface.triangle_positions(t), mesh.triangle_edges(t))
            else {
                return false;
            };
            self.limits.is_needle(points)
                && edges.iter().all(|&other| surface.edge_length(other) >= length)
        })
    }

    fn wants_collapse(&self, surface: &DynamicSurface, e: EdgeId) -> bool {
        let Some([a, b]) = surface.mesh().edge(e) else {
            return false;
        };
        surface.edge_length(e) < self.min_length(surface, a, b) || self.is_shortest_of_needle(surface, e)
    }

    /// Collapse every edge that wants it, shortest first. Returns whether any
    /// edge was collapsed.
    pub fn collapse_pass(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        let mut candidates: Vec<(f64, EdgeId)> = surface
            .mesh()
            .live_edges()
            .filter(|&(e, _)| self.wants_collapse(surface, e))
            .map(|(e, _)| (surface.edge_length(e), e))
            .collect();
        candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));

        let mut collapsed = 0usize;
        for (_, e) in candidates {
            if !self.wants_collapse(surface, e) {
                continue;
            }
            match self.collapse_edge(surface, e, stats)? {
                EditOutcome::Applied(_) => collapsed += 1,
                EditOutcome::Rejected(reason) => {
                    stats.edits_rejected += 1;
                    trace!(?e, ?reason, "Collapse rejected");
                }
            }
        }
        if collapsed > 0 {
            debug!(collapsed, "Collapse pass");
        }
        Ok(collapsed > 0)
    }

    /// Collapse one edge.
    pub fn collapse_edge(
        &self,
        surface: &mut DynamicSurface,
        e: EdgeId,
        stats: &mut RunStats,
    ) -> Result<EditOutcome<CollapseResult>, TrackError> {
        let plan = match self.plan(surface, e) {
            Ok(plan) => plan,
            Err(reason) => return Ok(EditOutcome::Rejected(reason)),
        };
        if let Err(reason) = self.check_geometry(surface, &plan) {
            return Ok(EditOutcome::Rejected(reason));
        }

        let CollapsePlan {
            keep,
            drop,
            target,
            incident,
            relabelled,
        } = plan;

        if surface.collision_safety() {
            let moves = [(keep, target), (drop, target)];
            if surface.pseudo_motion_collides(&moves, &[keep, drop], &incident, stats) {
                return Ok(EditOutcome::Rejected(Rejection::Collision));
            }
        }

        let original = [(keep, surface.position(keep)), (drop, surface.position(drop))];
        surface.set_position(keep, target)?;
        surface.set_position(drop, target)?;

        if surface.collision_safety() {
            let mut ignore = incident.clone();
            ignore.extend(relabelled.iter().map(|&(t, _)| t));
            if relabelled
                .iter()
                .any(|&(_, tri)| surface.triangle_intersects_mesh(tri, &ignore))
            {
                for (v, p) in original {
                    surface.set_position(v, p)?;
                }
                return Ok(EditOutcome::Rejected(Rejection::Collision));
            }
        }

        for &t in &incident {
            surface.remove_triangle(t)?;
        }
        for &(t, tri) in &relabelled {
            surface.relabel_triangle(t, tri)?;
        }
        surface.remove_vertex(drop)?;

        stats.edges_collapsed += 1;
        trace!(?keep, ?drop, "Collapsed edge");
        Ok(EditOutcome::Applied(CollapseResult {
            surviving_vertex: keep,
            removed_vertex: drop,
            removed_triangles: incident,
            relabelled_triangles: relabelled.into_iter().map(|(t, _)| t).collect(),
        }))
    }

    /// Pick survivor and position, and check the resulting connectivity.
    fn plan(&self, surface: &DynamicSurface, e: EdgeId) -> Result<CollapsePlan, Rejection> {
        let mesh = surface.mesh();
        let [a, b] = mesh.edge(e).ok_or(Rejection::DeadElement)?;
        let incident = mesh.edge_triangles(e).to_vec();

        // An edge whose triangles share one vertex set belongs to a flap
        let mut sets: Vec<[VertexId; 3]> = incident
            .iter()
            .filter_map(|&t| mesh.triangle(t))
            .map(|mut tri| {
                tri.sort();
                tri
            })
            .collect();
        sets.sort();
        if sets.windows(2).any(|w| w[0] == w[1]) {
            return Err(Rejection::Topology);
        }

        let (solid_a, solid_b) = (surface.is_solid(a), surface.is_solid(b));
        if solid_a && solid_b {
            return Err(Rejection::SolidVertex);
        }
        let (boundary_a, boundary_b) = (mesh.is_vertex_boundary(a), mesh.is_vertex_boundary(b));
        if boundary_a && boundary_b && !mesh.is_edge_boundary(e) {
            return Err(Rejection::Topology);
        }

        let (pa, pb) = (surface.position(a), surface.position(b));
        let (keep, drop, target) = if solid_a {
            (a, b, pa)
        } else if solid_b {
            (b, a, pb)
        } else if boundary_a && !boundary_b {
            (a, b, pa)
        } else if boundary_b && !boundary_a {
            (b, a, pb)
        } else if boundary_a {
            (a, b, (pa + pb) * 0.5)
        } else {
            (a, b, self.scheme.edge_point(surface, a, b))
        };

        let relabelled: Vec<(TriangleId, [VertexId; 3])> = mesh
            .vertex_triangles(drop)
            .iter()
            .filter(|&&t| !incident.contains(&t))
            .filter_map(|&t| mesh.triangle(t).map(|tri| (t, replace_vertex(tri, drop, keep))))
            .collect();

        // Edge loads after the collapse, over every triangle that touches the survivor
        let mut loads: HashMap<(VertexId, VertexId), usize> = HashMap::new();
        let survivors = mesh
            .vertex_triangles(keep)
            .iter()
            .filter(|&&t| !incident.contains(&t))
            .filter_map(|&t| mesh.triangle(t))
            .chain(relabelled.iter().map(|&(_, tri)| tri));
        for tri in survivors {
            for i in 0..3 {
                let (u, v) = (tri[i], tri[(i + 1) % 3]);
                *loads.entry((u.min(v), u.max(v))).or_default() += 1;
            }
        }
        if !mesh.allows_non_manifold() && loads.values().any(|&n| n > 2) {
            return Err(Rejection::Topology);
        }

        if surface.collision_safety() {
            let duplicate = relabelled.iter().any(|&(t, tri)| {
                mesh.find_triangle(tri)
                    .is_some_and(|other| other != t && !incident.contains(&other))
                    || relabelled.iter().any(|&(s, other)| {
                        s != t && {
                            let (mut x, mut y) = (tri, other);
                            x.sort();
                            y.sort();
                            x == y
                        }
                    })
            });
            if duplicate {
                return Err(Rejection::Topology);
            }
        }

        Ok(CollapsePlan {
            keep,
            drop,
            target,
            incident,
            relabelled,
        })
    }

    /// Shape and volume checks with both endpoints at the target.
    fn check_geometry(&self, surface: &DynamicSurface, plan: &CollapsePlan) -> Result<(), Rejection> {
        let mesh = surface.mesh();
        let moved = |v: VertexId| {
            if v == plan.keep || v == plan.drop {
                plan.target
            } else {
                surface.position(v)
            }
        };

        let mut before = Vec::new();
        let mut after = Vec::new();
        let kept = mesh
            .vertex_triangles(plan.keep)
            .iter()
            .filter(|&&t| !plan.incident.contains(&t))
            .filter_map(|&t| mesh.triangle(t).map(|tri| (tri, tri)));
        let relabelled = plan
            .relabelled
            .iter()
            .filter_map(|&(t, new)| mesh.triangle(t).map(|old| (old, new)));
        for (old, new) in kept.chain(relabelled) {
            let old_points = surface.triangle_points(old);
            let new_points = new.map(moved);
            if !self.limits.accepts(new_points) {
                return Err(Rejection::Quality);
            }
            let [p, q, r] = old_points;
            let [x, y, z] = new_points;
            if triangle_normal(p, q, r).dot(triangle_normal(x, y, z)) <= 0.0 {
                return Err(Rejection::Quality);
            }
            before.push(old_points);
            after.push(new_points);
        }
        before.extend(plan.incident.iter().filter_map(|&t| surface.triangle_positions(t)));

        let change = patch_volume(&after, plan.target) - patch_volume(&before, plan.target);
        if change.abs() > self.options.max_volume_change {
            return Err(Rejection::VolumeChange);
        }
        Ok(())
    }
}
