//! Edge split (refinement).
//!
//! Splitting inserts a vertex on an edge and replaces each incident triangle
//! by two:
//!
//! ```text
//!     Before:              After:
//!        C                    C
//!       / \                  /|\
//!      /   \                / | \
//!     A-----B      ->      A--M--B
//!      \   /                \ | /
//!       \ /                  \|/
//!        D                    D
//! ```
//!
//! M starts at the midpoint, where the new triangles cover exactly the old
//! ones, so the split itself can never create an intersection. M is then
//! moved to the subdivision point if that motion is collision free and keeps
//! the enclosed volume within bounds.

use glam::DVec3;
use topology::{EdgeId, TriangleId, VertexId};
use tracing::{debug, trace};

use eltopo_config::StaticOptions;

use super::curvature::edge_multiplier;
use super::metrics::QualityLimits;
use super::subdivision::{SubdivisionScheme, scheme_for};
use super::{EditOutcome, Rejection, displacement_volume, replace_vertex};
use crate::error::TrackError;
use crate::history::VertexOrigin;
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Result of splitting an edge.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// The inserted vertex
    pub new_vertex: VertexId,
    /// Triangles that contained the split edge
    pub removed_triangles: Vec<TriangleId>,
    /// Two replacement triangles per removed triangle
    pub added_triangles: Vec<TriangleId>,
    /// Whether the vertex stayed at the edge midpoint
    pub at_midpoint: bool,
}

/// Splits edges that are too long, and the longest edge of triangles with
/// an angle above the maximum.
#[derive(Debug)]
pub struct EdgeSplitter {
    options: StaticOptions,
    limits: QualityLimits,
    scheme: Box<dyn SubdivisionScheme>,
}

impl EdgeSplitter {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            options: options.clone(),
            limits: QualityLimits::from_options(options),
            scheme: scheme_for(options.subdivision_scheme),
        }
    }

    fn max_length(&self, surface: &DynamicSurface, a: VertexId, b: VertexId) -> f64 {
        if self.options.use_curvature_when_splitting {
            self.options.max_edge_length * edge_multiplier(surface, a, b, &self.options)
        } else {
            self.options.max_edge_length
        }
    }

    /// Whether the edge is the longest edge of an incident triangle whose
    /// largest angle is too wide.
    fn is_longest_of_obtuse(&self, surface: &DynamicSurface, e: EdgeId) -> bool {
        let mesh = surface.mesh();
        let length = surface.edge_length(e);
        mesh.edge_triangles(e).iter().any(|&t| {
            let (Some(points), Some(edges)) = (surface.triangle_positions(t), mesh.triangle_edges(t))
            else {
                return false;
            };
            self.limits.is_obtuse(points)
                && edges.iter().all(|&other| surface.edge_length(other) <= length)
        })
    }

    fn wants_split(&self, surface: &DynamicSurface, e: EdgeId) -> bool {
        let Some([a, b]) = surface.mesh().edge(e) else {
            return false;
        };
        let length = surface.edge_length(e);
        if length * 0.5 < self.options.min_edge_length {
            return false;
        }
        length > self.max_length(surface, a, b) || self.is_longest_of_obtuse(surface, e)
    }

    /// Split every edge that wants it, longest first. Returns whether any
    /// edge was split.
    pub fn split_pass(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        let mut candidates: Vec<(f64, EdgeId)> = surface
            .mesh()
            .live_edges()
            .filter(|&(e, _)| self.wants_split(surface, e))
            .map(|(e, _)| (surface.edge_length(e), e))
            .collect();
        candidates.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)));

        let mut split = 0usize;
        for (_, e) in candidates {
            if !self.wants_split(surface, e) {
                continue;
            }
            match self.split_edge(surface, e, stats)? {
                EditOutcome::Applied(_) => split += 1,
                EditOutcome::Rejected(reason) => {
                    stats.edits_rejected += 1;
                    trace!(?e, ?reason, "Split rejected");
                }
            }
        }
        if split > 0 {
            debug!(split, "Split pass");
        }
        Ok(split > 0)
    }

    /// Split one edge.
    pub fn split_edge(
        &self,
        surface: &mut DynamicSurface,
        e: EdgeId,
        stats: &mut RunStats,
    ) -> Result<EditOutcome<SplitResult>, TrackError> {
        let mesh = surface.mesh();
        let Some([a, b]) = mesh.edge(e) else {
            return Ok(EditOutcome::Rejected(Rejection::DeadElement));
        };
        let incident: Vec<(TriangleId, [VertexId; 3])> = mesh
            .edge_triangles(e)
            .iter()
            .filter_map(|&t| mesh.triangle(t).map(|tri| (t, tri)))
            .collect();
        if incident.is_empty() {
            return Ok(EditOutcome::Rejected(Rejection::Topology));
        }

        let (pa, pb) = (surface.position(a), surface.position(b));
        let mid = (pa + pb) * 0.5;
        for &(_, tri) in &incident {
            let halves = [
                tri.map(|v| if v == b { mid } else { surface.position(v) }),
                tri.map(|v| if v == a { mid } else { surface.position(v) }),
            ];
            let parent = surface.triangle_points(tri);
            if halves.iter().any(|&h| !self.limits.accepts_replacement(parent, h)) {
                return Ok(EditOutcome::Rejected(Rejection::Quality));
            }
        }

        let (solid_a, solid_b) = (surface.is_solid(a), surface.is_solid(b));
        let target = if solid_a || solid_b {
            mid
        } else {
            self.scheme.edge_point(surface, a, b)
        };
        let masses = surface.masses();
        let mass = match (solid_a, solid_b) {
            (true, true) => f64::INFINITY,
            (true, false) => masses[b.index()],
            (false, true) => masses[a.index()],
            (false, false) => 0.5 * (masses[a.index()] + masses[b.index()]),
        };

        let m = surface.add_vertex(mid, mass, VertexOrigin::EdgeSplit([a, b]))?;
        let mut added = Vec::with_capacity(incident.len() * 2);
        for &(t, tri) in &incident {
            surface.remove_triangle(t)?;
            added.push(surface.add_triangle(replace_vertex(tri, b, m))?);
            added.push(surface.add_triangle(replace_vertex(tri, a, m))?);
        }

        let at_midpoint = !(target.distance(mid) > 0.0 && self.try_place(surface, m, target, stats)?);
        stats.edges_split += 1;
        trace!(?a, ?b, ?m, at_midpoint, "Split edge");

        Ok(EditOutcome::Applied(SplitResult {
            new_vertex: m,
            removed_triangles: incident.into_iter().map(|(t, _)| t).collect(),
            added_triangles: added,
            at_midpoint,
        }))
    }

    /// Move the new vertex off the midpoint if that is safe.
    fn try_place(
        &self,
        surface: &mut DynamicSurface,
        m: VertexId,
        target: DVec3,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        if displacement_volume(surface, m, target).abs() > self.options.max_volume_change {
            return Ok(false);
        }
        let worse = surface.mesh().vertex_triangles(m).iter().any(|&t| {
            surface.mesh().triangle(t).is_some_and(|tri| {
                let placed = tri.map(|u| if u == m { target } else { surface.position(u) });
                !self.limits.accepts_replacement(surface.triangle_points(tri), placed)
            })
        });
        if worse {
            return Ok(false);
        }
        surface.try_move_vertices(&[(m, target)], stats)
    }
}

#[cfg(test)]
mod tests {
    use eltopo_config::{GeneralOptions, SubdivisionKind};

    use super::*;
    use crate::history::MeshEvent;
    use crate::maintenance::calculate_mesh_quality;
    use crate::surface::fixtures::{sheet, tetrahedron};

    fn options(max_edge_length: f64) -> StaticOptions {
        StaticOptions {
            min_edge_length: 0.1,
            max_edge_length,
            ..StaticOptions::default()
        }
    }

    fn octahedron() -> DynamicSurface {
        let positions = vec![DVec3::X, DVec3::NEG_X, DVec3::Y, DVec3::NEG_Y, DVec3::Z, DVec3::NEG_Z];
        let triangles = [
            [0, 2, 4],
            [2, 1, 4],
            [1, 3, 4],
            [3, 0, 4],
            [2, 0, 5],
            [1, 2, 5],
            [3, 1, 5],
            [0, 3, 5],
        ];
        DynamicSurface::new(positions, &triangles, vec![1.0; 6], &GeneralOptions::default()).unwrap()
    }

    #[test]
    fn test_split_pass_refines_square() {
        let mut s = sheet(1, 1.0, 0.0, &GeneralOptions::default());
        let mut stats = RunStats::default();
        let splitter = EdgeSplitter::new(&options(0.8));

        assert!(splitter.split_pass(&mut s, &mut stats).unwrap());
        assert_eq!(stats.edges_split, 5);
        assert_eq!(s.mesh().live_vertex_count(), 9);
        assert_eq!(s.mesh().live_triangle_count(), 8);
        assert!(s.mesh().validate().is_ok());
        assert!(s.mesh().live_edges().all(|(e, _)| s.edge_length(e) <= 0.8));

        let splits = s
            .history()
            .count(|ev| matches!(ev, MeshEvent::VertexAdded { origin: VertexOrigin::EdgeSplit(_), .. }));
        assert_eq!(splits, 5);

        // Nothing left to do
        assert!(!splitter.split_pass(&mut s, &mut stats).unwrap());
    }

    #[test]
    fn test_midpoint_split_preserves_volume() {
        let mut s = tetrahedron(&GeneralOptions::default());
        let mut stats = RunStats::default();
        let before = s.total_volume();
        let e = s.mesh().find_edge(VertexId(1), VertexId(2)).unwrap();
        let result = EdgeSplitter::new(&options(0.5))
            .split_edge(&mut s, e, &mut stats)
            .unwrap()
            .applied()
            .unwrap();

        assert!(result.at_midpoint);
        assert_eq!(result.removed_triangles.len(), 2);
        assert_eq!(result.added_triangles.len(), 4);
        assert_eq!(s.position(result.new_vertex), DVec3::new(0.5, 0.5, 0.0));
        assert!((s.total_volume() - before).abs() < 1e-15);
        assert!(s.mesh().validate().is_ok());
    }

    #[test]
    fn test_butterfly_placement_respects_volume_limit() {
        let e = |s: &DynamicSurface| s.mesh().find_edge(VertexId(0), VertexId(2)).unwrap();
        let mut stats = RunStats::default();

        let strict = StaticOptions {
            subdivision_scheme: SubdivisionKind::Butterfly,
            ..options(0.5)
        };
        let mut s = octahedron();
        let edge = e(&s);
        let result = EdgeSplitter::new(&strict)
            .split_edge(&mut s, edge, &mut stats)
            .unwrap()
            .applied()
            .unwrap();
        assert!(result.at_midpoint);

        let loose = StaticOptions {
            max_volume_change: 1.0,
            ..strict
        };
        let mut s = octahedron();
        let edge = e(&s);
        let result = EdgeSplitter::new(&loose)
            .split_edge(&mut s, edge, &mut stats)
            .unwrap()
            .applied()
            .unwrap();
        assert!(!result.at_midpoint);
        assert!((s.position(result.new_vertex) - DVec3::new(0.625, 0.625, 0.0)).length() < 1e-12);
        assert!(s.intersecting_triangle_pairs().is_empty());
    }

    fn single_triangle(apex: DVec3) -> DynamicSurface {
        let positions = vec![DVec3::ZERO, DVec3::X, apex];
        DynamicSurface::new(positions, &[[0, 1, 2]], vec![1.0; 3], &GeneralOptions::default()).unwrap()
    }

    #[test]
    fn test_split_creating_thin_angle_rejected() {
        // Apex of 5.7 degrees, each half would get 2.9
        let mut s = single_triangle(DVec3::new(0.5, 10.0, 0.0));
        let mut stats = RunStats::default();
        let e = s.mesh().find_edge(VertexId(0), VertexId(1)).unwrap();
        assert_eq!(
            EdgeSplitter::new(&options(0.5))
                .split_edge(&mut s, e, &mut stats)
                .unwrap()
                .rejection(),
            Some(Rejection::Quality)
        );
        assert_eq!(s.mesh().live_vertex_count(), 3);
        assert_eq!(s.mesh().live_triangle_count(), 1);
        assert_eq!(stats.edges_split, 0);
    }

    #[test]
    fn test_obtuse_triangle_split_keeps_its_thin_angles() {
        let mut s = single_triangle(DVec3::new(0.5, 0.005, 0.0));
        let mut stats = RunStats::default();
        let splitter = EdgeSplitter::new(&options(2.0));

        assert!(splitter.split_pass(&mut s, &mut stats).unwrap());
        assert_eq!(stats.edges_split, 1);
        assert_eq!(s.mesh().live_triangle_count(), 2);
        assert!(calculate_mesh_quality(&s).max_angle < 177.0);
    }

    #[test]
    fn test_split_dead_edge_rejected() {
        let mut s = tetrahedron(&GeneralOptions::default());
        let mut stats = RunStats::default();
        let splitter = EdgeSplitter::new(&options(0.5));
        let e = s.mesh().find_edge(VertexId(1), VertexId(2)).unwrap();
        assert!(splitter.split_edge(&mut s, e, &mut stats).unwrap().is_applied());
        assert_eq!(
            splitter.split_edge(&mut s, e, &mut stats).unwrap().rejection(),
            Some(Rejection::DeadElement)
        );
    }

    #[test]
    fn test_split_between_solid_vertices_is_solid() {
        let mut s = sheet(1, 1.0, 0.0, &GeneralOptions::default());
        let mut stats = RunStats::default();
        s.masses[0] = f64::INFINITY;
        s.masses[1] = f64::INFINITY;
        let e = s.mesh().find_edge(VertexId(0), VertexId(1)).unwrap();
        let result = EdgeSplitter::new(&options(0.5))
            .split_edge(&mut s, e, &mut stats)
            .unwrap()
            .applied()
            .unwrap();
        assert!(s.is_solid(result.new_vertex));
    }
}
