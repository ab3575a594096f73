//! Continuous collision detection between moving mesh primitives.
//!
//! Both strategies reduce a contact query to the cubic in `t` that vanishes
//! when the four moving points are coplanar, then test whether the primitives
//! actually touch at a coplanar time. Queries are canonicalized by sorting
//! vertex ids so the same pair gets the same answer however it is asked.

mod cubic;
mod exact;
mod proximity;

use glam::DVec3;
use tracing::trace;

pub use eltopo_config::CcdStrategy;
pub use proximity::{Proximity, edge_edge_proximity, point_triangle_proximity};

use crate::geometry::{point_triangle_distance, segment_segment_distance, triangle_unit_normal};

/// A point moving linearly from `start` to `end` over `t ∈ [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingPoint {
    pub start: DVec3,
    pub end: DVec3,
}

impl MovingPoint {
    pub fn new(start: DVec3, end: DVec3) -> Self {
        Self { start, end }
    }

    pub fn stationary(p: DVec3) -> Self {
        Self { start: p, end: p }
    }

    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.start + (self.end - self.start) * t
    }

    #[inline]
    pub fn displacement(&self) -> DVec3 {
        self.end - self.start
    }
}

/// Primitive pair involved in a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKind {
    /// Vertex 0 against triangle 1-2-3
    PointTriangle,
    /// Edge 0-1 against edge 2-3
    EdgeEdge,
}

/// First contact found by a CCD query.
///
/// `weights` express the relative position of the two primitives as a
/// combination of the four vertices: `[1, -a, -b, -c]` for a point against a
/// triangle with barycentrics `(a, b, c)`, and `[1-s, s, -(1-t), -t]` for two
/// edges. `normal` is oriented so the relative separation at the start of the
/// step is non-negative along it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub kind: ContactKind,
    pub time: f64,
    pub normal: DVec3,
    pub weights: [f64; 4],
}

impl Impact {
    /// Weighted combination `Σ wᵢ vᵢ` of per-vertex values.
    pub fn relative(&self, values: [DVec3; 4]) -> DVec3 {
        values
            .iter()
            .zip(self.weights)
            .fold(DVec3::ZERO, |acc, (v, w)| acc + *v * w)
    }
}

/// Front door for continuous collision queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CcdSolver {
    strategy: CcdStrategy,
}

impl CcdSolver {
    pub fn new(strategy: CcdStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> CcdStrategy {
        self.strategy
    }

    /// Point against triangle. `ids` are `[point, a, b, c]`.
    pub fn point_triangle(
        &self,
        point: MovingPoint,
        triangle: [MovingPoint; 3],
        ids: [usize; 4],
    ) -> Option<Impact> {
        let mut order = [0usize, 1, 2];
        order.sort_by_key(|&k| ids[k + 1]);
        let tri = order.map(|k| triangle[k]);
        let tri_ids = order.map(|k| ids[k + 1]);

        let time = self.first_contact(
            [tri[0], tri[1], tri[2], point],
            [tri_ids[0], tri_ids[1], tri_ids[2], ids[0]],
            ContactKind::PointTriangle,
        )?;

        let sorted = point_triangle_impact(point, tri, time);
        let mut weights = sorted.weights;
        for (j, &k) in order.iter().enumerate() {
            weights[k + 1] = sorted.weights[j + 1];
        }
        trace!(?ids, time, "Point-triangle impact");
        Some(Impact { weights, ..sorted })
    }

    /// Edge against edge. `ids` are `[p0, p1, q0, q1]`.
    pub fn edge_edge(
        &self,
        e0: [MovingPoint; 2],
        e1: [MovingPoint; 2],
        ids: [usize; 4],
    ) -> Option<Impact> {
        let (e0, i0, flip0) = sort_edge(e0, [ids[0], ids[1]]);
        let (e1, i1, flip1) = sort_edge(e1, [ids[2], ids[3]]);
        let swap = i1[0] < i0[0];
        let (pa, ia, pb, ib) = if swap {
            (e1, i1, e0, i0)
        } else {
            (e0, i0, e1, i1)
        };

        let time = self.first_contact(
            [pa[0], pa[1], pb[0], pb[1]],
            [ia[0], ia[1], ib[0], ib[1]],
            ContactKind::EdgeEdge,
        )?;

        let sorted = edge_edge_impact(pa, pb, time);
        let mut weights = sorted.weights;
        let mut normal = sorted.normal;
        if swap {
            weights = [-weights[2], -weights[3], -weights[0], -weights[1]];
            normal = -normal;
        }
        if flip0 {
            weights.swap(0, 1);
        }
        if flip1 {
            weights.swap(2, 3);
        }
        trace!(?ids, time, "Edge-edge impact");
        Some(Impact {
            weights,
            normal,
            ..sorted
        })
    }

    fn first_contact(
        &self,
        points: [MovingPoint; 4],
        ids: [usize; 4],
        kind: ContactKind,
    ) -> Option<f64> {
        match self.strategy {
            CcdStrategy::FloatingPoint => cubic::first_contact(&points, kind),
            CcdStrategy::Exact => exact::first_contact(&points, ids, kind),
        }
    }
}

fn sort_edge(edge: [MovingPoint; 2], ids: [usize; 2]) -> ([MovingPoint; 2], [usize; 2], bool) {
    if ids[1] < ids[0] {
        ([edge[1], edge[0]], [ids[1], ids[0]], true)
    } else {
        (edge, ids, false)
    }
}

/// Characteristic length of a query, used to scale geometric tolerances.
pub(crate) fn query_scale(points: &[MovingPoint; 4]) -> f64 {
    let mut lo = DVec3::splat(f64::INFINITY);
    let mut hi = DVec3::splat(f64::NEG_INFINITY);
    for p in points {
        lo = lo.min(p.start).min(p.end);
        hi = hi.max(p.start).max(p.end);
    }
    (hi - lo).length().max(f64::MIN_POSITIVE)
}

/// Distance between the primitives at time `t`, points in orientation order.
pub(crate) fn contact_distance(points: &[MovingPoint; 4], kind: ContactKind, t: f64) -> f64 {
    let [q0, q1, q2, q3] = points.map(|p| p.at(t));
    match kind {
        ContactKind::PointTriangle => point_triangle_distance(q3, q0, q1, q2).0,
        ContactKind::EdgeEdge => segment_segment_distance(q0, q1, q2, q3).0,
    }
}

fn point_triangle_impact(point: MovingPoint, tri: [MovingPoint; 3], time: f64) -> Impact {
    let x = point.at(time);
    let [a, b, c] = tri.map(|p| p.at(time));
    let (_, [ua, ub, uc]) = point_triangle_distance(x, a, b, c);
    let weights = [1.0, -ua, -ub, -uc];
    let mut normal = triangle_unit_normal(a, b, c);
    if normal == DVec3::ZERO {
        normal = triangle_unit_normal(tri[0].start, tri[1].start, tri[2].start);
    }
    let normal = orient_normal(normal, weights, [point, tri[0], tri[1], tri[2]]);
    Impact {
        kind: ContactKind::PointTriangle,
        time,
        normal,
        weights,
    }
}

fn edge_edge_impact(p: [MovingPoint; 2], q: [MovingPoint; 2], time: f64) -> Impact {
    let [p0, p1] = p.map(|m| m.at(time));
    let [q0, q1] = q.map(|m| m.at(time));
    let (_, s, t) = segment_segment_distance(p0, p1, q0, q1);
    let weights = [1.0 - s, s, -(1.0 - t), -t];
    let normal = (p1 - p0).cross(q1 - q0).normalize_or_zero();
    let normal = orient_normal(normal, weights, [p[0], p[1], q[0], q[1]]);
    Impact {
        kind: ContactKind::EdgeEdge,
        time,
        normal,
        weights,
    }
}

/// Flip `normal` so the weighted separation at `t = 0` is non-negative
/// along it; when the primitives start in contact, oppose the relative
/// motion instead.
fn orient_normal(normal: DVec3, weights: [f64; 4], points: [MovingPoint; 4]) -> DVec3 {
    let mut separation = DVec3::ZERO;
    let mut motion = DVec3::ZERO;
    for (p, w) in points.iter().zip(weights) {
        separation += p.start * w;
        motion += p.displacement() * w;
    }

    if normal == DVec3::ZERO {
        let n = separation.normalize_or_zero();
        return if n != DVec3::ZERO {
            n
        } else {
            (-motion).normalize_or_zero()
        };
    }

    let along = separation.dot(normal);
    let scale = separation.length().max(motion.length());
    if along.abs() > 1e-12 * scale {
        if along < 0.0 { -normal } else { normal }
    } else if motion.dot(normal) > 0.0 {
        -normal
    } else {
        normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn falling_point(x: f64, y: f64) -> MovingPoint {
        MovingPoint::new(DVec3::new(x, y, 1.0), DVec3::new(x, y, -1.0))
    }

    fn floor() -> [MovingPoint; 3] {
        [
            MovingPoint::stationary(DVec3::ZERO),
            MovingPoint::stationary(DVec3::X),
            MovingPoint::stationary(DVec3::Y),
        ]
    }

    fn solvers() -> [CcdSolver; 2] {
        [
            CcdSolver::new(CcdStrategy::FloatingPoint),
            CcdSolver::new(CcdStrategy::Exact),
        ]
    }

    #[test]
    fn test_point_falls_through_triangle() {
        for solver in solvers() {
            let impact = solver
                .point_triangle(falling_point(0.25, 0.25), floor(), [3, 0, 1, 2])
                .expect("point crosses the triangle");
            assert!((impact.time - 0.5).abs() < 1e-9);
            assert!((impact.normal - DVec3::Z).length() < 1e-9);
            assert!((impact.weights[0] - 1.0).abs() < 1e-12);
            assert!((impact.weights[1] + 0.5).abs() < 1e-9);
            assert!((impact.weights[2] + 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_point_misses_triangle() {
        for solver in solvers() {
            assert!(
                solver
                    .point_triangle(falling_point(1.0, 1.0), floor(), [3, 0, 1, 2])
                    .is_none()
            );
        }
    }

    #[test]
    fn test_weights_follow_caller_order() {
        let solver = CcdSolver::new(CcdStrategy::FloatingPoint);
        let tri = floor();
        let shuffled = [tri[2], tri[0], tri[1]];
        let impact = solver
            .point_triangle(falling_point(0.25, 0.25), shuffled, [3, 2, 0, 1])
            .expect("point crosses the triangle");
        // Weight for vertex 0 (barycentric 0.5) is in slot 2
        assert!((impact.weights[2] + 0.5).abs() < 1e-9);
        assert!((impact.weights[1] + 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_crossing_edges() {
        let e0 = [
            MovingPoint::stationary(DVec3::new(-1.0, 0.0, 0.0)),
            MovingPoint::stationary(DVec3::new(1.0, 0.0, 0.0)),
        ];
        let e1 = [
            MovingPoint::new(DVec3::new(0.0, -1.0, 1.0), DVec3::new(0.0, -1.0, -1.0)),
            MovingPoint::new(DVec3::new(0.0, 1.0, 1.0), DVec3::new(0.0, 1.0, -1.0)),
        ];
        for solver in solvers() {
            let impact = solver.edge_edge(e0, e1, [5, 1, 2, 9]).expect("edges cross");
            assert!((impact.time - 0.5).abs() < 1e-9);
            // Edge e0 is below e1 at the start
            assert!(impact.normal.z < 0.0);
            let sum: f64 = impact.weights.iter().sum();
            assert!(sum.abs() < 1e-9);
        }
    }

    #[test]
    fn test_parallel_edges_apart() {
        let e0 = [
            MovingPoint::stationary(DVec3::ZERO),
            MovingPoint::stationary(DVec3::X),
        ];
        let e1 = [
            MovingPoint::new(DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 0.5, 0.0)),
            MovingPoint::new(DVec3::new(1.0, 1.0, 0.0), DVec3::new(1.0, 0.5, 0.0)),
        ];
        for solver in solvers() {
            assert!(solver.edge_edge(e0, e1, [0, 1, 2, 3]).is_none());
        }
    }

    #[test]
    fn test_relative_combination() {
        let impact = Impact {
            kind: ContactKind::EdgeEdge,
            time: 0.0,
            normal: DVec3::Z,
            weights: [0.5, 0.5, -0.5, -0.5],
        };
        let r = impact.relative([DVec3::Z, DVec3::Z, DVec3::ZERO, DVec3::ZERO]);
        assert_eq!(r, DVec3::Z);
    }
}
