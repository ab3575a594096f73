//! Exact coplanarity cubic and root isolation by exact sign evaluation.

use glam::DVec3;

use super::cubic::{CONTACT_TOLERANCE, knots};
use super::{ContactKind, MovingPoint, contact_distance, query_scale};
use crate::geometry::triangle_normal;
use crate::predicates::{Expansion, ExpansionVec3, orient3d_sos};
use crate::predicates::expansion::triple_product;

/// Cubic coefficients `c0..c3` held exactly.
struct ExactCubic {
    coeffs: [Expansion; 4],
}

impl ExactCubic {
    fn coplanarity(points: &[MovingPoint; 4]) -> Self {
        let base = points[0];
        let base_disp = ExpansionVec3::diff(base.end.to_array(), base.start.to_array());
        let rel = [1, 2, 3].map(|i| {
            let p = points[i];
            let u = ExpansionVec3::diff(p.start.to_array(), base.start.to_array());
            let v = ExpansionVec3::diff(p.end.to_array(), p.start.to_array()).sub(&base_disp);
            (u, v)
        });
        let [(u1, v1), (u2, v2), (u3, v3)] = &rel;

        let c0 = triple_product(u1, u2, u3);
        let c1 = triple_product(v1, u2, u3)
            .add(&triple_product(u1, v2, u3))
            .add(&triple_product(u1, u2, v3));
        let c2 = triple_product(u1, v2, v3)
            .add(&triple_product(v1, u2, v3))
            .add(&triple_product(v1, v2, u3));
        let c3 = triple_product(v1, v2, v3);
        Self {
            coeffs: [c0, c1, c2, c3],
        }
    }

    /// Exact sign of the cubic at a double `t`.
    fn sign_at(&self, t: f64) -> i32 {
        let [c0, c1, c2, c3] = &self.coeffs;
        c3.scale(t)
            .add(c2)
            .scale(t)
            .add(c1)
            .scale(t)
            .add(c0)
            .sign()
    }

    fn estimates(&self) -> [f64; 4] {
        [0, 1, 2, 3].map(|k| self.coeffs[k].estimate())
    }
}

/// Earliest bracketed coplanar time at which the primitives touch.
///
/// The sign of the cubic is exact at every evaluated time. An exact zero is
/// resolved by the symbolically perturbed orientation of the points at that
/// time, so a configuration that stays coplanar throughout yields a definite
/// answer instead of an arbitrary one.
pub(super) fn first_contact(
    points: &[MovingPoint; 4],
    ids: [usize; 4],
    kind: ContactKind,
) -> Option<f64> {
    let cubic = ExactCubic::coplanarity(points);
    let sign = |t: f64| match cubic.sign_at(t) {
        0 => orient3d_sos(points.map(|p| p.at(t)), ids),
        s => s,
    };

    let knots = knots(cubic.estimates());
    let mut lo = knots[0];
    let mut sign_lo = sign(lo);
    for &hi in &knots[1..] {
        let sign_hi = sign(hi);
        if sign_hi != sign_lo {
            let t = isolate(&sign, lo, hi, sign_lo);
            if touches(points, ids, kind, t) {
                return Some(t);
            }
        }
        lo = hi;
        sign_lo = sign_hi;
    }
    None
}

/// Shrink a sign-changing bracket to double resolution.
fn isolate(sign: &impl Fn(f64) -> i32, mut lo: f64, mut hi: f64, sign_lo: i32) -> f64 {
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if sign(mid) == sign_lo {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Containment at time `t` decided with exact orientation signs around a
/// lifted apex.
fn touches(points: &[MovingPoint; 4], ids: [usize; 4], kind: ContactKind, t: f64) -> bool {
    let [q0, q1, q2, q3] = points.map(|p| p.at(t));
    let tolerance = CONTACT_TOLERANCE * query_scale(points);
    match kind {
        ContactKind::PointTriangle => {
            let [ia, ib, ic, ix] = ids;
            let (a, b, c, x) = (q0, q1, q2, q3);
            let n = triangle_normal(a, b, c);
            if is_negligible(n, (b - a).length() * (c - a).length()) {
                return contact_distance(points, kind, t) <= tolerance;
            }
            let s0 = orient3d_sos([a, b, a + n, x], [ia, ib, ic, ix]);
            let s1 = orient3d_sos([b, c, b + n, x], [ib, ic, ia, ix]);
            let s2 = orient3d_sos([c, a, c + n, x], [ic, ia, ib, ix]);
            s0 == s1 && s1 == s2
        }
        ContactKind::EdgeEdge => {
            let [ip0, ip1, iq0, iq1] = ids;
            let (p0, p1, r0, r1) = (q0, q1, q2, q3);
            let n = (p1 - p0).cross(r1 - r0);
            if is_negligible(n, (p1 - p0).length() * (r1 - r0).length()) {
                return contact_distance(points, kind, t) <= tolerance;
            }
            let a0 = orient3d_sos([p0, p1, p0 + n, r0], [ip0, ip1, iq1, iq0]);
            let a1 = orient3d_sos([p0, p1, p0 + n, r1], [ip0, ip1, iq0, iq1]);
            let b0 = orient3d_sos([r0, r1, r0 + n, p0], [iq0, iq1, ip1, ip0]);
            let b1 = orient3d_sos([r0, r1, r0 + n, p1], [iq0, iq1, ip0, ip1]);
            a0 != a1 && b0 != b1
        }
    }
}

fn is_negligible(n: DVec3, reference: f64) -> bool {
    n.length() <= 1e-12 * reference || !n.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_sign_of_tiny_crossing() {
        // Point grazes just below the plane at the end of the step
        let tri = [DVec3::ZERO, DVec3::X, DVec3::Y].map(MovingPoint::stationary);
        let x = MovingPoint::new(DVec3::new(0.2, 0.2, 1.0), DVec3::new(0.2, 0.2, -1e-300));
        let points = [tri[0], tri[1], tri[2], x];
        let t = first_contact(&points, [0, 1, 2, 3], ContactKind::PointTriangle);
        assert!(t.is_some_and(|t| t > 0.99));
    }

    #[test]
    fn test_coplanar_throughout_is_definite() {
        let p = |x: f64, y: f64| MovingPoint::new(DVec3::new(x, y, 0.0), DVec3::new(x + 0.5, y, 0.0));
        let points = [p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0), p(-0.5, 0.2)];
        let first = first_contact(&points, [0, 1, 2, 3], ContactKind::PointTriangle);
        let again = first_contact(&points, [0, 1, 2, 3], ContactKind::PointTriangle);
        assert_eq!(first, again);
        assert_eq!(first, None);
    }
}
