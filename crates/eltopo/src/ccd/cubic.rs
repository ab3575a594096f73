//! Floating-point coplanarity cubic with a forward error bound.

use glam::DVec3;
use tracing::trace;

use super::{ContactKind, MovingPoint, contact_distance, query_scale};

/// Relative error allowed per coefficient, scaled by the coefficient's
/// absolute-value permanent.
const COEFFICIENT_ERROR: f64 = 64.0 * f64::EPSILON;

/// Contacts closer than this fraction of the query scale count as touching.
pub(crate) const CONTACT_TOLERANCE: f64 = 1e-6;

#[inline]
fn det(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    a.dot(b.cross(c))
}

#[inline]
fn det_abs(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    let (a, b, c) = (a.abs(), b.abs(), c.abs());
    a.x * (b.y * c.z + b.z * c.y) + a.y * (b.z * c.x + b.x * c.z) + a.z * (b.x * c.y + b.y * c.x)
}

/// Relative offsets `(u, v)` of points 1..3 against point 0: start offset and
/// relative displacement.
pub(crate) fn relative_motion(points: &[MovingPoint; 4]) -> [(DVec3, DVec3); 3] {
    let base = points[0];
    [1, 2, 3].map(|i| {
        (
            points[i].start - base.start,
            points[i].displacement() - base.displacement(),
        )
    })
}

/// `c0 + c1 t + c2 t² + c3 t³` with a per-coefficient error bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cubic {
    pub coeffs: [f64; 4],
    pub bounds: [f64; 4],
}

impl Cubic {
    pub fn coplanarity(points: &[MovingPoint; 4]) -> Self {
        let [(u1, v1), (u2, v2), (u3, v3)] = relative_motion(points);
        let coeffs = [
            det(u1, u2, u3),
            det(v1, u2, u3) + det(u1, v2, u3) + det(u1, u2, v3),
            det(u1, v2, v3) + det(v1, u2, v3) + det(v1, v2, u3),
            det(v1, v2, v3),
        ];
        let permanents = [
            det_abs(u1, u2, u3),
            det_abs(v1, u2, u3) + det_abs(u1, v2, u3) + det_abs(u1, u2, v3),
            det_abs(u1, v2, v3) + det_abs(v1, u2, v3) + det_abs(v1, v2, u3),
            det_abs(v1, v2, v3),
        ];
        Self {
            coeffs,
            bounds: permanents.map(|p| p * COEFFICIENT_ERROR),
        }
    }

    pub fn eval(&self, t: f64) -> f64 {
        let [c0, c1, c2, c3] = self.coeffs;
        ((c3 * t + c2) * t + c1) * t + c0
    }

    fn error_at(&self, t: f64) -> f64 {
        let [b0, b1, b2, b3] = self.bounds;
        ((b3 * t + b2) * t + b1) * t + b0
    }

    /// Every coefficient is indistinguishable from zero.
    pub fn is_degenerate(&self) -> bool {
        self.coeffs
            .iter()
            .zip(self.bounds)
            .all(|(c, b)| c.abs() <= b)
    }

    /// Candidate contact times in `[0, 1]`, ascending.
    pub fn roots_in_unit_interval(&self) -> Vec<f64> {
        let knots = knots(self.coeffs);
        let mut roots = Vec::new();
        for pair in knots.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let f_lo = self.eval(lo);
            let f_hi = self.eval(hi);
            if f_lo.abs() <= self.error_at(lo) {
                roots.push(lo);
            }
            if (f_lo < 0.0 && f_hi > 0.0) || (f_lo > 0.0 && f_hi < 0.0) {
                roots.push(bisect(|t| self.eval(t), lo, hi, f_lo));
            }
        }
        if let Some(&last) = knots.last()
            && self.eval(last).abs() <= self.error_at(last)
        {
            roots.push(last);
        }
        roots.dedup_by(|a, b| (*a - *b).abs() < 1e-15);
        roots
    }
}

/// Interval endpoints and critical points of the cubic inside `(0, 1)`.
pub(crate) fn knots(coeffs: [f64; 4]) -> Vec<f64> {
    let [_, c1, c2, c3] = coeffs;
    let mut knots = vec![0.0];
    let mut critical = quadratic_roots(3.0 * c3, 2.0 * c2, c1);
    critical.retain(|t| *t > 0.0 && *t < 1.0);
    critical.sort_by(f64::total_cmp);
    knots.extend(critical);
    knots.push(1.0);
    knots
}

/// Real roots of `a t² + b t + c`.
fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a == 0.0 {
        return if b != 0.0 { vec![-c / b] } else { Vec::new() };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    let mut roots = vec![q / a];
    if q != 0.0 {
        roots.push(c / q);
    }
    roots.retain(|r| r.is_finite());
    roots
}

/// Bisection on a bracketing interval where `f(lo)` has sign of `f_lo`.
pub(crate) fn bisect(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, mut f_lo: f64) -> f64 {
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return mid;
        }
        if (f_mid < 0.0) == (f_lo < 0.0) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Earliest time at which the primitives are coplanar and touching.
pub(super) fn first_contact(points: &[MovingPoint; 4], kind: ContactKind) -> Option<f64> {
    let cubic = Cubic::coplanarity(points);
    if cubic.is_degenerate() {
        trace!(?kind, "Coplanar throughout step, treated as no collision");
        return None;
    }
    let tolerance = CONTACT_TOLERANCE * query_scale(points);
    cubic
        .roots_in_unit_interval()
        .into_iter()
        .find(|&t| contact_distance(points, kind, t) <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_roots() {
        let mut r = quadratic_roots(1.0, -3.0, 2.0);
        r.sort_by(f64::total_cmp);
        assert_eq!(r, vec![1.0, 2.0]);
        assert!(quadratic_roots(1.0, 0.0, 1.0).is_empty());
        assert_eq!(quadratic_roots(0.0, 2.0, -1.0), vec![0.5]);
    }

    #[test]
    fn test_cubic_roots_with_two_crossings() {
        // (t - 0.25)(t - 0.75) * 4 = 4t² - 4t + 0.75
        let cubic = Cubic {
            coeffs: [0.75, -4.0, 4.0, 0.0],
            bounds: [0.0; 4],
        };
        let roots = cubic.roots_in_unit_interval();
        assert_eq!(roots.len(), 2);
        assert!((roots[0] - 0.25).abs() < 1e-12);
        assert!((roots[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_motion_is_rejected() {
        let p = |x: f64, y: f64| MovingPoint::new(DVec3::new(x, y, 0.0), DVec3::new(x, y + 0.5, 0.0));
        let points = [p(0.0, 0.0), p(1.0, 0.0), p(0.0, 1.0), p(0.2, 0.2)];
        assert!(Cubic::coplanarity(&points).is_degenerate());
        assert_eq!(first_contact(&points, ContactKind::PointTriangle), None);
    }
}
