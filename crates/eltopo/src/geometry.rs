//! Static geometry on `DVec3` positions: closest points, areas, angles,
//! volumes and exact intersection tests.

use glam::{DMat3, DVec3};

use crate::predicates::orient3d_sos;

/// Unnormalized normal `(b - a) × (c - a)`.
#[inline]
pub fn triangle_normal(a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    (b - a).cross(c - a)
}

#[inline]
pub fn triangle_unit_normal(a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    triangle_normal(a, b, c).normalize_or_zero()
}

#[inline]
pub fn triangle_area(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    0.5 * triangle_normal(a, b, c).length()
}

#[inline]
pub fn triangle_centroid(a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    (a + b + c) / 3.0
}

/// Angle between two vectors in radians, clamped against roundoff.
pub fn angle_between(u: DVec3, v: DVec3) -> f64 {
    let denom = u.length() * v.length();
    if denom == 0.0 {
        return 0.0;
    }
    (u.dot(v) / denom).clamp(-1.0, 1.0).acos()
}

/// Interior angles at `a`, `b` and `c`, in radians.
pub fn triangle_angles(a: DVec3, b: DVec3, c: DVec3) -> [f64; 3] {
    [
        angle_between(b - a, c - a),
        angle_between(a - b, c - b),
        angle_between(a - c, b - c),
    ]
}

pub fn min_triangle_angle(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    let [x, y, z] = triangle_angles(a, b, c);
    x.min(y).min(z)
}

pub fn max_triangle_angle(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    let [x, y, z] = triangle_angles(a, b, c);
    x.max(y).max(z)
}

/// Signed volume of the tetrahedron `a, b, c, d`.
#[inline]
pub fn tet_volume(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    (b - a).dot((c - a).cross(d - a)) / 6.0
}

/// Volume enclosed by a set of triangles relative to `origin`.
///
/// For a closed patch the value is independent of `origin`; for an open
/// patch the difference between two patches with the same boundary is.
pub fn patch_volume(triangles: &[[DVec3; 3]], origin: DVec3) -> f64 {
    triangles
        .iter()
        .map(|[a, b, c]| tet_volume(origin, *a, *b, *c))
        .sum()
}

/// Outer product `a bᵀ`.
#[inline]
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Closest point on segment `a b` to `x`: `(distance, s)` with the closest
/// point at `(1 - s) a + s b`.
pub fn point_segment_distance(x: DVec3, a: DVec3, b: DVec3) -> (f64, f64) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let s = if len_sq == 0.0 {
        0.0
    } else {
        ((x - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    };
    (x.distance(a + ab * s), s)
}

/// Closest point on triangle `a b c` to `x`: `(distance, [wa, wb, wc])`
/// with barycentric weights summing to one.
pub fn point_triangle_distance(x: DVec3, a: DVec3, b: DVec3, c: DVec3) -> (f64, [f64; 3]) {
    let ab = b - a;
    let ac = c - a;
    let ap = x - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (x.distance(a), [1.0, 0.0, 0.0]);
    }

    let bp = x - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (x.distance(b), [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (x.distance(a + ab * v), [1.0 - v, v, 0.0]);
    }

    let cp = x - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (x.distance(c), [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (x.distance(a + ac * w), [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (x.distance(b + (c - b) * w), [0.0, 1.0 - w, w]);
    }

    let denom = va + vb + vc;
    if denom == 0.0 {
        // Degenerate triangle: fall back to the closest edge
        let candidates = [
            (point_segment_distance(x, a, b), 0usize),
            (point_segment_distance(x, b, c), 1),
            (point_segment_distance(x, a, c), 2),
        ];
        let ((dist, s), which) = candidates
            .into_iter()
            .min_by(|l, r| l.0.0.total_cmp(&r.0.0))
            .unwrap_or(((x.distance(a), 0.0), 0));
        let weights = match which {
            0 => [1.0 - s, s, 0.0],
            1 => [0.0, 1.0 - s, s],
            _ => [1.0 - s, 0.0, s],
        };
        return (dist, weights);
    }
    let v = vb / denom;
    let w = vc / denom;
    let closest = a + ab * v + ac * w;
    (x.distance(closest), [1.0 - v - w, v, w])
}

/// Closest points between segments `p0 p1` and `q0 q1`:
/// `(distance, s, t)` with points `(1 - s) p0 + s p1` and `(1 - t) q0 + t q1`.
pub fn segment_segment_distance(p0: DVec3, p1: DVec3, q0: DVec3, q1: DVec3) -> (f64, f64, f64) {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    let (s, t) = if a <= f64::MIN_POSITIVE && e <= f64::MIN_POSITIVE {
        (0.0, 0.0)
    } else if a <= f64::MIN_POSITIVE {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= f64::MIN_POSITIVE {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > 0.0 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    let cp = p0 + d1 * s;
    let cq = q0 + d2 * t;
    (cp.distance(cq), s, t)
}

/// Exact segment / triangle intersection with symbolic tie-breaking.
///
/// `indices` are the vertex ids of `[p0, p1, a, b, c]`; they must be
/// distinct for the tie-breaking to be meaningful.
pub fn segment_triangle_intersects(
    segment: [DVec3; 2],
    triangle: [DVec3; 3],
    indices: [usize; 5],
) -> bool {
    let [p0, p1] = segment;
    let [a, b, c] = triangle;
    let [ip0, ip1, ia, ib, ic] = indices;

    let s0 = orient3d_sos([a, b, c, p0], [ia, ib, ic, ip0]);
    let s1 = orient3d_sos([a, b, c, p1], [ia, ib, ic, ip1]);
    if s0 == s1 {
        return false;
    }

    let e0 = orient3d_sos([p0, p1, a, b], [ip0, ip1, ia, ib]);
    let e1 = orient3d_sos([p0, p1, b, c], [ip0, ip1, ib, ic]);
    let e2 = orient3d_sos([p0, p1, c, a], [ip0, ip1, ic, ia]);
    e0 == e1 && e1 == e2
}

/// Exact test for intersection between two triangles that share no vertex.
pub fn triangle_triangle_intersects(
    t0: [DVec3; 3],
    i0: [usize; 3],
    t1: [DVec3; 3],
    i1: [usize; 3],
) -> bool {
    let edges = [(0, 1), (1, 2), (2, 0)];
    edges.iter().any(|&(j, k)| {
        segment_triangle_intersects([t0[j], t0[k]], t1, [i0[j], i0[k], i1[0], i1[1], i1[2]])
    }) || edges.iter().any(|&(j, k)| {
        segment_triangle_intersects([t1[j], t1[k]], t0, [i1[j], i1[k], i0[0], i0[1], i0[2]])
    })
}
