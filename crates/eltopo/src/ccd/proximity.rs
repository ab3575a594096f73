use glam::DVec3;

use super::ContactKind;
use crate::geometry::{point_triangle_distance, segment_segment_distance, triangle_unit_normal};

/// Static closeness between two primitives, weights as in [`super::Impact`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub kind: ContactKind,
    pub distance: f64,
    pub normal: DVec3,
    pub weights: [f64; 4],
}

/// Point `x` against triangle `a b c` when closer than `threshold`.
pub fn point_triangle_proximity(x: DVec3, triangle: [DVec3; 3], threshold: f64) -> Option<Proximity> {
    let [a, b, c] = triangle;
    let (distance, [ua, ub, uc]) = point_triangle_distance(x, a, b, c);
    if distance >= threshold {
        return None;
    }
    let closest = a * ua + b * ub + c * uc;
    let normal = if distance > 0.0 {
        (x - closest) / distance
    } else {
        triangle_unit_normal(a, b, c)
    };
    Some(Proximity {
        kind: ContactKind::PointTriangle,
        distance,
        normal,
        weights: [1.0, -ua, -ub, -uc],
    })
}

/// Edge `p` against edge `q` when closer than `threshold`.
pub fn edge_edge_proximity(p: [DVec3; 2], q: [DVec3; 2], threshold: f64) -> Option<Proximity> {
    let (distance, s, t) = segment_segment_distance(p[0], p[1], q[0], q[1]);
    if distance >= threshold {
        return None;
    }
    let cp = p[0].lerp(p[1], s);
    let cq = q[0].lerp(q[1], t);
    let normal = if distance > 0.0 {
        (cp - cq) / distance
    } else {
        (p[1] - p[0]).cross(q[1] - q[0]).normalize_or_zero()
    };
    Some(Proximity {
        kind: ContactKind::EdgeEdge,
        distance,
        normal,
        weights: [1.0 - s, s, -(1.0 - t), -t],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_above_triangle() {
        let tri = [DVec3::ZERO, DVec3::X, DVec3::Y];
        let p = point_triangle_proximity(DVec3::new(0.2, 0.2, 0.01), tri, 0.1).unwrap();
        assert!((p.distance - 0.01).abs() < 1e-12);
        assert!((p.normal - DVec3::Z).length() < 1e-9);
        assert!(point_triangle_proximity(DVec3::new(0.2, 0.2, 0.5), tri, 0.1).is_none());
    }

    #[test]
    fn test_edges_close() {
        let p = [DVec3::new(-1.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0)];
        let q = [DVec3::new(0.0, -1.0, 0.05), DVec3::new(0.0, 1.0, 0.05)];
        let prox = edge_edge_proximity(p, q, 0.1).unwrap();
        assert!((prox.normal + DVec3::Z).length() < 1e-9);
        assert!((prox.weights[0] - 0.5).abs() < 1e-12);
    }
}
