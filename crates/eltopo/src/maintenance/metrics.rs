//! Triangle quality limits and whole-mesh quality summaries.

use glam::DVec3;

use eltopo_config::StaticOptions;

use crate::geometry::{max_triangle_angle, min_triangle_angle, triangle_area};
use crate::surface::DynamicSurface;

/// Slack, in radians, when comparing an angle with the one it replaces.
const ANGLE_TOLERANCE: f64 = 1e-9;

/// Shape limits a triangle produced by an edit must respect.
#[derive(Debug, Clone, Copy)]
pub struct QualityLimits {
    /// Smallest interior angle, radians
    pub min_angle: f64,
    /// Largest interior angle, radians
    pub max_angle: f64,
    pub min_area: f64,
}

impl QualityLimits {
    pub fn from_options(options: &StaticOptions) -> Self {
        Self {
            min_angle: options.min_triangle_angle.to_radians(),
            max_angle: options.max_triangle_angle.to_radians(),
            min_area: options.min_triangle_area,
        }
    }

    pub fn is_degenerate(&self, [a, b, c]: [DVec3; 3]) -> bool {
        !(triangle_area(a, b, c) >= self.min_area)
    }

    /// Whether a triangle has enough area and no angle outside the limits.
    pub fn accepts(&self, tri: [DVec3; 3]) -> bool {
        let [a, b, c] = tri;
        !self.is_degenerate(tri)
            && min_triangle_angle(a, b, c) >= self.min_angle
            && max_triangle_angle(a, b, c) <= self.max_angle
    }

    /// Whether `new`, replacing `old`, respects the limits. Where `old`
    /// already broke an angle limit, `new` may match it but not be worse.
    pub fn accepts_replacement(&self, old: [DVec3; 3], new: [DVec3; 3]) -> bool {
        let ([a, b, c], [x, y, z]) = (old, new);
        let floor = self.min_angle.min(min_triangle_angle(a, b, c)) - ANGLE_TOLERANCE;
        let ceiling = self.max_angle.max(max_triangle_angle(a, b, c)) + ANGLE_TOLERANCE;
        !self.is_degenerate(new)
            && min_triangle_angle(x, y, z) >= floor
            && max_triangle_angle(x, y, z) <= ceiling
    }

    /// Whether a triangle violates the angle limits and needs attention.
    pub fn is_needle(&self, [a, b, c]: [DVec3; 3]) -> bool {
        min_triangle_angle(a, b, c) < self.min_angle
    }

    pub fn is_obtuse(&self, [a, b, c]: [DVec3; 3]) -> bool {
        max_triangle_angle(a, b, c) > self.max_angle
    }
}

/// Summary of mesh quality, angles in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeshQuality {
    pub triangle_count: usize,
    pub min_angle: f64,
    pub max_angle: f64,
    pub min_edge_length: f64,
    pub max_edge_length: f64,
    pub mean_edge_length: f64,
    pub min_triangle_area: f64,
}

/// Measure every live triangle and edge of the surface.
pub fn calculate_mesh_quality(surface: &DynamicSurface) -> MeshQuality {
    let mesh = surface.mesh();
    let mut quality = MeshQuality {
        min_angle: f64::INFINITY,
        min_edge_length: f64::INFINITY,
        min_triangle_area: f64::INFINITY,
        ..MeshQuality::default()
    };

    for (_, tri) in mesh.live_triangles() {
        let [a, b, c] = surface.triangle_points(tri);
        quality.triangle_count += 1;
        quality.min_angle = quality.min_angle.min(min_triangle_angle(a, b, c).to_degrees());
        quality.max_angle = quality.max_angle.max(max_triangle_angle(a, b, c).to_degrees());
        quality.min_triangle_area = quality.min_triangle_area.min(triangle_area(a, b, c));
    }

    let mut edge_count = 0usize;
    let mut total = 0.0;
    for (_, [a, b]) in mesh.live_edges() {
        let length = surface.position(a).distance(surface.position(b));
        quality.min_edge_length = quality.min_edge_length.min(length);
        quality.max_edge_length = quality.max_edge_length.max(length);
        total += length;
        edge_count += 1;
    }

    if quality.triangle_count == 0 {
        quality.min_angle = 0.0;
        quality.min_triangle_area = 0.0;
    }
    if edge_count == 0 {
        quality.min_edge_length = 0.0;
    } else {
        quality.mean_edge_length = total / edge_count as f64;
    }
    quality
}

#[cfg(test)]
mod tests {
    use eltopo_config::GeneralOptions;

    use super::*;
    use crate::surface::fixtures::{sheet, tetrahedron};

    #[test]
    fn test_limits_convert_degrees() {
        let limits = QualityLimits::from_options(&StaticOptions::default());
        assert!((limits.min_angle - 3.0_f64.to_radians()).abs() < 1e-15);
        assert!((limits.max_angle - 177.0_f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    fn test_needle_triangle_rejected() {
        let limits = QualityLimits::from_options(&StaticOptions::default());
        let right = [DVec3::ZERO, DVec3::X, DVec3::Y];
        assert!(limits.accepts(right));
        let needle = [DVec3::ZERO, DVec3::X, DVec3::new(0.5, 0.001, 0.0)];
        assert!(limits.is_obtuse(needle));
        assert!(!limits.accepts(needle));
        let sliver = [DVec3::ZERO, DVec3::X, DVec3::new(10.0, 0.01, 0.0)];
        assert!(limits.is_needle(sliver));
        assert!(limits.is_degenerate([DVec3::ZERO, DVec3::X, DVec3::X * 2.0]));
    }

    #[test]
    fn test_replacement_may_not_worsen_bad_angles() {
        let limits = QualityLimits::from_options(&StaticOptions::default());
        // Apex of 5.7 degrees, halved to 2.9 degrees
        let tall = [DVec3::ZERO, DVec3::X, DVec3::new(0.5, 10.0, 0.0)];
        let half = [DVec3::ZERO, DVec3::new(0.5, 0.0, 0.0), DVec3::new(0.5, 10.0, 0.0)];
        assert!(limits.accepts(tall));
        assert!(!limits.accepts_replacement(tall, half));

        // Halving a flat obtuse triangle keeps its thin base angles
        let flat = [DVec3::ZERO, DVec3::X, DVec3::new(0.5, 0.005, 0.0)];
        let half = [DVec3::ZERO, DVec3::new(0.5, 0.0, 0.0), DVec3::new(0.5, 0.005, 0.0)];
        assert!(!limits.accepts(half));
        assert!(limits.accepts_replacement(flat, half));
    }

    #[test]
    fn test_sheet_quality() {
        let s = sheet(4, 0.25, 0.0, &GeneralOptions::default());
        let q = calculate_mesh_quality(&s);
        assert_eq!(q.triangle_count, 32);
        assert!((q.min_angle - 45.0).abs() < 1e-9);
        assert!((q.max_angle - 90.0).abs() < 1e-9);
        assert!((q.min_edge_length - 0.25).abs() < 1e-12);
        assert!((q.max_edge_length - 0.25 * 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_tetrahedron_quality() {
        let q = calculate_mesh_quality(&tetrahedron(&GeneralOptions::default()));
        assert_eq!(q.triangle_count, 4);
        assert!((q.min_triangle_area - 0.5).abs() < 1e-12);
        assert!((q.max_angle - 90.0).abs() < 1e-9);
    }
}
