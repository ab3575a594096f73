//! Curvature-adaptive edge length bounds.
//!
//! Mean curvature comes from the cotangent Laplacian over the one-ring:
//!
//! ```text
//!        o0
//!       /  \          K(v) = 1/(2A) * sum_j (cot a_j + cot b_j) (x_j - x_v)
//!      / a  \         |H(v)| = |K(v)| / 2
//!     v------j
//!      \ b  /         A = one third of the incident triangle area
//!       \  /
//!        o1
//! ```
//!
//! The radius of curvature `1/|H|`, measured in units of
//! `curvature_scale * max_edge_length`, becomes a multiplier on both edge
//! length bounds: flat regions may use longer edges, tight bends shorter ones.

use topology::VertexId;

use eltopo_config::StaticOptions;

use crate::surface::DynamicSurface;

const MIN_SINE: f64 = 1e-12;

/// Unsigned discrete mean curvature at a vertex. Zero at boundary and
/// non-manifold vertices.
pub fn mean_curvature(surface: &DynamicSurface, v: VertexId) -> f64 {
    let mesh = surface.mesh();
    let x = surface.position(v);
    let mut laplacian = glam::DVec3::ZERO;
    for &e in mesh.vertex_edges(v) {
        let triangles = mesh.edge_triangles(e);
        if triangles.len() != 2 {
            return 0.0;
        }
        let Some(j) = mesh.other_endpoint(e, v) else {
            continue;
        };
        let xj = surface.position(j);
        let mut weight = 0.0;
        for &t in triangles {
            let Some(o) = mesh.opposite_vertex(t, v, j) else {
                continue;
            };
            let xo = surface.position(o);
            let (u, w) = (x - xo, xj - xo);
            let sine = u.cross(w).length();
            if sine > MIN_SINE {
                weight += u.dot(w) / sine;
            }
        }
        laplacian += weight * (xj - x);
    }

    let area: f64 = mesh
        .vertex_triangles(v)
        .iter()
        .map(|&t| surface.triangle_area(t))
        .sum::<f64>()
        / 3.0;
    if area <= 0.0 {
        return 0.0;
    }
    laplacian.length() / (2.0 * area) / 2.0
}

/// Length-bound multiplier at a vertex, clamped to the configured range.
pub fn curvature_multiplier(surface: &DynamicSurface, v: VertexId, options: &StaticOptions) -> f64 {
    let h = mean_curvature(surface, v);
    if h <= f64::EPSILON {
        return options.max_curvature_multiplier;
    }
    let radius = 1.0 / h;
    (radius / (options.curvature_scale * options.max_edge_length))
        .clamp(options.min_curvature_multiplier, options.max_curvature_multiplier)
}

/// Multiplier for an edge: the more curved endpoint decides.
pub(crate) fn edge_multiplier(
    surface: &DynamicSurface,
    a: VertexId,
    b: VertexId,
    options: &StaticOptions,
) -> f64 {
    curvature_multiplier(surface, a, options).min(curvature_multiplier(surface, b, options))
}

#[cfg(test)]
mod tests {
    use eltopo_config::GeneralOptions;
    use glam::DVec3;

    use super::*;
    use crate::surface::fixtures::sheet;

    fn octahedron() -> DynamicSurface {
        let positions = vec![
            DVec3::X,
            DVec3::NEG_X,
            DVec3::Y,
            DVec3::NEG_Y,
            DVec3::Z,
            DVec3::NEG_Z,
        ];
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
    fn test_octahedron_has_unit_curvature() {
        let s = octahedron();
        for v in 0..6 {
            let h = mean_curvature(&s, VertexId(v));
            assert!((h - 1.0).abs() < 1e-9, "vertex {v}: {h}");
        }
    }

    #[test]
    fn test_flat_interior_vertex_has_zero_curvature() {
        let s = sheet(2, 0.5, 0.0, &GeneralOptions::default());
        // centre of the 3x3 grid
        assert!(mean_curvature(&s, VertexId(4)).abs() < 1e-12);
        // corners are boundary
        assert_eq!(mean_curvature(&s, VertexId(0)), 0.0);
    }

    #[test]
    fn test_multiplier_clamps() {
        let s = octahedron();
        let options = StaticOptions::default();
        // radius 1 over 0.2 is 5, clamped to the maximum
        assert_eq!(curvature_multiplier(&s, VertexId(0), &options), 2.0);

        let tight = StaticOptions {
            curvature_scale: 20.0,
            ..StaticOptions::default()
        };
        // radius 1 over 4 is 0.25, clamped to the minimum
        assert_eq!(curvature_multiplier(&s, VertexId(0), &tight), 0.5);

        let exact = StaticOptions {
            curvature_scale: 4.0,
            ..StaticOptions::default()
        };
        assert!((curvature_multiplier(&s, VertexId(0), &exact) - 1.25).abs() < 1e-9);
    }
}
