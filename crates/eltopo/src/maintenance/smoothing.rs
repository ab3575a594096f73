//! Null-space smoothing.
//!
//! Each vertex collects the quadric `A = sum area_t * n_t n_tᵀ` of its
//! incident face normals. Directions with eigenvalues far below the largest
//! one are ones the surface is flat along:
//!
//! - two small eigenvalues: smooth region, move freely in the tangent plane
//! - one small eigenvalue: ridge, slide along the crease
//! - none: corner, stay put
//!
//! The displacement toward the area-weighted centroid of the one-ring is
//! projected onto that null space, so features are preserved while the
//! vertex distribution evens out.

use glam::DVec3;
use nalgebra::{Matrix3, Vector3};
use topology::VertexId;
use tracing::debug;

use eltopo_config::{IntegrationOptions, StaticOptions};

use crate::error::TrackError;
use crate::geometry::{triangle_area, triangle_centroid, triangle_unit_normal};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Eigenvalues below this fraction of the largest span the null space.
const NULL_SPACE_RATIO: f64 = 0.003;

const MIN_DISPLACEMENT: f64 = 1e-14;

#[derive(Debug, Clone, Copy)]
pub struct NullSpaceSmoother {
    step: f64,
}

impl NullSpaceSmoother {
    pub fn new(options: &StaticOptions) -> Self {
        Self {
            step: options.smoothing_step,
        }
    }

    /// Scaled null-space displacement for one vertex. Zero for solid,
    /// boundary and isolated vertices.
    pub fn displacement(&self, surface: &DynamicSurface, v: VertexId) -> DVec3 {
        let mesh = surface.mesh();
        if surface.is_solid(v) || mesh.is_vertex_boundary(v) {
            return DVec3::ZERO;
        }

        let mut quadric = Matrix3::<f64>::zeros();
        let mut weighted_centroid = DVec3::ZERO;
        let mut total_area = 0.0;
        for &t in mesh.vertex_triangles(v) {
            let Some([a, b, c]) = surface.triangle_positions(t) else {
                continue;
            };
            let area = triangle_area(a, b, c);
            let n = triangle_unit_normal(a, b, c);
            let n = Vector3::new(n.x, n.y, n.z);
            quadric += area * n * n.transpose();
            weighted_centroid += area * triangle_centroid(a, b, c);
            total_area += area;
        }
        if total_area <= 0.0 {
            return DVec3::ZERO;
        }

        let toward = weighted_centroid / total_area - surface.position(v);
        let eigen = quadric.symmetric_eigen();
        let largest = eigen.eigenvalues.iter().copied().fold(0.0, f64::max);
        if largest <= 0.0 {
            return DVec3::ZERO;
        }

        let mut projected = DVec3::ZERO;
        for (i, &lambda) in eigen.eigenvalues.iter().enumerate() {
            if lambda < NULL_SPACE_RATIO * largest {
                let col = eigen.eigenvectors.column(i);
                let e = DVec3::new(col[0], col[1], col[2]);
                projected += e * e.dot(toward);
            }
        }
        self.step * projected
    }

    /// Smooth every vertex at once, applied as one collision-safe
    /// integration step. Returns whether anything moved.
    pub fn smooth_pass(
        &self,
        surface: &mut DynamicSurface,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        let mut targets = surface.positions().to_vec();
        let mut moved = 0u64;
        let live: Vec<VertexId> = surface.mesh().live_vertices().collect();
        for v in live {
            let d = self.displacement(surface, v);
            if d.length() > MIN_DISPLACEMENT {
                targets[v.index()] += d;
                moved += 1;
            }
        }
        if moved == 0 {
            return Ok(false);
        }

        surface.set_new_positions(&targets)?;
        let options = IntegrationOptions {
            dt: 1.0,
            friction_coefficient: 0.0,
            proximity_repulsion: false,
            ..IntegrationOptions::default()
        };
        let (step, outcome) = surface.integrate(&options, stats)?;
        stats.vertices_smoothed += moved;
        debug!(moved, step, ?outcome, "Smoothing pass");
        Ok(step > 0.0)
    }
}
