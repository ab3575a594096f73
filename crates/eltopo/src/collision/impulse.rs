//! Impulses on predicted displacements.
//!
//! Impulses act on `new_position - position` directly; dividing by the step
//! length only matters for the size warning.

use glam::DVec3;
use topology::VertexId;
use tracing::warn;

use crate::surface::DynamicSurface;

/// Parameters shared by every impulse in one step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ImpulseParams {
    pub friction: f64,
    pub step_length: f64,
    pub warning_threshold: f64,
}

impl DynamicSurface {
    /// Push the weighted relative displacement along `normal` up to `target`.
    ///
    /// Inverse masses weight the split, so solid vertices never move. A
    /// Coulomb clamp removes tangential relative motion up to `friction`
    /// times the normal impulse. Returns whether an impulse was applied.
    pub(crate) fn apply_contact_impulse(
        &mut self,
        vertices: [VertexId; 4],
        weights: [f64; 4],
        normal: DVec3,
        target: f64,
        params: ImpulseParams,
    ) -> bool {
        let inverse_masses = vertices.map(|v| self.inverse_mass(v));
        let denom: f64 = weights
            .iter()
            .zip(inverse_masses)
            .map(|(w, m)| w * w * m)
            .sum();
        if denom <= 0.0 || normal == DVec3::ZERO {
            return false;
        }

        let relative = vertices
            .iter()
            .zip(weights)
            .fold(DVec3::ZERO, |acc, (&v, w)| {
                acc + (self.new_positions[v.index()] - self.positions[v.index()]) * w
            });
        let relative_normal = relative.dot(normal);
        if relative_normal >= target {
            return false;
        }

        let magnitude = (target - relative_normal) / denom;
        let tangential = relative - normal * relative_normal;
        let tangential_length = tangential.length();
        let friction_impulse = if tangential_length > 0.0 && params.friction > 0.0 {
            -(tangential / tangential_length)
                * (params.friction * magnitude).min(tangential_length / denom)
        } else {
            DVec3::ZERO
        };
        let impulse = normal * magnitude + friction_impulse;

        if magnitude / params.step_length > params.warning_threshold {
            warn!(
                ?vertices,
                magnitude,
                step_length = params.step_length,
                "Large collision impulse"
            );
        }

        for ((v, w), m) in vertices.iter().zip(weights).zip(inverse_masses) {
            self.new_positions[v.index()] += impulse * (w * m);
        }
        true
    }
}
