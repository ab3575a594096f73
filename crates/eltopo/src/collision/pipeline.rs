use eltopo_config::IntegrationOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::impulse::ImpulseParams;
use crate::error::TrackError;
use crate::impact_zone::{ImpactZoneSolver, ZoneOutcome};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;

/// Fraction of the proximity deficit a repulsion impulse restores per step.
const REPULSION_FRACTION: f64 = 0.1;

/// How an integration step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Collisions were resolved by impulses alone
    Impulses,
    /// Impact zones were needed
    ImpactZones,
    /// Some vertices were frozen in place to stay collision free
    PartiallyFrozen,
    /// Every vertex was frozen after exhausting step cuts
    Frozen,
    /// Collision handling disabled; predicted positions taken as is
    Unchecked,
}

impl DynamicSurface {
    /// Advance `positions` toward `new_positions` without letting any
    /// primitives pass through each other.
    ///
    /// Returns the step length actually taken and how collisions were
    /// resolved. Solid vertices follow their prescribed motion.
    pub fn integrate(
        &mut self,
        options: &IntegrationOptions,
        stats: &mut RunStats,
    ) -> Result<(f64, StepOutcome), TrackError> {
        options.validate()?;
        let targets = self.new_positions.clone();
        let mut fraction = 1.0;

        for cut in 0..=options.max_dt_cuts {
            for (i, target) in targets.iter().enumerate() {
                self.new_positions[i] = self.positions[i] + (*target - self.positions[i]) * fraction;
            }
            let step_length = options.dt * fraction;

            if !self.collision_safety {
                self.finish_step()?;
                return Ok((step_length, StepOutcome::Unchecked));
            }

            self.rebuild_broad_phase()?;
            let params = ImpulseParams {
                friction: options.friction_coefficient,
                step_length,
                warning_threshold: options.impulse_warning_threshold,
            };
            if options.proximity_repulsion {
                self.apply_repulsion(params, stats);
            }

            if self.resolve_with_impulses(options.max_collision_iterations, params, stats)? {
                self.finish_step()?;
                return Ok((step_length, StepOutcome::Impulses));
            }

            let solver = ImpactZoneSolver::new(options.max_zone_iterations);
            match solver.solve(self, stats)? {
                ZoneOutcome::Converged { iterations } => {
                    debug!(iterations, "Impact zones converged");
                    self.finish_step()?;
                    return Ok((step_length, StepOutcome::ImpactZones));
                }
                ZoneOutcome::Frozen { vertices } => {
                    if self.detect_collisions(stats).is_empty() {
                        warn!(frozen = vertices.len(), "Step completed with frozen vertices");
                        self.finish_step()?;
                        return Ok((step_length, StepOutcome::PartiallyFrozen));
                    }
                }
            }

            if cut < options.max_dt_cuts {
                fraction *= 0.5;
                stats.dt_cuts += 1;
                info!(fraction, "Cutting time step");
            }
        }

        warn!("Collision handling failed at every step cut; freezing all vertices");
        stats.vertices_frozen += self.mesh.live_vertex_count() as u64;
        self.reset_new_positions();
        self.rebuild_broad_phase()?;
        Ok((0.0, StepOutcome::Frozen))
    }

    fn finish_step(&mut self) -> Result<(), TrackError> {
        self.commit_new_positions();
        self.rebuild_broad_phase()
    }

    fn apply_repulsion(&mut self, params: ImpulseParams, stats: &mut RunStats) {
        for contact in self.detect_proximities() {
            let target = REPULSION_FRACTION * (self.proximity_epsilon - contact.proximity.distance);
            if self.apply_contact_impulse(
                contact.vertices,
                contact.proximity.weights,
                contact.proximity.normal,
                target,
                params,
            ) {
                stats.repulsion_impulses += 1;
            }
        }
    }

    /// Sequential impulse sweeps; true once a sweep finds nothing.
    fn resolve_with_impulses(
        &mut self,
        max_iterations: usize,
        params: ImpulseParams,
        stats: &mut RunStats,
    ) -> Result<bool, TrackError> {
        for iteration in 0..max_iterations {
            let collisions = self.detect_collisions(stats);
            if collisions.is_empty() {
                return Ok(true);
            }
            debug!(iteration, count = collisions.len(), "Applying collision impulses");
            for c in &collisions {
                if self.apply_contact_impulse(c.vertices, c.impact.weights, c.impact.normal, 0.0, params)
                {
                    stats.impulses_applied += 1;
                }
            }
            self.rebuild_broad_phase()?;
        }
        Ok(self.detect_collisions(stats).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use eltopo_config::GeneralOptions;
    use glam::DVec3;
    use topology::VertexId;

    use super::*;
    use crate::surface::fixtures::sheet_arrays;

    fn sheet_over_floor(solid_floor: bool) -> DynamicSurface {
        let (mut positions, mut triangles) = sheet_arrays(2, 0.5, 0.0, 0);
        let (upper, upper_tris) = sheet_arrays(2, 0.3, 0.1, positions.len());
        positions.extend(upper.iter().map(|p| *p + DVec3::new(0.1, 0.1, 0.0)));
        triangles.extend(upper_tris);
        let floor_mass = if solid_floor { f64::INFINITY } else { 1.0 };
        let mut masses = vec![floor_mass; 9];
        masses.extend([1.0; 9]);
        DynamicSurface::new(positions, &triangles, masses, &GeneralOptions::default()).unwrap()
    }

    fn drop_upper(s: &mut DynamicSurface, dz: f64) {
        let targets: Vec<DVec3> = s
            .positions()
            .iter()
            .enumerate()
            .map(|(i, p)| if i >= 9 { *p - DVec3::Z * dz } else { *p })
            .collect();
        s.set_new_positions(&targets).unwrap();
    }

    #[test]
    fn test_free_motion_is_taken_whole() {
        let mut s = sheet_over_floor(true);
        drop_upper(&mut s, 0.05);
        let mut stats = RunStats::default();
        let (dt, outcome) = s.integrate(&IntegrationOptions::default(), &mut stats).unwrap();
        assert_eq!(dt, 1.0);
        assert_eq!(outcome, StepOutcome::Impulses);
        assert!((s.position(VertexId(13)).z - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_sheet_stops_on_solid_floor() {
        let mut s = sheet_over_floor(true);
        drop_upper(&mut s, 0.3);
        let mut stats = RunStats::default();
        s.integrate(&IntegrationOptions::default(), &mut stats).unwrap();
        assert!(stats.collisions_detected > 0);
        assert!(s.intersecting_triangle_pairs().is_empty());
        for v in 0..9 {
            assert_eq!(s.position(VertexId(v)).z, 0.0);
        }
        for v in 9..18 {
            assert!(s.position(VertexId(v)).z > 0.0);
        }
    }

    #[test]
    fn test_unchecked_when_safety_disabled() {
        let options = GeneralOptions {
            collision_safety: false,
            ..GeneralOptions::default()
        };
        let (positions, triangles) = sheet_arrays(1, 1.0, 0.0, 0);
        let mut s = DynamicSurface::new(positions, &triangles, vec![1.0; 4], &options).unwrap();
        let targets: Vec<DVec3> = s.positions().iter().map(|p| *p + DVec3::Z).collect();
        s.set_new_positions(&targets).unwrap();
        let (_, outcome) = s
            .integrate(&IntegrationOptions::default(), &mut RunStats::default())
            .unwrap();
        assert_eq!(outcome, StepOutcome::Unchecked);
        assert_eq!(s.position(VertexId(0)).z, 1.0);
    }
}
