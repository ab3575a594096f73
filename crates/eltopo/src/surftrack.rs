//! Tracking session orchestration.
//!
//! A [`SurfTrack`] owns the surface, the operators built from the static
//! options, and the run counters. A typical frame:
//!
//! 1. Caller advects vertices and hands over predicted positions
//! 2. [`SurfTrack::integrate`] moves the surface there without collisions
//! 3. [`SurfTrack::static_operations_pass`] improves the mesh, applies
//!    topology changes and compacts storage
//! 4. Caller replays the returned [`DefragInfo`] onto its own per-vertex and
//!    per-triangle arrays

use glam::DVec3;
use tracing::{debug, error, info};

use eltopo_config::{GeneralOptions, IntegrationOptions, StaticOptions};

use crate::collision::StepOutcome;
use crate::error::TrackError;
use crate::history::DefragInfo;
use crate::maintenance::{
    EdgeCollapser, EdgeFlipper, EdgeSplitter, MeshQuality, NullSpaceSmoother, calculate_mesh_quality,
};
use crate::stats::RunStats;
use crate::surface::DynamicSurface;
use crate::topology_change::{MeshMerger, MeshPincher};

/// A surface tracking session.
#[derive(Debug)]
pub struct SurfTrack {
    surface: DynamicSurface,
    options: StaticOptions,
    verbose: bool,
    splitter: EdgeSplitter,
    collapser: EdgeCollapser,
    flipper: EdgeFlipper,
    smoother: NullSpaceSmoother,
    merger: MeshMerger,
    pincher: MeshPincher,
    stats: RunStats,
}

impl SurfTrack {
    pub fn new(
        positions: Vec<DVec3>,
        triangles: &[[usize; 3]],
        masses: Vec<f64>,
        general: &GeneralOptions,
        options: &StaticOptions,
    ) -> Result<Self, TrackError> {
        options.validate()?;
        let surface = DynamicSurface::new(positions, triangles, masses, general)?;
        Ok(Self::from_surface(surface, general, options))
    }

    /// Wrap an existing surface. Options are assumed valid.
    pub fn from_surface(surface: DynamicSurface, general: &GeneralOptions, options: &StaticOptions) -> Self {
        Self {
            surface,
            options: options.clone(),
            verbose: general.verbose,
            splitter: EdgeSplitter::new(options),
            collapser: EdgeCollapser::new(options),
            flipper: EdgeFlipper::new(options),
            smoother: NullSpaceSmoother::new(options),
            merger: MeshMerger::new(options),
            pincher: MeshPincher::new(options),
            stats: RunStats::default(),
        }
    }

    pub fn surface(&self) -> &DynamicSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut DynamicSurface {
        &mut self.surface
    }

    pub fn into_surface(self) -> DynamicSurface {
        self.surface
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn options(&self) -> &StaticOptions {
        &self.options
    }

    pub fn quality(&self) -> MeshQuality {
        calculate_mesh_quality(&self.surface)
    }

    /// Split, collapse, flip and smooth until a sweep changes nothing or
    /// the sweep limit is reached.
    pub fn improve_mesh(&mut self) -> Result<(), TrackError> {
        for sweep in 0..self.options.max_improvement_sweeps {
            let surface = &mut self.surface;
            let stats = &mut self.stats;
            let mut changed = self.splitter.split_pass(surface, stats)?;
            changed |= self.collapser.collapse_pass(surface, stats)?;
            changed |= self.flipper.flip_pass(surface, stats)?;
            if self.options.perform_smoothing {
                self.smoother.smooth_pass(surface, stats)?;
            }
            debug!(sweep, changed, "Improvement sweep");
            if !changed {
                break;
            }
        }
        Ok(())
    }

    /// Merge nearby sheets, then repair singular vertices and flaps. Does
    /// nothing unless topology changes are allowed.
    pub fn topology_changes(&mut self) -> Result<(), TrackError> {
        if !self.options.allow_topology_changes {
            return Ok(());
        }
        self.merger.merge_pass(&mut self.surface, &mut self.stats)?;
        self.pincher.remove_flaps(&mut self.surface, &mut self.stats)?;
        self.pincher
            .separate_singular_vertices(&mut self.surface, &mut self.stats)?;
        Ok(())
    }

    /// Compact storage and hand back every edit since the last compaction.
    pub fn defrag_mesh(&mut self) -> Result<DefragInfo, TrackError> {
        let events = self.surface.history_mut().drain();
        let map = self.surface.defragment()?;
        Ok(DefragInfo::new(events, map))
    }

    /// One full round of static operations: improvement, topology changes,
    /// then compaction.
    pub fn static_operations_pass(&mut self) -> Result<DefragInfo, TrackError> {
        let before = self.stats.clone();
        self.improve_mesh()?;
        self.topology_changes()?;
        let info = self.defrag_mesh()?;

        if self.verbose {
            info!(
                split = self.stats.edges_split - before.edges_split,
                collapsed = self.stats.edges_collapsed - before.edges_collapsed,
                flipped = self.stats.edges_flipped - before.edges_flipped,
                merged = self.stats.edges_merged - before.edges_merged,
                pinched = self.stats.vertices_pinched - before.vertices_pinched,
                vertices = self.surface.mesh().live_vertex_count(),
                triangles = self.surface.mesh().live_triangle_count(),
                "Static operations complete"
            );
        }
        Ok(info)
    }

    /// Move toward `predicted` positions without collisions. Returns the step
    /// length actually taken and how it was achieved.
    pub fn integrate(
        &mut self,
        predicted: &[DVec3],
        options: &IntegrationOptions,
    ) -> Result<(f64, StepOutcome), TrackError> {
        if !(options.dt > 0.0 && options.dt.is_finite()) {
            return Err(TrackError::InvalidTimeStep(options.dt));
        }
        self.surface.set_new_positions(predicted)?;
        let (dt, outcome) = self.surface.integrate(options, &mut self.stats)?;
        if self.verbose {
            info!(dt, ?outcome, "Integration step complete");
        }
        Ok((dt, outcome))
    }

    /// Connectivity is valid and, under collision safety, no two triangles
    /// intersect.
    pub fn check_invariants(&self) -> Result<(), TrackError> {
        if let Err(err) = self.surface.mesh().validate() {
            error!(%err, "Connectivity check failed");
            return Err(err.into());
        }
        if self.surface.collision_safety() {
            let pairs = self.surface.intersecting_triangle_pairs();
            if let Some((a, b)) = pairs.first() {
                error!(count = pairs.len(), "Surface self-intersects");
                return Err(TrackError::InvariantViolation(format!(
                    "{} intersecting triangle pairs, first {:?} and {:?}",
                    pairs.len(),
                    a,
                    b
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MeshEvent;
    use crate::surface::fixtures::sheet_arrays;

    fn coarse_square(options: &StaticOptions) -> SurfTrack {
        let (positions, triangles) = sheet_arrays(1, 1.0, 0.0, 0);
        let n = positions.len();
        SurfTrack::new(positions, &triangles, vec![1.0; n], &GeneralOptions::default(), options).unwrap()
    }

    #[test]
    fn test_invalid_static_options_rejected() {
        let options = StaticOptions {
            min_edge_length: 1.0,
            max_edge_length: 0.5,
            ..StaticOptions::default()
        };
        let (positions, triangles) = sheet_arrays(1, 1.0, 0.0, 0);
        let err = SurfTrack::new(positions, &triangles, vec![1.0; 4], &GeneralOptions::default(), &options);
        assert!(matches!(err, Err(TrackError::Config(_))));
    }

    #[test]
    fn test_static_pass_refines_and_compacts() {
        let options = StaticOptions {
            min_edge_length: 0.1,
            max_edge_length: 0.4,
            ..StaticOptions::default()
        };
        let mut track = coarse_square(&options);
        let info = track.static_operations_pass().unwrap();

        assert!(track.stats().edges_split > 0);
        assert!(info.events.iter().any(|e| matches!(e, MeshEvent::VertexAdded { .. })));
        assert!(track.surface().history().is_empty());
        assert_eq!(info.vertex_map.len(), 4 + track.stats().edges_split as usize);
        track.check_invariants().unwrap();
        assert!(track.quality().max_edge_length < 1.0);
    }

    #[test]
    fn test_defrag_twice_is_identity() {
        let options = StaticOptions {
            min_edge_length: 0.1,
            max_edge_length: 0.4,
            ..StaticOptions::default()
        };
        let mut track = coarse_square(&options);
        track.static_operations_pass().unwrap();
        let second = track.defrag_mesh().unwrap();
        assert!(second.events.is_empty());
        assert!(second.vertex_map.iter().enumerate().all(|(i, m)| m.map(|v| v.index()) == Some(i)));
        assert!(second.triangle_map.iter().enumerate().all(|(i, m)| m.map(|t| t.index()) == Some(i)));
    }

    #[test]
    fn test_integrate_rejects_bad_dt() {
        let mut track = coarse_square(&StaticOptions::default());
        let predicted = track.surface().positions().to_vec();
        let options = IntegrationOptions {
            dt: 0.0,
            ..IntegrationOptions::default()
        };
        assert!(matches!(
            track.integrate(&predicted, &options),
            Err(TrackError::InvalidTimeStep(_))
        ));
    }

    #[test]
    fn test_topology_changes_disabled_by_default() {
        let mut track = coarse_square(&StaticOptions::default());
        track.topology_changes().unwrap();
        assert_eq!(track.stats().mesh_edits(), 0);
    }
}
