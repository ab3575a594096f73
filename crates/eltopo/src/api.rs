//! Plain-data entry points.
//!
//! Each call builds a fresh session from flat arrays, runs one operation and
//! hands flat arrays back, so callers never hold tracker state between calls.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use eltopo_config::{GeneralOptions, IntegrationOptions, StaticOptions};

use crate::collision::StepOutcome;
use crate::error::TrackError;
use crate::history::DefragInfo;
use crate::stats::RunStats;
use crate::surface::DynamicSurface;
use crate::surftrack::SurfTrack;

/// Mesh handed to the tracker. A mass of `f64::INFINITY` marks a solid
/// vertex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMesh {
    pub positions: Vec<DVec3>,
    pub triangles: Vec<[usize; 3]>,
    pub masses: Vec<f64>,
}

/// Compacted mesh returned by [`static_operations`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMesh {
    pub positions: Vec<DVec3>,
    pub triangles: Vec<[usize; 3]>,
    pub masses: Vec<f64>,
}

impl OutputMesh {
    /// Snapshot of a defragmented surface.
    pub fn from_surface(surface: &DynamicSurface) -> Self {
        let triangles = surface
            .mesh()
            .live_triangles()
            .map(|(_, [a, b, c])| [a.index(), b.index(), c.index()])
            .collect();
        Self {
            positions: surface.positions().to_vec(),
            triangles,
            masses: surface.masses().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    /// Final, collision-free positions
    pub positions: Vec<DVec3>,
    /// Portion of `dt` actually covered; zero when every vertex froze
    pub actual_dt: f64,
    pub outcome: StepOutcome,
    pub stats: RunStats,
}

/// Improve the mesh, apply topology changes and compact it, once.
pub fn static_operations(
    input: &InputMesh,
    general: &GeneralOptions,
    options: &StaticOptions,
) -> Result<(OutputMesh, DefragInfo), TrackError> {
    let mut track = SurfTrack::new(
        input.positions.clone(),
        &input.triangles,
        input.masses.clone(),
        general,
        options,
    )?;
    let info = track.static_operations_pass()?;
    let output = OutputMesh::from_surface(track.surface());
    debug!(
        vertices = output.positions.len(),
        triangles = output.triangles.len(),
        events = info.events.len(),
        "Static operations finished"
    );
    Ok((output, info))
}

/// Move `input` toward `predicted` over one step without intersections.
pub fn integrate(
    input: &InputMesh,
    predicted: &[DVec3],
    general: &GeneralOptions,
    options: &IntegrationOptions,
) -> Result<IntegrationResult, TrackError> {
    let mut track = SurfTrack::new(
        input.positions.clone(),
        &input.triangles,
        input.masses.clone(),
        general,
        &StaticOptions::default(),
    )?;
    let (actual_dt, outcome) = track.integrate(predicted, options)?;
    Ok(IntegrationResult {
        positions: track.surface().positions().to_vec(),
        actual_dt,
        outcome,
        stats: track.stats().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MeshEvent;

    fn square() -> InputMesh {
        InputMesh {
            positions: vec![
                DVec3::ZERO,
                DVec3::X,
                DVec3::new(1.0, 1.0, 0.0),
                DVec3::Y,
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            masses: vec![1.0; 4],
        }
    }

    #[test]
    fn test_static_operations_returns_compact_mesh() {
        let options = StaticOptions {
            min_edge_length: 0.1,
            max_edge_length: 0.8,
            ..StaticOptions::default()
        };
        let (output, info) = static_operations(&square(), &GeneralOptions::default(), &options).unwrap();

        assert!(output.triangles.len() > 2);
        assert_eq!(output.positions.len(), output.masses.len());
        assert!(output.triangles.iter().flatten().all(|&v| v < output.positions.len()));
        let count = |f: fn(&MeshEvent) -> bool| info.events.iter().filter(|e| f(e)).count();
        let added = count(|e| matches!(e, MeshEvent::VertexAdded { .. }));
        let removed = count(|e| matches!(e, MeshEvent::VertexRemoved { .. }));
        assert_eq!(output.positions.len() + removed, 4 + added);
    }

    #[test]
    fn test_mismatched_masses_rejected() {
        let mut input = square();
        input.masses.pop();
        let err = static_operations(&input, &GeneralOptions::default(), &StaticOptions::default());
        assert!(matches!(err, Err(TrackError::LengthMismatch { .. })));
    }

    #[test]
    fn test_free_motion_reaches_prediction() {
        let input = square();
        let predicted: Vec<DVec3> = input.positions.iter().map(|p| *p + DVec3::Z * 0.1).collect();
        let result = integrate(&input, &predicted, &GeneralOptions::default(), &IntegrationOptions::default())
            .unwrap();

        assert_eq!(result.actual_dt, IntegrationOptions::default().dt);
        for (p, q) in result.positions.iter().zip(&predicted) {
            assert!(p.distance(*q) < 1e-12);
        }
    }

    #[test]
    fn test_predicted_length_checked() {
        let input = square();
        let err = integrate(&input, &[DVec3::ZERO], &GeneralOptions::default(), &IntegrationOptions::default());
        assert!(matches!(err, Err(TrackError::LengthMismatch { .. })));
    }
}
