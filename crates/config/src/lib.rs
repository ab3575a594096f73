//! Shared configuration for the El Topo surface tracker
//!
//! This crate is the single source of truth for every tunable threshold the
//! tracker consumes. Options are grouped the way callers hand them over:
//!
//! - [`GeneralOptions`] - verbosity, collision safety, proximity epsilon and
//!   the continuous collision strategy
//! - [`StaticOptions`] - thresholds for mesh improvement and topology change
//! - [`IntegrationOptions`] - friction and time step for one collision-safe step
//!
//! All structs accept partial JSON documents; missing fields take their
//! documented defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default proximity epsilon in world units
pub const DEFAULT_PROXIMITY_EPSILON: f64 = 1e-4;

/// Default enclosed-volume change allowed per local edit
pub const DEFAULT_MAX_VOLUME_CHANGE: f64 = 1e-4;

/// Errors produced while loading or validating options
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid option `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which continuous collision solver answers moving-primitive queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CcdStrategy {
    /// Cubic coplanarity solve in floating point with a forward error bound.
    /// Configurations that stay coplanar within the bound report no collision.
    #[default]
    FloatingPoint,
    /// Exact-sign expansion arithmetic with simulation-of-simplicity
    /// tie-breaking on vertex indices. Always gives a definite answer.
    Exact,
}

/// Scheme used to place vertices created by edge splits and collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubdivisionKind {
    /// Plain edge midpoint
    #[default]
    Midpoint,
    /// Modified butterfly stencil over the two incident triangles and their neighbors
    Butterfly,
    /// Point minimizing the sum of squared distances to the incident triangle planes
    QuadraticErrorMin,
}

/// Criterion an edge flip must strictly improve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlipCriterion {
    /// The new diagonal must be shorter than the old one by the improvement threshold
    #[default]
    Length,
    /// The opposite angles must violate the Delaunay condition by the angle threshold
    Delaunay,
}

/// Options shared by static operations and integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralOptions {
    /// Emit per-pass summaries at info level
    pub verbose: bool,
    /// Reject every edit or motion that would introduce a collision
    pub collision_safety: bool,
    /// Minimum separation between non-adjacent primitives
    pub proximity_epsilon: f64,
    /// Continuous collision solver
    pub ccd_strategy: CcdStrategy,
    /// Whether an edge may carry more than two triangles
    pub allow_non_manifold: bool,
}

impl Default for GeneralOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            collision_safety: true,
            proximity_epsilon: DEFAULT_PROXIMITY_EPSILON,
            ccd_strategy: CcdStrategy::default(),
            allow_non_manifold: false,
        }
    }
}

/// Thresholds for mesh improvement (collapse, split, flip, smooth) and
/// topology change (merge, pinch).
///
/// Values are configurable and should not be treated as magic numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticOptions {
    /// Collapse edges shorter than this (default: 0.05)
    pub min_edge_length: f64,
    /// Split edges longer than this (default: 0.2)
    pub max_edge_length: f64,
    /// Largest signed volume change a single local edit may introduce (default: 1e-4)
    pub max_volume_change: f64,
    /// Collapse an edge of any triangle with an angle below this, in degrees (default: 3)
    pub min_triangle_angle: f64,
    /// Split the longest edge of any triangle with an angle above this, in degrees (default: 177)
    pub max_triangle_angle: f64,
    /// Reject edits producing triangles with less area than this (default: 1e-10)
    pub min_triangle_area: f64,
    /// Scale edge length bounds by local mean curvature
    pub use_curvature_when_splitting: bool,
    /// Scale edge length bounds by local mean curvature
    pub use_curvature_when_collapsing: bool,
    /// Lower bound of the curvature multiplier (default: 0.5)
    pub min_curvature_multiplier: f64,
    /// Upper bound of the curvature multiplier (default: 2.0)
    pub max_curvature_multiplier: f64,
    /// Curvature radius, as a multiple of the edge length bounds, treated as flat (default: 1.0)
    pub curvature_scale: f64,
    /// Vertex placement for splits and collapses
    pub subdivision_scheme: SubdivisionKind,
    /// Flip improvement measure
    pub flip_criterion: FlipCriterion,
    /// Minimum improvement, in length units or radians, before a flip commits (default: 1e-3)
    pub min_edge_length_improvement: f64,
    /// Largest dihedral angle, in degrees, across an edge that may still be flipped (default: 10)
    pub max_flip_dihedral: f64,
    /// Null-space smoothing step as a fraction of the full displacement (default: 0.1)
    pub smoothing_step: f64,
    /// Run null-space smoothing during improvement
    pub perform_smoothing: bool,
    /// Run merge and pinch passes
    pub allow_topology_changes: bool,
    /// Edges closer than this are zippered together (default: 0.02)
    pub merge_proximity_epsilon: f64,
    /// Fraction of the distance toward its fan a pinched vertex copy is moved (default: 0.05)
    pub pinch_pull_fraction: f64,
    /// Maximum improvement sweeps per static pass (default: 3)
    pub max_improvement_sweeps: usize,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            min_edge_length: 0.05,
            max_edge_length: 0.2,
            max_volume_change: DEFAULT_MAX_VOLUME_CHANGE,
            min_triangle_angle: 3.0,
            max_triangle_angle: 177.0,
            min_triangle_area: 1e-10,
            use_curvature_when_splitting: false,
            use_curvature_when_collapsing: false,
            min_curvature_multiplier: 0.5,
            max_curvature_multiplier: 2.0,
            curvature_scale: 1.0,
            subdivision_scheme: SubdivisionKind::default(),
            flip_criterion: FlipCriterion::default(),
            min_edge_length_improvement: 1e-3,
            max_flip_dihedral: 10.0,
            smoothing_step: 0.1,
            perform_smoothing: true,
            allow_topology_changes: false,
            merge_proximity_epsilon: 0.02,
            pinch_pull_fraction: 0.05,
            max_improvement_sweeps: 3,
        }
    }
}

impl StaticOptions {
    /// Parse options from a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject inconsistent thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_edge_length >= 0.0) {
            return Err(invalid("min_edge_length", "must be non-negative"));
        }
        if self.min_edge_length >= self.max_edge_length {
            return Err(invalid(
                "max_edge_length",
                format!(
                    "{} must exceed min_edge_length {}",
                    self.max_edge_length, self.min_edge_length
                ),
            ));
        }
        if self.min_triangle_angle >= self.max_triangle_angle {
            return Err(invalid(
                "max_triangle_angle",
                format!(
                    "{} must exceed min_triangle_angle {}",
                    self.max_triangle_angle, self.min_triangle_angle
                ),
            ));
        }
        if !(self.max_volume_change >= 0.0) {
            return Err(invalid("max_volume_change", "must be non-negative"));
        }
        if !(self.merge_proximity_epsilon >= 0.0) {
            return Err(invalid("merge_proximity_epsilon", "must be non-negative"));
        }
        if self.min_curvature_multiplier > self.max_curvature_multiplier {
            return Err(invalid(
                "min_curvature_multiplier",
                "must not exceed max_curvature_multiplier",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing_step) {
            return Err(invalid("smoothing_step", "must lie in [0, 1]"));
        }
        if !(0.0..0.5).contains(&self.pinch_pull_fraction) {
            return Err(invalid("pinch_pull_fraction", "must lie in [0, 0.5)"));
        }
        Ok(())
    }
}

impl GeneralOptions {
    /// Parse options from a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.proximity_epsilon >= 0.0) {
            return Err(invalid("proximity_epsilon", "must be non-negative"));
        }
        Ok(())
    }
}

/// Options for one collision-safe integration step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationOptions {
    /// Coulomb friction coefficient applied to collision and repulsion impulses (default: 0.0)
    pub friction_coefficient: f64,
    /// Requested step length; predicted positions are the positions after this long
    pub dt: f64,
    /// Sequential impulse sweeps before escalating to impact zones (default: 5)
    pub max_collision_iterations: usize,
    /// Impact-zone iterations before the implicated vertices are frozen (default: 20)
    pub max_zone_iterations: usize,
    /// Times the step may be halved before every vertex is frozen (default: 6)
    pub max_dt_cuts: usize,
    /// Apply repulsion impulses to pairs already closer than the proximity epsilon
    pub proximity_repulsion: bool,
    /// Impulses above this magnitude are logged as suspicious (default: 100.0)
    pub impulse_warning_threshold: f64,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            friction_coefficient: 0.0,
            dt: 1.0,
            max_collision_iterations: 5,
            max_zone_iterations: 20,
            max_dt_cuts: 6,
            proximity_repulsion: true,
            impulse_warning_threshold: 100.0,
        }
    }
}

impl IntegrationOptions {
    /// Parse options from a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(invalid("dt", format!("{} must be positive and finite", self.dt)));
        }
        if !(self.friction_coefficient >= 0.0) {
            return Err(invalid("friction_coefficient", "must be non-negative"));
        }
        if self.max_collision_iterations == 0 {
            return Err(invalid("max_collision_iterations", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}
