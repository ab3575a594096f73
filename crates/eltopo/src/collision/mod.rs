//! Collision detection and resolution for one integration step.
//!
//! The pipeline runs in escalating stages:
//!
//! 1. Repulsion impulses for pairs already closer than the proximity epsilon
//! 2. Sequential CCD impulses, a bounded number of sweeps
//! 3. Impact zones (see [`crate::impact_zone`])
//! 4. Halving the step, and finally freezing every vertex

mod detect;
mod impulse;
mod intersection;
mod pipeline;

use topology::VertexId;

use crate::ccd::{Impact, Proximity};

pub use pipeline::StepOutcome;

/// A contact found by continuous detection over the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    /// `[point, a, b, c]` or `[p0, p1, q0, q1]`, matching `impact.weights`
    pub vertices: [VertexId; 4],
    pub impact: Impact,
}

/// A pair closer than the proximity epsilon at the start of the step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityContact {
    pub vertices: [VertexId; 4],
    pub proximity: Proximity,
}
