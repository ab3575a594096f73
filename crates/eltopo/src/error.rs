use eltopo_config::ConfigError;
use topology::MeshError;

use crate::spatial::GridError;

/// Errors surfaced by surface tracking operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Expected {expected} {what}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Vertex {0} has a non-finite position")]
    NonFinitePosition(usize),

    #[error("Vertex {vertex} has invalid mass {mass}")]
    InvalidMass { vertex: usize, mass: f64 },

    #[error("Triangle {triangle} references vertex {vertex} out of {vertex_count}")]
    VertexOutOfRange {
        triangle: usize,
        vertex: usize,
        vertex_count: usize,
    },

    #[error("Time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}
