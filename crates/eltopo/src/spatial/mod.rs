//! Broad-phase culling: bounding boxes and uniform grids.

mod aabb;
mod broad_phase;
mod grid;

pub use aabb::Aabb;
pub use broad_phase::{BroadPhaseGrid, ElementKind};
pub use grid::{AccelerationGrid, GridError};
