//! Collision-safe tracking of dynamic triangle-mesh surfaces.
//!
//! This crate moves and remeshes an explicit triangle surface while
//! guaranteeing that it never passes through itself:
//! - Continuous collision detection with exact-arithmetic tie-breaking
//! - Impulse, impact-zone and time-step-cutting collision resolution
//! - Edge split, collapse and flip plus null-space smoothing
//! - Merging of nearby sheets and repair of singular vertices
//! - An event log and index maps so callers can keep side data in sync
//!
//! # Architecture
//!
//! ## Key Components
//!
//! - **Predicates / Geometry**: orientation tests, distances, static
//!   intersection tests
//! - **Spatial**: uniform grids over vertices, edges and triangles
//! - **CCD**: first contact between moving primitives
//! - **Surface**: [`DynamicSurface`], mesh plus positions and masses
//! - **Collision / Impact zones**: one collision-free integration step
//! - **Maintenance / Topology change**: local edits, each checked for safety
//! - **SurfTrack**: session tying everything together
//! - **API**: flat-array entry points

pub mod api;
pub mod ccd;
pub mod collision;
pub mod error;
pub mod geometry;
pub mod history;
pub mod impact_zone;
pub mod maintenance;
pub mod predicates;
pub mod spatial;
pub mod stats;
pub mod surface;
pub mod surftrack;
pub mod topology_change;

pub use api::{InputMesh, IntegrationResult, OutputMesh, integrate, static_operations};
pub use collision::StepOutcome;
pub use error::TrackError;
pub use history::{DefragInfo, MeshEvent, MeshHistory, VertexOrigin};
pub use maintenance::{EditOutcome, MeshQuality, Rejection};
pub use stats::RunStats;
pub use surface::DynamicSurface;
pub use surftrack::SurfTrack;

pub use eltopo_config::{
    CcdStrategy, FlipCriterion, GeneralOptions, IntegrationOptions, StaticOptions, SubdivisionKind,
};
pub use topology::{EdgeId, NonDestructiveTriMesh, TriangleId, VertexId};
