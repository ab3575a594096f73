//! Triangle mesh connectivity for the El Topo surface tracker
//!
//! This crate owns the *topology* of a tracked surface and nothing else:
//! - [`NonDestructiveTriMesh`] - vertices, edges, triangles and every
//!   incidence map between them
//! - [`VertexId`], [`EdgeId`], [`TriangleId`] - type-safe indices
//! - [`CompactionMap`] - old-to-new index tables emitted by defragmentation
//!
//! Removal is non-destructive: elements are tombstoned in place and keep
//! their index until [`NonDestructiveTriMesh::defragment`] compacts storage.
//! Geometry (positions, masses) lives with the caller.

pub mod trimesh;

pub use trimesh::{
    CompactionMap, ConnectivitySnapshot, EdgeId, MeshError, NonDestructiveTriMesh, TriangleId,
    VertexId,
};
