//! Topology changes: surfaces that come close are zippered together, and
//! vertices or triangles left singular by that are cleaned up.
//!
//! - [`MeshMerger`] replaces two nearby edges and their four triangles with
//!   a tube of eight triangles joining the two sheets
//! - [`MeshPincher`] splits vertices whose triangles form several fans and
//!   deletes flaps (two triangles over the same three vertices)
//!
//! Both obey collision safety: a merge whose tube would cut through the mesh
//! is rejected, and a pinched vertex copy only moves if the motion is free.

mod merge;
mod pinch;

pub use merge::{MergeResult, MeshMerger};
pub use pinch::MeshPincher;
