//! Robust geometric predicates.
//!
//! Expansion arithmetic gives exact signs for polynomial expressions in the
//! input coordinates; orientation tests filter in floating point first and
//! fall back to expansions only when the filter cannot certify the sign.
//! Exact zeros are broken by simulation of simplicity ([`orient3d_sos`]).

pub mod expansion;
mod orient;

pub use expansion::{Expansion, ExpansionVec3};
pub use orient::{
    orient3d, orient3d_exact, orient3d_sign, orient3d_sos, permutation_parity,
};
