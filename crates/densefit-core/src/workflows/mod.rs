//! # Workflows Module
//!
//! High-level entry points that drive a [`DensityRestraint`](crate::engine::restraint::DensityRestraint)
//! through complete procedures.
//!
//! - **Rescoring** ([`rescore`]) - Evaluates the restraint over a sequence of frames and
//!   collects the sigma, acceptance and score channels of each.

pub mod rescore;
