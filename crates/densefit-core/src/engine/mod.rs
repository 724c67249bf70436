//! # Engine Module
//!
//! The stateful side of the restraint: everything that is precomputed once from the two
//! mixtures, and everything that changes from step to step.
//!
//! ## Overview
//!
//! A [`restraint::DensityRestraint`] is built once per worker. Construction discovers the
//! replica layout, seeds the sampler, types the atoms, loads and normalizes the data
//! mixture, and fills the [`precompute::OverlapTables`]. Each step then refreshes the
//! [`neighbor_list`] when due, evaluates overlaps and per-pair gradients
//! ([`overlaps`]), averages them over replicas ([`ensemble`]), updates the noise
//! estimate ([`monte_carlo`]) and assembles the score ([`energy`]).
//!
//! ## Parallelism
//!
//! Per-step work is split SPMD-style across a worker group through the blocking
//! collectives in [`comm`]. Replicas are a second, outer tier reached only through each
//! group's representative.

pub mod comm;
pub mod config;
pub mod energy;
pub mod ensemble;
pub mod error;
pub mod monte_carlo;
pub mod neighbor_list;
pub mod overlaps;
pub mod precompute;
pub mod progress;
pub mod restraint;
