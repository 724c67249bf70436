//! # densefit Core Library
//!
//! Bayesian scoring of molecular models against cryo-EM density maps represented as
//! Gaussian Mixture Models, with on-the-fly Metropolis estimation of the data noise.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless math and data: symmetric covariances,
//!   Gaussian components, the model and data mixtures, the Gaussian overlap integral,
//!   and the GMM file format.
//!
//! - **[`engine`]: The Logic Core.** Precomputed overlap tables, the neighbor list, the
//!   overlap and gradient evaluation, the energy, the sigma sampler, ensemble averaging
//!   and the collectives that tie parallel workers and replicas together.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the engine, such as
//!   rescoring a trajectory.

pub mod core;
pub mod engine;
pub mod workflows;
