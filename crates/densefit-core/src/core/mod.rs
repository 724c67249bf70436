//! # Core Module
//!
//! Stateless building blocks for scoring a molecular model against a density map
//! represented as a Gaussian Mixture Model (GMM).
//!
//! ## Overview
//!
//! - **Covariance math** ([`covariance`]) - Symmetric 3x3 matrices with analytic
//!   determinant, inverse and positive-definiteness checks
//! - **Gaussian components** ([`gaussian`]) - Weighted 3D Gaussians and weight normalization
//! - **Mixtures** ([`model`], [`data`]) - The per-atom model mixture and the experimental
//!   data mixture
//! - **Overlap integrals** ([`overlap`]) - Overlap of two Gaussians, with and without gradient
//! - **File I/O** ([`io`]) - The columnar GMM file format
//! - **Atom naming** ([`topology`]) - The provider seam used to classify atoms by element

pub mod covariance;
pub mod data;
pub mod gaussian;
pub mod io;
pub mod model;
pub mod overlap;
pub mod topology;
