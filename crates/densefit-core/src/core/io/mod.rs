//! Reading and writing of experimental Gaussian mixtures.
//!
//! Density maps are exchanged as fitted Gaussian mixtures in a columnar text format
//! whose `#! FIELDS` header names the columns of every record.

pub mod gmm_file;
