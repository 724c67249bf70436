use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::gmm_file::GmmFileError;
use crate::core::model::ModelBuildError;

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required parameter is missing or invalid, or the atoms cannot be typed.
    Configuration,
    /// The experimental mixture is missing or malformed.
    Data,
    /// The caller violated a per-step contract.
    Usage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Model GMM construction failed: {0}")]
    Model(#[from] ModelBuildError),

    #[error("Data GMM error: {0}")]
    Data(#[from] GmmFileError),

    #[error("Covariance sum involving data component {data} is singular")]
    SingularCovariance { data: usize },

    #[error("Expected {expected} atom positions, got {actual}")]
    PositionCount { expected: usize, actual: usize },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) | EngineError::Model(_) => ErrorKind::Configuration,
            EngineError::Data(_) | EngineError::SingularCovariance { .. } => ErrorKind::Data,
            EngineError::PositionCount { .. } => ErrorKind::Usage,
        }
    }
}
