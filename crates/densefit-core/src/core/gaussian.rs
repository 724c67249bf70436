use super::covariance::SymMat3;
use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Weight must not be negative (found {0})")]
    NegativeWeight(f64),
    #[error("Covariance matrix is not positive definite (leading minors: {minors:?})")]
    NotPositiveDefinite { minors: [f64; 3] },
}

/// A single weighted 3D Gaussian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianComponent {
    pub mean: Point3<f64>,
    pub weight: f64,
    pub covariance: SymMat3,
}

impl GaussianComponent {
    pub fn new(mean: Point3<f64>, weight: f64, covariance: SymMat3) -> Self {
        Self {
            mean,
            weight,
            covariance,
        }
    }

    /// Checks the weight sign and positive-definiteness of the covariance.
    pub fn validate(&self) -> Result<(), ComponentError> {
        if !self.covariance.is_positive_definite() {
            return Err(ComponentError::NotPositiveDefinite {
                minors: self.covariance.leading_minors(),
            });
        }
        if self.weight < 0.0 {
            return Err(ComponentError::NegativeWeight(self.weight));
        }
        Ok(())
    }
}

/// Rescales `weights` in place so that they sum to one and returns the original sum.
///
/// Every component of a mixture is individually normalized, so dividing by the total
/// weight is enough to normalize the whole mixture. A non-positive total leaves the
/// weights untouched.
pub fn normalize_weights(weights: &mut [f64]) -> f64 {
    let norm: f64 = weights.iter().sum();
    if norm > 0.0 {
        weights.iter_mut().for_each(|w| *w /= norm);
    }
    norm
}
