use super::covariance::SymMat3;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

/// `1 / (2π)^{3/2}`, the normalization constant of a 3D Gaussian.
#[inline]
pub fn gaussian_norm() -> f64 {
    (2.0 * PI).powf(-1.5)
}

/// Constants needed to evaluate the overlap integral of two Gaussians.
///
/// The overlap of two normalized Gaussians is itself a Gaussian in the distance of
/// their means, with covariance equal to the sum of the two covariances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapKernel {
    pub prefactor: f64,
    pub inv_cov_sum: SymMat3,
}

impl OverlapKernel {
    /// Builds the unweighted kernel for a pair of covariances.
    ///
    /// Returns `None` if the covariance sum is singular.
    pub fn between(cov_a: &SymMat3, cov_b: &SymMat3) -> Option<Self> {
        let sum = *cov_a + *cov_b;
        let inv_cov_sum = sum.inverse()?;
        let det = sum.determinant();
        Some(Self {
            prefactor: gaussian_norm() / det.sqrt(),
            inv_cov_sum,
        })
    }

    /// Same kernel with its prefactor multiplied by `factor` (usually a weight product).
    #[inline]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            prefactor: self.prefactor * factor,
            inv_cov_sum: self.inv_cov_sum,
        }
    }
}

/// Mahalanobis-type exponent `Q = Δᵗ·InvCov·Δ` with `Δ = a − b`.
#[inline]
pub fn exponent(a: &Point3<f64>, b: &Point3<f64>, inv_cov_sum: &SymMat3) -> f64 {
    inv_cov_sum.quadratic_form(&(a - b))
}

#[inline]
pub fn overlap(a: &Point3<f64>, b: &Point3<f64>, prefactor: f64, inv_cov_sum: &SymMat3) -> f64 {
    prefactor * (-0.5 * exponent(a, b, inv_cov_sum)).exp()
}

/// Overlap together with its derivative with respect to the second mean `b`,
/// which equals `overlap · InvCov·(a − b)`.
#[inline]
pub fn overlap_with_gradient(
    a: &Point3<f64>,
    b: &Point3<f64>,
    prefactor: f64,
    inv_cov_sum: &SymMat3,
) -> (f64, Vector3<f64>) {
    let delta = a - b;
    let projected = inv_cov_sum.mul_vec(&delta);
    let ov = prefactor * (-0.5 * delta.dot(&projected)).exp();
    (ov, projected * ov)
}

/// Derivative-free overlap that skips the exponential when `Q` exceeds `exponent_cutoff`.
#[inline]
pub fn overlap_within(
    a: &Point3<f64>,
    b: &Point3<f64>,
    prefactor: f64,
    inv_cov_sum: &SymMat3,
    exponent_cutoff: f64,
) -> f64 {
    let q = exponent(a, b, inv_cov_sum);
    if q > exponent_cutoff {
        0.0
    } else {
        prefactor * (-0.5 * q).exp()
    }
}
