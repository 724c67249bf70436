/// Effective variance `σ_mean² + σ²` of a residual.
#[inline]
pub fn effective_variance(sigma_mean: f64, sigma: f64) -> f64 {
    sigma_mean * sigma_mean + sigma * sigma
}

/// Gaussian likelihood of the overlap residuals with a Jeffreys prior on the noise.
///
/// The reference values are the data-data self overlaps; the model-data overlaps
/// supplied at evaluation time are compared against them component by component.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFunction {
    kbt: f64,
    sigma_mean: f64,
    reference: Vec<f64>,
}

impl ScoreFunction {
    pub fn new(kbt: f64, sigma_mean: f64, reference: Vec<f64>) -> Self {
        Self {
            kbt,
            sigma_mean,
            reference,
        }
    }

    #[inline]
    pub fn kbt(&self) -> f64 {
        self.kbt
    }

    #[inline]
    pub fn sigma_mean(&self) -> f64 {
        self.sigma_mean
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    #[inline]
    pub fn effective_variance(&self, sigma: f64) -> f64 {
        effective_variance(self.sigma_mean, sigma)
    }

    pub fn residual_sum_of_squares(&self, overlaps: &[f64]) -> f64 {
        overlaps
            .iter()
            .zip(&self.reference)
            .map(|(ovmd, ovdd)| (ovmd - ovdd) * (ovmd - ovdd))
            .sum()
    }

    /// `kBT·(N/2 + 1/2)·ln(ss2)`: Gaussian normalization plus the Jeffreys prior.
    #[inline]
    pub fn prior(&self, ss2: f64) -> f64 {
        self.kbt * (self.reference.len() as f64 * 0.5 + 0.5) * ss2.ln()
    }

    /// Energy of a candidate `sigma`; `+∞` when the effective variance is not positive.
    pub fn energy(&self, overlaps: &[f64], sigma: f64) -> f64 {
        let ss2 = self.effective_variance(sigma);
        if ss2 <= 0.0 {
            return f64::INFINITY;
        }
        self.kbt * 0.5 / ss2 * self.residual_sum_of_squares(overlaps) + self.prior(ss2)
    }

    /// The reported score, using an inverse variance already summed over replicas.
    pub fn score(&self, overlaps: &[f64], inv_s2: f64, ss2: f64) -> f64 {
        self.kbt * 0.5 * inv_s2 * self.residual_sum_of_squares(overlaps) + self.prior(ss2)
    }

    /// Derivative of the score with respect to each data component's overlap.
    pub fn overlap_derivatives(&self, overlaps: &[f64], inv_s2: f64) -> Vec<f64> {
        let fact = self.kbt * 0.5 * inv_s2;
        overlaps
            .iter()
            .zip(&self.reference)
            .map(|(ovmd, ovdd)| fact * 2.0 * (ovmd - ovdd))
            .collect()
    }
}
