use crate::engine::config::{MonteCarloConfig, SigmaConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::trace;

/// Folds a proposal back into `[min, max]` by mirroring it across the violated bound.
///
/// Mirroring repeats until the value lands inside the interval, so a proposal
/// several widths outside still folds back. A single crossing reduces to `2 * max - x`
/// above the interval and `2 * min - x` below it.
#[inline]
pub fn reflect(proposal: f64, min: f64, max: f64) -> f64 {
    if (min..=max).contains(&proposal) || proposal.is_nan() {
        return proposal;
    }
    let width = max - min;
    if width <= 0.0 {
        return min;
    }
    if proposal.is_infinite() {
        return if proposal > max { max } else { min };
    }
    if proposal > max && proposal - max <= width {
        return 2.0 * max - proposal;
    }
    if proposal < min && min - proposal <= width {
        return 2.0 * min - proposal;
    }
    // Mirroring across both bounds has period `2 * width`.
    let offset = (proposal - min).rem_euclid(2.0 * width);
    let folded = if offset > width { 2.0 * width - offset } else { offset };
    (min + folded).clamp(min, max)
}

/// Metropolis acceptance for a reduced energy change `delta = ΔE/kBT`.
///
/// Downhill moves are accepted without consuming a random draw.
#[inline]
pub fn metropolis(delta: f64, rng: &mut impl Rng) -> bool {
    if delta <= 0.0 {
        return true;
    }
    rng.r#gen::<f64>() < (-delta).exp()
}

/// Metropolis sampler for the data noise `sigma`.
#[derive(Debug, Clone)]
pub struct SigmaSampler {
    sigma: f64,
    min: f64,
    max: f64,
    max_step: f64,
    kbt: f64,
    trials: usize,
    stride: u64,
    accepted: u64,
    first_step: Option<u64>,
    rng: ChaCha20Rng,
}

impl SigmaSampler {
    pub fn new(sigma: &SigmaConfig, monte_carlo: &MonteCarloConfig, kbt: f64, seed: u64) -> Self {
        Self {
            sigma: sigma.initial,
            min: sigma.min,
            max: sigma.max,
            max_step: sigma.step,
            kbt,
            trials: monte_carlo.steps,
            stride: monte_carlo.stride,
            accepted: 0,
            first_step: None,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn first_step(&self) -> Option<u64> {
        self.first_step
    }

    /// Sampling happens on stride multiples, never on a replica-exchange step.
    pub fn is_due(&self, step: u64, exchange: bool) -> bool {
        step % self.stride == 0 && !exchange
    }

    /// Runs one batch of trials against `energy` and returns how many were accepted.
    pub fn sweep(&mut self, energy: impl Fn(f64) -> f64) -> usize {
        let mut old_energy = energy(self.sigma);
        let mut accepted = 0;
        for _ in 0..self.trials {
            let proposal = self.sigma + self.rng.gen_range(-self.max_step..=self.max_step);
            let proposal = reflect(proposal, self.min, self.max);
            let new_energy = energy(proposal);
            let delta = (new_energy - old_energy) / self.kbt;
            if metropolis(delta, &mut self.rng) {
                old_energy = new_energy;
                self.sigma = proposal;
                accepted += 1;
            }
        }
        self.accepted += accepted as u64;
        trace!(
            sigma = self.sigma,
            accepted,
            trials = self.trials,
            "Monte Carlo sweep finished."
        );
        accepted
    }

    /// Running acceptance ratio over every sweep since the first evaluated step.
    ///
    /// The first call fixes the reference step, so a restarted run counts sweeps from
    /// where it resumed.
    pub fn acceptance(&mut self, step: u64) -> f64 {
        let first = *self.first_step.get_or_insert(step);
        let sweeps = (step.saturating_sub(first) / self.stride) as f64 + 1.0;
        self.accepted as f64 / self.trials as f64 / sweeps
    }
}
