use std::path::PathBuf;
use thiserror::Error;

/// Boltzmann constant in kJ/(mol·K).
pub const BOLTZMANN_KJ_PER_MOL_K: f64 = 0.0083144621;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// Thermal energy of the system, either as a temperature or directly as kBT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThermalEnergy {
    /// Temperature in Kelvin.
    Temperature(f64),
    /// kBT in kJ/mol.
    KbT(f64),
}

impl ThermalEnergy {
    pub fn kbt(&self) -> f64 {
        match *self {
            ThermalEnergy::Temperature(t) => BOLTZMANN_KJ_PER_MOL_K * t,
            ThermalEnergy::KbT(kbt) => kbt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborListConfig {
    /// Fraction of each data component's self overlap that may be discarded.
    pub cutoff: f64,
    /// Rebuild period in steps.
    pub stride: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigmaConfig {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Maximum Monte Carlo displacement.
    pub step: f64,
    /// Uncertainty of the ensemble mean before division by the replica count.
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    /// Trials per Monte Carlo cadence.
    pub steps: usize,
    /// Cadence in simulation steps.
    pub stride: u64,
    /// Fixed seed; the wall clock is used when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestraintConfig {
    pub atoms: Vec<usize>,
    pub gmm_file: PathBuf,
    pub thermal_energy: ThermalEnergy,
    pub neighbor_list: NeighborListConfig,
    pub sigma: SigmaConfig,
    pub monte_carlo: MonteCarloConfig,
    /// Evaluate every pair on every worker and skip intra-group reductions.
    pub serial: bool,
}

#[derive(Default)]
pub struct RestraintConfigBuilder {
    atoms: Option<Vec<usize>>,
    gmm_file: Option<PathBuf>,
    thermal_energy: Option<ThermalEnergy>,
    nl_cutoff: Option<f64>,
    nl_stride: Option<u64>,
    sigma0: Option<f64>,
    sigma_min: Option<f64>,
    sigma_max: Option<f64>,
    sigma_step: Option<f64>,
    sigma_mean: Option<f64>,
    mc_steps: Option<usize>,
    mc_stride: Option<u64>,
    seed: Option<u64>,
    serial: bool,
}

impl RestraintConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atoms(mut self, serials: Vec<usize>) -> Self {
        self.atoms = Some(serials);
        self
    }
    pub fn gmm_file(mut self, path: PathBuf) -> Self {
        self.gmm_file = Some(path);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.thermal_energy = Some(ThermalEnergy::Temperature(kelvin));
        self
    }
    pub fn kbt(mut self, kbt: f64) -> Self {
        self.thermal_energy = Some(ThermalEnergy::KbT(kbt));
        self
    }
    pub fn nl_cutoff(mut self, cutoff: f64) -> Self {
        self.nl_cutoff = Some(cutoff);
        self
    }
    pub fn nl_stride(mut self, stride: u64) -> Self {
        self.nl_stride = Some(stride);
        self
    }
    pub fn sigma0(mut self, sigma: f64) -> Self {
        self.sigma0 = Some(sigma);
        self
    }
    pub fn sigma_min(mut self, sigma: f64) -> Self {
        self.sigma_min = Some(sigma);
        self
    }
    pub fn sigma_max(mut self, sigma: f64) -> Self {
        self.sigma_max = Some(sigma);
        self
    }
    pub fn sigma_step(mut self, step: f64) -> Self {
        self.sigma_step = Some(step);
        self
    }
    pub fn sigma_mean(mut self, sigma: f64) -> Self {
        self.sigma_mean = Some(sigma);
        self
    }
    pub fn mc_steps(mut self, steps: usize) -> Self {
        self.mc_steps = Some(steps);
        self
    }
    pub fn mc_stride(mut self, stride: u64) -> Self {
        self.mc_stride = Some(stride);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn serial(mut self, serial: bool) -> Self {
        self.serial = serial;
        self
    }

    pub fn build(self) -> Result<RestraintConfig, ConfigError> {
        let atoms = self.atoms.ok_or(ConfigError::MissingParameter("atoms"))?;
        if atoms.is_empty() {
            return Err(invalid("atoms", "at least one atom is required"));
        }

        let thermal_energy = self
            .thermal_energy
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if !(thermal_energy.kbt() > 0.0) {
            return Err(invalid("temperature", "thermal energy must be positive"));
        }

        let neighbor_list = NeighborListConfig {
            cutoff: self
                .nl_cutoff
                .ok_or(ConfigError::MissingParameter("nl_cutoff"))?,
            stride: self
                .nl_stride
                .ok_or(ConfigError::MissingParameter("nl_stride"))?,
        };
        if !(neighbor_list.cutoff > 0.0 && neighbor_list.cutoff < 1.0) {
            return Err(invalid("nl_cutoff", "must lie strictly between 0 and 1"));
        }
        if neighbor_list.stride == 0 {
            return Err(invalid("nl_stride", "must be positive"));
        }

        let sigma = SigmaConfig {
            initial: self.sigma0.ok_or(ConfigError::MissingParameter("sigma0"))?,
            min: self
                .sigma_min
                .ok_or(ConfigError::MissingParameter("sigma_min"))?,
            max: self
                .sigma_max
                .ok_or(ConfigError::MissingParameter("sigma_max"))?,
            step: self
                .sigma_step
                .ok_or(ConfigError::MissingParameter("sigma_step"))?,
            mean: self
                .sigma_mean
                .ok_or(ConfigError::MissingParameter("sigma_mean"))?,
        };
        validate_sigma(&sigma)?;

        let monte_carlo = MonteCarloConfig {
            steps: self.mc_steps.unwrap_or(1),
            stride: self.mc_stride.unwrap_or(1),
            seed: self.seed,
        };
        if monte_carlo.steps == 0 {
            return Err(invalid("mc_steps", "must be positive"));
        }
        if monte_carlo.stride == 0 {
            return Err(invalid("mc_stride", "must be positive"));
        }

        Ok(RestraintConfig {
            atoms,
            gmm_file: self
                .gmm_file
                .ok_or(ConfigError::MissingParameter("gmm_file"))?,
            thermal_energy,
            neighbor_list,
            sigma,
            monte_carlo,
            serial: self.serial,
        })
    }
}

fn validate_sigma(sigma: &SigmaConfig) -> Result<(), ConfigError> {
    if sigma.min < 0.0 {
        return Err(invalid("sigma_min", "must not be negative"));
    }
    if sigma.min >= sigma.max {
        return Err(invalid("sigma_max", "must be greater than sigma_min"));
    }
    if sigma.initial < sigma.min || sigma.initial > sigma.max {
        return Err(invalid("sigma0", "must lie within [sigma_min, sigma_max]"));
    }
    if !(sigma.step > 0.0) {
        return Err(invalid("sigma_step", "must be positive"));
    }
    if sigma.mean < 0.0 {
        return Err(invalid("sigma_mean", "must not be negative"));
    }
    // The log-prior diverges as the effective variance reaches zero.
    if sigma.mean * sigma.mean + sigma.min * sigma.min <= 0.0 {
        return Err(invalid(
            "sigma_min",
            "sigma_min and sigma_mean cannot both be zero",
        ));
    }
    Ok(())
}
