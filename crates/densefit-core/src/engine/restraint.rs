use crate::core::data::DataGmm;
use crate::core::io::gmm_file::GmmFile;
use crate::core::model::ModelGmm;
use crate::core::topology::AtomNameProvider;
use crate::engine::comm::{Communicator, ReductionScope};
use crate::engine::config::RestraintConfig;
use crate::engine::energy::ScoreFunction;
use crate::engine::ensemble::Ensemble;
use crate::engine::error::EngineError;
use crate::engine::monte_carlo::SigmaSampler;
use crate::engine::neighbor_list::NeighborList;
use crate::engine::overlaps::OverlapBuffers;
use crate::engine::precompute::OverlapTables;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument};

/// The three channels produced on every step.
#[derive(Debug, Clone, PartialEq)]
pub struct RestraintOutput {
    /// Current estimate of the data noise.
    pub sigma: f64,
    /// Running Monte Carlo acceptance ratio.
    pub accept: f64,
    pub score: f64,
    /// Derivative of `score` with respect to each atom position.
    pub gradient: Vec<Vector3<f64>>,
}

/// Bayesian density-map restraint over a fixed set of atoms.
///
/// Every worker of the inner group constructs its own instance and calls
/// [`calculate`](Self::calculate) with the same arguments on every step; the
/// collectives inside rely on that lockstep.
pub struct DensityRestraint {
    tables: OverlapTables,
    score_function: ScoreFunction,
    neighbors: NeighborList,
    buffers: OverlapBuffers,
    sampler: SigmaSampler,
    ensemble: Ensemble,
    work: Arc<dyn Communicator>,
}

impl DensityRestraint {
    /// Types the configured atoms through `names`, loads the data mixture from disk and
    /// precomputes everything that does not depend on positions.
    pub fn new(
        config: &RestraintConfig,
        names: Option<&dyn AtomNameProvider>,
        scope: ReductionScope,
    ) -> Result<Self, EngineError> {
        Self::with_progress(config, names, scope, &ProgressReporter::new())
    }

    /// Like [`new`](Self::new), reporting the loading and precomputation phases.
    #[instrument(skip_all, name = "density_restraint_setup")]
    pub fn with_progress(
        config: &RestraintConfig,
        names: Option<&dyn AtomNameProvider>,
        scope: ReductionScope,
        reporter: &ProgressReporter,
    ) -> Result<Self, EngineError> {
        let ensemble = Ensemble::discover(scope);
        let seed = ensemble.seed(config.monte_carlo.seed.unwrap_or_else(wall_clock_seed));

        reporter.report(Progress::PhaseStart {
            name: "Loading mixtures",
        });
        let model = ModelGmm::build(&config.atoms, names)?;
        let data = GmmFile::read_from_path(&config.gmm_file)?;
        reporter.report(Progress::PhaseFinish);

        Self::assemble(config, ensemble, seed, model, data, reporter)
    }

    /// Like [`new`](Self::new) but with both mixtures supplied directly.
    ///
    /// The atom list and GMM path of `config` are not consulted.
    pub fn from_parts(
        config: &RestraintConfig,
        model: ModelGmm,
        data: DataGmm,
        scope: ReductionScope,
    ) -> Result<Self, EngineError> {
        let ensemble = Ensemble::discover(scope);
        let seed = ensemble.seed(config.monte_carlo.seed.unwrap_or_else(wall_clock_seed));
        Self::assemble(config, ensemble, seed, model, data, &ProgressReporter::new())
    }

    fn assemble(
        config: &RestraintConfig,
        ensemble: Ensemble,
        seed: u64,
        model: ModelGmm,
        data: DataGmm,
        reporter: &ProgressReporter,
    ) -> Result<Self, EngineError> {
        let kbt = config.thermal_energy.kbt();
        let sigma_mean = ensemble.mean_uncertainty(config.sigma.mean);

        info!(atoms = model.len(), gmm_file = %config.gmm_file.display(), "Density restraint input.");
        if config.serial {
            info!("Serial calculation requested; workers evaluate every pair.");
        }
        info!(
            cutoff = config.neighbor_list.cutoff,
            stride = config.neighbor_list.stride,
            "Neighbor list parameters."
        );
        info!(
            sigma0 = config.sigma.initial,
            sigma_min = config.sigma.min,
            sigma_max = config.sigma.max,
            sigma_step = config.sigma.step,
            sigma_mean,
            "Data uncertainty parameters."
        );
        info!(
            kbt,
            replicas = ensemble.replica_count(),
            mc_steps = config.monte_carlo.steps,
            mc_stride = config.monte_carlo.stride,
            "Sampling parameters."
        );
        info!(components = data.len(), "Data GMM loaded.");

        let data_len = data.len();
        reporter.report(Progress::Message(format!(
            "{} atoms against {} data components",
            model.len(),
            data_len
        )));
        reporter.report(Progress::PhaseStart {
            name: "Precomputing overlap tables",
        });
        let tables =
            OverlapTables::build(model.normalized(), data.normalized(), config.neighbor_list.cutoff)?;
        reporter.report(Progress::PhaseFinish);
        let score_function =
            ScoreFunction::new(kbt, sigma_mean, tables.self_overlaps().totals().to_vec());
        let sampler = SigmaSampler::new(&config.sigma, &config.monte_carlo, kbt, seed);
        let work = ensemble.work_communicator(config.serial);

        Ok(Self {
            tables,
            score_function,
            neighbors: NeighborList::new(config.neighbor_list.stride),
            buffers: OverlapBuffers::new(data_len),
            sampler,
            ensemble,
            work,
        })
    }

    /// Hook for the start of a step; a replica exchange invalidates the neighbor list.
    pub fn prepare(&mut self, exchange: bool) {
        if exchange {
            self.neighbors.mark_stale();
        }
    }

    /// Evaluates the restraint at `positions`, ordered as the configured atoms.
    #[instrument(level = "debug", skip_all, name = "density_restraint", fields(step = step))]
    pub fn calculate(
        &mut self,
        step: u64,
        positions: &[Point3<f64>],
        exchange: bool,
    ) -> Result<RestraintOutput, EngineError> {
        let atom_len = self.tables.model().len();
        if positions.len() != atom_len {
            return Err(EngineError::PositionCount {
                expected: atom_len,
                actual: positions.len(),
            });
        }
        let work = self.work.as_ref();

        if exchange {
            self.neighbors.mark_stale();
        }
        if self.neighbors.needs_rebuild(step) {
            self.neighbors.rebuild(&self.tables, positions, work);
        }
        let pairs = self.neighbors.pairs();
        self.buffers.evaluate(&self.tables, pairs, positions, work);
        self.ensemble.average(self.buffers.overlaps_mut());

        let overlaps = self.buffers.overlaps();
        let score_function = &self.score_function;
        if self.sampler.is_due(step, exchange) {
            self.sampler
                .sweep(|sigma| score_function.energy(overlaps, sigma));
        }
        let accept = self.sampler.acceptance(step);

        let sigma = self.sampler.sigma();
        let ss2 = score_function.effective_variance(sigma);
        let inv_s2 = self.ensemble.sum(1.0 / ss2);

        let derivatives = score_function.overlap_derivatives(overlaps, inv_s2);
        let gradient = self.buffers.atom_gradient(
            pairs,
            &derivatives,
            self.ensemble.scale(),
            atom_len,
            work,
        );
        let score = score_function.score(overlaps, inv_s2, ss2);

        Ok(RestraintOutput {
            sigma,
            accept,
            score,
            gradient,
        })
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sampler.sigma()
    }

    #[inline]
    pub fn kbt(&self) -> f64 {
        self.score_function.kbt()
    }

    /// `sigma_mean` after division by the square root of the replica count.
    pub fn sigma_mean(&self) -> f64 {
        self.score_function.sigma_mean()
    }

    pub fn replica_count(&self) -> usize {
        self.ensemble.replica_count()
    }

    pub fn atom_len(&self) -> usize {
        self.tables.model().len()
    }

    pub fn data_len(&self) -> usize {
        self.tables.data().len()
    }

    /// Model-data overlaps of the last evaluated step, averaged over replicas.
    pub fn overlaps(&self) -> &[f64] {
        self.buffers.overlaps()
    }

    pub fn self_overlaps(&self) -> &[f64] {
        self.tables.self_overlaps().totals()
    }

    pub fn neighbor_list(&self) -> &NeighborList {
        &self.neighbors
    }

    pub fn tables(&self) -> &OverlapTables {
        &self.tables
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
