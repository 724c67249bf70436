use crate::core::data::DataGmm;
use crate::core::model::{ElementType, ModelGmm};
use crate::core::overlap::{OverlapKernel, overlap};
use crate::engine::error::EngineError;
use crate::engine::neighbor_list::PairIndex;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Unweighted overlap kernels for every (element type, data component) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryTable {
    data_len: usize,
    kernels: Vec<OverlapKernel>,
}

impl AuxiliaryTable {
    pub fn build(data: &DataGmm) -> Result<Self, EngineError> {
        let mut kernels = Vec::with_capacity(ElementType::ALL.len() * data.len());
        for element in ElementType::ALL {
            let atom_cov = element.covariance();
            for (j, component) in data.components().iter().enumerate() {
                let kernel = OverlapKernel::between(&atom_cov, &component.covariance)
                    .ok_or(EngineError::SingularCovariance { data: j })?;
                kernels.push(kernel);
            }
        }
        Ok(Self {
            data_len: data.len(),
            kernels,
        })
    }

    #[inline]
    pub fn kernel(&self, element: ElementType, data_index: usize) -> &OverlapKernel {
        &self.kernels[element.index() * self.data_len + data_index]
    }
}

/// Data-data self overlaps and the per-component neighbor-list inclusion thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfOverlaps {
    totals: Vec<f64>,
    thresholds: Vec<f64>,
}

impl SelfOverlaps {
    #[instrument(skip_all, name = "self_overlaps", fields(components = data.len()))]
    pub fn compute(data: &DataGmm, fraction: f64) -> Result<Self, EngineError> {
        #[cfg(feature = "parallel")]
        let iterator = (0..data.len()).into_par_iter();

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..data.len();

        let pairs: Vec<(f64, f64)> = iterator
            .map(|i| self_overlap(data, i, fraction))
            .collect::<Result<_, _>>()?;
        let (totals, thresholds) = pairs.into_iter().unzip();
        Ok(Self { totals, thresholds })
    }

    /// Total overlap of every data component with the whole data mixture.
    #[inline]
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    #[inline]
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }
}

/// Overlap of data component `id` with every data component, and its inclusion threshold.
pub fn self_overlap(
    data: &DataGmm,
    id: usize,
    fraction: f64,
) -> Result<(f64, f64), EngineError> {
    let a = data.component(id);
    let terms = data
        .components()
        .iter()
        .enumerate()
        .map(|(j, b)| {
            let kernel = OverlapKernel::between(&a.covariance, &b.covariance)
                .ok_or(EngineError::SingularCovariance { data: j })?
                .scaled(a.weight * b.weight);
            Ok(overlap(&a.mean, &b.mean, kernel.prefactor, &kernel.inv_cov_sum))
        })
        .collect::<Result<Vec<f64>, EngineError>>()?;

    let total: f64 = terms.iter().sum();
    Ok((total, inclusion_threshold(terms, total, fraction)))
}

/// Smallest overlap worth keeping so that the discarded tail stays below
/// `fraction · total`.
///
/// Terms are sorted ascending and accumulated from the second smallest; the value just
/// below the first index where the running sum reaches the budget is returned. If the
/// budget is never reached the budget itself is returned.
pub fn inclusion_threshold(mut terms: Vec<f64>, total: f64, fraction: f64) -> f64 {
    terms.sort_by(|a, b| a.total_cmp(b));
    let budget = total * fraction;
    let mut tail = 0.0;
    for pair in terms.windows(2) {
        tail += pair[1];
        if tail >= budget {
            return pair[0];
        }
    }
    budget
}

/// Largest exponent `Q` for which any (data, atom) pair can still reach its data
/// component's inclusion threshold.
///
/// For a pair with weighted prefactor `p` and threshold `t`, the overlap `p·exp(−Q/2)`
/// stays below `t` whenever `Q > −2·ln(t/p)`. Taking the minimum ratio over all pairs
/// gives one bound valid for every pair.
pub fn global_exponent_cutoff(
    model: &ModelGmm,
    data: &DataGmm,
    auxiliary: &AuxiliaryTable,
    thresholds: &[f64],
) -> f64 {
    // Model weights depend only on the element type, so one atom per type suffices.
    let mut seen = BTreeSet::new();
    let representatives: Vec<(ElementType, f64)> = model
        .types()
        .iter()
        .zip(model.weights())
        .filter(|(t, _)| seen.insert(**t))
        .map(|(t, w)| (*t, *w))
        .collect();

    let mut min_ratio = f64::INFINITY;
    for (i, component) in data.components().iter().enumerate() {
        for &(element, weight) in &representatives {
            let prefactor = auxiliary.kernel(element, i).prefactor * component.weight * weight;
            let ratio = thresholds[i] / prefactor;
            if ratio < min_ratio {
                min_ratio = ratio;
            }
        }
    }
    -2.0 * min_ratio.ln()
}

/// Everything the per-step evaluation needs that depends only on the two mixtures.
#[derive(Debug, Clone)]
pub struct OverlapTables {
    model: ModelGmm,
    data: DataGmm,
    auxiliary: AuxiliaryTable,
    self_overlaps: SelfOverlaps,
    exponent_cutoff: f64,
}

impl OverlapTables {
    /// Precomputes self overlaps, the auxiliary table and the global cutoff.
    ///
    /// Both mixtures are expected to be normalized already.
    #[instrument(skip_all, name = "overlap_tables")]
    pub fn build(model: ModelGmm, data: DataGmm, nl_cutoff: f64) -> Result<Self, EngineError> {
        let self_overlaps = SelfOverlaps::compute(&data, nl_cutoff)?;
        let auxiliary = AuxiliaryTable::build(&data)?;
        let exponent_cutoff =
            global_exponent_cutoff(&model, &data, &auxiliary, self_overlaps.thresholds());
        debug!(exponent_cutoff, "Precomputed overlap tables.");
        Ok(Self {
            model,
            data,
            auxiliary,
            self_overlaps,
            exponent_cutoff,
        })
    }

    /// Kernel of a (data, atom) pair with the two weights folded into the prefactor.
    #[inline]
    pub fn pair_kernel(&self, pair: PairIndex) -> OverlapKernel {
        let element = self.model.types()[pair.model];
        self.auxiliary
            .kernel(element, pair.data)
            .scaled(self.data.component(pair.data).weight * self.model.weights()[pair.model])
    }

    #[inline]
    pub fn model(&self) -> &ModelGmm {
        &self.model
    }

    #[inline]
    pub fn data(&self) -> &DataGmm {
        &self.data
    }

    pub fn auxiliary(&self) -> &AuxiliaryTable {
        &self.auxiliary
    }

    #[inline]
    pub fn self_overlaps(&self) -> &SelfOverlaps {
        &self.self_overlaps
    }

    #[inline]
    pub fn exponent_cutoff(&self) -> f64 {
        self.exponent_cutoff
    }
}
