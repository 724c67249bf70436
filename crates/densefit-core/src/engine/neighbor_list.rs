use crate::core::overlap::overlap_within;
use crate::engine::comm::Communicator;
use crate::engine::precompute::OverlapTables;
use nalgebra::Point3;
use tracing::{debug, instrument};

/// A (data component, model atom) interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairIndex {
    pub data: usize,
    pub model: usize,
}

impl PairIndex {
    /// Decodes a flat index over the row-major `data × model` grid.
    #[inline]
    pub fn from_work_index(index: usize, model_len: usize) -> Self {
        Self {
            data: index / model_len,
            model: index % model_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborListState {
    Stale,
    Valid,
}

/// The sparse set of (data, atom) pairs whose overlap was non-negligible at the last rebuild.
///
/// Between rebuilds the list is not updated, so pairs that drift into range are ignored
/// until the next periodic refresh.
#[derive(Debug, Clone)]
pub struct NeighborList {
    stride: u64,
    state: NeighborListState,
    pairs: Vec<PairIndex>,
}

impl NeighborList {
    pub fn new(stride: u64) -> Self {
        Self {
            stride,
            state: NeighborListState::Stale,
            pairs: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> NeighborListState {
        self.state
    }

    pub fn mark_stale(&mut self) {
        self.state = NeighborListState::Stale;
    }

    pub fn needs_rebuild(&self, step: u64) -> bool {
        self.state == NeighborListState::Stale || step % self.stride == 0
    }

    /// Re-evaluates every pair with the fast overlap and keeps those at or above their
    /// data component's inclusion threshold.
    ///
    /// Work is split round-robin across `comm`; the result is identical on every worker
    /// and ordered by the rank that found each pair.
    #[instrument(skip_all, name = "neighbor_list_rebuild")]
    pub fn rebuild(
        &mut self,
        tables: &OverlapTables,
        positions: &[Point3<f64>],
        comm: &dyn Communicator,
    ) -> usize {
        let model_len = tables.model().len();
        let total = tables.data().len() * model_len;
        let thresholds = tables.self_overlaps().thresholds();
        let cutoff = tables.exponent_cutoff();

        let local: Vec<PairIndex> = comm
            .partition()
            .indices(total)
            .map(|k| PairIndex::from_work_index(k, model_len))
            .filter(|&pair| {
                let kernel = tables.pair_kernel(pair);
                let ov = overlap_within(
                    &tables.data().component(pair.data).mean,
                    &positions[pair.model],
                    kernel.prefactor,
                    &kernel.inv_cov_sum,
                    cutoff,
                );
                ov >= thresholds[pair.data]
            })
            .collect();

        let mut counts = vec![0u64; comm.size()];
        counts[comm.rank()] = local.len() as u64;
        comm.sum_u64(&mut counts);
        let counts: Vec<usize> = counts.into_iter().map(|c| c as usize).collect();
        let displacements: Vec<usize> = counts
            .iter()
            .scan(0, |offset, &count| {
                let start = *offset;
                *offset += count;
                Some(start)
            })
            .collect();

        self.pairs = comm.all_gather_v(&local, &counts, &displacements);
        self.state = NeighborListState::Valid;
        debug!(
            pairs = self.pairs.len(),
            candidates = total,
            "Rebuilt neighbor list."
        );
        self.pairs.len()
    }

    #[inline]
    pub fn pairs(&self) -> &[PairIndex] {
        &self.pairs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
