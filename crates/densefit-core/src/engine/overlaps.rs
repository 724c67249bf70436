use crate::core::overlap::overlap_with_gradient;
use crate::engine::comm::{Communicator, sum_vectors};
use crate::engine::neighbor_list::PairIndex;
use crate::engine::precompute::OverlapTables;
use nalgebra::{Point3, Vector3};
use tracing::instrument;

/// Per-step model-data overlaps and the per-pair gradients behind them.
#[derive(Debug, Clone, Default)]
pub struct OverlapBuffers {
    overlaps: Vec<f64>,
    pair_gradients: Vec<Vector3<f64>>,
}

impl OverlapBuffers {
    pub fn new(data_len: usize) -> Self {
        Self {
            overlaps: vec![0.0; data_len],
            pair_gradients: Vec::new(),
        }
    }

    /// Recomputes overlaps for the pairs of the neighbor list.
    ///
    /// Entries are split round-robin across `comm` and summed afterwards, so every worker
    /// ends up with the complete overlap vector and gradient array.
    #[instrument(level = "trace", skip_all, name = "overlap_evaluation")]
    pub fn evaluate(
        &mut self,
        tables: &OverlapTables,
        pairs: &[PairIndex],
        positions: &[Point3<f64>],
        comm: &dyn Communicator,
    ) {
        self.overlaps.iter_mut().for_each(|v| *v = 0.0);
        self.pair_gradients.clear();
        self.pair_gradients.resize(pairs.len(), Vector3::zeros());

        for i in comm.partition().indices(pairs.len()) {
            let pair = pairs[i];
            let kernel = tables.pair_kernel(pair);
            let (ov, gradient) = overlap_with_gradient(
                &tables.data().component(pair.data).mean,
                &positions[pair.model],
                kernel.prefactor,
                &kernel.inv_cov_sum,
            );
            self.overlaps[pair.data] += ov;
            self.pair_gradients[i] = gradient;
        }

        comm.sum_f64(&mut self.overlaps);
        sum_vectors(comm, &mut self.pair_gradients);
    }

    /// Per-atom gradient by the chain rule.
    ///
    /// `coefficients[d]` is the derivative of the score with respect to the overlap of
    /// data component `d`; every pair contribution is further multiplied by `scale`.
    pub fn atom_gradient(
        &self,
        pairs: &[PairIndex],
        coefficients: &[f64],
        scale: f64,
        atom_len: usize,
        comm: &dyn Communicator,
    ) -> Vec<Vector3<f64>> {
        let mut gradient = vec![Vector3::zeros(); atom_len];
        for i in comm.partition().indices(pairs.len()) {
            let pair = pairs[i];
            gradient[pair.model] += self.pair_gradients[i] * (coefficients[pair.data] * scale);
        }
        sum_vectors(comm, &mut gradient);
        gradient
    }

    #[inline]
    pub fn overlaps(&self) -> &[f64] {
        &self.overlaps
    }

    pub fn overlaps_mut(&mut self) -> &mut [f64] {
        &mut self.overlaps
    }

    pub fn pair_gradients(&self) -> &[Vector3<f64>] {
        &self.pair_gradients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::covariance::SymMat3;
    use crate::core::data::DataGmm;
    use crate::core::gaussian::GaussianComponent;
    use crate::core::model::{ElementType, ModelGmm};
    use crate::engine::comm::{SerialCommunicator, ThreadGroup};
    use crate::engine::neighbor_list::NeighborList;

    fn tables() -> OverlapTables {
        let data = DataGmm::new(vec![
            GaussianComponent::new(Point3::new(0.0, 0.0, 0.0), 0.6, SymMat3::isotropic(0.02)),
            GaussianComponent::new(
                Point3::new(0.2, 0.1, -0.1),
                0.4,
                SymMat3::new(0.03, 0.002, 0.0, 0.02, 0.001, 0.025),
            ),
        ])
        .unwrap()
        .normalized();
        let model = ModelGmm::from_types(vec![
            ElementType::Carbon,
            ElementType::Oxygen,
            ElementType::Nitrogen,
        ])
        .normalized();
        OverlapTables::build(model, data, 0.01).unwrap()
    }

    fn positions() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.02, 0.01, 0.0),
            Point3::new(0.15, 0.05, -0.05),
            Point3::new(0.1, 0.2, 0.0),
        ]
    }

    fn all_pairs(tables: &OverlapTables) -> Vec<PairIndex> {
        let model_len = tables.model().len();
        (0..tables.data().len() * model_len)
            .map(|k| PairIndex::from_work_index(k, model_len))
            .collect()
    }

    #[test]
    fn overlaps_are_sums_over_the_pairs_of_each_component() {
        let tables = tables();
        let positions = positions();
        let pairs = all_pairs(&tables);
        let mut buffers = OverlapBuffers::new(tables.data().len());
        buffers.evaluate(&tables, &pairs, &positions, &SerialCommunicator);

        for d in 0..tables.data().len() {
            let expected: f64 = (0..positions.len())
                .map(|m| {
                    let k = tables.pair_kernel(PairIndex { data: d, model: m });
                    overlap_with_gradient(
                        &tables.data().component(d).mean,
                        &positions[m],
                        k.prefactor,
                        &k.inv_cov_sum,
                    )
                    .0
                })
                .sum();
            assert!((buffers.overlaps()[d] - expected).abs() < 1e-12);
        }
        assert_eq!(buffers.pair_gradients().len(), pairs.len());
    }

    #[test]
    fn evaluate_resets_previous_step() {
        let tables = tables();
        let positions = positions();
        let pairs = all_pairs(&tables);
        let mut buffers = OverlapBuffers::new(tables.data().len());
        buffers.evaluate(&tables, &pairs, &positions, &SerialCommunicator);
        let first = buffers.overlaps().to_vec();
        buffers.evaluate(&tables, &pairs, &positions, &SerialCommunicator);
        assert_eq!(buffers.overlaps(), first.as_slice());
    }

    #[test]
    fn atom_gradient_matches_finite_difference_of_linear_score() {
        // With score = Σ_d c_d·ov_d the atom gradient is Σ_d c_d·∂ov_d/∂x.
        let tables = tables();
        let positions = positions();
        let pairs = all_pairs(&tables);
        let coefficients = [1.5, -0.7];
        let mut buffers = OverlapBuffers::new(tables.data().len());
        buffers.evaluate(&tables, &pairs, &positions, &SerialCommunicator);
        let gradient =
            buffers.atom_gradient(&pairs, &coefficients, 1.0, positions.len(), &SerialCommunicator);

        let score = |pos: &[Point3<f64>]| {
            let mut b = OverlapBuffers::new(tables.data().len());
            b.evaluate(&tables, &pairs, pos, &SerialCommunicator);
            b.overlaps()
                .iter()
                .zip(coefficients)
                .map(|(ov, c)| ov * c)
                .sum::<f64>()
        };
        let h = 1e-6;
        for atom in 0..positions.len() {
            for axis in 0..3 {
                let mut plus = positions.clone();
                let mut minus = positions.clone();
                plus[atom][axis] += h;
                minus[atom][axis] -= h;
                let numeric = (score(plus.as_slice()) - score(minus.as_slice())) / (2.0 * h);
                let analytic = gradient[atom][axis];
                assert!(
                    (numeric - analytic).abs() < 1e-5 * (1.0 + analytic.abs()),
                    "atom {atom} axis {axis}: {numeric} vs {analytic}"
                );
            }
        }
    }

    #[test]
    fn parallel_evaluation_matches_serial() {
        let tables = tables();
        let positions = positions();
        let mut nl = NeighborList::new(1);
        nl.rebuild(&tables, &positions, &SerialCommunicator);
        let pairs = nl.pairs().to_vec();

        let mut serial = OverlapBuffers::new(tables.data().len());
        serial.evaluate(&tables, &pairs, &positions, &SerialCommunicator);
        let serial_gradient =
            serial.atom_gradient(&pairs, &[1.0, 2.0], 0.5, positions.len(), &SerialCommunicator);

        let results = ThreadGroup::run(3, |comm| {
            let mut buffers = OverlapBuffers::new(tables.data().len());
            buffers.evaluate(&tables, &pairs, &positions, &comm);
            let gradient = buffers.atom_gradient(&pairs, &[1.0, 2.0], 0.5, positions.len(), &comm);
            (buffers.overlaps().to_vec(), gradient)
        });
        for (overlaps, gradient) in results {
            for (a, b) in overlaps.iter().zip(serial.overlaps()) {
                assert!((a - b).abs() < 1e-12);
            }
            for (a, b) in gradient.iter().zip(&serial_gradient) {
                assert!((a - b).norm() < 1e-9);
            }
        }
    }
}
