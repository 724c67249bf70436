//! # Collective Communication
//!
//! The restraint is evaluated SPMD-style by a fixed group of workers that cooperate
//! through blocking collectives. Every worker of a group must issue the same sequence
//! of collective calls, with matching buffer lengths, on every step; the
//! implementations here check that contract instead of leaving it to call sites.
//!
//! Two tiers of groups exist. The inner group splits one replica's work; the outer
//! group joins one representative of each replica for ensemble averaging. A
//! [`ReductionScope`] nests the two.

mod thread;

pub use thread::{ThreadCommunicator, ThreadGroup};

use crate::engine::neighbor_list::PairIndex;
use nalgebra::Vector3;
use std::sync::Arc;

/// One worker's share of a round-robin split of `total` work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    rank: usize,
    size: usize,
}

impl WorkPartition {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(size > 0 && rank < size, "invalid partition {rank}/{size}");
        Self { rank, size }
    }

    pub fn serial() -> Self {
        Self { rank: 0, size: 1 }
    }

    /// Indices `rank, rank + size, rank + 2·size, …` below `total`.
    pub fn indices(&self, total: usize) -> impl Iterator<Item = usize> + use<> {
        (self.rank..total).step_by(self.size)
    }

    pub fn count(&self, total: usize) -> usize {
        total.saturating_sub(self.rank).div_ceil(self.size)
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A group of workers exchanging data through blocking collectives.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Element-wise sum across the group; every worker receives the result.
    fn sum_f64(&self, buffer: &mut [f64]);

    fn sum_u64(&self, buffer: &mut [u64]);

    /// Concatenates every worker's `local` slice in rank order.
    ///
    /// `counts[r]` is the length contributed by rank `r` and `displacements[r]` its
    /// offset in the result.
    fn all_gather_v(
        &self,
        local: &[PairIndex],
        counts: &[usize],
        displacements: &[usize],
    ) -> Vec<PairIndex>;

    fn partition(&self) -> WorkPartition {
        WorkPartition::new(self.rank(), self.size())
    }
}

/// Sums a slice of vectors component-wise across the group.
pub fn sum_vectors(comm: &dyn Communicator, vectors: &mut [Vector3<f64>]) {
    let mut flat: Vec<f64> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
    comm.sum_f64(&mut flat);
    for (v, chunk) in vectors.iter_mut().zip(flat.chunks_exact(3)) {
        *v = Vector3::new(chunk[0], chunk[1], chunk[2]);
    }
}

/// A group of one: every collective is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_f64(&self, _buffer: &mut [f64]) {}

    fn sum_u64(&self, _buffer: &mut [u64]) {}

    fn all_gather_v(
        &self,
        local: &[PairIndex],
        counts: &[usize],
        _displacements: &[usize],
    ) -> Vec<PairIndex> {
        debug_assert_eq!(counts, [local.len()]);
        local.to_vec()
    }
}

/// Replica count and this replica's index, as seen by every worker of the inner group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaInfo {
    pub count: usize,
    pub index: usize,
}

/// Nested inner (worker) and outer (replica) reduction scopes.
///
/// Only the inner group's representative (rank 0) holds the outer communicator and
/// takes part in outer collectives; results reach the other workers through an inner
/// reduction.
#[derive(Clone)]
pub struct ReductionScope {
    inner: Arc<dyn Communicator>,
    outer: Option<Arc<dyn Communicator>>,
}

impl ReductionScope {
    pub fn new(inner: Arc<dyn Communicator>, outer: Option<Arc<dyn Communicator>>) -> Self {
        let outer = if inner.rank() == 0 { outer } else { None };
        Self { inner, outer }
    }

    /// One worker, one replica.
    pub fn serial() -> Self {
        Self::new(Arc::new(SerialCommunicator), None)
    }

    pub fn inner(&self) -> &Arc<dyn Communicator> {
        &self.inner
    }

    #[inline]
    pub fn is_representative(&self) -> bool {
        self.inner.rank() == 0
    }

    pub fn replica_info(&self) -> ReplicaInfo {
        let mut info = [0u64; 2];
        if self.is_representative() {
            info = match &self.outer {
                Some(outer) => [outer.size() as u64, outer.rank() as u64],
                None => [1, 0],
            };
        }
        self.inner.sum_u64(&mut info);
        ReplicaInfo {
            count: info[0] as usize,
            index: info[1] as usize,
        }
    }

    /// A value chosen by the representative, broadcast to the inner group.
    pub fn broadcast_u64(&self, value: u64) -> u64 {
        let mut buffer = [if self.is_representative() { value } else { 0 }];
        self.inner.sum_u64(&mut buffer);
        buffer[0]
    }

    /// Sums `buffer` across replicas, scales it, and shares the result with the inner group.
    ///
    /// Non-representative contributions are discarded, so every worker of the group must
    /// hold the same input.
    pub fn replica_sum(&self, buffer: &mut [f64], scale: f64) {
        if self.is_representative() {
            if let Some(outer) = &self.outer {
                outer.sum_f64(buffer);
            }
            buffer.iter_mut().for_each(|v| *v *= scale);
        } else {
            buffer.iter_mut().for_each(|v| *v = 0.0);
        }
        self.inner.sum_f64(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_round_robin() {
        let p = WorkPartition::new(1, 3);
        assert_eq!(p.indices(8).collect::<Vec<_>>(), vec![1, 4, 7]);
        assert_eq!(p.count(8), 3);
    }

    #[test]
    fn partitions_cover_every_index_exactly_once() {
        let total = 17;
        let mut seen = vec![0; total];
        for rank in 0..4 {
            let p = WorkPartition::new(rank, 4);
            assert_eq!(p.indices(total).count(), p.count(total));
            for i in p.indices(total) {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn partition_with_rank_beyond_total_is_empty() {
        let p = WorkPartition::new(5, 6);
        assert_eq!(p.count(3), 0);
        assert_eq!(p.indices(3).count(), 0);
    }

    #[test]
    fn serial_collectives_are_identities() {
        let comm = SerialCommunicator;
        let mut buf = [1.0, 2.0];
        comm.sum_f64(&mut buf);
        assert_eq!(buf, [1.0, 2.0]);
        let pairs = [PairIndex { data: 0, model: 3 }];
        assert_eq!(comm.all_gather_v(&pairs, &[1], &[0]), pairs.to_vec());
    }

    #[test]
    fn serial_scope_reports_single_replica() {
        let scope = ReductionScope::serial();
        assert!(scope.is_representative());
        assert_eq!(scope.replica_info(), ReplicaInfo { count: 1, index: 0 });
    }

    #[test]
    fn replica_sum_with_single_replica_only_scales() {
        let scope = ReductionScope::serial();
        let mut buf = [0.125, 3.5];
        scope.replica_sum(&mut buf, 1.0);
        assert_eq!(buf, [0.125, 3.5]);
    }

    #[test]
    fn sum_vectors_round_trips_through_serial_group() {
        let mut v = [Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.5, 0.0)];
        sum_vectors(&SerialCommunicator, &mut v);
        assert_eq!(v[1], Vector3::new(-1.0, 0.5, 0.0));
    }
}
