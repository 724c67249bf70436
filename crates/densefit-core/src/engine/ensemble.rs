use crate::engine::comm::{Communicator, ReductionScope, ReplicaInfo, SerialCommunicator};
use std::sync::Arc;
use tracing::debug;

/// Averaging of per-replica quantities across cooperating simulation replicas.
#[derive(Clone)]
pub struct Ensemble {
    scope: ReductionScope,
    replicas: ReplicaInfo,
}

impl Ensemble {
    /// Discovers the replica layout. Collective over the inner group.
    pub fn discover(scope: ReductionScope) -> Self {
        let replicas = scope.replica_info();
        debug!(
            replicas = replicas.count,
            replica = replicas.index,
            "Discovered replica layout."
        );
        Self { scope, replicas }
    }

    pub fn single() -> Self {
        Self::discover(ReductionScope::serial())
    }

    #[inline]
    pub fn replica_count(&self) -> usize {
        self.replicas.count
    }

    #[inline]
    pub fn replica_index(&self) -> usize {
        self.replicas.index
    }

    /// `1 / replica_count`.
    #[inline]
    pub fn scale(&self) -> f64 {
        1.0 / self.replicas.count as f64
    }

    /// Uncertainty of the mean of `replica_count` independent estimates.
    pub fn mean_uncertainty(&self, sigma_mean: f64) -> f64 {
        sigma_mean / (self.replicas.count as f64).sqrt()
    }

    /// Replaces `values` with their average over replicas.
    pub fn average(&self, values: &mut [f64]) {
        self.scope.replica_sum(values, self.scale());
    }

    /// Sum of a scalar over replicas, shared with the inner group.
    pub fn sum(&self, value: f64) -> f64 {
        let mut buffer = [value];
        self.scope.replica_sum(&mut buffer, 1.0);
        buffer[0]
    }

    /// One seed per replica, identical across the replica's inner group.
    pub fn seed(&self, base: u64) -> u64 {
        self.scope
            .broadcast_u64(base.wrapping_add(self.replicas.index as u64))
    }

    /// Communicator that splits per-step work: the inner group, or a lone worker in
    /// serial mode.
    pub fn work_communicator(&self, serial: bool) -> Arc<dyn Communicator> {
        if serial {
            Arc::new(SerialCommunicator)
        } else {
            Arc::clone(self.scope.inner())
        }
    }
}
