use super::Communicator;
use crate::engine::neighbor_list::PairIndex;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollectiveOp {
    SumF64 { len: usize },
    SumU64 { len: usize },
    AllGatherV { total: usize },
}

#[derive(Debug)]
enum Payload {
    F64(Vec<f64>),
    U64(Vec<u64>),
    Pairs(Vec<PairIndex>),
}

#[derive(Debug)]
struct Slot {
    op: CollectiveOp,
    payload: Payload,
}

#[derive(Debug)]
struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Slot>>>,
}

/// One member of an in-process SPMD group.
///
/// Each collective posts this worker's contribution, waits for the whole group, checks
/// that every worker posted the same operation, and combines the contributions in rank
/// order, so all members observe bit-identical results.
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadCommunicator {
    fn exchange<T>(
        &self,
        op: CollectiveOp,
        payload: Payload,
        combine: impl FnOnce(&[&Slot]) -> T,
    ) -> T {
        self.shared.slots.lock()[self.rank] = Some(Slot { op, payload });
        self.shared.barrier.wait();

        let result = {
            let slots = self.shared.slots.lock();
            let posted: Vec<&Slot> = slots
                .iter()
                .enumerate()
                .map(|(rank, slot)| match slot {
                    Some(slot) => slot,
                    None => panic!("rank {rank} reached a collective without posting"),
                })
                .collect();
            for (rank, slot) in posted.iter().enumerate() {
                if slot.op != op {
                    panic!(
                        "collective mismatch: rank {} issued {:?} while rank {} issued {:?}",
                        self.rank, op, rank, slot.op
                    );
                }
            }
            combine(&posted)
        };

        // Nobody may overwrite a slot until every worker has read the group's contributions.
        self.shared.barrier.wait();
        result
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum_f64(&self, buffer: &mut [f64]) {
        let op = CollectiveOp::SumF64 { len: buffer.len() };
        let summed = self.exchange(op, Payload::F64(buffer.to_vec()), |slots| {
            let mut acc = vec![0.0; buffer.len()];
            for slot in slots {
                if let Payload::F64(values) = &slot.payload {
                    acc.iter_mut().zip(values).for_each(|(a, v)| *a += v);
                }
            }
            acc
        });
        buffer.copy_from_slice(&summed);
    }

    fn sum_u64(&self, buffer: &mut [u64]) {
        let op = CollectiveOp::SumU64 { len: buffer.len() };
        let summed = self.exchange(op, Payload::U64(buffer.to_vec()), |slots| {
            let mut acc = vec![0u64; buffer.len()];
            for slot in slots {
                if let Payload::U64(values) = &slot.payload {
                    acc.iter_mut().zip(values).for_each(|(a, v)| *a += v);
                }
            }
            acc
        });
        buffer.copy_from_slice(&summed);
    }

    fn all_gather_v(
        &self,
        local: &[PairIndex],
        counts: &[usize],
        displacements: &[usize],
    ) -> Vec<PairIndex> {
        assert_eq!(counts.len(), self.size, "one count per rank is required");
        assert_eq!(
            counts[self.rank],
            local.len(),
            "rank {} contributes {} pairs but counts say {}",
            self.rank,
            local.len(),
            counts[self.rank]
        );
        let total: usize = counts.iter().sum();
        let op = CollectiveOp::AllGatherV { total };
        self.exchange(op, Payload::Pairs(local.to_vec()), |slots| {
            let mut gathered = vec![PairIndex::default(); total];
            for (rank, slot) in slots.iter().enumerate() {
                if let Payload::Pairs(pairs) = &slot.payload {
                    let start = displacements[rank];
                    gathered[start..start + pairs.len()].copy_from_slice(pairs);
                }
            }
            gathered
        })
    }
}

/// Factory and runner for in-process worker groups.
pub struct ThreadGroup;

impl ThreadGroup {
    /// Communicators for a fresh group of `size` workers, ordered by rank.
    pub fn communicators(size: usize) -> Vec<ThreadCommunicator> {
        assert!(size > 0, "a worker group needs at least one member");
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size)
            .map(|rank| ThreadCommunicator {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Runs `worker` once per rank on scoped threads and returns the results in rank order.
    ///
    /// A panic on any worker is resumed on the calling thread.
    pub fn run<R, F>(size: usize, worker: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadCommunicator) -> R + Sync,
    {
        let comms = Self::communicators(size);
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let worker = &worker;
                    scope.spawn(move || worker(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}
