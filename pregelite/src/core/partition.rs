//! The deterministic `owner(key) -> worker` function. Every worker computes
//! the same owner for the same key, which is what makes message routing and
//! the globalize rebalance well-defined without a central directory.

use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

pub type WorkerId = usize;

// fixed seed so all workers (and re-runs) agree on placement
const PARTITION_SEED: u64 = 0x5eed_0f_9a7e;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMap {
    workers: usize,
}

impl PartitionMap {
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "partition map needs at least one worker");
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn owner<K: Hash>(&self, key: &K) -> WorkerId {
        let mut hasher = XxHash64::with_seed(PARTITION_SEED);
        key.hash(&mut hasher);
        (hasher.finish() % self.workers as u64) as WorkerId
    }
}
