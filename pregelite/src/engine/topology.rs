//! The in-process worker mesh: one mailbox per worker plus the barrier that
//! delimits supersteps. Everything that crosses a worker boundary travels
//! through here as encoded bytes, tagged with the channel (or aggregator, or
//! globalize pass) it belongs to.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::{core::partition::WorkerId, errors::EngineError};

/// One encoded batch addressed to a worker.
pub(crate) struct Packet {
    pub(crate) tag: u32,
    pub(crate) from: WorkerId,
    pub(crate) bytes: Vec<u8>,
}

impl Packet {
    pub(crate) fn new(tag: u32, from: WorkerId, bytes: Vec<u8>) -> Self {
        Self { tag, from, bytes }
    }
}

/// Implemented by everything the engine flushes at a superstep boundary:
/// push channels, broadcast channels, aggregators.
pub(crate) trait Exchange: Send + Sync {
    fn tag(&self) -> u32;

    /// Ship this round's outbound state into peer mailboxes.
    fn send(&self, mesh: &Mesh, from: WorkerId) -> Result<(), EngineError>;

    /// Absorb the packets addressed to this worker and expose them as the
    /// next round's inbound state.
    fn ingest(&self, inbox: Vec<Vec<u8>>) -> Result<(), EngineError>;
}

struct BarrierState {
    arrived: usize,
    generation: u64,
    failed: Option<WorkerId>,
    timed_out: bool,
}

pub(crate) struct Mesh {
    workers: usize,
    deadline: Option<Instant>,
    mailboxes: Vec<Mutex<Vec<Packet>>>,
    barrier: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Mesh {
    pub(crate) fn new(workers: usize, deadline: Option<Instant>) -> Self {
        Self {
            workers,
            deadline,
            mailboxes: (0..workers).map(|_| Mutex::new(Vec::new())).collect(),
            barrier: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                failed: None,
                timed_out: false,
            }),
            cvar: Condvar::new(),
        }
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn deposit(&self, dest: WorkerId, packet: Packet) {
        self.mailboxes[dest].lock().push(packet);
    }

    pub(crate) fn drain(&self, me: WorkerId) -> Vec<Packet> {
        std::mem::take(&mut *self.mailboxes[me].lock())
    }

    /// Marks the whole job failed and wakes every waiter. Once set, the
    /// barrier stays broken: no worker may proceed past a barrier a dead
    /// peer can never reach.
    pub(crate) fn abort(&self, from: WorkerId) {
        let mut state = self.barrier.lock();
        if state.failed.is_none() {
            debug!(worker = from, "aborting job");
            state.failed = Some(from);
        }
        self.cvar.notify_all();
    }

    /// The barrier. Returns only once every worker arrived, or fails for all
    /// of them when the job is aborted or the deadline expires.
    pub(crate) fn wait(&self) -> Result<(), EngineError> {
        let mut state = self.barrier.lock();

        if let Some(worker) = state.failed {
            return Err(EngineError::WorkerFailed(worker));
        }
        if state.timed_out {
            return Err(EngineError::DeadlineExceeded);
        }

        state.arrived += 1;
        if state.arrived == self.workers {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation {
            if let Some(worker) = state.failed {
                return Err(EngineError::WorkerFailed(worker));
            }
            if state.timed_out {
                return Err(EngineError::DeadlineExceeded);
            }
            match self.deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut state, deadline).timed_out() {
                        state.timed_out = true;
                        self.cvar.notify_all();
                        return Err(EngineError::DeadlineExceeded);
                    }
                }
                None => self.cvar.wait(&mut state),
            }
        }

        if let Some(worker) = state.failed {
            Err(EngineError::WorkerFailed(worker))
        } else if state.timed_out {
            Err(EngineError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}
