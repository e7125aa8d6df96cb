//! The superstep engine: spawns one thread per worker, hands each a
//! [`Worker`] wired to the shared mesh, and runs the same job closure on all
//! of them. Workers advance in lockstep; anything one worker sends during a
//! superstep becomes visible to its peers at the start of the next one.

use std::{
    sync::Arc,
    thread,
    time::Instant,
};

use once_cell::sync::Lazy;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error};

use crate::errors::EngineError;

pub mod config;
pub(crate) mod topology;
pub mod worker;

pub use config::JobConfig;
pub use worker::{JobPhase, Step, Worker};

use topology::Mesh;

pub static POOL: Lazy<Arc<ThreadPool>> = Lazy::new(|| {
    let num_threads = std::env::var("PREGELITE_MAX_THREADS")
        .map(|s| {
            s.parse::<usize>()
                .expect("PREGELITE_MAX_THREADS must be a number")
        })
        .unwrap_or_else(|_| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .expect("failed to build engine thread pool"),
    )
});

/// A dedicated pool for jobs that should not share [`POOL`].
pub fn custom_pool(n_threads: usize) -> Arc<ThreadPool> {
    Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .expect("failed to build custom thread pool"),
    )
}

/// Breaks the barrier for everyone if this worker leaves without finishing,
/// whether by error return or by panic. Peers blocked on the barrier then
/// fail with [`EngineError::WorkerFailed`] instead of waiting forever.
struct AbortGuard {
    mesh: Arc<Mesh>,
    worker: usize,
    armed: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed {
            self.mesh.abort(self.worker);
        }
    }
}

/// Runs `job` once per worker, each on its own thread, and joins them all.
///
/// The closure must be deterministic in the channels and aggregators it
/// creates: every worker executes it, and creation order is what pairs a
/// channel on one worker with its counterpart on the others.
///
/// On failure the error reported is the most specific one any worker
/// produced; [`EngineError::WorkerFailed`] is only returned when no worker
/// recorded the root cause (a panic, typically).
pub fn run_job<F>(config: JobConfig, job: F) -> Result<(), EngineError>
where
    F: Fn(&mut Worker) -> Result<(), EngineError> + Send + Sync,
{
    if config.workers() == 0 {
        return Err(EngineError::EmptyTopology);
    }

    let deadline = config.deadline().map(|timeout| Instant::now() + timeout);
    let mesh = Arc::new(Mesh::new(config.workers(), deadline));
    let config = Arc::new(config);

    debug!(workers = mesh.workers(), "starting job");

    let mut results: Vec<Result<(), EngineError>> = Vec::with_capacity(mesh.workers());
    thread::scope(|scope| {
        let handles: Vec<_> = (0..mesh.workers())
            .map(|id| {
                let mesh = mesh.clone();
                let config = config.clone();
                let job = &job;
                scope.spawn(move || {
                    let mut guard = AbortGuard {
                        mesh: mesh.clone(),
                        worker: id,
                        armed: true,
                    };
                    let mut worker = Worker::new(id, mesh, config);
                    let result = job(&mut worker);
                    if result.is_ok() {
                        worker.finish();
                        guard.armed = false;
                    }
                    result
                })
            })
            .collect();

        for (id, handle) in handles.into_iter().enumerate() {
            results.push(handle.join().unwrap_or_else(|_| {
                error!(worker = id, "worker panicked");
                Err(EngineError::WorkerFailed(id))
            }));
        }
    });

    let mut failure: Option<EngineError> = None;
    for result in results {
        if let Err(err) = result {
            let more_specific = matches!(failure, Some(EngineError::WorkerFailed(_)))
                && !matches!(err, EngineError::WorkerFailed(_));
            if failure.is_none() || more_specific {
                failure = Some(err);
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod engine_test {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use crate::{
        core::{
            aggregator::{MinAggregator, SumAggregator},
            channel::SumCombiner,
            store::VertexStore,
            vertex::Vertex,
        },
        errors::EngineError,
    };

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cell {
        id: u64,
        val: i64,
    }

    impl Cell {
        fn new(id: u64) -> Self {
            Self { id, val: 0 }
        }
    }

    impl Vertex for Cell {
        type Key = u64;

        fn key(&self) -> &u64 {
            &self.id
        }
    }

    /// Each worker adds only the ids it owns, so no rebalancing is needed.
    fn load_owned(worker: &Worker, ids: std::ops::Range<u64>) -> VertexStore<Cell> {
        let mut store = VertexStore::new();
        for id in ids {
            if worker.partition().owner(&id) == worker.id() {
                store.add(Cell::new(id));
            }
        }
        store
    }

    #[test]
    fn globalize_places_every_record_with_its_owner() {
        let total = run_job(JobConfig::new(4), |worker| {
            // every worker loads a disjoint slice, ignoring ownership
            let lo = worker.id() as u64 * 25;
            let mut store = VertexStore::new();
            for id in lo..lo + 25 {
                store.add(Cell::new(id));
            }

            let counter: std::sync::Arc<SumAggregator<u64>> = worker.create_aggregator();
            worker.globalize(&mut store)?;

            for cell in store.iter() {
                assert_eq!(worker.partition().owner(&cell.id), worker.id());
            }

            counter.update(store.len() as u64);
            worker.superstep(&mut store, |_| {})?;
            assert_eq!(counter.read(), 100);
            Ok(())
        });
        assert!(total.is_ok(), "{total:?}");
    }

    #[test]
    fn combined_messages_arrive_exactly_one_round_later() {
        let outcome = run_job(JobConfig::new(4), |worker| {
            let mut store = load_owned(worker, 0..40);
            let ch = worker
                .create_push_combined_channel::<Cell, i64, SumCombiner<i64>>(&store, &store);

            let ch_send = ch.clone();
            worker.superstep(&mut store, move |cell| {
                // nothing has been exchanged yet
                assert_eq!(ch_send.get(cell), 0);
                ch_send.push(cell.id as i64 + 1, 0);
            })?;

            // one round later the sums are visible, folded per target key
            for cell in store.iter() {
                let expected = if cell.id == 0 { (1..=40).sum() } else { 0 };
                assert_eq!(ch.get(cell), expected, "vertex {}", cell.id);
            }

            // and one silent round clears them again
            worker.superstep(&mut store, |_| {})?;
            for cell in store.iter() {
                assert_eq!(ch.get(cell), 0);
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn random_traffic_is_conserved() {
        use rand::Rng;

        let outcome = run_job(JobConfig::new(4), |worker| {
            let mut store = load_owned(worker, 0..32);
            let ch = worker
                .create_push_combined_channel::<Cell, i64, SumCombiner<i64>>(&store, &store);
            let sent: Arc<SumAggregator<i64>> = worker.create_aggregator();
            let received: Arc<SumAggregator<i64>> = worker.create_aggregator();

            let ch_push = ch.clone();
            let sent_ref = sent.clone();
            worker.superstep(&mut store, move |_cell| {
                let mut rng = rand::thread_rng();
                for _ in 0..8 {
                    let target = rng.gen_range(0..32u64);
                    let value = rng.gen_range(-100..100i64);
                    ch_push.push(value, target);
                    sent_ref.update(value);
                }
            })?;
            let total_sent = sent.read();

            let ch_read = ch.clone();
            let received_ref = received.clone();
            worker.superstep(&mut store, move |cell| {
                received_ref.update(ch_read.get(cell));
            })?;

            // combining only folds, so no message mass is created or lost
            assert_eq!(received.read(), total_sent);
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn aggregators_reset_to_identity_each_round() {
        let outcome = run_job(JobConfig::new(2), |worker| {
            let mut store = load_owned(worker, 0..10);
            let seen: std::sync::Arc<SumAggregator<u64>> = worker.create_aggregator();
            let low: std::sync::Arc<MinAggregator<i64>> = worker.create_aggregator();

            let seen_ref = seen.clone();
            let low_ref = low.clone();
            worker.superstep(&mut store, move |cell| {
                seen_ref.update(1);
                low_ref.update(cell.id as i64 - 5);
            })?;
            assert_eq!(seen.read(), 10);
            assert_eq!(low.read(), -5);

            worker.superstep(&mut store, |_| {})?;
            assert_eq!(seen.read(), 0);
            assert_eq!(low.read(), i64::MAX);
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn broadcast_table_persists_across_rounds() {
        let outcome = run_job(JobConfig::new(3), |worker| {
            let mut store = load_owned(worker, 0..30);
            let bc = worker.create_broadcast_channel::<u64, i64>();

            let bc_pub = bc.clone();
            worker.superstep(&mut store, move |cell| {
                bc_pub.broadcast(cell.id, cell.id as i64 * 2);
            })?;

            // every worker sees every key, not just its own
            assert_eq!(bc.len(), 30);
            assert_eq!(bc.get(&7), Some(14));

            worker.superstep(&mut store, |_| {})?;
            assert_eq!(bc.get(&7), Some(14));
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn iterate_stops_when_every_vertex_votes_done() {
        let outcome = run_job(JobConfig::new(2), |worker| {
            let mut store = VertexStore::new();
            for id in 0..8u64 {
                if worker.partition().owner(&id) == worker.id() {
                    store.add(Cell { id, val: (id % 4) as i64 });
                }
            }

            let rounds = worker.iterate(&mut store, 10, |cell, _step| {
                if cell.val > 0 {
                    cell.val -= 1;
                    Step::Continue
                } else {
                    Step::Done
                }
            })?;

            // slowest vertex continues in rounds 0..=2, so round 3 is quiet
            assert_eq!(rounds, 4);
            for cell in store.iter() {
                assert_eq!(cell.val, 0);
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn failing_worker_unblocks_its_peers() {
        let outcome = run_job(JobConfig::new(4), |worker| {
            let mut store = load_owned(worker, 0..16);
            if worker.id() == 1 {
                return Err(EngineError::MissingParameter("input".to_string()));
            }
            // peers spin on the barrier until the abort reaches them
            loop {
                worker.superstep(&mut store, |_| {})?;
            }
        });

        // the root cause wins over the secondary WorkerFailed reports
        assert!(matches!(
            outcome,
            Err(EngineError::MissingParameter(name)) if name == "input"
        ));
    }

    #[test]
    fn stalled_worker_trips_the_deadline() {
        let config = JobConfig::new(2).with_deadline(Duration::from_millis(100));
        let outcome = run_job(config, |worker| {
            let mut store = load_owned(worker, 0..4);
            if worker.id() == 1 {
                thread::sleep(Duration::from_millis(1500));
            }
            worker.superstep(&mut store, |_| {})?;
            Ok(())
        });
        assert!(matches!(outcome, Err(EngineError::DeadlineExceeded)));
    }

    #[test]
    fn zero_worker_topology_is_rejected() {
        let outcome = run_job(JobConfig::new(0), |_| Ok(()));
        assert!(matches!(outcome, Err(EngineError::EmptyTopology)));
    }

    #[test]
    fn globalize_after_a_superstep_is_rejected() {
        let outcome = run_job(JobConfig::new(1), |worker| {
            let mut store = load_owned(worker, 0..4);
            worker.superstep(&mut store, |_| {})?;
            worker.globalize(&mut store)
        });
        assert!(matches!(outcome, Err(EngineError::GlobalizeAfterRun(1))));
    }
}
