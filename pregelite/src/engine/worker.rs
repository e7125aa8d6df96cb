use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

use crate::{
    core::{
        agg::Accumulator,
        aggregator::{Aggregator, SumAggregator},
        channel::{BroadcastChannel, Combiner, Message, PushCombinedChannel},
        codec,
        partition::{PartitionMap, WorkerId},
        store::VertexStore,
        vertex::{Vertex, VertexKey},
        StateType,
    },
    errors::EngineError,
};

use super::{
    config::JobConfig,
    topology::{Exchange, Mesh, Packet},
    POOL,
};

/// Returned by the closure given to [`Worker::iterate`]: whether this vertex
/// still wants another round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Loading,
    Partitioning,
    Running,
    Finished,
}

/// One worker's view of the job: its id, the mesh connecting it to its
/// peers, and the channels and aggregators it has registered for flushing at
/// each superstep boundary.
///
/// The same job closure runs on every worker, so channels, aggregators and
/// globalize passes are created in the same order everywhere; that order is
/// what routes their traffic (each creation takes the next tag from a
/// per-worker counter). Creating them under `if worker.id() == ...` style
/// conditions breaks the job.
pub struct Worker {
    id: WorkerId,
    mesh: Arc<Mesh>,
    config: Arc<JobConfig>,
    partition: PartitionMap,
    next_tag: u32,
    exchangers: Vec<Arc<dyn Exchange>>,
    superstep: usize,
    phase: JobPhase,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, mesh: Arc<Mesh>, config: Arc<JobConfig>) -> Self {
        let partition = PartitionMap::new(mesh.workers());
        Self {
            id,
            mesh,
            config,
            partition,
            next_tag: 0,
            exchangers: Vec::new(),
            superstep: 0,
            phase: JobPhase::Loading,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn num_workers(&self) -> usize {
        self.mesh.workers()
    }

    /// Worker 0; the conventional place for once-per-job log lines.
    pub fn is_leader(&self) -> bool {
        self.id == 0
    }

    pub fn partition(&self) -> PartitionMap {
        self.partition
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// The current superstep, starting at 0.
    pub fn superstep_index(&self) -> usize {
        self.superstep
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub(crate) fn finish(&mut self) {
        self.phase = JobPhase::Finished;
        debug!(worker = self.id, supersteps = self.superstep, "worker finished");
    }

    fn alloc_tag(&mut self) -> u32 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    /// A push channel with server-side combining, bound to a source and a
    /// target store (pass the same store twice for the usual push-to-self
    /// pattern). Registered for flushing at every superstep of this worker.
    pub fn create_push_combined_channel<V, M, C>(
        &mut self,
        _source: &VertexStore<V>,
        _target: &VertexStore<V>,
    ) -> Arc<PushCombinedChannel<V, M, C>>
    where
        V: Vertex,
        M: Message,
        C: Combiner<M>,
    {
        let channel = Arc::new(PushCombinedChannel::new(self.alloc_tag(), self.partition));
        self.exchangers.push(channel.clone());
        channel
    }

    /// A publish/lookup channel replicated to every worker.
    pub fn create_broadcast_channel<K, T>(&mut self) -> Arc<BroadcastChannel<K, T>>
    where
        K: VertexKey,
        T: Message,
    {
        let channel = Arc::new(BroadcastChannel::new(self.alloc_tag()));
        self.exchangers.push(channel.clone());
        channel
    }

    /// A global reduction merged across workers at every superstep barrier.
    pub fn create_aggregator<A, IN, OUT, ACC>(&mut self) -> Arc<Aggregator<A, IN, OUT, ACC>>
    where
        A: StateType + Serialize + DeserializeOwned,
        IN: 'static,
        OUT: 'static,
        ACC: Accumulator<A, IN, OUT> + 'static,
    {
        let aggregator = Arc::new(Aggregator::new(self.alloc_tag()));
        self.exchangers.push(aggregator.clone());
        aggregator
    }

    /// Rebalances `store` so that every record ends up on the worker the
    /// partition function computes for its key. An all-workers operation and
    /// itself a barrier: no superstep touching the store may start before
    /// every worker finished it. Records arriving for a key this worker
    /// already holds are merged with `merge`.
    pub fn globalize_with<V, F>(
        &mut self,
        store: &mut VertexStore<V>,
        merge: F,
    ) -> Result<(), EngineError>
    where
        V: Vertex,
        F: Fn(&mut V, V),
    {
        if self.phase == JobPhase::Running {
            return Err(EngineError::GlobalizeAfterRun(self.superstep));
        }
        self.phase = JobPhase::Partitioning;

        let tag = self.alloc_tag();
        let shipped = store.extract_misplaced(&self.partition, self.id);

        let mut by_dest: FxHashMap<WorkerId, Vec<V>> = FxHashMap::default();
        for (dest, vertex) in shipped {
            by_dest.entry(dest).or_default().push(vertex);
        }
        let outgoing = by_dest.values().map(Vec::len).sum::<usize>();

        for (dest, batch) in by_dest {
            self.mesh
                .deposit(dest, Packet::new(tag, self.id, codec::encode(&batch)?));
        }
        self.mesh.wait()?;

        let mut incoming = 0;
        for packet in self.mesh.drain(self.id) {
            debug_assert_eq!(packet.tag, tag);
            let batch: Vec<V> = codec::decode(&packet.bytes)?;
            incoming += batch.len();
            for vertex in batch {
                store.merge_or_add(vertex, &merge);
            }
        }
        self.mesh.wait()?;

        debug!(
            worker = self.id,
            shipped = outgoing,
            received = incoming,
            owned = store.len(),
            "globalize complete"
        );
        Ok(())
    }

    /// [`Self::globalize_with`] with a keep-first policy: a record arriving
    /// for a key this worker already holds is dropped. Use `globalize_with`
    /// when loaders may create the same vertex on several workers.
    pub fn globalize<V: Vertex>(&mut self, store: &mut VertexStore<V>) -> Result<(), EngineError> {
        self.globalize_with(store, |kept, incoming| {
            trace!(key = ?incoming.key(), "dropping duplicate record in globalize: {:?}", kept.key());
        })
    }

    /// One superstep: applies `apply` to every vertex this worker owns, then
    /// flushes every registered channel and aggregator, barriers, swaps
    /// inbound state, and barriers again so no worker races ahead into the
    /// next round's sends.
    ///
    /// The closure runs on the shared thread pool; distinct vertices must not
    /// share mutable state beyond the channels, whose buffers are safe to
    /// push into concurrently.
    pub fn superstep<V, F>(
        &mut self,
        store: &mut VertexStore<V>,
        apply: F,
    ) -> Result<(), EngineError>
    where
        V: Vertex,
        F: Fn(&mut V) + Send + Sync,
    {
        self.phase = JobPhase::Running;
        trace!(worker = self.id, superstep = self.superstep, "applying");

        POOL.install(|| store.par_iter_mut().for_each(|vertex| apply(vertex)));

        self.exchange()?;
        self.superstep += 1;
        Ok(())
    }

    /// Runs supersteps of `apply` until `max_steps` is reached or no vertex
    /// anywhere voted [`Step::Continue`] in the last round. The vote travels
    /// through an internal sum aggregator, so every worker stops at the same
    /// round. Returns the number of rounds run.
    pub fn iterate<V, F>(
        &mut self,
        store: &mut VertexStore<V>,
        max_steps: usize,
        apply: F,
    ) -> Result<usize, EngineError>
    where
        V: Vertex,
        F: Fn(&mut V, usize) -> Step + Send + Sync,
    {
        let votes: Arc<SumAggregator<u64>> = self.create_aggregator();

        let mut rounds = 0;
        for step in 0..max_steps {
            let votes_ref = &votes;
            let apply_ref = &apply;
            self.superstep(store, move |vertex| {
                if apply_ref(vertex, step) == Step::Continue {
                    votes_ref.update(1);
                }
            })?;
            rounds += 1;

            if votes.read() == 0 {
                break;
            }
        }
        Ok(rounds)
    }

    /// Flush, barrier, ingest, barrier. The first barrier makes round *i*'s
    /// traffic complete before anyone reads it; the second keeps round
    /// *i+1*'s sends out of mailboxes someone is still draining.
    fn exchange(&mut self) -> Result<(), EngineError> {
        for exchanger in &self.exchangers {
            exchanger.send(&self.mesh, self.id)?;
        }
        self.mesh.wait()?;

        let mut by_tag: FxHashMap<u32, Vec<Vec<u8>>> = FxHashMap::default();
        for packet in self.mesh.drain(self.id) {
            by_tag.entry(packet.tag).or_default().push(packet.bytes);
        }
        for exchanger in &self.exchangers {
            exchanger.ingest(by_tag.remove(&exchanger.tag()).unwrap_or_default())?;
        }
        self.mesh.wait()?;
        Ok(())
    }
}
