use std::marker::PhantomData;

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    core::{
        codec,
        partition::{PartitionMap, WorkerId},
        vertex::Vertex,
    },
    engine::topology::{Exchange, Mesh, Packet},
    errors::EngineError,
};

use super::{Combiner, Message};

/// A push channel with server-side combining, bound to a source and a target
/// store (the same store in the "push to self" pattern both observed
/// algorithms use).
///
/// `push` merges into the sending worker's outbound buffer keyed by target;
/// at the superstep exchange the buffer is partitioned by target owner,
/// shipped, and every receiving worker folds the incoming partials (its own
/// included) with the same combiner. The result is the target's inbound value
/// for the next round only.
///
/// The outbound buffer is a concurrent map, so the per-vertex apply phase may
/// push from many threads without lost updates.
pub struct PushCombinedChannel<V: Vertex, M, C> {
    tag: u32,
    partition: PartitionMap,
    outbound: DashMap<V::Key, M>,
    inbound: RwLock<FxHashMap<V::Key, M>>,
    _combiner: PhantomData<C>,
    _vertex: PhantomData<fn(V)>,
}

impl<V, M, C> PushCombinedChannel<V, M, C>
where
    V: Vertex,
    M: Message,
    C: Combiner<M>,
{
    pub(crate) fn new(tag: u32, partition: PartitionMap) -> Self {
        Self {
            tag,
            partition,
            outbound: DashMap::new(),
            inbound: RwLock::new(FxHashMap::default()),
            _combiner: PhantomData,
            _vertex: PhantomData,
        }
    }

    /// Queues `msg` for `target`, merging with anything already queued for it
    /// on this worker.
    pub fn push(&self, msg: M, target: V::Key) {
        match self.outbound.entry(target) {
            Entry::Occupied(mut entry) => C::combine(entry.get_mut(), msg),
            Entry::Vacant(entry) => {
                entry.insert(msg);
            }
        }
    }

    /// The fully combined value delivered to `vertex` by the previous round,
    /// or `M::default()` if nothing was addressed to it. Only meaningful on
    /// the worker that owns the vertex.
    pub fn get(&self, vertex: &V) -> M
    where
        M: Default,
    {
        self.get_by_key(vertex.key())
    }

    pub fn get_by_key(&self, key: &V::Key) -> M
    where
        M: Default,
    {
        self.try_get(key).unwrap_or_default()
    }

    pub fn try_get(&self, key: &V::Key) -> Option<M> {
        self.inbound.read().get(key).cloned()
    }
}

impl<V, M, C> Exchange for PushCombinedChannel<V, M, C>
where
    V: Vertex,
    M: Message,
    C: Combiner<M>,
{
    fn tag(&self) -> u32 {
        self.tag
    }

    fn send(&self, mesh: &Mesh, from: WorkerId) -> Result<(), EngineError> {
        let drained: Vec<(V::Key, M)> = self
            .outbound
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.outbound.clear();

        let mut by_dest: FxHashMap<WorkerId, Vec<(V::Key, M)>> = FxHashMap::default();
        for (key, msg) in drained {
            let dest = self.partition.owner(&key);
            by_dest.entry(dest).or_default().push((key, msg));
        }

        for (dest, batch) in by_dest {
            mesh.deposit(dest, Packet::new(self.tag, from, codec::encode(&batch)?));
        }
        Ok(())
    }

    fn ingest(&self, inbox: Vec<Vec<u8>>) -> Result<(), EngineError> {
        let mut next: FxHashMap<V::Key, M> = FxHashMap::default();
        for bytes in inbox {
            let batch: Vec<(V::Key, M)> = codec::decode(&bytes)?;
            for (key, msg) in batch {
                match next.entry(key) {
                    std::collections::hash_map::Entry::Occupied(mut entry) => {
                        C::combine(entry.get_mut(), msg)
                    }
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(msg);
                    }
                }
            }
        }
        // swap, never mutate in place: stale reads of round i are impossible
        // once round i+1 begins
        *self.inbound.write() = next;
        Ok(())
    }
}
