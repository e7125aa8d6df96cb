use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    core::{codec, partition::WorkerId, vertex::VertexKey},
    engine::topology::{Exchange, Mesh, Packet},
    errors::EngineError,
};

use super::Message;

/// Publish/lookup channel: `broadcast` publishes one value per key to every
/// worker at the next exchange, `get` reads the local replica. No combining
/// happens; within one exchange the last writer wins per key, so publish each
/// key once per job phase if that matters.
///
/// Unlike [`super::PushCombinedChannel`] the replica is not round-scoped: it
/// accumulates across rounds, which is what read-mostly neighbour-state
/// lookups want.
pub struct BroadcastChannel<K: VertexKey, T> {
    tag: u32,
    outbound: DashMap<K, T>,
    table: RwLock<FxHashMap<K, T>>,
}

impl<K, T> BroadcastChannel<K, T>
where
    K: VertexKey,
    T: Message,
{
    pub(crate) fn new(tag: u32) -> Self {
        Self {
            tag,
            outbound: DashMap::new(),
            table: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn broadcast(&self, key: K, value: T) {
        self.outbound.insert(key, value);
    }

    /// Latest published value for `key` visible to this worker.
    pub fn get(&self, key: &K) -> Option<T> {
        self.table.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl<K, T> Exchange for BroadcastChannel<K, T>
where
    K: VertexKey,
    T: Message,
{
    fn tag(&self) -> u32 {
        self.tag
    }

    fn send(&self, mesh: &Mesh, from: WorkerId) -> Result<(), EngineError> {
        let drained: Vec<(K, T)> = self
            .outbound
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.outbound.clear();

        if drained.is_empty() {
            return Ok(());
        }

        let bytes = codec::encode(&drained)?;
        for dest in 0..mesh.workers() {
            mesh.deposit(dest, Packet::new(self.tag, from, bytes.clone()));
        }
        Ok(())
    }

    fn ingest(&self, inbox: Vec<Vec<u8>>) -> Result<(), EngineError> {
        if inbox.is_empty() {
            return Ok(());
        }
        let mut table = self.table.write();
        for bytes in inbox {
            let batch: Vec<(K, T)> = codec::decode(&bytes)?;
            table.extend(batch);
        }
        Ok(())
    }
}
