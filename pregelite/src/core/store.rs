//! The records one worker holds, indexed by key. After a `globalize` pass
//! (see [`crate::engine::Worker::globalize`]) every record lives on exactly
//! the worker computed by the partition function, and `find` is only
//! meaningful for keys the calling worker owns.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{
    partition::{PartitionMap, WorkerId},
    vertex::Vertex,
};

pub struct VertexStore<V: Vertex> {
    records: Vec<V>,
    index: FxHashMap<V::Key, usize>,
}

impl<V: Vertex> Default for VertexStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Vertex> VertexStore<V> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, key: &V::Key) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.records[idx])
    }

    pub fn find_mut(&mut self, key: &V::Key) -> Option<&mut V> {
        match self.index.get(key).copied() {
            Some(idx) => Some(&mut self.records[idx]),
            None => None,
        }
    }

    /// Inserts a record under its own key. A duplicate key within one worker
    /// drops the record and returns `false`.
    pub fn add(&mut self, vertex: V) -> bool {
        if self.index.contains_key(vertex.key()) {
            debug!(key = ?vertex.key(), "dropping record with duplicate key");
            return false;
        }
        self.index.insert(vertex.key().clone(), self.records.len());
        self.records.push(vertex);
        true
    }

    /// Loader convenience: look the key up, inserting `init(key)` first if it
    /// is not there yet.
    pub fn find_or_add(&mut self, key: V::Key, init: impl FnOnce(V::Key) -> V) -> &mut V {
        let idx = match self.index.get(&key).copied() {
            Some(idx) => idx,
            None => {
                let idx = self.records.len();
                self.records.push(init(key.clone()));
                self.index.insert(key, idx);
                idx
            }
        };
        &mut self.records[idx]
    }

    /// Either merges `vertex` into the record already stored under its key or
    /// inserts it. Used when records for the same key arrive from peers.
    pub fn merge_or_add(&mut self, vertex: V, merge: &impl Fn(&mut V, V)) {
        match self.index.get(vertex.key()).copied() {
            Some(idx) => merge(&mut self.records[idx], vertex),
            None => {
                self.add(vertex);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.records.iter_mut()
    }

    pub(crate) fn par_iter_mut(&mut self) -> rayon::slice::IterMut<'_, V> {
        self.records.par_iter_mut()
    }

    /// Removes every record whose owner under `partition` is not `me` and
    /// returns them tagged with their destination. Keeps the index in sync.
    pub(crate) fn extract_misplaced(
        &mut self,
        partition: &PartitionMap,
        me: WorkerId,
    ) -> Vec<(WorkerId, V)> {
        let records = std::mem::take(&mut self.records);
        self.index.clear();

        let mut shipped = Vec::new();
        for vertex in records {
            let dest = partition.owner(vertex.key());
            if dest == me {
                self.index.insert(vertex.key().clone(), self.records.len());
                self.records.push(vertex);
            } else {
                shipped.push((dest, vertex));
            }
        }
        shipped
    }
}

#[cfg(test)]
mod store_test {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        id: u64,
        hits: u64,
    }

    impl Counter {
        fn new(id: u64) -> Self {
            Self { id, hits: 0 }
        }
    }

    impl Vertex for Counter {
        type Key = u64;

        fn key(&self) -> &u64 {
            &self.id
        }
    }

    #[test]
    fn add_rejects_duplicate_keys() {
        let mut store = VertexStore::new();

        assert!(store.add(Counter::new(1)));
        assert!(!store.add(Counter::new(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn find_or_add_inserts_once() {
        let mut store = VertexStore::new();

        store.find_or_add(7, Counter::new).hits += 1;
        store.find_or_add(7, Counter::new).hits += 1;

        assert_eq!(store.len(), 1);
        assert_eq!(store.find(&7).unwrap().hits, 2);
        assert!(store.find(&8).is_none());
    }

    #[test]
    fn merge_or_add_merges_existing() {
        let mut store = VertexStore::new();
        store.add(Counter { id: 3, hits: 2 });

        store.merge_or_add(Counter { id: 3, hits: 5 }, &|a, b| a.hits += b.hits);
        store.merge_or_add(Counter { id: 4, hits: 1 }, &|a, b| a.hits += b.hits);

        assert_eq!(store.find(&3).unwrap().hits, 7);
        assert_eq!(store.find(&4).unwrap().hits, 1);
    }

    #[test]
    fn extract_misplaced_keeps_owned_records() {
        let partition = PartitionMap::new(4);
        let me = 2;

        let mut store = VertexStore::new();
        for id in 0..100 {
            store.add(Counter::new(id));
        }

        let shipped = store.extract_misplaced(&partition, me);

        for (dest, v) in &shipped {
            assert_eq!(*dest, partition.owner(&v.id));
            assert_ne!(*dest, me);
        }
        for v in store.iter() {
            assert_eq!(partition.owner(&v.id), me);
        }
        assert_eq!(shipped.len() + store.len(), 100);
        // index still answers for kept records
        let kept: Vec<u64> = store.iter().map(|v| v.id).collect();
        for id in kept {
            assert!(store.find(&id).is_some());
        }
    }
}
