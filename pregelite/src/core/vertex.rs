use std::{fmt::Debug, hash::Hash};

use serde::{de::DeserializeOwned, Serialize};

/// Capability set of a vertex key: hashable for partitioning, serializable
/// for shipping, cheap to clone for indexing. Integers in practice, but
/// nothing below depends on that.
pub trait VertexKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static> VertexKey
    for T
{
}

/// A vertex record: a unique key plus whatever serializable payload the
/// algorithm carries (adjacency and a score, neighbour weights and a cluster
/// list, ...). Records are owned by exactly one worker at a time; ownership
/// only moves during `globalize`.
pub trait Vertex: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Key: VertexKey;

    fn key(&self) -> &Self::Key;
}
