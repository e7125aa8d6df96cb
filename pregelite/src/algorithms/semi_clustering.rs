//! Semi-clustering over an undirected weighted graph. A semi-cluster is a
//! small vertex set scored by how much edge weight it keeps inside versus
//! what leaks over its boundary; vertices grow candidate clusters by gossiping
//! their best ones to their neighbours each round, and a final reduction picks
//! the best clusters globally.

use std::{path::Path, sync::Arc};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    core::{
        agg::VecDef,
        aggregator::Aggregator,
        channel::{PushCombinedChannel, UnionCombiner},
        store::VertexStore,
        vertex::Vertex,
    },
    engine::{JobConfig, Worker},
    errors::EngineError,
    io::load_edge_list,
};

/// A candidate cluster: its sorted member set, the total weight of edges
/// inside it, the total weight crossing its boundary, and the score derived
/// from the two. A singleton scores 1.0 by convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemiCluster {
    pub members: Vec<u64>,
    pub inner_weight: f64,
    pub outer_weight: f64,
    pub score: f64,
}

impl SemiCluster {
    fn seed(vertex: &SemiVertex) -> Self {
        Self {
            members: vec![vertex.id],
            inner_weight: 0.0,
            outer_weight: vertex.neighbors.iter().map(|(_, w)| w).sum(),
            score: 1.0,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    /// The cluster grown by `vertex`, or `None` when the vertex is already a
    /// member or the cluster is at capacity. Edges from the vertex into the
    /// member set move from boundary to inner weight; its remaining edges
    /// extend the boundary.
    pub fn extended_with(&self, vertex: &SemiVertex, v_max: usize, f_b: f64) -> Option<Self> {
        if self.members.len() >= v_max {
            return None;
        }
        let slot = match self.members.binary_search(&vertex.id) {
            Ok(_) => return None,
            Err(slot) => slot,
        };

        let mut inner = self.inner_weight;
        let mut outer = self.outer_weight;
        for (nbr, weight) in &vertex.neighbors {
            if self.contains(*nbr) {
                inner += weight;
                outer -= weight;
            } else {
                outer += weight;
            }
        }

        let mut members = self.members.clone();
        members.insert(slot, vertex.id);
        let pairs = (members.len() * (members.len() - 1) / 2) as f64;
        Some(Self {
            members,
            inner_weight: inner,
            outer_weight: outer,
            score: (inner - f_b * outer) / pairs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemiVertex {
    pub id: u64,
    pub neighbors: Vec<(u64, f64)>,
    pub clusters: Vec<SemiCluster>,
}

impl SemiVertex {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            neighbors: Vec::new(),
            clusters: Vec::new(),
        }
    }
}

impl Vertex for SemiVertex {
    type Key = u64;

    fn key(&self) -> &u64 {
        &self.id
    }
}

/// Best-first order with duplicates (same member set) removed, then cut to
/// `keep` entries.
fn rank(clusters: &mut Vec<SemiCluster>, keep: usize) {
    clusters.sort_by(|a, b| {
        a.members
            .cmp(&b.members)
            .then_with(|| OrderedFloat(b.score).cmp(&OrderedFloat(a.score)))
    });
    clusters.dedup_by(|a, b| a.members == b.members);
    clusters.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.members.cmp(&b.members))
    });
    clusters.truncate(keep);
}

#[derive(Debug, Clone, Copy)]
pub struct SemiClusteringParams {
    /// Clusters kept per vertex, and in the final global answer.
    pub c_max: usize,
    /// Largest member set a cluster may grow to.
    pub v_max: usize,
    /// Clusters a vertex gossips to its neighbours per round.
    pub m_max: usize,
    /// Boundary penalty factor in the score.
    pub f_b: f64,
}

impl SemiClusteringParams {
    /// All four hyperparameters are required; a missing one fails the job
    /// before any worker starts.
    pub fn from_config(config: &JobConfig) -> Result<Self, EngineError> {
        Ok(Self {
            c_max: config.parsed_param("c_max")?,
            v_max: config.parsed_param("v_max")?,
            m_max: config.parsed_param("m_max")?,
            f_b: config.parsed_param("f_b")?,
        })
    }
}

type GossipChannel = PushCombinedChannel<SemiVertex, Vec<SemiCluster>, UnionCombiner<SemiCluster>>;
type ClusterUnion = Aggregator<Vec<SemiCluster>, SemiCluster, Vec<SemiCluster>, VecDef<SemiCluster>>;

/// Loads an undirected weighted edge list (self-loops dropped) and rebalances
/// the vertices onto their owners.
pub fn load_graph(
    worker: &mut Worker,
    path: impl AsRef<Path>,
) -> Result<VertexStore<SemiVertex>, EngineError> {
    let mut store = VertexStore::new();
    let summary = load_edge_list(path, worker, |src, dst, weight| {
        if src == dst {
            return;
        }
        store.find_or_add(src, SemiVertex::new).neighbors.push((dst, weight));
        store.find_or_add(dst, SemiVertex::new).neighbors.push((src, weight));
    })?;

    worker.globalize_with(&mut store, |kept, incoming| {
        kept.neighbors.extend(incoming.neighbors);
    })?;

    if worker.is_leader() {
        info!(edges = summary.parsed, "semi-clustering graph loaded");
    }
    Ok(store)
}

/// Runs `iters` gossip rounds and returns the best clusters found anywhere,
/// at most `c_max` of them. Each vertex also ends up with its own best
/// clusters in [`SemiVertex::clusters`].
pub fn semi_clustering(
    worker: &mut Worker,
    store: &mut VertexStore<SemiVertex>,
    params: SemiClusteringParams,
    iters: usize,
) -> Result<Vec<SemiCluster>, EngineError> {
    let channel: Arc<GossipChannel> = worker.create_push_combined_channel(store, store);
    let global: Arc<ClusterUnion> = worker.create_aggregator();

    let seed_channel = channel.clone();
    worker.superstep(store, move |vertex| {
        let seed = SemiCluster::seed(vertex);
        for (nbr, _) in &vertex.neighbors {
            seed_channel.push(vec![seed.clone()], *nbr);
        }
        vertex.clusters = vec![seed];
    })?;

    for _ in 0..iters {
        let channel = channel.clone();
        worker.superstep(store, move |vertex| {
            for cluster in channel.get(vertex) {
                if let Some(extended) = cluster.extended_with(vertex, params.v_max, params.f_b) {
                    vertex.clusters.push(extended);
                }
                vertex.clusters.push(cluster);
            }
            rank(&mut vertex.clusters, params.c_max);

            let outgoing: Vec<SemiCluster> =
                vertex.clusters.iter().take(params.m_max).cloned().collect();
            for (nbr, _) in &vertex.neighbors {
                channel.push(outgoing.clone(), *nbr);
            }
        })?;
    }

    let collect = global.clone();
    worker.superstep(store, move |vertex| {
        for cluster in &vertex.clusters {
            collect.update(cluster.clone());
        }
    })?;

    let mut best = global.read();
    rank(&mut best, params.c_max);
    Ok(best)
}
