//! PageRank over a directed edge list. Each round a vertex splits its score
//! evenly over its out-neighbours; the next round every vertex rebuilds its
//! score as `(1 - damping) + damping * received`. This is the unnormalised
//! formulation, so scores of vertices with no in-edges settle at
//! `1 - damping` rather than draining to zero.

use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    core::{
        aggregator::SumAggregator,
        channel::{PushCombinedChannel, SumCombiner},
        store::VertexStore,
    },
    engine::Worker,
    errors::EngineError,
    io::load_edge_list,
};

const BASE_SCORE: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRankVertex {
    pub id: u64,
    pub adj: Vec<u64>,
    pub score: f64,
}

impl PageRankVertex {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            adj: Vec::new(),
            score: BASE_SCORE,
        }
    }
}

impl crate::core::vertex::Vertex for PageRankVertex {
    type Key = u64;

    fn key(&self) -> &u64 {
        &self.id
    }
}

type RankChannel = PushCombinedChannel<PageRankVertex, f64, SumCombiner<f64>>;

/// Loads a directed edge list (weights ignored) and rebalances the vertices
/// onto their owners. Endpoints parsed by different workers are merged by
/// concatenating adjacency, so a vertex's out-edges end up complete wherever
/// its lines were read.
pub fn load_graph(
    worker: &mut Worker,
    path: impl AsRef<Path>,
) -> Result<VertexStore<PageRankVertex>, EngineError> {
    let mut store = VertexStore::new();
    let summary = load_edge_list(path, worker, |src, dst, _weight| {
        store.find_or_add(src, PageRankVertex::new).adj.push(dst);
        store.find_or_add(dst, PageRankVertex::new);
    })?;

    worker.globalize_with(&mut store, |kept, incoming| {
        kept.adj.extend(incoming.adj);
    })?;

    if worker.is_leader() {
        info!(edges = summary.parsed, "pagerank graph loaded");
    }
    Ok(store)
}

/// Runs `iters` score updates and returns the global score mass afterwards.
/// The first superstep only seeds the channel with the initial contributions;
/// scores change from the second superstep on.
pub fn page_rank(
    worker: &mut Worker,
    store: &mut VertexStore<PageRankVertex>,
    iters: usize,
    damping: f64,
) -> Result<f64, EngineError> {
    let channel = worker.create_push_combined_channel::<_, f64, SumCombiner<f64>>(store, store);
    let mass: Arc<SumAggregator<f64>> = worker.create_aggregator();

    let seed = channel.clone();
    worker.superstep(store, move |vertex| push_contribution(&seed, vertex))?;

    for round in 0..iters {
        let last = round + 1 == iters;
        let channel = channel.clone();
        let mass = mass.clone();
        worker.superstep(store, move |vertex| {
            vertex.score = (1.0 - damping) + damping * channel.get(vertex);
            if last {
                mass.update(vertex.score);
            } else {
                push_contribution(&channel, vertex);
            }
        })?;
    }
    Ok(mass.read())
}

fn push_contribution(channel: &RankChannel, vertex: &PageRankVertex) {
    if vertex.adj.is_empty() {
        return;
    }
    let share = vertex.score / vertex.adj.len() as f64;
    for dst in &vertex.adj {
        channel.push(share, *dst);
    }
}

#[cfg(test)]
mod pagerank_test {
    use std::io::Write;

    use crate::engine::{run_job, JobConfig};

    use super::*;

    fn assert_close(got: f64, want: f64) {
        assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
    }

    #[test]
    fn ring_scores_after_one_update() {
        // 1 -> 2 -> 3 -> 4 -> 1: every vertex receives exactly one full share
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1 2\n2 3\n3 4\n4 1\n").unwrap();

        let outcome = run_job(JobConfig::new(2), |worker| {
            let mut store = load_graph(worker, file.path())?;
            let mass = page_rank(worker, &mut store, 1, 0.85)?;

            for vertex in store.iter() {
                assert_close(vertex.score, 0.15 + 0.85 * 0.15);
            }
            assert_close(mass, 4.0 * 0.2775);
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn vertex_without_in_edges_settles_at_base() {
        // 5 feeds 6 but receives nothing itself
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "5 6\n").unwrap();

        let outcome = run_job(JobConfig::new(2), |worker| {
            let mut store = load_graph(worker, file.path())?;
            page_rank(worker, &mut store, 3, 0.85)?;

            if let Some(source) = store.find(&5) {
                assert_close(source.score, 0.15);
            }
            if let Some(sink) = store.find(&6) {
                assert_close(sink.score, 0.15 + 0.85 * 0.15);
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn disconnected_vertices_never_change() {
        let outcome = run_job(JobConfig::new(2), |worker| {
            let mut store = VertexStore::new();
            if worker.is_leader() {
                store.add(PageRankVertex::new(10));
                store.add(PageRankVertex::new(20));
            }
            worker.globalize(&mut store)?;
            page_rank(worker, &mut store, 5, 0.85)?;

            for vertex in store.iter() {
                assert_close(vertex.score, 0.15);
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn split_adjacency_is_merged_by_loading() {
        // out-edges of 1 sit on different lines, so with three workers they
        // are parsed by different workers and must be merged by globalize
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1 2\n1 3\n1 4\n").unwrap();

        let outcome = run_job(JobConfig::new(3), |worker| {
            let store = load_graph(worker, file.path())?;

            for vertex in store.iter() {
                assert_eq!(worker.partition().owner(&vertex.id), worker.id());
            }
            if let Some(hub) = store.find(&1) {
                let mut adj = hub.adj.clone();
                adj.sort_unstable();
                assert_eq!(adj, vec![2, 3, 4]);
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }
}
