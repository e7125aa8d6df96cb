//! pregelite is a partitioned, bulk-synchronous-parallel (BSP) graph compute
//! engine. Vertices are distributed across a fixed set of workers, a user
//! function runs over every owned vertex once per synchronised superstep,
//! inter-vertex messages are combined server-side before delivery, and global
//! reductions become visible to all workers at the next round's barrier.
//!
//! The building blocks are:
//! - [`core::store::VertexStore`] — the records a worker owns, plus the
//!   one-time `globalize` rebalance that moves every record to the worker
//!   computed by the partition function,
//! - [`core::channel::PushCombinedChannel`] — a per-superstep mailbox that
//!   merges same-target messages with an associative, commutative combiner,
//! - [`core::channel::BroadcastChannel`] — publish/lookup of per-key values
//!   replicated to every worker,
//! - [`core::aggregator::Aggregator`] — a round-scoped global reduction,
//! - [`engine::Worker`] — the superstep loop itself.
//!
//! ```no_run
//! use pregelite::algorithms::pagerank;
//! use pregelite::prelude::*;
//!
//! let config = JobConfig::new(4).with_param("input", "graph.txt");
//! run_job(config, |worker| {
//!     let input = worker.config().param("input")?.to_string();
//!     let mut store = pagerank::load_graph(worker, input)?;
//!     let mass = pagerank::page_rank(worker, &mut store, 10, 0.85)?;
//!     if worker.is_leader() {
//!         println!("total rank mass: {mass}");
//!     }
//!     Ok(())
//! })
//! .unwrap();
//! ```

pub mod algorithms;
pub mod core;
pub mod engine;
pub mod errors;
pub mod io;

pub mod prelude {
    pub use crate::core::{
        agg::{Accumulator, AvgDef, MaxDef, MinDef, SumDef, VecDef},
        aggregator::{Aggregator, MaxAggregator, MinAggregator, SumAggregator},
        channel::{
            BroadcastChannel, Combiner, MaxCombiner, Message, MinCombiner, PushCombinedChannel,
            SetUnionCombiner, SumCombiner, UnionCombiner,
        },
        partition::{PartitionMap, WorkerId},
        store::VertexStore,
        vertex::{Vertex, VertexKey},
    };
    pub use crate::engine::{run_job, JobConfig, JobPhase, Step, Worker};
    pub use crate::errors::EngineError;
}
