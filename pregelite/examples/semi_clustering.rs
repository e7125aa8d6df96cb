//! Semi-clustering over an undirected weighted edge list.
//!
//! ```text
//! cargo run --example semi_clustering -- input=graph.txt iters=5 workers=4 \
//!     c_max=4 v_max=8 m_max=4 f_b=0.5
//! ```

use pregelite::{
    algorithms::semi_clustering::{load_graph, semi_clustering, SemiClusteringParams},
    prelude::*,
};

fn run() -> Result<(), EngineError> {
    let config = JobConfig::from_args(
        std::env::args().skip(1),
        &["input", "iters", "c_max", "v_max", "m_max", "f_b"],
    )?;
    let iters: usize = config.parsed_param("iters")?;
    let params = SemiClusteringParams::from_config(&config)?;
    let input = config.param("input")?.to_string();

    run_job(config, move |worker| {
        let mut store = load_graph(worker, &input)?;
        let best = semi_clustering(worker, &mut store, params, iters)?;

        if worker.is_leader() {
            for cluster in &best {
                println!(
                    "score {:.4}\tinner {:.2}\touter {:.2}\tmembers {:?}",
                    cluster.score, cluster.inner_weight, cluster.outer_weight, cluster.members
                );
            }
        }
        Ok(())
    })
}

fn main() {
    tracing_subscriber::fmt::init();
    if let Err(err) = run() {
        eprintln!("semi_clustering failed: {err}");
        std::process::exit(1);
    }
}
