//! PageRank over a directed edge list.
//!
//! ```text
//! cargo run --example pagerank -- input=graph.txt iters=10 workers=4
//! ```
//!
//! Optional: `damping=0.85`.

use pregelite::{
    algorithms::pagerank::{load_graph, page_rank},
    prelude::*,
};

fn run() -> Result<(), EngineError> {
    let config = JobConfig::from_args(std::env::args().skip(1), &["input", "iters"])?;
    let iters: usize = config.parsed_param("iters")?;
    let damping: f64 = match config.param("damping") {
        Ok(_) => config.parsed_param("damping")?,
        Err(_) => 0.85,
    };
    let input = config.param("input")?.to_string();

    run_job(config, move |worker| {
        let mut store = load_graph(worker, &input)?;
        let mass = page_rank(worker, &mut store, iters, damping)?;

        if worker.is_leader() {
            println!("total rank mass after {iters} iterations: {mass:.6}");
        }
        for vertex in store.iter() {
            println!("{}\t{:.6}", vertex.id, vertex.score);
        }
        Ok(())
    })
}

fn main() {
    tracing_subscriber::fmt::init();
    if let Err(err) = run() {
        eprintln!("pagerank failed: {err}");
        std::process::exit(1);
    }
}
