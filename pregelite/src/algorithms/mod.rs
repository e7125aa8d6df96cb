pub mod pagerank;
pub mod semi_clustering;
