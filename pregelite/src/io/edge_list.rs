//! Whitespace-separated edge list loading, split across workers by line
//! number so every worker reads the same file but parses a disjoint slice.
//! Endpoints land wherever the reading worker happens to be; run a globalize
//! pass afterwards to move them to their owners.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use tracing::{debug, warn};

use crate::{engine::Worker, errors::EngineError};

/// What a loader saw: lines assigned to this worker, edges parsed, and lines
/// skipped as malformed (blank lines and `#` comments count as neither).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub lines: usize,
    pub parsed: usize,
    pub skipped: usize,
}

/// Reads this worker's share of an edge list, calling `edge` once per parsed
/// `src dst [weight]` line. A missing weight field defaults to 1.0.
pub fn load_edge_list<P, F>(
    path: P,
    worker: &Worker,
    mut edge: F,
) -> Result<LoadSummary, EngineError>
where
    P: AsRef<Path>,
    F: FnMut(u64, u64, f64),
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| EngineError::InputNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let mut summary = LoadSummary::default();
    let mut assigned = 0usize;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line_no % worker.num_workers() != worker.id() {
            continue;
        }
        assigned += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        summary.lines += 1;

        match parse_edge(trimmed) {
            Some((src, dst, weight)) => {
                summary.parsed += 1;
                edge(src, dst, weight);
            }
            None => {
                summary.skipped += 1;
                warn!(line = line_no + 1, content = %trimmed, "skipping malformed edge");
            }
        }
    }

    debug!(
        worker = worker.id(),
        path = %path.display(),
        assigned,
        parsed = summary.parsed,
        skipped = summary.skipped,
        "edge list loaded"
    );
    Ok(summary)
}

fn parse_edge(line: &str) -> Option<(u64, u64, f64)> {
    let mut fields = line.split_whitespace();
    let src = fields.next()?.parse().ok()?;
    let dst = fields.next()?.parse().ok()?;
    let weight = match fields.next() {
        Some(raw) => raw.parse().ok()?,
        None => 1.0,
    };
    if fields.next().is_some() {
        return None;
    }
    Some((src, dst, weight))
}

#[cfg(test)]
mod edge_list_test {
    use std::io::Write;

    use crate::engine::{run_job, JobConfig};

    use super::*;

    fn graph_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_weighted_and_unweighted_lines() {
        assert_eq!(parse_edge("1 2"), Some((1, 2, 1.0)));
        assert_eq!(parse_edge("1 2 0.5"), Some((1, 2, 0.5)));
        assert_eq!(parse_edge("1"), None);
        assert_eq!(parse_edge("1 two"), None);
        assert_eq!(parse_edge("1 2 3 4"), None);
    }

    #[test]
    fn workers_read_disjoint_slices_covering_the_file() {
        let file = graph_file("1 2\n2 3\n# a comment\n3 4\n\nbogus line\n4 1 2.5\n");

        let outcome = run_job(JobConfig::new(3), |worker| {
            let mut edges = Vec::new();
            let summary = load_edge_list(file.path(), worker, |src, dst, w| {
                edges.push((src, dst, w));
            })?;

            assert_eq!(summary.parsed, edges.len());
            for (src, dst, _) in &edges {
                assert!(*src >= 1 && *dst >= 1);
            }
            // line numbering decides the split, so each edge is read once
            for (line, expected) in [(0, (1, 2, 1.0)), (3, (3, 4, 1.0)), (6, (4, 1, 2.5))] {
                let mine = line % worker.num_workers() == worker.id();
                assert_eq!(edges.contains(&expected), mine, "line {line}");
            }
            Ok(())
        });
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn missing_file_reports_the_path() {
        let outcome = run_job(JobConfig::new(1), |worker| {
            load_edge_list("/no/such/graph.txt", worker, |_, _, _| {}).map(|_| ())
        });
        assert!(matches!(
            outcome,
            Err(crate::errors::EngineError::InputNotFound { path, .. })
                if path.to_string_lossy().ends_with("graph.txt")
        ));
    }
}
