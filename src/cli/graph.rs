//! `pipewright graph` - Show `passed` dependencies between jobs

use pipewright::pipeline::ValidatedPipeline;
use std::fmt::Write;

/// Lists every edge as `upstream -> downstream [resource]`, then a job order
/// in which every job comes after its upstream jobs
pub fn format_graph(validated: &ValidatedPipeline) -> String {
    let graph = validated.graph();
    let mut out = String::new();

    for edge in graph.edges() {
        let _ = writeln!(out, "{} -> {} [{}]", edge.upstream, edge.downstream, edge.resource);
    }
    let _ = writeln!(out, "order: {}", graph.topological_order().join(", "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::load_pipeline;
    use crate::cli::tests::{git_validator, write_fragments};
    use tempfile::TempDir;

    #[test]
    fn test_format_graph() {
        let dir = TempDir::new().unwrap();
        let validated = load_pipeline(&write_fragments(&dir), &git_validator()).unwrap();
        assert_eq!(
            format_graph(&validated),
            "build -> deploy [repo]\norder: unit, build, deploy\n"
        );
    }
}
