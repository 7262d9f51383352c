//! `pipewright check` - Validate merged fragments
//!
//! ## Usage
//!
//! ```bash
//! pipewright check ci/build.yaml ci/deploy.yaml
//! # Exit code 0: the merged pipeline is valid
//! # Exit code 1: the first problem found is printed
//! ```

use pipewright::pipeline::ValidatedPipeline;

/// One-line summary of a validated pipeline
pub fn summarize(validated: &ValidatedPipeline, team: Option<&str>) -> String {
    let pipeline = validated.pipeline();
    let edges = validated.graph().edges().len();
    let mut summary = format!("ok: {pipeline}, {edges} passed edges");
    if let Some(team) = team {
        summary.push_str(&format!(" (team {team})"));
    }
    tracing::info!(pipeline = %pipeline.name, jobs = pipeline.jobs.len(), "pipeline is valid");
    summary
}
