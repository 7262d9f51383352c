//! pipewright - compose, validate and render CI pipelines
//!
//! ## Commands
//!
//! - `pipewright render` - Merge fragments and print the engine document
//! - `pipewright check` - Merge and validate fragments
//! - `pipewright graph` - Show `passed` dependencies between jobs
//! - `pipewright completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate two fragments as one pipeline
//! pipewright check ci/build.yaml ci/deploy.yaml
//!
//! # Render them for the engine
//! pipewright render ci/build.yaml ci/deploy.yaml -o pipeline.yml
//!
//! # Generate shell completions
//! pipewright completions bash > /etc/bash_completion.d/pipewright
//! ```
//!
//! Logging goes to stderr; set `PIPEWRIGHT_LOG=debug` for details.

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("PIPEWRIGHT_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
