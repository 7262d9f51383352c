//! # Pipewright - typed pipeline definitions for a resource-oriented CI engine
//!
//! Pipewright builds continuous-delivery pipelines out of typed resources,
//! jobs and steps, merges reusable fragments without duplicating shared
//! resources, validates the resulting job graph and renders the declarative
//! YAML document the orchestration engine consumes.
//!
//! ## Quick Start
//!
//! ```
//! use pipewright::prelude::*;
//!
//! let pipeline = Pipeline::builder("app")
//!     .resource(Resource::new("repo", "git").source_entry("uri", "https://example.com/app.git"))
//!     .job(Job::new("test", plan![get!("repo", trigger)]))
//!     .build()
//!     .unwrap();
//!
//! let validated = Validator::new(ValidationOptions {
//!     base_resource_types: vec!["git".to_string()],
//! })
//! .validate(pipeline)
//! .unwrap();
//! let yaml = render(&validated).to_yaml().unwrap();
//! assert!(yaml.contains("name: test"));
//! ```
//!
//! ## Features
//!
//! - **Typed entities**: resources, resource types, jobs and steps with local checks
//! - **Deduplication**: identical declarations collapse, conflicting ones fail loudly
//! - **Composition**: reusable job builders and fragment merging
//! - **Validation**: reference resolution, `passed` cycle detection, placeholder checks
//! - **Deterministic output**: the same input always renders the same document

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod macros;

pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

#[doc(hidden)]
pub use serde_json;

// Re-export commonly used types
pub use infrastructure::{Config, OutputFormat, init_logging};
pub use pipeline::{
    Document, Job, Pipeline, PipelineBuilder, PipelineError, Registry, Resource, ResourceType, Step,
    ValidatedPipeline, ValidationOptions, Validator, merge, render, validate,
};

/// Version of the pipewright crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
