//! Pipeline domain types and logic
//!
//! Entities are declared with builders, deduplicated through a
//! [`Registry`], combined by the [`composer`] functions, checked by the
//! [`Validator`] and finally turned into a [`Document`] by [`render`].

pub mod composer;
pub mod errors;
pub mod job;
pub mod pipeline_def;
pub mod placeholder;
pub mod registry;
pub mod render;
pub mod resource;
pub mod steps;
pub mod types;
pub mod validator;


pub use composer::{BuildAndPublish, FanOut, Promote, build_and_publish, fan_out, merge, promote};
pub use errors::{EntityKind, PipelineError};
pub use job::{Job, JobBuilder};
pub use pipeline_def::{Group, Pipeline, PipelineBuilder};
pub use registry::{Entity, EntityRef, Identity, Registry};
pub use render::{Document, render};
pub use resource::{Resource, ResourceType};
pub use steps::{
    GetStep, ImageResource, JobRef, ParallelGroup, PutStep, RunCommand, Sequence, Step, TaskBuilder,
    TaskConfig, TaskStep,
};
pub use types::{CheckInterval, Config, Validate};
pub use validator::{
    DependencyEdge, DependencyGraph, ValidatedPipeline, ValidationOptions, ValidationResult, Validator,
    validate,
};
