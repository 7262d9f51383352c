//! Prelude module for common imports

// Re-export macros
pub use crate::{config, get, in_parallel, job, plan, put};

pub use crate::pipeline::composer::{BuildAndPublish, FanOut, Promote, build_and_publish, fan_out, merge, promote};
pub use crate::pipeline::errors::{EntityKind, PipelineError};
pub use crate::pipeline::job::{Job, JobBuilder};
pub use crate::pipeline::pipeline_def::{Group, Pipeline, PipelineBuilder};
pub use crate::pipeline::registry::{Identity, Registry};
pub use crate::pipeline::render::{Document, render};
pub use crate::pipeline::resource::{Resource, ResourceType};
pub use crate::pipeline::steps::{GetStep, ParallelGroup, PutStep, Step, TaskStep};
pub use crate::pipeline::types::{CheckInterval, Config, Validate};
pub use crate::pipeline::validator::{ValidatedPipeline, ValidationOptions, Validator, validate};
