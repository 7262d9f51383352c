//! Job types for pipeline definition
//!
//! This module defines jobs, their plans and their builder pattern.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::{EntityKind, PipelineError};
use super::steps::{ParallelGroup, Step};
use super::types::{Validate, is_false};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, ordered plan representing one schedulable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job name
    pub name: String,

    /// Steps in execution order; parallel intent lives in `Step::InParallel`
    #[serde(default)]
    pub plan: Vec<Step>,

    /// At most one build of this job runs at a time
    #[serde(default, skip_serializing_if = "is_false")]
    pub serial: bool,

    /// Jobs sharing a serial group never run concurrently with each other
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub serial_groups: Vec<String>,

    /// Upper bound on concurrent builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<u32>,

    /// Build logs are visible without authentication
    #[serde(default, skip_serializing_if = "is_false")]
    pub public: bool,

    /// Number of build logs the engine keeps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_logs_to_retain: Option<u32>,

    /// Runs after the plan succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<Step>>,

    /// Runs after the plan fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Box<Step>>,

    /// Runs after the build is aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_abort: Option<Box<Step>>,

    /// Runs after the plan regardless of outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure: Option<Box<Step>>,
}

impl Job {
    /// Creates a job with the given plan
    pub fn new(name: impl Into<String>, plan: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            plan,
            serial: false,
            serial_groups: Vec::new(),
            max_in_flight: None,
            public: false,
            build_logs_to_retain: None,
            on_success: None,
            on_failure: None,
            on_abort: None,
            ensure: None,
        }
    }

    /// Creates a job builder
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    /// Hook steps that are set, in `on_success`, `on_failure`, `on_abort`, `ensure` order
    pub fn hooks(&self) -> impl Iterator<Item = &Step> {
        [&self.on_success, &self.on_failure, &self.on_abort, &self.ensure]
            .into_iter()
            .filter_map(|hook| hook.as_deref())
    }

    /// Every step of the plan and hooks, nested steps included
    pub fn all_steps(&self) -> Vec<&Step> {
        let mut steps = Vec::new();
        for step in self.plan.iter().chain(self.hooks()) {
            step.collect(&mut steps);
        }
        steps
    }

    /// Returns true if any step puts to the resource
    pub fn puts(&self, resource: &str) -> bool {
        self.all_steps()
            .iter()
            .any(|step| matches!(step, Step::Put(put) if put.resource == resource))
    }
}

impl Validate for Job {
    type Error = PipelineError;

    /// Local rules only; an empty plan is reported by the pipeline validator.
    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::Job,
            });
        }

        if self.max_in_flight == Some(0) {
            return Err(PipelineError::invalid(
                EntityKind::Job,
                &self.name,
                "max_in_flight must be at least 1",
            ));
        }

        if self.serial && self.max_in_flight.is_some_and(|max| max > 1) {
            return Err(PipelineError::invalid(
                EntityKind::Job,
                &self.name,
                "a serial job cannot allow more than one build in flight",
            ));
        }

        if self.serial_groups.iter().any(|group| group.trim().is_empty()) {
            return Err(PipelineError::invalid(
                EntityKind::Job,
                &self.name,
                "serial group name cannot be empty",
            ));
        }

        for step in self.plan.iter().chain(self.hooks()) {
            step.validate()?;
        }

        Ok(())
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({}): {} steps", self.name, self.plan.len())
    }
}

/// Builder for creating jobs
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    /// Creates a new job builder with an empty plan
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            job: Job::new(name, Vec::new()),
        }
    }

    /// Appends a step to the plan
    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.job.plan.push(step.into());
        self
    }

    /// Appends multiple steps to the plan
    pub fn steps(mut self, mut steps: Vec<Step>) -> Self {
        self.job.plan.append(&mut steps);
        self
    }

    /// Appends a parallel group to the plan
    pub fn in_parallel(mut self, steps: Vec<Step>) -> Self {
        self.job.plan.push(Step::InParallel(ParallelGroup::new(steps)));
        self
    }

    /// Sets the serial flag
    pub fn serial(mut self, serial: bool) -> Self {
        self.job.serial = serial;
        self
    }

    /// Adds the job to a serial group
    pub fn serial_group(mut self, group: impl Into<String>) -> Self {
        self.job.serial_groups.push(group.into());
        self
    }

    /// Limits concurrent builds
    pub fn max_in_flight(mut self, max: u32) -> Self {
        self.job.max_in_flight = Some(max);
        self
    }

    /// Sets the public flag
    pub fn public(mut self, public: bool) -> Self {
        self.job.public = public;
        self
    }

    /// Sets how many build logs are retained
    pub fn build_logs_to_retain(mut self, builds: u32) -> Self {
        self.job.build_logs_to_retain = Some(builds);
        self
    }

    /// Sets the success hook
    pub fn on_success(mut self, step: impl Into<Step>) -> Self {
        self.job.on_success = Some(Box::new(step.into()));
        self
    }

    /// Sets the failure hook
    pub fn on_failure(mut self, step: impl Into<Step>) -> Self {
        self.job.on_failure = Some(Box::new(step.into()));
        self
    }

    /// Sets the abort hook
    pub fn on_abort(mut self, step: impl Into<Step>) -> Self {
        self.job.on_abort = Some(Box::new(step.into()));
        self
    }

    /// Sets the ensure hook
    pub fn ensure(mut self, step: impl Into<Step>) -> Self {
        self.job.ensure = Some(Box::new(step.into()));
        self
    }

    /// Builds the job, enforcing its local rules
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Job, PipelineError> {
        self.job.validate()?;
        Ok(self.job)
    }

    /// Builds the job without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> Job {
        self.job
    }
}
