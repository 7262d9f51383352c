//! Pipeline definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::errors::{EntityKind, PipelineError};
use crate::pipeline::job::Job;
use crate::pipeline::registry::Registry;
use crate::pipeline::resource::{Resource, ResourceType};
use crate::pipeline::steps::Step;
use crate::pipeline::types::Validate;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cosmetic grouping of jobs in the web UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name
    pub name: String,
    /// Jobs shown in the group
    #[serde(default)]
    pub jobs: Vec<String>,
}

impl Group {
    /// Creates a group
    pub fn new<I, S>(name: impl Into<String>, jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            jobs: jobs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Main pipeline structure
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    #[serde(default)]
    pub name: String,

    /// Resource types in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,

    /// Resources in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Resource>,

    /// Jobs in declaration order
    #[serde(default)]
    pub jobs: Vec<Job>,

    /// Display groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl Pipeline {
    /// Creates a new pipeline builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Returns pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds a job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Finds a resource by name
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|resource| resource.name == name)
    }

    /// Finds a resource type by name
    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.resource_types.iter().find(|rt| rt.name == name)
    }

    /// Returns number of jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Checks that every `passed` constraint names a job of this pipeline
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UndefinedReference`] for the first unknown job.
    pub fn check_passed_references(&self) -> Result<(), PipelineError> {
        let known: AHashSet<&str> = self.jobs.iter().map(|job| job.name.as_str()).collect();
        for job in &self.jobs {
            for step in job.all_steps() {
                let Step::Get(get) = step else { continue };
                if let Some(missing) = get.passed.iter().find(|up| !known.contains(up.name())) {
                    return Err(PipelineError::UndefinedReference {
                        kind: EntityKind::Job,
                        name: missing.name().to_string(),
                        referrer: format!("passed constraint on get '{}' in job '{}'", get.resource, job.name),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline({}): {} resource types, {} resources, {} jobs",
            self.name,
            self.resource_types.len(),
            self.resources.len(),
            self.jobs.len()
        )
    }
}

/// Builder for creating pipelines
///
/// Entities are registered in an internal [`Registry`] as they are added, so
/// identical duplicates collapse and conflicts surface from [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    registry: Registry,
    groups: Vec<Group>,
    error: Option<PipelineError>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Registry::new(),
            groups: Vec::new(),
            error: None,
        }
    }

    fn record(&mut self, result: Result<(), PipelineError>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    /// Adds a resource type
    pub fn resource_type(mut self, rt: ResourceType) -> Self {
        let result = rt.validate().and_then(|()| self.registry.register(rt).map(|_| ()));
        self.record(result);
        self
    }

    /// Adds a resource
    pub fn resource(mut self, resource: Resource) -> Self {
        let result = resource
            .validate()
            .and_then(|()| self.registry.register(resource).map(|_| ()));
        self.record(result);
        self
    }

    /// Adds everything registered in a composition registry
    pub fn registry(mut self, registry: &Registry) -> Self {
        let result = self.registry.absorb(registry);
        self.record(result);
        self
    }

    /// Adds a job
    pub fn job(mut self, job: Job) -> Self {
        let result = job.validate().and_then(|()| self.registry.register(job).map(|_| ()));
        self.record(result);
        self
    }

    /// Adds multiple jobs
    pub fn jobs(self, jobs: Vec<Job>) -> Self {
        jobs.into_iter().fold(self, Self::job)
    }

    /// Adds a display group
    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    /// Builds the pipeline, resolving every `passed` constraint against its jobs
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let pipeline = self.build_fragment()?;
        pipeline.check_passed_references()?;
        Ok(pipeline)
    }

    /// Builds a partial pipeline whose `passed` constraints may name jobs
    /// declared in other fragments
    #[allow(clippy::missing_errors_doc)]
    pub fn build_fragment(self) -> Result<Pipeline, PipelineError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::Pipeline,
            });
        }

        let (resource_types, resources, jobs) = self.registry.into_parts();
        Ok(Pipeline {
            name: self.name,
            resource_types,
            resources,
            jobs,
            groups: self.groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::steps::TaskStep;

    fn unit() -> Step {
        TaskStep::builder("unit").input("repo").run("make", ["test"]).build().unwrap().into()
    }

    #[test]
    fn test_builder_collects_entities() {
        let pipeline = Pipeline::builder("app")
            .resource(Resource::new("repo", "git"))
            .job(Job::new("test", vec![Step::get("repo").trigger(true).into(), unit()]))
            .group(Group::new("all", ["test"]))
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "app");
        assert_eq!(pipeline.job_count(), 1);
        assert!(pipeline.resource("repo").is_some());
        assert!(pipeline.job("test").is_some());
        assert_eq!(
            pipeline.to_string(),
            "Pipeline(app): 0 resource types, 1 resources, 1 jobs"
        );
    }

    #[test]
    fn test_builder_dedups_identical_resources() {
        let pipeline = Pipeline::builder("app")
            .resource(Resource::new("repo", "git").source_entry("uri", "x"))
            .resource(Resource::new("repo", "git").source_entry("uri", "x"))
            .build()
            .unwrap();
        assert_eq!(pipeline.resources.len(), 1);
    }

    #[test]
    fn test_builder_reports_first_conflict() {
        let err = Pipeline::builder("app")
            .resource(Resource::new("repo", "git").source_entry("uri", "x"))
            .resource(Resource::new("repo", "git").source_entry("uri", "y"))
            .resource(Resource::new("", "git"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateResource { .. }));
    }

    #[test]
    fn test_unknown_passed_job_fails_build() {
        let err = Pipeline::builder("app")
            .resource(Resource::new("repo", "git"))
            .job(Job::new("deploy", vec![Step::get("repo").passed(["test"]).into()]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::UndefinedReference {
                kind: EntityKind::Job,
                name: "test".to_string(),
                referrer: "passed constraint on get 'repo' in job 'deploy'".to_string(),
            }
        );
    }

    #[test]
    fn test_fragment_allows_foreign_passed_jobs() {
        let fragment = Pipeline::builder("deploy-fragment")
            .job(Job::new("deploy", vec![Step::get("repo").passed(["test"]).into()]))
            .build_fragment()
            .unwrap();
        assert!(fragment.check_passed_references().is_err());
    }

    #[test]
    fn test_empty_pipeline_name() {
        assert_eq!(
            Pipeline::builder("").build(),
            Err(PipelineError::EmptyName {
                kind: EntityKind::Pipeline
            })
        );
    }

    #[test]
    fn test_invalid_job_rejected() {
        let err = Pipeline::builder("app")
            .job(Job::new("", vec![unit()]))
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyName { kind: EntityKind::Job }));
    }

    #[test]
    fn test_pipeline_yaml_round_trip() {
        let pipeline = Pipeline::builder("app")
            .resource(Resource::new("repo", "git"))
            .job(Job::new("test", vec![Step::get("repo").trigger(true).into(), unit()]))
            .build()
            .unwrap();
        let yaml = serde_yaml::to_string(&pipeline).unwrap();
        let back: Pipeline = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, pipeline);
    }
}
