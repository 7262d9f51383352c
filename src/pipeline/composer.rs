//! Reusable job patterns and fragment merging
//!
//! The builders here return ordinary [`Job`] values and register the
//! resources they use in the caller's [`Registry`]; they hold no state of
//! their own. A builder that fails leaves the registry untouched.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::PipelineError;
use super::job::Job;
use super::pipeline_def::{Group, Pipeline};
use super::registry::Registry;
use super::resource::Resource;
use super::steps::{ParallelGroup, Step, TaskStep};
use super::types::{Config, Validate};
use ahash::AHashMap;
use serde_json::json;
use tracing::debug;

/// Image used to build container images
pub const OCI_BUILD_TASK_IMAGE: &str = "concourse/oci-build-task";

/// Options for [`build_and_publish`]
#[derive(Debug, Clone)]
pub struct BuildAndPublish {
    job: String,
    source: Resource,
    image: Resource,
    context: Option<String>,
    build_args: Config,
    passed: Vec<String>,
    serial: bool,
}

impl BuildAndPublish {
    /// Builds `image` from the checkout of `source` in a job named `job`
    pub fn new(job: impl Into<String>, source: Resource, image: Resource) -> Self {
        Self {
            job: job.into(),
            source,
            image,
            context: None,
            build_args: Config::new(),
            passed: Vec::new(),
            serial: true,
        }
    }

    /// Build context inside the source checkout (defaults to its root)
    pub fn context(mut self, dir: impl Into<String>) -> Self {
        self.context = Some(dir.into());
        self
    }

    /// Adds a `--build-arg`
    pub fn build_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(name.into(), json!(value.into()));
        self
    }

    /// Only build source versions that passed these jobs
    pub fn passed<I, S>(mut self, jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passed.extend(jobs.into_iter().map(Into::into));
        self
    }

    /// Sets the serial flag (on by default; publishing is not concurrency-safe)
    pub fn serial(mut self, serial: bool) -> Self {
        self.serial = serial;
        self
    }
}

/// Get source, build a container image from it, then publish the image.
///
/// # Errors
///
/// Fails if either resource conflicts with one already in `registry`, or
/// if the generated job breaks a local rule.
pub fn build_and_publish(registry: &mut Registry, options: BuildAndPublish) -> Result<Job, PipelineError> {
    let source_name = options.source.name.clone();
    let image_name = options.image.name.clone();
    let mut staged = registry.clone();
    staged.register(options.source)?;
    staged.register(options.image)?;

    let context = match options.context {
        Some(dir) => format!("{source_name}/{dir}"),
        None => source_name.clone(),
    };
    let mut build = TaskStep::builder("build-image")
        .image("registry-image", Config::from([("repository".to_string(), json!(OCI_BUILD_TASK_IMAGE))]))
        .input(&source_name)
        .output("image")
        .cache("cache")
        .run("build", Vec::<String>::new())
        .param("CONTEXT", context)
        .privileged(true);
    for (name, value) in options.build_args {
        build = build.param(format!("BUILD_ARG_{name}"), value);
    }

    debug!(job = %options.job, source = %source_name, image = %image_name, "composed build-and-publish job");
    let job = Job::builder(options.job)
        .step(Step::get(&source_name).trigger(true).passed(options.passed))
        .step(build.build()?)
        .step(Step::put(&image_name).param("image", "image/image.tar"))
        .serial(options.serial)
        .build()?;
    *registry = staged;
    Ok(job)
}

/// Options for [`fan_out`]
#[derive(Debug, Clone)]
pub struct FanOut {
    job: String,
    trigger: Resource,
    tasks: Vec<TaskStep>,
    notify: Option<(Resource, Config)>,
    limit: Option<usize>,
    fail_fast: bool,
}

impl FanOut {
    /// Runs `tasks` concurrently whenever `trigger` has a new version
    pub fn new(job: impl Into<String>, trigger: Resource, tasks: Vec<TaskStep>) -> Self {
        Self {
            job: job.into(),
            trigger,
            tasks,
            notify: None,
            limit: None,
            fail_fast: false,
        }
    }

    /// Puts to `resource` with `params` once every task succeeded
    pub fn notify(mut self, resource: Resource, params: Config) -> Self {
        self.notify = Some((resource, params));
        self
    }

    /// Limits how many tasks run at once
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Aborts the other tasks as soon as one fails
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Poll a resource, fan out to N parallel tasks, then notify.
///
/// # Errors
///
/// Fails on resource conflicts, an empty task list, or an invalid task.
pub fn fan_out(registry: &mut Registry, options: FanOut) -> Result<Job, PipelineError> {
    let trigger_name = options.trigger.name.clone();
    let mut staged = registry.clone();
    staged.register(options.trigger)?;

    let mut group = ParallelGroup::new(options.tasks.into_iter().map(Step::Task).collect());
    group.fail_fast = options.fail_fast;
    group.limit = options.limit;
    let group = Step::InParallel(group);
    group.validate()?;

    let mut job = Job::builder(options.job)
        .step(Step::get(&trigger_name).trigger(true))
        .step(group);
    if let Some((resource, params)) = options.notify {
        let notify_name = resource.name.clone();
        staged.register(resource)?;
        job = job.step(Step::put(notify_name).with_params(params));
    }
    let job = job.build()?;
    *registry = staged;
    Ok(job)
}

/// Options for [`promote`]
#[derive(Debug, Clone)]
pub struct Promote {
    job: String,
    artifact: Resource,
    passed: Vec<String>,
    tasks: Vec<TaskStep>,
    target: Resource,
    target_params: Config,
}

impl Promote {
    /// Promotes versions of `artifact` that passed `upstream` into `target`
    pub fn new<I, S>(job: impl Into<String>, artifact: Resource, upstream: I, target: Resource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            job: job.into(),
            artifact,
            passed: upstream.into_iter().map(Into::into).collect(),
            tasks: Vec::new(),
            target,
            target_params: Config::new(),
        }
    }

    /// Runs a task between the get and the put
    pub fn task(mut self, task: TaskStep) -> Self {
        self.tasks.push(task);
        self
    }

    /// Params for the final put
    pub fn target_params(mut self, params: Config) -> Self {
        self.target_params = params;
        self
    }
}

/// Get an artifact that passed upstream jobs, run tasks on it, put it to a target.
///
/// # Errors
///
/// Fails on resource conflicts or an invalid generated job.
pub fn promote(registry: &mut Registry, options: Promote) -> Result<Job, PipelineError> {
    let artifact_name = options.artifact.name.clone();
    let target_name = options.target.name.clone();
    let mut staged = registry.clone();
    staged.register(options.artifact)?;
    staged.register(options.target)?;

    let job = Job::builder(options.job)
        .step(Step::get(artifact_name).trigger(true).passed(options.passed))
        .steps(options.tasks.into_iter().map(Step::Task).collect())
        .step(Step::put(target_name).with_params(options.target_params))
        .serial(true)
        .build()?;
    *registry = staged;
    Ok(job)
}

/// Merges pipeline fragments into one pipeline.
///
/// Resource types, resources and jobs are registered in a shared
/// [`Registry`]: identical duplicates collapse, conflicting ones fail.
/// Jobs keep each fragment's order, fragments are concatenated in turn.
/// Groups with the same name are unioned. The name of the first fragment
/// is kept. The result is not validated.
///
/// # Errors
///
/// Returns [`PipelineError::DuplicateResource`] for the first conflicting
/// declaration, including two different jobs sharing a name.
pub fn merge<I>(fragments: I) -> Result<Pipeline, PipelineError>
where
    I: IntoIterator<Item = Pipeline>,
{
    let mut registry = Registry::new();
    let mut name: Option<String> = None;
    let mut groups: Vec<Group> = Vec::new();
    let mut group_index: AHashMap<String, usize> = AHashMap::new();
    let mut count = 0usize;

    for fragment in fragments {
        count += 1;
        debug!(fragment = %fragment.name, jobs = fragment.jobs.len(), "merging fragment");
        name.get_or_insert(fragment.name);

        for rt in fragment.resource_types {
            registry.register(rt)?;
        }
        for resource in fragment.resources {
            registry.register(resource)?;
        }
        for job in fragment.jobs {
            registry.register(job)?;
        }
        for group in fragment.groups {
            match group_index.get(&group.name) {
                Some(&position) => {
                    let merged = &mut groups[position];
                    for job in group.jobs {
                        if !merged.jobs.contains(&job) {
                            merged.jobs.push(job);
                        }
                    }
                }
                None => {
                    group_index.insert(group.name.clone(), groups.len());
                    groups.push(group);
                }
            }
        }
    }

    debug!(fragments = count, entities = registry.len(), "merged fragments");
    let (resource_types, resources, jobs) = registry.into_parts();
    Ok(Pipeline {
        name: name.unwrap_or_default(),
        resource_types,
        resources,
        jobs,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::errors::EntityKind;
    use crate::pipeline::resource::ResourceType;
    use crate::pipeline::validator::{ValidationOptions, Validator, validate};
    use pretty_assertions::assert_eq;

    fn repo() -> Resource {
        Resource::new("repo", "git").source_entry("uri", "https://example.com/app.git")
    }

    fn image() -> Resource {
        Resource::new("app-image", "registry-image")
            .source_entry("repository", "example/app")
            .source_entry("password", "((registry.password))")
    }

    fn check(name: &str) -> TaskStep {
        let url = format!("https://{name}.example.com/health");
        TaskStep::builder(name)
            .run("curl", ["-f".to_string(), url])
            .build()
            .unwrap()
    }

    fn base_types() -> Validator {
        Validator::new(ValidationOptions {
            base_resource_types: vec!["git".to_string(), "registry-image".to_string(), "time".to_string()],
        })
    }

    #[test]
    fn test_build_and_publish_shape() {
        let mut registry = Registry::new();
        let job = build_and_publish(
            &mut registry,
            BuildAndPublish::new("publish", repo(), image())
                .context("docker")
                .build_arg("VERSION", "1.2.3"),
        )
        .unwrap();

        assert_eq!(registry.resources().len(), 2);
        assert_eq!(job.plan.len(), 3);
        assert!(job.serial);
        assert!(job.puts("app-image"));
        let Step::Task(task) = &job.plan[1] else {
            panic!("expected a task step");
        };
        assert_eq!(task.inputs, vec!["repo".to_string()]);
        assert_eq!(task.params["CONTEXT"], json!("repo/docker"));
        assert_eq!(task.params["BUILD_ARG_VERSION"], json!("1.2.3"));
        assert!(task.privileged);
    }

    #[test]
    fn test_fan_out_keeps_parallel_group() {
        let mut registry = Registry::new();
        let job = fan_out(
            &mut registry,
            FanOut::new(
                "health",
                Resource::new("every-5m", "time").source_entry("interval", "5m"),
                vec![check("api"), check("web"), check("worker")],
            )
            .notify(
                Resource::new("alerts", "git"),
                Config::from([("text".to_string(), json!("all healthy"))]),
            )
            .fail_fast(true),
        )
        .unwrap();

        assert_eq!(job.plan.len(), 3);
        match &job.plan[1] {
            Step::InParallel(group) => {
                assert_eq!(group.steps.len(), 3);
                assert!(group.fail_fast);
            }
            other => panic!("expected parallel group, got {other}"),
        }
        assert!(job.puts("alerts"));
        assert_eq!(registry.resources().len(), 2);
    }

    #[test]
    fn test_fan_out_requires_tasks() {
        let mut registry = Registry::new();
        let result = fan_out(&mut registry, FanOut::new("empty", repo(), Vec::new()));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_builder_leaves_registry_untouched() {
        let mut registry = Registry::new();
        registry.register(image()).unwrap();

        let conflicting = Resource::new("app-image", "registry-image").source_entry("repository", "other/app");
        let err = build_and_publish(&mut registry, BuildAndPublish::new("publish", repo(), conflicting));
        assert!(err.is_err());
        assert!(registry.resource("repo").is_none());
        assert_eq!(registry.len(), 1);

        let err = promote(&mut registry, Promote::new("", repo(), ["publish"], image()));
        assert!(err.is_err());
        assert!(registry.resource("repo").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_composed_pipeline_validates() {
        let mut registry = Registry::new();
        let publish = build_and_publish(&mut registry, BuildAndPublish::new("publish", repo(), image())).unwrap();
        let release = promote(
            &mut registry,
            Promote::new(
                "release",
                image(),
                ["publish"],
                Resource::new("prod-image", "registry-image").source_entry("repository", "example/app-prod"),
            )
            .task(check("smoke")),
        )
        .unwrap();

        let pipeline = Pipeline::builder("app")
            .registry(&registry)
            .job(publish)
            .job(release)
            .build()
            .unwrap();
        assert_eq!(pipeline.resources.len(), 3);

        let validated = base_types().validate(pipeline).unwrap();
        assert_eq!(validated.graph().topological_order(), vec!["publish", "release"]);
    }

    #[test]
    fn test_shared_resource_collapses_across_builders() {
        let mut registry = Registry::new();
        build_and_publish(&mut registry, BuildAndPublish::new("a", repo(), image())).unwrap();
        fan_out(&mut registry, FanOut::new("b", repo(), vec![check("x")])).unwrap();
        assert_eq!(registry.resources().iter().filter(|r| r.name == "repo").count(), 1);
    }

    #[test]
    fn test_conflicting_resource_across_builders() {
        let mut registry = Registry::new();
        build_and_publish(&mut registry, BuildAndPublish::new("a", repo(), image())).unwrap();
        let other_repo = Resource::new("repo", "git").source_entry("uri", "https://example.com/other.git");
        let err = fan_out(&mut registry, FanOut::new("b", other_repo, vec![check("x")])).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateResource { .. }));
    }

    #[test]
    fn test_merge_dedups_and_concatenates() {
        let first = Pipeline::builder("app")
            .resource_type(ResourceType::new("git", "registry-image"))
            .resource(repo())
            .job(Job::new("a1", vec![Step::get("repo").into()]))
            .job(Job::new("a2", vec![Step::get("repo").into()]))
            .group(Group::new("main", ["a1"]))
            .build_fragment()
            .unwrap();
        let second = Pipeline::builder("other")
            .resource_type(ResourceType::new("git", "registry-image"))
            .resource(repo())
            .job(Job::new("b1", vec![Step::get("repo").passed(["a2"]).into()]))
            .group(Group::new("main", ["b1", "a1"]))
            .build_fragment()
            .unwrap();

        let merged = merge([first, second]).unwrap();
        assert_eq!(merged.name, "app");
        assert_eq!(merged.resource_types.len(), 1);
        assert_eq!(merged.resources.len(), 1);
        let jobs: Vec<_> = merged.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(jobs, vec!["a1", "a2", "b1"]);
        assert_eq!(merged.groups, vec![Group::new("main", ["a1", "b1"])]);
        assert!(validate(merged).is_ok());
    }

    #[test]
    fn test_merge_conflicting_resource() {
        let first = Pipeline::builder("a").resource(repo()).build_fragment().unwrap();
        let second = Pipeline::builder("b")
            .resource(Resource::new("repo", "git").source_entry("uri", "https://elsewhere"))
            .build_fragment()
            .unwrap();
        match merge([first, second]).unwrap_err() {
            PipelineError::DuplicateResource {
                kind,
                existing,
                incoming,
                ..
            } => {
                assert_eq!(kind, EntityKind::Resource);
                assert_eq!(existing["source"]["uri"], "https://example.com/app.git");
                assert_eq!(incoming["source"]["uri"], "https://elsewhere");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_merge_conflicting_jobs() {
        let first = Pipeline::builder("a")
            .job(Job::new("build", vec![Step::get("repo").into()]))
            .build_fragment()
            .unwrap();
        let second = Pipeline::builder("b")
            .job(Job::new("build", vec![Step::put("repo").into()]))
            .build_fragment()
            .unwrap();
        assert!(matches!(
            merge([first, second]),
            Err(PipelineError::DuplicateResource {
                kind: EntityKind::Job,
                ..
            })
        ));
    }

    #[test]
    fn test_merge_identical_jobs_collapse() {
        let fragment = Pipeline::builder("a")
            .resource(repo())
            .job(Job::new("build", vec![Step::get("repo").into()]))
            .build_fragment()
            .unwrap();
        let merged = merge([fragment.clone(), fragment]).unwrap();
        assert_eq!(merged.jobs.len(), 1);
    }

    #[test]
    fn test_merge_nothing() {
        let merged = merge(Vec::<Pipeline>::new()).unwrap();
        assert!(merged.jobs.is_empty());
        assert!(validate(merged).is_err());
    }
}
