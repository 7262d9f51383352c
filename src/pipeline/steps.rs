//! Step types for job plans
//!
//! A step is a single action in a job plan: fetch a resource version (`get`),
//! publish a new one (`put`), or run a unit of work (`task`). Steps can be
//! grouped with `in_parallel` to allow concurrent execution, or with `do` to
//! force a sequential sub-plan (typically inside a parallel group).

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::{EntityKind, PipelineError};
use super::types::{Config, Validate, below_resolution, is_false, optional_duration};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Reference to a job by name, used by `passed` constraints.
///
/// Resolved to a job index once, when the dependency graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRef(String);

impl JobRef {
    /// Creates a reference to the named job
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the referenced job
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for JobRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetches a version of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStep {
    /// Resource to fetch
    pub resource: String,

    /// Name the artifact is exposed under, when different from the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Resource-specific get params
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub params: Config,

    /// Start a new build when a new version appears
    #[serde(default, skip_serializing_if = "is_false")]
    pub trigger: bool,

    /// Upstream jobs whose successful builds must have used the version
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed: Vec<JobRef>,
}

impl GetStep {
    /// Creates a get step for the resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            alias: None,
            params: Config::new(),
            trigger: false,
            passed: Vec::new(),
        }
    }

    /// Exposes the artifact under another name
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets one get param
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces the get params
    pub fn with_params(mut self, params: Config) -> Self {
        self.params = params;
        self
    }

    /// Sets the trigger flag
    pub fn trigger(mut self, trigger: bool) -> Self {
        self.trigger = trigger;
        self
    }

    /// Adds upstream jobs to the `passed` constraint, keeping first occurrence order
    pub fn passed<I, J>(mut self, jobs: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: Into<JobRef>,
    {
        for job in jobs {
            let job = job.into();
            if !self.passed.contains(&job) {
                self.passed.push(job);
            }
        }
        self
    }

    /// Name the step's artifact is visible under inside the build
    pub fn artifact_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.resource)
    }
}

/// Publishes a new version of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutStep {
    /// Resource to publish to
    pub resource: String,

    /// Step name, when different from the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Restrict the artifacts streamed to the put
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<String>>,

    /// Resource-specific put params
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub params: Config,

    /// Params for the implicit get after the put
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub get_params: Config,
}

impl PutStep {
    /// Creates a put step for the resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            alias: None,
            inputs: None,
            params: Config::new(),
            get_params: Config::new(),
        }
    }

    /// Names the step differently from the resource
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Restricts the artifacts streamed to the put
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = Some(inputs.into_iter().map(Into::into).collect());
        self
    }

    /// Sets one put param
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces the put params
    pub fn with_params(mut self, params: Config) -> Self {
        self.params = params;
        self
    }

    /// Sets one param of the implicit get
    pub fn get_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.get_params.insert(key.into(), value.into());
        self
    }
}

/// Container image a task runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResource {
    /// Resource type used to fetch the image
    #[serde(rename = "type")]
    pub type_name: String,
    /// Source for that resource type
    #[serde(default)]
    pub source: Config,
}

/// Command a task executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCommand {
    /// Executable path
    pub path: String,
    /// Arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// User to run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Worker platform used when a task does not name one
pub const DEFAULT_PLATFORM: &str = "linux";

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

/// Inline task configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Worker platform
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Image the task runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_resource: Option<ImageResource>,

    /// Command to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunCommand>,

    /// Directories cached between builds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caches: Vec<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            image_resource: None,
            run: None,
            caches: Vec::new(),
        }
    }
}

/// Runs an arbitrary unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    /// Task name
    pub name: String,

    /// Inline task configuration
    #[serde(default)]
    pub config: TaskConfig,

    /// Artifacts the task consumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Artifacts the task produces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Task config file inside an artifact, instead of an inline config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Environment params for the task
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub params: Config,

    /// Run the task container privileged
    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,

    /// Abort the task after this long
    #[serde(
        default,
        with = "optional_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Total attempts before the step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl TaskStep {
    /// Creates a task builder
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name)
    }
}

impl Validate for TaskStep {
    type Error = PipelineError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::Step,
            });
        }
        if self.inputs.is_empty()
            && self.outputs.is_empty()
            && self.config.run.is_none()
            && self.file.is_none()
        {
            return Err(PipelineError::invalid(
                EntityKind::Step,
                &self.name,
                "task must declare inputs, outputs, a run command or a config file",
            ));
        }
        if let Some(run) = &self.config.run {
            if run.path.trim().is_empty() {
                return Err(PipelineError::invalid(
                    EntityKind::Step,
                    &self.name,
                    "run path cannot be empty",
                ));
            }
        }
        unique_names(&self.name, "input", &self.inputs)?;
        unique_names(&self.name, "output", &self.outputs)?;
        if self.timeout.is_some_and(below_resolution) {
            return Err(PipelineError::invalid(
                EntityKind::Step,
                &self.name,
                "timeout must be positive",
            ));
        }
        if self.attempts == Some(0) {
            return Err(PipelineError::invalid(
                EntityKind::Step,
                &self.name,
                "attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

fn unique_names(task: &str, what: &str, names: &[String]) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(PipelineError::invalid(
                EntityKind::Step,
                task,
                format!("{what} name cannot be empty"),
            ));
        }
        if !seen.insert(name) {
            return Err(PipelineError::invalid(
                EntityKind::Step,
                task,
                format!("duplicate {what} '{name}'"),
            ));
        }
    }
    Ok(())
}

/// Builder for [`TaskStep`]
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    task: TaskStep,
}

impl TaskBuilder {
    /// Creates a builder for a task with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            task: TaskStep {
                name: name.into(),
                config: TaskConfig::default(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                file: None,
                params: Config::new(),
                privileged: false,
                timeout: None,
                attempts: None,
            },
        }
    }

    /// Sets the worker platform
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.task.config.platform = platform.into();
        self
    }

    /// Sets the image the task runs in
    pub fn image(mut self, type_name: impl Into<String>, source: Config) -> Self {
        self.task.config.image_resource = Some(ImageResource {
            type_name: type_name.into(),
            source,
        });
        self
    }

    /// Sets the command to run
    pub fn run<I, S>(mut self, path: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task.config.run = Some(RunCommand {
            path: path.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            user: None,
        });
        self
    }

    /// Sets the working directory of the run command
    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        if let Some(run) = self.task.config.run.as_mut() {
            run.dir = Some(dir.into());
        }
        self
    }

    /// Adds an input artifact
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.task.inputs.push(name.into());
        self
    }

    /// Adds an output artifact
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.task.outputs.push(name.into());
        self
    }

    /// Adds a cached directory
    pub fn cache(mut self, path: impl Into<String>) -> Self {
        self.task.config.caches.push(path.into());
        self
    }

    /// Loads the task config from a file inside an artifact
    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.task.file = Some(path.into());
        self
    }

    /// Sets one task param
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.task.params.insert(key.into(), value.into());
        self
    }

    /// Runs the task privileged
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.task.privileged = privileged;
        self
    }

    /// Sets the timeout
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.task.timeout = Some(duration);
        self
    }

    /// Sets the number of attempts
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.task.attempts = Some(attempts);
        self
    }

    /// Builds the task, enforcing its local rules
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<TaskStep, PipelineError> {
        self.task.validate()?;
        Ok(self.task)
    }
}

/// Steps that may execute concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Steps of the group
    pub steps: Vec<Step>,

    /// Maximum number of steps running at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Abort the remaining steps as soon as one fails
    #[serde(default, skip_serializing_if = "is_false")]
    pub fail_fast: bool,
}

impl ParallelGroup {
    /// Creates a parallel group
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            limit: None,
            fail_fast: false,
        }
    }

    /// Limits concurrency
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enables fail-fast
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Steps that must run one after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Steps in execution order
    pub steps: Vec<Step>,
}

/// A single step in a job plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Fetch a resource version
    Get(GetStep),
    /// Publish a resource version
    Put(PutStep),
    /// Run a task
    Task(TaskStep),
    /// Run nested steps concurrently
    InParallel(ParallelGroup),
    /// Run nested steps sequentially
    Do(Sequence),
}

impl Step {
    /// Creates a get step
    pub fn get(resource: impl Into<String>) -> GetStep {
        GetStep::new(resource)
    }

    /// Creates a put step
    pub fn put(resource: impl Into<String>) -> PutStep {
        PutStep::new(resource)
    }

    /// Groups steps for concurrent execution
    pub fn in_parallel(steps: Vec<Step>) -> Self {
        Self::InParallel(ParallelGroup::new(steps))
    }

    /// Groups steps for sequential execution
    pub fn sequence(steps: Vec<Step>) -> Self {
        Self::Do(Sequence { steps })
    }

    /// Resource touched by a get or put step
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Get(get) => Some(&get.resource),
            Self::Put(put) => Some(&put.resource),
            Self::Task(_) | Self::InParallel(_) | Self::Do(_) => None,
        }
    }

    /// Directly nested steps of a group
    pub fn children(&self) -> &[Step] {
        match self {
            Self::InParallel(group) => &group.steps,
            Self::Do(sequence) => &sequence.steps,
            Self::Get(_) | Self::Put(_) | Self::Task(_) => &[],
        }
    }

    /// Collects this step and every nested step, depth first
    pub fn collect<'a>(&'a self, out: &mut Vec<&'a Step>) {
        out.push(self);
        for child in self.children() {
            child.collect(out);
        }
    }
}

impl Validate for Step {
    type Error = PipelineError;

    fn validate(&self) -> Result<(), Self::Error> {
        match self {
            Self::Get(get) => {
                if get.resource.trim().is_empty() {
                    return Err(PipelineError::EmptyName {
                        kind: EntityKind::Resource,
                    });
                }
                let mut seen = HashSet::new();
                for job in &get.passed {
                    if job.name().trim().is_empty() {
                        return Err(PipelineError::invalid(
                            EntityKind::Step,
                            &get.resource,
                            "passed constraint names an empty job",
                        ));
                    }
                    if !seen.insert(job) {
                        return Err(PipelineError::invalid(
                            EntityKind::Step,
                            &get.resource,
                            format!("job '{job}' listed twice in passed"),
                        ));
                    }
                }
                Ok(())
            }
            Self::Put(put) => {
                if put.resource.trim().is_empty() {
                    return Err(PipelineError::EmptyName {
                        kind: EntityKind::Resource,
                    });
                }
                Ok(())
            }
            Self::Task(task) => task.validate(),
            Self::InParallel(group) => {
                if group.steps.is_empty() {
                    return Err(PipelineError::invalid(
                        EntityKind::Step,
                        "in_parallel",
                        "parallel group must contain at least one step",
                    ));
                }
                if group.limit == Some(0) {
                    return Err(PipelineError::invalid(
                        EntityKind::Step,
                        "in_parallel",
                        "limit must be at least 1",
                    ));
                }
                group.steps.iter().try_for_each(Validate::validate)
            }
            Self::Do(sequence) => {
                if sequence.steps.is_empty() {
                    return Err(PipelineError::invalid(
                        EntityKind::Step,
                        "do",
                        "sequence must contain at least one step",
                    ));
                }
                sequence.steps.iter().try_for_each(Validate::validate)
            }
        }
    }
}

impl From<GetStep> for Step {
    fn from(step: GetStep) -> Self {
        Self::Get(step)
    }
}

impl From<PutStep> for Step {
    fn from(step: PutStep) -> Self {
        Self::Put(step)
    }
}

impl From<TaskStep> for Step {
    fn from(step: TaskStep) -> Self {
        Self::Task(step)
    }
}

impl From<ParallelGroup> for Step {
    fn from(group: ParallelGroup) -> Self {
        Self::InParallel(group)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get(get) => write!(f, "get({})", get.artifact_name()),
            Self::Put(put) => write!(f, "put({})", put.alias.as_deref().unwrap_or(&put.resource)),
            Self::Task(task) => write!(f, "task({})", task.name),
            Self::InParallel(group) => write!(f, "in_parallel({} steps)", group.steps.len()),
            Self::Do(sequence) => write!(f, "do({} steps)", sequence.steps.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_task() -> TaskStep {
        TaskStep::builder("unit")
            .input("repo")
            .run("make", ["test"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_step_passed_dedups() {
        let get = Step::get("repo").passed(["build", "lint", "build"]);
        assert_eq!(get.passed, vec![JobRef::from("build"), JobRef::from("lint")]);
    }

    #[test]
    fn test_get_step_alias() {
        let get = Step::get("repo").alias("source");
        assert_eq!(get.artifact_name(), "source");
        assert_eq!(Step::from(get).to_string(), "get(source)");
    }

    #[test]
    fn test_passed_with_empty_job_is_invalid() {
        let step = Step::from(Step::get("repo").passed([""]));
        assert!(matches!(
            step.validate(),
            Err(PipelineError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_passed_duplicates_from_deserialization_are_invalid() {
        let mut get = Step::get("repo");
        get.passed = vec![JobRef::from("a"), JobRef::from("a")];
        assert!(Step::from(get).validate().is_err());
    }

    #[test]
    fn test_task_requires_io_or_command() {
        let err = TaskStep::builder("noop").build().unwrap_err();
        assert!(err.to_string().contains("noop"));

        assert!(TaskStep::builder("only-output").output("out").build().is_ok());
        assert!(TaskStep::builder("only-run").run("true", Vec::<String>::new()).build().is_ok());
        assert!(TaskStep::builder("from-file").file("ci/task.yml").build().is_ok());
    }

    #[test]
    fn test_task_rejects_duplicate_inputs() {
        let err = TaskStep::builder("dup").input("repo").input("repo").build();
        assert!(err.is_err());
    }

    #[test]
    fn test_task_rejects_zero_timeout_and_attempts() {
        assert!(TaskStep::builder("t").input("a").timeout(Duration::ZERO).build().is_err());
        assert!(TaskStep::builder("t").input("a").attempts(0).build().is_err());
    }

    #[test]
    fn test_task_rejects_sub_millisecond_timeout() {
        let err = TaskStep::builder("t").input("a").timeout(Duration::from_micros(500)).build();
        assert!(err.is_err());
        assert!(TaskStep::builder("t").input("a").timeout(Duration::from_millis(1500)).build().is_ok());
    }

    #[test]
    fn test_empty_parallel_group_is_invalid() {
        assert!(Step::in_parallel(vec![]).validate().is_err());
        assert!(Step::in_parallel(vec![unit_task().into()]).validate().is_ok());
    }

    #[test]
    fn test_collect_walks_nested_groups() {
        let step = Step::in_parallel(vec![
            unit_task().into(),
            Step::sequence(vec![Step::get("repo").into(), Step::put("image").into()]),
        ]);
        let mut all = Vec::new();
        step.collect(&mut all);
        assert_eq!(all.len(), 5);
        assert_eq!(
            all.iter().filter_map(|s| s.resource()).collect::<Vec<_>>(),
            vec!["repo", "image"]
        );
    }

    #[test]
    fn test_step_serde_tag() {
        let step: Step = Step::get("repo").trigger(true).into();
        let yaml = serde_yaml::to_string(&step).unwrap();
        assert!(yaml.contains("step: get"));
        let back: Step = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_task_timeout_serializes_as_duration_string() {
        let task = TaskStep::builder("slow")
            .input("repo")
            .timeout(Duration::from_secs(5400))
            .build()
            .unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["timeout"], "1h30m");
    }
}
