//! Whole-pipeline validation
//!
//! Walks an assembled [`Pipeline`] and enforces name uniqueness, referential
//! integrity, placeholder syntax and acyclicity of the `passed` job graph.
//! Success yields a [`ValidatedPipeline`], the only input the renderer
//! accepts. The first failure aborts; there is no partial result.

use super::errors::{EntityKind, PipelineError};
use super::job::Job;
use super::pipeline_def::Pipeline;
use super::placeholder;
use super::steps::Step;
use super::types::{Config, Validate};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info, warn};

/// Result of validating a pipeline
pub type ValidationResult = Result<ValidatedPipeline, PipelineError>;

/// Knobs for [`Validator`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Resource types the engine provides without a declaration
    pub base_resource_types: Vec<String>,
}

/// A pipeline that passed validation, together with its dependency graph
#[derive(Debug, Clone)]
pub struct ValidatedPipeline {
    pipeline: Pipeline,
    graph: DependencyGraph,
}

impl ValidatedPipeline {
    /// The validated pipeline
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Job dependency graph derived from `passed` constraints
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Gives the pipeline back
    #[must_use]
    pub fn into_inner(self) -> Pipeline {
        self.pipeline
    }
}

/// Edge `upstream -> downstream` created by a get with `passed: [upstream]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    /// Upstream job
    pub upstream: String,
    /// Downstream job
    pub downstream: String,
    /// Resource carried along the edge
    pub resource: String,
}

/// Directed job graph built from resolved `passed` references
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    jobs: Vec<String>,
    adjacency: Vec<Vec<usize>>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    /// Builds the graph.
    ///
    /// `passed` names are resolved to job indices once, here. An edge
    /// `A -> B` exists when a get in B lists A in `passed` and A puts the
    /// same resource.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UndefinedReference`] for a `passed` job
    /// that is not part of the pipeline.
    pub fn build(jobs: &[Job]) -> Result<Self, PipelineError> {
        let index: AHashMap<&str, usize> = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.name.as_str(), i))
            .collect();
        let puts: Vec<AHashSet<&str>> = jobs
            .iter()
            .map(|job| {
                job.all_steps()
                    .into_iter()
                    .filter_map(|step| match step {
                        Step::Put(put) => Some(put.resource.as_str()),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        let mut graph = Self {
            jobs: jobs.iter().map(|job| job.name.clone()).collect(),
            adjacency: vec![Vec::new(); jobs.len()],
            edges: Vec::new(),
        };

        for (downstream, job) in jobs.iter().enumerate() {
            for step in job.all_steps() {
                let Step::Get(get) = step else { continue };
                for upstream_ref in &get.passed {
                    let Some(&upstream) = index.get(upstream_ref.name()) else {
                        return Err(PipelineError::UndefinedReference {
                            kind: EntityKind::Job,
                            name: upstream_ref.name().to_string(),
                            referrer: format!(
                                "passed constraint on get '{}' in job '{}'",
                                get.resource, job.name
                            ),
                        });
                    };
                    if !puts[upstream].contains(get.resource.as_str()) {
                        warn!(
                            job = %job.name,
                            upstream = upstream_ref.name(),
                            resource = %get.resource,
                            "passed job never puts the resource; constraint adds no ordering edge"
                        );
                        continue;
                    }
                    graph.add_edge(upstream, downstream, &get.resource);
                }
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, upstream: usize, downstream: usize, resource: &str) {
        if !self.adjacency[upstream].contains(&downstream) {
            self.adjacency[upstream].push(downstream);
        }
        let edge = DependencyEdge {
            upstream: self.jobs[upstream].clone(),
            downstream: self.jobs[downstream].clone(),
            resource: resource.to_string(),
        };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Edges in discovery order
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Jobs that must succeed before `job` can see their versions
    #[must_use]
    pub fn upstream_of(&self, job: &str) -> Vec<&str> {
        let mut upstream: Vec<&str> = Vec::new();
        for edge in self.edges.iter().filter(|edge| edge.downstream == job) {
            if !upstream.contains(&edge.upstream.as_str()) {
                upstream.push(&edge.upstream);
            }
        }
        upstream
    }

    /// Finds a cycle with a depth-first search over a recursion stack.
    ///
    /// Returns the job names on the cycle, starting at the job where the
    /// search first entered it.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        fn visit(
            node: usize,
            adjacency: &[Vec<usize>],
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::OnStack;
            stack.push(node);

            for &next in &adjacency[node] {
                match marks[next] {
                    Mark::OnStack => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        return Some(stack[start..].to_vec());
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(next, adjacency, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.jobs.len()];
        let mut stack = Vec::new();
        for node in 0..self.jobs.len() {
            if marks[node] == Mark::Unvisited {
                if let Some(cycle) = visit(node, &self.adjacency, &mut marks, &mut stack) {
                    return Some(cycle.into_iter().map(|i| self.jobs[i].clone()).collect());
                }
            }
        }
        None
    }

    /// Jobs ordered so every upstream job precedes its downstream jobs.
    ///
    /// Ties are broken by declaration order. Jobs on a cycle are left out.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree = vec![0usize; self.jobs.len()];
        for targets in &self.adjacency {
            for &target in targets {
                in_degree[target] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.jobs.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.jobs[node].as_str());
            for &next in &self.adjacency[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        order
    }
}

/// Validates pipelines against a set of [`ValidationOptions`]
#[derive(Debug, Clone, Default)]
pub struct Validator {
    options: ValidationOptions,
}

impl Validator {
    /// Creates a validator
    #[must_use]
    pub fn new(options: ValidationOptions) -> Self {
        Self { options }
    }

    /// Validates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule, checked in this order: names,
    /// uniqueness, local entity rules and empty plans, references,
    /// placeholders, cycles.
    pub fn validate(&self, pipeline: Pipeline) -> ValidationResult {
        debug!(pipeline = %pipeline.name, "validating");

        if pipeline.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::Pipeline,
            });
        }

        check_unique(EntityKind::ResourceType, &pipeline.resource_types, |rt| &rt.name)?;
        check_unique(EntityKind::Resource, &pipeline.resources, |r| &r.name)?;
        check_unique(EntityKind::Job, &pipeline.jobs, |job| &job.name)?;
        check_unique(EntityKind::Group, &pipeline.groups, |group| &group.name)?;

        for rt in &pipeline.resource_types {
            rt.validate()?;
        }
        for resource in &pipeline.resources {
            resource.validate()?;
        }
        for job in &pipeline.jobs {
            if job.plan.is_empty() {
                return Err(PipelineError::EmptyPlan {
                    job: job.name.clone(),
                });
            }
            job.validate()?;
        }
        for group in &pipeline.groups {
            if group.name.trim().is_empty() {
                return Err(PipelineError::EmptyName {
                    kind: EntityKind::Group,
                });
            }
        }

        self.check_references(&pipeline)?;
        check_placeholders(&pipeline)?;

        let graph = DependencyGraph::build(&pipeline.jobs)?;
        if let Some(chain) = graph.find_cycle() {
            return Err(PipelineError::CyclicDependency { chain });
        }

        info!(
            pipeline = %pipeline.name,
            resource_types = pipeline.resource_types.len(),
            resources = pipeline.resources.len(),
            jobs = pipeline.jobs.len(),
            edges = graph.edges().len(),
            "pipeline validated"
        );
        Ok(ValidatedPipeline { pipeline, graph })
    }

    fn check_references(&self, pipeline: &Pipeline) -> Result<(), PipelineError> {
        let types: AHashSet<&str> = pipeline
            .resource_types
            .iter()
            .map(|rt| rt.name.as_str())
            .chain(self.options.base_resource_types.iter().map(String::as_str))
            .collect();
        for resource in &pipeline.resources {
            if !types.contains(resource.type_name.as_str()) {
                return Err(PipelineError::UndefinedReference {
                    kind: EntityKind::ResourceType,
                    name: resource.type_name.clone(),
                    referrer: format!("resource '{}'", resource.name),
                });
            }
        }

        let resources: AHashSet<&str> = pipeline.resources.iter().map(|r| r.name.as_str()).collect();
        for job in &pipeline.jobs {
            for step in job.all_steps() {
                if let Some(resource) = step.resource() {
                    if !resources.contains(resource) {
                        return Err(PipelineError::UndefinedReference {
                            kind: EntityKind::Resource,
                            name: resource.to_string(),
                            referrer: format!("{step} in job '{}'", job.name),
                        });
                    }
                }
            }
        }
        pipeline.check_passed_references()?;

        let jobs: AHashSet<&str> = pipeline.jobs.iter().map(|job| job.name.as_str()).collect();
        for group in &pipeline.groups {
            if let Some(missing) = group.jobs.iter().find(|job| !jobs.contains(job.as_str())) {
                return Err(PipelineError::UndefinedReference {
                    kind: EntityKind::Job,
                    name: missing.clone(),
                    referrer: format!("group '{}'", group.name),
                });
            }
        }
        Ok(())
    }
}

/// Validates a pipeline with default options.
///
/// # Errors
///
/// See [`Validator::validate`].
pub fn validate(pipeline: Pipeline) -> ValidationResult {
    Validator::default().validate(pipeline)
}

impl Pipeline {
    /// Validates this pipeline with default options
    ///
    /// # Errors
    ///
    /// See [`Validator::validate`].
    pub fn validated(self) -> ValidationResult {
        validate(self)
    }
}

fn check_unique<T, F>(kind: EntityKind, items: &[T], name_of: F) -> Result<(), PipelineError>
where
    T: Serialize,
    F: Fn(&T) -> &String,
{
    let mut seen: AHashMap<&str, &T> = AHashMap::new();
    for item in items {
        if let Some(existing) = seen.insert(name_of(item), item) {
            return Err(PipelineError::DuplicateResource {
                kind,
                name: name_of(item).clone(),
                existing: to_json(existing),
                incoming: to_json(item),
            });
        }
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|err| serde_json::Value::String(err.to_string()))
}

fn check_config(config: &Config, location: &str) -> Result<(), PipelineError> {
    config
        .iter()
        .try_for_each(|(key, value)| placeholder::check_value(value, &format!("{location}.{key}")))
}

fn check_placeholders(pipeline: &Pipeline) -> Result<(), PipelineError> {
    for rt in &pipeline.resource_types {
        let location = format!("resource_types.{}", rt.name);
        check_config(&rt.source, &format!("{location}.source"))?;
        check_config(&rt.defaults, &format!("{location}.defaults"))?;
    }
    for resource in &pipeline.resources {
        let location = format!("resources.{}", resource.name);
        check_config(&resource.source, &format!("{location}.source"))?;
        if let Some(token) = &resource.webhook_token {
            placeholder::check_str(token, &format!("{location}.webhook_token"))?;
        }
    }
    for job in &pipeline.jobs {
        let location = format!("jobs.{}", job.name);
        for (i, step) in job.plan.iter().enumerate() {
            check_step(step, &format!("{location}.plan[{i}]"))?;
        }
        let hooks = [
            ("on_success", &job.on_success),
            ("on_failure", &job.on_failure),
            ("on_abort", &job.on_abort),
            ("ensure", &job.ensure),
        ];
        for (hook, step) in hooks {
            if let Some(step) = step {
                check_step(step, &format!("{location}.{hook}"))?;
            }
        }
    }
    Ok(())
}

fn check_step(step: &Step, location: &str) -> Result<(), PipelineError> {
    match step {
        Step::Get(get) => check_config(&get.params, &format!("{location}.params")),
        Step::Put(put) => {
            check_config(&put.params, &format!("{location}.params"))?;
            check_config(&put.get_params, &format!("{location}.get_params"))
        }
        Step::Task(task) => {
            check_config(&task.params, &format!("{location}.params"))?;
            if let Some(image) = &task.config.image_resource {
                check_config(&image.source, &format!("{location}.config.image_resource.source"))?;
            }
            if let Some(run) = &task.config.run {
                placeholder::check_str(&run.path, &format!("{location}.config.run.path"))?;
                for (i, arg) in run.args.iter().enumerate() {
                    placeholder::check_str(arg, &format!("{location}.config.run.args[{i}]"))?;
                }
            }
            Ok(())
        }
        Step::InParallel(group) => group
            .steps
            .iter()
            .enumerate()
            .try_for_each(|(i, child)| check_step(child, &format!("{location}.in_parallel[{i}]"))),
        Step::Do(sequence) => sequence
            .steps
            .iter()
            .enumerate()
            .try_for_each(|(i, child)| check_step(child, &format!("{location}.do[{i}]"))),
    }
}
