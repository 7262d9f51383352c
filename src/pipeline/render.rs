//! Canonical document rendering
//!
//! Turns a [`ValidatedPipeline`] into the nested mapping the orchestration
//! engine consumes. Resource types and resources are sorted by name, jobs
//! keep their declared order, and parallel groups stay nested. Placeholders
//! are copied verbatim.

use super::errors::PipelineError;
use super::job::Job;
use super::pipeline_def::Group;
use super::resource::{Resource, ResourceType};
use super::steps::{DEFAULT_PLATFORM, GetStep, ParallelGroup, PutStep, Step, TaskStep};
use super::types::{Config, format_duration};
use super::validator::ValidatedPipeline;
use serde::Serialize;
use serde_yaml::{Mapping, Number, Value};

/// Rendered pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Root mapping of the document
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Top-level section, e.g. `jobs`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serializes the document as YAML
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if the YAML emitter fails.
    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        serde_yaml::to_string(&self.0).map_err(|err| PipelineError::Serialization(err.to_string()))
    }

    /// Serializes the document as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if the JSON writer fails.
    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(&self.0)
            .map_err(|err| PipelineError::Serialization(err.to_string()))
    }
}

/// Renders a validated pipeline. Never fails.
#[must_use]
pub fn render(validated: &ValidatedPipeline) -> Document {
    let pipeline = validated.pipeline();
    let mut root = Mapping::new();

    if !pipeline.resource_types.is_empty() {
        let mut types: Vec<&ResourceType> = pipeline.resource_types.iter().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        root.insert(key("resource_types"), seq(types.into_iter().map(resource_type)));
    }

    if !pipeline.resources.is_empty() {
        let mut resources: Vec<&Resource> = pipeline.resources.iter().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        root.insert(key("resources"), seq(resources.into_iter().map(resource)));
    }

    root.insert(key("jobs"), seq(pipeline.jobs.iter().map(job)));

    if !pipeline.groups.is_empty() {
        root.insert(key("groups"), seq(pipeline.groups.iter().map(group)));
    }

    Document(Value::Mapping(root))
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn string(text: &str) -> Value {
    Value::String(text.to_string())
}

fn seq(items: impl Iterator<Item = Value>) -> Value {
    Value::Sequence(items.collect())
}

fn strings(items: &[String]) -> Value {
    seq(items.iter().map(|item| string(item)))
}

fn put_config(map: &mut Mapping, name: &str, config: &Config) {
    if !config.is_empty() {
        map.insert(key(name), config_value(config));
    }
}

fn put_flag(map: &mut Mapping, name: &str, flag: bool) {
    if flag {
        map.insert(key(name), Value::Bool(true));
    }
}

fn config_value(config: &Config) -> Value {
    let mut map = Mapping::new();
    for (name, value) in config {
        map.insert(key(name), from_json(value));
    }
    Value::Mapping(map)
}

fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Bool(*flag),
        serde_json::Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                Value::Number(Number::from(n))
            } else if let Some(n) = number.as_i64() {
                Value::Number(Number::from(n))
            } else {
                number
                    .as_f64()
                    .map_or(Value::Null, |n| Value::Number(Number::from(n)))
            }
        }
        serde_json::Value::String(text) => string(text),
        serde_json::Value::Array(items) => seq(items.iter().map(from_json)),
        serde_json::Value::Object(map) => {
            let mut out = Mapping::new();
            for (name, item) in map {
                out.insert(key(name), from_json(item));
            }
            Value::Mapping(out)
        }
    }
}

fn resource_type(rt: &ResourceType) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), string(&rt.name));
    map.insert(key("type"), string(&rt.type_name));
    put_config(&mut map, "source", &rt.source);
    put_flag(&mut map, "privileged", rt.privileged);
    if let Some(interval) = rt.check_every {
        map.insert(key("check_every"), Value::String(interval.to_string()));
    }
    put_config(&mut map, "defaults", &rt.defaults);
    Value::Mapping(map)
}

fn resource(resource: &Resource) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), string(&resource.name));
    map.insert(key("type"), string(&resource.type_name));
    if let Some(icon) = &resource.icon {
        map.insert(key("icon"), string(icon));
    }
    put_config(&mut map, "source", &resource.source);
    if let Some(interval) = resource.check_every {
        map.insert(key("check_every"), Value::String(interval.to_string()));
    }
    if !resource.tags.is_empty() {
        map.insert(key("tags"), strings(&resource.tags));
    }
    put_flag(&mut map, "public", resource.public);
    if let Some(token) = &resource.webhook_token {
        map.insert(key("webhook_token"), string(token));
    }
    Value::Mapping(map)
}

fn job(job: &Job) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), string(&job.name));
    put_flag(&mut map, "serial", job.serial);
    if !job.serial_groups.is_empty() {
        map.insert(key("serial_groups"), strings(&job.serial_groups));
    }
    if let Some(max) = job.max_in_flight {
        map.insert(key("max_in_flight"), Value::Number(Number::from(max)));
    }
    put_flag(&mut map, "public", job.public);
    if let Some(builds) = job.build_logs_to_retain {
        let mut retention = Mapping::new();
        retention.insert(key("builds"), Value::Number(Number::from(builds)));
        map.insert(key("build_log_retention"), Value::Mapping(retention));
    }
    map.insert(key("plan"), seq(job.plan.iter().map(step)));

    let hooks = [
        ("on_success", &job.on_success),
        ("on_failure", &job.on_failure),
        ("on_abort", &job.on_abort),
        ("ensure", &job.ensure),
    ];
    for (name, hook) in hooks {
        if let Some(hook) = hook {
            map.insert(key(name), step(hook));
        }
    }
    Value::Mapping(map)
}

fn step(step: &Step) -> Value {
    match step {
        Step::Get(get) => get_step(get),
        Step::Put(put) => put_step(put),
        Step::Task(task) => task_step(task),
        Step::InParallel(group) => parallel_step(group),
        Step::Do(sequence) => {
            let mut map = Mapping::new();
            map.insert(key("do"), seq(sequence.steps.iter().map(self::step)));
            Value::Mapping(map)
        }
    }
}

fn get_step(get: &GetStep) -> Value {
    let mut map = Mapping::new();
    map.insert(key("get"), string(get.artifact_name()));
    if get.alias.is_some() {
        map.insert(key("resource"), string(&get.resource));
    }
    if !get.passed.is_empty() {
        map.insert(key("passed"), seq(get.passed.iter().map(|job| string(job.name()))));
    }
    put_flag(&mut map, "trigger", get.trigger);
    put_config(&mut map, "params", &get.params);
    Value::Mapping(map)
}

fn put_step(put: &PutStep) -> Value {
    let mut map = Mapping::new();
    match &put.alias {
        Some(alias) => {
            map.insert(key("put"), string(alias));
            map.insert(key("resource"), string(&put.resource));
        }
        None => {
            map.insert(key("put"), string(&put.resource));
        }
    }
    if let Some(inputs) = &put.inputs {
        map.insert(key("inputs"), strings(inputs));
    }
    put_config(&mut map, "params", &put.params);
    put_config(&mut map, "get_params", &put.get_params);
    Value::Mapping(map)
}

fn task_step(task: &TaskStep) -> Value {
    let mut map = Mapping::new();
    map.insert(key("task"), string(&task.name));
    if let Some(file) = &task.file {
        map.insert(key("file"), string(file));
    }
    put_flag(&mut map, "privileged", task.privileged);

    let config = &task.config;
    let has_inline_config = task.file.is_none()
        || config.image_resource.is_some()
        || config.run.is_some()
        || !task.inputs.is_empty()
        || !task.outputs.is_empty()
        || !config.caches.is_empty();
    if has_inline_config {
        let mut inline = Mapping::new();
        // a task file carries its own platform
        if task.file.is_none() || config.platform != DEFAULT_PLATFORM {
            inline.insert(key("platform"), string(&config.platform));
        }
        if let Some(image) = &config.image_resource {
            let mut image_map = Mapping::new();
            image_map.insert(key("type"), string(&image.type_name));
            image_map.insert(key("source"), config_value(&image.source));
            inline.insert(key("image_resource"), Value::Mapping(image_map));
        }
        if !task.inputs.is_empty() {
            inline.insert(key("inputs"), named_list("name", &task.inputs));
        }
        if !task.outputs.is_empty() {
            inline.insert(key("outputs"), named_list("name", &task.outputs));
        }
        if !config.caches.is_empty() {
            inline.insert(key("caches"), named_list("path", &config.caches));
        }
        if let Some(run) = &config.run {
            let mut run_map = Mapping::new();
            run_map.insert(key("path"), string(&run.path));
            if !run.args.is_empty() {
                run_map.insert(key("args"), strings(&run.args));
            }
            if let Some(dir) = &run.dir {
                run_map.insert(key("dir"), string(dir));
            }
            if let Some(user) = &run.user {
                run_map.insert(key("user"), string(user));
            }
            inline.insert(key("run"), Value::Mapping(run_map));
        }
        map.insert(key("config"), Value::Mapping(inline));
    }

    put_config(&mut map, "params", &task.params);
    if let Some(timeout) = task.timeout {
        map.insert(key("timeout"), Value::String(format_duration(timeout)));
    }
    if let Some(attempts) = task.attempts {
        map.insert(key("attempts"), Value::Number(Number::from(attempts)));
    }
    Value::Mapping(map)
}

fn named_list(field: &str, names: &[String]) -> Value {
    seq(names.iter().map(|name| {
        let mut entry = Mapping::new();
        entry.insert(key(field), string(name));
        Value::Mapping(entry)
    }))
}

fn parallel_step(group: &ParallelGroup) -> Value {
    let steps = seq(group.steps.iter().map(step));
    let body = if group.limit.is_none() && !group.fail_fast {
        steps
    } else {
        let mut options = Mapping::new();
        options.insert(key("steps"), steps);
        if let Some(limit) = group.limit {
            options.insert(key("limit"), Value::Number(Number::from(limit)));
        }
        put_flag(&mut options, "fail_fast", group.fail_fast);
        Value::Mapping(options)
    };
    let mut map = Mapping::new();
    map.insert(key("in_parallel"), body);
    Value::Mapping(map)
}

fn group(group: &Group) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), string(&group.name));
    map.insert(key("jobs"), strings(&group.jobs));
    Value::Mapping(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::Job;
    use crate::pipeline::pipeline_def::Pipeline;
    use crate::pipeline::validator::validate;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn task(name: &str) -> Step {
        TaskStep::builder(name)
            .input("repo")
            .run("make", [name])
            .build()
            .unwrap()
            .into()
    }

    fn sample() -> ValidatedPipeline {
        let pipeline = Pipeline::builder("app")
            .resource_type(ResourceType::new("git", "registry-image"))
            .resource(
                Resource::new("repo", "git")
                    .source_entry("uri", "https://example.com/app.git")
                    .source_entry("private_key", "((vault.deploy_key))"),
            )
            .resource(Resource::new("artifact", "git").never_check())
            .job(
                Job::builder("test")
                    .step(Step::get("repo").trigger(true))
                    .in_parallel(vec![task("lint"), task("unit"), task("integration")])
                    .step(Step::put("artifact").param("file", "out/*.tgz"))
                    .serial(true)
                    .build()
                    .unwrap(),
            )
            .job(
                Job::builder("ship")
                    .step(Step::get("artifact").passed(["test"]).trigger(true))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        validate(pipeline).unwrap()
    }

    #[test]
    fn test_render_full_document() {
        let yaml = render(&sample()).to_yaml().unwrap();
        let expected = r#"resource_types:
- name: git
  type: registry-image
resources:
- name: artifact
  type: git
  check_every: never
- name: repo
  type: git
  source:
    private_key: ((vault.deploy_key))
    uri: https://example.com/app.git
jobs:
- name: test
  serial: true
  plan:
  - get: repo
    trigger: true
  - in_parallel:
    - task: lint
      config:
        platform: linux
        inputs:
        - name: repo
        run:
          path: make
          args:
          - lint
    - task: unit
      config:
        platform: linux
        inputs:
        - name: repo
        run:
          path: make
          args:
          - unit
    - task: integration
      config:
        platform: linux
        inputs:
        - name: repo
        run:
          path: make
          args:
          - integration
  - put: artifact
    params:
      file: out/*.tgz
- name: ship
  plan:
  - get: artifact
    passed:
    - test
    trigger: true
"#;
        assert_eq!(yaml, expected);
    }

    #[test]
    fn test_render_is_deterministic() {
        let validated = sample();
        let first = render(&validated).to_yaml().unwrap();
        for _ in 0..5 {
            assert_eq!(render(&validated).to_yaml().unwrap(), first);
        }
    }

    #[test]
    fn test_parallel_group_not_flattened() {
        let document = render(&sample());
        let plan = &document.get("jobs").unwrap()[0]["plan"];
        assert_eq!(plan.as_sequence().unwrap().len(), 3);
        let group = plan[1]["in_parallel"].as_sequence().unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group[0]["task"], Value::String("lint".to_string()));
    }

    #[test]
    fn test_parallel_group_options_render_as_mapping() {
        let group = ParallelGroup::new(vec![task("a"), task("b")]).limit(1).fail_fast(true);
        let value = parallel_step(&group);
        let body = &value["in_parallel"];
        assert_eq!(body["limit"], Value::Number(Number::from(1u64)));
        assert_eq!(body["fail_fast"], Value::Bool(true));
        assert_eq!(body["steps"].as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn test_aliases_and_put_options() {
        let get = get_step(&Step::get("repo").alias("source"));
        assert_eq!(get["get"], Value::String("source".to_string()));
        assert_eq!(get["resource"], Value::String("repo".to_string()));

        let put = put_step(
            &Step::put("image")
                .alias("publish")
                .inputs(["image"])
                .get_param("skip_download", true),
        );
        assert_eq!(put["put"], Value::String("publish".to_string()));
        assert_eq!(put["inputs"][0], Value::String("image".to_string()));
        assert_eq!(put["get_params"]["skip_download"], Value::Bool(true));
    }

    #[test]
    fn test_task_extras() {
        let task = TaskStep::builder("package")
            .file("repo/ci/package.yml")
            .param("VERSION", 3)
            .timeout(Duration::from_secs(1800))
            .attempts(2)
            .privileged(true)
            .build()
            .unwrap();
        let value = task_step(&task);
        assert_eq!(value["file"], Value::String("repo/ci/package.yml".to_string()));
        assert!(value.get("config").is_none());
        assert_eq!(value["timeout"], Value::String("30m".to_string()));
        assert_eq!(value["attempts"], Value::Number(Number::from(2u64)));
        assert_eq!(value["params"]["VERSION"], Value::Number(Number::from(3u64)));
        assert_eq!(value["privileged"], Value::Bool(true));
    }

    #[test]
    fn test_task_file_keeps_its_own_platform() {
        let task = TaskStep::builder("package")
            .file("repo/ci/package.yml")
            .input("repo")
            .output("dist")
            .build()
            .unwrap();
        let value = task_step(&task);
        let config = value.get("config").unwrap();
        assert!(config.get("platform").is_none());
        assert_eq!(config["inputs"][0]["name"], Value::String("repo".to_string()));

        let windows = TaskStep::builder("package")
            .file("repo/ci/package.yml")
            .input("repo")
            .platform("windows")
            .build()
            .unwrap();
        assert_eq!(task_step(&windows)["config"]["platform"], Value::String("windows".to_string()));
    }

    #[test]
    fn test_job_hooks_and_options() {
        let job = Job::builder("deploy")
            .step(task("apply"))
            .on_failure(Step::put("alert"))
            .ensure(Step::sequence(vec![task("cleanup")]))
            .max_in_flight(2)
            .build_logs_to_retain(50)
            .serial_group("prod")
            .public(true)
            .build()
            .unwrap();
        let value = self::job(&job);
        assert_eq!(value["on_failure"]["put"], Value::String("alert".to_string()));
        assert_eq!(value["ensure"]["do"][0]["task"], Value::String("cleanup".to_string()));
        assert_eq!(value["max_in_flight"], Value::Number(Number::from(2u64)));
        assert_eq!(value["build_log_retention"]["builds"], Value::Number(Number::from(50u64)));
        assert_eq!(value["serial_groups"][0], Value::String("prod".to_string()));
        assert_eq!(value["public"], Value::Bool(true));
        assert!(value.get("serial").is_none());
    }

    #[test]
    fn test_json_output() {
        let json = render(&sample()).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["jobs"][1]["plan"][0]["passed"][0], "test");
        assert_eq!(parsed["resources"][0]["name"], "artifact");
    }

    #[test]
    fn test_groups_rendered_in_declared_order() {
        let mut pipeline = sample().into_inner();
        pipeline.groups = vec![Group::new("zz", ["test"]), Group::new("aa", ["ship"])];
        let document = render(&validate(pipeline).unwrap());
        let groups = document.get("groups").unwrap();
        assert_eq!(groups[0]["name"], Value::String("zz".to_string()));
        assert_eq!(groups[1]["name"], Value::String("aa".to_string()));
    }

    mod properties {
        use super::*;
        use crate::pipeline::resource::ResourceType;
        use proptest::prelude::*;

        fn pipeline_with(names: &[String]) -> Pipeline {
            let mut builder = Pipeline::builder("app").resource_type(ResourceType::new("git", "registry-image"));
            for name in names {
                builder = builder.resource(Resource::new(name.as_str(), "git").source_entry("uri", format!("https://{name}")));
            }
            builder
                .job(Job::new("watch", vec![Step::get(names[0].as_str()).trigger(true).into()]))
                .build()
                .unwrap()
        }

        proptest! {
            #[test]
            fn test_resource_declaration_order_is_irrelevant(
                names in proptest::collection::btree_set("[a-z]{1,8}", 1..8),
                shift in 0usize..8,
            ) {
                let sorted: Vec<String> = names.into_iter().collect();
                let mut rotated = sorted.clone();
                rotated.rotate_left(shift % sorted.len());

                let mut a = pipeline_with(&sorted);
                let b = pipeline_with(&rotated);
                a.jobs.clone_from(&b.jobs);

                let first = render(&validate(a).unwrap()).to_yaml().unwrap();
                let second = render(&validate(b).unwrap()).to_yaml().unwrap();
                prop_assert_eq!(first, second);
            }
        }
    }
}
