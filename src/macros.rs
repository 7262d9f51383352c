//! Declarative macros for pipeline definitions
//!
//! Shorthands for the builders in [`crate::pipeline`]; each one expands to
//! plain builder calls.

/// Builds a [`Config`](crate::pipeline::Config) map from `key => value` pairs
///
/// Values go through `serde_json::json!`, so nested maps and lists work.
#[macro_export]
macro_rules! config {
    () => {
        $crate::pipeline::Config::new()
    };
    ( $( $key:expr => $value:tt ),+ $(,)? ) => {{
        let mut config = $crate::pipeline::Config::new();
        $(
            config.insert(::std::string::String::from($key), $crate::serde_json::json!($value));
        )+
        config
    }};
}

/// Creates a get step
#[macro_export]
macro_rules! get {
    ($resource:expr) => {
        $crate::pipeline::Step::get($resource)
    };
    ($resource:expr, trigger) => {
        $crate::pipeline::Step::get($resource).trigger(true)
    };
    ($resource:expr, passed: [ $($job:expr),* $(,)? ]) => {
        $crate::pipeline::Step::get($resource).passed([$($job),*])
    };
    ($resource:expr, trigger, passed: [ $($job:expr),* $(,)? ]) => {
        $crate::pipeline::Step::get($resource).trigger(true).passed([$($job),*])
    };
}

/// Creates a put step
#[macro_export]
macro_rules! put {
    ($resource:expr) => {
        $crate::pipeline::Step::put($resource)
    };
    ($resource:expr, { $($params:tt)* }) => {
        $crate::pipeline::Step::put($resource).with_params($crate::config!($($params)*))
    };
}

/// Creates a plan from anything convertible into a step
#[macro_export]
macro_rules! plan {
    ($($step:expr),* $(,)?) => {
        vec![$($crate::pipeline::Step::from($step)),*]
    };
}

/// Groups steps for concurrent execution
#[macro_export]
macro_rules! in_parallel {
    ($($step:expr),* $(,)?) => {
        $crate::pipeline::Step::in_parallel($crate::plan![$($step),*])
    };
}

/// Creates a job from a name and its steps without running local checks
#[macro_export]
macro_rules! job {
    ($name:expr, [ $($step:expr),* $(,)? ]) => {
        $crate::pipeline::Job::new($name, $crate::plan![$($step),*])
    };
}
