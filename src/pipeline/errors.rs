//! Error types for pipeline domain

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Kind of entity named by an error or an [`Identity`](super::Identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// A resource type declaration.
    ResourceType,
    /// A resource declaration.
    Resource,
    /// A job.
    Job,
    /// A single step inside a job plan.
    Step,
    /// A display group.
    Group,
    /// The pipeline itself.
    Pipeline,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceType => write!(f, "resource type"),
            Self::Resource => write!(f, "resource"),
            Self::Job => write!(f, "job"),
            Self::Step => write!(f, "step"),
            Self::Group => write!(f, "group"),
            Self::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Errors raised while composing or validating a pipeline.
///
/// Every variant is deterministic in its input graph: nothing here is
/// transient, so callers never retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Same name registered twice with different definitions
    #[error("duplicate {kind} '{name}' with conflicting definitions: {existing} vs {incoming}")]
    DuplicateResource {
        /// Kind of the conflicting entity.
        kind: EntityKind,
        /// Shared name.
        name: String,
        /// Definition that was registered first.
        existing: Value,
        /// Definition that was rejected.
        incoming: Value,
    },

    /// A reference to a name that was never declared
    #[error("{referrer} refers to undefined {kind} '{name}'")]
    UndefinedReference {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Name that failed to resolve.
        name: String,
        /// Human-readable location of the reference.
        referrer: String,
    },

    /// The `passed` job graph contains a cycle
    #[error("cyclic passed dependency: {}", format_chain(.chain))]
    CyclicDependency {
        /// Job names forming the cycle, in edge order.
        chain: Vec<String>,
    },

    /// Job has no steps
    #[error("job '{job}' has an empty plan")]
    EmptyPlan {
        /// Name of the empty job.
        job: String,
    },

    /// Secret interpolation token fails the `((scope.field))` grammar
    #[error("malformed placeholder '{token}' at {location}: {reason}")]
    MalformedPlaceholder {
        /// The offending text.
        token: String,
        /// Dotted path of the value holding the token.
        location: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Name cannot be empty
    #[error("{kind} name cannot be empty")]
    EmptyName {
        /// Kind of the unnamed entity.
        kind: EntityKind,
    },

    /// An entity violates one of its local construction rules
    #[error("invalid {kind} '{name}': {reason}")]
    InvalidDefinition {
        /// Kind of the invalid entity.
        kind: EntityKind,
        /// Name of the invalid entity.
        name: String,
        /// Rule that was broken.
        reason: String,
    },

    /// Document could not be written out
    #[error("failed to serialize pipeline document: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidDefinition`].
    pub(crate) fn invalid(kind: EntityKind, name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

fn format_chain(chain: &[String]) -> String {
    match chain.first() {
        Some(first) => format!("{} -> {first}", chain.join(" -> ")),
        None => String::new(),
    }
}
