//! Resource and resource type declarations
//!
//! A resource is a named, typed external artifact that jobs `get` and `put`.
//! Its resource type is the implementation the engine runs to talk to it.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::errors::{EntityKind, PipelineError};
use super::types::{CheckInterval, Config, Validate, below_resolution, is_false};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Implementation class backing one or more resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    /// Name resources use in their `type` field
    pub name: String,

    /// Underlying type identifier (usually a base type such as `registry-image`)
    #[serde(rename = "type")]
    pub type_name: String,

    /// Where the engine fetches the type's implementation from
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub source: Config,

    /// Run the type's containers privileged
    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,

    /// Check interval for the type image itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_every: Option<CheckInterval>,

    /// Source defaults merged into every resource of this type
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub defaults: Config,
}

impl ResourceType {
    /// Creates a resource type with an empty source
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            source: Config::new(),
            privileged: false,
            check_every: None,
            defaults: Config::new(),
        }
    }

    /// Replaces the source configuration
    pub fn with_source(mut self, source: Config) -> Self {
        self.source = source;
        self
    }

    /// Sets one source entry
    pub fn source_entry(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.source.insert(key.into(), value.into());
        self
    }

    /// Marks the type as privileged
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Sets the check interval of the type image
    pub fn check_every(mut self, interval: CheckInterval) -> Self {
        self.check_every = Some(interval);
        self
    }

    /// Sets source defaults for resources of this type
    pub fn with_defaults(mut self, defaults: Config) -> Self {
        self.defaults = defaults;
        self
    }
}

impl Validate for ResourceType {
    type Error = PipelineError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::ResourceType,
            });
        }
        if self.type_name.trim().is_empty() {
            return Err(PipelineError::invalid(
                EntityKind::ResourceType,
                &self.name,
                "underlying type cannot be empty",
            ));
        }
        if matches!(self.check_every, Some(CheckInterval::Every(interval)) if below_resolution(interval)) {
            return Err(PipelineError::invalid(
                EntityKind::ResourceType,
                &self.name,
                "check interval must be positive",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceType({}): {}", self.name, self.type_name)
    }
}

/// An external artifact or event source a job can get or put
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name, unique within the pipeline
    pub name: String,

    /// Name of the resource type implementing this resource
    #[serde(rename = "type")]
    pub type_name: String,

    /// Type-specific configuration
    #[serde(default, skip_serializing_if = "Config::is_empty")]
    pub source: Config,

    /// Check interval, or `never` to disable automatic checking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_every: Option<CheckInterval>,

    /// Icon shown in the web UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Worker tags the checks must run on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Expose check metadata publicly
    #[serde(default, skip_serializing_if = "is_false")]
    pub public: bool,

    /// Token enabling webhook-triggered checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,
}

impl Resource {
    /// Creates a resource of the given type with an empty source
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            source: Config::new(),
            check_every: None,
            icon: None,
            tags: Vec::new(),
            public: false,
            webhook_token: None,
        }
    }

    /// Replaces the source configuration
    pub fn with_source(mut self, source: Config) -> Self {
        self.source = source;
        self
    }

    /// Sets one source entry
    pub fn source_entry(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.source.insert(key.into(), value.into());
        self
    }

    /// Sets the check interval
    pub fn check_every(mut self, interval: CheckInterval) -> Self {
        self.check_every = Some(interval);
        self
    }

    /// Disables automatic checks (versions only come from puts)
    pub fn never_check(self) -> Self {
        self.check_every(CheckInterval::Never)
    }

    /// Sets the UI icon
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Adds a worker tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Marks the resource public
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Sets the webhook token
    pub fn webhook_token(mut self, token: impl Into<String>) -> Self {
        self.webhook_token = Some(token.into());
        self
    }
}

impl Validate for Resource {
    type Error = PipelineError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::EmptyName {
                kind: EntityKind::Resource,
            });
        }
        if self.type_name.trim().is_empty() {
            return Err(PipelineError::invalid(
                EntityKind::Resource,
                &self.name,
                "resource type reference cannot be empty",
            ));
        }
        if matches!(self.check_every, Some(CheckInterval::Every(interval)) if below_resolution(interval)) {
            return Err(PipelineError::invalid(
                EntityKind::Resource,
                &self.name,
                "check interval must be positive",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({}): {}", self.name, self.type_name)
    }
}
