//! Caller-owned registry of named pipeline entities
//!
//! A [`Registry`] collapses duplicate declarations coming from independently
//! authored fragments: registering a structurally identical entity twice is a
//! no-op, registering a different definition under a taken name is an error.
//! There is no global registry; each composition session owns one.

use super::errors::{EntityKind, PipelineError};
use super::job::Job;
use super::resource::{Resource, ResourceType};
use ahash::AHashMap;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Kind and name of a registered entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    /// Kind of entity
    pub kind: EntityKind,
    /// Entity name
    pub name: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// Any entity a [`Registry`] can hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A resource type
    ResourceType(ResourceType),
    /// A resource
    Resource(Resource),
    /// A job
    Job(Job),
}

impl Entity {
    /// Kind of the entity
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ResourceType(_) => EntityKind::ResourceType,
            Self::Resource(_) => EntityKind::Resource,
            Self::Job(_) => EntityKind::Job,
        }
    }

    /// Name of the entity
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ResourceType(rt) => &rt.name,
            Self::Resource(resource) => &resource.name,
            Self::Job(job) => &job.name,
        }
    }
}

impl From<ResourceType> for Entity {
    fn from(rt: ResourceType) -> Self {
        Self::ResourceType(rt)
    }
}

impl From<Resource> for Entity {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<Job> for Entity {
    fn from(job: Job) -> Self {
        Self::Job(job)
    }
}

/// Borrowed view of a registered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef<'a> {
    /// A resource type
    ResourceType(&'a ResourceType),
    /// A resource
    Resource(&'a Resource),
    /// A job
    Job(&'a Job),
}

/// Insertion-ordered table keyed by name
#[derive(Debug, Clone)]
struct Table<T> {
    entries: Vec<T>,
    index: AHashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<T: PartialEq + Serialize> Table<T> {
    fn insert(&mut self, kind: EntityKind, name: &str, entity: T) -> Result<(), PipelineError> {
        match self.index.get(name) {
            Some(&position) => {
                let existing = &self.entries[position];
                if *existing == entity {
                    debug!(%kind, name, "collapsed identical duplicate declaration");
                    Ok(())
                } else {
                    Err(PipelineError::DuplicateResource {
                        kind,
                        name: name.to_string(),
                        existing: definition(existing),
                        incoming: definition(&entity),
                    })
                }
            }
            None => {
                debug!(%kind, name, "registered");
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(entity);
                Ok(())
            }
        }
    }

    fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&position| &self.entries[position])
    }
}

/// Renders an entity for conflict reports.
fn definition<T: Serialize>(entity: &T) -> serde_json::Value {
    serde_json::to_value(entity).unwrap_or_else(|err| serde_json::Value::String(err.to_string()))
}

/// Canonical definitions of resource types, resources and jobs for one composition session
#[derive(Debug, Clone, Default)]
pub struct Registry {
    resource_types: Table<ResourceType>,
    resources: Table<Resource>,
    jobs: Table<Job>,
}

impl Registry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity and returns its identity.
    ///
    /// A structurally identical entity already registered under the same
    /// name is kept as the canonical instance.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateResource`] carrying both definitions
    /// if the name is taken by a different definition, or
    /// [`PipelineError::EmptyName`] for an unnamed entity.
    pub fn register(&mut self, entity: impl Into<Entity>) -> Result<Identity, PipelineError> {
        let entity = entity.into();
        let kind = entity.kind();
        let name = entity.name().to_string();
        if name.trim().is_empty() {
            return Err(PipelineError::EmptyName { kind });
        }

        match entity {
            Entity::ResourceType(rt) => self.resource_types.insert(kind, &name, rt)?,
            Entity::Resource(resource) => self.resources.insert(kind, &name, resource)?,
            Entity::Job(job) => self.jobs.insert(kind, &name, job)?,
        }

        Ok(Identity { kind, name })
    }

    /// Looks up the canonical entity behind an identity
    #[must_use]
    pub fn resolve(&self, identity: &Identity) -> Option<EntityRef<'_>> {
        match identity.kind {
            EntityKind::ResourceType => self
                .resource_type(&identity.name)
                .map(EntityRef::ResourceType),
            EntityKind::Resource => self.resource(&identity.name).map(EntityRef::Resource),
            EntityKind::Job => self.job(&identity.name).map(EntityRef::Job),
            EntityKind::Step | EntityKind::Group | EntityKind::Pipeline => None,
        }
    }

    /// Canonical resource type by name
    #[must_use]
    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.resource_types.get(name)
    }

    /// Canonical resource by name
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Canonical job by name
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// Resource types in first-registration order
    #[must_use]
    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types.entries
    }

    /// Resources in first-registration order
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources.entries
    }

    /// Jobs in first-registration order
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs.entries
    }

    /// Total number of registered entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.resource_types.entries.len() + self.resources.entries.len() + self.jobs.entries.len()
    }

    /// Returns true if nothing has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers every entity held by another registry, in its order
    ///
    /// # Errors
    ///
    /// Stops at the first conflicting definition.
    pub fn absorb(&mut self, other: &Registry) -> Result<(), PipelineError> {
        for rt in other.resource_types() {
            self.register(rt.clone())?;
        }
        for resource in other.resources() {
            self.register(resource.clone())?;
        }
        for job in other.jobs() {
            self.register(job.clone())?;
        }
        Ok(())
    }

    /// Consumes the registry, returning resource types, resources and jobs
    #[must_use]
    pub fn into_parts(self) -> (Vec<ResourceType>, Vec<Resource>, Vec<Job>) {
        (
            self.resource_types.entries,
            self.resources.entries,
            self.jobs.entries,
        )
    }
}
