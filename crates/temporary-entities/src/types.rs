//! Core data types for temporary entities, their events, and errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Opaque, stable identifier of a temporary entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id prefixed with the entity kind, e.g. `timer_3f2a…`.
    pub fn generate(kind: EntityKind) -> Self {
        Self(format!("{}_{}", kind.as_str(), uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Internal lifecycle state. `Finalized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Active,
    Paused,
    #[serde(alias = "idle")]
    Finalized,
}

impl EntityState {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityState::Active => "active",
            EntityState::Paused => "paused",
            EntityState::Finalized => "finalized",
        }
    }

    /// State as presented to hosts: finalized entities show as `idle`.
    pub fn display_state(self) -> &'static str {
        match self {
            EntityState::Active => "active",
            EntityState::Paused => "paused",
            EntityState::Finalized => "idle",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete kinds of temporary entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Timer,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Timer => "timer",
        }
    }
}

/// An externally requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Start or restart; `duration` (seconds) resets the countdown when given.
    Start { duration: Option<u64> },
    Pause,
    Resume,
    Cancel,
    Finish,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Start { .. } => "start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Cancel => "cancel",
            Operation::Finish => "finish",
        }
    }
}

/// Notifications emitted by entities and the manager, drained by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityEvent {
    /// A lifecycle transition happened (or was re-applied).
    StateChanged { id: EntityId, state: EntityState },
    /// Periodic countdown refresh while active.
    Tick { id: EntityId, remaining: f64 },
    /// A timer ran to completion or was finished explicitly. Not sent on cancel.
    Finished { id: EntityId, name: String },
    /// The manager removed the entity from its registry.
    Removed { id: EntityId },
}

impl EntityEvent {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            EntityEvent::StateChanged { id, .. }
            | EntityEvent::Tick { id, .. }
            | EntityEvent::Finished { id, .. }
            | EntityEvent::Removed { id } => id,
        }
    }
}

/// Failure reported by a host's external entity registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RegistryError(pub String);

/// Errors that can occur while operating on temporary entities.
#[derive(thiserror::Error, Debug)]
pub enum EntityError {
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    #[error("Entity {id} does not support {operation}: {reason}")]
    UnsupportedOperation {
        id: EntityId,
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: EntityId,
        from: EntityState,
        to: EntityState,
    },

    #[error("Restoration failed for {id}: {reason}")]
    Restoration { id: EntityId, reason: String },

    #[error("Removal of {id} failed: {source}")]
    Removal {
        id: EntityId,
        #[source]
        source: RegistryError,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),
}

/// Convenience result type.
pub type EntityResult<T> = Result<T, EntityError>;
