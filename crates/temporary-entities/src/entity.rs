//! The closed set of entity kinds the manager can hold.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::lifecycle::{EntityContext, Lifecycle, TemporaryEntity};
use crate::scheduler::TaskKind;
use crate::snapshot::EntitySnapshot;
use crate::timer::Timer;
use crate::types::{EntityError, EntityKind, EntityResult, Operation};

/// A registered temporary entity.
#[derive(Debug)]
pub enum Entity {
    Timer(Timer),
}

impl Entity {
    /// Whether this kind accepts `operation` at all, regardless of state.
    pub fn supports(&self, operation: &Operation) -> bool {
        match self {
            Entity::Timer(_) => matches!(
                operation,
                Operation::Start { .. }
                    | Operation::Pause
                    | Operation::Resume
                    | Operation::Cancel
                    | Operation::Finish
            ),
        }
    }

    pub fn as_timer(&self) -> Option<&Timer> {
        match self {
            Entity::Timer(timer) => Some(timer),
        }
    }

    /// Display attributes as JSON.
    pub fn attributes(&self, now: DateTime<Utc>) -> Value {
        match self {
            Entity::Timer(timer) => serde_json::to_value(timer.attributes(now)).unwrap_or(Value::Null),
        }
    }

    pub(crate) fn apply(&mut self, operation: Operation, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        if !self.supports(&operation) {
            return Err(EntityError::UnsupportedOperation {
                id: self.id().clone(),
                operation: operation.name(),
                reason: format!("not supported by {} entities", self.kind().as_str()),
            });
        }
        match self {
            Entity::Timer(timer) => timer.apply(operation, ctx),
        }
    }

    pub(crate) fn on_task(&mut self, task: &TaskKind, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        match self {
            Entity::Timer(timer) => timer.on_task(task, ctx),
        }
    }
}

impl From<Timer> for Entity {
    fn from(timer: Timer) -> Self {
        Entity::Timer(timer)
    }
}

impl TemporaryEntity for Entity {
    fn lifecycle(&self) -> &Lifecycle {
        match self {
            Entity::Timer(timer) => timer.lifecycle(),
        }
    }

    fn kind(&self) -> EntityKind {
        match self {
            Entity::Timer(timer) => timer.kind(),
        }
    }

    fn on_attach(&mut self, ctx: &mut EntityContext<'_>) {
        match self {
            Entity::Timer(timer) => timer.on_attach(ctx),
        }
    }

    fn on_detach(&mut self, ctx: &mut EntityContext<'_>) {
        match self {
            Entity::Timer(timer) => timer.on_detach(ctx),
        }
    }

    fn snapshot(&self) -> EntitySnapshot {
        match self {
            Entity::Timer(timer) => timer.snapshot(),
        }
    }
}
