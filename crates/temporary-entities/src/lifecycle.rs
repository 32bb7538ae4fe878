//! Shared lifecycle of every temporary entity: state, timestamps, and the
//! persistence and cleanup rules.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::ManagerConfig;
use crate::scheduler::Scheduler;
use crate::snapshot::EntitySnapshot;
use crate::types::{EntityError, EntityEvent, EntityId, EntityKind, EntityResult, EntityState};

/// What an entity may touch while handling an operation or callback.
///
/// `now` is read once per operation so a single transition sees one instant.
pub struct EntityContext<'a> {
    pub now: DateTime<Utc>,
    pub scheduler: &'a mut Scheduler,
    events: &'a mut Vec<EntityEvent>,
}

impl<'a> EntityContext<'a> {
    pub fn new(now: DateTime<Utc>, scheduler: &'a mut Scheduler, events: &'a mut Vec<EntityEvent>) -> Self {
        Self {
            now,
            scheduler,
            events,
        }
    }

    /// Notify observers.
    pub fn emit(&mut self, event: EntityEvent) {
        self.events.push(event);
    }
}

/// Runtime hooks and serialization shared by all entity kinds.
pub trait TemporaryEntity {
    fn lifecycle(&self) -> &Lifecycle;

    fn kind(&self) -> EntityKind;

    /// Called by the manager right after registration. Restored entities
    /// re-arm their callbacks here.
    fn on_attach(&mut self, ctx: &mut EntityContext<'_>);

    /// Called by the manager when the entity is removed. Must cancel every
    /// callback the entity owns.
    fn on_detach(&mut self, ctx: &mut EntityContext<'_>);

    fn snapshot(&self) -> EntitySnapshot;

    fn id(&self) -> &EntityId {
        self.lifecycle().id()
    }

    fn should_persist(&self, config: &ManagerConfig) -> bool {
        self.lifecycle().should_persist(config)
    }

    fn should_cleanup(&self, now: DateTime<Utc>, config: &ManagerConfig) -> bool {
        self.lifecycle().should_cleanup(now, config)
    }
}

/// Identity, timestamps and state of a temporary entity.
///
/// Invariant: `finalized_at.is_some()` exactly when `state == Finalized`, and
/// then `created_at <= finalized_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    id: EntityId,
    name: String,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    expected_duration: Option<TimeDelta>,
    state: EntityState,
}

impl Lifecycle {
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        expected_duration: Option<TimeDelta>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: now,
            finalized_at: None,
            expected_duration,
            state: EntityState::Active,
        }
    }

    /// Rebuild from a snapshot, rejecting one that breaks the invariants.
    pub fn from_snapshot(id: EntityId, name: impl Into<String>, snapshot: &EntitySnapshot) -> EntityResult<Self> {
        let corrupt = |reason: String| EntityError::Restoration {
            id: id.clone(),
            reason,
        };

        match (snapshot.state, snapshot.finalized_at) {
            (EntityState::Finalized, None) => {
                return Err(corrupt("finalized without finalized_at".to_string()));
            }
            (EntityState::Active | EntityState::Paused, Some(_)) => {
                return Err(corrupt(format!("{} with finalized_at", snapshot.state)));
            }
            (_, Some(finalized_at)) if finalized_at < snapshot.created_at => {
                return Err(corrupt("finalized_at precedes created_at".to_string()));
            }
            _ => {}
        }

        let expected_duration = match snapshot.expected_duration {
            Some(secs) if secs.is_finite() && secs >= 0.0 => {
                Some(TimeDelta::milliseconds((secs * 1000.0).round() as i64))
            }
            Some(secs) => return Err(corrupt(format!("invalid expected_duration {secs}"))),
            None => None,
        };

        Ok(Self {
            id,
            name: name.into(),
            created_at: snapshot.created_at,
            finalized_at: snapshot.finalized_at,
            expected_duration,
            state: snapshot.state,
        })
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn expected_duration(&self) -> Option<TimeDelta> {
        self.expected_duration
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EntityState::Active
    }

    pub fn is_paused(&self) -> bool {
        self.state == EntityState::Paused
    }

    pub fn is_finalized(&self) -> bool {
        self.state == EntityState::Finalized
    }

    /// Unknown durations always persist; otherwise only those at or above
    /// the configured threshold.
    pub fn should_persist(&self, config: &ManagerConfig) -> bool {
        match self.expected_duration {
            None => true,
            Some(expected) => expected >= config.persist_threshold(),
        }
    }

    /// Active entities are never cleaned up. Finalized ones go after the
    /// grace period; paused ones once their age since creation reaches the
    /// inactive limit.
    pub fn should_cleanup(&self, now: DateTime<Utc>, config: &ManagerConfig) -> bool {
        match self.state {
            EntityState::Active => false,
            EntityState::Finalized => self
                .finalized_at
                .is_some_and(|at| now - at >= config.grace_period()),
            EntityState::Paused => now - self.created_at >= config.max_inactive_age(),
        }
    }

    pub(crate) fn set_expected_duration(&mut self, expected: Option<TimeDelta>) {
        self.expected_duration = expected;
    }

    pub(crate) fn mark_active(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.transition(EntityState::Active, ctx)
    }

    pub(crate) fn mark_paused(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.transition(EntityState::Paused, ctx)
    }

    pub(crate) fn mark_finalized(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.transition(EntityState::Finalized, ctx)
    }

    fn transition(&mut self, to: EntityState, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        if self.state == EntityState::Finalized {
            tracing::error!("Rejected transition of finalized entity {} to {to}", self.id);
            return Err(EntityError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to,
            });
        }

        self.state = to;
        if to == EntityState::Finalized {
            self.finalized_at = Some(ctx.now.max(self.created_at));
        }

        ctx.emit(EntityEvent::StateChanged {
            id: self.id.clone(),
            state: to,
        });
        Ok(())
    }
}
