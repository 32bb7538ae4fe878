//! Registry of live entities and the periodic cleanup sweep.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clock::Clock;
use crate::config::ManagerConfig;
use crate::entity::Entity;
use crate::lifecycle::{EntityContext, TemporaryEntity};
use crate::scheduler::{Scheduler, TaskId, TaskKind};
use crate::snapshot::EntitySnapshot;
use crate::timer::Timer;
use crate::types::{EntityError, EntityEvent, EntityId, EntityKind, EntityResult, Operation, RegistryError};

/// The host's own record of entities, told when one is removed for good.
pub trait EntityRegistry: Send {
    fn deregister(&mut self, id: &EntityId) -> Result<(), RegistryError>;
}

/// Registry for hosts that keep no external bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRegistry;

impl EntityRegistry for NullRegistry {
    fn deregister(&mut self, _id: &EntityId) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Result of [`EntityManager::remove_entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    NotFound,
}

/// Owns every live entity, their callbacks, and the cleanup sweep.
pub struct EntityManager<R: EntityRegistry = NullRegistry> {
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    registry: R,
    entities: HashMap<EntityId, Entity>,
    scheduler: Scheduler,
    sweep_task: Option<TaskId>,
    events: Vec<EntityEvent>,
}

impl EntityManager<NullRegistry> {
    pub fn new(config: ManagerConfig, clock: Arc<dyn Clock>) -> EntityResult<Self> {
        Self::with_registry(config, clock, NullRegistry)
    }
}

impl<R: EntityRegistry> EntityManager<R> {
    /// Create a manager. Fails if `config` is out of range.
    pub fn with_registry(config: ManagerConfig, clock: Arc<dyn Clock>, registry: R) -> EntityResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            registry,
            entities: HashMap::new(),
            scheduler: Scheduler::new(),
            sweep_task: None,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Replace the tunables. A running sweep is re-armed at the new interval.
    pub fn reconfigure(&mut self, config: ManagerConfig) -> EntityResult<()> {
        config.validate()?;
        let rearm = self.is_running() && config.cleanup_interval != self.config.cleanup_interval;
        self.config = config;
        if rearm {
            self.stop();
            self.start();
        }
        tracing::info!("Manager reconfigured: {:?}", self.config);
        Ok(())
    }

    /// Arm the periodic sweep. Calling it again while armed does nothing.
    pub fn start(&mut self) {
        if self.sweep_task.is_some() {
            return;
        }
        let now = self.clock.now();
        self.sweep_task = Some(
            self.scheduler
                .schedule_every(TaskKind::Sweep, self.config.sweep_period(), now),
        );
        tracing::info!("Cleanup sweep armed every {}s", self.config.cleanup_interval);
    }

    /// Disarm the periodic sweep.
    pub fn stop(&mut self) {
        if let Some(task) = self.sweep_task.take() {
            self.scheduler.cancel(task);
            tracing::info!("Cleanup sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweep_task.is_some()
    }

    /// Add an entity and attach it. An entity already registered under the
    /// same id is detached and replaced.
    pub fn register(&mut self, entity: impl Into<Entity>) -> EntityId {
        let entity = entity.into();
        let id = entity.id().clone();

        if self.unregister(&id).is_some() {
            tracing::debug!("Replacing registered entity {id}");
        }
        self.entities.insert(id.clone(), entity);
        self.with_entity(&id, |entity, ctx| entity.on_attach(ctx));

        tracing::debug!("Registered {id}");
        id
    }

    /// Drop an entity from the map and cancel its callbacks, without telling
    /// the external registry.
    pub fn unregister(&mut self, id: &EntityId) -> Option<Entity> {
        let mut entity = self.entities.remove(id)?;
        let now = self.clock.now();
        let mut ctx = EntityContext::new(now, &mut self.scheduler, &mut self.events);
        entity.on_detach(&mut ctx);
        Some(entity)
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All live entities, ordered by creation time.
    pub fn entities(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_by(|a, b| {
            (a.lifecycle().created_at(), a.id()).cmp(&(b.lifecycle().created_at(), b.id()))
        });
        all
    }

    /// Create and start a timer.
    pub fn create_timer(&mut self, name: impl Into<String>, duration_secs: u64) -> EntityId {
        let id = EntityId::generate(EntityKind::Timer);
        let timer = Timer::new(id, name, duration_secs, self.clock.now());
        self.register(timer)
    }

    /// Rebuild a timer from its persisted snapshot and register it.
    ///
    /// A timer whose end time passed while the process was down finishes
    /// during this call.
    pub fn restore_timer(&mut self, id: EntityId, name: impl Into<String>, snapshot: Option<&Value>) -> EntityId {
        let timer = Timer::restore(id, name, snapshot, self.clock.now());
        self.register(timer)
    }

    /// Apply an external operation to one entity.
    pub fn apply(&mut self, id: &EntityId, operation: Operation) -> EntityResult<()> {
        let result = self
            .with_entity(id, |entity, ctx| entity.apply(operation, ctx))
            .unwrap_or_else(|| Err(EntityError::NotFound(id.clone())));

        match &result {
            Err(e @ EntityError::NotFound(_)) => tracing::warn!("{} rejected: {e}", operation.name()),
            Err(e @ EntityError::UnsupportedOperation { .. }) => tracing::error!("{e}"),
            Err(e) => tracing::error!("{} on {id} failed: {e}", operation.name()),
            Ok(()) => {}
        }
        result
    }

    /// Remove an entity for good. Unknown ids are reported, never an error.
    ///
    /// The external registry is told first; if it fails the failure is
    /// logged and the entity is still dropped from memory.
    pub fn remove_entity(&mut self, id: &EntityId) -> RemovalOutcome {
        if !self.entities.contains_key(id) {
            tracing::warn!("Entity {id} not found for removal");
            return RemovalOutcome::NotFound;
        }

        if let Err(source) = self.registry.deregister(id) {
            let err = EntityError::Removal {
                id: id.clone(),
                source,
            };
            tracing::error!("{err}");
        }

        self.unregister(id);
        self.events.push(EntityEvent::Removed { id: id.clone() });
        tracing::debug!("Removed {id}");
        RemovalOutcome::Removed
    }

    pub fn should_persist(&self, id: &EntityId) -> bool {
        self.entities
            .get(id)
            .is_some_and(|entity| entity.should_persist(&self.config))
    }

    /// One cleanup pass. Returns the ids that were removed.
    pub fn sweep(&mut self) -> Vec<EntityId> {
        let now = self.clock.now();
        let mut due: Vec<EntityId> = self
            .entities
            .values()
            .filter(|entity| entity.should_cleanup(now, &self.config))
            .map(|entity| entity.id().clone())
            .collect();
        due.sort();

        let removed: Vec<EntityId> = due
            .into_iter()
            .filter(|id| self.remove_entity(id) == RemovalOutcome::Removed)
            .collect();

        if removed.is_empty() {
            tracing::debug!("Sweep removed nothing ({} live)", self.entities.len());
        } else {
            tracing::info!("Sweep removed {} entities", removed.len());
        }
        removed
    }

    /// Fire every callback due at the current instant. Returns how many ran.
    pub fn run_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;

        while let Some((task_id, kind)) = self.scheduler.pop_due(now) {
            fired += 1;
            match &kind {
                TaskKind::Sweep => {
                    self.sweep();
                }
                TaskKind::Tick(id) | TaskKind::Finish(id) => {
                    match self.with_entity(id, |entity, ctx| entity.on_task(&kind, ctx)) {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            tracing::debug!("Dropping callback for {id}: {e}");
                            self.scheduler.cancel(task_id);
                        }
                        None => {
                            tracing::debug!("Dropping callback for missing entity {id}");
                            self.scheduler.cancel(task_id);
                        }
                    }
                }
            }
        }
        fired
    }

    /// When the next callback is due, if any.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_deadline()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Take all events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self, id: &EntityId) -> Option<EntitySnapshot> {
        self.entities.get(id).map(|entity| entity.snapshot())
    }

    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities().into_iter().map(|entity| entity.snapshot()).collect()
    }

    /// Snapshots of the entities worth keeping across a restart.
    pub fn persistable_snapshots(&self) -> Vec<EntitySnapshot> {
        self.entities()
            .into_iter()
            .filter(|entity| {
                let keep = entity.should_persist(&self.config);
                if !keep {
                    tracing::debug!("Not persisting short-lived {}", entity.id());
                }
                keep
            })
            .map(|entity| entity.snapshot())
            .collect()
    }

    fn with_entity<T>(
        &mut self,
        id: &EntityId,
        f: impl FnOnce(&mut Entity, &mut EntityContext<'_>) -> T,
    ) -> Option<T> {
        let now = self.clock.now();
        let entity = self.entities.get_mut(id)?;
        let mut ctx = EntityContext::new(now, &mut self.scheduler, &mut self.events);
        Some(f(entity, &mut ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::EntityState;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn manager() -> (EntityManager, ManualClock) {
        let clock = ManualClock::starting_at(t0());
        let manager = EntityManager::new(ManagerConfig::default(), Arc::new(clock.clone())).unwrap();
        (manager, clock)
    }

    fn state_of<R: EntityRegistry>(manager: &EntityManager<R>, id: &EntityId) -> EntityState {
        manager.get(id).unwrap().lifecycle().state()
    }

    fn finished(events: &[EntityEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EntityEvent::Finished { .. }))
            .count()
    }

    struct FailingRegistry {
        calls: usize,
    }

    impl EntityRegistry for FailingRegistry {
        fn deregister(&mut self, id: &EntityId) -> Result<(), RegistryError> {
            self.calls += 1;
            Err(RegistryError(format!("cannot drop {id}")))
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ManagerConfig {
            inactive_max_age: 10,
            ..ManagerConfig::default()
        };
        let result = EntityManager::new(config, Arc::new(ManualClock::starting_at(t0())));
        assert!(matches!(result, Err(EntityError::Config(_))));
    }

    #[test]
    fn test_timer_runs_to_completion_once() {
        let (mut manager, clock) = manager();
        let id = manager.create_timer("eggs", 10);
        assert_eq!(state_of(&manager, &id), EntityState::Active);

        for _ in 0..9 {
            clock.advance_secs(1);
            manager.run_due();
        }
        assert_eq!(state_of(&manager, &id), EntityState::Active);

        clock.advance_secs(1);
        manager.run_due();
        assert_eq!(state_of(&manager, &id), EntityState::Finalized);
        assert_eq!(manager.pending_tasks(), 0);

        let events = manager.drain_events();
        assert_eq!(finished(&events), 1);

        let err = manager.apply(&id, Operation::Finish).unwrap_err();
        assert!(matches!(err, EntityError::UnsupportedOperation { .. }));
        assert_eq!(finished(&manager.drain_events()), 0);
    }

    #[test]
    fn test_late_wakeup_finishes_by_deadline() {
        let (mut manager, clock) = manager();
        let id = manager.create_timer("eggs", 10);

        clock.advance_secs(45);
        manager.run_due();
        let timer = manager.get(&id).unwrap().as_timer().unwrap();
        assert_eq!(timer.state(), EntityState::Finalized);
        assert_eq!(timer.remaining(), TimeDelta::zero());
        assert_eq!(finished(&manager.drain_events()), 1);
    }

    #[test]
    fn test_finalized_swept_after_grace() {
        let (mut manager, clock) = manager();
        manager.start();
        let id = manager.create_timer("tea", 600);
        manager.apply(&id, Operation::Cancel).unwrap();

        clock.advance_secs(29);
        assert!(manager.sweep().is_empty());

        clock.advance_secs(1);
        assert_eq!(manager.sweep(), vec![id.clone()]);
        assert!(!manager.contains(&id));
    }

    #[test]
    fn test_sweep_runs_on_interval() {
        let (mut manager, clock) = manager();
        manager.start();
        manager.start();
        assert_eq!(manager.pending_tasks(), 1);

        let id = manager.create_timer("tea", 600);
        manager.apply(&id, Operation::Finish).unwrap();

        clock.advance_secs(299);
        manager.run_due();
        assert!(manager.contains(&id));

        clock.advance_secs(1);
        manager.run_due();
        assert!(!manager.contains(&id));
        assert!(manager
            .drain_events()
            .iter()
            .any(|e| matches!(e, EntityEvent::Removed { id: removed } if *removed == id)));
    }

    #[test]
    fn test_paused_kept_until_max_age_from_creation() {
        let (mut manager, clock) = manager();
        let id = manager.create_timer("bread", 7200);

        clock.advance_secs(3600);
        manager.apply(&id, Operation::Pause).unwrap();

        clock.advance_secs(86_400 - 3600 - 1);
        assert!(manager.sweep().is_empty());

        clock.advance_secs(1);
        assert_eq!(manager.sweep(), vec![id]);
    }

    #[test]
    fn test_active_never_swept() {
        let (mut manager, clock) = manager();
        let id = manager.create_timer("long", 1_000_000);
        clock.advance_secs(700_000);
        assert!(manager.sweep().is_empty());
        assert!(manager.contains(&id));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut manager, _clock) = manager();
        let id = manager.create_timer("tea", 60);

        assert_eq!(manager.remove_entity(&id), RemovalOutcome::Removed);
        assert_eq!(manager.remove_entity(&id), RemovalOutcome::NotFound);
        assert_eq!(manager.remove_entity(&"timer_nope".into()), RemovalOutcome::NotFound);
        assert_eq!(manager.pending_tasks(), 0);
    }

    #[test]
    fn test_registry_failure_does_not_block_removal() {
        let clock = ManualClock::starting_at(t0());
        let mut manager = EntityManager::with_registry(
            ManagerConfig::default(),
            Arc::new(clock.clone()),
            FailingRegistry { calls: 0 },
        )
        .unwrap();

        let a = manager.create_timer("a", 60);
        let b = manager.create_timer("b", 60);
        manager.apply(&a, Operation::Cancel).unwrap();
        manager.apply(&b, Operation::Cancel).unwrap();

        clock.advance_secs(30);
        assert_eq!(manager.sweep().len(), 2);
        assert!(manager.is_empty());
        assert_eq!(manager.registry().calls, 2);
    }

    #[test]
    fn test_apply_unknown_id() {
        let (mut manager, _clock) = manager();
        let err = manager.apply(&"timer_ghost".into(), Operation::Pause).unwrap_err();
        assert!(matches!(err, EntityError::NotFound(_)));
    }

    #[test]
    fn test_restart_finishes_expired_timer() {
        let (mut before, clock) = manager();
        let id = before.create_timer("roast", 100);
        clock.advance_secs(50);
        before.run_due();
        let snapshot = before.snapshot(&id).unwrap();
        assert_eq!(snapshot.remaining, 50.0);
        drop(before);

        clock.advance_secs(70);
        let mut after = EntityManager::new(ManagerConfig::default(), Arc::new(clock.clone())).unwrap();
        after.restore_timer(id.clone(), "roast", Some(&snapshot.to_value()));

        let timer = after.get(&id).unwrap().as_timer().unwrap();
        assert_eq!(timer.state(), EntityState::Finalized);
        assert_eq!(timer.remaining(), TimeDelta::zero());
        assert!(timer.lifecycle().finalized_at().is_some());
        assert_eq!(finished(&after.drain_events()), 1);
        assert_eq!(after.pending_tasks(), 0);
    }

    #[test]
    fn test_restart_resumes_running_timer() {
        let (mut before, clock) = manager();
        let id = before.create_timer("roast", 100);
        clock.advance_secs(20);
        let snapshot = before.snapshot(&id).unwrap().to_value();

        clock.advance_secs(30);
        let mut after = EntityManager::new(ManagerConfig::default(), Arc::new(clock.clone())).unwrap();
        after.restore_timer(id.clone(), "roast", Some(&snapshot));

        let timer = after.get(&id).unwrap().as_timer().unwrap();
        assert_eq!(timer.state(), EntityState::Active);
        assert_eq!(timer.remaining(), TimeDelta::seconds(50));
        assert_eq!(timer.end_time(), Some(t0() + TimeDelta::seconds(100)));
        assert_eq!(after.pending_tasks(), 2);
    }

    #[test]
    fn test_restore_keeps_finalized_timestamp() {
        let (mut before, clock) = manager();
        let id = before.create_timer("tea", 60);
        clock.advance_secs(5);
        before.apply(&id, Operation::Cancel).unwrap();
        let snapshot = before.snapshot(&id).unwrap().to_value();

        clock.advance_secs(100);
        let mut after = EntityManager::new(ManagerConfig::default(), Arc::new(clock.clone())).unwrap();
        after.restore_timer(id.clone(), "tea", Some(&snapshot));

        let lifecycle = after.get(&id).unwrap().lifecycle().clone();
        assert!(lifecycle.is_finalized());
        assert_eq!(lifecycle.finalized_at(), Some(t0() + TimeDelta::seconds(5)));
        assert!(after.drain_events().is_empty());
        assert_eq!(after.sweep(), vec![id]);
    }

    #[test]
    fn test_oversized_duration_is_clamped() {
        let (mut manager, _clock) = manager();
        let id = manager.create_timer("forever", 10_000_000_000_000);

        let timer = manager.get(&id).unwrap().as_timer().unwrap();
        assert_eq!(timer.state(), EntityState::Active);
        assert_eq!(timer.duration(), TimeDelta::days(365));
        assert_eq!(timer.end_time(), Some(t0() + TimeDelta::days(365)));
    }

    #[test]
    fn test_oversized_snapshot_restarts_fresh() {
        let (mut before, clock) = manager();
        let id = before.create_timer("forever", 600);
        let mut snapshot = before.snapshot(&id).unwrap().to_value();
        let fields = snapshot.as_object_mut().unwrap();
        fields.insert("duration".to_string(), serde_json::json!(1e13));
        fields.insert("remaining".to_string(), serde_json::json!(1e13));
        fields.remove("start_time");
        fields.remove("end_time");

        let mut after = EntityManager::new(ManagerConfig::default(), Arc::new(clock.clone())).unwrap();
        after.restore_timer(id.clone(), "forever", Some(&snapshot));

        let timer = after.get(&id).unwrap().as_timer().unwrap();
        assert_eq!(timer.state(), EntityState::Active);
        assert_eq!(timer.duration(), TimeDelta::seconds(60));
    }

    #[test]
    fn test_persistable_snapshots_skip_short_timers() {
        let (mut manager, _clock) = manager();
        let short = manager.create_timer("blink", 30);
        let long = manager.create_timer("nap", 1200);

        assert!(!manager.should_persist(&short));
        assert!(manager.should_persist(&long));
        let ids: Vec<EntityId> = manager.persistable_snapshots().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![long]);
        assert_eq!(manager.snapshots().len(), 2);
    }

    #[test]
    fn test_register_replaces_and_detaches() {
        let (mut manager, clock) = manager();
        let id = manager.create_timer("tea", 60);
        assert_eq!(manager.pending_tasks(), 2);

        manager.register(Timer::new(id.clone(), "tea again", 120, clock.now()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.pending_tasks(), 2);
        assert_eq!(manager.get(&id).unwrap().lifecycle().name(), "tea again");
    }

    #[test]
    fn test_reconfigure_rearms_sweep() {
        let (mut manager, clock) = manager();
        manager.start();
        assert_eq!(manager.next_deadline(), Some(t0() + TimeDelta::seconds(300)));

        let config = ManagerConfig {
            cleanup_interval: 60,
            ..ManagerConfig::default()
        };
        manager.reconfigure(config).unwrap();
        assert_eq!(manager.next_deadline(), Some(clock.now() + TimeDelta::seconds(60)));

        let bad = ManagerConfig {
            finalized_grace_period: 301,
            ..ManagerConfig::default()
        };
        assert!(manager.reconfigure(bad).is_err());
        assert_eq!(manager.config().cleanup_interval, 60);

        manager.stop();
        manager.stop();
        assert!(!manager.is_running());
        assert!(manager.next_deadline().is_none());
    }
}
