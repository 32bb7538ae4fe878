//! Entity session: the manager, its state file, and save tracking.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};

use temporary_entities::{
    Clock, EntityEvent, EntityId, EntityManager, ManagerConfig, Operation, RemovalOutcome, SystemClock,
};

use super::store::SnapshotStore;
use crate::types::{EntityView, McpError, McpResult};

const DEFAULT_AUTO_SAVE_SECS: u64 = 30;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owns the entity manager and keeps the state file in step with it.
pub struct EntitySession {
    manager: EntityManager<SnapshotStore>,
    finished: broadcast::Sender<EntityEvent>,
    unheard: Vec<EntityEvent>,
    wake: Arc<Notify>,
    dirty: bool,
    last_save: Instant,
    auto_save_interval: Duration,
}

impl EntitySession {
    /// Open the state file at `path` and restore its entities.
    pub fn open(path: impl AsRef<Path>, config: ManagerConfig) -> McpResult<Self> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: impl AsRef<Path>, config: ManagerConfig, clock: Arc<dyn Clock>) -> McpResult<Self> {
        let store = SnapshotStore::open(path)?;
        let persisted: Vec<(String, serde_json::Value)> = store
            .entries()
            .map(|(id, raw)| (id.to_string(), raw.clone()))
            .collect();

        let mut manager = EntityManager::with_registry(config, clock, store)?;
        for (id, raw) in &persisted {
            let name = raw
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or(id.as_str())
                .to_string();
            manager.restore_timer(EntityId::new(id.as_str()), name, Some(raw));
        }
        manager.start();

        let (finished, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut session = Self {
            manager,
            finished,
            unheard: Vec::new(),
            wake: Arc::new(Notify::new()),
            dirty: false,
            last_save: Instant::now(),
            auto_save_interval: Duration::from_secs(DEFAULT_AUTO_SAVE_SECS),
        };
        session.process_events();

        tracing::info!(
            "Session opened: {} entities restored from {}",
            session.manager.len(),
            session.manager.registry().path().display()
        );
        Ok(session)
    }

    pub fn config(&self) -> &ManagerConfig {
        self.manager.config()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.manager.now()
    }

    pub fn state_path(&self) -> &Path {
        self.manager.registry().path()
    }

    pub fn len(&self) -> usize {
        self.manager.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Finished timers, as they happen. Finishes nobody was listening for,
    /// such as timers that ran out while the process was down, are replayed
    /// to the first subscriber.
    pub fn subscribe(&mut self) -> broadcast::Receiver<EntityEvent> {
        let rx = self.finished.subscribe();
        for event in std::mem::take(&mut self.unheard) {
            if self.finished.send(event).is_err() {
                tracing::debug!("Replay of finished event lost");
            }
        }
        rx
    }

    /// Notified whenever new callbacks were scheduled.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn create_timer(&mut self, name: &str, duration: u64) -> McpResult<EntityView> {
        let id = self.manager.create_timer(name, duration);
        tracing::info!("Created timer {id} ({name}) for {duration}s");
        self.after_change();
        self.view(&id)
    }

    pub fn apply(&mut self, id: &str, operation: Operation) -> McpResult<EntityView> {
        let id = EntityId::new(id);
        let result = self.manager.apply(&id, operation);
        self.after_change();
        result?;
        self.view(&id)
    }

    pub fn delete(&mut self, id: &str) -> RemovalOutcome {
        let outcome = self.manager.remove_entity(&EntityId::new(id));
        self.after_change();
        outcome
    }

    pub fn get(&self, id: &str) -> McpResult<EntityView> {
        self.view(&EntityId::new(id))
    }

    pub fn list(&self) -> Vec<EntityView> {
        let now = self.manager.now();
        self.manager
            .entities()
            .into_iter()
            .map(|entity| EntityView::new(entity, self.manager.config(), now))
            .collect()
    }

    /// Fire due callbacks, publish what they produced, and auto-save.
    pub fn run_due(&mut self) -> usize {
        let fired = self.manager.run_due();
        self.process_events();
        if let Err(e) = self.maybe_auto_save() {
            tracing::error!("Auto-save failed: {e}");
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.manager.next_deadline()
    }

    /// Write persistable entities to the state file if anything changed.
    pub fn save(&mut self) -> McpResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let snapshots = self.manager.persistable_snapshots();
        let store = self.manager.registry_mut();
        store.replace(snapshots);
        store.save()?;

        self.dirty = false;
        self.last_save = Instant::now();
        Ok(())
    }

    /// Stop the sweep and save. Used on shutdown.
    pub fn close(&mut self) -> McpResult<()> {
        self.manager.stop();
        self.save()
    }

    fn view(&self, id: &EntityId) -> McpResult<EntityView> {
        self.manager
            .get(id)
            .map(|entity| EntityView::new(entity, self.manager.config(), self.manager.now()))
            .ok_or_else(|| McpError::EntityNotFound(id.to_string()))
    }

    fn after_change(&mut self) {
        self.process_events();
        self.wake.notify_one();
        if let Err(e) = self.maybe_auto_save() {
            tracing::error!("Auto-save failed: {e}");
        }
    }

    fn process_events(&mut self) {
        for event in self.manager.drain_events() {
            match &event {
                // A transition can also take an entity below the persist
                // threshold, and its old entry must then leave the file.
                EntityEvent::StateChanged { .. } | EntityEvent::Removed { .. } => self.dirty = true,
                EntityEvent::Tick { .. } => {}
                EntityEvent::Finished { id, name } => {
                    tracing::info!("Timer finished: {name} ({id})");
                    if let Err(broadcast::error::SendError(event)) = self.finished.send(event.clone()) {
                        if self.unheard.len() < EVENT_CHANNEL_CAPACITY {
                            tracing::debug!("No subscribers for finish of {id}, holding it");
                            self.unheard.push(event);
                        }
                    }
                }
            }
        }
    }

    fn maybe_auto_save(&mut self) -> McpResult<()> {
        if self.dirty && self.last_save.elapsed() >= self.auto_save_interval {
            self.save()?;
        }
        Ok(())
    }
}

impl Drop for EntitySession {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                tracing::error!("Failed to save on drop: {e}");
            }
        }
    }
}
