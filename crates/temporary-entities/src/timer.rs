//! Countdown timer entity.
//!
//! Completion is driven by a one-shot finish callback at `end_time`; the
//! one-second tick only keeps `remaining` fresh for observers. Any transition
//! cancels the timer's pending callbacks before arming new ones, so a stale
//! tick never fires after a state change.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::lifecycle::{EntityContext, Lifecycle, TemporaryEntity};
use crate::scheduler::{Scheduler, TaskId, TaskKind};
use crate::snapshot::{format_hms, EntitySnapshot};
use crate::types::{EntityError, EntityEvent, EntityId, EntityKind, EntityResult, EntityState, Operation};

/// Period of the refresh tick while a timer runs.
pub const TICK_INTERVAL: TimeDelta = TimeDelta::seconds(1);

/// Duration given to a timer whose snapshot could not be used.
pub const DEFAULT_TIMER_DURATION: u64 = 60;

/// Longest accepted duration, one year. Longer requests are clamped to it.
pub const MAX_TIMER_DURATION: u64 = 365 * 86_400;

/// Start and end of the current run. Present only while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// A countdown timer.
#[derive(Debug)]
pub struct Timer {
    lifecycle: Lifecycle,
    duration: TimeDelta,
    remaining: TimeDelta,
    window: Option<RunWindow>,
    tick_task: Option<TaskId>,
    finish_task: Option<TaskId>,
}

/// Display attributes of a timer.
#[derive(Debug, Clone, Serialize)]
pub struct TimerAttributes {
    pub state: &'static str,
    pub duration: String,
    pub remaining: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finishes_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub expected_duration: Option<f64>,
}

impl Timer {
    /// A new, not yet started timer. It starts when attached to a manager.
    pub fn new(id: EntityId, name: impl Into<String>, duration_secs: u64, now: DateTime<Utc>) -> Self {
        let duration = secs(duration_secs);
        Self {
            lifecycle: Lifecycle::new(id, name, Some(duration), now),
            duration,
            remaining: duration,
            window: None,
            tick_task: None,
            finish_task: None,
        }
    }

    /// Rebuild a timer from its persisted snapshot.
    ///
    /// A missing snapshot gives a fresh timer. A corrupt or partial one is
    /// logged and also gives a fresh timer; restoration never fails.
    pub fn restore(id: EntityId, name: impl Into<String>, snapshot: Option<&Value>, now: DateTime<Utc>) -> Self {
        let name = name.into();
        let Some(raw) = snapshot else {
            return Self::new(id, name, DEFAULT_TIMER_DURATION, now);
        };

        match Self::from_snapshot(id.clone(), name.clone(), raw) {
            Ok(timer) => {
                tracing::info!(
                    "Restored timer {id}: {} with {:.2}s remaining",
                    timer.lifecycle.state(),
                    seconds_f64(timer.remaining)
                );
                timer
            }
            Err(e) => {
                tracing::warn!("{e}; treating timer as newly created");
                Self::new(id, name, DEFAULT_TIMER_DURATION, now)
            }
        }
    }

    fn from_snapshot(id: EntityId, name: String, raw: &Value) -> EntityResult<Self> {
        let snapshot = EntitySnapshot::from_value(raw).map_err(|e| EntityError::Restoration {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        let corrupt = |reason: String| EntityError::Restoration {
            id: id.clone(),
            reason,
        };

        if snapshot.kind != EntityKind::Timer {
            return Err(corrupt(format!("snapshot is a {}", snapshot.kind.as_str())));
        }
        if snapshot.id != id {
            return Err(corrupt(format!("snapshot belongs to {}", snapshot.id)));
        }
        if snapshot.duration < 0.0 {
            return Err(corrupt(format!("negative duration {}", snapshot.duration)));
        }
        if snapshot.duration > MAX_TIMER_DURATION as f64 {
            return Err(corrupt(format!("duration {} exceeds {MAX_TIMER_DURATION}s", snapshot.duration)));
        }

        let window = match (snapshot.start_time, snapshot.end_time) {
            (Some(start), Some(end)) if snapshot.state == EntityState::Active => Some(RunWindow { start, end }),
            (Some(_), None) | (None, Some(_)) if snapshot.state == EntityState::Active => {
                return Err(corrupt("only one of start_time and end_time".to_string()));
            }
            _ => None,
        };

        let lifecycle = Lifecycle::from_snapshot(id.clone(), name, &snapshot)?;
        let duration = secs_f64(snapshot.duration);
        let remaining = match lifecycle.state() {
            EntityState::Finalized => TimeDelta::zero(),
            _ => secs_f64(snapshot.remaining).clamp(TimeDelta::zero(), duration),
        };

        Ok(Self {
            lifecycle,
            duration,
            remaining,
            window,
            tick_task: None,
            finish_task: None,
        })
    }

    pub fn name(&self) -> &str {
        self.lifecycle.name()
    }

    pub fn state(&self) -> EntityState {
        self.lifecycle.state()
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    /// Remaining time as of the last transition or tick.
    pub fn remaining(&self) -> TimeDelta {
        self.remaining
    }

    /// Remaining time computed against `now` while running.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> TimeDelta {
        match self.window {
            Some(window) if self.lifecycle.is_active() => until(window.end, now),
            _ => self.remaining,
        }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.window.map(|w| w.start)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.window.map(|w| w.end)
    }

    /// Whether the timer holds any armed callback.
    pub fn has_pending_callbacks(&self) -> bool {
        self.tick_task.is_some() || self.finish_task.is_some()
    }

    /// Start or restart the countdown, optionally with a new duration.
    pub fn start(&mut self, duration: Option<u64>, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_not_finalized("start")?;
        self.cancel_callbacks(ctx.scheduler);

        match (duration, self.window) {
            (Some(secs_value), _) => {
                self.duration = secs(secs_value);
                self.remaining = self.duration;
                self.lifecycle.set_expected_duration(Some(self.duration));
            }
            (None, Some(window)) => {
                self.remaining = until(window.end, ctx.now).min(self.duration);
            }
            (None, None) => {}
        }

        let end = ctx.now.checked_add_signed(self.remaining).ok_or_else(|| EntityError::UnsupportedOperation {
            id: self.lifecycle.id().clone(),
            operation: "start",
            reason: "end time out of range".to_string(),
        })?;
        let window = RunWindow { start: ctx.now, end };
        self.window = Some(window);
        self.lifecycle.mark_active(ctx)?;

        let id = self.lifecycle.id().clone();
        self.tick_task = Some(ctx.scheduler.schedule_every(TaskKind::Tick(id.clone()), TICK_INTERVAL, ctx.now));
        self.finish_task = Some(ctx.scheduler.schedule_at(TaskKind::Finish(id), window.end));

        tracing::debug!(
            "Started timer {} for {:.2} seconds",
            self.lifecycle.id(),
            seconds_f64(self.remaining)
        );
        Ok(())
    }

    /// Freeze the countdown. A timer already at zero finishes instead.
    pub fn pause(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_state(EntityState::Active, "pause")?;
        self.cancel_callbacks(ctx.scheduler);

        if let Some(window) = self.window.take() {
            self.remaining = round_centis(until(window.end, ctx.now)).min(self.duration);
        }
        if self.remaining <= TimeDelta::zero() {
            return self.finish(ctx);
        }

        self.lifecycle.mark_paused(ctx)?;
        tracing::debug!(
            "Paused timer {} with {:.2} seconds remaining",
            self.lifecycle.id(),
            seconds_f64(self.remaining)
        );
        Ok(())
    }

    /// Continue a paused countdown from where it stopped.
    pub fn resume(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_state(EntityState::Paused, "resume")?;
        self.start(None, ctx)
    }

    /// Stop without completing. No finished event is emitted.
    pub fn cancel(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_not_finalized("cancel")?;
        self.finalize(ctx)?;
        tracing::debug!("Cancelled timer {}", self.lifecycle.id());
        Ok(())
    }

    /// Complete the timer and emit its finished event.
    pub fn finish(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_not_finalized("finish")?;
        self.finalize(ctx)?;
        tracing::info!("Timer {} finished", self.lifecycle.id());
        ctx.emit(EntityEvent::Finished {
            id: self.lifecycle.id().clone(),
            name: self.lifecycle.name().to_string(),
        });
        Ok(())
    }

    /// Refresh `remaining` from the end time, finishing at zero.
    pub fn tick(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.ensure_state(EntityState::Active, "tick")?;
        let Some(window) = self.window else {
            return Ok(());
        };

        self.remaining = until(window.end, ctx.now).min(self.duration);
        if self.remaining <= TimeDelta::zero() {
            return self.finish(ctx);
        }

        ctx.emit(EntityEvent::Tick {
            id: self.lifecycle.id().clone(),
            remaining: seconds_f64(self.remaining),
        });
        Ok(())
    }

    pub fn attributes(&self, now: DateTime<Utc>) -> TimerAttributes {
        TimerAttributes {
            state: self.lifecycle.state().display_state(),
            duration: format_hms(self.duration),
            remaining: format_hms(self.remaining_at(now)),
            finishes_at: self.end_time(),
            created_at: self.lifecycle.created_at(),
            finalized_at: self.lifecycle.finalized_at(),
            expected_duration: self.lifecycle.expected_duration().map(seconds_f64),
        }
    }

    pub(crate) fn on_task(&mut self, task: &TaskKind, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        match task {
            TaskKind::Tick(_) => self.tick(ctx),
            TaskKind::Finish(_) => {
                self.finish_task = None;
                self.finish(ctx)
            }
            TaskKind::Sweep => Ok(()),
        }
    }

    pub(crate) fn apply(&mut self, operation: Operation, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        match operation {
            Operation::Start { duration } => self.start(duration, ctx),
            Operation::Pause => self.pause(ctx),
            Operation::Resume => self.resume(ctx),
            Operation::Cancel => self.cancel(ctx),
            Operation::Finish => self.finish(ctx),
        }
    }

    fn finalize(&mut self, ctx: &mut EntityContext<'_>) -> EntityResult<()> {
        self.cancel_callbacks(ctx.scheduler);
        self.remaining = TimeDelta::zero();
        self.window = None;
        self.lifecycle.mark_finalized(ctx)
    }

    fn cancel_callbacks(&mut self, scheduler: &mut Scheduler) {
        if let Some(id) = self.tick_task.take() {
            scheduler.cancel(id);
        }
        if let Some(id) = self.finish_task.take() {
            scheduler.cancel(id);
        }
    }

    fn ensure_not_finalized(&self, operation: &'static str) -> EntityResult<()> {
        if self.lifecycle.is_finalized() {
            return Err(self.unsupported(operation));
        }
        Ok(())
    }

    fn ensure_state(&self, expected: EntityState, operation: &'static str) -> EntityResult<()> {
        if self.lifecycle.state() != expected {
            return Err(self.unsupported(operation));
        }
        Ok(())
    }

    fn unsupported(&self, operation: &'static str) -> EntityError {
        EntityError::UnsupportedOperation {
            id: self.lifecycle.id().clone(),
            operation,
            reason: format!("timer is {}", self.lifecycle.state().display_state()),
        }
    }
}

impl TemporaryEntity for Timer {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Timer
    }

    /// Arms a running timer. A timer whose end time passed while the process
    /// was down finishes here instead.
    fn on_attach(&mut self, ctx: &mut EntityContext<'_>) {
        if !self.lifecycle.is_active() {
            return;
        }

        if let Some(window) = self.window {
            self.remaining = until(window.end, ctx.now).min(self.duration);
        }

        let result = if self.remaining <= TimeDelta::zero() {
            self.finish(ctx)
        } else {
            self.start(None, ctx)
        };
        if let Err(e) = result {
            tracing::error!("Failed to arm timer {}: {e}", self.lifecycle.id());
        }
    }

    fn on_detach(&mut self, ctx: &mut EntityContext<'_>) {
        self.cancel_callbacks(ctx.scheduler);
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.lifecycle.id().clone(),
            name: self.lifecycle.name().to_string(),
            kind: EntityKind::Timer,
            created_at: self.lifecycle.created_at(),
            finalized_at: self.lifecycle.finalized_at(),
            expected_duration: self.lifecycle.expected_duration().map(seconds_f64),
            state: self.lifecycle.state(),
            duration: seconds_f64(self.duration),
            remaining: seconds_f64(self.remaining),
            start_time: self.start_time(),
            end_time: self.end_time(),
        }
    }
}

fn until(end: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    (end - now).max(TimeDelta::zero())
}

fn round_centis(delta: TimeDelta) -> TimeDelta {
    let ms = delta.num_milliseconds();
    TimeDelta::milliseconds((ms + 5) / 10 * 10)
}

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(value.min(MAX_TIMER_DURATION) as i64)
}

fn secs_f64(value: f64) -> TimeDelta {
    let ms = (value * 1000.0).round();
    TimeDelta::milliseconds(ms.clamp(0.0, (MAX_TIMER_DURATION * 1000) as f64) as i64)
}

fn seconds_f64(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}
