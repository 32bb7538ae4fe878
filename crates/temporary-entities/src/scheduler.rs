//! Handle table of pending callbacks.
//!
//! Callbacks are data, not closures: a [`TaskKind`] names what to do and the
//! [`crate::EntityManager`] performs it when the task comes due. Each owner
//! keeps the [`TaskId`]s it scheduled and cancels them itself; cancelling an
//! id twice, or one that already fired, is a no-op.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::EntityId;

/// Handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// What a scheduled callback does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Refresh a timer's remaining time.
    Tick(EntityId),
    /// Complete a timer at its end time.
    Finish(EntityId),
    /// Run the manager's cleanup sweep.
    Sweep,
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    kind: TaskKind,
    due: DateTime<Utc>,
    every: Option<TimeDelta>,
}

/// Pending one-shot and repeating callbacks, keyed by [`TaskId`].
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    tasks: BTreeMap<TaskId, ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `kind` once at `at`.
    pub fn schedule_at(&mut self, kind: TaskKind, at: DateTime<Utc>) -> TaskId {
        self.insert(ScheduledTask {
            kind,
            due: at,
            every: None,
        })
    }

    /// Fire `kind` every `every`, first at `now + every`.
    pub fn schedule_every(&mut self, kind: TaskKind, every: TimeDelta, now: DateTime<Utc>) -> TaskId {
        let every = every.max(TimeDelta::milliseconds(1));
        self.insert(ScheduledTask {
            kind,
            due: now + every,
            every: Some(every),
        })
    }

    /// Cancel a pending task. Returns whether anything was pending.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest due time among pending tasks.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.tasks.values().map(|t| t.due).min()
    }

    /// Take the earliest task due at or before `now`.
    ///
    /// Repeating tasks stay pending under the same id, re-armed one period
    /// later. A repeating task that fell behind skips the missed periods.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TaskId, TaskKind)> {
        let id = self
            .tasks
            .iter()
            .filter(|(_, task)| task.due <= now)
            .min_by_key(|(id, task)| (task.due, **id))
            .map(|(id, _)| *id)?;

        match self.tasks.get_mut(&id) {
            Some(task) => match task.every {
                Some(every) => {
                    let mut next = task.due + every;
                    if next <= now {
                        next = now + every;
                    }
                    task.due = next;
                    Some((id, task.kind.clone()))
                }
                None => self.tasks.remove(&id).map(|task| (id, task.kind)),
            },
            None => None,
        }
    }

    fn insert(&mut self, task: ScheduledTask) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(id, task);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_at(TaskKind::Sweep, t0() + TimeDelta::seconds(5));

        assert!(sched.pop_due(t0()).is_none());
        assert_eq!(sched.pop_due(t0() + TimeDelta::seconds(5)), Some((id, TaskKind::Sweep)));
        assert!(sched.pop_due(t0() + TimeDelta::seconds(10)).is_none());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_due_order_and_ties() {
        let mut sched = Scheduler::new();
        let late = sched.schedule_at(TaskKind::Finish("b".into()), t0() + TimeDelta::seconds(2));
        let early = sched.schedule_at(TaskKind::Finish("a".into()), t0() + TimeDelta::seconds(1));
        let tie = sched.schedule_at(TaskKind::Tick("a".into()), t0() + TimeDelta::seconds(1));

        let now = t0() + TimeDelta::seconds(3);
        assert_eq!(sched.pop_due(now).map(|(id, _)| id), Some(early));
        assert_eq!(sched.pop_due(now).map(|(id, _)| id), Some(tie));
        assert_eq!(sched.pop_due(now).map(|(id, _)| id), Some(late));
    }

    #[test]
    fn test_repeating_skips_missed_periods() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_every(TaskKind::Sweep, TimeDelta::seconds(60), t0());
        assert_eq!(sched.next_deadline(), Some(t0() + TimeDelta::seconds(60)));

        let now = t0() + TimeDelta::seconds(600);
        assert_eq!(sched.pop_due(now), Some((id, TaskKind::Sweep)));
        assert!(sched.pop_due(now).is_none());
        assert_eq!(sched.next_deadline(), Some(now + TimeDelta::seconds(60)));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut sched = Scheduler::new();
        let id = sched.schedule_every(TaskKind::Sweep, TimeDelta::seconds(1), t0());
        assert!(sched.is_pending(id));
        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        assert!(sched.next_deadline().is_none());
    }
}
