//! Background task that fires due entity callbacks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use temporary_entities::{EntityError, EntityResult};

use super::EntitySession;

/// Longest sleep between passes, so auto-save still happens when idle.
const MAX_IDLE: Duration = Duration::from_secs(30);

/// Spawn the driver on the current tokio runtime.
///
/// The task wakes at the next callback deadline, when `wake` is notified
/// (a command scheduled new work), or at most every 30 seconds. It exits
/// once `shutdown` is notified.
pub fn spawn_driver(
    session: Arc<Mutex<EntitySession>>,
    wake: Arc<Notify>,
    shutdown: Arc<Notify>,
) -> EntityResult<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| EntityError::SchedulerUnavailable(e.to_string()))?;

    Ok(runtime.spawn(async move {
        tracing::info!("Entity driver started");
        loop {
            let sleep_for = {
                let mut session = session.lock().await;
                let fired = session.run_due();
                if fired > 0 {
                    tracing::trace!("Fired {fired} callbacks");
                }
                time_until(session.next_deadline(), session.now())
            };

            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("Entity driver stopping");
                    break;
                }
                _ = wake.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }))
}

fn time_until(
    deadline: Option<chrono::DateTime<chrono::Utc>>,
    now: chrono::DateTime<chrono::Utc>,
) -> Duration {
    deadline
        .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
        .unwrap_or(MAX_IDLE)
        .min(MAX_IDLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta};

    #[test]
    fn test_time_until() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(time_until(None, now), MAX_IDLE);
        assert_eq!(time_until(Some(now - TimeDelta::seconds(3)), now), Duration::ZERO);
        assert_eq!(
            time_until(Some(now + TimeDelta::milliseconds(1500)), now),
            Duration::from_millis(1500)
        );
        assert_eq!(time_until(Some(now + TimeDelta::hours(1)), now), MAX_IDLE);
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = EntitySession::open(dir.path().join("state.json"), Default::default()).unwrap();
        let result = spawn_driver(
            Arc::new(Mutex::new(session)),
            Arc::new(Notify::new()),
            Arc::new(Notify::new()),
        );
        assert!(matches!(result, Err(EntityError::SchedulerUnavailable(_))));
    }
}
