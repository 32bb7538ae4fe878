//! Temporary entities: self-expiring countdown timers, their lifecycle and
//! cleanup rules, and a manager that sweeps them away.

pub mod clock;
pub mod config;
pub mod entity;
pub mod lifecycle;
pub mod manager;
pub mod scheduler;
pub mod snapshot;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ManagerConfig};
pub use entity::Entity;
pub use lifecycle::{EntityContext, Lifecycle, TemporaryEntity};
pub use manager::{EntityManager, EntityRegistry, NullRegistry, RemovalOutcome};
pub use scheduler::{Scheduler, TaskId, TaskKind};
pub use snapshot::{format_hms, parse_hms, EntitySnapshot};
pub use timer::{Timer, TimerAttributes, DEFAULT_TIMER_DURATION, MAX_TIMER_DURATION, TICK_INTERVAL};
pub use types::*;
