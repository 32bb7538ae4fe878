//! Entity session, its state file, and the callback driver.

pub mod driver;
pub mod manager;
pub mod store;

pub use driver::spawn_driver;
pub use manager::EntitySession;
pub use store::SnapshotStore;
