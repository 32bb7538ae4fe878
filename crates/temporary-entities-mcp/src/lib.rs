//! Temporary Entities MCP server: self-expiring countdown timers over JSON-RPC.

pub mod config;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{resolve_manager_config, resolve_state_path, ConfigOverrides};
pub use protocol::ProtocolHandler;
pub use session::{spawn_driver, EntitySession, SnapshotStore};
pub use transport::StdioTransport;
