//! MCP tool implementations.

pub mod entity_delete;
pub mod entity_get;
pub mod entity_list;
pub mod registry;
pub mod timer_control;
pub mod timer_create;
pub mod timer_start;

pub use registry::ToolRegistry;
