//! Tool registration and dispatch.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::Value;

use crate::session::EntitySession;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{entity_delete, entity_get, entity_list, timer_control, timer_create, timer_start};

pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        let mut tools = vec![timer_create::definition(), timer_start::definition()];
        tools.extend(timer_control::definitions());
        tools.extend([
            entity_delete::definition(),
            entity_get::definition(),
            entity_list::definition(),
        ]);
        tools
    }

    pub async fn call(
        name: &str,
        arguments: Option<Value>,
        session: &Arc<Mutex<EntitySession>>,
    ) -> McpResult<ToolCallResult> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            "timer_create" => timer_create::execute(args, session).await,
            "timer_start" => timer_start::execute(args, session).await,
            "entity_delete" => entity_delete::execute(args, session).await,
            "entity_get" => entity_get::execute(args, session).await,
            "entity_list" => entity_list::execute(args, session).await,
            _ => match timer_control::operation_for(name) {
                Some(operation) => timer_control::execute(operation, args, session).await,
                None => Err(McpError::ToolNotFound(name.to_string())),
            },
        }
    }
}
