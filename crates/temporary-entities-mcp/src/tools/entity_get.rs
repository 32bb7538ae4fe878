//! Tool: entity_get - show one entity.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::{json, Value};

use crate::session::EntitySession;
use crate::types::{EntityParams, McpError, McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "entity_get".to_string(),
        description: Some("Get the state and display attributes of one entity".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "entity_id": { "type": "string", "description": "Entity ID" }
            },
            "required": ["entity_id"]
        }),
    }
}

pub async fn execute(args: Value, session: &Arc<Mutex<EntitySession>>) -> McpResult<ToolCallResult> {
    let params: EntityParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let session = session.lock().await;
    let view = session.get(&params.entity_id)?;
    Ok(ToolCallResult::json(&view))
}
