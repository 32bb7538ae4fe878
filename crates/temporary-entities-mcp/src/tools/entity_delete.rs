//! Tool: entity_delete - remove an entity now, without waiting for cleanup.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::{json, Value};

use temporary_entities::RemovalOutcome;

use crate::session::EntitySession;
use crate::types::{EntityParams, McpError, McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "entity_delete".to_string(),
        description: Some("Delete an entity immediately. Unknown ids report not_found".to_string()),
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

    let mut session = session.lock().await;
    let status = match session.delete(&params.entity_id) {
        RemovalOutcome::Removed => {
            tracing::info!("Deleted entity {}", params.entity_id);
            "deleted"
        }
        RemovalOutcome::NotFound => "not_found",
    };

    Ok(ToolCallResult::json(&json!({
        "entity_id": params.entity_id,
        "status": status
    })))
}
