//! Tool: entity_list - list every live entity.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::{json, Value};

use crate::session::EntitySession;
use crate::types::{McpResult, ToolCallResult, ToolDefinition};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "entity_list".to_string(),
        description: Some("List all live entities, oldest first".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
    }
}

pub async fn execute(_args: Value, session: &Arc<Mutex<EntitySession>>) -> McpResult<ToolCallResult> {
    let session = session.lock().await;
    let entities = session.list();

    Ok(ToolCallResult::json(&json!({
        "count": entities.len(),
        "entities": entities
    })))
}
