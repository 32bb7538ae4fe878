//! Tool: timer_create - create and start a countdown timer.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde::Deserialize;
use serde_json::{json, Value};

use temporary_entities::MAX_TIMER_DURATION;

use crate::session::EntitySession;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct CreateParams {
    name: String,
    duration: u64,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "timer_create".to_string(),
        description: Some("Create a countdown timer and start it immediately".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Display name of the timer" },
                "duration": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TIMER_DURATION,
                    "description": "Duration in seconds"
                }
            },
            "required": ["name", "duration"]
        }),
    }
}

pub async fn execute(args: Value, session: &Arc<Mutex<EntitySession>>) -> McpResult<ToolCallResult> {
    let params: CreateParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let name = params.name.trim();
    if name.is_empty() {
        return Err(McpError::InvalidParams("name must not be empty".to_string()));
    }
    if params.duration == 0 || params.duration > MAX_TIMER_DURATION {
        return Err(McpError::InvalidParams(format!(
            "duration must be between 1 and {MAX_TIMER_DURATION} seconds"
        )));
    }

    let mut session = session.lock().await;
    let view = session.create_timer(name, params.duration)?;

    Ok(ToolCallResult::json(&view))
}
