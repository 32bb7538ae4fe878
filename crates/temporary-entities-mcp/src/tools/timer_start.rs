//! Tool: timer_start - start or restart a timer, optionally with a new duration.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde::Deserialize;
use serde_json::{json, Value};

use temporary_entities::{Operation, MAX_TIMER_DURATION};

use crate::session::EntitySession;
use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

#[derive(Debug, Deserialize)]
struct StartParams {
    entity_id: String,
    #[serde(default)]
    duration: Option<u64>,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "timer_start".to_string(),
        description: Some(
            "Start a timer. Without a duration the current remaining time is kept; \
             with one the countdown restarts from it"
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "entity_id": { "type": "string", "description": "Timer entity ID" },
                "duration": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TIMER_DURATION,
                    "description": "New duration in seconds"
                }
            },
            "required": ["entity_id"]
        }),
    }
}

pub async fn execute(args: Value, session: &Arc<Mutex<EntitySession>>) -> McpResult<ToolCallResult> {
    let params: StartParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    if matches!(params.duration, Some(d) if d == 0 || d > MAX_TIMER_DURATION) {
        return Err(McpError::InvalidParams(format!(
            "duration must be between 1 and {MAX_TIMER_DURATION} seconds"
        )));
    }

    tracing::info!("Starting timer {}", params.entity_id);
    let mut session = session.lock().await;
    let view = session.apply(
        &params.entity_id,
        Operation::Start {
            duration: params.duration,
        },
    )?;

    Ok(ToolCallResult::json(&view))
}
