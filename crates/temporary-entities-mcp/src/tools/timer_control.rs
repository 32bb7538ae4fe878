//! Tools: timer_pause, timer_resume, timer_cancel, timer_finish.
//!
//! All four take only an entity id and map onto one timer operation.

use std::sync::Arc;
use tokio::sync::Mutex;

use serde_json::{json, Value};

use temporary_entities::Operation;

use crate::session::EntitySession;
use crate::types::{EntityParams, McpError, McpResult, ToolCallResult, ToolDefinition};

const CONTROLS: [(&str, &str, Operation); 4] = [
    ("timer_pause", "Pause a running timer, keeping its remaining time", Operation::Pause),
    ("timer_resume", "Resume a paused timer", Operation::Resume),
    (
        "timer_cancel",
        "Cancel a timer without completing it; no finished notification is sent",
        Operation::Cancel,
    ),
    ("timer_finish", "Complete a timer now and send its finished notification", Operation::Finish),
];

pub fn definitions() -> Vec<ToolDefinition> {
    CONTROLS
        .iter()
        .map(|(name, description, _)| ToolDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity_id": { "type": "string", "description": "Timer entity ID" }
                },
                "required": ["entity_id"]
            }),
        })
        .collect()
}

/// The operation behind a control tool name.
pub fn operation_for(tool: &str) -> Option<Operation> {
    CONTROLS
        .iter()
        .find(|(name, _, _)| *name == tool)
        .map(|(_, _, operation)| *operation)
}

pub async fn execute(
    operation: Operation,
    args: Value,
    session: &Arc<Mutex<EntitySession>>,
) -> McpResult<ToolCallResult> {
    let params: EntityParams =
        serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    tracing::info!("{} timer {}", operation.name(), params.entity_id);
    let mut session = session.lock().await;
    let view = session.apply(&params.entity_id, operation)?;

    Ok(ToolCallResult::json(&view))
}
