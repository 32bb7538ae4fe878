//! Tool results and the entity view returned by tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use temporary_entities::{Entity, ManagerConfig, TemporaryEntity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: None,
        }
    }

    pub fn json(value: &impl Serialize) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string());
        Self::text(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// How tools present one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
    pub entity_id: String,
    pub kind: String,
    pub name: String,
    pub state: String,
    pub should_persist: bool,
    pub attributes: Value,
}

impl EntityView {
    pub fn new(entity: &Entity, config: &ManagerConfig, now: DateTime<Utc>) -> Self {
        let lifecycle = entity.lifecycle();
        Self {
            entity_id: lifecycle.id().to_string(),
            kind: entity.kind().as_str().to_string(),
            name: lifecycle.name().to_string(),
            state: lifecycle.state().display_state().to_string(),
            should_persist: entity.should_persist(config),
            attributes: entity.attributes(now),
        }
    }
}
