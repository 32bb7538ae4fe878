//! Outgoing notifications.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use temporary_entities::EntityEvent;

use super::message::JsonRpcNotification;

pub const LOG_MESSAGE_METHOD: &str = "notifications/message";
pub const LOGGER_NAME: &str = "temporary-entities";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
}

/// The notification sent to the client for an entity event, if any.
///
/// Only timer completions are announced.
pub fn event_notification(event: &EntityEvent) -> Option<JsonRpcNotification> {
    let EntityEvent::Finished { id, name } = event else {
        return None;
    };

    let params = LogMessageParams {
        level: LogLevel::Info,
        logger: Some(LOGGER_NAME.to_string()),
        data: json!({
            "event": "timer_finished",
            "entity_id": id.as_str(),
            "name": name,
        }),
    };
    Some(JsonRpcNotification::new(
        LOG_MESSAGE_METHOD,
        serde_json::to_value(params).ok(),
    ))
}
