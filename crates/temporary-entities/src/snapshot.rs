//! Persisted entity snapshots and the `H:MM:SS` display format.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{EntityId, EntityKind, EntityState};

/// Serialized state of one entity, used for restart recovery.
///
/// Timestamps are RFC 3339. `duration` and `remaining` are seconds; when
/// restoring, `H:MM:SS` strings are accepted for both as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration: Option<f64>,
    pub state: EntityState,
    #[serde(default, deserialize_with = "seconds_field")]
    pub duration: f64,
    #[serde(default, deserialize_with = "seconds_field")]
    pub remaining: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Format a duration as `H:MM:SS`, clamping negatives to zero.
pub fn format_hms(delta: TimeDelta) -> String {
    let total = delta.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

/// Parse `H:MM:SS` into whole seconds.
pub fn parse_hms(text: &str) -> Option<u64> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Seconds from a number or an `H:MM:SS` string.
fn seconds_field<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) if n.is_finite() => Ok(n),
        Seconds::Number(n) => Err(serde::de::Error::custom(format!("non-finite seconds: {n}"))),
        Seconds::Text(text) => parse_hms(&text)
            .map(|s| s as f64)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid H:MM:SS value: {text:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(TimeDelta::seconds(0)), "0:00:00");
        assert_eq!(format_hms(TimeDelta::seconds(3725)), "1:02:05");
        assert_eq!(format_hms(TimeDelta::seconds(-5)), "0:00:00");
        assert_eq!(format_hms(TimeDelta::milliseconds(59_990)), "0:00:59");
    }

    #[test]
    fn test_parse_hms() {
        assert_eq!(parse_hms("1:02:05"), Some(3725));
        assert_eq!(parse_hms("0:00:30"), Some(30));
        assert_eq!(parse_hms("12:00"), None);
        assert_eq!(parse_hms("a:b:c"), None);
        assert_eq!(parse_hms("1:2:3:4"), None);
    }

    #[test]
    fn test_accepts_formatted_durations() {
        let snap = EntitySnapshot::from_value(&json!({
            "id": "timer_1",
            "created_at": "2024-05-01T10:00:00Z",
            "state": "paused",
            "duration": "0:02:00",
            "remaining": 95.5
        }))
        .unwrap();
        assert_eq!(snap.duration, 120.0);
        assert_eq!(snap.remaining, 95.5);
        assert_eq!(snap.kind, EntityKind::Timer);
        assert!(snap.end_time.is_none());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(EntitySnapshot::from_value(&json!({"id": "timer_1"})).is_err());
        assert!(EntitySnapshot::from_value(&json!({
            "id": "timer_1",
            "created_at": "yesterday",
            "state": "active"
        }))
        .is_err());
        assert!(EntitySnapshot::from_value(&json!({
            "id": "timer_1",
            "created_at": "2024-05-01T10:00:00Z",
            "state": "active",
            "duration": "soon"
        }))
        .is_err());
    }

    #[test]
    fn test_absent_optionals_are_not_serialized() {
        let snap = EntitySnapshot::from_value(&json!({
            "id": "timer_1",
            "created_at": "2024-05-01T10:00:00Z",
            "state": "active",
            "duration": 60,
            "remaining": 60
        }))
        .unwrap();
        let value = snap.to_value();
        assert!(value.get("finalized_at").is_none());
        assert!(value.get("end_time").is_none());
        assert_eq!(value["state"], "active");
    }
}
