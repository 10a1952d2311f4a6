//! Wire payload shared by the publisher and the worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One notification delivery unit as carried on the wire.
///
/// Field names are PascalCase JSON (`NotificationId`, `Title`, ...) to stay
/// bit-compatible with the payload the back office already emits. `UserId`
/// is always serialized (null for broadcast-origin copies); `IsBroadcast`
/// appears only on the broadcast publish path.
///
/// Events are ephemeral publish-time values: constructed, serialized, and
/// discarded once the worker acknowledges them. They are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationEvent {
    /// Id of the already-persisted notification row.
    pub notification_id: i64,

    pub title: String,

    pub message: String,

    /// Free-form category tag, e.g. "info" or "alert".
    #[serde(rename = "Type")]
    pub kind: String,

    /// Target user; `None` marks a broadcast-origin copy.
    #[serde(default)]
    pub user_id: Option<i64>,

    /// Set only by the broadcast publish path; omitted when false.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_broadcast: bool,

    /// Set at publish time, not at row-creation time.
    pub created_at: DateTime<Utc>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl NotificationEvent {
    /// Event for a notification created for a single user.
    pub fn created(
        notification_id: i64,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: impl Into<String>,
        user_id: Option<i64>,
    ) -> Self {
        Self {
            notification_id,
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            user_id,
            is_broadcast: false,
            created_at: Utc::now(),
        }
    }

    /// Event for a broadcast announcement with no per-user target.
    pub fn broadcast(
        notification_id: i64,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            notification_id,
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            user_id: None,
            is_broadcast: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_serializes_pascal_case() {
        let event =
            NotificationEvent::created(7, "Delay", "Line 5 delayed 10 min", "alert", Some(42));
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["NotificationId"], 7);
        assert_eq!(json["Title"], "Delay");
        assert_eq!(json["Message"], "Line 5 delayed 10 min");
        assert_eq!(json["Type"], "alert");
        assert_eq!(json["UserId"], 42);
        assert!(json.get("CreatedAt").is_some());
        // Created path must not carry the broadcast marker.
        assert!(json.get("IsBroadcast").is_none());
    }

    #[test]
    fn created_event_with_no_user_serializes_null_user_id() {
        let event = NotificationEvent::created(7, "t", "m", "info", None);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert!(json["UserId"].is_null());
    }

    #[test]
    fn broadcast_event_round_trips() {
        let event =
            NotificationEvent::broadcast(11, "Maintenance", "Network closed Sunday", "info");
        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: NotificationEvent = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, event);
        assert!(decoded.is_broadcast);
        assert_eq!(decoded.user_id, None);
    }

    #[test]
    fn deserializes_payload_without_optional_fields() {
        // The created path of the back office omits IsBroadcast entirely.
        let json = r#"{
            "NotificationId": 3,
            "Title": "Delay",
            "Message": "Line 5 delayed 10 min",
            "Type": "alert",
            "UserId": 42,
            "CreatedAt": "2026-08-30T12:00:00Z"
        }"#;

        let event: NotificationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.notification_id, 3);
        assert_eq!(event.user_id, Some(42));
        assert!(!event.is_broadcast);
    }

    #[test]
    fn deserializes_broadcast_payload_without_user_id() {
        let json = r#"{
            "NotificationId": 5,
            "Title": "Notice",
            "Message": "Schedule change",
            "Type": "info",
            "IsBroadcast": true,
            "CreatedAt": "2026-08-30T12:00:00Z"
        }"#;

        let event: NotificationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.user_id, None);
        assert!(event.is_broadcast);
    }
}
