//! Events published by the sync engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ActionKind, FieldGroup, Snapshot};

/// Types of engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventType {
    /// The held snapshot was replaced
    SnapshotChanged,
    /// An automated action round trip finished
    ActionFinished,
    /// The game client reported a completed action
    ActionCompleted,
}

/// Where an applied update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOrigin {
    Poll,
    Push,
    Local,
}

impl std::fmt::Display for UpdateOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOrigin::Poll => write!(f, "poll"),
            UpdateOrigin::Push => write!(f, "push"),
            UpdateOrigin::Local => write!(f, "local"),
        }
    }
}

/// An engine event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EngineEventType,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// New snapshot (for snapshot changes)
    pub snapshot: Option<Snapshot>,
    /// Changed field groups (for snapshot changes)
    pub changes: Option<Vec<FieldGroup>>,
    /// Update channel (for snapshot changes)
    pub origin: Option<UpdateOrigin>,
    /// Additional data
    pub data: Option<serde_json::Value>,
}

impl EngineEvent {
    /// Create a snapshot changed event
    pub fn snapshot_changed(
        snapshot: Snapshot,
        changes: Vec<FieldGroup>,
        origin: UpdateOrigin,
    ) -> Self {
        Self {
            event_type: EngineEventType::SnapshotChanged,
            timestamp: Utc::now(),
            snapshot: Some(snapshot),
            changes: Some(changes),
            origin: Some(origin),
            data: None,
        }
    }

    /// Create an action finished event
    pub fn action_finished(kind: ActionKind, result: &Result<()>) -> Self {
        let data = match result {
            Ok(()) => serde_json::json!({ "action": kind, "success": true }),
            Err(e) => serde_json::json!({
                "action": kind,
                "success": false,
                "error": e.to_string(),
            }),
        };
        Self {
            event_type: EngineEventType::ActionFinished,
            timestamp: Utc::now(),
            snapshot: None,
            changes: None,
            origin: None,
            data: Some(data),
        }
    }

    /// Create an action completed event
    pub fn action_completed(payload: serde_json::Value) -> Self {
        Self {
            event_type: EngineEventType::ActionCompleted,
            timestamp: Utc::now(),
            snapshot: None,
            changes: None,
            origin: Some(UpdateOrigin::Push),
            data: Some(payload),
        }
    }

    /// Whether an action finished event reports success
    pub fn succeeded(&self) -> Option<bool> {
        if self.event_type != EngineEventType::ActionFinished {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("success"))
            .and_then(|v| v.as_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MiceptError;

    #[test]
    fn test_action_finished_payload() {
        let ok = EngineEvent::action_finished(ActionKind::AcceptReadyCheck, &Ok(()));
        assert_eq!(ok.succeeded(), Some(true));
        assert_eq!(ok.data.as_ref().unwrap()["action"], "accept_ready_check");

        let failed = EngineEvent::action_finished(
            ActionKind::AcceptReadyCheck,
            &Err(MiceptError::Action("409".into())),
        );
        assert_eq!(failed.succeeded(), Some(false));
        assert_eq!(failed.data.as_ref().unwrap()["error"], "Action failed: 409");
    }

    #[test]
    fn test_serialized_type_tag() {
        let event = EngineEvent::snapshot_changed(
            Snapshot::default(),
            vec![FieldGroup::Phase],
            UpdateOrigin::Poll,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "snapshot_changed");
        assert_eq!(json["changes"], serde_json::json!(["phase"]));
        assert_eq!(json["origin"], "poll");
        assert_eq!(event.succeeded(), None);
    }
}
