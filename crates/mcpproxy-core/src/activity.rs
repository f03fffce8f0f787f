//! `ActivityRecord` — append-only audit trail, queried and filtered by
//! `GET /api/v1/activity`.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ToolCall,
    PolicyDecision,
    QuarantineChange,
    ServerChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Error,
    Blocked,
}

/// One entry in the append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Time-ordered unique id, assigned by storage on append.
    pub id: u64,
    pub timestamp: SystemTime,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub server_name: Option<String>,
    pub tool_name: Option<String>,
    pub status: ActivityStatus,
    pub duration_ms: u64,
    pub mcp_session_id: Option<String>,
    pub mcp_client_name: Option<String>,
    pub mcp_client_version: Option<String>,
    pub parent_call_id: Option<u64>,
    pub request_id: String,
    pub metadata: serde_json::Value,
}

/// Filter for `QueryActivity`. Every field is optional; `None` = no
/// constraint on that dimension.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilter {
    pub server_name: Option<String>,
    pub tool_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ActivityType>,
    pub status: Option<ActivityStatus>,
    /// Matched against `metadata.intent.operation_type`.
    pub intent_type: Option<String>,
    pub request_id: Option<String>,
    pub since: Option<SystemTime>,
    pub until: Option<SystemTime>,
}

impl ActivityFilter {
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if let Some(name) = &self.server_name {
            if record.server_name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(name) = &self.tool_name {
            if record.tool_name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(intent_type) = &self.intent_type {
            let actual = record
                .metadata
                .get("intent")
                .and_then(|i| i.get("operation_type"))
                .and_then(serde_json::Value::as_str);
            if actual != Some(intent_type.as_str()) {
                return false;
            }
        }
        if let Some(request_id) = &self.request_id {
            if record.request_id != *request_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: ActivityType, status: ActivityStatus, intent: &str) -> ActivityRecord {
        ActivityRecord {
            id: 1,
            timestamp: SystemTime::now(),
            kind,
            server_name: Some("github".into()),
            tool_name: Some("delete_repo".into()),
            status,
            duration_ms: 5,
            mcp_session_id: None,
            mcp_client_name: None,
            mcp_client_version: None,
            parent_call_id: None,
            request_id: "req-1".into(),
            metadata: serde_json::json!({"intent": {"operation_type": intent}}),
        }
    }

    #[test]
    fn filters_by_intent_type() {
        let rec = sample(ActivityType::ToolCall, ActivityStatus::Success, "destructive");
        let filter = ActivityFilter {
            intent_type: Some("destructive".into()),
            ..Default::default()
        };
        assert!(filter.matches(&rec));

        let filter = ActivityFilter {
            intent_type: Some("read".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&rec));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let rec = sample(ActivityType::ServerChange, ActivityStatus::Blocked, "write");
        assert!(ActivityFilter::default().matches(&rec));
    }
}
