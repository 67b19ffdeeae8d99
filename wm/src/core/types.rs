//! Persisted data model shared by the controller.
//!
//! These types mirror the JSON documents on disk (session state, native tasks,
//! verification evidence). They carry no I/O and stay deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Mode every session starts in.
pub const DEFAULT_MODE: &str = "default";

/// Session type assigned to freshly created sessions.
pub const DEFAULT_SESSION_TYPE: &str = "default";

static SESSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("session id pattern should compile")
});

/// True if `id` has the UUID-v4 shape used for session identifiers.
pub fn is_valid_session_id(id: &str) -> bool {
    SESSION_ID_RE.is_match(id)
}

/// One entry of the append-only mode history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeEntry {
    pub mode: String,
    pub entered_at: DateTime<Utc>,
}

/// Per-session state document (`.wm/sessions/<id>/state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default = "default_session_type")]
    pub session_type: String,
    #[serde(default = "default_mode")]
    pub current_mode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mode_history: Vec<ModeEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mode_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub issue_number: Option<u64>,
}

impl SessionState {
    /// Fresh state for a session seen for the first time.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            workflow_id: None,
            session_type: default_session_type(),
            current_mode: default_mode(),
            mode_history: Vec::new(),
            mode_state: BTreeMap::new(),
            issue_number: None,
        }
    }

    /// Key used to look up verification evidence for this session.
    ///
    /// The tracked issue when there is one, otherwise the session itself.
    pub fn evidence_key(&self) -> String {
        match self.issue_number {
            Some(issue) => format!("issue-{issue}"),
            None => self.session_id.clone(),
        }
    }
}

fn default_session_type() -> String {
    DEFAULT_SESSION_TYPE.to_string()
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status of a native task as written by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Deleted,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
            Self::Other(other) => other,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Still owes work: neither completed nor deleted.
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Completed | Self::Deleted)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.trim() {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "deleted" => Self::Deleted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally-authored task record (read-only here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTask {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "title")]
    pub subject: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "ids_or_null")]
    pub blocked_by: Vec<String>,
}

/// Accept `"3"` and `3` alike for identifiers.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn ids_or_null<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|value| match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number in blockedBy, got {other}"
            ))),
        })
        .collect()
}

/// Verification evidence for one tracked issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEvidence {
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Phase-scoped verification evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEvidence {
    #[serde(default)]
    pub phase_id: String,
    #[serde(default)]
    pub overall_passed: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One `<key>.phase-<id>.json` as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRecord {
    Parsed(PhaseEvidence),
    /// The file exists but could not be read or parsed.
    Unreadable { phase_id: String },
}

impl PhaseRecord {
    pub fn phase_id(&self) -> &str {
        match self {
            Self::Parsed(phase) => &phase.phase_id,
            Self::Unreadable { phase_id } => phase_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_shape_is_uuid_v4() {
        assert!(is_valid_session_id("3f2b8c1e-9d4a-4b7e-8f21-0c5d6e7a8b9c"));
        assert!(is_valid_session_id("3F2B8C1E-9D4A-4B7E-AF21-0C5D6E7A8B9C"));
        assert!(!is_valid_session_id("3f2b8c1e-9d4a-1b7e-8f21-0c5d6e7a8b9c"));
        assert!(!is_valid_session_id("../../etc/passwd"));
        assert!(!is_valid_session_id(""));
    }

    #[test]
    fn new_state_serializes_empty_collections_not_null() {
        let state = SessionState::new("3f2b8c1e-9d4a-4b7e-8f21-0c5d6e7a8b9c");
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["modeHistory"], serde_json::json!([]));
        assert_eq!(json["modeState"], serde_json::json!({}));
        assert_eq!(json["currentMode"], "default");
        assert_eq!(json["issueNumber"], Value::Null);
    }

    #[test]
    fn state_tolerates_null_collections() {
        let raw = r#"{"sessionId":"s","modeHistory":null,"modeState":null}"#;
        let state: SessionState = serde_json::from_str(raw).expect("parse");
        assert!(state.mode_history.is_empty());
        assert!(state.mode_state.is_empty());
        assert_eq!(state.session_type, "default");
    }

    #[test]
    fn evidence_key_prefers_issue() {
        let mut state = SessionState::new("sid");
        assert_eq!(state.evidence_key(), "sid");
        state.issue_number = Some(42);
        assert_eq!(state.evidence_key(), "issue-42");
    }

    #[test]
    fn task_parses_numeric_ids_and_title_alias() {
        let raw = r#"{"id":2,"title":"Write docs","status":"in_progress","blockedBy":[1,"7"]}"#;
        let task: NativeTask = serde_json::from_str(raw).expect("parse");
        assert_eq!(task.id, "2");
        assert_eq!(task.subject, "Write docs");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.blocked_by, vec!["1".to_string(), "7".to_string()]);
    }

    #[test]
    fn unknown_task_status_is_preserved_and_pending() {
        let task: NativeTask =
            serde_json::from_str(r#"{"id":"1","subject":"x","status":"review"}"#).expect("parse");
        assert_eq!(task.status, TaskStatus::Other("review".to_string()));
        assert!(task.status.is_pending());
        assert!(!TaskStatus::Deleted.is_pending());
    }
}
