//! Tool requests and their validation layer.
//!
//! Raw inputs arrive at the gateway boundary with every field optional
//! (the two front ends deliver different spellings, and missing fields
//! must produce per-field errors, not serde bail-outs). `validate_*`
//! turns a raw input into an immutable, fully-populated request or a
//! `ValidationError` carrying every failed field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The fixed set of task event kinds.
///
/// On the wire (envelope payload) these serialize unprefixed:
/// `started`, `completed`, `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Started,
    Completed,
    Failed,
}

impl TaskEventKind {
    /// Parse an event kind from either wire dialect.
    ///
    /// The streamable tool contract sends `task_started` etc.; the
    /// legacy endpoint and the envelope use the bare form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" | "task_started" => Some(Self::Started),
            "completed" | "task_completed" => Some(Self::Completed),
            "failed" | "task_failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw task event input, before validation. All fields optional;
/// `metadata` stays an untyped value so a wrong type surfaces as a
/// field error rather than a deserialize failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskEvent {
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    pub description: Option<String>,
    pub user_id: Option<String>,
    pub metadata: Option<Value>,
}

/// Raw authorization request input, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAuthorization {
    pub task_id: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
    pub user_id: Option<String>,
    pub required_by: Option<String>,
    pub metadata: Option<Value>,
}

/// A validated task event. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub task_id: String,
    pub kind: TaskEventKind,
    pub description: String,
    pub user_id: String,
    pub metadata: Map<String, Value>,
}

/// A validated authorization request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub task_id: String,
    pub action: String,
    pub description: String,
    pub user_id: String,
    pub required_by: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// One failed field with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Validation failure carrying every failed field. Never partial: if
/// this is returned, no validated request was produced.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid tool arguments: {}", summarize(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn into_result<T>(self, ok: T) -> Result<T, ValidationError> {
        if self.fields.is_empty() {
            Ok(ok)
        } else {
            Err(self)
        }
    }
}

fn require_map(errors: &mut ValidationError, value: Option<Value>) -> Map<String, Value> {
    match value {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            errors.push("metadata", "must be an object");
            Map::new()
        }
    }
}

fn require(errors: &mut ValidationError, field: &'static str, value: Option<String>) -> String {
    match value {
        Some(s) if !s.trim().is_empty() => s,
        Some(_) => {
            errors.push(field, "must not be empty");
            String::new()
        }
        None => {
            errors.push(field, "is required");
            String::new()
        }
    }
}

/// Validate a raw task event against the schema.
///
/// `default_user` is the configured fallback applied when `user_id` is
/// omitted. Pure function of the input plus that default.
pub fn validate_task_event(
    raw: RawTaskEvent,
    default_user: &str,
) -> Result<TaskEvent, ValidationError> {
    let mut errors = ValidationError { fields: Vec::new() };

    let task_id = require(&mut errors, "task_id", raw.task_id);
    let description = require(&mut errors, "description", raw.description);

    let kind = match raw.event_type.as_deref() {
        Some(s) => match TaskEventKind::parse(s) {
            Some(k) => k,
            None => {
                errors.push(
                    "type",
                    format!("'{s}' is not one of started, completed, failed"),
                );
                TaskEventKind::Started
            }
        },
        None => {
            errors.push("type", "is required");
            TaskEventKind::Started
        }
    };

    let metadata = require_map(&mut errors, raw.metadata);

    errors.into_result(TaskEvent {
        task_id,
        kind,
        description,
        user_id: raw.user_id.unwrap_or_else(|| default_user.to_string()),
        metadata,
    })
}

/// Validate a raw authorization request against the schema.
pub fn validate_authorization(
    raw: RawAuthorization,
    default_user: &str,
) -> Result<AuthorizationRequest, ValidationError> {
    let mut errors = ValidationError { fields: Vec::new() };

    let task_id = require(&mut errors, "task_id", raw.task_id);
    let action = require(&mut errors, "action", raw.action);
    let description = require(&mut errors, "description", raw.description);

    let required_by = match raw.required_by.as_deref() {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                errors.push("required_by", format!("not an ISO-8601 timestamp: {e}"));
                Utc::now()
            }
        },
        None => {
            errors.push("required_by", "is required");
            Utc::now()
        }
    };

    let metadata = require_map(&mut errors, raw.metadata);

    errors.into_result(AuthorizationRequest {
        task_id,
        action,
        description,
        user_id: raw.user_id.unwrap_or_else(|| default_user.to_string()),
        required_by,
        metadata,
    })
}
