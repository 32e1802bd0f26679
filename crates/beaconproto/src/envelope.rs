//! Outbound wire envelopes for the beacon monitor socket.
//!
//! Every frame sent to the monitor is one of these, serialized as a JSON
//! text frame: `{"type": ..., "payload": ...}`. Builders copy validated
//! request fields into the payload and merge the caller's metadata with
//! the injected `source` and `timestamp` keys; injected keys win on
//! collision. The timestamp is taken here, at send-construction time,
//! not at original call time.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::request::{AuthorizationRequest, TaskEvent, TaskEventKind};

/// Protocol version announced in the identification frame.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capabilities announced in the identification frame.
pub const CAPABILITIES: &[&str] = &["task_events", "authorization_requests"];

/// A wire envelope. Discriminated by the `type` field in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Envelope {
    /// Client identity announcement, first frame on every connection
    McpClientIdentify(IdentifyPayload),
    /// A task lifecycle event
    TaskEvent(TaskEventPayload),
    /// A request for human authorization
    AuthorizationRequest(AuthorizationPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub client_id: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEventPayload {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskEventKind,
    pub description: String,
    pub user_id: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
    pub request_id: String,
    pub task_id: String,
    pub action: String,
    pub description: String,
    pub user_id: String,
    pub required_by: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl Envelope {
    /// Build the identification frame. Must be the first frame sent on a
    /// freshly opened connection.
    pub fn identify(client_id: &str) -> Self {
        Self::McpClientIdentify(IdentifyPayload {
            client_id: client_id.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            timestamp: Utc::now(),
        })
    }

    /// Build a `task_event` envelope from a validated request.
    pub fn task_event(event: &TaskEvent, source: &str) -> Self {
        Self::TaskEvent(TaskEventPayload {
            task_id: event.task_id.clone(),
            kind: event.kind,
            description: event.description.clone(),
            user_id: event.user_id.clone(),
            metadata: inject_metadata(&event.metadata, source),
        })
    }

    /// Build an `authorization_request` envelope, injecting a fresh
    /// request id.
    pub fn authorization_request(auth: &AuthorizationRequest, source: &str) -> Self {
        Self::AuthorizationRequest(AuthorizationPayload {
            request_id: next_request_id(),
            task_id: auth.task_id.clone(),
            action: auth.action.clone(),
            description: auth.description.clone(),
            user_id: auth.user_id.clone(),
            required_by: auth.required_by,
            metadata: inject_metadata(&auth.metadata, source),
        })
    }

    /// Serialize to the JSON text frame sent over the socket.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "error",
                "payload": { "message": format!("serialization failed: {e}") }
            })
            .to_string()
        })
    }
}

/// Merge caller metadata with the injected keys. Injected keys win.
fn inject_metadata(caller: &Map<String, Value>, source: &str) -> Map<String, Value> {
    let mut merged = caller.clone();
    merged.insert("source".to_string(), Value::String(source.to_string()));
    merged.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    merged
}

/// Generate a request id unique within this process lifetime.
///
/// Timestamp plus sequence counter; not cryptographic, the monitor only
/// needs it for correlation.
fn next_request_id() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req_{}_{}", Utc::now().timestamp_millis(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{validate_authorization, validate_task_event, RawAuthorization, RawTaskEvent};
    use pretty_assertions::assert_eq;

    fn sample_event() -> TaskEvent {
        let mut metadata = Map::new();
        metadata.insert("branch".to_string(), Value::String("main".into()));
        // Caller trying to spoof the source; the injected value must win.
        metadata.insert("source".to_string(), Value::String("impostor".into()));
        validate_task_event(
            RawTaskEvent {
                task_id: Some("t1".into()),
                event_type: Some("started".into()),
                description: Some("d".into()),
                user_id: Some("u".into()),
                metadata: Some(Value::Object(metadata)),
            },
            "system",
        )
        .unwrap()
    }

    #[test]
    fn task_event_wire_shape() {
        let frame = Envelope::task_event(&sample_event(), "herald").to_frame();
        let v: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(v["type"], "task_event");
        assert_eq!(v["payload"]["taskId"], "t1");
        assert_eq!(v["payload"]["type"], "started");
        assert_eq!(v["payload"]["userId"], "u");
        assert_eq!(v["payload"]["metadata"]["branch"], "main");
        assert_eq!(v["payload"]["metadata"]["source"], "herald");
        assert!(v["payload"]["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn builder_does_not_mutate_input() {
        let event = sample_event();
        let before = event.clone();
        let _ = Envelope::task_event(&event, "herald");
        assert_eq!(event, before);
    }

    #[test]
    fn authorization_gets_fresh_request_ids() {
        let auth = validate_authorization(
            RawAuthorization {
                task_id: Some("t2".into()),
                action: Some("deploy".into()),
                description: Some("go".into()),
                user_id: None,
                required_by: Some("2025-01-01T00:00:00Z".into()),
                metadata: None,
            },
            "system",
        )
        .unwrap();

        let a = Envelope::authorization_request(&auth, "herald");
        let b = Envelope::authorization_request(&auth, "herald");
        let (Envelope::AuthorizationRequest(pa), Envelope::AuthorizationRequest(pb)) = (a, b)
        else {
            panic!("expected authorization_request envelopes");
        };
        assert!(pa.request_id.starts_with("req_"));
        assert_ne!(pa.request_id, pb.request_id);
        assert_eq!(pa.task_id, "t2");
    }

    #[test]
    fn identify_wire_shape() {
        let frame = Envelope::identify("herald").to_frame();
        let v: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(v["type"], "mcp_client_identify");
        assert_eq!(v["payload"]["clientId"], "herald");
        assert_eq!(
            v["payload"]["capabilities"],
            serde_json::json!(["task_events", "authorization_requests"])
        );
        assert!(v["payload"]["timestamp"].is_string());
    }
}
