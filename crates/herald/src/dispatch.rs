//! Tool call dispatch: decode arguments, validate, relay.
//!
//! Both front ends funnel through [`dispatch`]. They differ only in the
//! argument spelling ([`Dialect`]); everything after decoding is shared,
//! so the two endpoints cannot drift apart semantically.

use serde_json::{Map, Value};
use thiserror::Error;

use beaconproto::{
    request::{validate_authorization, validate_task_event},
    Envelope, RawAuthorization, RawTaskEvent, ValidationError,
};

use crate::link::{MonitorLink, NotConnected};

pub const TOOL_SEND_TASK_EVENT: &str = "send_task_event";
pub const TOOL_REQUEST_AUTHORIZATION: &str = "request_authorization";

/// Argument spelling used by a front end.
///
/// The streamable endpoint takes camelCase (`taskId`, `type`, `userId`,
/// `requiredBy`); the legacy endpoint takes snake_case (`task_id`,
/// `event_type`, `user_id`, `required_by`). Both decode into the same
/// raw request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Streamable,
    Legacy,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("backend monitor unavailable: {0}")]
    Backend(#[from] NotConnected),
}

/// Route one tool call: decode per dialect, validate, build the
/// envelope, send it over the link. Returns the confirmation text shown
/// to the caller.
///
/// Validation runs before the link is touched; a call that fails
/// validation never produces a frame, and an unknown tool never reaches
/// the validator.
pub async fn dispatch(
    link: &MonitorLink,
    source: &str,
    default_user: &str,
    dialect: Dialect,
    tool: &str,
    args: &Value,
) -> Result<String, DispatchError> {
    let args = args.as_object().cloned().unwrap_or_default();

    match tool {
        TOOL_SEND_TASK_EVENT => {
            let event = validate_task_event(decode_task_event(dialect, &args), default_user)?;
            link.send(&Envelope::task_event(&event, source)).await?;
            Ok(format!(
                "Task event '{}' for task {} relayed to monitor",
                event.kind, event.task_id
            ))
        }
        TOOL_REQUEST_AUTHORIZATION => {
            let auth = validate_authorization(decode_authorization(dialect, &args), default_user)?;
            link.send(&Envelope::authorization_request(&auth, source))
                .await?;
            Ok(format!(
                "Authorization request for task {} (action: {}) relayed to monitor",
                auth.task_id, auth.action
            ))
        }
        other => Err(DispatchError::UnknownTool {
            name: other.to_string(),
        }),
    }
}

fn decode_task_event(dialect: Dialect, args: &Map<String, Value>) -> RawTaskEvent {
    match dialect {
        Dialect::Streamable => RawTaskEvent {
            task_id: take_string(args, "taskId"),
            event_type: take_string(args, "type"),
            description: take_string(args, "description"),
            user_id: take_string(args, "userId"),
            metadata: take_value(args, "metadata"),
        },
        Dialect::Legacy => RawTaskEvent {
            task_id: take_string(args, "task_id"),
            event_type: take_string(args, "event_type"),
            description: take_string(args, "description"),
            user_id: take_string(args, "user_id"),
            metadata: take_value(args, "metadata"),
        },
    }
}

fn decode_authorization(dialect: Dialect, args: &Map<String, Value>) -> RawAuthorization {
    match dialect {
        Dialect::Streamable => RawAuthorization {
            task_id: take_string(args, "taskId"),
            action: take_string(args, "action"),
            description: take_string(args, "description"),
            user_id: take_string(args, "userId"),
            required_by: take_string(args, "requiredBy"),
            metadata: take_value(args, "metadata"),
        },
        Dialect::Legacy => RawAuthorization {
            task_id: take_string(args, "task_id"),
            action: take_string(args, "action"),
            description: take_string(args, "description"),
            user_id: take_string(args, "user_id"),
            required_by: take_string(args, "required_by"),
            metadata: take_value(args, "metadata"),
        },
    }
}

// Non-string values for string fields decode as absent and surface as
// per-field validation errors rather than type errors. Metadata is
// passed through untyped; the validator rejects non-object values.
fn take_string(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn take_value(args: &Map<String, Value>, key: &str) -> Option<Value> {
    args.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkConfig, LinkState};
    use serde_json::json;
    use std::time::Duration;

    fn offline_link() -> std::sync::Arc<MonitorLink> {
        MonitorLink::new(LinkConfig {
            endpoint: "ws://127.0.0.1:1".to_string(),
            client_id: "herald-test".to_string(),
            base_delay: Duration::from_millis(10),
            cap_delay: Duration::from_millis(10),
            max_attempts: 1,
        })
    }

    #[test]
    fn streamable_args_decode_camel_case() {
        let args = json!({
            "taskId": "t1",
            "type": "task_started",
            "description": "d",
            "userId": "alice",
            "metadata": {"k": "v"}
        });
        let raw = decode_task_event(Dialect::Streamable, args.as_object().unwrap());
        assert_eq!(raw.task_id.as_deref(), Some("t1"));
        assert_eq!(raw.event_type.as_deref(), Some("task_started"));
        assert_eq!(raw.user_id.as_deref(), Some("alice"));
        assert!(raw.metadata.is_some());
    }

    #[test]
    fn legacy_args_decode_snake_case() {
        let args = json!({
            "task_id": "t1",
            "action": "deploy",
            "description": "d",
            "required_by": "2025-01-01T00:00:00Z"
        });
        let raw = decode_authorization(Dialect::Legacy, args.as_object().unwrap());
        assert_eq!(raw.task_id.as_deref(), Some("t1"));
        assert_eq!(raw.required_by.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(raw.user_id, None);
    }

    #[test]
    fn wrong_dialect_fields_read_as_absent() {
        let args = json!({"taskId": "t1"});
        let raw = decode_task_event(Dialect::Legacy, args.as_object().unwrap());
        assert_eq!(raw.task_id, None);
    }

    #[tokio::test]
    async fn non_object_metadata_is_a_field_error() {
        let link = offline_link();
        let err = dispatch(
            &link,
            "herald",
            "system",
            Dialect::Streamable,
            TOOL_SEND_TASK_EVENT,
            &json!({
                "taskId": "t1",
                "type": "started",
                "description": "d",
                "metadata": "not a map"
            }),
        )
        .await
        .unwrap_err();
        match err {
            DispatchError::Validation(e) => {
                assert_eq!(e.fields.len(), 1);
                assert_eq!(e.fields[0].field, "metadata");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_without_validation() {
        let link = offline_link();
        let err = dispatch(
            &link,
            "herald",
            "system",
            Dialect::Streamable,
            "delete_everything",
            &json!({}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool { ref name } if name == "delete_everything"));
    }

    #[tokio::test]
    async fn invalid_args_fail_before_the_link_is_touched() {
        let link = offline_link();
        let err = dispatch(
            &link,
            "herald",
            "system",
            Dialect::Streamable,
            TOOL_SEND_TASK_EVENT,
            &json!({"taskId": "t1"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn valid_call_on_offline_link_reports_backend_unavailable() {
        let link = offline_link();
        let err = dispatch(
            &link,
            "herald",
            "system",
            Dialect::Streamable,
            TOOL_SEND_TASK_EVENT,
            &json!({"taskId": "t1", "type": "started", "description": "d"}),
        )
        .await
        .unwrap_err();
        match err {
            DispatchError::Backend(nc) => assert_eq!(nc.state, LinkState::Disconnected),
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
