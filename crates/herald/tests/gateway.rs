//! End-to-end tests for the tool call surface: JSON-RPC request in,
//! wire envelope out on a mock monitor socket.

use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::sleep;

use herald::dispatch::Dialect;
use herald::link::{LinkConfig, LinkState, MonitorLink};
use herald::mcp::{
    handle_rpc, AppState, JsonRpcRequest, CODE_BACKEND_UNAVAILABLE, CODE_NOT_FOUND,
};

async fn spawn_monitor() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (_sink, mut stream) = ws.split();
        while let Some(Ok(msg)) = stream.next().await {
            if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                if tx.send(text).is_err() {
                    return;
                }
            }
        }
    });

    (endpoint, rx)
}

async fn ready_state(endpoint: &str) -> AppState {
    let link = MonitorLink::new(LinkConfig {
        endpoint: endpoint.to_string(),
        client_id: "herald".to_string(),
        base_delay: Duration::from_millis(20),
        cap_delay: Duration::from_millis(100),
        max_attempts: 3,
    });
    link.connect().await;
    for _ in 0..200 {
        if link.state() == LinkState::Ready {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(link.state(), LinkState::Ready);

    AppState {
        link,
        source: "herald".to_string(),
        default_user: "system".to_string(),
        start_time: Instant::now(),
    }
}

fn offline_state() -> AppState {
    AppState {
        link: MonitorLink::new(LinkConfig {
            endpoint: "ws://127.0.0.1:1".to_string(),
            client_id: "herald".to_string(),
            base_delay: Duration::from_millis(10),
            cap_delay: Duration::from_millis(10),
            max_attempts: 1,
        }),
        source: "herald".to_string(),
        default_user: "system".to_string(),
        start_time: Instant::now(),
    }
}

fn tools_call(name: &str, arguments: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: "tools/call".to_string(),
        params: json!({ "name": name, "arguments": arguments }),
    }
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("monitor channel closed");
    serde_json::from_str(&text).unwrap()
}

fn assert_no_frame(rx: &mut mpsc::UnboundedReceiver<String>) {
    match rx.try_recv() {
        Err(mpsc::error::TryRecvError::Empty) => {}
        other => panic!("expected no frame, got {other:?}"),
    }
}

#[tokio::test]
async fn authorization_call_relays_one_envelope_with_fresh_request_id() {
    let (endpoint, mut rx) = spawn_monitor().await;
    let state = ready_state(&endpoint).await;
    let identify = next_frame(&mut rx).await;
    assert_eq!(identify["type"], "mcp_client_identify");

    let resp = handle_rpc(
        &state,
        tools_call(
            "request_authorization",
            json!({
                "taskId": "t2",
                "action": "deploy",
                "description": "ship release 1.4",
                "requiredBy": "2026-09-01T12:00:00Z"
            }),
        ),
        Dialect::Streamable,
    )
    .await;

    let result = resp.result.expect("expected success");
    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("t2"), "confirmation names the task: {text}");
    assert!(text.contains("deploy"), "confirmation names the action: {text}");

    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["type"], "authorization_request");
    assert_eq!(frame["payload"]["taskId"], "t2");
    assert_eq!(frame["payload"]["action"], "deploy");
    assert_eq!(frame["payload"]["userId"], "system");
    assert!(frame["payload"]["requestId"]
        .as_str()
        .unwrap()
        .starts_with("req_"));
    assert_eq!(frame["payload"]["metadata"]["source"], "herald");

    // Exactly one envelope per call.
    assert_no_frame(&mut rx);
    state.link.shutdown().await;
}

#[tokio::test]
async fn legacy_dialect_feeds_the_same_pipeline() {
    let (endpoint, mut rx) = spawn_monitor().await;
    let state = ready_state(&endpoint).await;
    let _identify = next_frame(&mut rx).await;

    let resp = handle_rpc(
        &state,
        tools_call(
            "send_task_event",
            json!({
                "task_id": "t3",
                "event_type": "completed",
                "description": "migration finished",
                "user_id": "carol"
            }),
        ),
        Dialect::Legacy,
    )
    .await;
    assert!(resp.error.is_none());

    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["type"], "task_event");
    assert_eq!(frame["payload"]["taskId"], "t3");
    assert_eq!(frame["payload"]["type"], "completed");
    assert_eq!(frame["payload"]["userId"], "carol");

    state.link.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_is_rejected_and_nothing_is_sent() {
    let (endpoint, mut rx) = spawn_monitor().await;
    let state = ready_state(&endpoint).await;
    let _identify = next_frame(&mut rx).await;

    let resp = handle_rpc(
        &state,
        tools_call("delete_everything", json!({})),
        Dialect::Streamable,
    )
    .await;
    assert_eq!(resp.error.unwrap().code, CODE_NOT_FOUND);

    assert_no_frame(&mut rx);
    state.link.shutdown().await;
}

#[tokio::test]
async fn validation_failure_produces_no_frame() {
    let (endpoint, mut rx) = spawn_monitor().await;
    let state = ready_state(&endpoint).await;
    let _identify = next_frame(&mut rx).await;

    let resp = handle_rpc(
        &state,
        tools_call("send_task_event", json!({ "taskId": "t4" })),
        Dialect::Streamable,
    )
    .await;
    assert!(resp.error.is_some());

    assert_no_frame(&mut rx);
    state.link.shutdown().await;
}

#[tokio::test]
async fn never_connected_gateway_reports_backend_unavailable() {
    let state = offline_state();

    let resp = handle_rpc(
        &state,
        tools_call(
            "send_task_event",
            json!({ "taskId": "t1", "type": "started", "description": "d" }),
        ),
        Dialect::Streamable,
    )
    .await;
    assert_eq!(resp.error.unwrap().code, CODE_BACKEND_UNAVAILABLE);
}
