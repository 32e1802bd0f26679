//! CLI command implementations

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use beaconproto::Envelope;

/// Validate that an endpoint looks like a WebSocket URI
fn validate_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
        bail!(
            "Invalid endpoint: '{}'\n\n\
             Monitor endpoints must be URIs like:\n  \
             ws://localhost:2200\n  \
             wss://beacon.example.com:2200\n\n\
             Beacon default: ws://localhost:2200",
            endpoint
        );
    }
    Ok(())
}

/// Test connectivity: open a socket, identify, report the first frame.
pub async fn ping(endpoint: &str, timeout_ms: u64) -> Result<()> {
    validate_endpoint(endpoint)?;
    let timeout = Duration::from_millis(timeout_ms);

    let start = std::time::Instant::now();
    let (ws, _response) = tokio::time::timeout(timeout, connect_async(endpoint))
        .await
        .context("Timed out connecting to monitor")?
        .context("Failed to connect to monitor")?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(Envelope::identify("herald-cli").to_frame()))
        .await
        .context("Failed to send identification frame")?;
    let elapsed = start.elapsed();

    println!("Connected and identified to {} in {:?}", endpoint, elapsed);

    // The monitor is not required to answer; report a frame if one comes.
    match tokio::time::timeout(timeout, stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => println!("First frame: {}", text),
        Ok(Some(Ok(other))) => println!("First frame: {:?}", other),
        Ok(Some(Err(e))) => bail!("Socket error after identify: {}", e),
        Ok(None) => println!("Monitor closed the connection"),
        Err(_) => println!("No frame received within {:?}", timeout),
    }

    sink.close().await.ok();
    Ok(())
}

/// Send a raw JSON envelope, one-shot.
pub async fn send(endpoint: &str, json: &str, timeout_ms: u64) -> Result<()> {
    validate_endpoint(endpoint)?;
    let envelope: Envelope =
        serde_json::from_str(json).context("Failed to parse JSON as an envelope")?;
    let timeout = Duration::from_millis(timeout_ms);

    let (ws, _response) = tokio::time::timeout(timeout, connect_async(endpoint))
        .await
        .context("Timed out connecting to monitor")?
        .context("Failed to connect to monitor")?;
    let (mut sink, _stream) = ws.split();

    // Identification precedes everything else on a fresh connection.
    sink.send(Message::Text(Envelope::identify("herald-cli").to_frame()))
        .await
        .context("Failed to send identification frame")?;
    sink.send(Message::Text(envelope.to_frame()))
        .await
        .context("Failed to send envelope")?;
    sink.close().await.ok();

    println!("Sent 1 envelope to {}", endpoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_websocket_endpoints() {
        assert!(validate_endpoint("tcp://localhost:2200").is_err());
        assert!(validate_endpoint("http://localhost:2200").is_err());
        assert!(validate_endpoint("ws://localhost:2200").is_ok());
        assert!(validate_endpoint("wss://beacon.example.com:2200").is_ok());
    }
}
