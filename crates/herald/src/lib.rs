//! herald - MCP gateway relaying task events to the beacon monitor
//!
//! This library provides:
//! - `dispatch`: tool call decoding, validation, and routing
//! - `link`: persistent WebSocket link to the monitor with backoff
//! - `mcp`: MCP Streamable HTTP front end (JSON-RPC)
//! - `sse`: legacy HTTP+SSE front end
//! - `serve`: gateway server bootstrap
//! - `commands`: CLI utilities (ping, send)

pub mod commands;
pub mod dispatch;
pub mod link;
pub mod mcp;
pub mod serve;
pub mod sse;
pub mod telemetry;
