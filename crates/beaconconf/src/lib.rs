//! Minimal configuration loading for the herald gateway.
//!
//! Every value has a sane default; a gateway with no config files at all
//! starts up pointing at `ws://localhost:2200`.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/herald/config.toml` (system)
//! 2. `~/.config/herald/config.toml` (user)
//! 3. `./herald.toml` (local override, or the `--config` CLI path)
//! 4. Environment variables (`HERALD_*`)
//!
//! # Example Config
//!
//! ```toml
//! [monitor]
//! endpoint = "ws://localhost:2200"
//! base_delay_ms = 1000
//! cap_delay_ms = 30000
//! max_attempts = 10
//!
//! [bind]
//! http_port = 8080
//!
//! [identity]
//! source = "herald"
//! default_user = "system"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files, discover_config_files_with_override};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },
}

/// Backend monitor connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// WebSocket endpoint of the beacon monitor.
    #[serde(default = "MonitorConfig::default_endpoint")]
    pub endpoint: String,

    /// Base reconnect delay; attempt N waits `base_delay_ms * N`.
    #[serde(default = "MonitorConfig::default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single reconnect delay.
    #[serde(default = "MonitorConfig::default_cap_delay_ms")]
    pub cap_delay_ms: u64,

    /// Reconnect attempts before the link gives up (fail-stop).
    #[serde(default = "MonitorConfig::default_max_attempts")]
    pub max_attempts: u32,
}

impl MonitorConfig {
    fn default_endpoint() -> String {
        "ws://localhost:2200".to_string()
    }

    fn default_base_delay_ms() -> u64 {
        1000
    }

    fn default_cap_delay_ms() -> u64 {
        30_000
    }

    fn default_max_attempts() -> u32 {
        10
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            base_delay_ms: Self::default_base_delay_ms(),
            cap_delay_ms: Self::default_cap_delay_ms(),
            max_attempts: Self::default_max_attempts(),
        }
    }
}

/// Network bind settings for this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// HTTP port for the MCP, SSE and health endpoints.
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8080
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
        }
    }
}

/// Identity announced to the monitor and stamped into envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Source identifier: envelope `metadata.source` and identify clientId.
    #[serde(default = "IdentityConfig::default_source")]
    pub source: String,

    /// Fallback user id when a tool call omits one.
    #[serde(default = "IdentityConfig::default_user")]
    pub default_user: String,
}

impl IdentityConfig {
    fn default_source() -> String {
        "herald".to_string()
    }

    fn default_user() -> String {
        "system".to_string()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            source: Self::default_source(),
            default_user: Self::default_user(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log verbosity; `RUST_LOG` still takes precedence.
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete herald configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeraldConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl HeraldConfig {
    /// Load configuration from the standard file locations plus the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        loader::load(None)
    }

    /// Load with an explicit config file path (CLI `--config`).
    pub fn load_with_override(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        loader::load(path)
    }
}
