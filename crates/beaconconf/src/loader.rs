//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, HeraldConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/herald/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("herald/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("herald.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config: merge discovered files (later wins), then apply env.
pub fn load(cli_path: Option<&Path>) -> Result<HeraldConfig, ConfigError> {
    let mut merged = toml::Table::new();

    for path in discover_config_files_with_override(cli_path) {
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let table: toml::Table =
            contents
                .parse()
                .map_err(|e: toml::de::Error| ConfigError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
        merge_tables(&mut merged, table);
    }

    let mut config: HeraldConfig =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: PathBuf::from("<merged config>"),
                message: e.to_string(),
            })?;

    apply_env(&mut config)?;
    Ok(config)
}

/// Parse config from a TOML string (no files, no env). Test hook and
/// building block for `load`.
pub fn parse_str(contents: &str, origin: &Path) -> Result<HeraldConfig, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// everything else is replaced by the overlay value.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Environment variables override everything loaded from files.
fn apply_env(config: &mut HeraldConfig) -> Result<(), ConfigError> {
    if let Ok(v) = env::var("HERALD_MONITOR_ENDPOINT") {
        config.monitor.endpoint = v;
    }
    if let Ok(v) = env::var("HERALD_HTTP_PORT") {
        config.bind.http_port = v.parse().map_err(|_| ConfigError::Env {
            var: "HERALD_HTTP_PORT".to_string(),
            message: format!("'{v}' is not a port number"),
        })?;
    }
    if let Ok(v) = env::var("HERALD_SOURCE") {
        config.identity.source = v;
    }
    if let Ok(v) = env::var("HERALD_DEFAULT_USER") {
        config.identity.default_user = v;
    }
    if let Ok(v) = env::var("HERALD_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_input() {
        let config = parse_str("", Path::new("test.toml")).unwrap();
        assert_eq!(config.monitor.endpoint, "ws://localhost:2200");
        assert_eq!(config.monitor.base_delay_ms, 1000);
        assert_eq!(config.monitor.cap_delay_ms, 30_000);
        assert_eq!(config.monitor.max_attempts, 10);
        assert_eq!(config.bind.http_port, 8080);
        assert_eq!(config.identity.source, "herald");
        assert_eq!(config.identity.default_user, "system");
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = parse_str(
            r#"
            [monitor]
            endpoint = "ws://beacon.internal:2200"
            "#,
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.monitor.endpoint, "ws://beacon.internal:2200");
        assert_eq!(config.monitor.max_attempts, 10);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = parse_str("monitor = 12", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn cli_override_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.toml");
        std::fs::write(&path, "[identity]\nsource = \"relay-test\"\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.identity.source, "relay-test");
    }

    #[test]
    fn later_table_wins_on_merge() {
        let mut base: toml::Table = r#"
            [monitor]
            endpoint = "ws://a:1"
            max_attempts = 3
        "#
        .parse()
        .unwrap();
        let overlay: toml::Table = r#"
            [monitor]
            endpoint = "ws://b:2"
        "#
        .parse()
        .unwrap();

        merge_tables(&mut base, overlay);
        let config: HeraldConfig = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.monitor.endpoint, "ws://b:2");
        assert_eq!(config.monitor.max_attempts, 3);
    }
}
