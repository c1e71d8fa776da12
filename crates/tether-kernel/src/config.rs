//! Configuration loading from `~/.tether/config.toml` with defaults.
//!
//! A missing, unreadable or invalid file never aborts startup: the loader
//! logs why and falls back to defaults. Environment overrides are applied
//! last.

use std::path::{Path, PathBuf};
use tether_types::config::TetherConfig;
use tracing::{info, warn};

/// Full listen address override, e.g. `127.0.0.1:9000`.
pub const ENV_LISTEN: &str = "TETHER_LISTEN";
/// Port-only override; keeps the configured host.
pub const ENV_PORT: &str = "PORT";

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tether"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load configuration from a TOML file, with defaults, then apply env overrides.
pub fn load_config(path: Option<&Path>) -> TetherConfig {
    let mut config = load_file(path);
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn load_file(path: Option<&Path>) -> TetherConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return TetherConfig::default();
    }

    let contents = match std::fs::read_to_string(&config_path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            return TetherConfig::default();
        }
    };

    match toml::from_str::<TetherConfig>(&contents) {
        Ok(config) => {
            info!(path = %config_path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to parse config, using defaults"
            );
            TetherConfig::default()
        }
    }
}

/// Apply `TETHER_LISTEN` / `PORT` overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut TetherConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(listen) = lookup(ENV_LISTEN).filter(|v| !v.trim().is_empty()) {
        info!(listen = %listen, "Listen address overridden from {ENV_LISTEN}");
        config.listen_addr = listen.trim().to_string();
        return;
    }

    if let Some(port) = lookup(ENV_PORT) {
        match port.trim().parse::<u16>() {
            Ok(port) => {
                let host = config
                    .listen_addr
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                config.listen_addr = format!("{host}:{port}");
                info!(listen = %config.listen_addr, "Port overridden from {ENV_PORT}");
            }
            Err(e) => warn!(value = %port, error = %e, "Ignoring invalid {ENV_PORT}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_file(Some(&dir.path().join("absent.toml")));
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
listen_addr = "127.0.0.1:9100"

[bridge]
state_timeout_ms = 2500
"#,
        )
        .unwrap();

        let config = load_file(Some(&path));
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.bridge.state_timeout_ms, 2500);
        assert_eq!(config.bridge.code_timeout_ms, 5000);
        assert_eq!(config.peers.outbound_queue, 64);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "listen_addr = [").unwrap();
        let config = load_file(Some(&path));
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_port_override_keeps_host() {
        let mut config = TetherConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            ..Default::default()
        };
        apply_env_overrides(&mut config, env(&[("PORT", "9999")]));
        assert_eq!(config.listen_addr, "127.0.0.1:9999");
    }

    #[test]
    fn test_listen_override_wins_over_port() {
        let mut config = TetherConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("TETHER_LISTEN", "[::1]:7000"), ("PORT", "9999")]),
        );
        assert_eq!(config.listen_addr, "[::1]:7000");
    }

    #[test]
    fn test_invalid_port_ignored() {
        let mut config = TetherConfig::default();
        apply_env_overrides(&mut config, env(&[("PORT", "eighty")]));
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }
}
