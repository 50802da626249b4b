//! Configuration file management for gpsgate.
//!
//! Reads/writes `~/.gpsgate/config.yaml` with listener address, database
//! path, log filter, and device tracker thresholds.

use std::path::PathBuf;

use crate::types::GatewayError;

/// Full configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub listener: ListenerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, e.g. `info` or `gpsgate_core=debug`.
    pub filter: String,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Seconds of silence before a device counts as offline.
    pub stale_timeout_secs: i64,
    /// Speed above which a device is moving.
    pub moving_speed_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: ListenerConfig {
                host: "0.0.0.0".into(),
                port: 5001,
            },
            database: DatabaseConfig {
                path: "data/gpsgate.db".into(),
            },
            logging: LoggingConfig {
                filter: "info".into(),
            },
            tracker: TrackerConfig {
                stale_timeout_secs: 600,
                moving_speed_kmh: 5.0,
            },
        }
    }
}

impl ListenerConfig {
    /// `host:port` for binding.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Get the config directory path (`~/.gpsgate/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".gpsgate")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.gpsgate/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => return Config::default(),
    };

    parse_config(&text).unwrap_or_default()
}

/// Save config to `~/.gpsgate/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, GatewayError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| GatewayError::Config(e.to_string()))?;

    let path = config_file();
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| GatewayError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Option<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        match (section, key) {
            ("listener", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.listener.host = v;
                }
            }
            ("listener", "port") => {
                if let Ok(v) = val.parse::<u16>() {
                    config.listener.port = v;
                }
            }
            ("database", "path") => {
                if let Some(v) = parse_string_value(val) {
                    config.database.path = v;
                }
            }
            ("logging", "filter") => {
                if let Some(v) = parse_string_value(val) {
                    config.logging.filter = v;
                }
            }
            ("tracker", "stale_timeout_secs") => {
                if let Ok(v) = val.parse::<i64>() {
                    config.tracker.stale_timeout_secs = v;
                }
            }
            ("tracker", "moving_speed_kmh") => {
                if let Some(v) = parse_float_value(val) {
                    config.tracker.moving_speed_kmh = v;
                }
            }
            _ => {}
        }
    }

    Some(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let lines = [
        "# gpsgate configuration".to_string(),
        String::new(),
        "listener:".into(),
        format!("  host: \"{}\"", config.listener.host),
        format!("  port: {}", config.listener.port),
        String::new(),
        "database:".into(),
        format!("  path: \"{}\"", config.database.path),
        String::new(),
        "logging:".into(),
        format!("  filter: \"{}\"", config.logging.filter),
        String::new(),
        "tracker:".into(),
        format!("  stale_timeout_secs: {}", config.tracker.stale_timeout_secs),
        format!("  moving_speed_kmh: {}", config.tracker.moving_speed_kmh),
    ];

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listener.port, 5001);
        assert_eq!(config.listener.addr(), "0.0.0.0:5001");
        assert_eq!(config.database.path, "data/gpsgate.db");
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.tracker.stale_timeout_secs, 600);
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
listener:
  host: "127.0.0.1"
  port: 6001

database:
  path: "/tmp/fleet.db"

logging:
  filter: "gpsgate_core=debug,info"

tracker:
  stale_timeout_secs: 120
  moving_speed_kmh: 8.5
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.listener.port, 6001);
        assert_eq!(config.database.path, "/tmp/fleet.db");
        assert_eq!(config.logging.filter, "gpsgate_core=debug,info");
        assert_eq!(config.tracker.stale_timeout_secs, 120);
        assert_eq!(config.tracker.moving_speed_kmh, 8.5);
    }

    #[test]
    fn test_parse_config_null_and_bad_values() {
        let text = r#"
listener:
  host: ~
  port: not-a-port

database:
  path: null
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.listener.port, 5001);
        assert_eq!(config.database.path, "data/gpsgate.db");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.listener.port = 7001;
        config.database.path = "fleet.db".into();
        config.tracker.moving_speed_kmh = 3.0;

        let parsed = parse_config(&serialize_config(&config)).unwrap();
        assert_eq!(parsed.listener.port, 7001);
        assert_eq!(parsed.database.path, "fleet.db");
        assert_eq!(parsed.tracker.moving_speed_kmh, 3.0);
    }
}
