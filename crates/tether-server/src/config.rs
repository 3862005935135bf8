//! Server configuration.
//!
//! Layered with figment: compiled defaults, then an optional JSON file, then
//! `TETHER_*` environment variables. Command-line overrides are applied by
//! the binary on top of the loaded value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use tether_core::{LogFormat, RegistryConfig};

/// Prefix for environment overrides, e.g. `TETHER_PORT=9000`.
pub const ENV_PREFIX: &str = "TETHER_";

/// Routes the server always mounts.
pub const RESERVED_PATHS: &[&str] = &["", "/health", "/metrics"];

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A provider failed to parse or extract.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value parsed but is out of range.
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// Offending key.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },
}

/// Configuration for the tether server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Route serving the push stream.
    pub sse_path: String,
    /// Route accepting intake POSTs; advertised in the handshake event.
    pub messages_path: String,
    /// Maximum concurrently open sessions.
    pub max_sessions: usize,
    /// Per-direction queue capacity.
    pub queue_capacity: usize,
    /// How long an outbound write waits for queue room.
    pub write_timeout_ms: u64,
    /// Interval between keep-alive comments on idle push streams.
    pub keep_alive_interval_ms: u64,
    /// Largest accepted intake body.
    pub max_body_bytes: usize,
    /// Grace period for session tasks at shutdown.
    pub shutdown_timeout_secs: u64,
    /// Default filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// `compact` or `json`.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            sse_path: "/sse".into(),
            messages_path: "/messages/".into(),
            max_sessions: 1024,
            queue_capacity: 256,
            write_timeout_ms: 5_000,
            keep_alive_interval_ms: 15_000,
            max_body_bytes: 4 * 1024 * 1024, // 4 MB
            shutdown_timeout_secs: 10,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
        }
    }
}

impl ServerConfig {
    /// Provider chain: defaults, `path` if given, then the environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }
        let config: Self = Self::figment(path).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("max_sessions", self.max_sessions),
            ("queue_capacity", self.queue_capacity),
            ("max_body_bytes", self.max_body_bytes),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: "must be greater than zero".into(),
                });
            }
        }
        if self.keep_alive_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keep_alive_interval_ms",
                message: "must be greater than zero".into(),
            });
        }
        for (field, path) in [("sse_path", &self.sse_path), ("messages_path", &self.messages_path)] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("`{path}` must start with '/'"),
                });
            }
            if path.contains('?') || path.contains('#') {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("`{path}` must not carry a query or fragment"),
                });
            }
        }
        for (field, path) in [("sse_path", &self.sse_path), ("messages_path", &self.messages_path)] {
            if RESERVED_PATHS.contains(&path.trim_end_matches('/')) {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("`{path}` is reserved"),
                });
            }
        }
        if self.sse_path.trim_end_matches('/') == self.messages_path.trim_end_matches('/') {
            return Err(ConfigError::InvalidValue {
                field: "messages_path",
                message: "must differ from sse_path".into(),
            });
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `write_timeout_ms` as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// `keep_alive_interval_ms` as a duration.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// `shutdown_timeout_secs` as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Sizing for the session registry.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_sessions: self.max_sessions,
            queue_capacity: self.queue_capacity,
            write_timeout: self.write_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.sse_path, "/sse");
        assert_eq!(cfg.messages_path, "/messages/");
        assert_eq!(cfg.queue_capacity, 256);
        assert_eq!(cfg.write_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.keep_alive_interval(), Duration::from_secs(15));
        assert_eq!(cfg.log_format, LogFormat::Compact);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn registry_config_follows_server_config() {
        let cfg = ServerConfig {
            max_sessions: 3,
            queue_capacity: 7,
            write_timeout_ms: 250,
            ..ServerConfig::default()
        };
        let reg = cfg.registry_config();
        assert_eq!(reg.max_sessions, 3);
        assert_eq!(reg.queue_capacity, 7);
        assert_eq!(reg.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port":3000}"#).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "127.0.0.1");
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let cfg = ServerConfig {
            queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert_matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field: "queue_capacity", .. })
        );
    }

    #[test]
    fn validate_rejects_relative_or_clashing_paths() {
        let cfg = ServerConfig {
            sse_path: "sse".into(),
            ..ServerConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::InvalidValue { field: "sse_path", .. }));

        let cfg = ServerConfig {
            messages_path: "/sse/".into(),
            ..ServerConfig::default()
        };
        assert_matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { field: "messages_path", .. })
        );

        let cfg = ServerConfig {
            sse_path: "/health".into(),
            ..ServerConfig::default()
        };
        assert_matches!(cfg.validate(), Err(ConfigError::InvalidValue { field: "sse_path", .. }));
    }

    #[test]
    fn load_layers_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tether.json",
                r#"{"port": 9001, "queue_capacity": 16, "log_format": "json"}"#,
            )?;
            jail.set_env("TETHER_PORT", "9002");
            jail.set_env("TETHER_MAX_SESSIONS", "5");

            let cfg = ServerConfig::load(Some(Path::new("tether.json"))).map_err(|e| e.to_string())?;
            assert_eq!(cfg.port, 9002);
            assert_eq!(cfg.max_sessions, 5);
            assert_eq!(cfg.queue_capacity, 16);
            assert_eq!(cfg.log_format, LogFormat::Json);
            assert_eq!(cfg.sse_path, "/sse");
            Ok(())
        });
    }

    #[test]
    fn load_without_file_uses_env() {
        Jail::expect_with(|jail| {
            jail.set_env("TETHER_HOST", "0.0.0.0");
            jail.set_env("TETHER_CONFIG", "ignored.json");
            let cfg = ServerConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(cfg.host, "0.0.0.0");
            assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
            Ok(())
        });
    }

    #[test]
    fn load_missing_file_is_an_error() {
        Jail::expect_with(|_jail| {
            let err = ServerConfig::load(Some(Path::new("absent.json"))).unwrap_err();
            assert_matches!(err, ConfigError::NotFound(_));
            Ok(())
        });
    }

    #[test]
    fn load_rejects_invalid_env_value() {
        Jail::expect_with(|jail| {
            jail.set_env("TETHER_QUEUE_CAPACITY", "0");
            let err = ServerConfig::load(None).unwrap_err();
            assert_matches!(err, ConfigError::InvalidValue { field: "queue_capacity", .. });
            Ok(())
        });
    }

    #[test]
    fn load_reports_type_errors() {
        Jail::expect_with(|jail| {
            jail.set_env("TETHER_PORT", "not-a-port");
            assert_matches!(ServerConfig::load(None), Err(ConfigError::Load(_)));
            Ok(())
        });
    }
}
