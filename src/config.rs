//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `ESOLOGS_LISTEN`, `ESOLOGS_PIPE_SOCKET`
//! 2. **Config file** — path via `--config <path>`, or `esologs.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! pipe_socket = "/var/lib/esologs/pipe.sock"
//!
//! [logging]
//! level = "info"
//!
//! # Optional — omit entirely to disable the metrics listener
//! [metrics]
//! listen = "127.0.0.1:9090"
//!
//! [[target]]
//! name = "esoteric"
//! log_path = "/var/lib/esologs/logs/esoteric"
//! nick = "logbot"
//! title = "#esoteric"
//! about = "<p>channel logs</p>"
//! announce = ""
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Optional metrics listener. Disabled when omitted entirely.
    pub metrics: Option<MetricsConfig>,
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetEntry>,
}

/// HTTP server and archive settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path of the event tee socket (default `/var/lib/esologs/pipe.sock`).
    #[serde(default = "default_pipe_socket")]
    pub pipe_socket: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Optional Prometheus-text-format metrics listener.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Socket address for the `/metrics` endpoint.
    pub listen: String,
}

/// One archived/rendered IRC-style target (channel), as configured on disk.
/// Converted into [`crate::format::TargetConfig`] plus an archive root at
/// startup.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    /// URL path segment identifying this target.
    pub name: String,
    /// Archive root for this target's day files.
    pub log_path: String,
    /// Self-nick substituted for SENT-direction events.
    pub nick: String,
    /// Rendered `<title>` and page headings.
    pub title: String,
    /// HTML snippet inserted into the index page, if any.
    #[serde(default)]
    pub about: Option<String>,
    /// HTML snippet inserted into the index page, if any.
    #[serde(default)]
    pub announce: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_pipe_socket() -> String {
    "/var/lib/esologs/pipe.sock".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pipe_socket: default_pipe_socket(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `esologs.toml` in the current directory, falling back to compiled
    /// defaults (zero targets — the server will serve nothing until configured).
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("esologs.toml").exists() {
            let content = std::fs::read_to_string("esologs.toml").expect("Failed to read esologs.toml");
            toml::from_str(&content).expect("Failed to parse esologs.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                logging: LoggingConfig::default(),
                metrics: None,
                targets: Vec::new(),
            }
        };

        if let Ok(listen) = std::env::var("ESOLOGS_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(socket) = std::env::var("ESOLOGS_PIPE_SOCKET") {
            config.server.pipe_socket = socket;
        }

        config
    }

    /// Basic sanity checks run before the server starts listening.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.targets.is_empty() {
            errors.push("no [[target]] configured — nothing to serve".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                errors.push("target with empty name".to_string());
            }
            if !seen.insert(target.name.clone()) {
                errors.push(format!("duplicate target name: {}", target.name));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_targets_and_fail_validation() {
        let config = Config {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: None,
            targets: Vec::new(),
        };
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn duplicate_target_names_are_rejected() {
        let target = |name: &str| TargetEntry {
            name: name.to_string(),
            log_path: "/tmp/logs".to_string(),
            nick: "bot".to_string(),
            title: "Title".to_string(),
            about: None,
            announce: None,
        };
        let config = Config {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: None,
            targets: vec![target("a"), target("a")],
        };
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("duplicate")));
    }
}
