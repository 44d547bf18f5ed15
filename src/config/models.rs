use crate::failure::FailureKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub error_pages: ErrorPagesConfig,
    #[serde(default)]
    pub resolvers: ResolversConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// The two re-dispatch targets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorPagesConfig {
    /// Error page for 4xx statuses
    #[serde(default = "default_client_path")]
    pub client_path: String,
    /// Error page for everything else
    #[serde(default = "default_server_path")]
    pub server_path: String,
}

impl Default for ErrorPagesConfig {
    fn default() -> Self {
        Self {
            client_path: default_client_path(),
            server_path: default_server_path(),
        }
    }
}

fn default_client_path() -> String {
    "/error-page/404".to_string()
}

fn default_server_path() -> String {
    "/error-page/500".to_string()
}

/// Generic resolvers appended after the registry and status metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolversConfig {
    #[serde(default = "default_catch_all")]
    pub catch_all: bool,
    #[serde(default = "default_status_redispatch")]
    pub status_redispatch: Vec<StatusRedispatchRule>,
}

impl Default for ResolversConfig {
    fn default() -> Self {
        Self {
            catch_all: default_catch_all(),
            status_redispatch: default_status_redispatch(),
        }
    }
}

fn default_catch_all() -> bool {
    true
}

fn default_status_redispatch() -> Vec<StatusRedispatchRule> {
    vec![StatusRedispatchRule {
        kind: FailureKind::IllegalState,
        status: 400,
    }]
}

/// Failure kind (and its descendants) converted to a status
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusRedispatchRule {
    pub kind: FailureKind,
    pub status: u16,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessagesConfig {
    /// TOML message catalog; reason keys are used verbatim without one
    pub catalog_path: Option<PathBuf>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
