//! Configuration management for faultline
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use faultline::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `FAULTLINE__<section>__<key>`
//!
//! Examples:
//! - `FAULTLINE__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `FAULTLINE__RESOLVERS__CATCH_ALL=false`
//! - `FAULTLINE__TELEMETRY__LOG_FORMAT=json`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/faultline.toml`.
//! This can be overridden using the `FAULTLINE_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    Config, ErrorPagesConfig, LogFormat, MessagesConfig, ResolversConfig, ServerConfig,
    StatusRedispatchRule, TelemetryConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;

use crate::failure::FailureKind;
use crate::redispatch::ErrorPaths;
use crate::resolve::{
    CatalogError, CatchAllResolver, HandlerRegistry, MessageCatalog, ResolverChain,
    StatusMetadataResolver, StatusRedispatchResolver,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to load message catalog: {0}")]
    Catalog(#[from] CatalogError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`FAULTLINE__*`)
    /// 2. TOML file (default: `config/faultline.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (relative or shared error paths, bad statuses)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn error_paths(&self) -> ErrorPaths {
        // unparseable paths fall back to the defaults
        ErrorPaths::new(&self.error_pages.client_path, &self.error_pages.server_path)
            .unwrap_or_default()
    }

    /// Message catalog from `messages.catalog_path`, empty when unset
    pub fn message_catalog(&self) -> Result<MessageCatalog, ConfigError> {
        match &self.messages.catalog_path {
            Some(path) => Ok(MessageCatalog::load(path)?),
            None => Ok(MessageCatalog::new()),
        }
    }

    /// Status redispatch rules as typed pairs
    ///
    /// Statuses that do not form a valid code are skipped; validation
    /// rejects them before this is reached.
    pub fn status_redispatch_rules(&self) -> Vec<(FailureKind, StatusCode)> {
        self.resolvers
            .status_redispatch
            .iter()
            .filter_map(|rule| {
                StatusCode::from_u16(rule.status)
                    .ok()
                    .map(|status| (rule.kind, status))
            })
            .collect()
    }

    /// Assemble the resolver chain around an application's handler registry
    pub fn resolver_chain(&self, registry: HandlerRegistry) -> Result<ResolverChain, ConfigError> {
        let catalog = Arc::new(self.message_catalog()?);

        let mut builder = ResolverChain::builder()
            .registry(registry)
            .status_metadata(StatusMetadataResolver::new(catalog));

        let rules = self.status_redispatch_rules();
        if !rules.is_empty() {
            builder = builder.resolver(StatusRedispatchResolver::new(rules, self.error_paths()));
        }
        if self.resolvers.catch_all {
            builder = builder.resolver(CatchAllResolver);
        }

        Ok(builder.build())
    }
}
