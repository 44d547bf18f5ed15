use super::models::Config;
use crate::failure::FailureKind;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Error page path '{field}' must be an absolute path, got '{value}'")]
    RelativeErrorPath { field: String, value: String },

    #[error("Client and server error pages must differ, both are '{path}'")]
    SharedErrorPath { path: String },

    #[error("Status {status} for '{kind}' is not a 4xx or 5xx status")]
    InvalidRedispatchStatus { kind: FailureKind, status: u16 },

    #[error("Failure kind '{kind}' has more than one status redispatch rule")]
    DuplicateRedispatchKind { kind: FailureKind },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_error_pages(config)?;
    validate_status_redispatch(config)?;
    Ok(())
}

fn validate_error_pages(config: &Config) -> Result<(), ValidationError> {
    let pages = &config.error_pages;

    for (field, value) in [
        ("error_pages.client_path", &pages.client_path),
        ("error_pages.server_path", &pages.server_path),
    ] {
        // also rejects scheme or authority, and query strings
        let absolute = value.starts_with('/') && !value.starts_with("//") && !value.contains('?');
        if !absolute {
            return Err(ValidationError::RelativeErrorPath {
                field: field.to_string(),
                value: value.clone(),
            });
        }
    }

    if pages.client_path == pages.server_path {
        return Err(ValidationError::SharedErrorPath {
            path: pages.client_path.clone(),
        });
    }

    Ok(())
}

fn validate_status_redispatch(config: &Config) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for rule in &config.resolvers.status_redispatch {
        if !(400..600).contains(&rule.status) {
            return Err(ValidationError::InvalidRedispatchStatus {
                kind: rule.kind,
                status: rule.status,
            });
        }
        if !seen.insert(rule.kind) {
            return Err(ValidationError::DuplicateRedispatchKind { kind: rule.kind });
        }
    }

    Ok(())
}
