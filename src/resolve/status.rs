use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::{RequestHead, Resolution, Resolver, ResolverError};
use crate::failure::{Failure, FailureKind, StatusMetadata};
use crate::negotiate::{self, ErrorResult};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read message catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse message catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("message '{key}' is not a string")]
    NotAString { key: String },
}

/// Reason-key to message lookup, loaded once at startup
///
/// Catalog files are TOML; nested tables flatten to dotted keys, so
/// `[error] bad = "..."` and `"error.bad" = "..."` are the same entry.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            messages: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let table: toml::Table = toml::from_str(source)?;
        let mut messages = HashMap::new();
        flatten(None, &table, &mut messages)?;
        Ok(Self { messages })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&source)?;
        info!(path = %path.display(), entries = catalog.len(), "Loaded message catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.messages.get(key).map(String::as_str)
    }

    /// Catalog entry for `key`, or `key` itself when absent
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).unwrap_or(key)
    }
}

fn flatten(
    prefix: Option<&str>,
    table: &toml::Table,
    out: &mut HashMap<String, String>,
) -> Result<(), CatalogError> {
    for (key, value) in table {
        let full_key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            toml::Value::String(message) => {
                out.insert(full_key, message.clone());
            }
            toml::Value::Table(nested) => flatten(Some(&full_key), nested, out)?,
            _ => return Err(CatalogError::NotAString { key: full_key }),
        }
    }
    Ok(())
}

/// Maps failure kinds to the status and reason they declare
///
/// The table is built from [`FailureKind::status_metadata`] at startup. A
/// failure without metadata of its own is matched through the failures it
/// wraps, nearest cause first.
#[derive(Debug, Clone)]
pub struct StatusMetadataResolver {
    table: HashMap<FailureKind, StatusMetadata>,
    catalog: Arc<MessageCatalog>,
}

impl StatusMetadataResolver {
    pub fn new(catalog: Arc<MessageCatalog>) -> Self {
        Self::from_kinds(FailureKind::ALL, catalog)
    }

    pub fn from_kinds(kinds: impl IntoIterator<Item = FailureKind>, catalog: Arc<MessageCatalog>) -> Self {
        let table = kinds
            .into_iter()
            .filter_map(|kind| kind.status_metadata().map(|meta| (kind, meta)))
            .collect();
        Self { table, catalog }
    }

    pub fn metadata_for(&self, failure: &Failure) -> Option<StatusMetadata> {
        std::iter::once(failure)
            .chain(failure.failure_causes())
            .find_map(|f| self.table.get(&f.kind()).copied())
    }
}

impl Resolver for StatusMetadataResolver {
    fn name(&self) -> &str {
        "status-metadata"
    }

    fn resolve(&self, failure: &Failure, request: &RequestHead) -> Result<Resolution, ResolverError> {
        let Some(meta) = self.metadata_for(failure) else {
            return Ok(Resolution::Unresolved);
        };

        let message = self.catalog.resolve(meta.reason);
        info!(
            kind = %failure.kind(),
            status = meta.status.as_u16(),
            reason = meta.reason,
            "Failure mapped by status metadata"
        );

        Ok(Resolution::Responded(negotiate::respond(
            meta.status,
            ErrorResult::new(meta.reason, message),
            request.representation(),
        )))
    }
}
