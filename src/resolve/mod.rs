//! Failure resolution
//!
//! A [`Resolver`] looks at a [`Failure`] and either answers it, asks for a
//! re-dispatch to an error page, or passes. The [`ResolverChain`] runs
//! resolvers in priority order until one answers:
//!
//! 1. [`HandlerRegistry`] - handlers registered per failure kind
//! 2. [`StatusMetadataResolver`] - declarative status and reason per kind
//! 3. generic resolvers such as [`StatusRedispatchResolver`] and
//!    [`CatchAllResolver`], in registration order

mod chain;
mod functional;
mod registry;
mod status;

pub use chain::{ResolverChain, ResolverChainBuilder};
pub use functional::{CatchAllResolver, FnResolver, StatusRedispatchResolver};
pub use registry::{
    HandlerError, HandlerRegistration, HandlerRegistry, HandlerReply, RegistryBuilder,
    RegistryError,
};
pub use status::{CatalogError, MessageCatalog, StatusMetadataResolver};

use axum::extract::Request;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::failure::{Failure, FailureKind};
use crate::negotiate::{ErrorBody, ErrorResponse, Representation};
use crate::redispatch::RedispatchTarget;

/// The parts of the in-flight request resolvers may consult
#[derive(Debug, Clone)]
pub struct RequestHead {
    request_id: Uuid,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            uri,
            headers,
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn representation(&self) -> Representation {
        Representation::from_headers(&self.headers)
    }
}

/// Outcome of a resolution attempt
#[derive(Debug, Clone)]
pub enum Resolution {
    Responded(ErrorResponse),
    Redispatch(RedispatchTarget),
    Unresolved,
}

impl Resolution {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved)
    }

    /// JSON summary of the outcome, for logs and the CLI
    pub fn describe(&self) -> Value {
        match self {
            Resolution::Responded(response) => {
                let mut summary = json!({
                    "outcome": "responded",
                    "status": response.status.as_u16(),
                    "content_type": response.content_type(),
                    "body": response.result(),
                });
                if let ErrorBody::View(view) = &response.body {
                    summary["template"] = json!(view.template);
                }
                summary
            }
            Resolution::Redispatch(target) => json!({
                "outcome": "redispatch",
                "path": target.path.to_string(),
                "status": target.status.as_u16(),
                "message": target.message,
            }),
            Resolution::Unresolved => json!({ "outcome": "unresolved" }),
        }
    }
}

/// A resolver failed while producing its outcome; always fatal
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("handler for {kind} failed: {source}")]
    Handler {
        kind: FailureKind,
        #[source]
        source: HandlerError,
    },
    #[error("resolver {resolver} failed: {message}")]
    Failed { resolver: String, message: String },
}

/// Strategy that tries to turn a failure into a response or re-dispatch
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, failure: &Failure, request: &RequestHead) -> Result<Resolution, ResolverError>;
}
