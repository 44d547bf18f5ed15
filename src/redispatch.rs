//! Re-dispatch context carrier
//!
//! When a failure must be rendered by a dedicated error page, the transport
//! builds a synthetic request for one of two fixed error paths and attaches an
//! [`ErrorContext`] to it. The error-page handler reads that context; the
//! client only ever sees the single response that comes back.

use std::fmt;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Uri, header, uri::InvalidUri};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::failure::Failure;
use crate::resolve::RequestHead;

/// Attribute keys under which the context is exposed to error pages
pub mod attr {
    pub const EXCEPTION: &str = "error.exception";
    pub const EXCEPTION_TYPE: &str = "error.exception_type";
    pub const MESSAGE: &str = "error.message";
    pub const REQUEST_URI: &str = "error.request_uri";
    pub const HANDLER_NAME: &str = "error.handler_name";
    pub const STATUS_CODE: &str = "error.status_code";
    pub const DISPATCH_PHASE: &str = "error.dispatch_phase";
    pub const OCCURRED_AT: &str = "error.occurred_at";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPhase {
    Original,
    Redispatched,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPhase::Original => f.write_str("original"),
            DispatchPhase::Redispatched => f.write_str("redispatched"),
        }
    }
}

/// Read-only failure metadata carried by a re-dispatched request
#[derive(Debug, Clone, Builder)]
pub struct ErrorContext {
    status: StatusCode,
    failure: Option<Failure>,
    #[builder(into)]
    message: Option<String>,
    #[builder(into)]
    request_uri: String,
    #[builder(into)]
    handler_name: Option<String>,
    #[builder(default = DispatchPhase::Redispatched)]
    phase: DispatchPhase,
    #[builder(default = Utc::now())]
    occurred_at: DateTime<Utc>,
}

impl ErrorContext {
    /// Capture a raised failure for a second pass through the pipeline
    ///
    /// The handler name falls back to the one recorded on the failure.
    pub fn capture(
        failure: &Failure,
        status: StatusCode,
        request_uri: impl Into<String>,
        handler_name: Option<&str>,
    ) -> Self {
        let handler_name = handler_name.or(failure.handler()).map(str::to_owned);
        ErrorContext::builder()
            .status(status)
            .failure(failure.clone())
            .message(failure.message())
            .request_uri(request_uri)
            .maybe_handler_name(handler_name)
            .build()
    }

    /// Context for an explicit status-only failure; carries no exception
    pub fn for_status(
        status: StatusCode,
        message: Option<String>,
        request_uri: impl Into<String>,
    ) -> Self {
        ErrorContext::builder()
            .status(status)
            .maybe_message(message)
            .request_uri(request_uri)
            .build()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn exception_type(&self) -> Option<&'static str> {
        self.failure.as_ref().map(|f| f.kind().name())
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn attributes(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            (attr::EXCEPTION, self.failure.as_ref().map(ToString::to_string)),
            (attr::EXCEPTION_TYPE, self.exception_type().map(str::to_owned)),
            (attr::MESSAGE, self.message.clone()),
            (attr::REQUEST_URI, Some(self.request_uri.clone())),
            (attr::HANDLER_NAME, self.handler_name.clone()),
            (attr::STATUS_CODE, Some(self.status.as_u16().to_string())),
            (attr::DISPATCH_PHASE, Some(self.phase.to_string())),
            (attr::OCCURRED_AT, Some(self.occurred_at.to_rfc3339())),
        ]
    }
}

/// The two fixed error paths, one per broad status class
#[derive(Debug, Clone)]
pub struct ErrorPaths {
    client: Uri,
    server: Uri,
}

impl ErrorPaths {
    pub fn new(client: &str, server: &str) -> Result<Self, InvalidUri> {
        Ok(Self {
            client: client.parse()?,
            server: server.parse()?,
        })
    }

    pub fn client(&self) -> &Uri {
        &self.client
    }

    pub fn server(&self) -> &Uri {
        &self.server
    }

    /// 4xx goes to the client path, everything else to the server path
    pub fn for_status(&self, status: StatusCode) -> &Uri {
        if status.is_client_error() {
            &self.client
        } else {
            &self.server
        }
    }
}

impl Default for ErrorPaths {
    fn default() -> Self {
        Self {
            client: Uri::from_static("/error-page/404"),
            server: Uri::from_static("/error-page/500"),
        }
    }
}

/// Where a resolver wants the failure rendered
#[derive(Debug, Clone)]
pub struct RedispatchTarget {
    pub path: Uri,
    pub status: StatusCode,
    pub message: Option<String>,
}

/// Build the internal request for the error path
///
/// Method and headers are copied from the original request so the error
/// page negotiates against the same `Accept` value. The body is empty.
pub(crate) fn synthetic_request(head: &RequestHead, path: &Uri, context: ErrorContext) -> Request {
    let mut request = Request::new(Body::empty());
    *request.method_mut() = head.method().clone();
    *request.uri_mut() = path.clone();
    *request.headers_mut() = head.headers().clone();
    request.headers_mut().remove(header::CONTENT_LENGTH);
    request.headers_mut().remove(header::TRANSFER_ENCODING);
    request.extensions_mut().insert(context);
    request
}
