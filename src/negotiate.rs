//! Content-negotiating responder
//!
//! Decides between a JSON `{code, message}` body and a rendered error view
//! based on the request's `Accept` header. Anything other than a single
//! `application/json` media type, including a missing or malformed header,
//! selects the view.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::failure::Failure;
use crate::redispatch::ErrorContext;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const VIEW_PREFIX: &str = "error/";
/// The only message a server-class response ever carries
pub const GENERIC_MESSAGE: &str = "internal error";

/// JSON error wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    code: String,
    message: String,
}

impl ErrorResult {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self::new("internal-error", GENERIC_MESSAGE)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Representation chosen for an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Json,
    View,
}

impl Representation {
    pub fn from_accept(accept: Option<&HeaderValue>) -> Self {
        let wants_json = accept
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<mime::Mime>().ok())
            .is_some_and(|media| media.essence_str() == JSON_CONTENT_TYPE);

        if wants_json {
            Representation::Json
        } else {
            Representation::View
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::from_accept(headers.get(header::ACCEPT))
    }
}

/// Template selection handed to the view renderer
#[derive(Debug, Clone)]
pub struct ViewSelection {
    pub template: String,
    pub status: StatusCode,
    pub result: ErrorResult,
    pub context: Option<ErrorContext>,
}

impl ViewSelection {
    pub fn template_for(status: StatusCode) -> String {
        format!("{}{}", VIEW_PREFIX, status.as_u16())
    }
}

#[derive(Debug, Clone)]
pub enum ErrorBody {
    Json(ErrorResult),
    View(ViewSelection),
}

/// A negotiated error response, ready for the transport to write
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ErrorResponse {
    pub fn content_type(&self) -> &'static str {
        match self.body {
            ErrorBody::Json(_) => JSON_CONTENT_TYPE,
            ErrorBody::View(_) => HTML_CONTENT_TYPE,
        }
    }

    pub fn result(&self) -> &ErrorResult {
        match &self.body {
            ErrorBody::Json(result) => result,
            ErrorBody::View(view) => &view.result,
        }
    }
}

pub fn respond(status: StatusCode, result: ErrorResult, representation: Representation) -> ErrorResponse {
    respond_with_context(status, result, None, representation)
}

/// Respond directly for a failure; server-class statuses never echo the failure message
pub fn respond_to_failure(
    failure: &Failure,
    status: StatusCode,
    representation: Representation,
) -> ErrorResponse {
    let result = if status.is_server_error() {
        ErrorResult::internal()
    } else {
        ErrorResult::new(failure.kind().name(), failure.message())
    };
    respond(status, result, representation)
}

/// Respond from the context carried by a re-dispatched request
pub fn respond_to_context(context: &ErrorContext, representation: Representation) -> ErrorResponse {
    let status = context.status();
    let message = if status.is_server_error() {
        GENERIC_MESSAGE.to_string()
    } else {
        context
            .message()
            .map(str::to_owned)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string())
    };
    let result = ErrorResult::new(status_code_slug(status), message);
    respond_with_context(status, result, Some(context.clone()), representation)
}

fn respond_with_context(
    status: StatusCode,
    result: ErrorResult,
    context: Option<ErrorContext>,
    representation: Representation,
) -> ErrorResponse {
    let body = match representation {
        Representation::Json => ErrorBody::Json(result),
        Representation::View => ErrorBody::View(ViewSelection {
            template: ViewSelection::template_for(status),
            status,
            result,
            context,
        }),
    };
    ErrorResponse { status, body }
}

/// `404 Not Found` becomes `not-found`
pub fn status_code_slug(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason.to_ascii_lowercase().replace([' ', '\''], "-"),
        None => status.as_str().to_string(),
    }
}

/// Write a JSON error body with the status set before the body
pub(crate) fn json_response(
    status: StatusCode,
    result: &ErrorResult,
) -> Result<Response, serde_json::Error> {
    let bytes = serde_json::to_vec(result)?;
    let mut response = Body::from(bytes).into_response();
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    Ok(response)
}

pub(crate) fn html_response(status: StatusCode, html: String) -> Response {
    let mut response = Body::from(html).into_response();
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(HTML_CONTENT_TYPE),
    );
    response
}
