//! Failure model raised by request handlers
//!
//! A handler reports trouble by returning a [`Fault`]: either a raised
//! [`Failure`] of some [`FailureKind`], or an explicit status-only signal.
//! Both implement `IntoResponse`; the fault rides along in the response
//! extensions until the transport layer picks it up and resolves it.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure categories
///
/// Each kind declares its direct parents, forming a small type ancestry that
/// the handler registry walks when no exact registration exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Exception,
    #[serde(rename = "generic-runtime-error")]
    Runtime,
    BadArgument,
    IllegalState,
    BadRequest,
    NotFound,
    #[serde(rename = "user-exception")]
    User,
    Io,
    Unavailable,
    Timeout,
}

/// Declarative status and reason attached to a failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMetadata {
    pub status: StatusCode,
    /// Message-catalog key, used verbatim when the catalog has no entry
    pub reason: &'static str,
}

#[derive(Debug, Error)]
#[error("unknown failure kind: {0}")]
pub struct ParseKindError(String);

impl FailureKind {
    pub const ALL: [FailureKind; 10] = [
        FailureKind::Exception,
        FailureKind::Runtime,
        FailureKind::BadArgument,
        FailureKind::IllegalState,
        FailureKind::BadRequest,
        FailureKind::NotFound,
        FailureKind::User,
        FailureKind::Io,
        FailureKind::Unavailable,
        FailureKind::Timeout,
    ];

    /// Wire name used in config, logs and the error context
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::Exception => "exception",
            FailureKind::Runtime => "generic-runtime-error",
            FailureKind::BadArgument => "bad-argument",
            FailureKind::IllegalState => "illegal-state",
            FailureKind::BadRequest => "bad-request",
            FailureKind::NotFound => "not-found",
            FailureKind::User => "user-exception",
            FailureKind::Io => "io",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Timeout => "timeout",
        }
    }

    /// Direct parents, in declaration order
    pub fn parents(&self) -> &'static [FailureKind] {
        match self {
            FailureKind::Exception => &[],
            FailureKind::Runtime | FailureKind::Io | FailureKind::Unavailable => {
                &[FailureKind::Exception]
            }
            FailureKind::BadArgument
            | FailureKind::IllegalState
            | FailureKind::BadRequest
            | FailureKind::NotFound
            | FailureKind::User => &[FailureKind::Runtime],
            FailureKind::Timeout => &[FailureKind::Io, FailureKind::Unavailable],
        }
    }

    pub fn status_metadata(&self) -> Option<StatusMetadata> {
        let (status, reason) = match self {
            FailureKind::BadRequest => (StatusCode::BAD_REQUEST, "error.bad"),
            FailureKind::NotFound => (StatusCode::NOT_FOUND, "error.not-found"),
            FailureKind::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "error.unavailable"),
            _ => return None,
        };
        Some(StatusMetadata { status, reason })
    }

    /// Proper ancestors grouped by distance, nearest level first
    ///
    /// A kind reachable along several paths appears once, at its shortest
    /// distance. Within a level, order follows parent declaration order.
    pub fn ancestry(&self) -> Vec<Vec<FailureKind>> {
        let mut levels = Vec::new();
        let mut seen: HashSet<FailureKind> = HashSet::from([*self]);
        let mut frontier = vec![*self];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for kind in &frontier {
                for parent in kind.parents() {
                    if seen.insert(*parent) {
                        next.push(*parent);
                    }
                }
            }
            if !next.is_empty() {
                levels.push(next.clone());
            }
            frontier = next;
        }

        levels
    }

    /// True when `self` is `other` or descends from it
    pub fn is_a(&self, other: FailureKind) -> bool {
        *self == other || self.ancestry().iter().flatten().any(|k| *k == other)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FailureKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// A failure raised while handling a request
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    handler: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            handler: None,
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BadArgument, message)
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(FailureKind::User, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Runtime, message)
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Tag the failure with the identifier of the handler that raised it
    pub fn in_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn handler(&self) -> Option<&str> {
        self.handler.as_deref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Wrapped causes that are themselves failures, nearest first
    pub fn failure_causes(&self) -> impl Iterator<Item = &Failure> {
        let first = self
            .cause()
            .map(|err| err as &(dyn std::error::Error + 'static));
        // step through a failure's own cause so nested failures are not hidden behind `Arc`
        std::iter::successors(first, |&err| match err.downcast_ref::<Failure>() {
            Some(failure) => failure
                .cause()
                .map(|cause| cause as &(dyn std::error::Error + 'static)),
            None => err.source(),
        })
        .filter_map(|err| err.downcast_ref::<Failure>())
    }
}

/// What a request handler hands back on the error path
#[derive(Debug, Clone)]
pub enum Fault {
    Raised(Failure),
    /// Explicit status-only failure, no exception involved
    Status {
        status: StatusCode,
        message: Option<String>,
    },
}

impl Fault {
    /// Status-only fault; anything outside 4xx/5xx becomes 500
    pub fn status(status: StatusCode) -> Self {
        Fault::Status {
            status: error_status(status),
            message: None,
        }
    }

    pub fn status_with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Fault::Status {
            status: error_status(status),
            message: Some(message.into()),
        }
    }
}

pub(crate) fn error_status(status: StatusCode) -> StatusCode {
    if status.is_client_error() || status.is_server_error() {
        status
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<Failure> for Fault {
    fn from(failure: Failure) -> Self {
        Fault::Raised(failure)
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let status = match &self {
            Fault::Raised(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Fault::Status { status, .. } => *status,
        };
        let mut response = status.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        Fault::from(self).into_response()
    }
}

/// Remove a fault left in the response by a handler
pub(crate) fn take_fault(response: &mut Response) -> Option<Fault> {
    response.extensions_mut().remove::<Fault>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in FailureKind::ALL {
            assert_eq!(kind.name().parse::<FailureKind>().unwrap(), kind);
        }
        assert!("no-such-kind".parse::<FailureKind>().is_err());
    }

    #[test]
    fn test_kind_serde_names_match() {
        let json = serde_json::to_string(&FailureKind::Runtime).unwrap();
        assert_eq!(json, "\"generic-runtime-error\"");
        let kind: FailureKind = serde_json::from_str("\"user-exception\"").unwrap();
        assert_eq!(kind, FailureKind::User);
    }

    #[test]
    fn test_ancestry_levels() {
        assert!(FailureKind::Exception.ancestry().is_empty());
        assert_eq!(
            FailureKind::BadArgument.ancestry(),
            vec![vec![FailureKind::Runtime], vec![FailureKind::Exception]]
        );
        // diamond: exception reachable through both parents, listed once
        assert_eq!(
            FailureKind::Timeout.ancestry(),
            vec![
                vec![FailureKind::Io, FailureKind::Unavailable],
                vec![FailureKind::Exception]
            ]
        );
    }

    #[test]
    fn test_is_a() {
        assert!(FailureKind::Timeout.is_a(FailureKind::Unavailable));
        assert!(FailureKind::User.is_a(FailureKind::Exception));
        assert!(FailureKind::User.is_a(FailureKind::User));
        assert!(!FailureKind::Io.is_a(FailureKind::Runtime));
    }

    #[test]
    fn test_failure_cause_chain() {
        let root = Failure::new(FailureKind::NotFound, "missing row");
        let outer = Failure::runtime("lookup failed").with_cause(root);

        let causes: Vec<_> = outer.failure_causes().map(|f| f.kind()).collect();
        assert_eq!(causes, vec![FailureKind::NotFound]);
        assert!(std::error::Error::source(&outer).is_some());

        let io = std::io::Error::other("socket closed");
        let nested = Failure::runtime("outer")
            .with_cause(Failure::new(FailureKind::Unavailable, "mid").with_cause(
                Failure::new(FailureKind::Timeout, "inner").with_cause(io),
            ));
        let kinds: Vec<_> = nested.failure_causes().map(|f| f.kind()).collect();
        assert_eq!(kinds, vec![FailureKind::Unavailable, FailureKind::Timeout]);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::user("user error").in_handler("members");
        assert_eq!(failure.to_string(), "user-exception: user error");
        assert_eq!(failure.handler(), Some("members"));
    }

    #[test]
    fn test_fault_stashed_in_response() {
        let mut response = Failure::bad_argument("nope").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        match take_fault(&mut response) {
            Some(Fault::Raised(failure)) => assert_eq!(failure.kind(), FailureKind::BadArgument),
            other => panic!("expected raised fault, got {:?}", other),
        }
        assert!(take_fault(&mut response).is_none());
    }

    #[test]
    fn test_status_fault_keeps_status() {
        let mut response = Fault::status(StatusCode::NOT_FOUND).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(
            take_fault(&mut response),
            Some(Fault::Status { status: StatusCode::NOT_FOUND, message: None })
        ));
    }

    #[test]
    fn test_non_error_status_fault_becomes_500() {
        for status in [StatusCode::FOUND, StatusCode::OK, StatusCode::CONTINUE] {
            let mut response = Fault::status(status).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(matches!(
                take_fault(&mut response),
                Some(Fault::Status { status: StatusCode::INTERNAL_SERVER_ERROR, .. })
            ));
        }

        let fault = Fault::status_with_message(StatusCode::MOVED_PERMANENTLY, "moved");
        assert!(matches!(
            fault,
            Fault::Status { status: StatusCode::INTERNAL_SERVER_ERROR, message: Some(_) }
        ));
    }
}
