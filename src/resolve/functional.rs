//! Generic resolvers that run after the registry and status metadata

use axum::http::StatusCode;
use tracing::{error, info};

use super::{RequestHead, Resolution, Resolver, ResolverError};
use crate::failure::{Failure, FailureKind};
use crate::negotiate::{self, ErrorResult};
use crate::redispatch::{ErrorPaths, RedispatchTarget};

type ResolveFn =
    Box<dyn Fn(&Failure, &RequestHead) -> Result<Resolution, ResolverError> + Send + Sync>;

/// Resolver backed by a closure
pub struct FnResolver {
    name: String,
    f: ResolveFn,
}

impl FnResolver {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Failure, &RequestHead) -> Result<Resolution, ResolverError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Resolver for FnResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, failure: &Failure, request: &RequestHead) -> Result<Resolution, ResolverError> {
        (self.f)(failure, request)
    }
}

/// Turns selected failure kinds into a status and re-dispatches to the
/// matching error page, keeping the failure message
///
/// Rules match the kind or any of its descendants; the first matching rule
/// in configuration order wins.
#[derive(Debug, Clone)]
pub struct StatusRedispatchResolver {
    rules: Vec<(FailureKind, StatusCode)>,
    paths: ErrorPaths,
}

impl StatusRedispatchResolver {
    pub fn new(rules: Vec<(FailureKind, StatusCode)>, paths: ErrorPaths) -> Self {
        Self { rules, paths }
    }
}

impl Resolver for StatusRedispatchResolver {
    fn name(&self) -> &str {
        "status-redispatch"
    }

    fn resolve(&self, failure: &Failure, _request: &RequestHead) -> Result<Resolution, ResolverError> {
        let Some((kind, status)) = self
            .rules
            .iter()
            .find(|(kind, _)| failure.kind().is_a(*kind))
        else {
            return Ok(Resolution::Unresolved);
        };

        let path = self.paths.for_status(*status).clone();
        info!(
            kind = %failure.kind(),
            rule = %kind,
            status = status.as_u16(),
            path = %path,
            "Failure converted to status, re-dispatching"
        );

        Ok(Resolution::Redispatch(RedispatchTarget {
            path,
            status: *status,
            message: Some(failure.message().to_string()),
        }))
    }
}

/// Last resort: 500 with the generic message
///
/// The failure detail goes to the log only, never into the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatchAllResolver;

impl Resolver for CatchAllResolver {
    fn name(&self) -> &str {
        "catch-all"
    }

    fn resolve(&self, failure: &Failure, request: &RequestHead) -> Result<Resolution, ResolverError> {
        error!(
            kind = %failure.kind(),
            handler = failure.handler().unwrap_or("-"),
            error = %failure,
            cause = ?failure.cause(),
            "Unhandled failure"
        );

        Ok(Resolution::Responded(negotiate::respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResult::internal(),
            request.representation(),
        )))
    }
}
