use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::info;

use super::{RequestHead, Resolution, Resolver, ResolverError};
use crate::failure::{Failure, FailureKind};
use crate::negotiate::{self, ErrorResult};

/// Error returned by a registered handler function
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Body produced by a handler, with an optional status it chose itself
#[derive(Debug, Clone)]
pub struct HandlerReply {
    result: ErrorResult,
    status: Option<StatusCode>,
}

impl HandlerReply {
    /// Body only; unless the registration fixes a status this answers 200
    pub fn body(result: ErrorResult) -> Self {
        Self {
            result,
            status: None,
        }
    }

    pub fn with_status(result: ErrorResult, status: StatusCode) -> Self {
        Self {
            result,
            status: Some(status),
        }
    }
}

type HandlerFn = Arc<dyn Fn(&Failure) -> Result<HandlerReply, HandlerError> + Send + Sync>;

/// A failure-kind selector bound to a handler function
#[derive(Clone)]
pub struct HandlerRegistration {
    selector: FailureKind,
    scope: Option<String>,
    fixed_status: Option<StatusCode>,
    handler: HandlerFn,
}

impl HandlerRegistration {
    pub fn new<F>(selector: FailureKind, handler: F) -> Self
    where
        F: Fn(&Failure) -> Result<HandlerReply, HandlerError> + Send + Sync + 'static,
    {
        Self {
            selector,
            scope: None,
            fixed_status: None,
            handler: Arc::new(handler),
        }
    }

    /// Always answer with this status, whatever the handler returns
    pub fn with_fixed_status(mut self, status: StatusCode) -> Self {
        self.fixed_status = Some(status);
        self
    }

    /// Only apply to failures raised by handlers in this area
    ///
    /// An area matches a handler identifier equal to it or starting with
    /// `<area>::`.
    pub fn scoped_to(mut self, area: impl Into<String>) -> Self {
        self.scope = Some(area.into());
        self
    }

    pub fn selector(&self) -> FailureKind {
        self.selector
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn fixed_status(&self) -> Option<StatusCode> {
        self.fixed_status
    }

    /// Run the handler and settle the status: fixed, then handler-chosen, then 200
    pub fn invoke(&self, failure: &Failure) -> Result<(StatusCode, ErrorResult), HandlerError> {
        let reply = (self.handler)(failure)?;
        let status = self
            .fixed_status
            .or(reply.status)
            .unwrap_or(StatusCode::OK);
        Ok((status, reply.result))
    }

    fn applies_to(&self, handler: Option<&str>) -> bool {
        match (&self.scope, handler) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(scope), Some(name)) => {
                name == scope
                    || name
                        .strip_prefix(scope.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            }
        }
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("selector", &self.selector)
            .field("scope", &self.scope)
            .field("fixed_status", &self.fixed_status)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate handler for {kind} (scope: {scope})")]
    Duplicate { kind: FailureKind, scope: String },
}

/// Failure-kind to handler lookup table, immutable once built
///
/// Lookup prefers handlers scoped to the failure's originating area over
/// global ones. Within either pool an exact kind match wins; otherwise the
/// kind's ancestry is walked nearest level first. When several ancestors at
/// the same distance are registered, the earliest registration wins.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    scoped: Vec<HandlerRegistration>,
    global: Vec<HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.scoped.len() + self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global lookup, ignoring scoped registrations
    pub fn lookup(&self, kind: FailureKind) -> Option<&HandlerRegistration> {
        find_in(self.global.iter(), kind)
    }

    /// Lookup for a failure raised by `handler`
    pub fn lookup_for(&self, kind: FailureKind, handler: Option<&str>) -> Option<&HandlerRegistration> {
        let scoped = self.scoped.iter().filter(|r| r.applies_to(handler));
        find_in(scoped, kind).or_else(|| self.lookup(kind))
    }
}

fn find_in<'a>(
    pool: impl Iterator<Item = &'a HandlerRegistration> + Clone,
    kind: FailureKind,
) -> Option<&'a HandlerRegistration> {
    if let Some(exact) = pool.clone().find(|r| r.selector == kind) {
        return Some(exact);
    }

    kind.ancestry()
        .into_iter()
        .find_map(|level| pool.clone().find(|r| level.contains(&r.selector)))
}

impl Resolver for HandlerRegistry {
    fn name(&self) -> &str {
        "handler-registry"
    }

    fn resolve(&self, failure: &Failure, request: &RequestHead) -> Result<Resolution, ResolverError> {
        let Some(registration) = self.lookup_for(failure.kind(), failure.handler()) else {
            return Ok(Resolution::Unresolved);
        };

        let (status, result) = registration
            .invoke(failure)
            .map_err(|source| ResolverError::Handler {
                kind: failure.kind(),
                source,
            })?;

        info!(
            kind = %failure.kind(),
            selector = %registration.selector(),
            status = status.as_u16(),
            "Failure handled by registered handler"
        );

        Ok(Resolution::Responded(negotiate::respond(
            status,
            result,
            request.representation(),
        )))
    }
}

/// Collects registrations at startup; `build` freezes them
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registrations: Vec<HandlerRegistration>,
}

impl RegistryBuilder {
    pub fn register(&mut self, registration: HandlerRegistration) -> &mut Self {
        self.registrations.push(registration);
        self
    }

    pub fn build(self) -> Result<HandlerRegistry, RegistryError> {
        let mut scoped: Vec<HandlerRegistration> = Vec::new();
        let mut global: Vec<HandlerRegistration> = Vec::new();

        for registration in self.registrations {
            let pool = if registration.scope.is_some() {
                &mut scoped
            } else {
                &mut global
            };

            let duplicate = pool
                .iter()
                .any(|r| r.selector == registration.selector && r.scope == registration.scope);
            if duplicate {
                return Err(RegistryError::Duplicate {
                    kind: registration.selector,
                    scope: registration.scope.unwrap_or_else(|| "global".to_string()),
                });
            }

            pool.push(registration);
        }

        Ok(HandlerRegistry { scoped, global })
    }
}
