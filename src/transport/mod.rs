//! Transport integration
//!
//! [`ErrorHandlingLayer`] wraps the whole router. Handlers report failures by
//! returning a [`Fault`]; the layer takes it out of the response, runs the
//! resolver chain, and either writes the negotiated response or re-dispatches
//! a synthetic request to one of the error pages. A failure raised while the
//! error page itself is being produced is a double fault and ends in the
//! built-in fallback page.

mod pages;
mod render;

pub use pages::{client_error_page, error_routes, server_error_page};
pub use render::{HtmlRenderer, RenderError, ViewRenderer};

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tower::{Layer, Service, ServiceExt};
use tracing::{Instrument, error, info, info_span, warn};

use crate::failure::{Failure, Fault, error_status, take_fault};
use crate::negotiate::{ErrorBody, ErrorResponse, html_response, json_response};
use crate::observability::ResolutionMetrics;
use crate::redispatch::{DispatchPhase, ErrorContext, ErrorPaths, synthetic_request};
use crate::resolve::{RequestHead, Resolution, ResolverChain, ResolverError};

/// Body of the last-resort page
pub const FALLBACK_BODY: &str = "500 Internal Server Error";

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to encode error body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failure raised while rendering error page {path}: {fault}")]
    DoubleFault { path: String, fault: String },
}

/// Plain-text 500 written when failure resolution itself fails
pub fn fallback_response() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, FALLBACK_BODY).into_response()
}

/// A view waiting for the transport's renderer
#[derive(Debug, Clone)]
struct PendingView(ErrorResponse);

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        match self.body {
            ErrorBody::Json(result) => match json_response(status, &result) {
                Ok(response) => response,
                Err(err) => {
                    error!(error = %err, "Failed to encode error body");
                    fallback_response()
                }
            },
            body @ ErrorBody::View(_) => {
                let mut response = status.into_response();
                response
                    .extensions_mut()
                    .insert(PendingView(ErrorResponse { status, body }));
                response
            }
        }
    }
}

/// Tower layer running failure resolution around a router
#[derive(Clone)]
pub struct ErrorHandlingLayer {
    chain: Arc<ResolverChain>,
    paths: ErrorPaths,
    renderer: Arc<dyn ViewRenderer>,
    metrics: Arc<ResolutionMetrics>,
}

impl ErrorHandlingLayer {
    pub fn new(chain: ResolverChain, paths: ErrorPaths) -> Self {
        Self {
            chain: Arc::new(chain),
            paths,
            renderer: Arc::new(HtmlRenderer::new()),
            metrics: Arc::new(ResolutionMetrics::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: impl ViewRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ResolutionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn paths(&self) -> &ErrorPaths {
        &self.paths
    }

    pub fn metrics(&self) -> Arc<ResolutionMetrics> {
        self.metrics.clone()
    }

    async fn handle<S>(&self, inner: S, request: Request) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        let head = RequestHead::from_request(&request);
        let span = info_span!(
            "request",
            request_id = %head.request_id(),
            method = %head.method(),
            uri = %head.uri(),
        );

        async {
            let response = call(inner.clone(), request).await;
            let response = self.complete(inner, &head, response).await;
            info!(status = response.status().as_u16(), "Request completed");
            response
        }
        .instrument(span)
        .await
    }

    async fn complete<S>(&self, inner: S, head: &RequestHead, mut response: Response) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        match take_fault(&mut response) {
            None => match self.finish(response).await {
                Ok(response) => response,
                Err(err) => self.fatal(&err),
            },
            Some(Fault::Status { status, message }) => {
                let status = error_status(status);
                info!(status = status.as_u16(), "Status-only failure, re-dispatching");
                self.metrics.redispatched();
                let path = self.paths.for_status(status).clone();
                let context = ErrorContext::for_status(status, message, head.uri().to_string());
                self.redispatch(inner, head, path, context).await
            }
            Some(Fault::Raised(failure)) => self.resolve(inner, head, failure).await,
        }
    }

    async fn resolve<S>(&self, inner: S, head: &RequestHead, failure: Failure) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        warn!(
            kind = %failure.kind(),
            handler = failure.handler().unwrap_or("-"),
            phase = %DispatchPhase::Original,
            "Failure raised"
        );

        let outcome = match self.chain.dispatch(&failure, head) {
            Ok(outcome) => outcome,
            Err(err) => return self.fatal(&TransportError::from(err)),
        };

        match outcome {
            Resolution::Responded(reply) => {
                self.metrics.responded();
                match self.write(reply).await {
                    Ok(response) => response,
                    Err(err) => self.fatal(&err),
                }
            }
            Resolution::Redispatch(target) => {
                self.metrics.redispatched();
                let context = ErrorContext::builder()
                    .status(target.status)
                    .failure(failure.clone())
                    .maybe_message(target.message)
                    .request_uri(head.uri().to_string())
                    .maybe_handler_name(failure.handler())
                    .build();
                self.redispatch(inner, head, target.path, context).await
            }
            Resolution::Unresolved => {
                self.metrics.passed_through();
                warn!(kind = %failure.kind(), "No resolver answered, using the server error page");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let context = ErrorContext::capture(&failure, status, head.uri().to_string(), None);
                let path = self.paths.server().clone();
                self.redispatch(inner, head, path, context).await
            }
        }
    }

    /// Second pass through the router; the response status is the context status
    async fn redispatch<S>(
        &self,
        inner: S,
        head: &RequestHead,
        path: Uri,
        context: ErrorContext,
    ) -> Response
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        let status = context.status();
        let span = info_span!(
            "redispatch",
            path = %path,
            status = status.as_u16(),
            phase = %DispatchPhase::Redispatched,
        );

        async {
            let request = synthetic_request(head, &path, context);
            let mut response = call(inner, request).await;

            if let Some(fault) = take_fault(&mut response) {
                return self.fatal(&TransportError::DoubleFault {
                    path: path.to_string(),
                    fault: describe_fault(&fault),
                });
            }

            match self.finish(response).await {
                Ok(mut response) => {
                    *response.status_mut() = status;
                    response
                }
                Err(err) => self.fatal(&err),
            }
        }
        .instrument(span)
        .await
    }

    /// Render a view left behind by an [`ErrorResponse`], if any
    async fn finish(&self, mut response: Response) -> Result<Response, TransportError> {
        match response.extensions_mut().remove::<PendingView>() {
            Some(PendingView(reply)) => self.write(reply).await,
            None => Ok(response),
        }
    }

    async fn write(&self, reply: ErrorResponse) -> Result<Response, TransportError> {
        match reply.body {
            ErrorBody::Json(result) => Ok(json_response(reply.status, &result)?),
            ErrorBody::View(view) => {
                let html = self.renderer.render(&view).await?;
                Ok(html_response(reply.status, html))
            }
        }
    }

    fn fatal(&self, err: &TransportError) -> Response {
        self.metrics.double_fault();
        error!(error = %err, "Failure resolution failed, writing fallback page");
        fallback_response()
    }
}

impl<S> Layer<S> for ErrorHandlingLayer {
    type Service = ErrorHandlingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorHandlingService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ErrorHandlingService<S> {
    inner: S,
    layer: ErrorHandlingLayer,
}

impl<S> Service<Request> for ErrorHandlingService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // keep the service that was polled ready
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move { Ok(layer.handle(inner, request).await) })
    }
}

async fn call<S>(service: S, request: Request) -> Response
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    match service.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

fn describe_fault(fault: &Fault) -> String {
    match fault {
        Fault::Raised(failure) => failure.to_string(),
        Fault::Status { status, .. } => format!("status {}", status.as_u16()),
    }
}
