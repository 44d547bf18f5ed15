//! Handlers mounted on the two re-dispatch paths
//!
//! Both read the [`ErrorContext`] attached to the synthetic request and answer
//! through the content-negotiating responder. Hit directly by a client (no
//! context), they answer with their own default status.

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::routing::any;
use tracing::info;

use crate::negotiate::{self, ErrorResponse, ErrorResult, Representation};
use crate::redispatch::{ErrorContext, ErrorPaths};

pub async fn client_error_page(request: Request) -> ErrorResponse {
    info!("Client error page");
    error_page(StatusCode::NOT_FOUND, &request)
}

pub async fn server_error_page(request: Request) -> ErrorResponse {
    info!("Server error page");
    error_page(StatusCode::INTERNAL_SERVER_ERROR, &request)
}

fn error_page(default_status: StatusCode, request: &Request) -> ErrorResponse {
    let representation = Representation::from_headers(request.headers());

    match request.extensions().get::<ErrorContext>() {
        Some(context) => {
            log_error_context(context);
            negotiate::respond_to_context(context, representation)
        }
        None => {
            let message = if default_status.is_server_error() {
                negotiate::GENERIC_MESSAGE
            } else {
                default_status.canonical_reason().unwrap_or("error")
            };
            negotiate::respond(
                default_status,
                ErrorResult::new(negotiate::status_code_slug(default_status), message),
                representation,
            )
        }
    }
}

fn log_error_context(context: &ErrorContext) {
    for (key, value) in context.attributes() {
        info!(attribute = key, value = value.as_deref().unwrap_or("-"), "Error context");
    }
}

/// Router serving the client and server error pages at the configured paths
pub fn error_routes<S>(paths: &ErrorPaths) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(paths.client().path(), any(client_error_page))
        .route(paths.server().path(), any(server_error_page))
}
