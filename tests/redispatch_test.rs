//! Re-dispatch and double-fault behavior of the transport layer

use axum::{
    Json, Router,
    body::Body,
    extract::Request,
    http::{Method, StatusCode, header},
    response::Response,
    routing::{any, get},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::{Layer, ServiceExt};

use faultline::failure::{Failure, FailureKind, Fault};
use faultline::negotiate::ErrorResult;
use faultline::observability::ResolutionMetrics;
use faultline::redispatch::{ErrorContext, ErrorPaths, RedispatchTarget, attr};
use faultline::resolve::{
    CatchAllResolver, HandlerError, HandlerRegistration, HandlerRegistry, HandlerReply,
    Resolution, ResolverChain,
};
use faultline::transport::{
    ErrorHandlingLayer, ErrorHandlingService, FALLBACK_BODY, HtmlRenderer, error_routes,
};

const CLIENT_PATH: &str = "/oops/client";
const SERVER_PATH: &str = "/oops/server";

fn paths() -> ErrorPaths {
    ErrorPaths::new(CLIENT_PATH, SERVER_PATH).unwrap()
}

async fn raise_runtime() -> Result<(), Failure> {
    Err(Failure::runtime("boom").in_handler("orders::create"))
}

async fn raise_bad_argument() -> Result<(), Failure> {
    Err(Failure::bad_argument("quantity must be positive").in_handler("orders::create"))
}

async fn raise_not_found_status() -> Fault {
    Fault::status(StatusCode::NOT_FOUND)
}

async fn raise_redirect_status() -> Fault {
    Fault::Status {
        status: StatusCode::FOUND,
        message: Some("moved along".to_string()),
    }
}

/// Error page that echoes the carried context as JSON
async fn echo_context(request: Request) -> Json<Value> {
    let context = request.extensions().get::<ErrorContext>();
    let attributes: serde_json::Map<String, Value> = context
        .map(|c| {
            c.attributes()
                .into_iter()
                .map(|(key, value)| (key.to_string(), json!(value)))
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "method": request.method().as_str(),
        "accept": request.headers().get(header::ACCEPT).and_then(|v| v.to_str().ok()),
        "attributes": attributes,
    }))
}

fn routes() -> Router {
    Router::new()
        .route("/orders", any(raise_runtime))
        .route("/orders/bad", get(raise_bad_argument))
        .route("/missing", get(raise_not_found_status))
        .route("/moved", get(raise_redirect_status))
}

fn wrap(router: Router, layer: ErrorHandlingLayer) -> ErrorHandlingService<Router> {
    layer.layer(router)
}

fn json_request(method: Method, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_context_reaches_error_page() {
    let router = routes()
        .route(CLIENT_PATH, any(echo_context))
        .route(SERVER_PATH, any(echo_context));
    let layer = ErrorHandlingLayer::new(ResolverChain::builder().build(), paths());
    let app = wrap(router, layer);

    let response = app.oneshot(json_request(Method::POST, "/orders")).await.unwrap();

    // pass-through goes to the server page with 500
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["accept"], "application/json");
    assert_eq!(body["attributes"][attr::REQUEST_URI], "/orders");
    assert_eq!(body["attributes"][attr::EXCEPTION_TYPE], "generic-runtime-error");
    assert_eq!(body["attributes"][attr::HANDLER_NAME], "orders::create");
    assert_eq!(body["attributes"][attr::STATUS_CODE], "500");
    assert_eq!(body["attributes"][attr::DISPATCH_PHASE], "redispatched");
    assert!(body["attributes"][attr::OCCURRED_AT].is_string());
}

#[tokio::test]
async fn test_status_only_context_has_no_exception() {
    let router = routes()
        .route(CLIENT_PATH, any(echo_context))
        .route(SERVER_PATH, any(echo_context));
    let app = wrap(
        router,
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["attributes"][attr::EXCEPTION], Value::Null);
    assert_eq!(body["attributes"][attr::STATUS_CODE], "404");
}

#[tokio::test]
async fn test_failure_in_error_page_is_double_fault() {
    let router = routes()
        .route(CLIENT_PATH, any(raise_runtime))
        .route(SERVER_PATH, any(raise_runtime));
    let chain = ResolverChain::builder().resolver(CatchAllResolver).build();
    let metrics = Arc::new(ResolutionMetrics::new());
    let app = wrap(
        router,
        ErrorHandlingLayer::new(chain, paths()).with_metrics(metrics.clone()),
    );

    let response = app.oneshot(json_request(Method::GET, "/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, FALLBACK_BODY.as_bytes());
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.redispatched, 1);
    assert_eq!(snapshot.double_faults, 1);
}

#[tokio::test]
async fn test_status_fault_in_error_page_is_double_fault() {
    let router = routes()
        .route(CLIENT_PATH, any(raise_not_found_status))
        .route(SERVER_PATH, any(raise_not_found_status));
    let app = wrap(
        router,
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_render_failure_during_redispatch_is_fatal() {
    let router = routes().merge(error_routes(&paths()));
    let app = wrap(
        router,
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths())
            .with_renderer(HtmlRenderer::new().strict()),
    );

    let request = Request::builder()
        .uri("/missing")
        .header(header::ACCEPT, "text/html")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, FALLBACK_BODY.as_bytes());
}

#[tokio::test]
async fn test_registered_template_is_rendered() {
    let router = routes().merge(error_routes(&paths()));
    let renderer = HtmlRenderer::new()
        .with_template("error/404", "<h1>{{status}}</h1><p>{{code}}</p><p>{{request_uri}}</p>");
    let app = wrap(
        router,
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths()).with_renderer(renderer),
    );

    let request = Request::builder()
        .uri("/missing")
        .header(header::ACCEPT, "text/html")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        String::from_utf8(body_bytes(response).await).unwrap(),
        "<h1>404</h1><p>not-found</p><p>/missing</p>"
    );
}

#[tokio::test]
async fn test_unmounted_error_page_keeps_context_status() {
    // no error page routes: the router's own 404 comes back for the synthetic request
    let app = wrap(
        routes(),
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/orders")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_failing_handler_is_fatal() {
    let mut builder = HandlerRegistry::builder();
    builder.register(HandlerRegistration::new(FailureKind::Runtime, |_: &Failure| {
        Err(HandlerError("handler exploded".to_string()))
    }));
    let chain = ResolverChain::builder()
        .registry(builder.build().unwrap())
        .resolver(CatchAllResolver)
        .build();
    let app = wrap(
        routes().merge(error_routes(&paths())),
        ErrorHandlingLayer::new(chain, paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, FALLBACK_BODY.as_bytes());
}

#[tokio::test]
async fn test_custom_redispatch_status() {
    let chain = ResolverChain::builder()
        .resolver_fn("teapot", |failure, _| {
            if failure.kind().is_a(FailureKind::Runtime) {
                Ok(Resolution::Redispatch(RedispatchTarget {
                    path: paths().client().clone(),
                    status: StatusCode::IM_A_TEAPOT,
                    message: Some("short and stout".to_string()),
                }))
            } else {
                Ok(Resolution::Unresolved)
            }
        })
        .build();
    let app = wrap(
        routes().merge(error_routes(&paths())),
        ErrorHandlingLayer::new(chain, paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    let result: ErrorResult = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(result, ErrorResult::new("i-m-a-teapot", "short and stout"));
}

#[tokio::test]
async fn test_scoped_handler_beats_global() {
    let mut builder = HandlerRegistry::builder();
    builder
        .register(
            HandlerRegistration::new(FailureKind::BadArgument, |f: &Failure| {
                Ok(HandlerReply::body(ErrorResult::new("global", f.message())))
            })
            .with_fixed_status(StatusCode::BAD_REQUEST),
        )
        .register(
            HandlerRegistration::new(FailureKind::Runtime, |f: &Failure| {
                Ok(HandlerReply::with_status(
                    ErrorResult::new("orders", f.message()),
                    StatusCode::UNPROCESSABLE_ENTITY,
                ))
            })
            .scoped_to("orders"),
        );
    let chain = ResolverChain::builder()
        .registry(builder.build().unwrap())
        .build();
    let app = wrap(
        routes().merge(error_routes(&paths())),
        ErrorHandlingLayer::new(chain, paths()),
    );

    // scoped ancestor match (runtime) wins over the global exact match
    let response = app.oneshot(json_request(Method::GET, "/orders/bad")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let result: ErrorResult = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(result, ErrorResult::new("orders", "quantity must be positive"));
}

#[tokio::test]
async fn test_non_error_status_fault_is_served_as_500() {
    let app = wrap(
        routes().merge(error_routes(&paths())),
        ErrorHandlingLayer::new(ResolverChain::builder().build(), paths()),
    );

    let response = app.oneshot(json_request(Method::GET, "/moved")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::LOCATION).is_none());
    let result: ErrorResult = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        result,
        ErrorResult::new("internal-server-error", "internal error")
    );
}
