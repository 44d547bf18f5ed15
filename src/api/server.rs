use std::net::SocketAddr;

use axum::{Router, extract::Request, routing::get};
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    advice,
    services::{error_400, error_404, error_500, error_ex, get_member, health},
};
use crate::config::Config;
use crate::transport::{ErrorHandlingLayer, ErrorHandlingService, error_routes};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Demo application wrapped in failure resolution
pub fn app(config: &Config) -> Result<ErrorHandlingService<Router>, AnyError> {
    let paths = config.error_paths();
    let chain = config.resolver_chain(advice::registry()?)?;
    info!(resolvers = ?chain.resolver_names(), "Resolver chain assembled");

    let router = Router::new()
        .route("/api2/members/{id}", get(get_member))
        .route("/error-ex", get(error_ex))
        .route("/error-404", get(error_404))
        .route("/error-400", get(error_400))
        .route("/error-500", get(error_500))
        .route("/health", get(health))
        .merge(error_routes(&paths))
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new());

    Ok(ErrorHandlingLayer::new(chain, paths).layer(router))
}

pub async fn run(address: Option<SocketAddr>, config: Config) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);
    let app = app(&config)?;

    let listener = TcpListener::bind(address).await?;
    info!(%address, "faultline listening");

    axum::serve(listener, axum::ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
