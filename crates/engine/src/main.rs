use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use maplive_engine::config::EngineConfig;
use maplive_engine::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
};
use maplive_engine::registry::SessionRegistry;
use maplive_engine::store::SessionStore;
use maplive_engine::ws;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    let registry = Arc::new(SessionRegistry::new(SessionStore::default()));
    registry.spawn_sweeper(config.sweep_interval, config.idle_session_ttl);

    let app =
        build_router(Arc::clone(&registry), config.ws_base_url.clone(), config.cors_origins.clone());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind engine listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting live session engine");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("engine server exited unexpectedly")
}

fn build_router(
    registry: Arc<SessionRegistry>,
    ws_base_url: String,
    cors_origins: Option<String>,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(ws::router(registry, ws_base_url))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(maplive_engine::cors::cors_layer(cors_origins))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);
    response
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
