use std::net::SocketAddr;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::{auth, config::AppConfig, rate_limit::rate_limit, state::AppState, users};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub auth: bool,
    pub rate_limited: bool,
}

const ROUTES: &[RouteInfo] = &[
    RouteInfo { method: "GET", path: "/", auth: false, rate_limited: true },
    RouteInfo { method: "GET", path: "/health", auth: false, rate_limited: false },
    RouteInfo { method: "GET", path: "/docs", auth: false, rate_limited: false },
    RouteInfo { method: "POST", path: "/api/v1/auth/register", auth: false, rate_limited: false },
    RouteInfo { method: "POST", path: "/api/v1/auth/login", auth: false, rate_limited: false },
    RouteInfo { method: "GET", path: "/api/v1/users/me", auth: true, rate_limited: false },
    RouteInfo { method: "PUT", path: "/api/v1/users/me", auth: true, rate_limited: false },
    RouteInfo { method: "DELETE", path: "/api/v1/users/me", auth: true, rate_limited: false },
];

pub fn build_app(state: AppState) -> Router {
    let limited: Router<AppState> = Router::new()
        .route("/", get(root))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ));

    Router::new()
        .merge(limited)
        .route("/health", get(health))
        .route("/docs", get(docs))
        .nest(API_PREFIX, auth::router().merge(users::router()))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Auth API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn docs() -> Json<&'static [RouteInfo]> {
    Json(ROUTES)
}

pub fn init_tracing(config: &AppConfig) {
    let env_filter = EnvFilter::new(&config.log_filter);
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
