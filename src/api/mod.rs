//! HTTP API: Axum server exposing profit queries.
//!
//! CORS follows the configured origin list; responses above 4 KiB are
//! gzip-compressed; data routes optionally require a bearer token.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::compression::{predicate::SizeAbove, CompressionLayer};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use routes::{AppState, ErrorResponse};

/// Bodies smaller than this are sent uncompressed.
pub const COMPRESSION_MIN_BYTES: u16 = 4096;

/// Bind and serve until Ctrl+C.
pub async fn serve(state: AppState, cfg: &ServerConfig) -> Result<()> {
    let app = build_router(state, cfg);
    let addr = format!("{}:{}", cfg.host, cfg.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await
        .context("HTTP server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState, cfg: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&cfg.allowed_origins))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let compression = CompressionLayer::new().compress_when(SizeAbove::new(COMPRESSION_MIN_BYTES));

    Router::new()
        .route("/gem-profit", get(routes::gem_profit))
        .route("/status", get(routes::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .route("/health", get(routes::health))
        .layer(compression)
        .layer(cors)
        .with_state(state)
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        return AllowOrigin::any();
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}

/// Reject requests without the configured bearer token.
///
/// The header must carry the token exactly as configured. Clients that
/// send `Bearer base64(token)` are rejected, so they need to switch to the
/// raw token.
async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(vec!["Missing or invalid bearer token".into()])),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
