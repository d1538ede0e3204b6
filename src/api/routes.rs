//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::{ProfitService, ServiceStatus};
use crate::types::{ProfitError, RankedMargins};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub service: Arc<ProfitService>,
    /// Bearer token required on data routes. `None` = open access.
    pub api_token: Option<String>,
}

impl ApiState {
    pub fn new(service: Arc<ProfitService>, api_token: Option<String>) -> Self {
        Self { service, api_token }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}

impl ErrorResponse {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

/// `ProfitError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ProfitError);

impl From<ProfitError> for ApiError {
    fn from(e: ProfitError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, errors) = match self.0 {
            ProfitError::InvalidQuery(errors) => (StatusCode::BAD_REQUEST, errors),
            e @ ProfitError::ListingsUnavailable(_) => (StatusCode::BAD_GATEWAY, vec![e.to_string()]),
        };
        (status, Json(ErrorResponse::new(errors))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /gem-profit
pub async fn gem_profit(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<DataResponse<RankedMargins>>, ApiError> {
    let ranked = state.service.query_strings(&params).await?;
    Ok(Json(DataResponse { data: ranked }))
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<DataResponse<ServiceStatus>> {
    Json(DataResponse {
        data: state.service.status().await,
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
