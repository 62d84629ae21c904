//! Request handlers.
//!
//! All handlers return `Result<impl IntoResponse, BastionError>` so errors
//! map to HTTP status codes through `BastionError`'s `IntoResponse`.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::auth::{extract_bearer, CurrentPrincipal, Principal, TokenPair};
use crate::context::RequestContext;
use crate::error::{BastionError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Health and Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        None => "not_configured",
        Some(db) => match db.ping().await {
            Ok(()) => "up",
            Err(e) => {
                e.log();
                "down"
            }
        },
    };
    let status = if database == "down" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status.is_success() { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Credentials
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>> {
    let pair = state.tokens.refresh(&req.refresh_token).await?;
    Ok(Json(ApiResponse::success(pair)))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    if let Some(token) = extract_bearer(&headers) {
        state.tokens.revoke(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub principal: Principal,
    /// Tenant the request runs as
    pub tenant_id: Option<i64>,
}

pub async fn current_user(CurrentPrincipal(principal): CurrentPrincipal) -> Json<ApiResponse<CurrentUser>> {
    Json(ApiResponse::success(CurrentUser {
        principal: principal.as_ref().clone(),
        tenant_id: RequestContext::tenant(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTenantRequest {
    pub tenant_id: i64,
}

pub async fn switch_tenant(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<SwitchTenantRequest>,
) -> Result<Json<ApiResponse<TokenPair>>> {
    let pair = state
        .tokens
        .switch_tenant(&principal, req.tenant_id, state.tenants.directory().as_ref())
        .await?;
    Ok(Json(ApiResponse::success(pair)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsInvalidated {
    pub user_id: i64,
    pub token_version: u64,
}

pub async fn invalidate_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<SessionsInvalidated>>> {
    if user_id <= 0 {
        return Err(BastionError::validation("user id must be positive"));
    }
    let token_version = state.tokens.invalidate_all_sessions(user_id).await?;
    Ok(Json(ApiResponse::success(SessionsInvalidated { user_id, token_version })))
}
