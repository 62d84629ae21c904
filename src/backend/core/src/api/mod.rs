//! HTTP surface.
//!
//! - `GET /health`, `GET /metrics`: unauthenticated
//! - `/api/v1/auth/*`: credential refresh, logout, tenant switching
//! - `/api/v1/users/:user_id/sessions/invalidate`: forced logout, gated on
//!   `sys:user:force-logout`
//!
//! Every route runs behind [`AuthLayer`], so handlers see an established
//! [`crate::context::RequestContext`].

mod handlers;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthLayer, Authenticator, TokenService};
use crate::db::Database;
use crate::permission::{PermissionQuery, RequirePermissionLayer};
use crate::telemetry::{track_requests, MetricsRegistry};
use crate::tenant::TenantResolver;

/// Permission required to force another user's logout.
pub const FORCE_LOGOUT_PERMISSION: &str = "sys:user:force-logout";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub permissions: Arc<PermissionQuery>,
    pub tenants: TenantResolver,
    pub metrics: MetricsRegistry,
    pub db: Option<Database>,
}

/// Build the router. `public_paths` skip authentication.
///
/// ```rust,ignore
/// let app = build_router(state, config.security.public_paths.clone());
/// axum::serve(listener, app).await?;
/// ```
pub fn build_router(state: AppState, public_paths: Vec<String>) -> Router {
    let authenticator = Arc::new(Authenticator::new(
        state.tokens.clone(),
        state.tenants.clone(),
        public_paths,
    ));

    let admin = Router::new()
        .route(
            "/api/v1/users/:user_id/sessions/invalidate",
            post(handlers::invalidate_sessions),
        )
        .route_layer(RequirePermissionLayer::new(
            state.permissions.clone(),
            FORCE_LOGOUT_PERMISSION,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/api/v1/auth/refresh-token", post(handlers::refresh_token))
        .route("/api/v1/auth/logout", delete(handlers::logout))
        .route("/api/v1/auth/me", get(handlers::current_user))
        .route("/api/v1/auth/switch-tenant", post(handlers::switch_tenant))
        .merge(admin)
        .route_layer(axum_middleware::from_fn(track_requests))
        .layer(AuthLayer::new(authenticator))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}
