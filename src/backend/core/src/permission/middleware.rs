//! Route-level permission enforcement.
//!
//! Reads the principal placed in request extensions by
//! [`crate::auth::AuthLayer`] and rejects the request unless it holds the
//! configured permission.

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use super::query::PermissionQuery;
use crate::auth::Principal;
use crate::error::BastionError;

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that wraps services with a permission check.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/v1/users/:id/sessions/invalidate", post(force_logout))
///     .layer(RequirePermissionLayer::new(query.clone(), "sys:user:force-logout"));
/// ```
#[derive(Clone)]
pub struct RequirePermissionLayer {
    query: Arc<PermissionQuery>,
    permission: Arc<str>,
}

impl RequirePermissionLayer {
    pub fn new(query: Arc<PermissionQuery>, permission: &str) -> Self {
        Self {
            query,
            permission: Arc::from(permission),
        }
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            query: self.query.clone(),
            permission: self.permission.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    query: Arc<PermissionQuery>,
    permission: Arc<str>,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let query = self.query.clone();
        let permission = self.permission.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(principal) = request.extensions().get::<Arc<Principal>>().cloned() else {
                return Ok(BastionError::access_token_invalid().into_response());
            };

            if !query.has_permission(&principal, &permission).await {
                return Ok(BastionError::permission_denied(permission.as_ref()).into_response());
            }

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PermissionConfig;
    use crate::permission::{InMemoryPermissionCache, StaticPermissionSource};
    use axum::http::StatusCode;
    use std::convert::Infallible;
    use tower::ServiceExt;

    fn layer() -> RequirePermissionLayer {
        let source = StaticPermissionSource::new().grant(None, "ADMIN", ["sys:user:*"]);
        let query = PermissionQuery::new(
            Arc::new(InMemoryPermissionCache::new()),
            Arc::new(source),
            &PermissionConfig::default(),
            false,
        );
        RequirePermissionLayer::new(Arc::new(query), "sys:user:force-logout")
    }

    async fn ok(_req: Request<Body>) -> Result<Response, Infallible> {
        Ok(StatusCode::OK.into_response())
    }

    fn request(principal: Option<Principal>) -> Request<Body> {
        let mut req = Request::new(Body::empty());
        if let Some(p) = principal {
            req.extensions_mut().insert(Arc::new(p));
        }
        req
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized() {
        let svc = layer().layer(tower::service_fn(ok));
        let res = svc.oneshot(request(None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_denied_is_forbidden() {
        let svc = layer().layer(tower::service_fn(ok));
        let res = svc
            .oneshot(request(Some(Principal::new(2, "guest").with_role("GUEST"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_granted_passes_through() {
        let svc = layer().layer(tower::service_fn(ok));
        let res = svc
            .oneshot(request(Some(Principal::new(1, "admin").with_role("ADMIN"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_layer_permission() {
        assert_eq!(layer().permission(), "sys:user:force-logout");
    }
}
