//! Axum authentication middleware.
//!
//! Every request runs inside its own [`RequestContext`] scope. Protected
//! requests must carry a valid access token; the principal it encodes is
//! placed in request extensions and in the context, and the tenant is
//! resolved from the principal or the `Host` header.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, Instrument};
use uuid::Uuid;

use super::principal::Principal;
use super::token::TokenService;
use crate::context::RequestContext;
use crate::error::{BastionError, Result};
use crate::tenant::TenantResolver;

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticator
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns request headers into a request context.
pub struct Authenticator {
    tokens: Arc<TokenService>,
    tenants: TenantResolver,
    public_paths: Vec<String>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, tenants: TenantResolver, public_paths: Vec<String>) -> Self {
        Self {
            tokens,
            tenants,
            public_paths,
        }
    }

    /// Whether `path` skips authentication. A trailing `*` matches a prefix.
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => path == p,
        })
    }

    /// Principal behind the bearer token in `headers`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal> {
        let token = extract_bearer(headers).ok_or_else(BastionError::access_token_invalid)?;
        self.tokens.authenticate(token).await
    }

    /// Context for a request made by `principal` (if any) to `headers`' host.
    pub async fn context_for(&self, principal: Option<Arc<Principal>>, headers: &HeaderMap) -> Result<RequestContext> {
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
        let tenant = self.tenants.resolve(principal.as_deref(), host).await?;

        let mut ctx = RequestContext::new();
        if let Some(tenant_id) = tenant {
            ctx = ctx.with_tenant_id(tenant_id);
        }
        if let Some(principal) = principal {
            ctx = ctx.with_principal(principal);
        }
        Ok(ctx)
    }
}

/// Token from an `Authorization: Bearer ...` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication layer for Tower.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let request_id = request_id(request.headers());
            let span = tracing::debug_span!("request", request_id = %request_id);

            let principal = if authenticator.is_public_path(request.uri().path()) {
                None
            } else {
                match authenticator.authenticate(request.headers()).await {
                    Ok(principal) => Some(Arc::new(principal)),
                    Err(e) => {
                        debug!(request_id = %request_id, error = %e, "Authentication failed");
                        return Ok(e.into_response());
                    }
                }
            };

            let ctx = match authenticator.context_for(principal.clone(), request.headers()).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    e.log();
                    return Ok(e.into_response());
                }
            };

            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            RequestContext::scope(ctx, inner.call(request)).instrument(span).await
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// The authenticated principal of the current request.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Arc<Principal>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = BastionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<Principal>>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(BastionError::access_token_invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn test_request_id_generated_when_absent() {
        let mut headers = HeaderMap::new();
        assert!(!request_id(&headers).is_empty());
        headers.insert("X-Request-ID", HeaderValue::from_static("req-1"));
        assert_eq!(request_id(&headers), "req-1");
    }
}
