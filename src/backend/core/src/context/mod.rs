//! Per-request ambient context.
//!
//! Holds the active tenant, the isolation-bypass flag and the authenticated
//! principal for one logical request.
//!
//! # Features
//!
//! - **Task-local storage**: the context lives in a tokio task-local, so it is
//!   never shared between requests and disappears when the scope ends
//! - **Guaranteed teardown**: [`RequestContext::scope`] and
//!   [`RequestContext::sync_scope`] restore the previous state on return,
//!   panic or cancellation
//! - **Propagation**: [`spawn`], [`spawn_blocking`] and [`propagate`] capture the
//!   current context and re-establish it inside the new unit of work
//! - **Scoped bypass**: [`RequestContext::ignoring_isolation`] and
//!   [`RequestContext::with_tenant`] run a block with a modified context and
//!   re-arm the previous values afterwards
//!
//! # Usage
//!
//! ```rust,ignore
//! use bastion_core::context::RequestContext;
//!
//! let ctx = RequestContext::new().with_tenant_id(7);
//! RequestContext::scope(ctx, async {
//!     assert_eq!(RequestContext::tenant(), Some(7));
//!     RequestContext::ignoring_isolation(async {
//!         assert!(RequestContext::is_ignore_isolation());
//!     })
//!     .await;
//!     assert!(!RequestContext::is_ignore_isolation());
//! })
//! .await;
//! ```

use futures::future::Either;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::Principal;
use crate::error::{BastionError, Result};

tokio::task_local! {
    static CURRENT: RefCell<RequestContext>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context Value
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of the ambient request state.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant_id: Option<i64>,
    ignore_isolation: bool,
    principal: Option<Arc<Principal>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant_id(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_principal(mut self, principal: Arc<Principal>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_ignore_isolation(mut self, ignore: bool) -> Self {
        self.ignore_isolation = ignore;
        self
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant_id
    }

    pub fn ignores_isolation(&self) -> bool {
        self.ignore_isolation
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Establishing a scope
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `future` with `ctx` as the current context.
    ///
    /// The context is dropped when the future completes or is dropped, so a
    /// worker never observes a previous request's tenant.
    pub async fn scope<F>(ctx: RequestContext, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(RefCell::new(ctx), future).await
    }

    /// Synchronous counterpart of [`RequestContext::scope`] for blocking work.
    pub fn sync_scope<F, R>(ctx: RequestContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(RefCell::new(ctx), f)
    }

    /// Snapshot of the current context, `None` outside of any scope.
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|c| c.borrow().clone()).ok()
    }

    /// Whether a context scope is active on this task.
    pub fn is_established() -> bool {
        CURRENT.try_with(|_| ()).is_ok()
    }

    fn update<R>(f: impl FnOnce(&mut RequestContext) -> R) -> Result<R> {
        CURRENT
            .try_with(|c| f(&mut c.borrow_mut()))
            .map_err(|_| BastionError::context_not_established())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors on the current context
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind `tenant_id` to the current scope.
    pub fn set_tenant(tenant_id: i64) -> Result<()> {
        Self::update(|c| c.tenant_id = Some(tenant_id))?;
        debug!(tenant_id, "Tenant bound to request context");
        Ok(())
    }

    /// Current tenant. Always `None` outside of a scope.
    pub fn tenant() -> Option<i64> {
        CURRENT.try_with(|c| c.borrow().tenant_id).ok().flatten()
    }

    /// Set the isolation-bypass flag for the rest of the current scope.
    ///
    /// Prefer [`RequestContext::ignoring_isolation`], which re-arms the flag.
    pub fn set_ignore_isolation(ignore: bool) -> Result<()> {
        Self::update(|c| c.ignore_isolation = ignore)?;
        debug!(ignore, "Isolation bypass flag changed");
        Ok(())
    }

    /// Whether isolation is bypassed. `false` outside of a scope.
    pub fn is_ignore_isolation() -> bool {
        CURRENT.try_with(|c| c.borrow().ignore_isolation).unwrap_or(false)
    }

    /// Authenticated principal of the current request, if any.
    pub fn principal() -> Option<Arc<Principal>> {
        CURRENT.try_with(|c| c.borrow().principal.clone()).ok().flatten()
    }

    pub fn set_principal(principal: Arc<Principal>) -> Result<()> {
        Self::update(|c| c.principal = Some(principal))
    }

    /// Reset the current scope to an empty context.
    pub fn clear() {
        if Self::update(|c| *c = RequestContext::default()).is_ok() {
            debug!("Request context cleared");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Nested scopes
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `future` with isolation bypassed. The outer context, including its
    /// flag, is untouched once the future finishes on any path.
    pub async fn ignoring_isolation<F>(future: F) -> F::Output
    where
        F: Future,
    {
        let ctx = Self::current().unwrap_or_default().with_ignore_isolation(true);
        Self::scope(ctx, future).await
    }

    /// Blocking counterpart of [`RequestContext::ignoring_isolation`].
    pub fn ignoring_isolation_sync<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let ctx = Self::current().unwrap_or_default().with_ignore_isolation(true);
        Self::sync_scope(ctx, f)
    }

    /// Run `future` as tenant `tenant_id`, then restore the previous tenant
    /// and isolation flag.
    pub async fn with_tenant<F>(tenant_id: i64, future: F) -> F::Output
    where
        F: Future,
    {
        let ctx = Self::current().unwrap_or_default().with_tenant_id(tenant_id);
        Self::scope(ctx, future).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Propagation
// ═══════════════════════════════════════════════════════════════════════════════

/// Wrap `future` so it runs under the context captured now.
///
/// Use when handing work to an executor other than tokio's spawn.
pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    match RequestContext::current() {
        Some(ctx) => Either::Left(CURRENT.scope(RefCell::new(ctx), future)),
        None => Either::Right(future),
    }
}

/// `tokio::spawn` that carries the current context into the new task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(future))
}

/// `tokio::task::spawn_blocking` that carries the current context.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let captured = RequestContext::current();
    tokio::task::spawn_blocking(move || match captured {
        Some(ctx) => RequestContext::sync_scope(ctx, f),
        None => f(),
    })
}
