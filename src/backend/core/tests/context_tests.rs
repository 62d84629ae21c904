//! Comprehensive unit tests for the request context.
//!
//! Tests cover:
//! - Scope establishment and teardown
//! - Propagation into spawned and blocking work
//! - Isolation bypass restored on every exit path
//! - Nested tenant overrides
//! - Concurrent requests never observing each other's tenant

use std::sync::Arc;

use bastion_core::auth::Principal;
use bastion_core::context::{self, RequestContext};
use bastion_core::error::{BastionError, ErrorCode};

// ============================================================================
// Scope Tests
// ============================================================================

#[test]
fn test_no_context_outside_scope() {
    assert!(!RequestContext::is_established());
    assert_eq!(RequestContext::tenant(), None);
    assert!(!RequestContext::is_ignore_isolation());
    assert!(RequestContext::principal().is_none());
}

#[test]
fn test_setters_fail_outside_scope() {
    let err = RequestContext::set_tenant(5).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContextNotEstablished);
    assert!(RequestContext::set_ignore_isolation(true).is_err());
}

#[test]
fn test_sync_scope_with_block_on() {
    let tenant = tokio_test::block_on(RequestContext::scope(
        RequestContext::new().with_tenant_id(3),
        async { RequestContext::tenant() },
    ));
    assert_eq!(tenant, Some(3));
    assert_eq!(RequestContext::tenant(), None);
}

#[tokio::test]
async fn test_scope_exposes_principal() {
    let principal = Arc::new(Principal::new(42, "alice").with_tenant(7));
    let ctx = RequestContext::new()
        .with_tenant_id(7)
        .with_principal(principal.clone());

    RequestContext::scope(ctx, async {
        assert_eq!(RequestContext::tenant(), Some(7));
        assert_eq!(RequestContext::principal().map(|p| p.user_id), Some(42));
    })
    .await;
}

#[tokio::test]
async fn test_set_and_clear_within_scope() {
    RequestContext::scope(RequestContext::new(), async {
        RequestContext::set_tenant(9).unwrap();
        assert_eq!(RequestContext::tenant(), Some(9));

        RequestContext::clear();
        assert_eq!(RequestContext::tenant(), None);
        assert!(RequestContext::is_established());
    })
    .await;
}

#[tokio::test]
async fn test_context_dropped_after_scope() {
    RequestContext::scope(RequestContext::new().with_tenant_id(1), async {}).await;
    assert_eq!(RequestContext::tenant(), None);
}

// ============================================================================
// Propagation Tests
// ============================================================================

#[tokio::test]
async fn test_spawn_propagates_context() {
    let observed = RequestContext::scope(RequestContext::new().with_tenant_id(11), async {
        context::spawn(async { RequestContext::tenant() }).await.unwrap()
    })
    .await;
    assert_eq!(observed, Some(11));
}

#[tokio::test]
async fn test_plain_tokio_spawn_does_not_inherit() {
    let observed = RequestContext::scope(RequestContext::new().with_tenant_id(11), async {
        tokio::spawn(async { RequestContext::tenant() }).await.unwrap()
    })
    .await;
    assert_eq!(observed, None);
}

#[tokio::test]
async fn test_spawn_blocking_propagates_context() {
    let observed = RequestContext::scope(
        RequestContext::new().with_tenant_id(12).with_ignore_isolation(true),
        async {
            context::spawn_blocking(|| (RequestContext::tenant(), RequestContext::is_ignore_isolation()))
                .await
                .unwrap()
        },
    )
    .await;
    assert_eq!(observed, (Some(12), true));
}

#[tokio::test]
async fn test_propagate_without_context_is_passthrough() {
    let value = context::propagate(async { RequestContext::tenant() }).await;
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_spawned_task_changes_do_not_leak_back() {
    RequestContext::scope(RequestContext::new().with_tenant_id(1), async {
        context::spawn(async {
            RequestContext::set_tenant(2).unwrap();
        })
        .await
        .unwrap();
        assert_eq!(RequestContext::tenant(), Some(1));
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let mut handles = Vec::new();
    for tenant in 1..=16i64 {
        handles.push(tokio::spawn(RequestContext::scope(
            RequestContext::new().with_tenant_id(tenant),
            async move {
                tokio::task::yield_now().await;
                (tenant, RequestContext::tenant())
            },
        )));
    }
    for handle in handles {
        let (expected, observed) = handle.await.unwrap();
        assert_eq!(observed, Some(expected));
    }
}

// ============================================================================
// Isolation Bypass Tests
// ============================================================================

#[tokio::test]
async fn test_ignoring_isolation_restores_flag() {
    RequestContext::scope(RequestContext::new().with_tenant_id(4), async {
        let inside = RequestContext::ignoring_isolation(async { RequestContext::is_ignore_isolation() }).await;
        assert!(inside);
        assert!(!RequestContext::is_ignore_isolation());
        assert_eq!(RequestContext::tenant(), Some(4));
    })
    .await;
}

#[tokio::test]
async fn test_ignoring_isolation_restores_flag_after_error() {
    RequestContext::scope(RequestContext::new().with_tenant_id(4), async {
        let result: Result<(), BastionError> = RequestContext::ignoring_isolation(async {
            Err(BastionError::internal("boom"))
        })
        .await;
        assert!(result.is_err());
        assert!(!RequestContext::is_ignore_isolation());
    })
    .await;
}

#[test]
fn test_ignoring_isolation_sync_restores_flag_after_panic() {
    RequestContext::sync_scope(RequestContext::new().with_tenant_id(4), || {
        let outcome = std::panic::catch_unwind(|| {
            RequestContext::ignoring_isolation_sync(|| {
                assert!(RequestContext::is_ignore_isolation());
                panic!("failure inside bypass");
            })
        });
        assert!(outcome.is_err());
        assert!(!RequestContext::is_ignore_isolation());
        assert_eq!(RequestContext::tenant(), Some(4));
    });
}

#[test]
fn test_ignoring_isolation_sync_outside_scope() {
    let inside = RequestContext::ignoring_isolation_sync(RequestContext::is_ignore_isolation);
    assert!(inside);
    assert!(!RequestContext::is_ignore_isolation());
}

// ============================================================================
// Tenant Override Tests
// ============================================================================

#[tokio::test]
async fn test_with_tenant_nests_and_restores() {
    RequestContext::scope(RequestContext::new().with_tenant_id(1), async {
        RequestContext::with_tenant(2, async {
            assert_eq!(RequestContext::tenant(), Some(2));
            RequestContext::with_tenant(3, async {
                assert_eq!(RequestContext::tenant(), Some(3));
            })
            .await;
            assert_eq!(RequestContext::tenant(), Some(2));
        })
        .await;
        assert_eq!(RequestContext::tenant(), Some(1));
    })
    .await;
}

#[tokio::test]
async fn test_with_tenant_keeps_principal() {
    let principal = Arc::new(Principal::new(5, "bob"));
    RequestContext::scope(RequestContext::new().with_principal(principal), async {
        let user = RequestContext::with_tenant(8, async { RequestContext::principal().map(|p| p.user_id) }).await;
        assert_eq!(user, Some(5));
    })
    .await;
}
