//! Comprehensive unit tests for permission checks.
//!
//! Tests cover:
//! - Wildcard grants and the root bypass
//! - Read-through caching and negative caching
//! - Per-tenant cache isolation
//! - Denial when the cache is unreachable
//! - Cache maintenance (refresh, rename, remove, warm-up)
//! - Checks against the current request principal

use std::sync::Arc;

use bastion_core::auth::Principal;
use bastion_core::config::PermissionConfig;
use bastion_core::context::RequestContext;
use bastion_core::error::ErrorCode;
use bastion_core::permission::{
    simple_match, InMemoryPermissionCache, PermissionQuery, StaticPermissionSource,
};

struct Fixture {
    query: PermissionQuery,
    cache: Arc<InMemoryPermissionCache>,
    source: Arc<StaticPermissionSource>,
}

fn fixture(source: StaticPermissionSource, per_tenant: bool) -> Fixture {
    let cache = Arc::new(InMemoryPermissionCache::new());
    let source = Arc::new(source);
    let query = PermissionQuery::new(cache.clone(), source.clone(), &PermissionConfig::default(), per_tenant);
    Fixture { query, cache, source }
}

fn grants() -> StaticPermissionSource {
    StaticPermissionSource::new()
        .grant(Some(1), "EDITOR", ["sys:user:query", "sys:user:edit"])
        .grant(Some(1), "ADMIN", ["sys:*"])
        .grant(Some(2), "EDITOR", ["sys:dept:query"])
}

fn editor(tenant: i64) -> Principal {
    Principal::new(10, "ed").with_tenant(tenant).with_role("EDITOR")
}

// ============================================================================
// Matching Tests
// ============================================================================

#[test]
fn test_simple_match_patterns() {
    assert!(simple_match("sys:user:query", "sys:user:query"));
    assert!(simple_match("sys:*", "sys:user:query"));
    assert!(simple_match("*:query", "sys:user:query"));
    assert!(simple_match("sys:*:query", "sys:user:query"));
    assert!(simple_match("*", "anything"));
    assert!(!simple_match("sys:user:query", "sys:user:edit"));
    assert!(!simple_match("sys:*:edit", "sys:user:query"));
}

#[tokio::test]
async fn test_exact_and_wildcard_grants() {
    let f = fixture(grants(), true);
    assert!(f.query.has_permission(&editor(1), "sys:user:edit").await);
    assert!(!f.query.has_permission(&editor(1), "sys:user:delete").await);

    let admin = Principal::new(11, "ad").with_tenant(1).with_role("ADMIN");
    assert!(f.query.has_permission(&admin, "sys:user:delete").await);
    assert!(!f.query.has_permission(&admin, "oa:leave:approve").await);
}

#[tokio::test]
async fn test_union_across_roles() {
    let f = fixture(grants(), true);
    let both = Principal::new(12, "both").with_tenant(1).with_role("EDITOR").with_role("GHOST");
    assert!(f.query.has_permission(&both, "sys:user:query").await);
}

#[tokio::test]
async fn test_root_bypasses_checks() {
    let f = fixture(StaticPermissionSource::new(), true);
    let root = Principal::new(1, "root").with_role("ROOT");
    assert!(f.query.has_permission(&root, "anything:at:all").await);
    assert_eq!(f.source.loads(), 0);
}

#[tokio::test]
async fn test_blank_permission_and_no_roles_denied() {
    let f = fixture(grants(), true);
    assert!(!f.query.has_permission(&editor(1), "  ").await);
    assert!(!f.query.has_permission(&Principal::new(3, "nobody").with_tenant(1), "sys:user:query").await);
}

#[tokio::test]
async fn test_check_reports_permission_denied() {
    let f = fixture(grants(), true);
    assert!(f.query.check(&editor(1), "sys:user:query").await.is_ok());
    let err = f.query.check(&editor(1), "sys:role:edit").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
}

// ============================================================================
// Caching Tests
// ============================================================================

#[tokio::test]
async fn test_read_through_caches_grants() {
    let f = fixture(grants(), true);
    assert!(f.query.has_permission(&editor(1), "sys:user:query").await);
    assert_eq!(f.source.loads(), 1);

    assert!(f.query.has_permission(&editor(1), "sys:user:edit").await);
    assert_eq!(f.source.loads(), 1);
    assert_eq!(f.cache.len("system:role:perms:1"), 1);
}

#[tokio::test]
async fn test_negative_cache_prevents_reload() {
    let f = fixture(grants(), true);
    let ghost = Principal::new(13, "ghost").with_tenant(1).with_role("GHOST");

    assert!(!f.query.has_permission(&ghost, "sys:user:query").await);
    assert_eq!(f.source.loads(), 1);

    assert!(!f.query.has_permission(&ghost, "sys:user:query").await);
    assert_eq!(f.source.loads(), 1);
}

#[tokio::test]
async fn test_expired_negative_entry_reloads() {
    let config = PermissionConfig {
        negative_ttl_secs: 0,
        ..PermissionConfig::default()
    };
    let cache = Arc::new(InMemoryPermissionCache::new());
    let source = Arc::new(StaticPermissionSource::new());
    let query = PermissionQuery::new(cache, source.clone(), &config, true);
    let ghost = Principal::new(13, "ghost").with_tenant(1).with_role("GHOST");

    assert!(!query.has_permission(&ghost, "sys:user:query").await);
    source.set(Some(1), "GHOST", ["sys:user:query"]);
    assert!(query.has_permission(&ghost, "sys:user:query").await);
    assert_eq!(source.loads(), 2);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let f = fixture(grants(), true);
    assert!(f.query.has_permission(&editor(1), "sys:user:edit").await);
    assert!(!f.query.has_permission(&editor(2), "sys:user:edit").await);
    assert!(f.query.has_permission(&editor(2), "sys:dept:query").await);

    assert_eq!(f.cache.len("system:role:perms:1"), 1);
    assert_eq!(f.cache.len("system:role:perms:2"), 1);
}

#[tokio::test]
async fn test_context_tenant_takes_precedence() {
    let f = fixture(grants(), true);
    let ctx = RequestContext::new().with_tenant_id(2);
    let granted = RequestContext::scope(ctx, f.query.has_permission(&editor(1), "sys:dept:query")).await;
    assert!(granted);
}

#[tokio::test]
async fn test_single_map_without_tenancy() {
    let source = StaticPermissionSource::new().grant(None, "EDITOR", ["sys:user:query"]);
    let f = fixture(source, false);
    assert_eq!(f.query.cache_key(Some(5)), "system:role:perms");
    assert!(f.query.has_permission(&editor(5), "sys:user:query").await);
    assert_eq!(f.cache.len("system:role:perms"), 1);
}

#[tokio::test]
async fn test_cache_unavailable_denies() {
    let f = fixture(grants(), true);
    f.cache.set_unavailable(true);
    assert!(!f.query.has_permission(&editor(1), "sys:user:query").await);
    assert_eq!(f.source.loads(), 0);

    let err = f.query.check(&editor(1), "sys:user:query").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    f.cache.set_unavailable(false);
    assert!(f.query.has_permission(&editor(1), "sys:user:query").await);
}

// ============================================================================
// Maintenance Tests
// ============================================================================

#[tokio::test]
async fn test_refresh_role_picks_up_new_grants() {
    let f = fixture(grants(), true);
    assert!(!f.query.has_permission(&editor(1), "sys:user:delete").await);

    f.source.set(Some(1), "EDITOR", ["sys:user:query", "sys:user:delete"]);
    // Still served from cache until refreshed.
    assert!(!f.query.has_permission(&editor(1), "sys:user:delete").await);

    f.query.refresh_role(Some(1), "EDITOR").await.unwrap();
    assert!(f.query.has_permission(&editor(1), "sys:user:delete").await);
    assert!(!f.query.has_permission(&editor(1), "sys:user:edit").await);
}

#[tokio::test]
async fn test_rename_role_moves_grants() {
    let f = fixture(grants(), true);
    assert!(f.query.has_permission(&editor(1), "sys:user:edit").await);

    f.source.remove(Some(1), "EDITOR");
    f.source.set(Some(1), "WRITER", ["sys:user:query", "sys:user:edit"]);
    f.query.rename_role(Some(1), "EDITOR", "WRITER").await.unwrap();

    let writer = Principal::new(10, "ed").with_tenant(1).with_role("WRITER");
    let loads = f.source.loads();
    assert!(f.query.has_permission(&writer, "sys:user:edit").await);
    assert_eq!(f.source.loads(), loads);
    assert!(!f.query.has_permission(&editor(1), "sys:user:edit").await);
}

#[tokio::test]
async fn test_remove_role_drops_entry() {
    let f = fixture(grants(), true);
    assert!(f.query.has_permission(&editor(1), "sys:user:edit").await);
    f.query.remove_role(Some(1), "EDITOR").await.unwrap();
    assert!(f.cache.is_empty("system:role:perms:1"));
}

#[tokio::test]
async fn test_refresh_tenant_rebuilds_map() {
    let f = fixture(grants(), true);
    let ghost = Principal::new(13, "ghost").with_tenant(1).with_role("GHOST");
    assert!(!f.query.has_permission(&ghost, "sys:user:query").await);
    assert_eq!(f.cache.len("system:role:perms:1"), 1);

    let roles = f.query.refresh_tenant(Some(1)).await.unwrap();
    assert_eq!(roles, 2);
    // Negative entry for GHOST is gone; EDITOR and ADMIN are cached.
    assert_eq!(f.cache.len("system:role:perms:1"), 2);
}

#[tokio::test]
async fn test_warm_up_serves_without_source() {
    let f = fixture(grants(), true);
    let roles = f.query.warm_up([Some(1), Some(2)]).await.unwrap();
    assert_eq!(roles, 3);

    let loads = f.source.loads();
    assert!(f.query.has_permission(&editor(1), "sys:user:query").await);
    assert!(f.query.has_permission(&editor(2), "sys:dept:query").await);
    assert_eq!(f.source.loads(), loads);
}

// ============================================================================
// Current Principal Tests
// ============================================================================

#[tokio::test]
async fn test_has_permission_current() {
    let f = fixture(grants(), true);
    assert!(!f.query.has_permission_current("sys:user:query").await);

    let ctx = RequestContext::new()
        .with_tenant_id(1)
        .with_principal(Arc::new(editor(1)));
    let granted = RequestContext::scope(ctx, f.query.has_permission_current("sys:user:query")).await;
    assert!(granted);
}
