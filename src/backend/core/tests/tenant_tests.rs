//! Comprehensive unit tests for tenant isolation.
//!
//! Tests cover:
//! - Tenant predicate injection on scoped tables
//! - Exempt tables and the isolation bypass
//! - Fail-closed behavior without a tenant
//! - Insert/update auto-fill and tenant mismatch detection
//! - Default tenant protection
//! - Host-based tenant resolution

use std::sync::Arc;

use bastion_core::auth::Principal;
use bastion_core::config::TenantConfig;
use bastion_core::context::RequestContext;
use bastion_core::error::ErrorCode;
use bastion_core::query::{row, Column, Dataset, Expr, Value};
use bastion_core::tenant::{
    AutoFillService, PredicateInjector, StaticTenantDirectory, Tenant, TenantResolver, TenantStatus,
};
use serde_json::{json, Map, Value as JsonValue};

fn injector() -> PredicateInjector {
    PredicateInjector::new(&TenantConfig::default())
}

fn tenant_ctx(tenant: i64) -> RequestContext {
    RequestContext::new().with_tenant_id(tenant)
}

fn object(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

fn users() -> Dataset {
    Dataset::new().with_table(
        "sys_user",
        vec![
            row([("id", 1i64), ("tenant_id", 1), ("status", 1)]),
            row([("id", 2i64), ("tenant_id", 2), ("status", 1)]),
            row([("id", 3i64), ("tenant_id", 2), ("status", 0)]),
        ],
    )
}

// ============================================================================
// Predicate Injection Tests
// ============================================================================

#[test]
fn test_predicate_added_for_scoped_table() {
    let filter = RequestContext::sync_scope(tenant_ctx(2), || injector().apply("sys_user", None)).unwrap();
    let filter = filter.expect("tenant predicate");
    assert!(filter.has_conjunct_eq(&Column::new("tenant_id"), &2i64.into()));

    let data = users();
    let ids: Vec<_> = data
        .select("sys_user", Some(&filter))
        .iter()
        .map(|r| r["id"].clone())
        .collect();
    assert_eq!(ids, vec![Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_predicate_anded_with_existing_filter() {
    let base = Expr::eq(Column::new("status"), 1);
    let filter = RequestContext::sync_scope(tenant_ctx(2), || injector().apply("sys_user", Some(base)))
        .unwrap()
        .expect("combined filter");

    let data = users();
    let matched = data.select("sys_user", Some(&filter));
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0]["id"], Value::Int(2));
}

#[test]
fn test_aliased_predicate_qualifies_column() {
    let filter = RequestContext::sync_scope(tenant_ctx(5), || {
        injector().apply_aliased("sys_user", Some("u"), None)
    })
    .unwrap()
    .expect("tenant predicate");
    assert!(filter.has_conjunct_eq(&Column::aliased(Some("u"), "tenant_id"), &5i64.into()));
}

#[test]
fn test_exempt_table_left_untouched() {
    let filter = RequestContext::sync_scope(tenant_ctx(2), || injector().apply("sys_menu", None)).unwrap();
    assert!(filter.is_none());

    // Exemption ignores schema prefix and case.
    let filter = RequestContext::sync_scope(tenant_ctx(2), || injector().apply("public.SYS_DICT", None)).unwrap();
    assert!(filter.is_none());
}

#[test]
fn test_ignore_flag_skips_predicate() {
    let ctx = tenant_ctx(2).with_ignore_isolation(true);
    let base = Expr::eq(Column::new("status"), 1);
    let filter = RequestContext::sync_scope(ctx, || injector().apply("sys_user", Some(base.clone()))).unwrap();
    assert_eq!(filter, Some(base));
}

#[test]
fn test_disabled_isolation_skips_predicate() {
    let injector = PredicateInjector::builder().enabled(false).build();
    assert_eq!(injector.apply("sys_user", None).unwrap(), None);
}

#[test]
fn test_custom_column_and_ignored_table() {
    let injector = PredicateInjector::builder()
        .column("org_id")
        .ignore_table("audit_log")
        .build();
    let filter = RequestContext::sync_scope(tenant_ctx(9), || injector.apply("orders", None))
        .unwrap()
        .expect("tenant predicate");
    assert!(filter.has_conjunct_eq(&Column::new("org_id"), &9i64.into()));
    assert!(RequestContext::sync_scope(tenant_ctx(9), || injector.apply("audit_log", None))
        .unwrap()
        .is_none());
}

#[test]
fn test_missing_tenant_fails_closed() {
    let err = RequestContext::sync_scope(RequestContext::new(), || injector().apply("sys_user", None)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TenantContextMissing);

    // Outside of any scope as well.
    let err = injector().apply("sys_user", None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TenantContextMissing);
}

#[tokio::test]
async fn test_ignoring_isolation_scope_for_cross_tenant_work() {
    RequestContext::scope(tenant_ctx(1), async {
        let bypassed = RequestContext::ignoring_isolation(async { injector().apply("sys_user", None) }).await;
        assert_eq!(bypassed.unwrap(), None);
        assert!(injector().apply("sys_user", None).unwrap().is_some());
    })
    .await;
}

// ============================================================================
// Auto-fill Tests
// ============================================================================

#[test]
fn test_insert_fills_tenant_and_timestamps() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"username": "alice"}));
    RequestContext::sync_scope(tenant_ctx(3), || service.on_insert_json("sys_user", &mut record)).unwrap();

    assert_eq!(record["tenant_id"], json!(3));
    assert!(record["create_time"].is_string());
    assert_eq!(record["create_time"], record["update_time"]);
}

#[test]
fn test_insert_keeps_existing_create_time() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"create_time": "2024-01-01T00:00:00+00:00"}));
    RequestContext::sync_scope(tenant_ctx(3), || service.on_insert_json("sys_user", &mut record)).unwrap();
    assert_eq!(record["create_time"], json!("2024-01-01T00:00:00+00:00"));
    assert!(record["update_time"].is_string());
}

#[test]
fn test_insert_with_matching_tenant_accepted() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"tenant_id": 3}));
    RequestContext::sync_scope(tenant_ctx(3), || service.on_insert_json("sys_user", &mut record)).unwrap();
    assert_eq!(record["tenant_id"], json!(3));
}

#[test]
fn test_insert_with_foreign_tenant_rejected() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"tenant_id": 4}));
    let err = RequestContext::sync_scope(tenant_ctx(3), || service.on_insert_json("sys_user", &mut record)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TenantMismatch);
    assert_eq!(record["tenant_id"], json!(4));
}

#[test]
fn test_insert_without_tenant_fails_closed() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"username": "alice"}));
    let err = RequestContext::sync_scope(RequestContext::new(), || service.on_insert_json("sys_user", &mut record))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TenantContextMissing);
}

#[test]
fn test_insert_into_exempt_table_only_stamps_time() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"name": "status"}));
    service.on_insert_json("sys_dict", &mut record).unwrap();
    assert!(record.get("tenant_id").is_none());
    assert!(record["create_time"].is_string());
}

#[test]
fn test_insert_with_non_integer_tenant_rejected() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"tenant_id": [1, 2]}));
    let err = RequestContext::sync_scope(tenant_ctx(3), || service.on_insert_json("sys_user", &mut record)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

#[test]
fn test_update_stamps_update_time_only() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"nickname": "al"}));
    RequestContext::sync_scope(tenant_ctx(3), || service.on_update_json("sys_user", &mut record)).unwrap();
    assert!(record["update_time"].is_string());
    assert!(record.get("create_time").is_none());
    assert!(record.get("tenant_id").is_none());
}

#[test]
fn test_update_with_foreign_tenant_rejected() {
    let service = AutoFillService::new(&TenantConfig::default());
    let mut record = object(json!({"tenant_id": 8}));
    let err = RequestContext::sync_scope(tenant_ctx(3), || service.on_update_json("sys_user", &mut record)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TenantMismatch);

    let bypass = tenant_ctx(3).with_ignore_isolation(true);
    RequestContext::sync_scope(bypass, || service.on_update_json("sys_user", &mut record)).unwrap();
}

// ============================================================================
// Tenant Model Tests
// ============================================================================

#[test]
fn test_default_tenant_cannot_be_disabled_or_deleted() {
    let config = TenantConfig::default();
    let platform = Tenant::new(config.default_tenant_id, "Platform", "platform");
    assert_eq!(
        platform.ensure_can_disable(config.default_tenant_id).unwrap_err().code(),
        ErrorCode::DefaultTenantProtected
    );
    assert_eq!(
        platform.ensure_can_delete(config.default_tenant_id).unwrap_err().code(),
        ErrorCode::DefaultTenantProtected
    );

    let other = Tenant::new(2, "Acme", "acme");
    assert!(other.ensure_can_disable(config.default_tenant_id).is_ok());
    assert!(other.ensure_can_delete(config.default_tenant_id).is_ok());
}

// ============================================================================
// Resolution Tests
// ============================================================================

fn resolver() -> TenantResolver {
    TenantResolver::new(Arc::new(StaticTenantDirectory::new([
        Tenant::new(1, "Acme", "acme").with_domain("acme.example.com"),
        Tenant::new(2, "Globex", "globex").with_domain("globex.example.com"),
        Tenant::new(3, "Dormant", "dormant")
            .with_domain("dormant.example.com")
            .with_status(TenantStatus::Disabled),
    ])))
}

#[tokio::test]
async fn test_principal_tenant_wins_over_host() {
    let principal = Principal::new(1, "alice").with_tenant(2);
    let tenant = resolver()
        .resolve(Some(&principal), Some("acme.example.com"))
        .await
        .unwrap();
    assert_eq!(tenant, Some(2));
}

#[tokio::test]
async fn test_host_resolution_normalizes_case_and_port() {
    let tenant = resolver().resolve(None, Some("ACME.example.com:8443")).await.unwrap();
    assert_eq!(tenant, Some(1));
}

#[tokio::test]
async fn test_inactive_or_unknown_host_resolves_to_none() {
    let resolver = resolver();
    assert_eq!(resolver.resolve(None, Some("dormant.example.com")).await.unwrap(), None);
    assert_eq!(resolver.resolve(None, Some("unknown.example.com")).await.unwrap(), None);
    assert_eq!(resolver.resolve(None, None).await.unwrap(), None);
}

#[tokio::test]
async fn test_directory_changes_apply_to_later_requests() {
    let directory = Arc::new(StaticTenantDirectory::new([
        Tenant::new(1, "Acme", "acme").with_domain("acme.example.com"),
    ]));
    let resolver = TenantResolver::new(directory.clone());
    assert_eq!(resolver.resolve(None, Some("acme.example.com")).await.unwrap(), Some(1));

    directory.upsert(
        Tenant::new(1, "Acme", "acme")
            .with_domain("acme.example.com")
            .with_status(TenantStatus::Disabled),
    );
    assert_eq!(resolver.resolve(None, Some("acme.example.com")).await.unwrap(), None);

    directory.upsert(Tenant::new(1, "Acme", "acme").with_domain("acme.example.org"));
    assert_eq!(resolver.resolve(None, Some("acme.example.org")).await.unwrap(), Some(1));
    assert_eq!(resolver.resolve(None, Some("acme.example.com")).await.unwrap(), None);
}
