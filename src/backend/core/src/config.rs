//! Configuration management.
//!
//! Values are read from an optional config file and then overridden by
//! `BASTION__*` environment variables (`BASTION__SECURITY__JWT_SECRET`, ...).

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Credential signing and lifetime
    #[serde(default)]
    pub security: SecurityConfig,

    /// Tenant isolation
    #[serde(default)]
    pub tenant: TenantConfig,

    /// Department-based data scope
    #[serde(default)]
    pub data_scope: DataScopeConfig,

    /// Permission cache
    #[serde(default)]
    pub permission: PermissionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix for session keys (version counters, revoked jtis)
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// HMAC secret used to sign credentials. Must be at least 32 bytes.
    #[serde(default)]
    pub jwt_secret: String,

    /// Access token lifetime in seconds (`-1` = never expires)
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl: i64,

    /// Refresh token lifetime in seconds (`-1` = never expires)
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl: i64,

    /// Clock skew tolerated on expiry checks
    #[serde(default)]
    pub leeway_secs: u64,

    /// Paths that skip authentication
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl: default_access_token_ttl(),
            refresh_token_ttl: default_refresh_token_ttl(),
            leeway_secs: 0,
            public_paths: default_public_paths(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantConfig {
    /// Whether tenant isolation is active at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tenant discriminator column
    #[serde(default = "default_tenant_column")]
    pub column: String,

    /// Tables that are never tenant-filtered
    #[serde(default = "default_ignore_tables")]
    pub ignore_tables: Vec<String>,

    /// Identifier of the platform default tenant
    #[serde(default)]
    pub default_tenant_id: i64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            column: default_tenant_column(),
            ignore_tables: default_ignore_tables(),
            default_tenant_id: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataScopeConfig {
    #[serde(default = "default_dept_table")]
    pub dept_table: String,

    #[serde(default = "default_dept_id_column")]
    pub dept_id_column: String,

    /// Materialized path column, comma separated ancestor ids
    #[serde(default = "default_tree_path_column")]
    pub tree_path_column: String,
}

impl Default for DataScopeConfig {
    fn default() -> Self {
        Self {
            dept_table: default_dept_table(),
            dept_id_column: default_dept_id_column(),
            tree_path_column: default_tree_path_column(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionConfig {
    /// Role code that bypasses permission and data-scope checks
    #[serde(default = "default_root_role")]
    pub root_role: String,

    /// Redis hash key prefix for role permissions
    #[serde(default = "default_permission_key_prefix")]
    pub cache_key_prefix: String,

    /// Seconds a "role has no permissions" result stays cached
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u64,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            root_role: default_root_role(),
            cache_key_prefix: default_permission_key_prefix(),
            negative_ttl_secs: default_negative_ttl(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_redis_key_prefix() -> String { "auth".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_enabled() -> bool { true }
fn default_access_token_ttl() -> i64 { 7200 }
fn default_refresh_token_ttl() -> i64 { 604_800 }
fn default_public_paths() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/metrics".to_string(),
        "/api/v1/auth/refresh-token".to_string(),
    ]
}
fn default_true() -> bool { true }
fn default_tenant_column() -> String { "tenant_id".to_string() }
fn default_ignore_tables() -> Vec<String> {
    [
        "sys_tenant",
        "sys_tenant_plan",
        "sys_tenant_plan_menu",
        "sys_menu",
        "sys_dict",
        "sys_dict_item",
        "sys_config",
        "gen_table",
        "gen_table_column",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}
fn default_dept_table() -> String { "sys_dept".to_string() }
fn default_dept_id_column() -> String { "id".to_string() }
fn default_tree_path_column() -> String { "tree_path".to_string() }
fn default_root_role() -> String { "ROOT".to_string() }
fn default_permission_key_prefix() -> String { "system:role:perms".to_string() }
fn default_negative_ttl() -> u64 { 300 }

impl Config {
    /// Load configuration from environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("BASTION").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("BASTION").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}
