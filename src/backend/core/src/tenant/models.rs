//! Tenant data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BastionError, ErrorCode, Result};

/// Tenant lifecycle state, stored as `1` (active) / `0` (disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum TenantStatus {
    Disabled,
    Active,
}

impl TryFrom<i16> for TenantStatus {
    type Error = String;

    fn try_from(code: i16) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Active),
            other => Err(format!("unknown tenant status {}", other)),
        }
    }
}

impl From<TenantStatus> for i16 {
    fn from(status: TenantStatus) -> Self {
        match status {
            TenantStatus::Disabled => 0,
            TenantStatus::Active => 1,
        }
    }
}

/// A tenant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub code: String,
    /// Host name used for host-based resolution
    pub domain: Option<String>,
    pub plan_id: Option<i64>,
    pub status: TenantStatus,
    pub expire_time: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(id: i64, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            code: code.into(),
            domain: None,
            plan_id: None,
            status: TenantStatus::Active,
            expire_time: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_expire_time(mut self, at: DateTime<Utc>) -> Self {
        self.expire_time = Some(at);
        self
    }

    pub fn is_default(&self, default_tenant_id: i64) -> bool {
        self.id == default_tenant_id
    }

    /// Enabled and not past its expiry at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TenantStatus::Active && self.expire_time.map_or(true, |at| at > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// The default tenant can never be disabled.
    pub fn ensure_can_disable(&self, default_tenant_id: i64) -> Result<()> {
        if self.is_default(default_tenant_id) {
            return Err(BastionError::new(
                ErrorCode::DefaultTenantProtected,
                "The default tenant cannot be disabled",
            )
            .with_context("tenant_id", self.id));
        }
        Ok(())
    }

    /// The default tenant can never be deleted.
    pub fn ensure_can_delete(&self, default_tenant_id: i64) -> Result<()> {
        if self.is_default(default_tenant_id) {
            return Err(BastionError::new(
                ErrorCode::DefaultTenantProtected,
                "The default tenant cannot be deleted",
            )
            .with_context("tenant_id", self.id));
        }
        Ok(())
    }
}
