//! Write-time stamping of tenant id and audit timestamps.
//!
//! Inserts get `create_time`/`update_time` and, on tenant-scoped tables, the
//! current tenant id when the record does not carry one. A record that
//! carries a different tenant than the request context is rejected with
//! `TenantMismatch` rather than corrected.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use super::injector::PredicateInjector;
use crate::config::TenantConfig;
use crate::context::RequestContext;
use crate::error::{BastionError, ErrorCode, Result};

pub const CREATE_TIME_FIELD: &str = "create_time";
pub const UPDATE_TIME_FIELD: &str = "update_time";

/// A record with audit and tenant columns.
pub trait Stamped {
    fn tenant_id(&self) -> Option<i64>;
    fn set_tenant_id(&mut self, tenant_id: i64);
    fn create_time(&self) -> Option<DateTime<Utc>>;
    fn set_create_time(&mut self, at: DateTime<Utc>);
    fn set_update_time(&mut self, at: DateTime<Utc>);
}

/// Column-keyed JSON record viewed through [`Stamped`].
struct JsonRecord<'a> {
    map: &'a mut Map<String, JsonValue>,
    tenant_column: &'a str,
}

impl JsonRecord<'_> {
    /// Reject tenant values that are present but not an integer.
    fn check_tenant_value(&self) -> Result<()> {
        match self.map.get(self.tenant_column) {
            None | Some(JsonValue::Null) => Ok(()),
            Some(v) if json_to_i64(v).is_some() => Ok(()),
            Some(_) => Err(BastionError::validation("tenant id must be an integer")
                .with_context("field", self.tenant_column)),
        }
    }
}

fn json_to_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Stamped for JsonRecord<'_> {
    fn tenant_id(&self) -> Option<i64> {
        self.map.get(self.tenant_column).and_then(json_to_i64)
    }

    fn set_tenant_id(&mut self, tenant_id: i64) {
        self.map.insert(self.tenant_column.to_string(), JsonValue::from(tenant_id));
    }

    fn create_time(&self) -> Option<DateTime<Utc>> {
        self.map
            .get(CREATE_TIME_FIELD)
            .and_then(JsonValue::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    fn set_create_time(&mut self, at: DateTime<Utc>) {
        self.map.insert(CREATE_TIME_FIELD.to_string(), JsonValue::from(at.to_rfc3339()));
    }

    fn set_update_time(&mut self, at: DateTime<Utc>) {
        self.map.insert(UPDATE_TIME_FIELD.to_string(), JsonValue::from(at.to_rfc3339()));
    }
}

/// Stamps records before they are written.
#[derive(Debug, Clone)]
pub struct AutoFillService {
    tenancy: PredicateInjector,
}

impl AutoFillService {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            tenancy: PredicateInjector::new(config),
        }
    }

    fn is_tenant_scoped(&self, table: &str) -> bool {
        self.tenancy.is_enabled() && !self.tenancy.is_ignored_table(table)
    }

    /// Stamp a record about to be inserted into `table`.
    pub fn on_insert<R>(&self, table: &str, record: &mut R) -> Result<()>
    where
        R: Stamped + ?Sized,
    {
        let now = Utc::now();
        if record.create_time().is_none() {
            record.set_create_time(now);
        }
        record.set_update_time(now);

        if !self.is_tenant_scoped(table) {
            return Ok(());
        }

        let ignore = RequestContext::is_ignore_isolation();
        let Some(current) = RequestContext::tenant() else {
            if ignore {
                return Ok(());
            }
            return Err(BastionError::tenant_context_missing().with_context("table", table));
        };

        match record.tenant_id() {
            None => {
                record.set_tenant_id(current);
                debug!(table = %table, tenant_id = current, "Tenant id filled on insert");
                Ok(())
            }
            Some(given) if given == current || ignore => Ok(()),
            Some(given) => Err(tenant_mismatch(table, given, current)),
        }
    }

    /// Stamp a record about to be updated in `table`.
    pub fn on_update<R>(&self, table: &str, record: &mut R) -> Result<()>
    where
        R: Stamped + ?Sized,
    {
        record.set_update_time(Utc::now());

        if !self.is_tenant_scoped(table) || RequestContext::is_ignore_isolation() {
            return Ok(());
        }
        match (record.tenant_id(), RequestContext::tenant()) {
            (Some(given), Some(current)) if given != current => Err(tenant_mismatch(table, given, current)),
            _ => Ok(()),
        }
    }

    /// [`AutoFillService::on_insert`] for a JSON object keyed by column name.
    pub fn on_insert_json(&self, table: &str, record: &mut Map<String, JsonValue>) -> Result<()> {
        let column = self.tenancy.column().to_string();
        let mut view = JsonRecord {
            map: record,
            tenant_column: &column,
        };
        view.check_tenant_value()?;
        self.on_insert(table, &mut view)
    }

    /// [`AutoFillService::on_update`] for a JSON object keyed by column name.
    pub fn on_update_json(&self, table: &str, record: &mut Map<String, JsonValue>) -> Result<()> {
        let column = self.tenancy.column().to_string();
        let mut view = JsonRecord {
            map: record,
            tenant_column: &column,
        };
        view.check_tenant_value()?;
        self.on_update(table, &mut view)
    }
}

fn tenant_mismatch(table: &str, given: i64, current: i64) -> BastionError {
    warn!(table = %table, given, current, "Record tenant differs from request tenant");
    BastionError::new(
        ErrorCode::TenantMismatch,
        "Record tenant does not match the request tenant",
    )
    .with_context("table", table)
}
