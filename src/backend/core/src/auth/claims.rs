//! Credential claims.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::principal::Principal;
use crate::scope::RoleDataScope;

/// Authority prefix carried in the `authorities` claim.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Payload of a signed credential.
///
/// `exp` is absent for credentials that never expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Username
    pub sub: String,
    pub user_id: i64,
    #[serde(default)]
    pub dept_id: Option<i64>,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub can_switch_tenant: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_scopes: Vec<RoleDataScope>,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    /// `true` for refresh credentials
    pub token_type: bool,
    pub token_version: u64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    pub jti: String,
}

impl Claims {
    /// Snapshot `principal` into a claim set.
    pub fn for_principal(
        principal: &Principal,
        refresh: bool,
        token_version: u64,
        iat: i64,
        exp: Option<i64>,
        jti: String,
    ) -> Self {
        Self {
            sub: principal.username.clone(),
            user_id: principal.user_id,
            dept_id: principal.dept_id,
            tenant_id: principal.tenant_id,
            can_switch_tenant: principal.can_switch_tenant,
            data_scopes: principal.data_scopes.clone(),
            authorities: principal
                .roles
                .iter()
                .map(|r| format!("{}{}", ROLE_PREFIX, r))
                .collect(),
            token_type: refresh,
            token_version,
            iat,
            exp,
            jti,
        }
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type
    }

    /// Rebuild the principal encoded in these claims.
    pub fn to_principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            username: self.sub.clone(),
            dept_id: self.dept_id,
            tenant_id: self.tenant_id,
            roles: self
                .authorities
                .iter()
                .map(|a| a.strip_prefix(ROLE_PREFIX).unwrap_or(a).to_string())
                .collect(),
            data_scopes: self.data_scopes.clone(),
            can_switch_tenant: self.can_switch_tenant,
        }
    }

    /// Seconds until expiry, `None` if the credential never expires.
    /// Zero or negative once expired.
    pub fn remaining_secs(&self, now: i64) -> Option<i64> {
        self.exp.map(|exp| exp - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::DataScopeKind;

    #[test]
    fn test_claim_names() {
        let principal = Principal::new(42, "alice")
            .with_dept(7)
            .with_tenant(1)
            .with_scope(RoleDataScope::new("ADMIN", DataScopeKind::All));
        let claims = Claims::for_principal(&principal, false, 3, 1_700_000_000, None, "abc".into());
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["userId"], 42);
        assert_eq!(json["deptId"], 7);
        assert_eq!(json["tenantId"], 1);
        assert_eq!(json["tokenType"], false);
        assert_eq!(json["tokenVersion"], 3);
        assert_eq!(json["authorities"][0], "ROLE_ADMIN");
        assert_eq!(json["dataScopes"][0]["dataScope"], 1);
        assert!(json.get("exp").is_none());
    }

    #[test]
    fn test_principal_round_trip_strips_prefix() {
        let principal = Principal::new(1, "bob").with_role("CLERK").with_tenant(5);
        let claims = Claims::for_principal(&principal, true, 0, 0, Some(10), "j".into());
        assert_eq!(claims.to_principal(), principal);
        assert_eq!(claims.remaining_secs(4), Some(6));
    }
}
