//! Role data-scope model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row visibility granted by one role.
///
/// Serialized as the integer codes stored on the role record and in
/// credentials (`1` = ALL ... `5` = CUSTOM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataScopeKind {
    /// Whole organization
    All,
    /// Caller's department and every descendant department
    DeptAndSub,
    /// Caller's department only
    Dept,
    /// Rows created by the caller
    SelfOnly,
    /// Explicit department list
    Custom,
}

impl DataScopeKind {
    pub const fn code(self) -> u8 {
        match self {
            Self::All => 1,
            Self::DeptAndSub => 2,
            Self::Dept => 3,
            Self::SelfOnly => 4,
            Self::Custom => 5,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::All),
            2 => Some(Self::DeptAndSub),
            3 => Some(Self::Dept),
            4 => Some(Self::SelfOnly),
            5 => Some(Self::Custom),
            _ => None,
        }
    }
}

impl TryFrom<u8> for DataScopeKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown data scope code {}", code))
    }
}

impl From<DataScopeKind> for u8 {
    fn from(kind: DataScopeKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for DataScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "ALL",
            Self::DeptAndSub => "DEPT_AND_SUB",
            Self::Dept => "DEPT",
            Self::SelfOnly => "SELF",
            Self::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

/// Data scope held through one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDataScope {
    pub role_code: String,

    #[serde(rename = "dataScope")]
    pub kind: DataScopeKind,

    /// Only meaningful for [`DataScopeKind::Custom`]. Empty means no rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_dept_ids: Option<Vec<i64>>,
}

impl RoleDataScope {
    pub fn new(role_code: impl Into<String>, kind: DataScopeKind) -> Self {
        Self {
            role_code: role_code.into(),
            kind,
            custom_dept_ids: None,
        }
    }

    pub fn custom(role_code: impl Into<String>, dept_ids: Vec<i64>) -> Self {
        Self {
            role_code: role_code.into(),
            kind: DataScopeKind::Custom,
            custom_dept_ids: Some(dept_ids),
        }
    }

    pub fn is_all(&self) -> bool {
        self.kind == DataScopeKind::All
    }

    pub fn custom_dept_ids(&self) -> &[i64] {
        self.custom_dept_ids.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let scope = RoleDataScope::custom("AUDITOR", vec![3, 4]);
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "roleCode": "AUDITOR", "dataScope": 5, "customDeptIds": [3, 4] })
        );

        let dept = RoleDataScope::new("CLERK", DataScopeKind::Dept);
        let json = serde_json::to_value(&dept).unwrap();
        assert!(json.get("customDeptIds").is_none());
    }

    #[test]
    fn test_null_custom_ids_accepted() {
        let scope: RoleDataScope =
            serde_json::from_str(r#"{"roleCode":"X","dataScope":5,"customDeptIds":null}"#).unwrap();
        assert_eq!(scope.kind, DataScopeKind::Custom);
        assert!(scope.custom_dept_ids().is_empty());
    }

    #[test]
    fn test_unknown_code_rejected() {
        let parsed = serde_json::from_str::<RoleDataScope>(r#"{"roleCode":"X","dataScope":9}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_codes_are_stable() {
        for code in 1..=5u8 {
            let kind = DataScopeKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(DataScopeKind::SelfOnly.to_string(), "SELF");
    }
}
