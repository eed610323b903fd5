//! 实体类型枚举 - 本地镜像集合的受控枚举
//!
//! 新增实体类型需同时增加 migration 中的集合表。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::OfflineSyncError;

/// 本地镜像的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Incidents,
    Audits,
    Risks,
    Documents,
    ComplianceItems,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Incidents,
        Self::Audits,
        Self::Risks,
        Self::Documents,
        Self::ComplianceItems,
    ];

    /// 远端资源路径段：`{base}/{entity_type}`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::Audits => "audits",
            Self::Risks => "risks",
            Self::Documents => "documents",
            Self::ComplianceItems => "compliance_items",
        }
    }

    /// 本地集合表名（只来自这个枚举，可以直接拼进 SQL）
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::Audits => "audits",
            Self::Risks => "risks",
            Self::Documents => "documents",
            Self::ComplianceItems => "compliance_items",
        }
    }
}

impl FromStr for EntityKind {
    type Err = OfflineSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incidents" => Ok(Self::Incidents),
            "audits" => Ok(Self::Audits),
            "risks" => Ok(Self::Risks),
            "documents" => Ok(Self::Documents),
            "compliance_items" => Ok(Self::ComplianceItems),
            other => Err(OfflineSyncError::UnknownEntityType(other.to_string())),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_as_str_and_from_str() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(EntityKind::Incidents.to_string(), "incidents");
    }

    #[test]
    fn unknown_entity_type_is_an_error() {
        let err = EntityKind::from_str("invoices").unwrap_err();
        assert!(matches!(err, OfflineSyncError::UnknownEntityType(ref s) if s == "invoices"));
    }

    #[test]
    fn serde_uses_path_segment() {
        let json = serde_json::to_string(&EntityKind::ComplianceItems).unwrap();
        assert_eq!(json, "\"compliance_items\"");
    }
}
