//! 数据实体定义 - 对应本地库中的集合
//!
//! 时间戳统一以 UTC 毫秒存储，载荷统一为 JSON 文本。

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OfflineSyncError;
use crate::storage::entity_kind::EntityKind;

/// 同步操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SyncOperation {
    type Err = OfflineSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(OfflineSyncError::InvalidArgument(format!("未知同步操作: {}", other))),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 同步项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemStatus {
    /// 等待投递
    Pending,
    /// 重试次数已达上限，仍留在队列中等待人工处理
    Exhausted,
}

impl SyncItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Exhausted => "exhausted",
        }
    }
}

impl FromStr for SyncItemStatus {
    type Err = OfflineSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(OfflineSyncError::InvalidArgument(format!("未知同步项状态: {}", other))),
        }
    }
}

/// 同步项 - 对应 sync_queue 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    /// 入队时分配的全局唯一 ID
    pub id: String,
    pub operation: SyncOperation,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// 只增不减
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub status: SyncItemStatus,
}

impl SyncItem {
    pub fn new(
        operation: SyncOperation,
        entity_type: EntityKind,
        entity_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            entity_type,
            entity_id: entity_id.into(),
            data,
            enqueued_at: Utc::now(),
            retry_count: 0,
            last_error: None,
            status: SyncItemStatus::Pending,
        }
    }

    /// 记录一次失败：retry_count + 1，last_error 覆盖为最近一次错误
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
    }

    pub fn is_exhausted(&self) -> bool {
        self.status == SyncItemStatus::Exhausted
    }
}

/// 缓存项 - 对应 cache 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub key: String,
    pub data: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheItem {
    /// 过期时间已过（严格大于）即视为不存在
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }
}

/// 待上传二进制 - 对应 pending_uploads 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub id: String,
    pub blob: Vec<u8>,
    pub metadata: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

/// 本地偏好设置 - 对应 user_settings 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSetting {
    pub key: String,
    pub value: serde_json::Value,
}

/// 死信 - 对应 dead_letters 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item: SyncItem,
    pub failed_at: DateTime<Utc>,
}

/// 实体镜像记录 - 对应各实体集合表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_sync_item_new_and_failures() {
        let mut item = SyncItem::new(
            SyncOperation::Update,
            EntityKind::Risks,
            "risk-7",
            json!({"score": 12}),
        );
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.status, SyncItemStatus::Pending);
        assert!(uuid::Uuid::parse_str(&item.id).is_ok());

        item.record_failure("503 Service Unavailable");
        item.record_failure("connection reset");
        assert_eq!(item.retry_count, 2);
        assert_eq!(item.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_sync_item_ids_are_unique() {
        let a = SyncItem::new(SyncOperation::Create, EntityKind::Incidents, "1", json!({}));
        let b = SyncItem::new(SyncOperation::Create, EntityKind::Incidents, "1", json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cache_item_expiry() {
        let now = Utc::now();
        let item = CacheItem {
            key: "k".into(),
            data: json!(1),
            stored_at: now,
            expires_at: Some(now + Duration::seconds(1)),
        };
        assert!(!item.is_expired_at(now));
        assert!(!item.is_expired_at(now + Duration::seconds(1)));
        assert!(item.is_expired_at(now + Duration::milliseconds(1001)));

        let forever = CacheItem { expires_at: None, ..item };
        assert!(!forever.is_expired_at(now + Duration::days(365)));
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!("delete".parse::<SyncOperation>().unwrap(), SyncOperation::Delete);
        assert!("upsert".parse::<SyncOperation>().is_err());
        assert_eq!(SyncItemStatus::Exhausted.as_str(), "exhausted");
    }

    #[test]
    fn test_millis_conversion() {
        let ts = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(ts), 1_700_000_000_123);
    }
}
