//! 缓存层 - 基于 cache 表的 TTL 键值缓存
//!
//! 过期只在读取时检查（惰性淘汰），没有后台清扫任务。
//! `set` 是尽力而为的：存储失败只记日志，不向调用方返回错误。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{OfflineSyncError, Result};
use crate::storage::dao::DaoFactory;
use crate::storage::entities::{to_millis, CacheItem};
use crate::storage::store::DurableStore;

#[derive(Debug, Clone)]
pub struct CacheLayer {
    store: Arc<DurableStore>,
}

impl CacheLayer {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// 写入缓存；`ttl` 为 None 表示永不过期
    pub async fn set(&self, key: &str, data: serde_json::Value, ttl: Option<Duration>) {
        if let Err(e) = self.try_set(key, data, ttl).await {
            warn!("⚠️ 写入缓存失败 key={}: {}", key, e);
        }
    }

    async fn try_set(&self, key: &str, data: serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let stored_at = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| OfflineSyncError::InvalidArgument(format!("TTL 超出范围: {}", e)))?;
                let expires_at = stored_at.checked_add_signed(ttl).ok_or_else(|| {
                    OfflineSyncError::InvalidArgument(format!("TTL 超出可表示的时间范围: {:?}", ttl))
                })?;
                Some(expires_at)
            }
            None => None,
        };
        let item = CacheItem {
            key: key.to_string(),
            data,
            stored_at,
            expires_at,
        };

        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::cache_dao(&conn).upsert(&item)
    }

    /// 读取缓存；已过期的条目会被删除并返回 None
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let dao = DaoFactory::cache_dao(&conn);

        let Some(item) = dao.get(key)? else {
            return Ok(None);
        };
        if item.is_expired_at(Utc::now()) {
            dao.delete(key)?;
            debug!("缓存已过期并淘汰: {}", key);
            return Ok(None);
        }
        Ok(Some(item.data))
    }

    /// 读取并反序列化为具体类型
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::cache_dao(&conn).delete(key)
    }

    pub async fn clear(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let removed = DaoFactory::cache_dao(&conn).clear()?;
        debug!("已清空缓存，共 {} 条", removed);
        Ok(removed)
    }

    /// 主动删除所有已过期条目，只在调用方显式调用时执行
    pub async fn purge_expired(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let removed = DaoFactory::cache_dao(&conn).delete_expired(to_millis(Utc::now()))?;
        if removed > 0 {
            debug!("已清理 {} 条过期缓存", removed);
        }
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::cache_dao(&conn).count()
    }
}
