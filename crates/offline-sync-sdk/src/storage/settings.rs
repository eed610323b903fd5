//! 本地偏好设置 - 不参与同步，没有 TTL

use std::sync::Arc;

use crate::error::Result;
use crate::storage::dao::DaoFactory;
use crate::storage::entities::UserSetting;
use crate::storage::store::DurableStore;

#[derive(Debug, Clone)]
pub struct SettingsStore {
    store: Arc<DurableStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    pub async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let setting = UserSetting {
            key: key.to_string(),
            value,
        };
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::settings_dao(&conn).upsert(&setting)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        Ok(DaoFactory::settings_dao(&conn).get(key)?.map(|s| s.value))
    }

    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::settings_dao(&conn).delete(key)
    }

    /// 按 key 排序
    pub async fn all_settings(&self) -> Result<Vec<UserSetting>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::settings_dao(&conn).list()
    }
}
