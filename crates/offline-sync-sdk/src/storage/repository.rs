//! 实体仓库 - 远端资源的本地镜像
//!
//! 纯按 id upsert，后写覆盖，不做版本控制；远端始终是权威数据。
//! 批量写入包在一个本地事务中（原子性只限本地存储，不延伸到同步路径）。

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::dao::DaoFactory;
use crate::storage::entities::{EntityRecord, SyncOperation};
use crate::storage::entity_kind::EntityKind;
use crate::storage::store::DurableStore;

#[derive(Debug, Clone)]
pub struct EntityRepository {
    store: Arc<DurableStore>,
}

impl EntityRepository {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    pub async fn save_entity(
        &self,
        kind: EntityKind,
        id: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<EntityRecord> {
        let record = EntityRecord {
            id: id.into(),
            data,
            updated_at: Utc::now(),
        };
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).upsert(&record)?;
        debug!("已保存实体 {}/{}", kind, record.id);
        Ok(record)
    }

    /// 批量 upsert，全部成功或全部回滚
    pub async fn save_entities<I, S>(&self, kind: EntityKind, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = (S, serde_json::Value)>,
        S: Into<String>,
    {
        let now = Utc::now();
        let records: Vec<EntityRecord> = items
            .into_iter()
            .map(|(id, data)| EntityRecord {
                id: id.into(),
                data,
                updated_at: now,
            })
            .collect();
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let tx = conn.unchecked_transaction()?;
        {
            let dao = DaoFactory::entity_dao(&tx, kind);
            for record in &records {
                dao.upsert(record)?;
            }
        }
        tx.commit()?;

        info!("✅ 批量保存 {} 条 {} 实体", records.len(), kind);
        Ok(records.len())
    }

    pub async fn get_entity(&self, kind: EntityKind, id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.get_record(kind, id).await?.map(|record| record.data))
    }

    /// 带 updated_at 的完整记录
    pub async fn get_record(&self, kind: EntityKind, id: &str) -> Result<Option<EntityRecord>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).get(id)
    }

    /// 按 updated_at、id 升序返回全部实体
    pub async fn get_all_entities(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .get_all_records(kind)
            .await?
            .into_iter()
            .map(|record| record.data)
            .collect())
    }

    pub async fn get_all_records(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).list()
    }

    pub async fn delete_entity(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).delete(id)
    }

    pub async fn count_entities(&self, kind: EntityKind) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).count()
    }

    pub async fn clear_entities(&self, kind: EntityKind) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::entity_dao(&conn, kind).clear()
    }
}

/// 把一个同步操作应用到本地镜像：create/update → upsert，delete → 删除。
/// 由调用方提供连接或事务。
pub(crate) fn apply_local_mutation(
    conn: &Connection,
    operation: SyncOperation,
    kind: EntityKind,
    entity_id: &str,
    data: &serde_json::Value,
) -> Result<()> {
    let dao = DaoFactory::entity_dao(conn, kind);
    match operation {
        SyncOperation::Create | SyncOperation::Update => dao.upsert(&EntityRecord {
            id: entity_id.to_string(),
            data: data.clone(),
            updated_at: Utc::now(),
        }),
        SyncOperation::Delete => dao.delete(entity_id).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> EntityRepository {
        EntityRepository::new(Arc::new(DurableStore::in_memory()))
    }

    #[tokio::test]
    async fn test_upsert_by_id() {
        let repo = repo();
        repo.save_entity(EntityKind::Incidents, "inc-1", json!({"title": "Leak"}))
            .await
            .unwrap();
        repo.save_entity(EntityKind::Incidents, "inc-1", json!({"title": "Leak", "severity": "high"}))
            .await
            .unwrap();

        assert_eq!(repo.count_entities(EntityKind::Incidents).await.unwrap(), 1);
        assert_eq!(
            repo.get_entity(EntityKind::Incidents, "inc-1").await.unwrap(),
            Some(json!({"title": "Leak", "severity": "high"}))
        );
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let repo = repo();
        repo.save_entity(EntityKind::Audits, "x", json!(1)).await.unwrap();
        assert_eq!(repo.get_entity(EntityKind::Risks, "x").await.unwrap(), None);
        assert_eq!(repo.count_entities(EntityKind::Audits).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bulk_save_list_and_delete() {
        let repo = repo();
        let saved = repo
            .save_entities(
                EntityKind::Documents,
                vec![("d2", json!({"n": 2})), ("d1", json!({"n": 1}))],
            )
            .await
            .unwrap();
        assert_eq!(saved, 2);

        // 同一批次 updated_at 相同，按 id 排序
        let all = repo.get_all_entities(EntityKind::Documents).await.unwrap();
        assert_eq!(all, vec![json!({"n": 1}), json!({"n": 2})]);

        assert!(repo.delete_entity(EntityKind::Documents, "d1").await.unwrap());
        assert!(!repo.delete_entity(EntityKind::Documents, "d1").await.unwrap());
        assert_eq!(repo.clear_entities(EntityKind::Documents).await.unwrap(), 1);

        let empty: Vec<(String, serde_json::Value)> = Vec::new();
        assert_eq!(repo.save_entities(EntityKind::Documents, empty).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_local_mutation() {
        let store = Arc::new(DurableStore::in_memory());
        let repo = EntityRepository::new(store.clone());
        {
            let conn = store.open().await.unwrap();
            let conn = conn.lock().await;
            apply_local_mutation(&conn, SyncOperation::Create, EntityKind::Risks, "r1", &json!({"s": 1}))
                .unwrap();
        }
        assert!(repo.get_entity(EntityKind::Risks, "r1").await.unwrap().is_some());
        {
            let conn = store.open().await.unwrap();
            let conn = conn.lock().await;
            apply_local_mutation(&conn, SyncOperation::Delete, EntityKind::Risks, "r1", &json!(null))
                .unwrap();
        }
        assert!(repo.get_entity(EntityKind::Risks, "r1").await.unwrap().is_none());
    }
}
