//! 同步队列 - 待投递的变更记录
//!
//! 全局 FIFO（按 enqueued_at、插入顺序），没有按实体的锁；
//! 同一实体的两次变更按入队顺序处理，只是因为整个队列是 FIFO 的。

use std::sync::{Arc, OnceLock, Weak};

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::error::{OfflineSyncError, Result};
use crate::events::{StatusNotifier, SyncEvent};
use crate::network::NetworkMonitor;
use crate::storage::dao::DaoFactory;
use crate::storage::entities::{DeadLetter, SyncItem, SyncItemStatus, SyncOperation};
use crate::storage::entity_kind::EntityKind;
use crate::storage::repository::apply_local_mutation;
use crate::storage::store::DurableStore;

pub mod processor;
pub mod retry_policy;

pub use processor::{DrainReport, DrainSkip, QueueProcessor};
pub use retry_policy::{RemoteFailure, RetryDecision, RetryPolicy};

/// 入队后触发 drain 的接收方（由 QueueProcessor 实现）
pub trait DrainRequester: Send + Sync {
    /// 异步触发一次 drain，不等待完成
    fn request_drain(&self);
}

/// 队列统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub exhausted: usize,
    pub dead_letters: usize,
}

pub struct SyncQueueManager {
    store: Arc<DurableStore>,
    network: Arc<NetworkMonitor>,
    notifier: Arc<StatusNotifier>,
    drain_requester: OnceLock<Weak<dyn DrainRequester>>,
}

impl std::fmt::Debug for SyncQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueueManager")
            .field("store", &self.store)
            .field("online", &self.network.is_online())
            .finish()
    }
}

impl SyncQueueManager {
    pub fn new(
        store: Arc<DurableStore>,
        network: Arc<NetworkMonitor>,
        notifier: Arc<StatusNotifier>,
    ) -> Self {
        Self {
            store,
            network,
            notifier,
            drain_requester: OnceLock::new(),
        }
    }

    /// 绑定 drain 触发方，只能绑定一次
    pub fn bind_drain_requester(&self, requester: Weak<dyn DrainRequester>) -> Result<()> {
        self.drain_requester
            .set(requester)
            .map_err(|_| OfflineSyncError::Runtime("drain requester 已绑定".to_string()))
    }

    /// 入队一个变更；在线时异步触发 drain（调用方不等待）
    #[instrument(skip(self, data))]
    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        entity_type: EntityKind,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<String> {
        let item = SyncItem::new(operation, entity_type, entity_id, data);
        let pending = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            let dao = DaoFactory::sync_queue_dao(&conn);
            dao.insert(&item)?;
            dao.count()?
        };

        info!(
            "📥 入队: id={}, {} {}/{}",
            item.id, item.operation, item.entity_type, item.entity_id
        );
        self.after_enqueue(pending);
        Ok(item.id)
    }

    /// 本地镜像写入 + 入队放在同一个本地事务中
    #[instrument(skip(self, data))]
    pub async fn enqueue_with_local_write(
        &self,
        operation: SyncOperation,
        entity_type: EntityKind,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<String> {
        let item = SyncItem::new(operation, entity_type, entity_id, data);
        let pending = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            let tx = conn.unchecked_transaction()?;
            apply_local_mutation(&tx, operation, entity_type, entity_id, &item.data)?;
            let dao = DaoFactory::sync_queue_dao(&tx);
            dao.insert(&item)?;
            let pending = dao.count()?;
            tx.commit()?;
            pending
        };

        info!(
            "📥 本地写入并入队: id={}, {} {}/{}",
            item.id, item.operation, item.entity_type, item.entity_id
        );
        self.after_enqueue(pending);
        Ok(item.id)
    }

    fn after_enqueue(&self, pending: usize) {
        self.notifier.emit(SyncEvent::QueueChanged { pending });
        if self.network.is_online() {
            self.request_drain();
        } else {
            debug!("离线中，等待网络恢复后再处理队列");
        }
    }

    pub(crate) fn request_drain(&self) {
        match self.drain_requester.get().and_then(Weak::upgrade) {
            Some(requester) => requester.request_drain(),
            None => debug!("未绑定 drain 触发方，跳过"),
        }
    }

    /// 删除同步项（远端确认成功后由 processor 调用）
    pub async fn dequeue(&self, id: &str) -> Result<bool> {
        let (removed, pending) = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            let dao = DaoFactory::sync_queue_dao(&conn);
            (dao.delete(id)?, dao.count()?)
        };
        if removed {
            debug!("出队: {}", id);
            self.notifier.emit(SyncEvent::QueueChanged { pending });
        }
        Ok(removed)
    }

    pub async fn get(&self, id: &str) -> Result<Option<SyncItem>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).get(id)
    }

    /// 按 enqueued_at 升序，即 FIFO 处理顺序
    pub async fn list(&self) -> Result<Vec<SyncItem>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).list()
    }

    pub async fn list_for_entity(&self, kind: EntityKind, entity_id: &str) -> Result<Vec<SyncItem>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).list_for_entity(kind, entity_id)
    }

    pub async fn list_by_status(&self, status: SyncItemStatus) -> Result<Vec<SyncItem>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).list_by_status(status)
    }

    /// 已达到重试上限的同步项
    pub async fn exhausted(&self) -> Result<Vec<SyncItem>> {
        self.list_by_status(SyncItemStatus::Exhausted).await
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).count()
    }

    /// 失败后回写 retry_count / last_error / status
    pub async fn update(&self, item: &SyncItem) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::sync_queue_dao(&conn).update_retry_state(item)
    }

    pub async fn clear(&self) -> Result<usize> {
        let removed = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            DaoFactory::sync_queue_dao(&conn).clear()?
        };
        info!("🗑️ 已清空同步队列，共 {} 条", removed);
        self.notifier.emit(SyncEvent::QueueChanged { pending: 0 });
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let queue = DaoFactory::sync_queue_dao(&conn);
        let exhausted = queue.list_by_status(SyncItemStatus::Exhausted)?.len();
        let total = queue.count()?;
        Ok(QueueStats {
            total,
            pending: total.saturating_sub(exhausted),
            exhausted,
            dead_letters: DaoFactory::dead_letter_dao(&conn).count()?,
        })
    }

    /// 在一个本地事务中把同步项从队列移入死信
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub async fn move_to_dead_letter(&self, item: &SyncItem) -> Result<DeadLetter> {
        let letter = DeadLetter {
            item: item.clone(),
            failed_at: Utc::now(),
        };
        let pending = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            let tx = conn.unchecked_transaction()?;
            DaoFactory::dead_letter_dao(&tx).insert(&letter)?;
            let queue = DaoFactory::sync_queue_dao(&tx);
            queue.delete(&item.id)?;
            let pending = queue.count()?;
            tx.commit()?;
            pending
        };

        info!(
            "☠️ 已移入死信: id={}, {}/{}, error={:?}",
            item.id, item.entity_type, item.entity_id, item.last_error
        );
        self.notifier.emit(SyncEvent::QueueChanged { pending });
        Ok(letter)
    }

    /// 按 id 把队列中的同步项移入死信（人工处理）
    pub async fn dead_letter_sync_item(&self, id: &str) -> Result<Option<DeadLetter>> {
        match self.get(id).await? {
            Some(item) => Ok(Some(self.move_to_dead_letter(&item).await?)),
            None => Ok(None),
        }
    }

    /// 按 failed_at 升序
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::dead_letter_dao(&conn).list()
    }

    pub async fn dead_letter_count(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::dead_letter_dao(&conn).count()
    }

    /// 死信重新入队：保留 id，重置 retry_count 和 enqueued_at
    pub async fn requeue_dead_letter(&self, id: &str) -> Result<Option<SyncItem>> {
        let requeued = {
            let conn = self.store.open().await?;
            let conn = conn.lock().await;
            let tx = conn.unchecked_transaction()?;
            let letters = DaoFactory::dead_letter_dao(&tx);
            let Some(letter) = letters.get(id)? else {
                return Ok(None);
            };
            let item = SyncItem {
                enqueued_at: Utc::now(),
                retry_count: 0,
                last_error: None,
                status: SyncItemStatus::Pending,
                ..letter.item
            };
            letters.delete(id)?;
            let queue = DaoFactory::sync_queue_dao(&tx);
            queue.insert(&item)?;
            let pending = queue.count()?;
            tx.commit()?;
            (item, pending)
        };

        let (item, pending) = requeued;
        info!("♻️ 死信重新入队: {}", item.id);
        self.after_enqueue(pending);
        Ok(Some(item))
    }

    pub async fn purge_dead_letter(&self, id: &str) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        let removed = DaoFactory::dead_letter_dao(&conn).delete(id)?;
        if removed {
            info!("🗑️ 已删除死信: {}", id);
        } else {
            debug!("死信不存在: {}", id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(online: bool) -> SyncQueueManager {
        SyncQueueManager::new(
            Arc::new(DurableStore::in_memory()),
            Arc::new(NetworkMonitor::new(online)),
            Arc::new(StatusNotifier::new(16)),
        )
    }

    #[derive(Default)]
    struct CountingRequester {
        calls: AtomicUsize,
    }

    impl DrainRequester for CountingRequester {
        fn request_drain(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_enqueue_list_fifo() {
        let queue = manager(false);
        let a = queue
            .enqueue(SyncOperation::Create, EntityKind::Incidents, "i1", json!({"n": 1}))
            .await
            .unwrap();
        let b = queue
            .enqueue(SyncOperation::Update, EntityKind::Incidents, "i1", json!({"n": 2}))
            .await
            .unwrap();
        let c = queue
            .enqueue(SyncOperation::Delete, EntityKind::Risks, "r1", json!(null))
            .await
            .unwrap();

        let ids: Vec<String> = queue.list().await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.clone(), b.clone(), c]);
        assert_eq!(queue.count().await.unwrap(), 3);

        let for_entity = queue.list_for_entity(EntityKind::Incidents, "i1").await.unwrap();
        assert_eq!(for_entity.len(), 2);
        assert_eq!(for_entity[0].id, a);

        assert!(queue.dequeue(&b).await.unwrap());
        assert!(!queue.dequeue(&b).await.unwrap());
        assert_eq!(queue.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_requests_drain_only_when_online() {
        let requester = Arc::new(CountingRequester::default());
        let weak: Weak<dyn DrainRequester> = Arc::downgrade(&requester) as Weak<dyn DrainRequester>;

        let offline = manager(false);
        offline.bind_drain_requester(weak.clone()).unwrap();
        offline
            .enqueue(SyncOperation::Create, EntityKind::Audits, "a1", json!({}))
            .await
            .unwrap();
        assert_eq!(requester.calls.load(Ordering::SeqCst), 0);

        let online = manager(true);
        online.bind_drain_requester(weak.clone()).unwrap();
        assert!(online.bind_drain_requester(weak).is_err());
        online
            .enqueue(SyncOperation::Create, EntityKind::Audits, "a1", json!({}))
            .await
            .unwrap();
        assert_eq!(requester.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_persists_retry_state() {
        let queue = manager(false);
        let id = queue
            .enqueue(SyncOperation::Update, EntityKind::Documents, "d1", json!({"v": 1}))
            .await
            .unwrap();

        let mut item = queue.get(&id).await.unwrap().unwrap();
        item.record_failure("HTTP 503");
        item.status = SyncItemStatus::Exhausted;
        assert!(queue.update(&item).await.unwrap());

        let stored = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 503"));
        assert_eq!(queue.exhausted().await.unwrap().len(), 1);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats, QueueStats { total: 1, pending: 0, exhausted: 1, dead_letters: 0 });
    }

    #[tokio::test]
    async fn test_dead_letter_lifecycle() {
        let queue = manager(false);
        let id = queue
            .enqueue(SyncOperation::Create, EntityKind::ComplianceItems, "c1", json!({"x": 1}))
            .await
            .unwrap();

        let letter = queue.dead_letter_sync_item(&id).await.unwrap().unwrap();
        assert_eq!(letter.item.id, id);
        assert_eq!(queue.count().await.unwrap(), 0);
        assert_eq!(queue.dead_letter_count().await.unwrap(), 1);

        let requeued = queue.requeue_dead_letter(&id).await.unwrap().unwrap();
        assert_eq!(requeued.retry_count, 0);
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(queue.dead_letter_count().await.unwrap(), 0);
        assert!(queue.requeue_dead_letter(&id).await.unwrap().is_none());

        queue.dead_letter_sync_item(&id).await.unwrap();
        assert!(queue.purge_dead_letter(&id).await.unwrap());
        assert!(queue.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_with_local_write_is_atomic() {
        let store = Arc::new(DurableStore::in_memory());
        let queue = SyncQueueManager::new(
            store.clone(),
            Arc::new(NetworkMonitor::new(false)),
            Arc::new(StatusNotifier::new(16)),
        );
        let repo = crate::storage::EntityRepository::new(store);

        queue
            .enqueue_with_local_write(SyncOperation::Create, EntityKind::Risks, "r9", json!({"score": 3}))
            .await
            .unwrap();
        assert_eq!(repo.get_entity(EntityKind::Risks, "r9").await.unwrap(), Some(json!({"score": 3})));
        assert_eq!(queue.count().await.unwrap(), 1);

        queue
            .enqueue_with_local_write(SyncOperation::Delete, EntityKind::Risks, "r9", json!(null))
            .await
            .unwrap();
        assert_eq!(repo.get_entity(EntityKind::Risks, "r9").await.unwrap(), None);
        assert_eq!(queue.count().await.unwrap(), 2);
    }
}
