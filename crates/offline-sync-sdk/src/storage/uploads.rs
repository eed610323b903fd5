//! 待上传二进制队列
//!
//! 生命周期与同步项类似，但不进入 QueueProcessor 的重试循环；
//! 出队后的传输由外部负责。

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::storage::dao::DaoFactory;
use crate::storage::entities::PendingUpload;
use crate::storage::store::DurableStore;

#[derive(Debug, Clone)]
pub struct UploadStore {
    store: Arc<DurableStore>,
}

impl UploadStore {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue_upload(&self, blob: Vec<u8>, metadata: serde_json::Value) -> Result<String> {
        let upload = PendingUpload {
            id: uuid::Uuid::new_v4().to_string(),
            blob,
            metadata,
            enqueued_at: Utc::now(),
        };
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::upload_dao(&conn).insert(&upload)?;
        info!("📦 待上传入队: id={}, size={} bytes", upload.id, upload.blob.len());
        Ok(upload.id)
    }

    pub async fn get_upload(&self, id: &str) -> Result<Option<PendingUpload>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::upload_dao(&conn).get(id)
    }

    /// FIFO 顺序
    pub async fn list_uploads(&self) -> Result<Vec<PendingUpload>> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::upload_dao(&conn).list()
    }

    pub async fn dequeue_upload(&self, id: &str) -> Result<bool> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::upload_dao(&conn).delete(id)
    }

    pub async fn count_uploads(&self) -> Result<usize> {
        let conn = self.store.open().await?;
        let conn = conn.lock().await;
        DaoFactory::upload_dao(&conn).count()
    }
}
