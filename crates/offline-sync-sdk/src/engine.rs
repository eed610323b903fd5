//! 离线同步引擎 - 面向应用层的统一入口
//!
//! 一个引擎实例拥有自己的存储连接、在线标志和 drain 重入标志，
//! 同一进程中的多个实例互不干扰。

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OfflineSyncConfig;
use crate::error::Result;
use crate::events::{StatusNotifier, Subscription, SyncEvent, SyncStatus};
use crate::network::{NetworkMonitor, NetworkStatusListener};
use crate::remote::{HttpRemoteApi, RemoteApi, TokenProvider};
use crate::storage::queue::{
    DrainReport, DrainRequester, QueueProcessor, QueueStats, RetryPolicy, SyncQueueManager,
};
use crate::storage::{
    CacheLayer, DeadLetter, DurableStore, EntityKind, EntityRecord, EntityRepository,
    SettingsStore, SyncItem, SyncOperation, UploadStore,
};

pub struct OfflineSyncEngine {
    config: OfflineSyncConfig,
    store: Arc<DurableStore>,
    network: Arc<NetworkMonitor>,
    notifier: Arc<StatusNotifier>,
    queue: Arc<SyncQueueManager>,
    processor: Arc<QueueProcessor>,
    cache: CacheLayer,
    repository: EntityRepository,
    settings: SettingsStore,
    uploads: UploadStore,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    listener: Mutex<Option<Arc<dyn NetworkStatusListener>>>,
}

impl std::fmt::Debug for OfflineSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSyncEngine")
            .field("store", &self.store)
            .field("online", &self.network.is_online())
            .field("processor", &self.processor)
            .finish()
    }
}

impl OfflineSyncEngine {
    /// 创建并初始化引擎
    ///
    /// 存储在这里打开：打开失败时整个引擎不可用，直接把错误返回给调用方。
    /// `listener` 为平台网络监听器；不提供时通过 [`set_online_status`](Self::set_online_status) 推送网络状态。
    pub async fn initialize(
        config: OfflineSyncConfig,
        remote: Arc<dyn RemoteApi>,
        listener: Option<Arc<dyn NetworkStatusListener>>,
    ) -> Result<Self> {
        config.validate()?;
        info!("🚀 初始化离线同步引擎 {}", crate::version::version_line());

        let store = Arc::new(DurableStore::new(&config));
        store.open().await?;

        let network = Arc::new(NetworkMonitor::new(config.start_online));
        let notifier = Arc::new(StatusNotifier::new(config.event_config.buffer_size));
        let queue = Arc::new(SyncQueueManager::new(
            store.clone(),
            network.clone(),
            notifier.clone(),
        ));
        let processor = Arc::new(
            QueueProcessor::new(
                queue.clone(),
                remote,
                network.clone(),
                notifier.clone(),
                RetryPolicy::from(&config.retry_config),
            )
            .with_debug_logging(config.debug_mode),
        );
        let requester: Weak<dyn DrainRequester> = Arc::downgrade(&processor) as Weak<dyn DrainRequester>;
        queue.bind_drain_requester(requester)?;

        let engine = Self {
            cache: CacheLayer::new(store.clone()),
            repository: EntityRepository::new(store.clone()),
            settings: SettingsStore::new(store.clone()),
            uploads: UploadStore::new(store.clone()),
            config,
            store,
            network,
            notifier,
            queue,
            processor,
            tasks: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
        };

        // 先订阅再接入平台监听器，避免漏掉第一次状态变化
        let connectivity = engine.spawn_connectivity_task();
        engine.tasks.lock().push(connectivity);

        if let Some(listener) = listener {
            let handle = engine.network.start(listener.clone()).await?;
            engine.tasks.lock().push(handle);
            *engine.listener.lock() = Some(listener);
        }

        let online = engine.network.is_online();
        engine.notifier.publish(if online {
            SyncStatus::Online
        } else {
            SyncStatus::Offline
        });
        if online {
            // 上次会话遗留的同步项
            engine.processor.request_drain();
        }

        info!("✅ 离线同步引擎初始化完成 (online={})", online);
        Ok(engine)
    }

    /// 不接平台监听器
    pub async fn with_remote(config: OfflineSyncConfig, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        Self::initialize(config, remote, None).await
    }

    /// 使用内置的 HTTP 远端实现
    pub async fn with_http(
        config: OfflineSyncConfig,
        tokens: Arc<dyn TokenProvider>,
        listener: Option<Arc<dyn NetworkStatusListener>>,
    ) -> Result<Self> {
        let remote = HttpRemoteApi::new(&config.api_base_url, &config.http_client_config, tokens)?;
        Self::initialize(config, Arc::new(remote), listener).await
    }

    /// 上线：发布 Online 并立即触发 drain；下线：发布 Offline
    fn spawn_connectivity_task(&self) -> JoinHandle<()> {
        let mut changes = self.network.subscribe();
        let notifier = self.notifier.clone();
        let processor = self.processor.clone();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.online => {
                        notifier.publish(SyncStatus::Online);
                        processor.request_drain();
                    }
                    Ok(_) => notifier.publish(SyncStatus::Offline),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("⚠️ 连通性事件积压，跳过 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("连通性任务退出");
        })
    }

    pub fn config(&self) -> &OfflineSyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    // ========== 同步队列 ==========

    /// 入队一个变更（不写本地镜像）；在线时异步触发 drain
    pub async fn enqueue(
        &self,
        operation: SyncOperation,
        kind: EntityKind,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<String> {
        self.queue.enqueue(operation, kind, entity_id, data).await
    }

    /// 乐观写入本地镜像并入队，两步在同一个本地事务中
    pub async fn mutate(
        &self,
        operation: SyncOperation,
        kind: EntityKind,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<String> {
        self.queue
            .enqueue_with_local_write(operation, kind, entity_id, data)
            .await
    }

    pub async fn get_sync_queue_count(&self) -> Result<usize> {
        self.queue.count().await
    }

    pub async fn sync_queue(&self) -> Result<Vec<SyncItem>> {
        self.queue.list().await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.queue.stats().await
    }

    /// 立即处理一遍队列并等待结果
    pub async fn process_queue(&self) -> Result<DrainReport> {
        self.processor.process_queue().await
    }

    pub fn is_processing(&self) -> bool {
        self.processor.is_processing()
    }

    pub async fn exhausted_items(&self) -> Result<Vec<SyncItem>> {
        self.queue.exhausted().await
    }

    /// 人工删除队列中的同步项
    pub async fn purge_sync_item(&self, id: &str) -> Result<bool> {
        let removed = self.queue.dequeue(id).await?;
        if removed {
            info!("🗑️ 已人工删除同步项: {}", id);
        }
        Ok(removed)
    }

    pub async fn dead_letter_sync_item(&self, id: &str) -> Result<Option<DeadLetter>> {
        self.queue.dead_letter_sync_item(id).await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.queue.dead_letters().await
    }

    pub async fn dead_letter_count(&self) -> Result<usize> {
        self.queue.dead_letter_count().await
    }

    pub async fn requeue_dead_letter(&self, id: &str) -> Result<Option<SyncItem>> {
        self.queue.requeue_dead_letter(id).await
    }

    pub async fn purge_dead_letter(&self, id: &str) -> Result<bool> {
        self.queue.purge_dead_letter(id).await
    }

    // ========== 缓存 ==========

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub async fn cache_get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.cache.get(key).await
    }

    pub async fn cache_get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.cache.get_as(key).await
    }

    /// 尽力而为，存储失败只记日志
    pub async fn cache_set(&self, key: &str, data: serde_json::Value, ttl: Option<Duration>) {
        self.cache.set(key, data, ttl).await
    }

    pub async fn cache_delete(&self, key: &str) -> Result<bool> {
        self.cache.delete(key).await
    }

    pub async fn cache_clear(&self) -> Result<usize> {
        self.cache.clear().await
    }

    pub async fn cache_purge_expired(&self) -> Result<usize> {
        self.cache.purge_expired().await
    }

    // ========== 实体镜像 ==========

    pub async fn save_entity(
        &self,
        kind: EntityKind,
        id: &str,
        data: serde_json::Value,
    ) -> Result<EntityRecord> {
        self.repository.save_entity(kind, id, data).await
    }

    pub async fn save_entities<I, S>(&self, kind: EntityKind, items: I) -> Result<usize>
    where
        I: IntoIterator<Item = (S, serde_json::Value)>,
        S: Into<String>,
    {
        self.repository.save_entities(kind, items).await
    }

    pub async fn get_entity(&self, kind: EntityKind, id: &str) -> Result<Option<serde_json::Value>> {
        self.repository.get_entity(kind, id).await
    }

    pub async fn get_all_entities(&self, kind: EntityKind) -> Result<Vec<serde_json::Value>> {
        self.repository.get_all_entities(kind).await
    }

    pub async fn delete_entity(&self, kind: EntityKind, id: &str) -> Result<bool> {
        self.repository.delete_entity(kind, id).await
    }

    pub fn repository(&self) -> &EntityRepository {
        &self.repository
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    // ========== 状态 ==========

    /// 注册状态回调；返回的 [`Subscription`] 被 drop 时注销
    pub fn on_sync_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.notifier.subscribe_events()
    }

    pub fn current_sync_status(&self) -> Option<SyncStatus> {
        self.notifier.current()
    }

    pub fn get_online_status(&self) -> bool {
        self.network.is_online()
    }

    /// 平台网络信号入口；返回状态是否发生了变化
    pub fn set_online_status(&self, online: bool) -> bool {
        self.network.set_online(online)
    }

    /// 停止后台任务（连通性监听、平台监听），并通知平台监听器停止监听
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop_monitoring().await;
        }

        if !tasks.is_empty() {
            info!("🛑 离线同步引擎已停止 ({} 个后台任务)", tasks.len());
        }
    }
}

impl Drop for OfflineSyncEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
