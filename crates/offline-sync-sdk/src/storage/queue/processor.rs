use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::events::{StatusNotifier, SyncEvent, SyncStatus};
use crate::network::NetworkMonitor;
use crate::remote::RemoteApi;
use crate::storage::entities::{SyncItem, SyncItemStatus};
use crate::storage::queue::retry_policy::{RetryDecision, RetryPolicy};
use crate::storage::queue::{DrainRequester, SyncQueueManager};

/// drain 被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSkip {
    /// 已有 drain 在进行中
    AlreadyRunning,
    /// 当前离线
    Offline,
}

/// 一次 drain 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub skipped: Option<DrainSkip>,
    pub attempted: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub exhausted: usize,
}

impl DrainReport {
    fn skipped(reason: DrainSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// 同一时刻最多一个 drain；drop 时释放（包括出错和 panic）
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 队列处理器 - 在线时按 FIFO 逐条把同步项投递到远端
#[derive(Clone)]
pub struct QueueProcessor {
    queue: Arc<SyncQueueManager>,
    remote: Arc<dyn RemoteApi>,
    network: Arc<NetworkMonitor>,
    notifier: Arc<StatusNotifier>,
    policy: RetryPolicy,
    processing: Arc<AtomicBool>,
    debug_logging: bool,
}

impl std::fmt::Debug for QueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProcessor")
            .field("policy", &self.policy)
            .field("processing", &self.is_processing())
            .field("debug_logging", &self.debug_logging)
            .finish()
    }
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<SyncQueueManager>,
        remote: Arc<dyn RemoteApi>,
        network: Arc<NetworkMonitor>,
        notifier: Arc<StatusNotifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            remote,
            network,
            notifier,
            policy,
            processing: Arc::new(AtomicBool::new(false)),
            debug_logging: false,
        }
    }

    /// 调试模式：逐条以 info 级别输出同步项载荷，每遍结束后输出队列统计
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    pub fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// 处理一遍队列。离线或已有 drain 在进行时直接返回，不改动队列也不发请求。
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> Result<DrainReport> {
        if !self.network.is_online() {
            debug!("离线中，跳过队列处理");
            return Ok(DrainReport::skipped(DrainSkip::Offline));
        }
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("已有 drain 在进行中，跳过");
            return Ok(DrainReport::skipped(DrainSkip::AlreadyRunning));
        };

        info!("🔄 开始处理同步队列");
        self.notifier.publish(SyncStatus::Syncing);

        match self.drain().await {
            Ok(report) => {
                info!(
                    "✅ 同步队列处理完成: attempted={}, succeeded={}, retried={}, exhausted={}, dead_lettered={}",
                    report.attempted,
                    report.succeeded,
                    report.retried,
                    report.exhausted,
                    report.dead_lettered
                );
                self.notifier.publish(SyncStatus::Synced);
                if self.debug_logging {
                    self.log_queue_stats().await;
                }
                Ok(report)
            }
            Err(e) => {
                error!("❌ 同步队列处理失败: {}", e);
                self.notifier.publish(SyncStatus::Error);
                Err(e)
            }
        }
    }

    async fn log_queue_stats(&self) {
        match self.queue.stats().await {
            Ok(stats) => info!(
                "🔍 队列统计: total={}, pending={}, exhausted={}, dead_letters={}",
                stats.total, stats.pending, stats.exhausted, stats.dead_letters
            ),
            Err(e) => warn!("⚠️ 读取队列统计失败: {}", e),
        }
    }

    async fn drain(&self) -> Result<DrainReport> {
        let items = self.queue.list().await?;
        let mut report = DrainReport::default();

        // 严格串行：同一遍中后面的项不会先于前面的项完成
        for item in items {
            report.attempted += 1;
            let id = item.id.clone();
            if let Err(e) = self.process_item(item, &mut report).await {
                error!("❌ 处理同步项 {} 时本地存储失败: {}", id, e);
            }
        }
        Ok(report)
    }

    async fn process_item(&self, mut item: SyncItem, report: &mut DrainReport) -> Result<()> {
        if self.debug_logging {
            info!(
                "🔍 投递同步项: id={}, {} {}/{}, retry_count={}, data={}",
                item.id, item.operation, item.entity_type, item.entity_id, item.retry_count, item.data
            );
        }
        debug!(
            "处理同步项: id={}, {} {}/{}, retry_count={}",
            item.id, item.operation, item.entity_type, item.entity_id, item.retry_count
        );

        let failure = match self.remote.send(&item).await {
            Ok(()) => {
                self.queue.dequeue(&item.id).await?;
                report.succeeded += 1;
                info!("✅ 同步成功: {} {}/{}", item.operation, item.entity_type, item.entity_id);
                self.notifier.emit(SyncEvent::ItemSynced {
                    id: item.id,
                    entity_type: item.entity_type.to_string(),
                    entity_id: item.entity_id,
                });
                return Ok(());
            }
            Err(failure) => failure,
        };

        item.record_failure(failure.to_string());
        let error_message = failure.to_string();

        match self.policy.decide(item.retry_count, &failure) {
            RetryDecision::Retry => {
                self.queue.update(&item).await?;
                report.retried += 1;
                warn!(
                    "⚠️ 同步失败，等待下次重试: id={}, retry_count={}, error={}",
                    item.id, item.retry_count, error_message
                );
                self.notifier.emit(SyncEvent::ItemFailed {
                    id: item.id,
                    retry_count: item.retry_count,
                    error: error_message,
                });
            }
            RetryDecision::Exhausted => {
                let newly_exhausted = item.status != SyncItemStatus::Exhausted;
                item.status = SyncItemStatus::Exhausted;
                self.queue.update(&item).await?;
                report.exhausted += 1;

                if newly_exhausted {
                    warn!(
                        "🚨 同步项重试次数已达上限 ({}), 需要人工处理: id={}, {}/{}, error={}",
                        self.policy.max_retries, item.id, item.entity_type, item.entity_id, error_message
                    );
                    self.notifier.emit(SyncEvent::ItemExhausted {
                        id: item.id.clone(),
                        retry_count: item.retry_count,
                        last_error: item.last_error.clone(),
                    });
                } else {
                    debug!("已耗尽的同步项再次失败: id={}, retry_count={}", item.id, item.retry_count);
                }
                self.notifier.emit(SyncEvent::ItemFailed {
                    id: item.id,
                    retry_count: item.retry_count,
                    error: error_message,
                });
            }
            RetryDecision::DeadLetter => {
                self.queue.move_to_dead_letter(&item).await?;
                report.dead_lettered += 1;
                warn!(
                    "☠️ 永久失败，不再重试: id={}, status={:?}, error={}",
                    item.id,
                    failure.status(),
                    failure.message()
                );
                self.notifier.emit(SyncEvent::ItemDeadLettered {
                    id: item.id,
                    status: failure.status(),
                    error: error_message,
                });
            }
        }
        Ok(())
    }

    /// 在后台任务中处理队列，不等待结果；没有 tokio 运行时时返回 None
    pub fn spawn_drain(&self) -> Option<JoinHandle<()>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("⚠️ 当前不在 tokio 运行时中，无法触发队列处理");
            return None;
        };

        let processor = self.clone();
        Some(handle.spawn(async move {
            match processor.process_queue().await {
                Ok(report) if report.was_skipped() => {
                    debug!("drain 请求被跳过: {:?}", report.skipped);
                }
                Ok(_) => {}
                Err(e) => error!("❌ 后台队列处理失败: {}", e),
            }
        }))
    }
}

impl DrainRequester for QueueProcessor {
    fn request_drain(&self) {
        let _ = self.spawn_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entities::SyncOperation;
    use crate::storage::entity_kind::EntityKind;
    use crate::storage::queue::RemoteFailure;
    use crate::storage::store::DurableStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// 按脚本返回结果的远端；脚本用完后一律成功
    #[derive(Default)]
    struct ScriptedRemote {
        script: parking_lot::Mutex<VecDeque<std::result::Result<(), RemoteFailure>>>,
        calls: parking_lot::Mutex<Vec<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedRemote {
        fn with_script(script: Vec<std::result::Result<(), RemoteFailure>>) -> Self {
            Self {
                script: parking_lot::Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteApi for ScriptedRemote {
        async fn send(&self, item: &SyncItem) -> std::result::Result<(), RemoteFailure> {
            self.calls.lock().push(item.entity_id.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.script.lock().pop_front();
            next.unwrap_or(Ok(()))
        }
    }

    struct Harness {
        queue: Arc<SyncQueueManager>,
        processor: QueueProcessor,
        network: Arc<NetworkMonitor>,
        notifier: Arc<StatusNotifier>,
    }

    fn harness(online: bool, remote: Arc<ScriptedRemote>) -> Harness {
        let network = Arc::new(NetworkMonitor::new(online));
        let notifier = Arc::new(StatusNotifier::new(64));
        let queue = Arc::new(SyncQueueManager::new(
            Arc::new(DurableStore::in_memory()),
            network.clone(),
            notifier.clone(),
        ));
        let processor = QueueProcessor::new(
            queue.clone(),
            remote,
            network.clone(),
            notifier.clone(),
            RetryPolicy::default(),
        );
        Harness {
            queue,
            processor,
            network,
            notifier,
        }
    }

    fn transient() -> std::result::Result<(), RemoteFailure> {
        Err(RemoteFailure::Transient("HTTP 503: unavailable".into()))
    }

    #[tokio::test]
    async fn test_offline_drain_is_skipped() {
        let remote = Arc::new(ScriptedRemote::default());
        let h = harness(false, remote.clone());
        h.queue
            .enqueue(SyncOperation::Create, EntityKind::Incidents, "i1", json!({}))
            .await
            .unwrap();

        let report = h.processor.process_queue().await.unwrap();
        assert_eq!(report.skipped, Some(DrainSkip::Offline));
        assert!(remote.calls().is_empty());
        assert_eq!(h.queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_in_fifo_order_and_status_transitions() {
        let remote = Arc::new(ScriptedRemote::default());
        let h = harness(false, remote.clone());
        for id in ["a", "b", "c"] {
            h.queue
                .enqueue(SyncOperation::Update, EntityKind::Audits, id, json!({"id": id}))
                .await
                .unwrap();
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            h.notifier.subscribe(move |status| seen.lock().push(status))
        };

        h.network.set_online(true);
        let report = h.processor.process_queue().await.unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(remote.calls(), vec!["a", "b", "c"]);
        assert_eq!(h.queue.count().await.unwrap(), 0);
        assert_eq!(*seen.lock(), vec![SyncStatus::Syncing, SyncStatus::Synced]);
    }

    #[tokio::test]
    async fn test_failure_isolated_per_item() {
        let remote = Arc::new(ScriptedRemote::with_script(vec![transient(), Ok(())]));
        let h = harness(true, remote.clone());
        let first = h
            .queue
            .enqueue(SyncOperation::Create, EntityKind::Risks, "r1", json!({}))
            .await
            .unwrap();
        h.queue
            .enqueue(SyncOperation::Create, EntityKind::Risks, "r2", json!({}))
            .await
            .unwrap();

        let report = h.processor.process_queue().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.succeeded, 1);

        let remaining = h.queue.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, first);
        assert_eq!(remaining[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_exhausted_item_stays_queued() {
        let remote = Arc::new(ScriptedRemote::with_script(vec![
            transient(),
            transient(),
            transient(),
            transient(),
        ]));
        let h = harness(true, remote.clone());
        let mut events = h.notifier.subscribe_events();
        let id = h
            .queue
            .enqueue(SyncOperation::Update, EntityKind::Documents, "d1", json!({}))
            .await
            .unwrap();

        for _ in 0..4 {
            h.processor.process_queue().await.unwrap();
        }

        let item = h.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(item.retry_count, 4);
        assert_eq!(item.status, SyncItemStatus::Exhausted);
        assert_eq!(remote.calls().len(), 4);

        let mut exhausted_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::ItemExhausted { .. }) {
                exhausted_events += 1;
            }
        }
        assert_eq!(exhausted_events, 1);

        // 耗尽后仍会被尝试，成功即出队
        h.processor.process_queue().await.unwrap();
        assert_eq!(h.queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_goes_to_dead_letter() {
        let remote = Arc::new(ScriptedRemote::with_script(vec![Err(RemoteFailure::Permanent {
            status: Some(422),
            message: "title is required".into(),
        })]));
        let h = harness(true, remote.clone());
        let id = h
            .queue
            .enqueue(SyncOperation::Create, EntityKind::Incidents, "i1", json!({}))
            .await
            .unwrap();

        let report = h.processor.process_queue().await.unwrap();
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(h.queue.count().await.unwrap(), 0);

        let letters = h.queue.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].item.id, id);
        assert_eq!(letters[0].item.retry_count, 1);
        assert!(letters[0].item.last_error.as_deref().unwrap().contains("422"));

        // 不再重试
        h.processor.process_queue().await.unwrap();
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_publishes_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let network = Arc::new(NetworkMonitor::new(true));
        let notifier = Arc::new(StatusNotifier::new(16));
        // 路径是目录，无法打开数据库
        let queue = Arc::new(SyncQueueManager::new(
            Arc::new(DurableStore::with_path(temp_dir.path())),
            network.clone(),
            notifier.clone(),
        ));
        let remote = Arc::new(ScriptedRemote::default());
        let processor = QueueProcessor::new(
            queue,
            remote.clone(),
            network,
            notifier.clone(),
            RetryPolicy::default(),
        );

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            notifier.subscribe(move |status| seen.lock().push(status))
        };

        let err = processor.process_queue().await.unwrap_err();
        assert!(err.is_storage_error());
        assert_eq!(*seen.lock(), vec![SyncStatus::Syncing, SyncStatus::Error]);
        assert_eq!(notifier.current(), Some(SyncStatus::Error));
        assert!(remote.calls().is_empty());
        assert!(!processor.is_processing());
    }

    #[tokio::test]
    async fn test_debug_logging_does_not_change_drain() {
        let remote = Arc::new(ScriptedRemote::with_script(vec![transient()]));
        let h = harness(true, remote.clone());
        let processor = h.processor.clone().with_debug_logging(true);
        assert!(processor.debug_logging());
        assert!(!h.processor.debug_logging());

        for id in ["x1", "x2"] {
            h.queue
                .enqueue(SyncOperation::Update, EntityKind::Risks, id, json!({"score": 3}))
                .await
                .unwrap();
        }

        let report = processor.process_queue().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.queue.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_noop() {
        let gate = Arc::new(Notify::new());
        let remote = Arc::new(ScriptedRemote {
            gate: Some(gate.clone()),
            ..ScriptedRemote::default()
        });
        let h = harness(true, remote.clone());
        h.queue
            .enqueue(SyncOperation::Create, EntityKind::Incidents, "i1", json!({}))
            .await
            .unwrap();

        let first = {
            let processor = h.processor.clone();
            tokio::spawn(async move { processor.process_queue().await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while remote.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(h.processor.is_processing());

        let second = h.processor.process_queue().await.unwrap();
        assert_eq!(second.skipped, Some(DrainSkip::AlreadyRunning));
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(h.queue.list().await.unwrap()[0].retry_count, 0);

        gate.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(!h.processor.is_processing());
    }
}
