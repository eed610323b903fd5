#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offline_sync_sdk::{
    DurableStore, NetworkMonitor, OfflineSyncConfig, QueueProcessor, RemoteApi, RemoteFailure,
    RetryPolicy, StatusNotifier, SyncItem, SyncOperation, SyncQueueManager,
};
use parking_lot::Mutex;

/// 按脚本返回结果的远端；脚本用完后一律成功
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Result<(), RemoteFailure>>>,
    calls: Mutex<Vec<(SyncOperation, String)>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Result<(), RemoteFailure>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// 已调用的 entity_id，按调用顺序
    pub fn called_entities(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn send(&self, item: &SyncItem) -> Result<(), RemoteFailure> {
        self.calls.lock().push((item.operation, item.entity_id.clone()));
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(()))
    }
}

pub fn transient(message: &str) -> Result<(), RemoteFailure> {
    Err(RemoteFailure::Transient(message.to_string()))
}

pub fn memory_config(start_online: bool) -> OfflineSyncConfig {
    OfflineSyncConfig::builder()
        .in_memory(true)
        .api_base_url("https://grc.example.com/api")
        .start_online(start_online)
        .build()
        .unwrap()
}

/// 不绑定自动 drain 的独立组件，用于逐次手动 drain
pub struct ManualQueue {
    pub queue: Arc<SyncQueueManager>,
    pub processor: QueueProcessor,
    pub network: Arc<NetworkMonitor>,
    pub notifier: Arc<StatusNotifier>,
}

pub fn manual_queue(online: bool, remote: Arc<dyn RemoteApi>) -> ManualQueue {
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
    ManualQueue {
        queue,
        processor,
        network,
        notifier,
    }
}

/// 轮询直到条件成立，超时则 panic
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
