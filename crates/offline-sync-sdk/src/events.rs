//! 事件系统模块 - 同步状态通知
//!
//! 两条通道：
//! - `StatusNotifier::subscribe`：同步回调，按注册顺序调用，单个回调 panic 不影响其他回调
//! - `StatusNotifier::subscribe_events`：`tokio::sync::broadcast` 事件流，面向异步消费者

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// 聚合同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Online,
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 广播事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    StatusChanged {
        status: SyncStatus,
        timestamp: DateTime<Utc>,
    },
    /// 远端确认成功，已出队
    ItemSynced {
        id: String,
        entity_type: String,
        entity_id: String,
    },
    /// 可重试失败，已回写 retry_count
    ItemFailed {
        id: String,
        retry_count: u32,
        error: String,
    },
    /// 重试次数达到上限
    ItemExhausted {
        id: String,
        retry_count: u32,
        last_error: Option<String>,
    },
    /// 永久失败，已移入死信
    ItemDeadLettered {
        id: String,
        status: Option<u16>,
        error: String,
    },
    QueueChanged {
        pending: usize,
    },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::StatusChanged { .. } => "status_changed",
            SyncEvent::ItemSynced { .. } => "item_synced",
            SyncEvent::ItemFailed { .. } => "item_failed",
            SyncEvent::ItemExhausted { .. } => "item_exhausted",
            SyncEvent::ItemDeadLettered { .. } => "item_dead_lettered",
            SyncEvent::QueueChanged { .. } => "queue_changed",
        }
    }
}

/// 状态回调
pub type StatusCallback = Arc<dyn Fn(SyncStatus) + Send + Sync>;

type SubscriberList = Mutex<Vec<(u64, StatusCallback)>>;

/// 状态通知器
pub struct StatusNotifier {
    subscribers: Arc<SubscriberList>,
    next_id: AtomicU64,
    current: RwLock<Option<SyncStatus>>,
    sender: broadcast::Sender<SyncEvent>,
}

impl std::fmt::Debug for StatusNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusNotifier")
            .field("subscribers", &self.subscriber_count())
            .field("current", &self.current())
            .finish()
    }
}

impl StatusNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            current: RwLock::new(None),
            sender,
        }
    }

    /// 注册状态回调；返回的 [`Subscription`] 被 drop 时自动注销
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(SyncStatus) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, Arc::new(callback)));
        debug!("注册状态回调 #{}", id);
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// 发布状态：先更新当前状态，再依次调用回调，最后广播
    pub fn publish(&self, status: SyncStatus) {
        *self.current.write() = Some(status);

        // 先拷贝一份，回调里可以安全地注册/注销
        let callbacks: Vec<(u64, StatusCallback)> = self.subscribers.lock().clone();
        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                error!("❌ 状态回调 #{} panic，已跳过 (status={})", id, status);
            }
        }

        self.emit(SyncEvent::StatusChanged {
            status,
            timestamp: Utc::now(),
        });
    }

    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 最近一次发布的状态
    pub fn current(&self) -> Option<SyncStatus> {
        *self.current.read()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 状态回调的注册句柄
#[must_use = "Subscription 被 drop 时回调会被注销"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        // 实际注销在 Drop 中完成
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().retain(|(id, _)| *id != self.id);
            info!("注销状态回调 #{}", self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
