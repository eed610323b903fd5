use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// 网络状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
    /// 连接中
    Connecting,
    /// 网络受限（仍可访问远端）
    Limited,
}

impl NetworkStatus {
    /// 能否向远端发起请求
    pub fn is_reachable(self) -> bool {
        matches!(self, NetworkStatus::Online | NetworkStatus::Limited)
    }
}

/// 网络状态变化事件
#[derive(Debug, Clone)]
pub struct NetworkStatusEvent {
    pub old_status: NetworkStatus,
    pub new_status: NetworkStatus,
    pub timestamp: DateTime<Utc>,
}

/// 网络状态监听器trait（由平台层实现）
#[async_trait]
pub trait NetworkStatusListener: Send + Sync + std::fmt::Debug {
    /// 获取当前网络状态
    async fn get_current_status(&self) -> NetworkStatus;

    /// 开始监听网络状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 连通性变化（只在状态真正翻转时发送）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub online: bool,
    pub timestamp: DateTime<Utc>,
}

/// 网络监控 - 持有在线标志，每个引擎实例一份
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    change_sender: broadcast::Sender<ConnectivityChange>,
}

impl NetworkMonitor {
    pub fn new(initial_online: bool) -> Self {
        let (change_sender, _) = broadcast::channel(100);
        Self {
            online: AtomicBool::new(initial_online),
            change_sender,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// 设置在线状态，返回状态是否发生了变化；重复的同状态信号被忽略
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            debug!("网络状态未变化，忽略: online={}", online);
            return false;
        }

        info!("🌐 网络状态变化: {} -> {}", label(previous), label(online));
        let change = ConnectivityChange {
            online,
            timestamp: Utc::now(),
        };
        if self.change_sender.send(change).is_err() {
            debug!("网络状态变化没有订阅者");
        }
        true
    }

    /// 订阅连通性变化
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityChange> {
        self.change_sender.subscribe()
    }

    /// 接入平台监听器：先同步一次当前状态，然后在后台任务中应用后续变化
    pub async fn start(
        self: &Arc<Self>,
        listener: Arc<dyn NetworkStatusListener>,
    ) -> Result<JoinHandle<()>> {
        let current = listener.get_current_status().await;
        self.set_online(current.is_reachable());

        let mut receiver = listener.start_monitoring().await?;
        let monitor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        debug!(
                            "平台网络事件: {:?} -> {:?}",
                            event.old_status, event.new_status
                        );
                        monitor.set_online(event.new_status.is_reachable());
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("⚠️ 网络事件积压，跳过 {} 条", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("平台网络监听已关闭");
                        break;
                    }
                }
            }
        });

        Ok(handle)
    }
}

fn label(online: bool) -> &'static str {
    if online {
        "online"
    } else {
        "offline"
    }
}

/// 手动推送状态的网络监听器（桌面端、测试环境等没有系统网络回调的平台）
#[derive(Debug)]
pub struct ManualNetworkListener {
    status: Arc<tokio::sync::RwLock<NetworkStatus>>,
    sender: broadcast::Sender<NetworkStatusEvent>,
    monitoring: AtomicBool,
}

impl ManualNetworkListener {
    pub fn new(initial: NetworkStatus) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            status: Arc::new(tokio::sync::RwLock::new(initial)),
            sender,
            monitoring: AtomicBool::new(false),
        }
    }

    /// 是否处于监听中（start_monitoring 之后、stop_monitoring 之前）
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub async fn push(&self, new_status: NetworkStatus) {
        let old_status = {
            let mut status = self.status.write().await;
            std::mem::replace(&mut *status, new_status)
        };
        let _ = self.sender.send(NetworkStatusEvent {
            old_status,
            new_status,
            timestamp: Utc::now(),
        });
    }
}

impl Default for ManualNetworkListener {
    fn default() -> Self {
        Self::new(NetworkStatus::Online)
    }
}

#[async_trait]
impl NetworkStatusListener for ManualNetworkListener {
    async fn get_current_status(&self) -> NetworkStatus {
        *self.status.read().await
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<NetworkStatusEvent>> {
        self.monitoring.store(true, Ordering::SeqCst);
        Ok(self.sender.subscribe())
    }

    async fn stop_monitoring(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
    }
}
