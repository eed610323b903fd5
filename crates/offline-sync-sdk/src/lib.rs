//! Offline Sync SDK - 离线优先同步引擎
//!
//! 应用在断网时照常工作：变更先写入本地队列，读请求走带过期时间的本地缓存，
//! 网络恢复后自动把队列按 FIFO 投递到远端 REST API。
//!
//! 组成：
//! - 📦 持久化存储：SQLite + refinery migrations，惰性打开、单连接共享
//! - 📥 同步队列：FIFO、至少一次投递、失败重试计数、死信
//! - 🔄 队列处理器：同一时刻最多一个 drain，逐条串行，单条失败不影响后续
//! - 🧠 TTL 缓存：读取时惰性淘汰
//! - 🗂️ 实体仓库：远端资源的本地镜像，按 id upsert
//! - 📡 网络监控：上线即触发 drain
//! - ⚙️ 状态通知：online / offline / syncing / synced / error
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use offline_sync_sdk::{
//!     EntityKind, OfflineSyncConfig, OfflineSyncEngine, StaticTokenProvider, SyncOperation,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OfflineSyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .api_base_url("https://grc.example.com/api")
//!         .build()?;
//!
//!     let engine = OfflineSyncEngine::with_http(
//!         config,
//!         Arc::new(StaticTokenProvider::new("token")),
//!         None,
//!     )
//!     .await?;
//!
//!     let _status = engine.on_sync_status(|status| println!("sync status: {}", status));
//!
//!     // 乐观写入本地镜像并入队
//!     engine
//!         .mutate(SyncOperation::Create, EntityKind::Incidents, "inc-1", json!({"title": "Leak"}))
//!         .await?;
//!
//!     engine
//!         .cache_set("dash:kpis", json!({"open": 3}), Some(Duration::from_secs(60)))
//!         .await;
//!
//!     engine.set_online_status(false);
//!     println!("pending: {}", engine.get_sync_queue_count().await?);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod network;
pub mod remote;
pub mod storage;
pub mod version;

pub use config::{EventConfig, HttpClientConfig, OfflineSyncConfig, OfflineSyncConfigBuilder, RetryConfig};
pub use engine::OfflineSyncEngine;
pub use error::{OfflineSyncError, Result};
pub use events::{StatusNotifier, Subscription, SyncEvent, SyncStatus};
pub use network::{
    ConnectivityChange, ManualNetworkListener, NetworkMonitor, NetworkStatus, NetworkStatusEvent,
    NetworkStatusListener,
};
pub use remote::{HttpRemoteApi, RemoteApi, StaticTokenProvider, TokenProvider};
pub use storage::queue::{
    DrainReport, DrainRequester, DrainSkip, QueueProcessor, QueueStats, RemoteFailure, RetryDecision,
    RetryPolicy, SyncQueueManager,
};
pub use storage::{
    CacheItem, CacheLayer, DeadLetter, DurableStore, EntityKind, EntityRecord, EntityRepository,
    PendingUpload, SettingsStore, SyncItem, SyncItemStatus, SyncOperation, UploadStore, UserSetting,
};
pub use version::{BUILD_TIME, GIT_SHA, SDK_DB_VERSION, SDK_VERSION};
