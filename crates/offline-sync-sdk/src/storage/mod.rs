//! 本地存储模块
//!
//! 分层：
//! - `store`：惰性打开的共享 SQLite 连接（refinery 管理 schema）
//! - `dao`：按集合划分的同步读写，借用连接或事务
//! - `cache` / `repository` / `settings` / `uploads` / `queue`：异步 manager，负责加锁、日志和业务规则

pub mod cache;
pub mod dao;
pub mod entities;
pub mod entity_kind;
pub mod migrate;
pub mod queue;
pub mod repository;
pub mod settings;
pub mod store;
pub mod uploads;

pub use cache::CacheLayer;
pub use entities::{
    CacheItem, DeadLetter, EntityRecord, PendingUpload, SyncItem, SyncItemStatus, SyncOperation,
    UserSetting,
};
pub use entity_kind::EntityKind;
pub use queue::SyncQueueManager;
pub use repository::EntityRepository;
pub use settings::SettingsStore;
pub use store::{DurableStore, SharedConnection};
pub use uploads::UploadStore;
