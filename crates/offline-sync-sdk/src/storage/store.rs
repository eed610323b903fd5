//! 持久化存储 - 本地 SQLite 连接
//!
//! 本模块提供：
//! - 惰性打开：首次调用 `open()` 时才真正建连和执行 migration
//! - 单连接共享：并发调用 `open()` 只会初始化一次，所有组件共用同一连接
//! - 打开失败直接返回给调用方，不做回退存储

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};

use crate::config::OfflineSyncConfig;
use crate::error::{OfflineSyncError, Result};
use crate::storage::migrate;

/// 共享连接句柄
pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    Memory,
    File(PathBuf),
}

/// 本地持久化存储
#[derive(Debug)]
pub struct DurableStore {
    location: StoreLocation,
    conn: OnceCell<SharedConnection>,
}

impl DurableStore {
    pub fn new(config: &OfflineSyncConfig) -> Self {
        if config.in_memory {
            Self::in_memory()
        } else {
            Self::with_path(config.db_path())
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            conn: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            conn: OnceCell::new(),
        }
    }

    /// 打开（或复用）共享连接
    pub async fn open(&self) -> Result<SharedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self.open_connection().await.map_err(|e| {
                    error!("❌ 打开本地存储失败: {}", e);
                    e
                })?;
                Ok::<_, OfflineSyncError>(Arc::new(Mutex::new(conn)))
            })
            .await?;
        Ok(conn.clone())
    }

    pub fn is_open(&self) -> bool {
        self.conn.initialized()
    }

    /// 当前库的 schema 版本
    pub async fn schema_version(&self) -> Result<Option<i64>> {
        let conn = self.open().await?;
        let conn = conn.lock().await;
        migrate::get_db_migration_version(&conn)
    }

    async fn open_connection(&self) -> Result<Connection> {
        let mut conn = match &self.location {
            StoreLocation::Memory => Connection::open_in_memory().map_err(|e| {
                OfflineSyncError::StoreUnavailable(format!("打开内存数据库失败: {}", e))
            })?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        OfflineSyncError::StoreUnavailable(format!(
                            "创建数据目录失败 ({}): {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
                Connection::open(path).map_err(|e| {
                    OfflineSyncError::StoreUnavailable(format!(
                        "打开数据库失败 ({}): {}",
                        path.display(),
                        e
                    ))
                })?
            }
        };

        migrate::init_db(&mut conn)?;

        match &self.location {
            StoreLocation::Memory => info!("✅ 本地存储已打开 (内存)"),
            StoreLocation::File(path) => info!("✅ 本地存储已打开: {}", path.display()),
        }
        Ok(conn)
    }
}
