//! 引擎配置
//!
//! 所有字段都有默认值，通过 [`OfflineSyncConfig::builder`] 覆盖需要的部分。

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OfflineSyncError, Result};

/// HTTP 客户端配置
///
/// 超时为 `None` 时沿用传输层默认行为。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

/// 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 重试上限：retry_count 达到该值后同步项被标记为 exhausted
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件广播缓冲区大小
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// 离线同步引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineSyncConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 数据库文件名
    pub db_file_name: String,
    /// 使用内存数据库（测试或临时会话）
    pub in_memory: bool,
    /// 远端 REST API 基础 URL，例如 https://grc.example.com/api
    pub api_base_url: String,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 重试配置
    pub retry_config: RetryConfig,
    /// 事件配置
    pub event_config: EventConfig,
    /// 初始网络状态
    pub start_online: bool,
    /// 调试模式
    pub debug_mode: bool,
}

impl Default for OfflineSyncConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            db_file_name: "offline_sync.db".to_string(),
            in_memory: false,
            api_base_url: "http://localhost:8080/api".to_string(),
            http_client_config: HttpClientConfig::default(),
            retry_config: RetryConfig::default(),
            event_config: EventConfig::default(),
            start_online: true,
            debug_mode: false,
        }
    }
}

impl OfflineSyncConfig {
    pub fn builder() -> OfflineSyncConfigBuilder {
        OfflineSyncConfigBuilder::new()
    }

    /// 数据库文件完整路径
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(OfflineSyncError::Config("api_base_url 不能为空".to_string()));
        }
        Url::parse(&self.api_base_url).map_err(|e| {
            OfflineSyncError::Config(format!("api_base_url 无效 ({}): {}", self.api_base_url, e))
        })?;
        if self.retry_config.max_retries == 0 {
            return Err(OfflineSyncError::Config("max_retries 至少为 1".to_string()));
        }
        if self.event_config.buffer_size == 0 {
            return Err(OfflineSyncError::Config("event buffer_size 至少为 1".to_string()));
        }
        if !self.in_memory && self.db_file_name.trim().is_empty() {
            return Err(OfflineSyncError::Config("db_file_name 不能为空".to_string()));
        }
        Ok(())
    }
}

/// 获取默认数据目录 ~/.offline_sync/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".offline_sync")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".offline_sync")
    } else {
        PathBuf::from("./offline_sync_data")
    }
}

/// 配置构建器
pub struct OfflineSyncConfigBuilder {
    config: OfflineSyncConfig,
}

impl OfflineSyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: OfflineSyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn db_file_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.db_file_name = name.into();
        self
    }

    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.config.in_memory = in_memory;
        self
    }

    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_client_config.request_timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry_config.max_retries = max_retries;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_config.buffer_size = size;
        self
    }

    pub fn start_online(mut self, online: bool) -> Self {
        self.config.start_online = online;
        self
    }

    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.config.debug_mode = debug;
        self
    }

    pub fn build(self) -> Result<OfflineSyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for OfflineSyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
