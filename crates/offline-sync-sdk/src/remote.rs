//! 远端 REST API 客户端
//!
//! 请求映射：
//! - create → `POST {base}/{entity_type}`，JSON 请求体
//! - update → `PATCH {base}/{entity_type}/{entity_id}`，JSON 请求体
//! - delete → `DELETE {base}/{entity_type}/{entity_id}`，无请求体
//!
//! 凭证由外部 [`TokenProvider`] 提供，本模块不管理 token 生命周期。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use tracing::{debug, error, info};

use crate::config::HttpClientConfig;
use crate::error::{OfflineSyncError, Result};
use crate::storage::entities::{SyncItem, SyncOperation};
use crate::storage::queue::RemoteFailure;

/// 远端 API（queue processor 逐条调用）
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn send(&self, item: &SyncItem) -> std::result::Result<(), RemoteFailure>;
}

/// Bearer 凭证访问器
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 返回 None 表示不带 Authorization 头
    async fn bearer_token(&self) -> Result<Option<String>>;
}

/// 固定 token
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// 基于 reqwest 的远端 API 实现
pub struct HttpRemoteApi {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for HttpRemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpRemoteApi {
    /// 超时未配置时沿用 reqwest 默认行为
    pub fn new(
        base_url: &str,
        config: &HttpClientConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OfflineSyncError::Config(format!("api_base_url 无效 ({}): {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(OfflineSyncError::Config(format!(
                "api_base_url 不能作为 base: {}",
                base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| OfflineSyncError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建 (base_url: {})", base_url);
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    /// 同步项对应的请求方法和 URL
    pub fn request_target(&self, item: &SyncItem) -> Result<(Method, Url)> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                OfflineSyncError::Config(format!("api_base_url 不能作为 base: {}", self.base_url))
            })?;
            segments.pop_if_empty().push(item.entity_type.as_str());
            if item.operation != SyncOperation::Create {
                segments.push(&item.entity_id);
            }
        }

        let method = match item.operation {
            SyncOperation::Create => Method::POST,
            SyncOperation::Update => Method::PATCH,
            SyncOperation::Delete => Method::DELETE,
        };
        Ok((method, url))
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn send(&self, item: &SyncItem) -> std::result::Result<(), RemoteFailure> {
        let (method, url) = self.request_target(item).map_err(|e| RemoteFailure::Permanent {
            status: None,
            message: e.to_string(),
        })?;

        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|e| RemoteFailure::Transient(format!("获取访问凭证失败: {}", e)))?;

        debug!("➡️ {} {} (id={})", method, url, item.id);
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if item.operation != SyncOperation::Delete {
            request = request.json(&item.data);
        }

        let response = request.send().await.map_err(|e| {
            error!("❌ 请求失败 {} {}: {}", method, url, e);
            RemoteFailure::Transient(format!("请求失败: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("✅ {} {} -> {}", method, url, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            body
        };
        error!("❌ {} {} -> HTTP {}: {}", method, url, status.as_u16(), message);
        Err(RemoteFailure::from_status(status.as_u16(), message))
    }
}
