use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::error::OfflineSyncError;

/// 远端调用失败分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteFailure {
    /// 无响应、超时、5xx、408、429 - 下次 drain 再试
    Transient(String),
    /// 其余 4xx 等 - 不重试，移入死信
    Permanent {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteFailure {
    /// 按 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || status == 408 || status == 429 {
            RemoteFailure::Transient(format!("HTTP {}: {}", status, message))
        } else {
            RemoteFailure::Permanent {
                status: Some(status),
                message,
            }
        }
    }

    /// 判断是否可以重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteFailure::Transient(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteFailure::Transient(_) => None,
            RemoteFailure::Permanent { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteFailure::Transient(message) => message,
            RemoteFailure::Permanent { message, .. } => message,
        }
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFailure::Transient(message) => write!(f, "transient: {}", message),
            RemoteFailure::Permanent {
                status: Some(status),
                message,
            } => write!(f, "permanent [{}]: {}", status, message),
            RemoteFailure::Permanent { status: None, message } => {
                write!(f, "permanent: {}", message)
            }
        }
    }
}

/// 从错误转换为失败原因
impl From<OfflineSyncError> for RemoteFailure {
    fn from(error: OfflineSyncError) -> Self {
        match error {
            OfflineSyncError::Http { status, message } => RemoteFailure::from_status(status, message),
            // 载荷本身有问题，重发也不会成功
            OfflineSyncError::Serialization(message)
            | OfflineSyncError::InvalidArgument(message)
            | OfflineSyncError::UnknownEntityType(message) => RemoteFailure::Permanent {
                status: None,
                message,
            },
            other => RemoteFailure::Transient(other.to_string()),
        }
    }
}

/// 一次失败之后如何处理同步项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 回写 retry_count，留在队列
    Retry,
    /// 达到重试上限：标记 exhausted，仍留在队列
    Exhausted,
    /// 永久失败：移入死信
    DeadLetter,
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// `retry_count` 是记录本次失败之后的计数
    pub fn decide(&self, retry_count: u32, failure: &RemoteFailure) -> RetryDecision {
        if !failure.is_retryable() {
            RetryDecision::DeadLetter
        } else if retry_count >= self.max_retries {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RemoteFailure::from_status(500, "boom").is_retryable());
        assert!(RemoteFailure::from_status(503, "unavailable").is_retryable());
        assert!(RemoteFailure::from_status(408, "timeout").is_retryable());
        assert!(RemoteFailure::from_status(429, "slow down").is_retryable());

        let failure = RemoteFailure::from_status(422, "title is required");
        assert!(!failure.is_retryable());
        assert_eq!(failure.status(), Some(422));
        assert_eq!(failure.message(), "title is required");
        assert!(!RemoteFailure::from_status(404, "gone").is_retryable());
        assert!(!RemoteFailure::from_status(401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_from_error() {
        let failure: RemoteFailure = OfflineSyncError::Transport("connection reset".into()).into();
        assert!(failure.is_retryable());

        let failure: RemoteFailure = OfflineSyncError::Http {
            status: 400,
            message: "bad request".into(),
        }
        .into();
        assert_eq!(failure.status(), Some(400));

        let failure: RemoteFailure = OfflineSyncError::Serialization("eof".into()).into();
        assert!(!failure.is_retryable());
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::default();
        let transient = RemoteFailure::Transient("503".into());
        let permanent = RemoteFailure::Permanent {
            status: Some(422),
            message: "invalid".into(),
        };

        assert_eq!(policy.decide(1, &transient), RetryDecision::Retry);
        assert_eq!(policy.decide(2, &transient), RetryDecision::Retry);
        assert_eq!(policy.decide(3, &transient), RetryDecision::Exhausted);
        assert_eq!(policy.decide(7, &transient), RetryDecision::Exhausted);
        assert_eq!(policy.decide(1, &permanent), RetryDecision::DeadLetter);
    }
}
