use thiserror::Error;

#[derive(Debug, Error)]
pub enum OfflineSyncError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Migration error: {0}")]
    Migration(String),
    /// 本地存储引擎拒绝打开（配额、损坏、被禁用），整个会话不可用
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP error [{status}]: {message}")]
    Http { status: u16, message: String },
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for OfflineSyncError {
    fn from(error: serde_json::Error) -> Self {
        OfflineSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for OfflineSyncError {
    fn from(error: std::io::Error) -> Self {
        OfflineSyncError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for OfflineSyncError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => OfflineSyncError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => OfflineSyncError::Transport(error.to_string()),
        }
    }
}

impl OfflineSyncError {
    /// 本地存储层错误（区别于网络/远端错误）
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            OfflineSyncError::Sqlite(_)
                | OfflineSyncError::Database(_)
                | OfflineSyncError::Migration(_)
                | OfflineSyncError::StoreUnavailable(_)
        )
    }

    /// HTTP 状态码（如果这是一个 HTTP 错误）
    pub fn http_status(&self) -> Option<u16> {
        match self {
            OfflineSyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OfflineSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_classification() {
        assert!(OfflineSyncError::Database("disk full".into()).is_storage_error());
        assert!(OfflineSyncError::StoreUnavailable("quota".into()).is_storage_error());
        assert!(!OfflineSyncError::Transport("reset".into()).is_storage_error());

        let err = OfflineSyncError::Http { status: 422, message: "invalid".into() };
        assert_eq!(err.http_status(), Some(422));
        assert_eq!(err.to_string(), "HTTP error [422]: invalid");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: OfflineSyncError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, OfflineSyncError::Serialization(_)));
    }
}
