//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。所有公开入口都以 `TranslationResult`
//! 或回调的形式返回错误，不会把 panic 或异常抛出边界。
//!
//! 错误消息面向最终用户（由调用方直接展示），因此使用英文。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// 输入验证错误（空文本等）
    #[error("{0}")]
    InvalidInput(String),

    /// 不支持的语言代码
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// 不支持的语言对
    #[error("Unsupported language pair: {source_lang} -> {target_lang}")]
    UnsupportedLanguagePair {
        source_lang: String,
        target_lang: String,
    },

    /// 语言检测失败，翻译无法继续
    #[error("Could not detect language")]
    DetectionFailed,

    /// 能力不可用（缺少凭据等）
    #[error("Translation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 离线模型未下载
    #[error("Language models not downloaded: {0}")]
    ModelNotDownloaded(String),

    /// 模型状态不允许当前操作
    #[error("{0}")]
    InvalidModelState(String),

    /// 模型下载失败
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// 网络错误
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 远程翻译服务错误
    #[error("Translation service error: {0}")]
    TranslationServiceError(String),

    /// 离线翻译引擎错误（消息已转换为用户可读形式）
    #[error("{0}")]
    OfflineEngineError(String),

    /// 速率限制错误
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// 超时错误
    #[error("Operation timed out: {0}")]
    TimeoutError(String),

    /// 调用方取消
    #[error("Operation cancelled")]
    Cancelled,

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 缓存错误
    #[error("Cache error: {0}")]
    CacheError(String),

    /// 本地存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::TranslationServiceError(_) => true,
            TranslationError::OfflineEngineError(_) => true,
            TranslationError::DownloadFailed(_) => true,
            TranslationError::StorageError(_) => true,
            TranslationError::CacheError(_) => true,
            TranslationError::RateLimitExceeded(_) => false, // 需要等待
            TranslationError::InvalidInput(_) => false,
            TranslationError::UnsupportedLanguage(_) => false,
            TranslationError::UnsupportedLanguagePair { .. } => false,
            TranslationError::DetectionFailed => false,
            TranslationError::ServiceUnavailable(_) => false,
            TranslationError::ModelNotDownloaded(_) => false,
            TranslationError::InvalidModelState(_) => false,
            TranslationError::Cancelled => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::UnsupportedLanguage(_) => ErrorSeverity::Info,
            TranslationError::UnsupportedLanguagePair { .. } => ErrorSeverity::Info,
            TranslationError::InvalidModelState(_) => ErrorSeverity::Info,
            TranslationError::Cancelled => ErrorSeverity::Info,
            TranslationError::DetectionFailed => ErrorSeverity::Warning,
            TranslationError::ServiceUnavailable(_) => ErrorSeverity::Warning,
            TranslationError::ModelNotDownloaded(_) => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::RateLimitExceeded(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::CacheError(_) => ErrorSeverity::Warning,
            TranslationError::TranslationServiceError(_) => ErrorSeverity::Error,
            TranslationError::OfflineEngineError(_) => ErrorSeverity::Error,
            TranslationError::DownloadFailed(_) => ErrorSeverity::Error,
            TranslationError::StorageError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::UnsupportedLanguage(_) => ErrorCategory::Input,
            TranslationError::UnsupportedLanguagePair { .. } => ErrorCategory::Input,
            TranslationError::ServiceUnavailable(_) => ErrorCategory::Capability,
            TranslationError::ModelNotDownloaded(_) => ErrorCategory::Capability,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::TranslationServiceError(_) => ErrorCategory::Service,
            TranslationError::OfflineEngineError(_) => ErrorCategory::Service,
            TranslationError::DetectionFailed => ErrorCategory::Detection,
            TranslationError::InvalidModelState(_) => ErrorCategory::Download,
            TranslationError::DownloadFailed(_) => ErrorCategory::Download,
            TranslationError::RateLimitExceeded(_) => ErrorCategory::RateLimit,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::Cancelled => ErrorCategory::Cancellation,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::CacheError(_) => ErrorCategory::Cache,
            TranslationError::StorageError(_) => ErrorCategory::Storage,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    ///
    /// 不携带消息的变体原样返回。
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        if let Some(msg) = self.message_mut() {
            *msg = format!("{} (context: {})", msg, context);
        }
        self
    }

    fn message_mut(&mut self) -> Option<&mut String> {
        match self {
            TranslationError::InvalidInput(msg)
            | TranslationError::UnsupportedLanguage(msg)
            | TranslationError::ServiceUnavailable(msg)
            | TranslationError::ModelNotDownloaded(msg)
            | TranslationError::InvalidModelState(msg)
            | TranslationError::DownloadFailed(msg)
            | TranslationError::NetworkError(msg)
            | TranslationError::TranslationServiceError(msg)
            | TranslationError::OfflineEngineError(msg)
            | TranslationError::RateLimitExceeded(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::ConfigError(msg)
            | TranslationError::CacheError(msg)
            | TranslationError::StorageError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InternalError(msg) => Some(msg),
            TranslationError::UnsupportedLanguagePair { .. }
            | TranslationError::DetectionFailed
            | TranslationError::Cancelled => None,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 输入错误：空文本、不支持的语言代码
    Input,
    /// 能力不可用：无凭据、模型未下载
    Capability,
    Network,
    Service,
    /// 检测失败，翻译的硬性终止条件
    Detection,
    Download,
    RateLimit,
    Timeout,
    Cancellation,
    Configuration,
    Cache,
    Storage,
    Serialization,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::StorageError(format!("IO error: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON error: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML parse error: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::SerializationError(format!("TOML serialize error: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::TimeoutError(format!("async operation timed out: {}", error))
    }
}

#[cfg(feature = "google")]
impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(error.to_string())
        } else if error.is_decode() {
            TranslationError::SerializationError(format!("invalid response body: {}", error))
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 某一类别的错误次数
    pub fn count(&self, category: ErrorCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// 获取错误率
    pub fn error_rate(&self, total_operations: usize) -> f64 {
        if total_operations == 0 {
            0.0
        } else {
            self.total_errors as f64 / total_operations as f64
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 记录并返回错误
    pub fn log_error<T>(error: TranslationError) -> TranslationResult<T> {
        log(&error);
        Err(error)
    }

    /// 创建网络错误
    pub fn network_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::NetworkError(msg.to_string())
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InvalidInput(msg.to_string())
    }

    /// 创建超时错误
    pub fn timeout_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::TimeoutError(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InternalError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            TranslationError::InvalidInput("No text to translate".to_string()).to_string(),
            "No text to translate"
        );
        assert_eq!(
            TranslationError::DetectionFailed.to_string(),
            "Could not detect language"
        );
        assert_eq!(
            TranslationError::UnsupportedLanguage("xx".to_string()).to_string(),
            "Unsupported language: xx"
        );
    }

    #[test]
    fn test_with_context_keeps_variant() {
        let err = TranslationError::NetworkError("connection reset".to_string())
            .with_context("remote translate");
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.to_string().contains("connection reset"));
        assert!(err.to_string().contains("remote translate"));

        let err = TranslationError::Cancelled.with_context("ignored");
        assert_eq!(err, TranslationError::Cancelled);
    }

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            TranslationError::ServiceUnavailable("no API key".into()).category(),
            ErrorCategory::Capability
        );
        assert!(!TranslationError::DetectionFailed.is_retryable());
        assert!(TranslationError::DownloadFailed("x".into()).is_retryable());
        assert_eq!(
            TranslationError::ConfigError("x".into()).severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&TranslationError::NetworkError("a".into()));
        stats.record_error(&TranslationError::InternalError("b".into()));
        stats.record_error(&TranslationError::DetectionFailed);

        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.retryable_errors, 1);
        assert_eq!(stats.critical_errors, 1);
        assert_eq!(stats.count(ErrorCategory::Detection), 1);
        assert_eq!(stats.error_rate(6), 0.5);

        stats.reset();
        assert_eq!(stats.total_errors, 0);
    }
}
