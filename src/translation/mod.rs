//! 翻译模块
//!
//! 模块划分：
//! - **core**: 翻译编排器、消息适配、限流与统计
//! - **detection**: 语言检测（设备端优先，远程兜底）
//! - **models**: 离线模型状态与下载
//! - **offline**: 设备端翻译
//! - **remote**: 远程翻译服务
//! - **storage**: 翻译缓存
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use message_translator::translation::{TranslationManager, TranslationRequest};
//!
//! # async fn example() {
//! let manager = TranslationManager::builder().build();
//! let outcome = manager
//!     .translate(TranslationRequest::new("Hola mundo", "en"))
//!     .await;
//! println!("{:?}", outcome);
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块
pub mod config;

/// 翻译编排核心
pub mod core;

/// 语言检测
pub mod detection;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 语言代码与模型目录
pub mod language;

/// 离线模型管理
pub mod models;

/// 设备端翻译
pub mod offline;

/// 翻译策略与用户偏好
pub mod policy;

/// 远程翻译服务
pub mod remote;

/// 缓存存储
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use core::{
    Message, RateLimiter, ServiceStats, ServiceStatsSnapshot, SmsMessage, TranslationCallback,
    TranslationManager, TranslationManagerBuilder, TranslationOrigin, TranslationOutcome,
    TranslationRequest, TranslationTask,
};

pub use config::{constants, ConfigManager, TranslationConfig};

pub use error::{ErrorCategory, ErrorSeverity, ErrorStats, TranslationError, TranslationResult};

pub use detection::{
    DetectionMethod, DetectionResult, LanguageCandidate, LanguageDetectionService,
    LanguageIdentifier,
};

pub use models::{
    DownloadListener, LanguageModel, ModelFetcher, ModelRegistry, ModelState,
    OfflineModelManager, ProgressSink, UnavailableModelFetcher,
};

pub use offline::{OfflineTranslationService, OnDeviceTranslator, UnavailableOnDeviceTranslator};

pub use policy::{PreferenceStore, StaticPreferences, TranslationMode, TranslationPath, TranslationPolicy};

#[cfg(feature = "google")]
pub use remote::GoogleTranslationClient;
pub use remote::{DisabledRemoteTranslator, RemoteTranslator};

pub use storage::{CacheConfig, CacheEntry, CacheKey, CacheStats, TranslationCache};

/// 检查翻译配置文件是否存在
pub fn config_file_exists() -> bool {
    config::config_file_exists()
}

/// 加载翻译配置，找不到或读取失败时使用默认值
pub fn load_translation_config() -> TranslationConfig {
    config::load_translation_config()
}
