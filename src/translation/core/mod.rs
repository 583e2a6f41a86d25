//! 翻译编排核心
//!
//! - **manager**: `TranslationManager`，决定每个请求走缓存、离线还是远程
//! - **message**: 会话消息与短信的适配
//! - **rate_limit**: 远程翻译限流
//! - **stats**: 原子统计
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationManager (manager.rs)
//!     ├── TranslationCache (storage/cache.rs)
//!     ├── LanguageDetectionService (detection.rs)
//!     ├── OfflineTranslationService (offline.rs)
//!     │       └── OfflineModelManager (models/mod.rs)
//!     ├── RemoteTranslator (remote.rs)
//!     ├── PreferenceStore (policy.rs)
//!     └── RateLimiter (rate_limit.rs)
//! ```

pub mod manager;
pub mod message;
pub mod rate_limit;
pub mod stats;

pub use manager::{
    TranslationCallback, TranslationManager, TranslationManagerBuilder, TranslationOrigin,
    TranslationOutcome, TranslationRequest, TranslationTask,
};
pub use message::{Message, RecentMessages, SmsMessage};
pub use rate_limit::{RateLimiter, RatePermit};
pub use stats::{ServiceStats, ServiceStatsSnapshot};
