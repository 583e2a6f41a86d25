//! 存储模块
//!
//! 提供翻译结果缓存及其快照持久化。

pub mod cache;

pub use cache::{CacheConfig, CacheEntry, CacheKey, CacheStats, TranslationCache};
