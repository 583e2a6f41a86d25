//! 翻译服务统计
//!
//! 统计字段全部为原子类型，在并发请求中更新时无需加锁。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::translation::policy::TranslationPath;

/// 线程安全的服务统计
#[derive(Debug, Default)]
pub struct ServiceStats {
    /// 收到的翻译请求数
    pub requests: AtomicUsize,

    /// 缓存命中次数
    pub cache_hits: AtomicUsize,

    /// 缓存未命中次数
    pub cache_misses: AtomicUsize,

    /// 执行的语言检测次数
    pub detections: AtomicUsize,

    pub offline_translations: AtomicUsize,

    pub remote_translations: AtomicUsize,

    /// 因已是目标语言而跳过的请求
    pub same_language_skips: AtomicUsize,

    /// 以失败结束的请求
    pub failures: AtomicUsize,

    /// 总处理时间（微秒）
    pub processing_time: AtomicU64,
}

impl ServiceStats {
    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_detections(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    /// 按实际使用的路径计数
    pub fn inc_translations(&self, path: TranslationPath) {
        match path {
            TranslationPath::Offline => self.offline_translations.fetch_add(1, Ordering::Relaxed),
            TranslationPath::Remote => self.remote_translations.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn inc_same_language_skips(&self) {
        self.same_language_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_processing_time(&self, duration: Duration) {
        self.processing_time
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// 读取当前统计
    ///
    /// 各字段分别原子读取，高并发时不同字段可能来自略有先后的时刻。
    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            offline_translations: self.offline_translations.load(Ordering::Relaxed),
            remote_translations: self.remote_translations.load(Ordering::Relaxed),
            same_language_skips: self.same_language_skips.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            processing_time: Duration::from_micros(self.processing_time.load(Ordering::Relaxed)),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceStatsSnapshot {
    pub requests: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub detections: usize,
    pub offline_translations: usize,
    pub remote_translations: usize,
    pub same_language_skips: usize,
    pub failures: usize,
    pub processing_time: Duration,
}

impl ServiceStatsSnapshot {
    /// 实际执行翻译（不含缓存命中）的次数
    pub fn translations(&self) -> usize {
        self.offline_translations + self.remote_translations
    }

    /// 缓存命中率（百分比）
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            100.0 * self.cache_hits as f64 / total as f64
        }
    }
}
