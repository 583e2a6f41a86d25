//! 翻译缓存模块
//!
//! 以 `(文本, 源语言, 目标语言)` 为键缓存翻译结果，支持 TTL 过期、容量上限
//! （最久未访问条目优先淘汰）以及 JSON 快照持久化。
//!
//! 底层使用 `DashMap` 分片加锁，不同键的读写互不阻塞。

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::translation::config::{constants, TranslationConfig};
use crate::translation::error::TranslationResult;
use crate::translation::language;

// ============================================================================
// 核心类型
// ============================================================================

/// 缓存键
///
/// 语言代码经过规范化，文本保持原样。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl CacheKey {
    /// 创建缓存键，文本或任一语言为空时返回 `None`
    pub fn new(text: &str, source_lang: &str, target_lang: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            source_lang: language::normalize(source_lang)?,
            target_lang: language::normalize(target_lang)?,
        })
    }

    /// 生成存储键
    ///
    /// 每个字段前写入长度，不同字段边界的拼接不会产生相同输入。
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in [&self.text, &self.source_lang, &self.target_lang] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        format!("trans:{}", hasher.finalize().to_hex())
    }
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, translated_text: String) -> Self {
        Self {
            original_text: key.text.clone(),
            translated_text,
            source_lang: key.source_lang.clone(),
            target_lang: key.target_lang.clone(),
            created_at: Utc::now(),
        }
    }

    /// 检查条目是否过期
    pub fn is_expired(&self, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - self.created_at > ttl,
            Err(_) => false,
        }
    }

    fn matches(&self, key: &CacheKey) -> bool {
        self.original_text == key.text
            && self.source_lang == key.source_lang
            && self.target_lang == key.target_lang
    }

    fn key(&self) -> Option<CacheKey> {
        CacheKey::new(&self.original_text, &self.source_lang, &self.target_lang)
    }
}

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: constants::DEFAULT_CACHE_MAX_ENTRIES,
            ttl: constants::DEFAULT_CACHE_TTL,
        }
    }
}

impl From<&TranslationConfig> for CacheConfig {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            enabled: config.cache_enabled,
            max_entries: config.cache_max_entries,
            ttl: config.cache_ttl(),
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// 计算缓存命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }

    /// 计算缓存未命中率
    pub fn miss_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            1.0 - self.hit_rate()
        }
    }
}

/// 容量满时每次淘汰的比例
const EVICTION_BATCH_DIVISOR: usize = 16;

/// 存储槽：条目加最近访问序号
struct Slot {
    entry: CacheEntry,
    last_access: AtomicU64,
}

/// 翻译缓存
pub struct TranslationCache {
    entries: DashMap<String, Slot>,
    config: CacheConfig,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

// ============================================================================
// 实现
// ============================================================================

impl TranslationCache {
    /// 创建新的翻译缓存
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// 使用指定配置创建缓存
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 查询缓存
    ///
    /// 空文本或空语言代码总是未命中，不计入统计。
    pub fn get(&self, text: &str, source_lang: &str, target_lang: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let key = CacheKey::new(text, source_lang, target_lang)?;
        let digest = key.digest();

        let mut expired = false;
        let found = match self.entries.get(&digest) {
            Some(slot) if slot.entry.is_expired(self.config.ttl) => {
                expired = true;
                None
            }
            Some(slot) if slot.entry.matches(&key) => {
                slot.last_access.store(self.tick(), Ordering::Relaxed);
                Some(slot.entry.translated_text.clone())
            }
            _ => None,
        };

        if expired {
            // 删除过期条目
            if self
                .entries
                .remove_if(&digest, |_, slot| slot.entry.is_expired(self.config.ttl))
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        match found {
            Some(translated) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("缓存命中: {} -> {}", key.source_lang, key.target_lang);
                Some(translated)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 写入缓存
    ///
    /// 任一字段为空时忽略。
    pub fn put(&self, text: &str, source_lang: &str, target_lang: &str, translated: &str) {
        if !self.config.enabled {
            return;
        }
        let Some(key) = CacheKey::new(text, source_lang, target_lang) else {
            return;
        };
        self.insert_entry(&key, CacheEntry::new(&key, translated.to_string()));
    }

    fn insert_entry(&self, key: &CacheKey, entry: CacheEntry) {
        let digest = key.digest();

        if !self.entries.contains_key(&digest) {
            while self.entries.len() >= self.config.max_entries {
                if self.evict_lru_batch() == 0 {
                    break;
                }
            }
        }

        let slot = Slot {
            entry,
            last_access: AtomicU64::new(self.tick()),
        };
        self.entries.insert(digest, slot);
    }

    /// 删除单个条目
    pub fn remove(&self, text: &str, source_lang: &str, target_lang: &str) -> bool {
        CacheKey::new(text, source_lang, target_lang)
            .map(|key| self.entries.remove(&key.digest()).is_some())
            .unwrap_or(false)
    }

    /// 清空缓存并重置统计
    pub fn clear(&self) {
        self.entries.clear();
        self.reset_stats();
        tracing::info!("翻译缓存已清空");
    }

    /// 清理过期条目
    pub fn cleanup_expired(&self) -> usize {
        let initial_size = self.entries.len();
        self.entries
            .retain(|_, slot| !slot.entry.is_expired(self.config.ttl));

        let removed = initial_size.saturating_sub(self.entries.len());
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// 按 LRU 顺序批量驱逐，返回驱逐数量
    ///
    /// 一次扫描淘汰最久未访问的 `max_entries / 16` 条（至少 1 条），
    /// 满容量后的写入不必每次都扫描全表。
    fn evict_lru_batch(&self) -> usize {
        let mut candidates: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|item| (item.value().last_access.load(Ordering::Relaxed), item.key().clone()))
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let batch = (self.config.max_entries / EVICTION_BATCH_DIVISOR)
            .max(1)
            .min(candidates.len());
        if batch < candidates.len() {
            candidates.select_nth_unstable_by_key(batch - 1, |(access, _)| *access);
        }

        let removed = candidates
            .into_iter()
            .take(batch)
            .filter(|(_, key)| self.entries.remove(key).is_some())
            .count();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        tracing::debug!("缓存已满，驱逐 {} 条", removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        let cache_hits = self.hits.load(Ordering::Relaxed);
        let cache_misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            total_requests: cache_hits + cache_misses,
            cache_hits,
            cache_misses,
            total_entries: self.entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// 可读的统计摘要
    pub fn statistics(&self) -> String {
        let stats = self.stats();
        format!(
            "Cache entries: {}, hits: {}, misses: {}, hit rate: {:.1}%, evictions: {}",
            stats.total_entries,
            stats.cache_hits,
            stats.cache_misses,
            stats.hit_rate() * 100.0,
            stats.evictions
        )
    }

    /// 重置统计信息
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------------
    // 快照持久化
    // ------------------------------------------------------------------------

    /// 把未过期条目写入 JSON 快照，返回写入数量
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> TranslationResult<usize> {
        let mut snapshot: Vec<(u64, CacheEntry)> = self
            .entries
            .iter()
            .filter(|item| !item.value().entry.is_expired(self.config.ttl))
            .map(|item| {
                (
                    item.value().last_access.load(Ordering::Relaxed),
                    item.value().entry.clone(),
                )
            })
            .collect();
        // 按访问顺序保存，加载时恢复 LRU 顺序
        snapshot.sort_by_key(|(access, _)| *access);
        let entries: Vec<CacheEntry> = snapshot.into_iter().map(|(_, entry)| entry).collect();

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path.as_ref(), serde_json::to_vec_pretty(&entries)?)?;

        tracing::info!("缓存快照已保存: {} 条 -> {}", entries.len(), path.as_ref().display());
        Ok(entries.len())
    }

    /// 从 JSON 快照加载，跳过过期条目，返回加载数量
    ///
    /// 快照不存在时返回 0。
    pub fn load_from<P: AsRef<Path>>(&self, path: P) -> TranslationResult<usize> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(0);
        }

        let content = std::fs::read(path)?;
        let entries: Vec<CacheEntry> = serde_json::from_slice(&content)?;

        let mut loaded = 0;
        for entry in entries {
            if entry.is_expired(self.config.ttl) {
                continue;
            }
            if let Some(key) = entry.key() {
                self.insert_entry(&key, entry);
                loaded += 1;
            }
        }

        tracing::info!("缓存快照已加载: {} 条 <- {}", loaded, path.display());
        Ok(loaded)
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}
