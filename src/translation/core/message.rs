//! 会话消息与短信的翻译适配
//!
//! 两种消息都走同一套翻译流程，这里只负责挑选目标语言、
//! 回填翻译结果，以及短信的重复过滤。

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::translation::config::constants;
use crate::translation::policy::PreferenceStore;

/// 会话中的一条消息
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub id: u64,
    pub body: Option<String>,
    pub incoming: bool,
    pub translated_text: Option<String>,
    pub original_language: Option<String>,
    pub translated_language: Option<String>,
    pub show_translation: bool,
}

impl Message {
    pub fn incoming(id: u64, body: impl Into<String>) -> Self {
        Self {
            id,
            body: Some(body.into()),
            incoming: true,
            ..Default::default()
        }
    }

    pub fn outgoing(id: u64, body: impl Into<String>) -> Self {
        Self {
            id,
            body: Some(body.into()),
            incoming: false,
            ..Default::default()
        }
    }

    /// 回填翻译结果并显示译文
    pub fn apply_translation(&mut self, translated: String, source_lang: Option<String>, target_lang: &str) {
        self.translated_text = Some(translated);
        if source_lang.is_some() {
            self.original_language = source_lang;
        }
        self.translated_language = Some(target_lang.to_string());
        self.show_translation = true;
    }

    /// 消息的目标语言：收/发方向的偏好，未设置时使用通用首选语言
    pub fn target_language(&self, preferences: &dyn PreferenceStore) -> String {
        let directional = if self.incoming {
            preferences.preferred_incoming_language()
        } else {
            preferences.preferred_outgoing_language()
        };
        non_blank(directional).unwrap_or_else(|| preferences.preferred_language())
    }
}

/// 收到的短信
#[derive(Debug, Clone, PartialEq)]
pub struct SmsMessage {
    pub address: String,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub translated_text: Option<String>,
    pub original_language: Option<String>,
    pub translated_language: Option<String>,
}

impl SmsMessage {
    pub fn new(address: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            body: Some(body.into()),
            timestamp: Utc::now(),
            translated_text: None,
            original_language: None,
            translated_language: None,
        }
    }

    /// 去重键：发送方地址加正文哈希
    pub fn dedup_key(&self) -> Option<String> {
        let body = self.body.as_deref().filter(|body| !body.trim().is_empty())?;
        Some(format!("{}:{}", self.address, blake3::hash(body.as_bytes()).to_hex()))
    }

    /// 短信的目标语言：收件语言偏好，未设置时使用通用首选语言
    pub fn target_language(preferences: &dyn PreferenceStore) -> String {
        non_blank(preferences.preferred_incoming_language())
            .unwrap_or_else(|| preferences.preferred_language())
    }

    pub fn apply_translation(&mut self, translated: String, source_lang: Option<String>, target_lang: &str) {
        self.translated_text = Some(translated);
        if source_lang.is_some() {
            self.original_language = source_lang;
        }
        self.translated_language = Some(target_lang.to_string());
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// 最近翻译过的短信，超过容量时淘汰最早的记录
pub struct RecentMessages {
    seen: Mutex<LruCache<String, DateTime<Utc>>>,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 首次出现时登记并返回 `true`，重复时返回 `false`
    pub fn insert(&self, key: String) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if seen.contains(&key) {
            return false;
        }
        seen.put(key, Utc::now());
        true
    }

    /// 取消登记，翻译失败的短信之后可以重试
    pub fn remove(&self, key: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop(key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentMessages {
    fn default() -> Self {
        Self::new(constants::RECENT_SMS_CAPACITY)
    }
}
