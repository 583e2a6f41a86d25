//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 远程服务
    pub const DEFAULT_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";
    pub const DEFAULT_PREFERRED_LANGUAGE: &str = "en";

    // 语言检测
    pub const MIN_DETECTION_CONFIDENCE: f32 = 0.5;
    pub const REMOTE_DETECTION_CONFIDENCE: f32 = 0.8;
    pub const DETECTION_TIMEOUT: Duration = Duration::from_secs(10);

    // 缓存设置
    pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60); // 30天

    // 远程翻译速率限制
    pub const DEFAULT_RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_DAILY_TRANSLATION_LIMIT: u32 = 100;
    pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    // 离线翻译
    pub const DICTIONARY_RETRY_DELAY: Duration = Duration::from_millis(500);

    // 短信去重
    pub const RECENT_SMS_CAPACITY: usize = 50;

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "translator.toml",
        ".translator.toml",
        "translator.json",
        "~/.config/message-translator/config.toml",
        "/etc/message-translator/config.toml",
    ];
}

/// 是否存在任一配置文件
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时回退到默认配置
pub fn load_translation_config() -> TranslationConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            TranslationConfig::default()
        }
    }
}
