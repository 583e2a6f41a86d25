//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值。
//! 优先级：环境变量 > 配置文件 > 默认值。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::language;
use crate::translation::policy::TranslationMode;

/// 翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 远程服务
    pub api_key: Option<String>,
    pub api_url: String,
    /// 远程调用超时，未设置表示不限时
    pub remote_timeout_secs: Option<u64>,

    // 策略
    pub mode: TranslationMode,
    pub offline_enabled: bool,
    pub auto_translate: bool,
    pub preferred_language: String,
    pub incoming_language: Option<String>,
    pub outgoing_language: Option<String>,

    // 语言检测
    pub min_detection_confidence: f32,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub cache_ttl_secs: u64,
    pub cache_path: Option<String>,

    // 离线模型
    pub model_registry_path: Option<String>,

    // 速率限制
    pub rate_limit_enabled: bool,
    pub rate_limit_interval_ms: u64,
    pub daily_translation_limit: u32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: constants::DEFAULT_API_URL.to_string(),
            remote_timeout_secs: None,

            mode: TranslationMode::Auto,
            offline_enabled: true,
            auto_translate: false,
            preferred_language: constants::DEFAULT_PREFERRED_LANGUAGE.to_string(),
            incoming_language: None,
            outgoing_language: None,

            min_detection_confidence: constants::MIN_DETECTION_CONFIDENCE,

            cache_enabled: true,
            cache_max_entries: constants::DEFAULT_CACHE_MAX_ENTRIES,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL.as_secs(),
            cache_path: None,

            model_registry_path: None,

            rate_limit_enabled: false,
            rate_limit_interval_ms: constants::DEFAULT_RATE_LIMIT_INTERVAL.as_millis() as u64,
            daily_translation_limit: constants::DEFAULT_DAILY_TRANSLATION_LIMIT,
        }
    }
}

impl TranslationConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if language::normalize(&self.preferred_language).is_none() {
            return Err(TranslationError::ConfigError(
                "preferred_language must not be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(TranslationError::ConfigError(format!(
                "min_detection_confidence must be within 0..1, got {}",
                self.min_detection_confidence
            )));
        }

        if self.cache_enabled && self.cache_max_entries == 0 {
            return Err(TranslationError::ConfigError(
                "cache_max_entries must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        if self.cache_ttl_secs == 0 {
            return Err(TranslationError::ConfigError(
                "cache_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.remote_timeout_secs == Some(0) {
            return Err(TranslationError::ConfigError(
                "remote_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.rate_limit_enabled && self.daily_translation_limit == 0 {
            return Err(TranslationError::ConfigError(
                "daily_translation_limit must be greater than 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(TranslationError::ConfigError(format!(
                "api_url must start with http:// or https://, got '{}'",
                self.api_url
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{cache, models, rate_limit, translation, EnvVar};

        if let Some(api_key) = translation::ApiKey::get_override() {
            self.api_key = Some(api_key);
            tracing::info!("环境变量提供了 API 密钥");
        }

        if let Some(api_url) = translation::ApiUrl::get_override() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Some(timeout) = translation::RemoteTimeout::get_override() {
            self.remote_timeout_secs = Some(timeout.as_secs());
        }

        if let Some(mode) = translation::Mode::get_override() {
            self.mode = mode;
        }

        if let Some(enabled) = translation::OfflineEnabled::get_override() {
            self.offline_enabled = enabled;
        }

        if let Some(auto) = translation::AutoTranslate::get_override() {
            self.auto_translate = auto;
        }

        if let Some(lang) = translation::PreferredLanguage::get_override() {
            self.preferred_language = lang;
        }

        if let Some(confidence) = translation::MinConfidence::get_override() {
            self.min_detection_confidence = confidence;
        }

        // 缓存相关环境变量
        if let Some(enabled) = cache::Enabled::get_override() {
            self.cache_enabled = enabled;
        }

        if let Some(max_entries) = cache::MaxEntries::get_override() {
            self.cache_max_entries = max_entries;
        }

        if let Some(ttl) = cache::Ttl::get_override() {
            self.cache_ttl_secs = ttl.as_secs();
        }

        if let Some(path) = cache::SnapshotPath::get_override() {
            self.cache_path = Some(path);
        }

        if let Some(path) = models::RegistryPath::get_override() {
            self.model_registry_path = Some(path);
        }

        if let Some(enabled) = rate_limit::Enabled::get_override() {
            self.rate_limit_enabled = enabled;
        }

        if let Some(interval) = rate_limit::Interval::get_override() {
            self.rate_limit_interval_ms = interval.as_millis() as u64;
        }

        if let Some(limit) = rate_limit::DailyLimit::get_override() {
            self.daily_translation_limit = limit;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn remote_timeout(&self) -> Option<Duration> {
        self.remote_timeout_secs.map(Duration::from_secs)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    /// 是否配置了非空的 API 密钥
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty())
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
}

impl ConfigManager {
    /// 搜索配置文件并应用环境变量覆盖
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件加载，同样应用环境变量覆盖
    pub fn from_file<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        Self::load_dotenv();

        let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).into_owned();
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 从搜索路径加载配置
    fn load_config() -> TranslationResult<TranslationConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslationConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &str) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranslationError::ConfigError(format!("failed to read config file {}: {}", path, e))
        })?;

        if path.ends_with(".json") {
            serde_json::from_str(&content).map_err(|e| {
                TranslationError::ConfigError(format!("failed to parse JSON config: {}", e))
            })
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let content = Self::example_config()?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            TranslationError::ConfigError(format!("failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// 示例配置内容（TOML）
    pub fn example_config() -> TranslationResult<String> {
        let config = TranslationConfig {
            api_key: Some("your-api-key".to_string()),
            ..TranslationConfig::default()
        };
        Ok(toml::to_string_pretty(&config)?)
    }
}
