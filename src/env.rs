//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量管理。所有变量使用 `TRANSLATOR_` 前缀，
//! 未设置的变量不会覆盖配置文件中的值。

use std::env;
use std::fmt;
use std::time::Duration;

use crate::translation::policy::TranslationMode;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }

    /// 仅在变量已设置时返回值，无效值记录警告后忽略
    fn get_override() -> Option<T> {
        let value = env::var(Self::NAME).ok()?;
        match Self::parse(&value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("忽略无效的环境变量: {}", e);
                None
            }
        }
    }

    /// 已设置则解析（无效值报错），未设置返回 `None`
    fn get_optional() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "TRANSLATOR_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error (default: info)";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 远程翻译 API 密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "TRANSLATOR_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "API key for the remote translation service";

        fn parse(value: &str) -> EnvResult<String> {
            let key = value.trim();
            if key.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API key must not be empty".to_string(),
                });
            }
            Ok(key.to_string())
        }
    }

    /// API URL
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "TRANSLATOR_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Remote translation API endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.trim_end_matches('/').to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 远程调用超时
    pub struct RemoteTimeout;
    impl EnvVar<Duration> for RemoteTimeout {
        const NAME: &'static str = "TRANSLATOR_REMOTE_TIMEOUT";
        const DEFAULT: Option<Duration> = None;
        const DESCRIPTION: &'static str =
            "Timeout for remote calls in seconds (unset: no timeout)";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 1, 600)
        }
    }

    /// 翻译策略模式
    pub struct Mode;
    impl EnvVar<TranslationMode> for Mode {
        const NAME: &'static str = "TRANSLATOR_MODE";
        const DEFAULT: Option<TranslationMode> = Some(TranslationMode::Auto);
        const DESCRIPTION: &'static str =
            "Translation mode: auto, online_only, offline_preferred";

        fn parse(value: &str) -> EnvResult<TranslationMode> {
            value.parse().map_err(|e| EnvError {
                variable: Self::NAME.to_string(),
                message: format!("{}", e),
            })
        }
    }

    /// 离线翻译开关
    pub struct OfflineEnabled;
    impl EnvVar<bool> for OfflineEnabled {
        const NAME: &'static str = "TRANSLATOR_OFFLINE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Allow on-device translation in auto mode";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 自动翻译收到的短信
    pub struct AutoTranslate;
    impl EnvVar<bool> for AutoTranslate {
        const NAME: &'static str = "TRANSLATOR_AUTO_TRANSLATE";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Automatically translate incoming SMS messages";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 首选语言
    pub struct PreferredLanguage;
    impl EnvVar<String> for PreferredLanguage {
        const NAME: &'static str = "TRANSLATOR_PREFERRED_LANGUAGE";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Preferred target language (e.g. en, es, zh-CN)";

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim().to_lowercase();
            let valid = !lang.is_empty()
                && lang.len() <= 8
                && lang.chars().all(|c| c.is_ascii_alphabetic() || c == '-' || c == '_');
            if valid {
                Ok(lang)
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid language code '{}'", value),
                })
            }
        }
    }

    /// 检测置信度阈值
    pub struct MinConfidence;
    impl EnvVar<f32> for MinConfidence {
        const NAME: &'static str = "TRANSLATOR_MIN_CONFIDENCE";
        const DEFAULT: Option<f32> = Some(0.5);
        const DESCRIPTION: &'static str =
            "Minimum on-device detection confidence before remote fallback (0..1)";

        fn parse(value: &str) -> EnvResult<f32> {
            let confidence: f32 = value.trim().parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid number".to_string(),
            })?;

            if !(0.0..=1.0).contains(&confidence) {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Confidence must be within 0..1".to_string(),
                });
            }

            Ok(confidence)
        }
    }
}

/// 缓存相关环境变量
pub mod cache {
    use super::*;

    /// 缓存启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "TRANSLATOR_CACHE_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Enable the translation cache";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 最大条目数
    pub struct MaxEntries;
    impl EnvVar<usize> for MaxEntries {
        const NAME: &'static str = "TRANSLATOR_CACHE_MAX_ENTRIES";
        const DEFAULT: Option<usize> = Some(10_000);
        const DESCRIPTION: &'static str = "Maximum number of cached translations";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1_000_000)
        }
    }

    /// 缓存TTL
    pub struct Ttl;
    impl EnvVar<Duration> for Ttl {
        const NAME: &'static str = "TRANSLATOR_CACHE_TTL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(30 * 24 * 60 * 60));
        const DESCRIPTION: &'static str = "Cache entry time-to-live in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_seconds(value, Self::NAME, 1, 365 * 24 * 60 * 60)
        }
    }

    /// 缓存快照文件
    pub struct SnapshotPath;
    impl EnvVar<String> for SnapshotPath {
        const NAME: &'static str = "TRANSLATOR_CACHE_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "JSON file used to persist the translation cache";

        fn parse(value: &str) -> EnvResult<String> {
            parse_path(value, Self::NAME)
        }
    }
}

/// 离线模型相关环境变量
pub mod models {
    use super::*;

    /// 已下载模型登记文件
    pub struct RegistryPath;
    impl EnvVar<String> for RegistryPath {
        const NAME: &'static str = "TRANSLATOR_MODEL_REGISTRY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "JSON file recording which offline models are downloaded";

        fn parse(value: &str) -> EnvResult<String> {
            parse_path(value, Self::NAME)
        }
    }
}

/// 速率限制相关环境变量
pub mod rate_limit {
    use super::*;

    /// 速率限制开关
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "TRANSLATOR_RATE_LIMIT_ENABLED";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Throttle remote translations";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 两次远程翻译的最小间隔
    pub struct Interval;
    impl EnvVar<Duration> for Interval {
        const NAME: &'static str = "TRANSLATOR_RATE_LIMIT_INTERVAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(5));
        const DESCRIPTION: &'static str = "Minimum interval between remote translations in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let millis = parse_positive_usize(value, Self::NAME, 0, 3_600_000)?;
            Ok(Duration::from_millis(millis as u64))
        }
    }

    /// 每日上限
    pub struct DailyLimit;
    impl EnvVar<u32> for DailyLimit {
        const NAME: &'static str = "TRANSLATOR_DAILY_LIMIT";
        const DEFAULT: Option<u32> = Some(100);
        const DESCRIPTION: &'static str = "Maximum remote translations per 24 hours";

        fn parse(value: &str) -> EnvResult<u32> {
            let limit = parse_positive_usize(value, Self::NAME, 1, 1_000_000)?;
            Ok(limit as u32)
        }
    }
}

// 辅助解析函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off", value),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_seconds(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let seconds = parse_positive_usize(value, var_name, min as usize, max as usize)?;
    Ok(Duration::from_secs(seconds as u64))
}

fn parse_path(value: &str, var_name: &str) -> EnvResult<String> {
    let path = value.trim();
    if path.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Path must not be empty".to_string(),
        });
    }
    Ok(shellexpand::tilde(path).into_owned())
}

/// 环境变量配置汇总
#[derive(Debug, Clone)]
pub struct EnvConfig {
    // 核心配置
    pub log_level: String,
    pub no_color: bool,

    // 翻译配置
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub remote_timeout: Option<Duration>,
    pub mode: TranslationMode,
    pub offline_enabled: bool,
    pub auto_translate: bool,
    pub preferred_language: Option<String>,
    pub min_confidence: f32,

    // 缓存配置
    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub cache_ttl: Duration,
    pub cache_path: Option<String>,

    // 模型配置
    pub model_registry_path: Option<String>,

    // 速率限制
    pub rate_limit_enabled: bool,
    pub rate_limit_interval: Duration,
    pub daily_limit: u32,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            log_level: core::LogLevel::get()?,
            no_color: core::NoColor::get()?,

            api_key: translation::ApiKey::get_optional()?,
            api_url: translation::ApiUrl::get_optional()?,
            remote_timeout: translation::RemoteTimeout::get_optional()?,
            mode: translation::Mode::get()?,
            offline_enabled: translation::OfflineEnabled::get()?,
            auto_translate: translation::AutoTranslate::get()?,
            preferred_language: translation::PreferredLanguage::get_optional()?,
            min_confidence: translation::MinConfidence::get()?,

            cache_enabled: cache::Enabled::get()?,
            cache_max_entries: cache::MaxEntries::get()?,
            cache_ttl: cache::Ttl::get()?,
            cache_path: cache::SnapshotPath::get_optional()?,

            model_registry_path: models::RegistryPath::get_optional()?,

            rate_limit_enabled: rate_limit::Enabled::get()?,
            rate_limit_interval: rate_limit::Interval::get()?,
            daily_limit: rate_limit::DailyLimit::get()?,
        })
    }

    /// 打印配置摘要（隐藏敏感信息）
    pub fn print_summary(&self) {
        println!("Environment Configuration Summary:");
        println!("  Log Level: {}", self.log_level);
        println!("  Mode: {}", self.mode);
        println!("  Offline: {}", if self.offline_enabled { "enabled" } else { "disabled" });
        println!("  Cache: {}", if self.cache_enabled { "enabled" } else { "disabled" });
        println!(
            "  Rate Limit: {}",
            if self.rate_limit_enabled { "enabled" } else { "disabled" }
        );
        if self.api_key.is_some() {
            println!("  API Key: [configured]");
        }
    }
}

fn doc_line<T: fmt::Debug, V: EnvVar<T>>(docs: &mut String) {
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        V::NAME,
        V::DESCRIPTION,
        V::DEFAULT
    ));
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    doc_line::<_, core::LogLevel>(&mut docs);
    doc_line::<_, core::NoColor>(&mut docs);

    docs.push_str("\n## Translation Configuration\n\n");
    doc_line::<_, translation::ApiKey>(&mut docs);
    doc_line::<_, translation::ApiUrl>(&mut docs);
    doc_line::<_, translation::RemoteTimeout>(&mut docs);
    doc_line::<_, translation::Mode>(&mut docs);
    doc_line::<_, translation::OfflineEnabled>(&mut docs);
    doc_line::<_, translation::AutoTranslate>(&mut docs);
    doc_line::<_, translation::PreferredLanguage>(&mut docs);
    doc_line::<_, translation::MinConfidence>(&mut docs);

    docs.push_str("\n## Cache Configuration\n\n");
    doc_line::<_, cache::Enabled>(&mut docs);
    doc_line::<_, cache::MaxEntries>(&mut docs);
    doc_line::<_, cache::Ttl>(&mut docs);
    doc_line::<_, cache::SnapshotPath>(&mut docs);

    docs.push_str("\n## Offline Models\n\n");
    doc_line::<_, models::RegistryPath>(&mut docs);

    docs.push_str("\n## Rate Limiting\n\n");
    doc_line::<_, rate_limit::Enabled>(&mut docs);
    doc_line::<_, rate_limit::Interval>(&mut docs);
    doc_line::<_, rate_limit::DailyLimit>(&mut docs);

    docs
}
