//! 翻译策略
//!
//! 用户偏好以不可变的 [`TranslationPolicy`] 值传入编排器，
//! 路径选择 [`TranslationPolicy::plan`] 是纯函数，便于单元测试。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::translation::config::TranslationConfig;
use crate::translation::error::TranslationError;

/// 策略模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// 离线可用且已启用时优先离线，否则远程
    #[default]
    Auto,
    /// 仅使用远程服务
    OnlineOnly,
    /// 只要离线可用就用离线，忽略离线开关
    OfflinePreferred,
}

impl TranslationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationMode::Auto => "auto",
            TranslationMode::OnlineOnly => "online_only",
            TranslationMode::OfflinePreferred => "offline_preferred",
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationMode {
    type Err = TranslationError;

    /// 同时接受旧版偏好存储中的整数值（0 在线、1 离线、2 自动）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "auto" | "2" => Ok(TranslationMode::Auto),
            "online" | "online_only" | "0" => Ok(TranslationMode::OnlineOnly),
            "offline" | "offline_preferred" | "1" => Ok(TranslationMode::OfflinePreferred),
            other => Err(TranslationError::ConfigError(format!(
                "invalid translation mode '{}', use: auto, online_only, offline_preferred",
                other
            ))),
        }
    }
}

/// 翻译路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationPath {
    Offline,
    Remote,
}

/// 不可变策略快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationPolicy {
    pub mode: TranslationMode,
    pub offline_enabled: bool,
}

impl TranslationPolicy {
    pub fn new(mode: TranslationMode, offline_enabled: bool) -> Self {
        Self {
            mode,
            offline_enabled,
        }
    }

    /// 按顺序给出应尝试的路径
    ///
    /// 第一个元素是首选路径，其后是运行时失败时的回退路径。
    /// 空列表表示没有可用路径。
    ///
    /// # 参数
    ///
    /// * `offline_available` - 语言对受支持且模型已下载
    /// * `remote_available` - 远程服务持有凭据
    pub fn plan(&self, offline_available: bool, remote_available: bool) -> Vec<TranslationPath> {
        let use_offline = match self.mode {
            TranslationMode::OnlineOnly => false,
            TranslationMode::OfflinePreferred => offline_available,
            TranslationMode::Auto => offline_available && self.offline_enabled,
        };

        let mut paths = Vec::with_capacity(2);
        if use_offline {
            paths.push(TranslationPath::Offline);
        }
        if remote_available {
            paths.push(TranslationPath::Remote);
        }
        paths
    }

    /// 没有可用路径时的错误说明
    pub fn unavailable_error(&self) -> TranslationError {
        match self.mode {
            TranslationMode::OnlineOnly => TranslationError::ServiceUnavailable(
                "online translation requires an API key".to_string(),
            ),
            _ => TranslationError::ServiceUnavailable(
                "no offline model for this language pair and no API key configured".to_string(),
            ),
        }
    }
}

/// 用户偏好存储（只读）
pub trait PreferenceStore: Send + Sync {
    fn translation_mode(&self) -> TranslationMode;

    fn is_offline_translation_enabled(&self) -> bool;

    /// 通用首选语言
    fn preferred_language(&self) -> String;

    fn preferred_incoming_language(&self) -> Option<String> {
        None
    }

    fn preferred_outgoing_language(&self) -> Option<String> {
        None
    }

    fn is_auto_translate_enabled(&self) -> bool {
        false
    }

    /// 当前策略快照
    fn policy(&self) -> TranslationPolicy {
        TranslationPolicy::new(
            self.translation_mode(),
            self.is_offline_translation_enabled(),
        )
    }
}

/// 固定值偏好，通常由配置文件构造
#[derive(Debug, Clone)]
pub struct StaticPreferences {
    pub mode: TranslationMode,
    pub offline_enabled: bool,
    pub preferred_language: String,
    pub incoming_language: Option<String>,
    pub outgoing_language: Option<String>,
    pub auto_translate: bool,
}

impl Default for StaticPreferences {
    fn default() -> Self {
        Self::from(&TranslationConfig::default())
    }
}

impl From<&TranslationConfig> for StaticPreferences {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            mode: config.mode,
            offline_enabled: config.offline_enabled,
            preferred_language: config.preferred_language.clone(),
            incoming_language: config.incoming_language.clone(),
            outgoing_language: config.outgoing_language.clone(),
            auto_translate: config.auto_translate,
        }
    }
}

impl PreferenceStore for StaticPreferences {
    fn translation_mode(&self) -> TranslationMode {
        self.mode
    }

    fn is_offline_translation_enabled(&self) -> bool {
        self.offline_enabled
    }

    fn preferred_language(&self) -> String {
        self.preferred_language.clone()
    }

    fn preferred_incoming_language(&self) -> Option<String> {
        self.incoming_language.clone()
    }

    fn preferred_outgoing_language(&self) -> Option<String> {
        self.outgoing_language.clone()
    }

    fn is_auto_translate_enabled(&self) -> bool {
        self.auto_translate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TranslationPath::*;

    #[test]
    fn test_online_only_never_uses_offline() {
        let policy = TranslationPolicy::new(TranslationMode::OnlineOnly, true);
        assert_eq!(policy.plan(true, true), vec![Remote]);
        assert!(policy.plan(true, false).is_empty());
    }

    #[test]
    fn test_offline_preferred_ignores_switch() {
        let policy = TranslationPolicy::new(TranslationMode::OfflinePreferred, false);
        assert_eq!(policy.plan(true, true), vec![Offline, Remote]);
        assert_eq!(policy.plan(false, true), vec![Remote]);
        assert_eq!(policy.plan(true, false), vec![Offline]);
    }

    #[test]
    fn test_auto_requires_offline_enabled() {
        let enabled = TranslationPolicy::new(TranslationMode::Auto, true);
        let disabled = TranslationPolicy::new(TranslationMode::Auto, false);

        assert_eq!(enabled.plan(true, true), vec![Offline, Remote]);
        assert_eq!(disabled.plan(true, true), vec![Remote]);
        assert!(disabled.plan(true, false).is_empty());
        assert!(enabled.plan(false, false).is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<TranslationMode>().unwrap(), TranslationMode::Auto);
        assert_eq!("0".parse::<TranslationMode>().unwrap(), TranslationMode::OnlineOnly);
        assert_eq!(
            "Offline-Preferred".parse::<TranslationMode>().unwrap(),
            TranslationMode::OfflinePreferred
        );
        assert!("sometimes".parse::<TranslationMode>().is_err());
    }

    #[test]
    fn test_static_preferences_policy() {
        let prefs = StaticPreferences {
            mode: TranslationMode::OfflinePreferred,
            offline_enabled: false,
            ..StaticPreferences::default()
        };
        assert_eq!(
            prefs.policy(),
            TranslationPolicy::new(TranslationMode::OfflinePreferred, false)
        );
    }
}
