//! # Message Translator
//!
//! 消息应用的翻译编排引擎：缓存、语言检测、离线模型下载与管理、
//! 按策略在设备端和远程翻译之间选择。
//!
//! ## 模块组织
//!
//! - `translation` - 翻译编排与各个子服务
//! - `env` - 环境变量定义与解析

pub mod env;
pub mod translation;

pub use translation::{
    TranslationConfig, TranslationError, TranslationManager, TranslationOutcome,
    TranslationRequest, TranslationResult,
};
