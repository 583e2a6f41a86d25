//! 语言检测服务
//!
//! 优先使用设备端检测器；置信度不足、结果为 `und` 或检测失败时，
//! 若持有远程凭据则回退到远程检测。空白文本直接返回失败，不调用任何检测器。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::translation::config::constants;
use crate::translation::error::TranslationResult;
use crate::translation::language;
use crate::translation::remote::RemoteTranslator;

/// 检测候选
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageCandidate {
    pub language: String,
    pub confidence: f32,
}

impl LanguageCandidate {
    pub fn new(language: impl Into<String>, confidence: f32) -> Self {
        Self {
            language: language.into(),
            confidence,
        }
    }
}

/// 设备端语言检测能力
#[async_trait]
pub trait LanguageIdentifier: Send + Sync {
    /// 返回可能的语言及置信度，顺序不限
    async fn identify(&self, text: &str) -> TranslationResult<Vec<LanguageCandidate>>;
}

/// 检测方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionMethod {
    OnDevice,
    RemoteFallback,
    Failed,
}

/// 检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub language_code: Option<String>,
    pub method: DetectionMethod,
    pub confidence: f32,
}

impl DetectionResult {
    pub fn failed() -> Self {
        Self {
            language_code: None,
            method: DetectionMethod::Failed,
            confidence: 0.0,
        }
    }

    fn detected(code: String, method: DetectionMethod, confidence: f32) -> Self {
        Self {
            language_code: Some(code),
            method,
            confidence,
        }
    }

    pub fn is_success(&self) -> bool {
        self.method != DetectionMethod::Failed && self.language_code.is_some()
    }
}

/// 语言检测服务
#[derive(Clone)]
pub struct LanguageDetectionService {
    on_device: Option<Arc<dyn LanguageIdentifier>>,
    remote: Arc<dyn RemoteTranslator>,
    // f32 位模式
    min_confidence: Arc<AtomicU32>,
    timeout: Duration,
}

impl LanguageDetectionService {
    pub fn new(
        on_device: Option<Arc<dyn LanguageIdentifier>>,
        remote: Arc<dyn RemoteTranslator>,
    ) -> Self {
        Self {
            on_device,
            remote,
            min_confidence: Arc::new(AtomicU32::new(
                constants::MIN_DETECTION_CONFIDENCE.to_bits(),
            )),
            timeout: constants::DETECTION_TIMEOUT,
        }
    }

    /// 设置设备端检测的超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn min_confidence(&self) -> f32 {
        f32::from_bits(self.min_confidence.load(Ordering::Relaxed))
    }

    /// 设置置信度阈值，超出 0..1 的值被截断
    pub fn set_min_confidence(&self, threshold: f32) {
        let threshold = if threshold.is_nan() {
            constants::MIN_DETECTION_CONFIDENCE
        } else {
            threshold.clamp(0.0, 1.0)
        };
        self.min_confidence
            .store(threshold.to_bits(), Ordering::Relaxed);
    }

    /// 远程检测是否可用（仅检查凭据）
    pub fn is_online_detection_available(&self) -> bool {
        self.remote.has_api_key()
    }

    pub fn has_on_device_detector(&self) -> bool {
        self.on_device.is_some()
    }

    /// 检测文本语言
    pub async fn detect<'a>(&self, text: impl Into<Option<&'a str>>) -> DetectionResult {
        let text = match text.into() {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                tracing::debug!("空文本，跳过语言检测");
                return DetectionResult::failed();
            }
        };

        if let Some(result) = self.detect_on_device(text).await {
            return result;
        }

        if let Some(result) = self.detect_remote(text).await {
            return result;
        }

        tracing::warn!("所有语言检测方式均失败");
        DetectionResult::failed()
    }

    /// 异步检测，结果通过回调返回
    ///
    /// 当前线程不在 tokio 运行时中时直接以失败结果回调。
    pub fn detect_with_callback<F>(&self, text: Option<String>, callback: F)
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let service = self.clone();
                handle.spawn(async move {
                    let result = service.detect(text.as_deref()).await;
                    callback(result);
                });
            }
            Err(e) => {
                tracing::error!("没有可用的异步运行时: {}", e);
                callback(DetectionResult::failed());
            }
        }
    }

    async fn detect_on_device(&self, text: &str) -> Option<DetectionResult> {
        let detector = self.on_device.as_ref()?;
        let threshold = self.min_confidence();

        let candidates = match tokio::time::timeout(self.timeout, detector.identify(text)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                tracing::warn!("设备端检测失败: {}", e);
                return None;
            }
            Err(_) => {
                tracing::warn!("设备端检测超时 ({:?})", self.timeout);
                return None;
            }
        };

        let best = candidates
            .into_iter()
            .filter(|c| !c.confidence.is_nan())
            .filter_map(|c| {
                let code = language::normalize(&c.language)?;
                (code != language::UNDETERMINED).then_some((code, c.confidence))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((code, confidence)) if confidence >= threshold => {
                tracing::debug!("设备端检测结果: {} (置信度 {:.2})", code, confidence);
                Some(DetectionResult::detected(
                    code,
                    DetectionMethod::OnDevice,
                    confidence,
                ))
            }
            Some((code, confidence)) => {
                tracing::debug!(
                    "设备端检测置信度过低: {} {:.2} < {:.2}",
                    code,
                    confidence,
                    threshold
                );
                None
            }
            None => {
                tracing::debug!("设备端检测无法确定语言");
                None
            }
        }
    }

    async fn detect_remote(&self, text: &str) -> Option<DetectionResult> {
        if !self.remote.has_api_key() {
            return None;
        }

        match self.remote.detect_language(text).await {
            Ok(code) => {
                let code = language::normalize(&code)?;
                if code == language::UNDETERMINED {
                    return None;
                }
                tracing::debug!("远程检测结果: {}", code);
                Some(DetectionResult::detected(
                    code,
                    DetectionMethod::RemoteFallback,
                    constants::REMOTE_DETECTION_CONFIDENCE,
                ))
            }
            Err(e) => {
                tracing::warn!("远程检测失败: {}", e);
                None
            }
        }
    }
}
