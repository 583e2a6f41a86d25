//! 离线翻译服务
//!
//! 在设备端模型已下载时使用 [`OnDeviceTranslator`] 翻译。
//! 引擎返回的错误会转换为用户可读的说明；词典加载失败会在短暂等待后重试一次。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::translation::config::constants;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::language;
use crate::translation::models::OfflineModelManager;

/// 设备端翻译能力
///
/// 传入的语言代码已经是目录中的离线代码（如 `zh`）。
#[async_trait]
pub trait OnDeviceTranslator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationResult<String>;
}

/// 没有设备端翻译引擎时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOnDeviceTranslator;

#[async_trait]
impl OnDeviceTranslator for UnavailableOnDeviceTranslator {
    async fn translate(&self, _text: &str, _source_lang: &str, _target_lang: &str) -> TranslationResult<String> {
        Err(TranslationError::ServiceUnavailable(
            "no on-device translation engine".to_string(),
        ))
    }
}

fn is_dictionary_error(message: &str) -> bool {
    message.to_lowercase().contains("dict")
}

/// 把引擎错误转换为用户可读的说明
pub fn enhance_error_message(message: &str) -> String {
    if message.trim().is_empty() {
        return "Translation failed due to an unknown error".to_string();
    }

    let lower = message.to_lowercase();
    if lower.contains("dict") {
        "Dictionary files failed to load. Please try redownloading the language models or check available storage space.".to_string()
    } else if lower.contains("model") && (lower.contains("not found") || lower.contains("missing")) {
        "Language model not found. Please download the required language models for offline translation.".to_string()
    } else if lower.contains("model") {
        "Language model error. Please try redownloading the language models.".to_string()
    } else if lower.contains("network") || lower.contains("download") {
        "Network error during model download. Please check your internet connection and try again.".to_string()
    } else if lower.contains("storage") || lower.contains("space") {
        "Insufficient storage space for language models. Please free up some space and try again.".to_string()
    } else {
        format!("Translation failed: {}", message)
    }
}

/// 离线翻译服务
#[derive(Clone)]
pub struct OfflineTranslationService {
    translator: Arc<dyn OnDeviceTranslator>,
    models: Arc<OfflineModelManager>,
}

impl OfflineTranslationService {
    pub fn new(translator: Arc<dyn OnDeviceTranslator>, models: Arc<OfflineModelManager>) -> Self {
        Self { translator, models }
    }

    pub fn model_manager(&self) -> &Arc<OfflineModelManager> {
        &self.models
    }

    /// 两种语言都受支持且模型均已下载时返回 `true`
    pub fn is_offline_translation_available(&self, source_lang: &str, target_lang: &str) -> bool {
        match (
            language::on_device_code(source_lang),
            language::on_device_code(target_lang),
        ) {
            (Some(source), Some(target)) => {
                self.models.is_language_model_downloaded(source)
                    && self.models.is_language_model_downloaded(target)
            }
            _ => false,
        }
    }

    /// 离线翻译
    pub async fn translate_offline<'a>(
        &self,
        text: impl Into<Option<&'a str>>,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult<String> {
        let text = match text.into() {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(TranslationError::InvalidInput("No text to translate".to_string())),
        };

        let (source, target) = match (
            language::on_device_code(source_lang),
            language::on_device_code(target_lang),
        ) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(TranslationError::UnsupportedLanguagePair {
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                })
            }
        };

        if !self.is_offline_translation_available(source, target) {
            return Err(TranslationError::ModelNotDownloaded(format!("{} -> {}", source, target)));
        }

        let error = match self.translator.translate(text, source, target).await {
            Ok(translated) => {
                tracing::debug!("离线翻译成功: {} -> {}", source, target);
                return Ok(translated);
            }
            Err(e) => e.to_string(),
        };

        if !is_dictionary_error(&error) {
            tracing::warn!("离线翻译失败: {}", error);
            return Err(TranslationError::OfflineEngineError(enhance_error_message(&error)));
        }

        tracing::warn!("词典加载失败，{:?} 后重试: {}", constants::DICTIONARY_RETRY_DELAY, error);
        tokio::time::sleep(constants::DICTIONARY_RETRY_DELAY).await;

        match self.translator.translate(text, source, target).await {
            Ok(translated) => {
                tracing::info!("重试后离线翻译成功");
                Ok(translated)
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("重试后离线翻译仍然失败: {}", error);
                Err(TranslationError::OfflineEngineError(enhance_error_message(&error)))
            }
        }
    }

    /// 离线翻译，结果通过回调 `(success, text, error)` 返回
    ///
    /// 当前线程不在 tokio 运行时中时直接以失败回调。
    pub fn translate_offline_with_callback<F>(
        &self,
        text: Option<String>,
        source_lang: String,
        target_lang: String,
        callback: F,
    ) where
        F: FnOnce(bool, Option<String>, Option<String>) + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let service = self.clone();
                handle.spawn(async move {
                    match service
                        .translate_offline(text.as_deref(), &source_lang, &target_lang)
                        .await
                    {
                        Ok(translated) => callback(true, Some(translated), None),
                        Err(e) => callback(false, None, Some(e.to_string())),
                    }
                });
            }
            Err(e) => {
                tracing::error!("没有可用的异步运行时: {}", e);
                callback(false, None, Some(format!("Internal error: no async runtime: {}", e)));
            }
        }
    }

    pub fn has_any_downloaded_models(&self) -> bool {
        self.models.has_any_downloaded_models()
    }

    pub fn get_detailed_model_status(&self) -> BTreeMap<String, String> {
        self.models.get_detailed_model_status()
    }

    pub fn supported_language_codes(&self) -> Vec<&'static str> {
        self.models.supported_language_codes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::models::{DownloadListener, ModelFetcher, ProgressSink};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct InstantFetcher;

    #[async_trait]
    impl ModelFetcher for InstantFetcher {
        async fn fetch(&self, _code: &str, _progress: ProgressSink) -> TranslationResult<()> {
            Ok(())
        }

        async fn delete(&self, _code: &str) -> TranslationResult<()> {
            Ok(())
        }

        async fn is_available(&self, _code: &str) -> TranslationResult<bool> {
            Ok(false)
        }
    }

    struct Quiet;

    impl DownloadListener for Quiet {
        fn on_progress(&self, _progress: u8) {}
        fn on_success(&self) {}
        fn on_error(&self, _error: String) {}
    }

    /// 前 `failures` 次调用返回给定错误
    struct Flaky {
        failures: usize,
        error: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OnDeviceTranslator for Flaky {
        async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> TranslationResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TranslationError::InternalError(self.error.to_string()))
            } else {
                Ok(format!("[{}] {}", target_lang, text))
            }
        }
    }

    async fn service(translator: Arc<Flaky>, downloaded: &[&str]) -> OfflineTranslationService {
        let models = Arc::new(OfflineModelManager::new(Arc::new(InstantFetcher)));
        for code in downloaded {
            models.download(code, Arc::new(Quiet)).await.unwrap();
        }
        OfflineTranslationService::new(translator, models)
    }

    fn flaky(failures: usize, error: &'static str) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            error,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_availability_requires_both_models() {
        let service = service(flaky(0, ""), &["es"]).await;

        assert!(!service.is_offline_translation_available("es", "en"));
        assert!(!service.is_offline_translation_available("es", "not-a-code"));
        assert!(!service.is_offline_translation_available("", "%%"));
        assert!(service.is_offline_translation_available("es-MX", "es"));
    }

    #[tokio::test]
    async fn test_translate_offline_errors() {
        let service = service(flaky(0, ""), &["es", "en"]).await;

        let err = service.translate_offline(None, "es", "en").await.unwrap_err();
        assert_eq!(err.to_string(), "No text to translate");

        let err = service.translate_offline("hola", "xx", "en").await.unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedLanguagePair { .. }));

        let err = service.translate_offline("hola", "es", "fr").await.unwrap_err();
        assert!(matches!(err, TranslationError::ModelNotDownloaded(_)));

        let translated = service.translate_offline("hola", "es", "en").await.unwrap();
        assert_eq!(translated, "[en] hola");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictionary_error_retried_once() {
        let translator = flaky(1, "Failed to load dictionary file");
        let service = service(translator.clone(), &["es", "en"]).await;

        let translated = service.translate_offline("hola", "es", "en").await.unwrap();
        assert_eq!(translated, "[en] hola");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_dictionary_error_enhanced() {
        let translator = flaky(5, "dictionary corrupt");
        let service = service(translator.clone(), &["es", "en"]).await;

        let err = service.translate_offline("hola", "es", "en").await.unwrap_err();
        assert!(err.to_string().starts_with("Dictionary files failed to load"));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let translator = flaky(1, "model missing");
        let service = service(translator.clone(), &["es", "en"]).await;

        let err = service.translate_offline("hola", "es", "en").await.unwrap_err();
        assert!(err.to_string().starts_with("Language model not found"));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enhance_error_message() {
        assert_eq!(enhance_error_message("  "), "Translation failed due to an unknown error");
        assert!(enhance_error_message("Model error 3").starts_with("Language model error"));
        assert!(enhance_error_message("network unreachable").starts_with("Network error"));
        assert!(enhance_error_message("no space left").starts_with("Insufficient storage"));
        assert_eq!(enhance_error_message("boom"), "Translation failed: boom");
    }

    #[tokio::test]
    async fn test_callback_variant() {
        let service = service(flaky(0, ""), &["es", "en"]).await;
        let (tx, rx) = tokio::sync::oneshot::channel();
        service.translate_offline_with_callback(
            Some("hola".to_string()),
            "es".to_string(),
            "en".to_string(),
            move |success, text, error| {
                let _ = tx.send((success, text, error));
            },
        );
        assert_eq!(rx.await.unwrap(), (true, Some("[en] hola".to_string()), None));
    }
}
