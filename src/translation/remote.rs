//! 远程翻译服务
//!
//! 编排器通过 [`RemoteTranslator`] 使用联网翻译和语言检测能力。
//! 实现必须在没有凭据时安全返回 `ServiceUnavailable`，而不是尝试发起请求。

use async_trait::async_trait;

use crate::translation::error::{TranslationError, TranslationResult};

/// 远程翻译/检测能力
#[async_trait]
pub trait RemoteTranslator: Send + Sync {
    /// 是否持有凭据（不发起网络请求）
    fn has_api_key(&self) -> bool;

    /// 翻译文本
    ///
    /// # 参数
    ///
    /// * `source_lang` - 源语言，`None` 时由服务端自动识别
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> TranslationResult<String>;

    /// 检测语言，返回语言代码
    async fn detect_language(&self, text: &str) -> TranslationResult<String>;
}

fn missing_credentials() -> TranslationError {
    TranslationError::ServiceUnavailable("no API key configured".to_string())
}

/// 未配置远程服务时使用的空实现
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRemoteTranslator;

#[async_trait]
impl RemoteTranslator for DisabledRemoteTranslator {
    fn has_api_key(&self) -> bool {
        false
    }

    async fn translate(
        &self,
        _text: &str,
        _source_lang: Option<&str>,
        _target_lang: &str,
    ) -> TranslationResult<String> {
        Err(missing_credentials())
    }

    async fn detect_language(&self, _text: &str) -> TranslationResult<String> {
        Err(missing_credentials())
    }
}

#[cfg(feature = "google")]
pub use google::GoogleTranslationClient;

#[cfg(feature = "google")]
mod google {
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::{missing_credentials, RemoteTranslator};
    use crate::translation::config::{constants, TranslationConfig};
    use crate::translation::error::{TranslationError, TranslationResult};

    /// Google Cloud Translation v2 客户端
    pub struct GoogleTranslationClient {
        client: reqwest::Client,
        api_key: Option<String>,
        api_url: String,
    }

    #[derive(Serialize)]
    struct TranslateRequest<'a> {
        q: &'a str,
        target: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<&'a str>,
        format: &'static str,
    }

    #[derive(Serialize)]
    struct DetectRequest<'a> {
        q: &'a str,
    }

    #[derive(Deserialize)]
    struct Envelope<T> {
        data: T,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Translation {
        translated_text: String,
    }

    #[derive(Deserialize)]
    struct TranslationsData {
        translations: Vec<Translation>,
    }

    #[derive(Deserialize)]
    struct Detection {
        language: String,
    }

    #[derive(Deserialize)]
    struct DetectionsData {
        detections: Vec<Vec<Detection>>,
    }

    #[derive(Deserialize)]
    struct ApiErrorBody {
        error: ApiErrorDetail,
    }

    #[derive(Deserialize)]
    struct ApiErrorDetail {
        message: String,
    }

    impl GoogleTranslationClient {
        pub fn new(api_key: Option<String>) -> Self {
            Self::with_client(
                reqwest::Client::new(),
                api_key,
                constants::DEFAULT_API_URL.to_string(),
            )
        }

        /// 复用已有的 [`reqwest::Client`]
        pub fn with_client(client: reqwest::Client, api_key: Option<String>, api_url: String) -> Self {
            let api_key = api_key.filter(|key| !key.trim().is_empty());
            Self {
                client,
                api_key,
                api_url: api_url.trim_end_matches('/').to_string(),
            }
        }

        /// 按配置构造，配置了超时则设置到 HTTP 客户端
        pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
            let mut builder = reqwest::Client::builder();
            if let Some(timeout) = config.remote_timeout() {
                builder = builder.timeout(timeout);
            }
            let client = builder.build()?;

            Ok(Self::with_client(
                client,
                config.api_key.clone(),
                config.api_url.clone(),
            ))
        }

        fn key(&self) -> TranslationResult<&str> {
            self.api_key.as_deref().ok_or_else(missing_credentials)
        }

        async fn post<B: Serialize + Sync, T: serde::de::DeserializeOwned>(
            &self,
            url: String,
            body: &B,
        ) -> TranslationResult<T> {
            let response = self
                .client
                .post(url)
                .query(&[("key", self.key()?)])
                .json(body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                let message = serde_json::from_str::<ApiErrorBody>(&body)
                    .map(|parsed| parsed.error.message)
                    .unwrap_or(body);
                return Err(TranslationError::TranslationServiceError(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    message
                )));
            }

            Ok(response.json::<T>().await?)
        }
    }

    #[async_trait]
    impl RemoteTranslator for GoogleTranslationClient {
        fn has_api_key(&self) -> bool {
            self.api_key.is_some()
        }

        async fn translate(
            &self,
            text: &str,
            source_lang: Option<&str>,
            target_lang: &str,
        ) -> TranslationResult<String> {
            let request = TranslateRequest {
                q: text,
                target: target_lang,
                source: source_lang,
                format: "text",
            };

            let envelope: Envelope<TranslationsData> =
                self.post(self.api_url.clone(), &request).await?;

            envelope
                .data
                .translations
                .into_iter()
                .next()
                .map(|t| t.translated_text)
                .ok_or_else(|| {
                    TranslationError::TranslationServiceError(
                        "response contained no translations".to_string(),
                    )
                })
        }

        async fn detect_language(&self, text: &str) -> TranslationResult<String> {
            let envelope: Envelope<DetectionsData> = self
                .post(format!("{}/detect", self.api_url), &DetectRequest { q: text })
                .await?;

            envelope
                .data
                .detections
                .into_iter()
                .next()
                .and_then(|candidates| candidates.into_iter().next())
                .map(|d| d.language)
                .ok_or_else(|| {
                    TranslationError::TranslationServiceError(
                        "response contained no detections".to_string(),
                    )
                })
        }
    }

}
