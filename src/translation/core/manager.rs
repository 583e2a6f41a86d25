//! 翻译编排器
//!
//! 单个请求的处理流程：
//!
//! 1. 空文本直接拒绝
//! 2. 按 `(text, 源语言或 auto, 目标语言)` 查询缓存
//! 3. 未提供源语言时检测语言，检测失败即终止（不猜测默认语言）
//! 4. 源语言与目标语言相同且未强制翻译时跳过
//! 5. 按策略选择离线或远程路径，首选路径失败时尝试后备路径
//! 6. 成功后写入缓存
//! 7. 每个回调式请求恰好回调一次
//!
//! 不同请求之间没有全局锁，共享状态只有缓存和模型状态表。

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::{Message, RecentMessages, SmsMessage};
use super::rate_limit::RateLimiter;
use super::stats::{ServiceStats, ServiceStatsSnapshot};
use crate::translation::config::TranslationConfig;
use crate::translation::detection::{LanguageDetectionService, LanguageIdentifier};
use crate::translation::error::{helpers, ErrorStats, TranslationError, TranslationResult};
use crate::translation::language;
use crate::translation::models::{OfflineModelManager, UnavailableModelFetcher};
use crate::translation::offline::{OfflineTranslationService, UnavailableOnDeviceTranslator};
use crate::translation::policy::{PreferenceStore, StaticPreferences, TranslationPath, TranslationPolicy};
use crate::translation::remote::{DisabledRemoteTranslator, RemoteTranslator};
use crate::translation::storage::{CacheConfig, TranslationCache};

// ============================================================================
// 请求与结果
// ============================================================================

/// 单次翻译请求
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationRequest {
    pub text: Option<String>,
    /// 未提供时自动检测
    pub source_lang: Option<String>,
    pub target_lang: String,
    /// 即使已是目标语言也执行翻译
    pub force: bool,
    /// 覆盖偏好中的策略
    pub policy: Option<TranslationPolicy>,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            target_lang: target_lang.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source_lang: impl Into<String>) -> Self {
        self.source_lang = Some(source_lang.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_policy(mut self, policy: TranslationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

/// 译文来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationOrigin {
    Cache,
    Offline,
    Remote,
}

impl From<TranslationPath> for TranslationOrigin {
    fn from(path: TranslationPath) -> Self {
        match path {
            TranslationPath::Offline => TranslationOrigin::Offline,
            TranslationPath::Remote => TranslationOrigin::Remote,
        }
    }
}

/// 翻译结果
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutcome {
    Translated {
        text: String,
        /// 缓存的 auto 分桶命中时未知
        source_lang: Option<String>,
        origin: TranslationOrigin,
    },
    /// 已是目标语言，未执行翻译（不算错误）
    AlreadyInTargetLanguage { language: String, message: String },
    Failed(TranslationError),
}

impl TranslationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TranslationOutcome::Translated { .. })
    }

    pub fn translated_text(&self) -> Option<&str> {
        match self {
            TranslationOutcome::Translated { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TranslationError> {
        match self {
            TranslationOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// 转换为回调参数 `(success, translated_text, error_message)`
    pub fn into_callback_args(self) -> (bool, Option<String>, Option<String>) {
        match self {
            TranslationOutcome::Translated { text, .. } => (true, Some(text), None),
            TranslationOutcome::AlreadyInTargetLanguage { message, .. } => (false, None, Some(message)),
            TranslationOutcome::Failed(err) => (false, None, Some(err.to_string())),
        }
    }
}

/// 翻译完成回调
///
/// 以值接收 `self`，每个请求只能回调一次。
pub trait TranslationCallback: Send + 'static {
    fn on_translation_complete(self, success: bool, translated_text: Option<String>, error_message: Option<String>);
}

impl<F> TranslationCallback for F
where
    F: FnOnce(bool, Option<String>, Option<String>) + Send + 'static,
{
    fn on_translation_complete(self, success: bool, translated_text: Option<String>, error_message: Option<String>) {
        self(success, translated_text, error_message)
    }
}

/// 进行中的翻译任务句柄
///
/// 丢弃句柄不会取消任务。
#[derive(Debug)]
pub struct TranslationTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TranslationTask {
    fn completed() -> Self {
        Self {
            token: CancellationToken::new(),
            handle: None,
        }
    }

    /// 取消任务；尚未回调时以 `Cancelled` 回调
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 回调是否已经执行
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// 等待回调执行完毕
    pub async fn wait(self) {
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                tracing::error!("翻译任务异常结束: {}", e);
            }
        }
    }
}

// ============================================================================
// 构建器
// ============================================================================

/// [`TranslationManager`] 构建器
///
/// 未提供的组件使用空实现：无远程凭据、无设备端引擎、默认缓存与偏好。
#[derive(Default)]
pub struct TranslationManagerBuilder {
    remote: Option<Arc<dyn RemoteTranslator>>,
    identifier: Option<Arc<dyn LanguageIdentifier>>,
    detection: Option<LanguageDetectionService>,
    offline: Option<OfflineTranslationService>,
    cache: Option<Arc<TranslationCache>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    rate_limiter: Option<RateLimiter>,
    remote_timeout: Option<Duration>,
    min_confidence: Option<f32>,
    runtime: Option<Handle>,
}

impl TranslationManagerBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteTranslator>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// 设备端语言检测器（未提供 `detection_service` 时使用）
    pub fn language_identifier(mut self, identifier: Arc<dyn LanguageIdentifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn detection_service(mut self, detection: LanguageDetectionService) -> Self {
        self.detection = Some(detection);
        self
    }

    pub fn offline_service(mut self, offline: OfflineTranslationService) -> Self {
        self.offline = Some(offline);
        self
    }

    pub fn cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = Some(timeout);
        self
    }

    /// 回调任务使用的运行时，未设置时使用构建时所在的运行时
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// 应用配置中的缓存、偏好、限流、超时和检测阈值
    pub fn with_config(mut self, config: &TranslationConfig) -> Self {
        if self.cache.is_none() {
            self.cache = Some(Arc::new(TranslationCache::with_config(CacheConfig::from(config))));
        }
        if self.preferences.is_none() {
            self.preferences = Some(Arc::new(StaticPreferences::from(config)));
        }
        if self.rate_limiter.is_none() {
            self.rate_limiter = RateLimiter::from_config(config);
        }
        if self.remote_timeout.is_none() {
            self.remote_timeout = config.remote_timeout();
        }
        self.min_confidence = Some(config.min_detection_confidence);
        self
    }

    pub fn build(self) -> TranslationManager {
        let remote = self
            .remote
            .unwrap_or_else(|| Arc::new(DisabledRemoteTranslator));

        // 配置中的检测阈值只用于构建器自行创建的检测服务
        let detection = match self.detection {
            Some(detection) => detection,
            None => {
                let detection = LanguageDetectionService::new(self.identifier, Arc::clone(&remote));
                if let Some(threshold) = self.min_confidence {
                    detection.set_min_confidence(threshold);
                }
                detection
            }
        };

        let offline = self.offline.unwrap_or_else(|| {
            OfflineTranslationService::new(
                Arc::new(UnavailableOnDeviceTranslator),
                Arc::new(OfflineModelManager::new(Arc::new(UnavailableModelFetcher))),
            )
        });

        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        if runtime.is_none() {
            tracing::debug!("构建时不在异步运行时中，回调任务将使用调用时的运行时");
        }

        TranslationManager {
            inner: Arc::new(ManagerInner {
                remote,
                detection,
                offline,
                cache: self.cache.unwrap_or_default(),
                preferences: self
                    .preferences
                    .unwrap_or_else(|| Arc::new(StaticPreferences::default())),
                rate_limiter: self.rate_limiter,
                remote_timeout: self.remote_timeout,
                runtime,
                stats: ServiceStats::default(),
                errors: Mutex::new(ErrorStats::default()),
                recent_sms: RecentMessages::default(),
            }),
        }
    }
}

// ============================================================================
// 编排器
// ============================================================================

struct ManagerInner {
    remote: Arc<dyn RemoteTranslator>,
    detection: LanguageDetectionService,
    offline: OfflineTranslationService,
    cache: Arc<TranslationCache>,
    preferences: Arc<dyn PreferenceStore>,
    rate_limiter: Option<RateLimiter>,
    remote_timeout: Option<Duration>,
    runtime: Option<Handle>,
    stats: ServiceStats,
    errors: Mutex<ErrorStats>,
    recent_sms: RecentMessages,
}

/// 翻译编排器，克隆开销很小（共享内部状态）
#[derive(Clone)]
pub struct TranslationManager {
    inner: Arc<ManagerInner>,
}

impl TranslationManager {
    pub fn builder() -> TranslationManagerBuilder {
        TranslationManagerBuilder::default()
    }

    // ------------------------------------------------------------------------
    // 回调式入口
    // ------------------------------------------------------------------------

    /// 翻译文本，源语言自动检测
    ///
    /// 立即返回，结果通过 `callback` 恰好回调一次。空文本在返回前就完成回调。
    pub fn translate_text<C: TranslationCallback>(
        &self,
        text: Option<&str>,
        target_lang: &str,
        callback: C,
        force: bool,
    ) -> TranslationTask {
        let request = TranslationRequest {
            text: text.map(str::to_string),
            target_lang: target_lang.to_string(),
            force,
            ..Default::default()
        };
        self.spawn_request(request, move |outcome| {
            let (success, text, error) = outcome.into_callback_args();
            callback.on_translation_complete(success, text, error);
        })
    }

    /// 指定源语言翻译文本
    pub fn translate_text_from<C: TranslationCallback>(
        &self,
        text: Option<&str>,
        source_lang: &str,
        target_lang: &str,
        callback: C,
        force: bool,
    ) -> TranslationTask {
        let request = TranslationRequest {
            text: text.map(str::to_string),
            source_lang: Some(source_lang.to_string()),
            target_lang: target_lang.to_string(),
            force,
            policy: None,
        };
        self.spawn_request(request, move |outcome| {
            let (success, text, error) = outcome.into_callback_args();
            callback.on_translation_complete(success, text, error);
        })
    }

    /// 翻译会话消息，回调参数为 `(success, 更新后的消息, error)`
    pub fn translate_message<F>(&self, message: Message, callback: F) -> TranslationTask
    where
        F: FnOnce(bool, Message, Option<String>) + Send + 'static,
    {
        let target = message.target_language(self.inner.preferences.as_ref());
        let request = TranslationRequest {
            text: message.body.clone(),
            target_lang: target.clone(),
            ..Default::default()
        };
        self.spawn_request(request, move |outcome| {
            let mut message = message;
            let (success, error) = apply_to_message(&mut message, outcome, &target);
            callback(success, message, error);
        })
    }

    /// 翻译收到的短信
    ///
    /// 自动翻译关闭或最近已翻译过同一条短信时直接以失败回调。
    pub fn translate_sms<F>(&self, sms: SmsMessage, callback: F) -> TranslationTask
    where
        F: FnOnce(bool, Option<SmsMessage>) + Send + 'static,
    {
        let Some(key) = sms.dedup_key() else {
            callback(false, None);
            return TranslationTask::completed();
        };

        if !self.inner.preferences.is_auto_translate_enabled() {
            tracing::debug!("自动翻译未开启，跳过短信");
            callback(false, None);
            return TranslationTask::completed();
        }

        if !self.inner.recent_sms.insert(key.clone()) {
            tracing::debug!("短信最近已翻译过，跳过: {}", sms.address);
            callback(false, None);
            return TranslationTask::completed();
        }

        let target = SmsMessage::target_language(self.inner.preferences.as_ref());
        let request = TranslationRequest {
            text: sms.body.clone(),
            target_lang: target.clone(),
            ..Default::default()
        };
        let manager = self.clone();
        self.spawn_request(request, move |outcome| match outcome {
            TranslationOutcome::Translated {
                text, source_lang, ..
            } => {
                let mut sms = sms;
                sms.apply_translation(text, source_lang, &target);
                callback(true, Some(sms));
            }
            TranslationOutcome::Failed(err) => {
                manager.inner.recent_sms.remove(&key);
                tracing::debug!("短信翻译失败，允许重试: {}", err);
                callback(false, None);
            }
            TranslationOutcome::AlreadyInTargetLanguage { .. } => callback(false, None),
        })
    }

    fn spawn_request<F>(&self, request: TranslationRequest, finish: F) -> TranslationTask
    where
        F: FnOnce(TranslationOutcome) + Send + 'static,
    {
        if !request.has_text() {
            let started = Instant::now();
            let outcome = self.finish(Self::no_text(), started);
            finish(outcome);
            return TranslationTask::completed();
        }

        let Some(runtime) = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            let err = TranslationError::InternalError("no async runtime available".to_string());
            self.record_failure(&err);
            finish(TranslationOutcome::Failed(err));
            return TranslationTask::completed();
        };

        let token = CancellationToken::new();
        let task_token = token.clone();
        let manager = self.clone();

        let handle = runtime.spawn(async move {
            let work = AssertUnwindSafe(manager.translate(request)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    tracing::info!("翻译请求已取消");
                    let err = TranslationError::Cancelled;
                    manager.record_failure(&err);
                    TranslationOutcome::Failed(err)
                }
                result = work => result.unwrap_or_else(|_| {
                    let err = TranslationError::InternalError("translation task panicked".to_string());
                    manager.record_failure(&err);
                    TranslationOutcome::Failed(err)
                }),
            };
            finish(outcome);
        });

        TranslationTask {
            token,
            handle: Some(handle),
        }
    }

    // ------------------------------------------------------------------------
    // async 入口
    // ------------------------------------------------------------------------

    /// 执行一次翻译
    pub async fn translate(&self, request: TranslationRequest) -> TranslationOutcome {
        let started = Instant::now();
        let outcome = self.run(request).await;
        self.finish(outcome, started)
    }

    /// 翻译消息并就地回填结果
    pub async fn translate_message_in_place(&self, message: &mut Message) -> TranslationOutcome {
        let target = message.target_language(self.inner.preferences.as_ref());
        let request = TranslationRequest {
            text: message.body.clone(),
            target_lang: target.clone(),
            ..Default::default()
        };
        let outcome = self.translate(request).await;
        apply_to_message(message, outcome.clone(), &target);
        outcome
    }

    fn no_text() -> TranslationOutcome {
        TranslationOutcome::Failed(TranslationError::InvalidInput(
            "No text to translate".to_string(),
        ))
    }

    async fn run(&self, request: TranslationRequest) -> TranslationOutcome {
        let text = match request.text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Self::no_text(),
        };
        let Some(target) = language::normalize(&request.target_lang) else {
            return TranslationOutcome::Failed(TranslationError::InvalidInput(
                "No target language".to_string(),
            ));
        };
        let supplied_source = request.source_lang.as_deref().and_then(language::normalize);

        let bucket = supplied_source.as_deref().unwrap_or(language::AUTO);
        if let Some(cached) = self.cached(text, bucket, &target) {
            return TranslationOutcome::Translated {
                text: cached,
                source_lang: supplied_source,
                origin: TranslationOrigin::Cache,
            };
        }

        let (source, detected) = match supplied_source {
            Some(source) => (source, false),
            None => {
                self.inner.stats.inc_detections();
                let detection = self.inner.detection.detect(text).await;
                match detection.language_code {
                    Some(code) if detection.is_success() => {
                        tracing::debug!("检测到源语言 {} ({:?})", code, detection.method);
                        (code, true)
                    }
                    _ => return TranslationOutcome::Failed(TranslationError::DetectionFailed),
                }
            }
        };

        if detected {
            if let Some(cached) = self.cached(text, &source, &target) {
                return TranslationOutcome::Translated {
                    text: cached,
                    source_lang: Some(source),
                    origin: TranslationOrigin::Cache,
                };
            }
        }

        if !request.force && language::same_language(&source, &target) {
            let message = format!(
                "Text is already in {} ({})",
                language::display_name(&source),
                source
            );
            tracing::debug!("{}", message);
            return TranslationOutcome::AlreadyInTargetLanguage {
                language: source,
                message,
            };
        }

        let policy = request
            .policy
            .unwrap_or_else(|| self.inner.preferences.policy());
        let offline_available = self
            .inner
            .offline
            .is_offline_translation_available(&source, &target);
        let plan = policy.plan(offline_available, self.inner.remote.has_api_key());
        tracing::debug!(
            "翻译路径 {:?} (模式 {}, 离线可用 {})",
            plan,
            policy.mode,
            offline_available
        );

        if plan.is_empty() {
            return TranslationOutcome::Failed(policy.unavailable_error());
        }

        let mut last_error = None;
        for path in plan {
            match self.translate_via(path, text, &source, &target).await {
                Ok(translated) => {
                    self.inner.stats.inc_translations(path);
                    // 同语言结果只来自强制翻译，不写缓存，未强制的请求仍需得到同语言提示
                    if !language::same_language(&source, &target) {
                        self.inner.cache.put(text, &source, &target, &translated);
                        if detected {
                            self.inner.cache.put(text, language::AUTO, &target, &translated);
                        }
                    }
                    tracing::info!("翻译完成 {} -> {} ({:?})", source, target, path);
                    return TranslationOutcome::Translated {
                        text: translated,
                        source_lang: Some(source),
                        origin: path.into(),
                    };
                }
                Err(e) => {
                    tracing::warn!("{:?} 翻译失败: {}", path, e);
                    last_error = Some(e);
                }
            }
        }

        TranslationOutcome::Failed(last_error.unwrap_or_else(|| policy.unavailable_error()))
    }

    async fn translate_via(
        &self,
        path: TranslationPath,
        text: &str,
        source: &str,
        target: &str,
    ) -> TranslationResult<String> {
        match path {
            TranslationPath::Offline => {
                self.inner
                    .offline
                    .translate_offline(text, source, target)
                    .await
            }
            TranslationPath::Remote => {
                let permit = match &self.inner.rate_limiter {
                    Some(limiter) => Some(limiter.acquire()?),
                    None => None,
                };

                let call = self.inner.remote.translate(text, Some(source), target);
                let translated = match self.inner.remote_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| {
                        TranslationError::TimeoutError(format!(
                            "remote translation did not finish within {:?}",
                            timeout
                        ))
                    })??,
                    None => call.await?,
                };

                if let Some(permit) = permit {
                    permit.commit();
                }
                Ok(translated)
            }
        }
    }

    fn cached(&self, text: &str, source: &str, target: &str) -> Option<String> {
        match self.inner.cache.get(text, source, target) {
            Some(hit) => {
                tracing::debug!("缓存命中 ({} -> {})", source, target);
                self.inner.stats.inc_cache_hits();
                Some(hit)
            }
            None => {
                self.inner.stats.inc_cache_misses();
                None
            }
        }
    }

    fn finish(&self, outcome: TranslationOutcome, started: Instant) -> TranslationOutcome {
        self.inner.stats.inc_requests();
        self.inner.stats.add_processing_time(started.elapsed());
        match &outcome {
            TranslationOutcome::Failed(err) => self.record_failure(err),
            TranslationOutcome::AlreadyInTargetLanguage { .. } => {
                self.inner.stats.inc_same_language_skips()
            }
            TranslationOutcome::Translated { .. } => {}
        }
        outcome
    }

    fn record_failure(&self, err: &TranslationError) {
        helpers::log(err);
        self.inner.stats.inc_failures();
        self.errors().record_error(err);
    }

    fn errors(&self) -> MutexGuard<'_, ErrorStats> {
        self.inner
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------------
    // 查询与维护
    // ------------------------------------------------------------------------

    /// 只查缓存，不翻译
    pub fn cached_translation(&self, text: &str, source_lang: Option<&str>, target_lang: &str) -> Option<String> {
        self.inner
            .cache
            .get(text, source_lang.unwrap_or(language::AUTO), target_lang)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        tracing::info!("翻译缓存已清空");
    }

    pub fn cache_statistics(&self) -> String {
        self.inner.cache.statistics()
    }

    pub fn stats(&self) -> ServiceStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.errors().clone()
    }

    pub fn language_name(&self, code: &str) -> String {
        language::display_name(code)
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.inner.cache
    }

    pub fn detection_service(&self) -> &LanguageDetectionService {
        &self.inner.detection
    }

    pub fn offline_service(&self) -> &OfflineTranslationService {
        &self.inner.offline
    }

    pub fn model_manager(&self) -> &Arc<OfflineModelManager> {
        self.inner.offline.model_manager()
    }

    pub fn preferences(&self) -> &Arc<dyn PreferenceStore> {
        &self.inner.preferences
    }

    pub fn has_remote_translation(&self) -> bool {
        self.inner.remote.has_api_key()
    }
}

fn apply_to_message(message: &mut Message, outcome: TranslationOutcome, target: &str) -> (bool, Option<String>) {
    match outcome {
        TranslationOutcome::Translated {
            text, source_lang, ..
        } => {
            message.apply_translation(text, source_lang, target);
            (true, None)
        }
        TranslationOutcome::AlreadyInTargetLanguage { language, message: text } => {
            message.original_language = Some(language);
            (false, Some(text))
        }
        TranslationOutcome::Failed(err) => (false, Some(err.to_string())),
    }
}
