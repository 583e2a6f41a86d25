// 集成测试公共模块
//
// 提供各个能力端口的模拟实现和测试环境构建

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use message_translator::translation::{
    DownloadListener, LanguageCandidate, LanguageIdentifier, ModelFetcher, OfflineModelManager,
    OfflineTranslationService, OnDeviceTranslator, ProgressSink, RemoteTranslator,
    StaticPreferences, TranslationCache, TranslationError, TranslationManager, TranslationMode,
    TranslationResult,
};

// ============================================================================
// 语言检测
// ============================================================================

/// 返回固定候选的设备端检测器
pub struct MockIdentifier {
    candidates: Vec<LanguageCandidate>,
    pub calls: AtomicUsize,
}

impl MockIdentifier {
    pub fn new(language: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            candidates: vec![LanguageCandidate::new(language, confidence)],
            calls: AtomicUsize::new(0),
        })
    }

    /// 无法确定语言
    pub fn undetermined() -> Arc<Self> {
        Self::new("und", 1.0)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageIdentifier for MockIdentifier {
    async fn identify(&self, _text: &str) -> TranslationResult<Vec<LanguageCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.candidates.clone())
    }
}

// ============================================================================
// 远程服务
// ============================================================================

/// 可编程的远程翻译服务
///
/// 未登记的文本返回 `[目标语言] 原文`。
pub struct MockRemote {
    has_key: bool,
    responses: Mutex<HashMap<(String, String), String>>,
    detected: Mutex<Option<String>>,
    failure: Mutex<Option<TranslationError>>,
    /// 设置后翻译调用一直挂起
    hang: bool,
    /// 每次翻译调用的延迟
    delay: Option<Duration>,
    pub translate_calls: AtomicUsize,
    pub detect_calls: AtomicUsize,
    pub last_source: Mutex<Option<String>>,
}

impl MockRemote {
    pub fn new(has_key: bool) -> Arc<Self> {
        Arc::new(Self::build(has_key, false))
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self::build(true, true))
    }

    /// 每次翻译调用前等待 `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::build(true, false)
        })
    }

    fn build(has_key: bool, hang: bool) -> Self {
        Self {
            has_key,
            responses: Mutex::new(HashMap::new()),
            detected: Mutex::new(None),
            failure: Mutex::new(None),
            hang,
            delay: None,
            translate_calls: AtomicUsize::new(0),
            detect_calls: AtomicUsize::new(0),
            last_source: Mutex::new(None),
        }
    }

    pub fn respond(&self, text: &str, target: &str, translated: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert((text.to_string(), target.to_string()), translated.to_string());
    }

    pub fn detect_as(&self, language: &str) {
        *self.detected.lock().unwrap() = Some(language.to_string());
    }

    pub fn fail_with(&self, error: TranslationError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTranslator for MockRemote {
    fn has_api_key(&self) -> bool {
        self.has_key
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> TranslationResult<String> {
        if !self.has_key {
            return Err(TranslationError::ServiceUnavailable(
                "no API key configured".to_string(),
            ));
        }
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_source.lock().unwrap() = source_lang.map(str::to_string);

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }

        let key = (text.to_string(), target_lang.to_string());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target_lang, text)))
    }

    async fn detect_language(&self, _text: &str) -> TranslationResult<String> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.detected
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TranslationError::TranslationServiceError("no detection".to_string()))
    }
}

// ============================================================================
// 设备端翻译与模型获取
// ============================================================================

/// 设备端翻译引擎，返回 `[offline:目标语言] 原文`
#[derive(Default)]
pub struct MockOnDevice {
    failure: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl MockOnDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnDeviceTranslator for MockOnDevice {
    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> TranslationResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(TranslationError::OfflineEngineError(message)),
            None => Ok(format!("[offline:{}] {}", target_lang, text)),
        }
    }
}

/// 按脚本上报进度的模型获取
pub struct ScriptedFetcher {
    steps: Vec<u32>,
    size: Option<u64>,
    failure: Mutex<Option<String>>,
    verified: bool,
    gate: Option<Arc<Notify>>,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(steps: &[u32]) -> Self {
        Self {
            steps: steps.to_vec(),
            size: None,
            failure: Mutex::new(None),
            verified: true,
            gate: None,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn failing(self, message: &str) -> Self {
        *self.failure.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn unverified(mut self) -> Self {
        self.verified = false;
        self
    }

    /// 上报完进度后等待 `gate` 通知再结束
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

#[async_trait]
impl ModelFetcher for ScriptedFetcher {
    async fn fetch(&self, _code: &str, progress: ProgressSink) -> TranslationResult<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        for step in &self.steps {
            progress.report(*step);
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(TranslationError::NetworkError(message)),
            None => Ok(()),
        }
    }

    async fn verify(&self, _code: &str) -> TranslationResult<bool> {
        Ok(self.verified)
    }

    async fn delete(&self, _code: &str) -> TranslationResult<()> {
        Ok(())
    }

    async fn is_available(&self, _code: &str) -> TranslationResult<bool> {
        Ok(false)
    }

    async fn model_size(&self, _code: &str) -> Option<u64> {
        self.size
    }
}

// ============================================================================
// 下载监听
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Progress(u8),
    Success,
    Error(String),
}

/// 记录所有回调的监听器
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ListenerEvent::Progress(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ListenerEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.events().contains(&ListenerEvent::Success)
    }
}

impl DownloadListener for RecordingListener {
    fn on_progress(&self, progress: u8) {
        self.events.lock().unwrap().push(ListenerEvent::Progress(progress));
    }

    fn on_success(&self) {
        self.events.lock().unwrap().push(ListenerEvent::Success);
    }

    fn on_error(&self, error: String) {
        self.events.lock().unwrap().push(ListenerEvent::Error(error));
    }
}

/// 断言进度单调不减，且 100 出现在成功回调之前
pub fn assert_progress_contract(events: &[ListenerEvent]) {
    let mut last = None;
    let mut saw_hundred = false;
    for event in events {
        match event {
            ListenerEvent::Progress(value) => {
                if let Some(previous) = last {
                    assert!(*value >= previous, "进度回退: {} -> {}", previous, value);
                }
                last = Some(*value);
                saw_hundred |= *value == 100;
            }
            ListenerEvent::Success => assert!(saw_hundred, "成功回调前没有收到 100"),
            ListenerEvent::Error(_) => {}
        }
    }
}

// ============================================================================
// 测试环境
// ============================================================================

/// 回调结果
pub type CallbackResult = (bool, Option<String>, Option<String>);

/// 返回可交给翻译入口的回调，以及接收结果的通道
pub fn capture() -> (
    impl FnOnce(bool, Option<String>, Option<String>) + Send + 'static,
    oneshot::Receiver<CallbackResult>,
) {
    let (tx, rx) = oneshot::channel();
    let callback = move |success: bool, text: Option<String>, error: Option<String>| {
        let _ = tx.send((success, text, error));
    };
    (callback, rx)
}

/// 等待回调，超时视为回调丢失
pub async fn received(rx: oneshot::Receiver<CallbackResult>) -> CallbackResult {
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("回调超时")
        .expect("回调未执行")
}

/// 完整的测试环境
pub struct TestEnvironment {
    pub manager: TranslationManager,
    pub remote: Arc<MockRemote>,
    pub identifier: Option<Arc<MockIdentifier>>,
    pub on_device: Arc<MockOnDevice>,
    pub models: Arc<OfflineModelManager>,
    pub cache: Arc<TranslationCache>,
}

/// 测试环境构建器
pub struct TestEnvironmentBuilder {
    remote: Arc<MockRemote>,
    identifier: Option<Arc<MockIdentifier>>,
    preferences: StaticPreferences,
    downloaded: Vec<&'static str>,
}

impl TestEnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            remote: MockRemote::new(true),
            identifier: None,
            preferences: StaticPreferences::default(),
            downloaded: Vec::new(),
        }
    }

    pub fn remote(mut self, remote: Arc<MockRemote>) -> Self {
        self.remote = remote;
        self
    }

    pub fn detects(mut self, language: &str, confidence: f32) -> Self {
        self.identifier = Some(MockIdentifier::new(language, confidence));
        self
    }

    pub fn identifier(mut self, identifier: Arc<MockIdentifier>) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn mode(mut self, mode: TranslationMode, offline_enabled: bool) -> Self {
        self.preferences.mode = mode;
        self.preferences.offline_enabled = offline_enabled;
        self
    }

    pub fn preferences(mut self, preferences: StaticPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn downloaded(mut self, codes: &[&'static str]) -> Self {
        self.downloaded.extend_from_slice(codes);
        self
    }

    pub async fn build(self) -> TestEnvironment {
        let models = Arc::new(OfflineModelManager::new(Arc::new(ScriptedFetcher::new(&[100]))));
        for code in &self.downloaded {
            models
                .download(code, RecordingListener::new())
                .await
                .expect("模型下载失败");
        }

        let on_device = MockOnDevice::new();
        let cache = Arc::new(TranslationCache::new());

        let mut builder = TranslationManager::builder()
            .remote(self.remote.clone())
            .offline_service(OfflineTranslationService::new(on_device.clone(), models.clone()))
            .cache(cache.clone())
            .preferences(Arc::new(self.preferences));
        if let Some(identifier) = &self.identifier {
            builder = builder.language_identifier(identifier.clone());
        }

        TestEnvironment {
            manager: builder.build(),
            remote: self.remote,
            identifier: self.identifier,
            on_device,
            models,
            cache,
        }
    }
}
