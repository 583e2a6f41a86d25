//! 离线模型管理
//!
//! 按语言跟踪设备端翻译模型的状态并驱动下载流程：
//!
//! ```text
//! NotDownloaded -> Downloading -> Downloaded
//!                  Downloading -> Error -> NotDownloaded（可重试）
//! Downloaded -> NotDownloaded（删除）
//! ```
//!
//! 模型状态表使用 `DashMap`，监听器回调从不在持有表锁时调用。
//! 实际的模型获取由 [`ModelFetcher`] 提供。

pub mod progress;
pub mod registry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::language::{self, CatalogEntry};

pub use progress::{DownloadListener, ProgressSink, ProgressTracker};
pub use registry::ModelRegistry;

// ============================================================================
// 模型类型
// ============================================================================

/// 模型状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    NotDownloaded,
    Downloading,
    Downloaded,
    Error,
}

impl ModelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::NotDownloaded => "not_downloaded",
            ModelState::Downloading => "downloading",
            ModelState::Downloaded => "downloaded",
            ModelState::Error => "error",
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个语言模型的快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageModel {
    pub code: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub state: ModelState,
    /// 0..=100，下载期间单调不减
    pub progress: u8,
    /// 获取后是否通过校验
    pub verified: bool,
    pub last_error: Option<String>,
}

impl LanguageModel {
    fn from_catalog(entry: &CatalogEntry) -> Self {
        Self {
            code: entry.code.to_string(),
            display_name: entry.name.to_string(),
            size_bytes: entry.size_bytes(),
            state: ModelState::NotDownloaded,
            progress: 0,
            verified: false,
            last_error: None,
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.state == ModelState::Downloading
    }

    pub fn is_downloaded(&self) -> bool {
        self.state == ModelState::Downloaded
    }

    pub fn formatted_size(&self) -> String {
        language::format_size(self.size_bytes)
    }

    /// 状态描述，例如 `downloaded (verified)`
    pub fn status_text(&self) -> String {
        let mut text = self.state.as_str().to_string();
        if self.verified {
            text.push_str(" (verified)");
        }
        if let Some(error) = &self.last_error {
            text.push_str(" - ");
            text.push_str(error);
        }
        text
    }
}

// ============================================================================
// 模型获取能力
// ============================================================================

/// 设备端模型的获取、校验与删除
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// 下载模型，过程中通过 `progress` 上报进度
    async fn fetch(&self, code: &str, progress: ProgressSink) -> TranslationResult<()>;

    /// 下载后的校验
    async fn verify(&self, _code: &str) -> TranslationResult<bool> {
        Ok(true)
    }

    async fn delete(&self, code: &str) -> TranslationResult<()>;

    /// 后端是否已有该模型
    async fn is_available(&self, code: &str) -> TranslationResult<bool>;

    /// 后端报告的模型大小
    async fn model_size(&self, _code: &str) -> Option<u64> {
        None
    }
}

/// 没有设备端模型后端时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableModelFetcher;

#[async_trait]
impl ModelFetcher for UnavailableModelFetcher {
    async fn fetch(&self, _code: &str, _progress: ProgressSink) -> TranslationResult<()> {
        Err(TranslationError::ServiceUnavailable(
            "no on-device model backend".to_string(),
        ))
    }

    async fn delete(&self, _code: &str) -> TranslationResult<()> {
        Ok(())
    }

    async fn is_available(&self, _code: &str) -> TranslationResult<bool> {
        Ok(false)
    }
}

// ============================================================================
// 模型管理器
// ============================================================================

/// 离线模型管理器
pub struct OfflineModelManager {
    models: Arc<DashMap<String, LanguageModel>>,
    downloads: DashMap<String, CancellationToken>,
    fetcher: Arc<dyn ModelFetcher>,
    registry: Option<ModelRegistry>,
}

impl OfflineModelManager {
    pub fn new(fetcher: Arc<dyn ModelFetcher>) -> Self {
        Self {
            models: Arc::new(DashMap::new()),
            downloads: DashMap::new(),
            fetcher,
            registry: None,
        }
    }

    /// 使用登记文件恢复已下载模型，读取失败时记录警告并从空状态开始
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        match registry.load() {
            Ok(codes) => {
                for code in codes {
                    if let Some(entry) = language::on_device_code(&code).and_then(language::catalog_entry) {
                        let mut model = LanguageModel::from_catalog(entry);
                        model.state = ModelState::Downloaded;
                        model.progress = 100;
                        self.models.insert(entry.code.to_string(), model);
                    }
                }
                tracing::info!(
                    "从 {} 恢复了 {} 个已下载模型",
                    registry.path().display(),
                    self.models.len()
                );
            }
            Err(e) => tracing::warn!("读取模型登记失败: {}", e),
        }
        self.registry = Some(registry);
        self
    }

    // ------------------------------------------------------------------------
    // 查询（不会报错）
    // ------------------------------------------------------------------------

    /// 模型快照，不支持的代码返回 `None`
    pub fn model(&self, code: &str) -> Option<LanguageModel> {
        let canonical = language::on_device_code(code)?;
        if let Some(model) = self.models.get(canonical) {
            return Some(model.clone());
        }
        language::catalog_entry(canonical).map(LanguageModel::from_catalog)
    }

    fn state_of(&self, code: &str) -> Option<ModelState> {
        let canonical = language::on_device_code(code)?;
        self.models.get(canonical).map(|model| model.state)
    }

    pub fn is_language_model_downloaded(&self, code: &str) -> bool {
        self.state_of(code) == Some(ModelState::Downloaded)
    }

    pub fn is_downloading(&self, code: &str) -> bool {
        self.state_of(code) == Some(ModelState::Downloading)
    }

    pub fn has_any_downloaded_models(&self) -> bool {
        self.models
            .iter()
            .any(|model| model.state == ModelState::Downloaded)
    }

    /// 已下载的语言代码（排序）
    pub fn downloaded_languages(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .models
            .iter()
            .filter(|model| model.state == ModelState::Downloaded)
            .map(|model| model.code.clone())
            .collect();
        codes.sort();
        codes
    }

    /// 目录中的全部模型及其当前状态
    pub fn available_models(&self) -> Vec<LanguageModel> {
        language::MODEL_CATALOG
            .iter()
            .map(|entry| {
                self.models
                    .get(entry.code)
                    .map(|model| model.clone())
                    .unwrap_or_else(|| LanguageModel::from_catalog(entry))
            })
            .collect()
    }

    pub fn supported_language_codes(&self) -> Vec<&'static str> {
        language::MODEL_CATALOG.iter().map(|entry| entry.code).collect()
    }

    /// 每个目录语言的状态描述
    pub fn get_detailed_model_status(&self) -> BTreeMap<String, String> {
        self.available_models()
            .into_iter()
            .map(|model| (model.code.clone(), model.status_text()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // 下载
    // ------------------------------------------------------------------------

    /// 在后台下载模型
    ///
    /// 已在下载、已下载或不支持的语言会被拒绝：监听器收到 `on_error`，
    /// 同时返回错误。
    pub fn download_model(
        self: &Arc<Self>,
        code: &str,
        listener: Arc<dyn DownloadListener>,
    ) -> TranslationResult<JoinHandle<TranslationResult<()>>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let err = TranslationError::InternalError(format!("no async runtime: {}", e));
                listener.on_error(err.to_string());
                return Err(err);
            }
        };

        let (canonical, token) = self.begin(code, listener.as_ref())?;
        let manager = Arc::clone(self);
        Ok(handle.spawn(async move { manager.run(canonical, token, listener).await }))
    }

    /// 在当前任务中下载模型，完成或失败后返回
    pub async fn download(
        &self,
        code: &str,
        listener: Arc<dyn DownloadListener>,
    ) -> TranslationResult<()> {
        let (canonical, token) = self.begin(code, listener.as_ref())?;
        self.run(canonical, token, listener).await
    }

    /// 取消进行中的下载，没有对应下载时返回 `false`
    pub fn cancel_download(&self, code: &str) -> bool {
        let Some(canonical) = language::on_device_code(code) else {
            return false;
        };
        match self.downloads.get(canonical) {
            Some(token) => {
                token.cancel();
                tracing::info!("取消模型下载: {}", canonical);
                true
            }
            None => false,
        }
    }

    fn begin(
        &self,
        code: &str,
        listener: &dyn DownloadListener,
    ) -> TranslationResult<(&'static str, CancellationToken)> {
        let result = self.try_begin(code);
        if let Err(e) = &result {
            tracing::info!("拒绝下载 {}: {}", code, e);
            listener.on_error(e.to_string());
        }
        result
    }

    fn try_begin(&self, code: &str) -> TranslationResult<(&'static str, CancellationToken)> {
        let entry = language::on_device_code(code)
            .and_then(language::catalog_entry)
            .ok_or_else(|| TranslationError::UnsupportedLanguage(code.trim().to_string()))?;

        {
            let mut model = self
                .models
                .entry(entry.code.to_string())
                .or_insert_with(|| LanguageModel::from_catalog(entry));

            match model.state {
                ModelState::Downloading => {
                    return Err(TranslationError::InvalidModelState(
                        "Model already downloading".to_string(),
                    ))
                }
                ModelState::Downloaded => {
                    return Err(TranslationError::InvalidModelState(
                        "Model already downloaded".to_string(),
                    ))
                }
                ModelState::NotDownloaded | ModelState::Error => {}
            }

            model.state = ModelState::Downloading;
            model.progress = 0;
            model.verified = false;
            model.last_error = None;
        }

        let token = CancellationToken::new();
        self.downloads.insert(entry.code.to_string(), token.clone());
        Ok((entry.code, token))
    }

    async fn run(
        &self,
        code: &'static str,
        token: CancellationToken,
        listener: Arc<dyn DownloadListener>,
    ) -> TranslationResult<()> {
        if let Some(size) = self.fetcher.model_size(code).await {
            self.update(code, |model| model.size_bytes = size);
        }

        let models = Arc::clone(&self.models);
        let tracker = Arc::new(ProgressTracker::new(
            Arc::clone(&listener),
            Box::new(move |value| {
                if let Some(mut model) = models.get_mut(code) {
                    if model.state == ModelState::Downloading {
                        model.progress = value;
                    }
                }
            }),
        ));

        tracing::info!("开始下载模型: {}", code);
        tracker.report(0);

        let fetch = AssertUnwindSafe(self.fetch_and_verify(code, ProgressSink::new(Arc::clone(&tracker))))
            .catch_unwind();
        let outcome = tokio::select! {
            result = fetch => match result {
                Ok(result) => result,
                Err(_) => Err(TranslationError::DownloadFailed("model fetcher panicked".to_string())),
            },
            _ = token.cancelled() => Err(TranslationError::Cancelled),
        };
        self.downloads.remove(code);

        match outcome {
            Ok(()) => {
                tracker.finish();
                self.update(code, |model| {
                    model.state = ModelState::Downloaded;
                    model.progress = 100;
                    model.verified = true;
                    model.last_error = None;
                });
                self.persist();
                tracing::info!("模型下载完成: {}", code);
                listener.on_success();
                Ok(())
            }
            Err(e) => {
                tracker.close();
                let err = match e {
                    TranslationError::DownloadFailed(_) | TranslationError::Cancelled => e,
                    other => TranslationError::DownloadFailed(other.to_string()),
                };
                let message = err.to_string();

                self.update(code, |model| {
                    model.state = ModelState::Error;
                    model.last_error = Some(message.clone());
                });
                tracing::warn!("模型下载失败 {}: {}", code, message);
                listener.on_error(message);

                // 监听器可能已在回调中重新发起下载
                self.update(code, |model| {
                    if model.state == ModelState::Error {
                        model.state = ModelState::NotDownloaded;
                        model.progress = 0;
                    }
                });
                Err(err)
            }
        }
    }

    async fn fetch_and_verify(&self, code: &str, sink: ProgressSink) -> TranslationResult<()> {
        self.fetcher.fetch(code, sink).await?;
        if !self.fetcher.verify(code).await? {
            return Err(TranslationError::DownloadFailed(
                "model verification failed".to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // 删除与同步
    // ------------------------------------------------------------------------

    /// 删除已下载模型，只允许从 `Downloaded` 状态删除
    pub async fn delete_model(&self, code: &str) -> TranslationResult<()> {
        let canonical = language::on_device_code(code)
            .ok_or_else(|| TranslationError::UnsupportedLanguage(code.trim().to_string()))?;

        if self.state_of(canonical) != Some(ModelState::Downloaded) {
            return Err(TranslationError::InvalidModelState(
                "Model not downloaded".to_string(),
            ));
        }

        self.fetcher.delete(canonical).await?;
        self.update(canonical, |model| {
            if model.state == ModelState::Downloaded {
                model.state = ModelState::NotDownloaded;
                model.progress = 0;
                model.verified = false;
                model.last_error = None;
            }
        });
        self.persist();
        tracing::info!("已删除模型: {}", canonical);
        Ok(())
    }

    /// 与后端的实际模型同步，返回状态发生变化的模型数
    pub async fn sync_with_backend(&self) -> usize {
        let mut changed = 0;

        for entry in language::MODEL_CATALOG {
            let available = match self.fetcher.is_available(entry.code).await {
                Ok(available) => available,
                Err(e) => {
                    tracing::warn!("查询模型 {} 失败: {}", entry.code, e);
                    continue;
                }
            };

            let mut model = self
                .models
                .entry(entry.code.to_string())
                .or_insert_with(|| LanguageModel::from_catalog(entry));

            match (model.state, available) {
                (ModelState::Downloading, _) => {}
                (ModelState::Downloaded, true) => {
                    model.verified = true;
                }
                (ModelState::Downloaded, false) => {
                    model.state = ModelState::NotDownloaded;
                    model.progress = 0;
                    model.verified = false;
                    changed += 1;
                }
                (_, true) => {
                    model.state = ModelState::Downloaded;
                    model.progress = 100;
                    model.verified = true;
                    model.last_error = None;
                    changed += 1;
                }
                (_, false) => {}
            }
        }

        if changed > 0 {
            tracing::info!("与模型后端同步，{} 个模型状态已更新", changed);
            self.persist();
        }
        changed
    }

    fn update<F: FnOnce(&mut LanguageModel)>(&self, code: &str, f: F) {
        if let Some(mut model) = self.models.get_mut(code) {
            f(&mut model);
        }
    }

    fn persist(&self) {
        let Some(registry) = &self.registry else {
            return;
        };
        let downloaded: BTreeSet<String> = self.downloaded_languages().into_iter().collect();
        if let Err(e) = registry.save(&downloaded) {
            tracing::warn!("保存模型登记失败: {}", e);
        }
    }
}
