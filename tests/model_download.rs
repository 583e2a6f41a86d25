//! 离线模型下载集成测试
//!
//! 进度单调、成功前必到 100、失败复位、并发拒绝、取消与登记持久化

use std::sync::Arc;

use tokio::sync::Notify;

use message_translator::translation::{
    ModelRegistry, ModelState, OfflineModelManager, TranslationError,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{assert_progress_contract, ListenerEvent, RecordingListener, ScriptedFetcher};

fn manager(fetcher: ScriptedFetcher) -> (Arc<OfflineModelManager>, Arc<ScriptedFetcher>) {
    let fetcher = Arc::new(fetcher);
    let manager = Arc::new(OfflineModelManager::new(fetcher.clone()));
    (manager, fetcher)
}

#[tokio::test]
async fn test_download_reports_full_progress() {
    let (models, _) = manager(ScriptedFetcher::new(&[0, 25, 50, 75, 100]).with_size(1_048_576));
    let listener = RecordingListener::new();

    models.download("es", listener.clone()).await.unwrap();

    let events = listener.events();
    assert_progress_contract(&events);
    assert_eq!(listener.progress(), vec![0, 25, 50, 75, 100]);
    assert_eq!(events.last(), Some(&ListenerEvent::Success));

    let model = models.model("es").unwrap();
    assert_eq!(model.state, ModelState::Downloaded);
    assert!(!model.is_downloading());
    assert_eq!(model.progress, 100);
    assert_eq!(model.size_bytes, 1_048_576);
    assert!(model.verified);
    assert_eq!(model.status_text(), "downloaded (verified)");

    println!("✅ 下载进度完整上报");
}

#[tokio::test]
async fn test_missing_final_progress_is_completed() {
    let (models, _) = manager(ScriptedFetcher::new(&[10, 60]));
    let listener = RecordingListener::new();

    models.download("fr", listener.clone()).await.unwrap();

    assert_eq!(listener.progress(), vec![0, 10, 60, 100]);
    assert_progress_contract(&listener.events());
    assert!(models.is_language_model_downloaded("fr"));

    println!("✅ 获取实现未报 100 时补齐");
}

#[tokio::test]
async fn test_regressing_progress_is_dropped() {
    let (models, _) = manager(ScriptedFetcher::new(&[0, 50, 30, 80, 250]));
    let listener = RecordingListener::new();

    models.download("de", listener.clone()).await.unwrap();

    // 回退值丢弃，超过 100 的值按 100 处理
    assert_eq!(listener.progress(), vec![0, 50, 80, 100]);
    assert_progress_contract(&listener.events());

    println!("✅ 回退的进度被丢弃");
}

#[tokio::test]
async fn test_failure_resets_and_retry_succeeds() {
    let (models, fetcher) = manager(ScriptedFetcher::new(&[20, 40]).failing("connection reset"));
    let listener = RecordingListener::new();

    let err = models.download("it", listener.clone()).await.unwrap_err();
    assert!(matches!(err, TranslationError::DownloadFailed(_)));
    assert_eq!(
        listener.errors(),
        vec!["Download failed: Network error: connection reset".to_string()]
    );
    assert!(!listener.succeeded());
    // 失败路径不补齐 100
    assert_eq!(listener.progress(), vec![0, 20, 40]);

    let model = models.model("it").unwrap();
    assert_eq!(model.state, ModelState::NotDownloaded);
    assert_eq!(model.progress, 0);
    assert!(model.last_error.is_some());

    fetcher.clear_failure();
    let retry = RecordingListener::new();
    models.download("it", retry.clone()).await.unwrap();
    assert!(retry.succeeded());
    assert!(models.is_language_model_downloaded("it"));
    assert!(models.model("it").unwrap().last_error.is_none());
    assert_eq!(fetcher.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 2);

    println!("✅ 下载失败后复位并可重试");
}

#[tokio::test]
async fn test_verification_failure() {
    let (models, _) = manager(ScriptedFetcher::new(&[100]).unverified());
    let listener = RecordingListener::new();

    let err = models.download("pt", listener.clone()).await.unwrap_err();
    assert_eq!(
        err,
        TranslationError::DownloadFailed("model verification failed".to_string())
    );
    assert!(!listener.succeeded());
    assert!(!models.is_language_model_downloaded("pt"));

    println!("✅ 校验失败视为下载失败");
}

#[tokio::test]
async fn test_rejections() {
    let (models, _) = manager(ScriptedFetcher::new(&[100]));

    let listener = RecordingListener::new();
    let err = models.download("xx", listener.clone()).await.unwrap_err();
    assert_eq!(err, TranslationError::UnsupportedLanguage("xx".to_string()));
    assert_eq!(listener.errors(), vec!["Unsupported language: xx".to_string()]);

    models.download("ja", RecordingListener::new()).await.unwrap();
    let listener = RecordingListener::new();
    let err = models.download("ja", listener.clone()).await.unwrap_err();
    assert_eq!(err.to_string(), "Model already downloaded");
    assert_eq!(listener.errors(), vec!["Model already downloaded".to_string()]);

    println!("✅ 不支持或已下载的模型被拒绝");
}

#[tokio::test]
async fn test_concurrent_download_rejected() {
    let gate = Arc::new(Notify::new());
    let (models, fetcher) = manager(ScriptedFetcher::new(&[30]).gated(gate.clone()));

    let first = RecordingListener::new();
    let handle = models.download_model("es", first.clone()).unwrap();
    assert!(models.is_downloading("es"));

    let second = RecordingListener::new();
    let err = models.download_model("es-MX", second.clone()).unwrap_err();
    assert_eq!(err, TranslationError::InvalidModelState("Model already downloading".to_string()));
    assert_eq!(second.errors(), vec!["Model already downloading".to_string()]);

    gate.notify_one();
    handle.await.unwrap().unwrap();

    assert!(first.succeeded());
    assert_progress_contract(&first.events());
    assert!(models.is_language_model_downloaded("es"));
    assert_eq!(fetcher.fetch_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    println!("✅ 同一模型同时只有一个下载");
}

#[tokio::test]
async fn test_cancel_download() {
    let gate = Arc::new(Notify::new());
    let (models, _) = manager(ScriptedFetcher::new(&[10]).gated(gate));

    let listener = RecordingListener::new();
    let handle = models.download_model("zh-CN", listener.clone()).unwrap();
    assert!(models.is_downloading("zh"));

    assert!(models.cancel_download("zh-TW"));
    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err, TranslationError::Cancelled);
    assert_eq!(listener.errors(), vec!["Operation cancelled".to_string()]);
    assert!(!listener.succeeded());

    assert_eq!(models.model("zh").unwrap().state, ModelState::NotDownloaded);
    assert!(!models.cancel_download("zh"));

    println!("✅ 取消进行中的下载");
}

#[tokio::test]
async fn test_delete_model() {
    let (models, _) = manager(ScriptedFetcher::new(&[100]));

    let err = models.delete_model("ko").await.unwrap_err();
    assert_eq!(err.to_string(), "Model not downloaded");

    models.download("ko", RecordingListener::new()).await.unwrap();
    assert!(models.has_any_downloaded_models());

    models.delete_model("ko").await.unwrap();
    assert!(!models.is_language_model_downloaded("ko"));
    assert!(!models.has_any_downloaded_models());
    assert_eq!(models.model("ko").unwrap().progress, 0);

    println!("✅ 删除已下载模型");
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("registry.json");

    {
        let models = OfflineModelManager::new(Arc::new(ScriptedFetcher::new(&[100])))
            .with_registry(ModelRegistry::new(&path));
        models.download("en", RecordingListener::new()).await.unwrap();
        models.download("es", RecordingListener::new()).await.unwrap();
        models.delete_model("en").await.unwrap();
    }
    assert!(path.exists());

    let restored = OfflineModelManager::new(Arc::new(ScriptedFetcher::new(&[100])))
        .with_registry(ModelRegistry::new(&path));
    assert_eq!(restored.downloaded_languages(), vec!["es".to_string()]);
    assert!(!restored.is_language_model_downloaded("en"));

    let status = restored.get_detailed_model_status();
    assert_eq!(status.get("es").map(String::as_str), Some("downloaded"));
    assert_eq!(status.get("en").map(String::as_str), Some("not_downloaded"));

    println!("✅ 模型登记在重启后恢复");
}

#[tokio::test]
async fn test_corrupt_registry_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, "not json").unwrap();

    let models = OfflineModelManager::new(Arc::new(ScriptedFetcher::new(&[100])))
        .with_registry(ModelRegistry::new(&path));
    assert!(!models.has_any_downloaded_models());

    // 下一次持久化覆盖损坏的文件
    models.download("fr", RecordingListener::new()).await.unwrap();
    let reloaded = ModelRegistry::new(&path).load().unwrap();
    assert!(reloaded.contains("fr"));

    println!("✅ 损坏的登记文件不影响启动");
}
