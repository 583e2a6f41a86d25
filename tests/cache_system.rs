//! 缓存系统集成测试
//!
//! 测试缓存的并发访问、容量淘汰和快照持久化

use std::sync::Arc;
use std::time::Duration;

use message_translator::translation::{CacheConfig, TranslationCache};

fn cache(max_entries: usize, ttl: Duration) -> TranslationCache {
    TranslationCache::with_config(CacheConfig {
        enabled: true,
        max_entries,
        ttl,
    })
}

/// 测试快照保存与加载
#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("cache").join("snapshot.json");

    let original = TranslationCache::new();
    original.put("Hola", "es", "en", "Hello");
    original.put("Bonjour", "auto", "en", "Hello");
    original.put("Danke", "de", "zh", "谢谢");

    let saved = original.save_to(&path).expect("保存快照失败");
    assert_eq!(saved, 3);

    let restored = TranslationCache::new();
    let loaded = restored.load_from(&path).expect("加载快照失败");
    assert_eq!(loaded, 3);
    assert_eq!(restored.get("Hola", "es", "en").as_deref(), Some("Hello"));
    assert_eq!(restored.get("Bonjour", "auto", "en").as_deref(), Some("Hello"));
    assert_eq!(restored.get("Danke", "de", "zh").as_deref(), Some("谢谢"));

    println!("✅ 缓存快照保存与加载");
}

/// 测试缺失和损坏的快照
#[tokio::test]
async fn test_missing_and_corrupt_snapshot() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");

    let cache = TranslationCache::new();
    assert_eq!(cache.load_from(dir.path().join("absent.json")).unwrap(), 0);

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"{ not a snapshot").unwrap();
    assert!(cache.load_from(&corrupt).is_err());
    assert!(cache.is_empty());

    println!("✅ 缺失或损坏的快照不影响缓存");
}

/// 测试快照保留访问顺序
#[tokio::test]
async fn test_snapshot_preserves_lru_order() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("snapshot.json");

    let source = cache(3, Duration::from_secs(3600));
    source.put("a", "en", "fr", "1");
    source.put("b", "en", "fr", "2");
    source.put("c", "en", "fr", "3");
    // 访问 a 使其成为最近使用
    assert!(source.get("a", "en", "fr").is_some());
    source.save_to(&path).unwrap();

    let restored = cache(3, Duration::from_secs(3600));
    restored.load_from(&path).unwrap();
    restored.put("d", "en", "fr", "4");

    // 最久未使用的 b 被淘汰
    assert!(restored.get("b", "en", "fr").is_none());
    assert!(restored.get("a", "en", "fr").is_some());
    assert!(restored.get("c", "en", "fr").is_some());
    assert!(restored.get("d", "en", "fr").is_some());

    println!("✅ 快照保留 LRU 顺序");
}

/// 测试过期条目不写入也不加载
#[tokio::test]
async fn test_expired_entries_skipped() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("snapshot.json");

    let long_lived = TranslationCache::new();
    long_lived.put("Hola", "es", "en", "Hello");
    long_lived.save_to(&path).unwrap();

    let short_lived = cache(100, Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(short_lived.load_from(&path).unwrap(), 0);
    assert!(short_lived.is_empty());

    println!("✅ 过期条目被跳过");
}

/// 测试并发读写
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access() {
    let cache = Arc::new(cache(10_000, Duration::from_secs(3600)));

    let mut handles = Vec::new();
    for worker in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..100 {
                let text = format!("text-{}-{}", worker, i);
                cache.put(&text, "en", "es", &format!("texto-{}-{}", worker, i));
                assert_eq!(
                    cache.get(&text, "en", "es"),
                    Some(format!("texto-{}-{}", worker, i))
                );
                // 其他任务写入的共享条目
                cache.put("shared", "en", "es", "compartido");
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.expect("任务异常结束");
    }

    assert_eq!(cache.len(), 8 * 100 + 1);
    assert_eq!(cache.get("shared", "en", "es").as_deref(), Some("compartido"));
    let stats = cache.stats();
    assert_eq!(stats.cache_hits, 8 * 100 + 1);
    assert_eq!(stats.cache_misses, 0);

    println!("✅ 并发读写一致");
}

/// 测试并发写入不超过容量
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_under_concurrency() {
    let cache = Arc::new(cache(50, Duration::from_secs(3600)));

    let mut handles = Vec::new();
    for worker in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..200 {
                cache.put(&format!("{}-{}", worker, i), "en", "de", "x");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("任务异常结束");
    }

    // 并发插入时允许短暂超出，最终不应远超容量
    assert!(cache.len() <= 50 + 4, "cache grew to {}", cache.len());
    assert!(cache.stats().evictions > 0);

    println!("✅ 并发写入受容量约束");
}

/// 测试空白输入永远不命中
#[tokio::test]
async fn test_blank_inputs_never_stored() {
    let cache = TranslationCache::new();
    cache.put("   ", "en", "es", "nada");
    cache.put("hello", "", "es", "hola");
    cache.put("hello", "en", " ", "hola");

    assert!(cache.is_empty());
    assert_eq!(cache.get("   ", "en", "es"), None);
    assert_eq!(cache.get("hello", "", "es"), None);

    println!("✅ 空白输入不写入缓存");
}

/// 测试缓存关闭
#[tokio::test]
async fn test_disabled_cache_from_config() {
    let config = message_translator::TranslationConfig {
        cache_enabled: false,
        ..Default::default()
    };
    let cache = TranslationCache::with_config(CacheConfig::from(&config));

    cache.put("Hola", "es", "en", "Hello");
    assert_eq!(cache.get("Hola", "es", "en"), None);
    assert!(cache.is_empty());

    println!("✅ 配置关闭缓存");
}
