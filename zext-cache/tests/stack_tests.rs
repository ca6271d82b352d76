//! End-to-end tests over composed stacks.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use zext_cache::{CacheBackend, CacheProfiler, Factory, JsonSerializer, Profileable, Taggable, Wrapper};
use zext_core::{BackendKind, CacheConfig, Lifetime, SerializerKind};
use zext_test_utils::assertions::{
    assert_backend_error, assert_config_error, assert_tagging_unsupported, assert_validation_error,
};
use zext_test_utils::fixtures::{memory_factory, memory_wrapper, profiled_config, tagged_memory};
use zext_test_utils::FailingBackend;

fn lmdb_config(dir: &TempDir) -> CacheConfig {
    CacheConfig::default().with_backend(BackendKind::Lmdb {
        path: dir.path().join("cache"),
        max_size_mb: 16,
    })
}

#[tokio::test]
async fn test_lmdb_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let factory = Factory::new(lmdb_config(&dir)).unwrap();
        let cache = factory.create_frontend(Some("docs")).unwrap();
        cache
            .set_tagged("readme", json!({"title": "Read me"}), &["public"])
            .await
            .unwrap();
        cache.set("hits", 5).await.unwrap();
    }

    let factory = Factory::new(lmdb_config(&dir)).unwrap();
    let cache = factory.create_frontend(Some("docs")).unwrap();
    assert_eq!(
        cache.get("readme").await.unwrap(),
        Some(json!({"title": "Read me"}))
    );
    assert_eq!(cache.inc("hits", 1).await.unwrap(), Some(6));

    let tagged = cache.get_by_tag(&["public"], false).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert!(tagged.contains_key("readme"));
}

#[tokio::test]
async fn test_toml_config_builds_stack() {
    let dir = TempDir::new().unwrap();
    let source = format!(
        r#"
namespace = "app"
default_lifetime = 300
profiling = true
profile_history = 8

[backend]
kind = "lmdb"
path = "{}"
max_size_mb = 16
"#,
        dir.path().join("toml").display()
    );
    let config = CacheConfig::from_toml_str(&source).unwrap();
    let factory = Factory::new(config).unwrap();
    let cache = factory.create_frontend(None).unwrap();

    assert_eq!(cache.namespace(), Some("app"));
    assert_eq!(cache.default_lifetime(), Lifetime::Seconds(300));

    cache.set("k", "v").await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));
    assert_eq!(cache.profiler().unwrap().stats().writes, 1);
}

#[tokio::test]
async fn test_expired_entries_disappear() {
    let factory = memory_factory();
    let cache = factory
        .create_frontend(Some("short"))
        .unwrap()
        .with_default_lifetime(Lifetime::Seconds(1));

    cache.set_tagged("k", 1, &["t"]).await.unwrap();
    assert!(cache.has("k").await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert!(!cache.has("k").await.unwrap());
    assert!(cache.get_by_tag(&["t"], false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_flush_clears_every_namespace() {
    let factory = memory_factory();
    let a = factory.create_frontend(Some("a")).unwrap();
    let b = factory.create_frontend(Some("b")).unwrap();
    a.set("k", 1).await.unwrap();
    b.set("k", 2).await.unwrap();

    a.flush().await.unwrap();

    assert!(!a.has("k").await.unwrap());
    assert!(!b.has("k").await.unwrap());
}

#[tokio::test]
async fn test_backend_errors_propagate_through_decorators() {
    let failing: Arc<dyn CacheBackend> = Arc::new(FailingBackend::new("down for maintenance"));
    let serialized: Arc<dyn CacheBackend> = Arc::new(JsonSerializer::new(failing));
    let profiler = Arc::new(CacheProfiler::new(16));
    let stack = Arc::new(Profileable::new(
        Arc::new(Taggable::new(serialized)),
        Arc::clone(&profiler),
    ));
    let cache = Wrapper::taggable(stack);

    assert_backend_error(&cache.get("k").await);
    assert_backend_error(&cache.set("k", json!({"a": 1})).await);
    assert_backend_error(&cache.set_tagged("k", 1, &["t"]).await);
    assert_backend_error(&cache.get_by_tag(&["t"], false).await);
    assert_eq!(profiler.stats().errors, 4);
}

#[tokio::test]
async fn test_validation_errors() {
    let (_raw, cache) = tagged_memory();
    assert_validation_error(&cache.set("", 1).await);
    assert_validation_error(&cache.set_tagged("k", 1, &[""]).await);
    assert_validation_error(&cache.inc("", 1).await);
}

#[tokio::test]
async fn test_plain_wrapper_refuses_tags() {
    let cache = memory_wrapper();
    assert_tagging_unsupported(&cache.remove_by_tag(&["t"], true).await);
    cache.set("k", 1).await.unwrap();
    assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));
}

#[test]
fn test_invalid_configs_rejected() {
    assert_config_error(&Factory::new(CacheConfig::default().with_namespace("a:b")).map(|_| ()));
    assert_config_error(&CacheConfig::from_toml_str("[backend]\nkind = \"redis\"").map(|_| ()));
}

#[tokio::test]
async fn test_counters_survive_json_serializer() {
    let config = profiled_config().with_serializer(SerializerKind::Json);
    let factory = Factory::new(config).unwrap();
    let cache = factory.create_frontend(Some("metrics")).unwrap();

    cache.set("visits", 10).await.unwrap();
    assert_eq!(cache.inc("visits", 5).await.unwrap(), Some(15));
    assert_eq!(cache.dec("visits", 20).await.unwrap(), Some(-5));
    assert_eq!(cache.get("visits").await.unwrap(), Some(json!(-5)));
}
