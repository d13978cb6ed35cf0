use jarvis_core::cache::{
    CacheClient, FailingCacheStore, MemoryCacheStore,
};
use serde_json::json;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn client() -> CacheClient {
    CacheClient::new(Arc::new(MemoryCacheStore::new()), true, 3600)
}

#[test]
fn set_get_delete_round_trip() {
    let cache = client();
    assert!(cache.get("tool:v1:missing").is_none());
    assert!(cache.set("tool:v1:k", "value", None));
    assert_eq!(cache.get("tool:v1:k").as_deref(), Some("value"));
    assert!(cache.delete("tool:v1:k"));
    assert!(cache.get("tool:v1:k").is_none());
}

#[test]
fn expired_entries_read_as_absent() {
    let cache = client();
    assert!(cache.set("tool:v1:short", "value", Some(1)));
    assert_eq!(cache.get("tool:v1:short").as_deref(), Some("value"));
    sleep(Duration::from_millis(1100));
    assert!(cache.get("tool:v1:short").is_none());
}

#[test]
fn invalidate_pattern_deletes_matching_namespace_only() {
    let cache = client();
    cache.set("tool:v1:a", "1", None);
    cache.set("tool:v1:b", "2", None);
    cache.set("context:v1:c", "3", None);

    let deleted = cache.invalidate_pattern("tool:v1:*");
    assert_eq!(deleted, 2);
    assert!(cache.get("tool:v1:a").is_none());
    assert!(cache.get("context:v1:c").is_some());
}

#[test]
fn backend_failures_fail_open_and_count_errors() {
    let cache = CacheClient::new(Arc::new(FailingCacheStore), true, 3600);
    assert!(cache.get("any").is_none());
    assert!(!cache.set("any", "value", None));
    assert!(!cache.delete("any"));
    assert_eq!(cache.invalidate_pattern("*"), 0);

    let metrics = cache.metrics_snapshot();
    assert!(metrics.errors >= 3);
    assert_eq!(metrics.hits, 0);

    let health = cache.health();
    assert!(health.enabled);
    assert!(!health.connected);
    assert_eq!(health.message, "Connection unavailable");
}

#[test]
fn disabled_client_reports_caching_disabled() {
    let cache = CacheClient::disabled();
    assert!(!cache.is_enabled());
    assert!(cache.get("k").is_none());
    assert!(!cache.set("k", "v", None));

    let health = cache.health();
    assert!(!health.enabled);
    assert!(!health.connected);
    assert_eq!(health.message, "Caching disabled");

    let enabled = client();
    let health = enabled.health();
    assert!(health.enabled && health.connected);
    assert_eq!(health.message, "Connected");
}

#[test]
fn json_helpers_only_accept_objects() {
    let cache = client();
    assert!(cache.set_json("ctx", &json!({"messages": []}), None));
    let loaded = cache.get_json("ctx").expect("object round trip");
    assert_eq!(loaded["messages"], json!([]));

    assert!(!cache.set_json("list", &json!([1, 2, 3]), None));
    cache.set("scalar", "42", None);
    assert!(cache.get_json("scalar").is_none());
}

#[test]
fn categorized_gets_feed_per_category_metrics() {
    let cache = client();
    cache.set("tool:v1:k", "v", None);
    cache.get_categorized("tool:v1:k", "tool");
    cache.get_categorized("tool:v1:nope", "tool");
    cache.get_categorized("context:v1:nope", "  ");

    let metrics = cache.metrics_snapshot();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 2);
    assert_eq!(metrics.category_hits.get("tool"), Some(&1));
    assert_eq!(metrics.category_misses.get("tool"), Some(&1));
    assert_eq!(metrics.category_misses.get("general"), Some(&1));

    let summary = metrics.summary();
    let names = summary["categories"]
        .as_object()
        .expect("categories")
        .keys()
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["general".to_string(), "tool".to_string()]);
}
