use super::metrics::CacheMetrics;
use super::store::CacheStore;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHealth {
    pub enabled: bool,
    pub connected: bool,
    pub message: String,
}

/// Fail-open cache front. Every backend error degrades to the absent
/// result and bumps the error counter; callers never see cache failures.
pub struct CacheClient {
    store: Option<Arc<dyn CacheStore>>,
    enabled: bool,
    default_ttl_seconds: u64,
    metrics: Mutex<CacheMetrics>,
}

impl CacheClient {
    pub fn new(store: Arc<dyn CacheStore>, enabled: bool, default_ttl_seconds: u64) -> Self {
        Self {
            store: Some(store),
            enabled,
            default_ttl_seconds: default_ttl_seconds.max(1),
            metrics: Mutex::new(CacheMetrics::new()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            store: None,
            enabled: false,
            default_ttl_seconds: 3600,
            metrics: Mutex::new(CacheMetrics::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.store.is_some()
    }

    fn active_store(&self) -> Option<&Arc<dyn CacheStore>> {
        if !self.enabled {
            return None;
        }
        self.store.as_ref()
    }

    fn with_metrics(&self, apply: impl FnOnce(&mut CacheMetrics)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        apply(&mut metrics);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_categorized(key, "general")
    }

    pub fn get_categorized(&self, key: &str, category: &str) -> Option<String> {
        let Some(store) = self.active_store() else {
            return None;
        };
        match store.get(key) {
            Ok(Some(value)) => {
                self.with_metrics(|m| m.record_hit(category));
                Some(value)
            }
            Ok(None) => {
                self.with_metrics(|m| m.record_miss(category));
                None
            }
            Err(_) => {
                self.with_metrics(|m| m.record_error());
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> bool {
        let Some(store) = self.active_store() else {
            return false;
        };
        let ttl = Duration::from_secs(ttl_seconds.unwrap_or(self.default_ttl_seconds).max(1));
        match store.set(key, value, ttl) {
            Ok(()) => {
                self.with_metrics(|m| m.record_set());
                true
            }
            Err(_) => {
                self.with_metrics(|m| m.record_error());
                false
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let Some(store) = self.active_store() else {
            return false;
        };
        match store.delete(key) {
            Ok(deleted) => {
                self.with_metrics(|m| m.record_delete());
                deleted
            }
            Err(_) => {
                self.with_metrics(|m| m.record_error());
                false
            }
        }
    }

    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let Some(store) = self.active_store() else {
            return 0;
        };
        let keys = match store.keys_matching(pattern) {
            Ok(keys) => keys,
            Err(_) => {
                self.with_metrics(|m| m.record_error());
                return 0;
            }
        };
        let mut deleted = 0;
        for key in keys {
            match store.delete(&key) {
                Ok(true) => {
                    deleted += 1;
                    self.with_metrics(|m| m.record_delete());
                }
                Ok(false) => {}
                Err(_) => self.with_metrics(|m| m.record_error()),
            }
        }
        deleted
    }

    pub fn get_json(&self, key: &str) -> Option<Value> {
        self.get_json_categorized(key, "general")
    }

    pub fn get_json_categorized(&self, key: &str, category: &str) -> Option<Value> {
        let raw = self.get_categorized(key, category)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => Some(value),
            _ => None,
        }
    }

    pub fn set_json(&self, key: &str, value: &Value, ttl_seconds: Option<u64>) -> bool {
        if !value.is_object() {
            return false;
        }
        self.set(key, &value.to_string(), ttl_seconds)
    }

    pub fn health(&self) -> CacheHealth {
        let Some(store) = self.active_store() else {
            return CacheHealth {
                enabled: false,
                connected: false,
                message: "Caching disabled".to_string(),
            };
        };
        match store.ping() {
            Ok(()) => CacheHealth {
                enabled: true,
                connected: true,
                message: "Connected".to_string(),
            },
            Err(_) => CacheHealth {
                enabled: true,
                connected: false,
                message: "Connection unavailable".to_string(),
            },
        }
    }

    pub fn metrics_snapshot(&self) -> CacheMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
