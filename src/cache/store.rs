use crate::shared::glob_match;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache backend timed out")]
    Timeout,
}

/// Cache backend capability. Implementations must bound every operation
/// to roughly two seconds; the client treats any error as a miss.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError>;

    fn delete(&self, key: &str) -> Result<bool, CacheStoreError>;

    fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheStoreError>;

    fn ping(&self) -> Result<(), CacheStoreError>;
}

/// In-process TTL key-value store. Expired entries are dropped on access.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheStoreError> {
        let deadline = Instant::now().checked_add(ttl);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some())
    }

    fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheStoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = entries
            .iter()
            .filter(|(_, (_, deadline))| deadline.map(|d| d > now).unwrap_or(true))
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        out.sort();
        Ok(out)
    }

    fn ping(&self) -> Result<(), CacheStoreError> {
        Ok(())
    }
}

/// Backend that fails every operation; used to exercise fail-open paths.
pub struct FailingCacheStore;

impl CacheStore for FailingCacheStore {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheStoreError> {
        Err(CacheStoreError::Backend("unavailable".to_string()))
    }

    fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::Backend("unavailable".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<bool, CacheStoreError> {
        Err(CacheStoreError::Backend("unavailable".to_string()))
    }

    fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>, CacheStoreError> {
        Err(CacheStoreError::Backend("unavailable".to_string()))
    }

    fn ping(&self) -> Result<(), CacheStoreError> {
        Err(CacheStoreError::Backend("unavailable".to_string()))
    }
}
