use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use log::{debug, warn};

/// 一条缓存的响应：头部与正文。
///
/// 记录一旦放入就不再修改，失效时整体替换或删除。
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// 请求路径 -> 缓存响应。
///
/// 没有容量上限与淘汰策略，内容一直保留到显式 `clear`。
/// 并发未命中时可能重复读取同一资源，后写入者覆盖先写入者。
pub struct CacheTable {
    records: Mutex<HashMap<String, Arc<CacheRecord>>>,
}

impl CacheTable {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CacheRecord>>> {
        match self.records.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    // 查询
    pub fn get(&self, path: &str) -> Option<Arc<CacheRecord>> {
        self.lock().get(path).cloned()
    }

    // 放入（替换旧记录）
    pub fn insert(&self, path: &str, record: CacheRecord) -> Arc<CacheRecord> {
        let record = Arc::new(record);
        self.lock().insert(path.to_string(), Arc::clone(&record));
        record
    }

    /// 清除单个路径；`None` 时清空整张表
    pub fn clear(&self, key: Option<&str>) {
        let mut records = self.lock();
        match key {
            Some(k) => {
                if records.remove(k).is_some() {
                    debug!("缓存已清除: {}", k);
                }
            }
            None => {
                debug!("缓存已全部清除，共{}条", records.len());
                records.clear();
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for CacheTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: &'static str) -> CacheRecord {
        CacheRecord {
            headers: vec![("Content-Length".to_string(), body.len().to_string())],
            body: Bytes::from(body),
        }
    }

    #[test]
    fn test_cache_creation() {
        let cache = CacheTable::new();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = CacheTable::new();
        cache.insert("/static/app.css", record("body{}"));
        assert_eq!(cache.len(), 1);

        let found = cache.get("/static/app.css");
        assert!(found.is_some());
        assert_eq!(found.unwrap().body, Bytes::from("body{}"));
    }

    #[test]
    fn test_cache_replace_existing() {
        let cache = CacheTable::new();
        let old = cache.insert("/static/app.css", record("old content"));
        cache.insert("/static/app.css", record("new content"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("/static/app.css").unwrap().body, Bytes::from("new content"));
        // 旧记录仍被持有者完整保留
        assert_eq!(old.body, Bytes::from("old content"));
    }

    #[test]
    fn test_cache_not_found() {
        let cache = CacheTable::new();
        assert!(cache.get("/nonexistent.txt").is_none());
        assert!(!cache.contains("/nonexistent.txt"));
    }

    #[test]
    fn test_clear_single_key() {
        let cache = CacheTable::new();
        cache.insert("/a.css", record("a"));
        cache.insert("/b.css", record("b"));

        cache.clear(Some("/a.css"));

        assert!(!cache.contains("/a.css"));
        assert!(cache.contains("/b.css"));
    }

    #[test]
    fn test_clear_missing_key_is_noop() {
        let cache = CacheTable::new();
        cache.insert("/a.css", record("a"));
        cache.clear(Some("/zzz.css"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let cache = CacheTable::new();
        for i in 1..=5 {
            cache.insert(&format!("/file{}.txt", i), record("content"));
        }
        assert_eq!(cache.len(), 5);

        cache.clear(None);

        assert!(cache.is_empty());
    }

    #[test]
    fn test_no_eviction() {
        let cache = CacheTable::new();
        for i in 0..1000 {
            cache.insert(&format!("/file{}.txt", i), record("content"));
        }
        assert_eq!(cache.len(), 1000);
        assert!(cache.contains("/file0.txt"));
    }
}
