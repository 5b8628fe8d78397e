use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

use super::{MemoryStorage, StorageBackend, STORAGE_PREFIX};

/// Namespaced JSON key/value store.
///
/// Every operation is infallible from the caller's point of view: backend and
/// serialization failures are logged and turned into `None` or a no-op.
/// Clone is cheap - all clones share the same backend.
#[derive(Clone)]
pub struct PersistedStore {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
}

impl PersistedStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_prefix(backend, STORAGE_PREFIX)
    }

    pub fn with_prefix(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Store backed by process memory, for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get_item(&self.full_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!(key = key, error = %e, "Error reading from storage");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(key = key, error = %e, "Error parsing stored value");
                None
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error!(key = key, error = %e, "Error serializing value for storage");
                return;
            }
        };

        if let Err(e) = self.backend.set_item(&self.full_key(key), &raw) {
            error!(key = key, error = %e, "Error writing to storage");
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove_item(&self.full_key(key)) {
            error!(key = key, error = %e, "Error removing from storage");
        }
    }

    /// Remove every entry under this store's prefix, leaving other keys alone.
    pub fn clear(&self) {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Error listing storage keys");
                return;
            }
        };

        for key in keys.iter().filter(|k| k.starts_with(&self.prefix)) {
            if let Err(e) = self.backend.remove_item(key) {
                error!(key = %key, error = %e, "Error clearing storage");
            }
        }
    }
}

impl std::fmt::Debug for PersistedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use serde::Deserialize;

    /// Backend that fails every call.
    struct BrokenStorage;

    impl StorageBackend for BrokenStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("quota exceeded"))
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
        fn remove_item(&self, _key: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
        fn keys(&self) -> Result<Vec<String>> {
            Err(anyhow!("quota exceeded"))
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pair {
        a: String,
        b: u32,
    }

    #[test]
    fn test_set_get_remove() {
        let store = PersistedStore::in_memory();
        let pair = Pair {
            a: "x".to_string(),
            b: 7,
        };
        store.set("pair", &pair);
        assert_eq!(store.get::<Pair>("pair"), Some(pair));
        store.remove("pair");
        assert_eq!(store.get::<Pair>("pair"), None);
    }

    #[test]
    fn test_keys_are_prefixed() {
        let backend = Arc::new(MemoryStorage::new());
        let store = PersistedStore::new(backend.clone());
        store.set("theme", "dark");
        assert_eq!(
            backend.get_item("enterprise_dashboard_theme").unwrap().as_deref(),
            Some("\"dark\"")
        );
    }

    #[test]
    fn test_clear_leaves_foreign_keys() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set_item("other_app_setting", "1").unwrap();
        let store = PersistedStore::new(backend.clone());
        store.set("a", &1);
        store.set("b", &2);

        store.clear();

        assert_eq!(store.get::<i32>("a"), None);
        assert_eq!(store.get::<i32>("b"), None);
        assert_eq!(backend.get_item("other_app_setting").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_unparseable_value_reads_as_none() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set_item("enterprise_dashboard_pair", "{broken").unwrap();
        let store = PersistedStore::new(backend);
        assert_eq!(store.get::<Pair>("pair"), None);
    }

    #[test]
    fn test_backend_failures_are_swallowed() {
        let store = PersistedStore::new(Arc::new(BrokenStorage));
        store.set("a", &1);
        store.remove("a");
        store.clear();
        assert_eq!(store.get::<i32>("a"), None);
    }
}
