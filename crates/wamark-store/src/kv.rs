//! File-based key-value store — lightweight persistence.
//! Values saved as one pretty-printed JSON file per store.
//! Every `set` rewrites the whole file before returning; a failed write is
//! logged and swallowed, the in-memory map stays authoritative.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A flat JSON map persisted to a single file.
pub struct JsonStore {
    path: PathBuf,
    data: Mutex<serde_json::Map<String, Value>>,
}

impl JsonStore {
    /// Open (or create) a store at the given file path.
    pub fn open(path: &Path) -> Self {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let data = Self::load(path);
        Self { path: path.to_path_buf(), data: Mutex::new(data) }
    }

    fn load(path: &Path) -> serde_json::Map<String, Value> {
        if !path.exists() {
            return serde_json::Map::new();
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                serde_json::Map::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", path.display());
                serde_json::Map::new()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().expect("store lock poisoned").get(key).cloned()
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().expect("store lock poisoned").contains_key(key)
    }

    /// Set a key and flush the whole store to disk.
    pub fn set(&self, key: &str, value: Value) {
        let mut data = self.data.lock().expect("store lock poisoned");
        data.insert(key.to_string(), value);
        self.flush(&data);
    }

    /// Remove a key and flush.
    pub fn delete(&self, key: &str) {
        let mut data = self.data.lock().expect("store lock poisoned");
        if data.remove(key).is_some() {
            self.flush(&data);
        }
    }

    /// Copy of all keys with the given prefix (prefix stripped).
    pub fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, Value)> {
        let data = self.data.lock().expect("store lock poisoned");
        data.iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix).map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }

    fn flush(&self, data: &serde_json::Map<String, Value>) {
        let json = match serde_json::to_string_pretty(data) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("⚠️ Failed to serialize {}: {e}", self.path.display());
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            tracing::warn!("⚠️ Failed to write {}: {e}", self.path.display());
        }
    }
}
