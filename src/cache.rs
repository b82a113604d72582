//! Key-value storage for text service answers.
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

/// Persistent answers keyed by [`cache_key`]
pub trait KeyValueStore {
    /// Stored value, `None` when absent or unreadable
    fn get(&self, key: &str) -> Option<Value>;

    fn put(&mut self, key: &str, value: &Value);
}

/// Hex SHA-256 of the request kind, its prompt version and the canonical payload
pub fn cache_key(kind: &str, version: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    hasher.update(version.as_bytes());
    hasher.update([0]);
    hasher.update(payload.to_string().as_bytes());

    let digest: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    format!("{kind}-{digest}")
}

/// One pretty-printed JSON file per key
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.path(key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(path = %path.display(), %error, "unreadable cache entry ignored");
                None
            }
        }
    }

    fn put(&mut self, key: &str, value: &Value) {
        let path = self.path(key);
        let written = fs::create_dir_all(&self.dir)
            .and_then(|_| serde_json::to_string_pretty(value).map_err(std::io::Error::from))
            .and_then(|content| fs::write(&path, content));
        if let Err(error) = written {
            warn!(path = %path.display(), %error, "cache entry not written");
        }
    }
}

/// In-process store
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: &Value) {
        self.entries.insert(key.to_owned(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_depend_on_kind_version_and_payload() {
        let payload = json!({"labels": ["6GR", "R20"]});
        let key = cache_key("categories", "v1", &payload);
        assert!(key.starts_with("categories-"));
        assert_eq!(key.len(), "categories-".len() + 64);
        assert_eq!(key, cache_key("categories", "v1", &payload));
        assert_ne!(key, cache_key("categories", "v2", &payload));
        assert_ne!(key, cache_key("categories", "v1", &json!({"labels": ["6GR"]})));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get("missing"), None);

        store.put("timezone-abc", &json!({"timezone": "Asia/Kolkata"}));
        assert_eq!(store.get("timezone-abc"), Some(json!({"timezone": "Asia/Kolkata"})));
        let content = fs::read_to_string(dir.path().join("nested").join("timezone-abc.json")).unwrap();
        assert!(content.contains('\n'));
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("slot-1.json"), "{not json").unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get("slot-1"), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryStore::default();
        store.put("k", &json!(1));
        store.put("k", &json!(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), Some(json!(2)));
    }
}
