//! DataStore implementations

use crate::domain::repository::DataStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

// ===== In-memory store =====

/// Volatile store, used when no data directory is configured and in tests
#[derive(Default)]
pub struct InMemoryDataStore {
    blobs: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.blobs.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }
}

// ===== YAML file store =====

const EXTENSION: &str = "yml";

/// One YAML file per key: `<root>/<key>.yml`
///
/// Loaded blobs are cached until `reload`.
pub struct FileDataStore {
    root: PathBuf,
    cache: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl FileDataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
        {
            anyhow::bail!("invalid storage key '{}'", key);
        }
        let mut path = self.root.clone();
        if let Some((file, dirs)) = segments.split_last() {
            path.extend(dirs);
            path.push(format!("{}.{}", file, EXTENSION));
        }
        Ok(path)
    }

    async fn collect_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                if entry.file_type().await?.is_dir() {
                    pending.push((path, format!("{}{}/", prefix, name)));
                } else if let Some(stem) = name.strip_suffix(&format!(".{}", EXTENSION)) {
                    keys.push(format!("{}{}", prefix, stem));
                }
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl DataStore for FileDataStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        if let Some(value) = self.cache.read().get(key) {
            return Ok(Some(value.clone()));
        }

        let path = self.path_for(key)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        let value: serde_json::Value =
            serde_yaml::from_str(&text).with_context(|| format!("malformed YAML in {}", path.display()))?;

        self.cache.write().insert(key.to_string(), value.clone());
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.path_for(key)?;
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let text = serde_yaml::to_string(value).context("failed to encode YAML")?;

        // each save stages into its own sibling and renames it over the target
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut staging = tempfile::Builder::new()
                .prefix(".")
                .suffix(".tmp")
                .tempfile_in(&parent)
                .with_context(|| format!("failed to stage in {}", parent.display()))?;
            staging
                .write_all(text.as_bytes())
                .with_context(|| format!("failed to write {}", staging.path().display()))?;
            staging
                .persist(&target)
                .map_err(|e| e.error)
                .with_context(|| format!("failed to replace {}", target.display()))?;
            Ok(())
        })
        .await
        .context("staging task failed")??;

        self.cache.write().insert(key.to_string(), value.clone());
        tracing::debug!(key, path = %path.display(), "blob saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("failed to delete {}", path.display())),
        }
        self.cache.write().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = self.collect_keys().await?;
        keys.sort();
        Ok(keys)
    }

    async fn reload(&self) -> Result<()> {
        self.cache.write().clear();
        tracing::debug!(root = %self.root.display(), "data store cache dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_roundtrip_and_delete() {
        let store = InMemoryDataStore::new();
        store.save("zones/A1", &json!({"id": "A1"})).await.unwrap();

        assert_eq!(store.load("zones/A1").await.unwrap(), Some(json!({"id": "A1"})));
        assert_eq!(store.list_keys().await.unwrap(), vec!["zones/A1"]);

        store.delete("zones/A1").await.unwrap();
        store.delete("zones/A1").await.unwrap();
        assert!(store.load("zones/A1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_writes_nested_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDataStore::new(dir.path());

        store
            .save("config/zones/A1", &json!({"capture": {"time-seconds": 5}}))
            .await
            .unwrap();
        store.save("stats/players", &json!([])).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("config/zones/A1.yml")).unwrap();
        assert!(text.contains("time-seconds: 5"));
        assert_eq!(store.list_keys().await.unwrap(), vec!["config/zones/A1", "stats/players"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_saves_of_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileDataStore::new(dir.path()));

        let mut handles = Vec::new();
        for round in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save("config/global", &json!({"reward": {"base": round}})).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let text = std::fs::read_to_string(dir.path().join("config/global.yml")).unwrap();
        let on_disk: serde_json::Value = serde_yaml::from_str(&text).unwrap();
        assert!(on_disk["reward"]["base"].is_u64());
        let leftovers = std::fs::read_dir(dir.path().join("config"))
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_file_store_reload_sees_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDataStore::new(dir.path());
        store.save("config/global", &json!({"reward": {"base": 1}})).await.unwrap();

        std::fs::write(dir.path().join("config/global.yml"), "reward:\n  base: 7\n").unwrap();
        assert_eq!(store.load("config/global").await.unwrap(), Some(json!({"reward": {"base": 1}})));

        store.reload().await.unwrap();
        assert_eq!(store.load("config/global").await.unwrap(), Some(json!({"reward": {"base": 7}})));
    }

    #[tokio::test]
    async fn test_file_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDataStore::new(dir.path());

        assert!(store.save("../outside", &json!(1)).await.is_err());
        assert!(store.load("zones//A1").await.is_err());
    }

    #[tokio::test]
    async fn test_file_store_malformed_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/global.yml"), "reward: [unclosed\n").unwrap();

        let store = FileDataStore::new(dir.path());
        assert!(store.load("config/global").await.is_err());
    }
}
