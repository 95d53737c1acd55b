//! Persistence port for the agent's named records.
//!
//! Writes are whole-record overwrites; there is no partial patching and no
//! transaction across records.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Groups,
    BotConfig,
    Logs,
    KaiPreferences,
}

impl RecordKey {
    pub fn file_name(self) -> &'static str {
        match self {
            RecordKey::Groups => "groups.json",
            RecordKey::BotConfig => "botConfig.json",
            RecordKey::Logs => "logs.json",
            RecordKey::KaiPreferences => "kaiSettings.json",
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// `None` when the record was never written.
    async fn get(&self, key: RecordKey) -> Result<Option<serde_json::Value>>;
    async fn set(&self, key: RecordKey, value: serde_json::Value) -> Result<()>;
}

/// In-process store (tests, ephemeral runs).
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<RecordKey, serde_json::Value>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (exercises the write-failure policy).
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut guard) = self.fail_writes.lock() {
            *guard = fail;
        }
    }

    pub fn snapshot(&self, key: RecordKey) -> Option<serde_json::Value> {
        self.records.lock().ok()?.get(&key).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        let map = self
            .records
            .lock()
            .map_err(|_| Error::Persistence("memory store poisoned".to_string()))?;
        Ok(map.get(&key).cloned())
    }

    async fn set(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        if self.fail_writes.lock().map(|g| *g).unwrap_or(false) {
            return Err(Error::Persistence(format!(
                "write to {} rejected",
                key.file_name()
            )));
        }
        let mut map = self
            .records
            .lock()
            .map_err(|_| Error::Persistence("memory store poisoned".to_string()))?;
        map.insert(key, value);
        Ok(())
    }
}

/// One pretty-printed JSON file per record inside a data directory.
#[derive(Clone, Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: RecordKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl RecordStore for JsonDirStore {
    async fn get(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        let path = self.path(key);
        let txt = match tokio::fs::read_to_string(&path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        if txt.trim().is_empty() {
            return Ok(None);
        }
        let v: serde_json::Value = serde_json::from_str(&txt)?;
        if v.is_null() {
            return Ok(None);
        }
        Ok(Some(v))
    }

    async fn set(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        let txt = serde_json::to_string_pretty(&value)?;
        tokio::fs::write(&tmp, txt)
            .await
            .map_err(|e| Error::Persistence(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Persistence(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[tokio::test]
    async fn json_dir_store_round_trip_and_missing() {
        let dir = tmp_dir("kai-store");
        let store = JsonDirStore::open(&dir).unwrap();
        assert!(store.get(RecordKey::Groups).await.unwrap().is_none());

        store
            .set(RecordKey::BotConfig, json!({"prefix": "?"}))
            .await
            .unwrap();
        let v = store.get(RecordKey::BotConfig).await.unwrap().unwrap();
        assert_eq!(v["prefix"], "?");
        assert!(dir.join("botConfig.json").exists());
        assert!(!dir.join("botConfig.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_file_reads_as_absent() {
        let dir = tmp_dir("kai-store-empty");
        let store = JsonDirStore::open(&dir).unwrap();
        std::fs::write(dir.join("logs.json"), "").unwrap();
        assert!(store.get(RecordKey::Logs).await.unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn memory_store_can_reject_writes() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(store.set(RecordKey::Logs, json!([])).await.is_err());
        store.fail_writes(false);
        store.set(RecordKey::Logs, json!([])).await.unwrap();
        assert_eq!(store.snapshot(RecordKey::Logs), Some(json!([])));
    }
}
