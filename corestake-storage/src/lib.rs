//! Snapshot persistence for the node.
//!
//! A snapshot is one bincode record holding the sequence number, the
//! engine root hash and the encoded payload. It is written under a
//! "latest" key in a single put, then copied under its sequence number;
//! only the most recent copies are retained.

#[cfg(feature = "rocksdb")]
pub mod db;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

#[cfg(feature = "rocksdb")]
pub use db::RocksStore;

const LATEST_KEY: &str = "snapshot";

/// Sequence-keyed copies kept besides the latest snapshot.
pub const DEFAULT_RETAINED: u64 = 64;

pub trait SnapshotStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl SnapshotStore for MemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// One file per key inside a data directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating data dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

impl SnapshotStore for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(bytes))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    sequence: u64,
    root: [u8; 32],
    payload: Vec<u8>,
}

pub struct Storage {
    store: Box<dyn SnapshotStore>,
    retained: u64,
}

impl Storage {
    pub fn new(store: Box<dyn SnapshotStore>) -> Self {
        Self {
            store,
            retained: DEFAULT_RETAINED,
        }
    }

    /// Keeps at least one sequence-keyed copy.
    pub fn with_retention(mut self, retained: u64) -> Self {
        self.retained = retained.max(1);
        self
    }

    pub fn memory() -> Self {
        Self::new(Box::<MemoryStore>::default())
    }

    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(FileStore::open(path)?)))
    }

    #[cfg(feature = "rocksdb")]
    pub fn open_rocks(path: &str) -> Result<Self> {
        Ok(Self::new(Box::new(RocksStore::open(path)?)))
    }

    fn history_key(sequence: u64) -> String {
        format!("{}_{}", LATEST_KEY, sequence)
    }

    /// Writes `payload` as the latest snapshot at `sequence`. Saving the
    /// same sequence again replaces its copy.
    pub fn save_snapshot<T: Serialize>(&self, sequence: u64, root: [u8; 32], payload: &T) -> Result<()> {
        let payload = bincode::serialize(payload).map_err(|e| anyhow!("Serialization error: {}", e))?;
        let encoded = bincode::serialize(&Snapshot { sequence, root, payload })
            .map_err(|e| anyhow!("Serialization error: {}", e))?;
        self.store.put(LATEST_KEY, &encoded)?;
        self.store.put(&Self::history_key(sequence), &encoded)?;
        if let Some(expired) = sequence.checked_sub(self.retained) {
            self.store.delete(&Self::history_key(expired))?;
        }
        debug!(sequence, root = %hex::encode(root), "snapshot saved");
        Ok(())
    }

    pub fn load_latest<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.load_key(LATEST_KEY)
    }

    pub fn load_at<T: DeserializeOwned>(&self, sequence: u64) -> Result<Option<T>> {
        self.load_key(&Self::history_key(sequence))
    }

    /// Root hash recorded with the latest snapshot.
    pub fn state_root(&self) -> Result<Option<[u8; 32]>> {
        Ok(self.snapshot(LATEST_KEY)?.map(|s| s.root))
    }

    fn snapshot(&self, key: &str) -> Result<Option<Snapshot>> {
        match self.store.get(key)? {
            Some(bytes) => {
                let snapshot = bincode::deserialize(&bytes).map_err(|e| anyhow!("Deserialization error for {}: {}", key, e))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn load_key<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.snapshot(key)? {
            Some(snapshot) => {
                let value = bincode::deserialize(&snapshot.payload)
                    .map_err(|e| anyhow!("Deserialization error for {} payload: {}", key, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corestake_types::{AccountId, EngineConfig, EngineState};

    fn sample_state(sequence: u64) -> EngineState {
        let mut state = EngineState::new(AccountId::from_byte(7), EngineConfig::default());
        state.sequence = sequence;
        state.pool.core_liquid = 42;
        state
    }

    fn save(storage: &Storage, state: &EngineState) {
        storage
            .save_snapshot(state.sequence, state.root_hash(), state)
            .unwrap();
    }

    #[test]
    fn memory_round_trip_keeps_history() {
        let storage = Storage::memory();
        assert!(storage.load_latest::<EngineState>().unwrap().is_none());
        assert!(storage.state_root().unwrap().is_none());

        let first = sample_state(1);
        save(&storage, &first);
        let mut second = sample_state(2);
        second.paused = true;
        save(&storage, &second);

        assert_eq!(storage.load_latest().unwrap(), Some(second.clone()));
        assert_eq!(storage.load_at(1).unwrap(), Some(first.clone()));
        assert_ne!(storage.state_root().unwrap(), Some(first.root_hash()));
        assert_eq!(storage.state_root().unwrap(), Some(second.root_hash()));
    }

    #[test]
    fn old_history_is_pruned() {
        let storage = Storage::memory().with_retention(2);
        for sequence in 1..=5 {
            save(&storage, &sample_state(sequence));
        }
        for sequence in 1..=3 {
            assert!(storage.load_at::<EngineState>(sequence).unwrap().is_none(), "{sequence} kept");
        }
        assert_eq!(storage.load_at(4).unwrap(), Some(sample_state(4)));
        assert_eq!(storage.load_latest().unwrap(), Some(sample_state(5)));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state(5);
        {
            let storage = Storage::open_dir(dir.path()).unwrap().with_retention(1);
            save(&storage, &sample_state(4));
            save(&storage, &state);
        }
        let storage = Storage::open_dir(dir.path()).unwrap();
        assert_eq!(storage.load_latest().unwrap(), Some(state.clone()));
        assert_eq!(storage.state_root().unwrap(), Some(state.root_hash()));
        assert!(!dir.path().join("snapshot_4.bin").exists());
        assert!(storage.load_at::<EngineState>(9).unwrap().is_none());
    }
}
