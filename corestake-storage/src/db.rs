use crate::SnapshotStore;
use anyhow::{anyhow, Result};
use rocksdb::{Options, DB};

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| anyhow!("Failed to open DB: {}", e))?;
        Ok(Self { db })
    }
}

impl SnapshotStore for RocksStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put(key.as_bytes(), value)
            .map_err(|e| anyhow!("DB write error: {}", e))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key.as_bytes())
            .map_err(|e| anyhow!("DB read error: {}", e))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .delete(key.as_bytes())
            .map_err(|e| anyhow!("DB delete error: {}", e))
    }
}
