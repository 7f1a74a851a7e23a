//! Where ledger snapshots live between sessions.
//!
//! Whether progress survives a reload is an integration decision. The
//! viewer only needs something implementing [`LedgerStore`]; a volatile
//! in-memory store and a JSON-file store are provided.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::ledger::LedgerSnapshot;
use crate::{Error, Result};

/// Storage for ledger snapshots keyed by sequence id
pub trait LedgerStore: Send + Sync {
    fn load(&self, sequence_id: &str) -> Result<Option<LedgerSnapshot>>;

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()>;

    fn clear(&self, sequence_id: &str) -> Result<()>;
}

/// Volatile store: progress lasts as long as the process
#[derive(Default)]
pub struct MemoryLedgerStore {
    snapshots: Mutex<HashMap<String, LedgerSnapshot>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self, sequence_id: &str) -> Result<Option<LedgerSnapshot>> {
        let g = self
            .snapshots
            .lock()
            .map_err(|_| Error::StorageError("memory store lock poisoned".to_string()))?;
        Ok(g.get(sequence_id).cloned())
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let mut g = self
            .snapshots
            .lock()
            .map_err(|_| Error::StorageError("memory store lock poisoned".to_string()))?;
        g.insert(snapshot.sequence_id.clone(), snapshot.clone());
        Ok(())
    }

    fn clear(&self, sequence_id: &str) -> Result<()> {
        let mut g = self
            .snapshots
            .lock()
            .map_err(|_| Error::StorageError("memory store lock poisoned".to_string()))?;
        g.remove(sequence_id);
        Ok(())
    }
}

/// One JSON file per sequence inside a directory.
///
/// File names are the hex SHA-256 of the sequence id, so arbitrary ids are
/// safe on any filesystem. Writes go to a temp file that is renamed over
/// the target.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::StorageError(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(JsonFileStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sequence_id: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(sequence_id.as_bytes()));
        self.dir.join(format!("{}.json", name))
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self, sequence_id: &str) -> Result<Option<LedgerSnapshot>> {
        let path = self.path_for(sequence_id);
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::StorageError(format!("read {}: {}", path.display(), e))),
        };
        let snapshot: LedgerSnapshot = serde_json::from_str(&data)?;
        if snapshot.sequence_id != sequence_id {
            return Err(Error::SnapshotMismatch(format!(
                "{} holds sequence '{}', expected '{}'",
                path.display(),
                snapshot.sequence_id,
                sequence_id
            )));
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.sequence_id);
        let json = serde_json::to_vec_pretty(snapshot)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::StorageError(format!("temp file in {}: {}", self.dir.display(), e)))?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.persist(&path)
            .map_err(|e| Error::StorageError(format!("write {}: {}", path.display(), e)))?;
        log::debug!("saved ledger for '{}' to {}", snapshot.sequence_id, path.display());
        Ok(())
    }

    fn clear(&self, sequence_id: &str) -> Result<()> {
        let path = self.path_for(sequence_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageError(format!("remove {}: {}", path.display(), e))),
        }
    }
}
