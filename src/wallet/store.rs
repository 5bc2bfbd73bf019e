//! Canonical wallet list persistence
//!
//! Files are replaced by writing a sibling temp file and renaming it over
//! the target, so a crash mid-write leaves the previous list intact.
//! There is no cross-process lock: the last writer wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::types::WalletRecord;

/// Reads and rewrites the canonical wallet file
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the list; a missing or unreadable file is an error
    pub fn load(&self) -> Result<Vec<WalletRecord>> {
        let records: Vec<WalletRecord> = read_json(&self.path)?;
        info!("Loaded {} wallets from {}", records.len(), self.path.display());
        Ok(records)
    }

    /// Load the list, treating a missing or unreadable file as empty
    pub fn load_or_empty(&self) -> Vec<WalletRecord> {
        if !self.path.exists() {
            info!("{} does not exist yet, starting empty", self.path.display());
            return Vec::new();
        }
        match self.load() {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not load {}: {} (starting empty)", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Replace the file with `records`
    pub fn save(&self, records: &[WalletRecord]) -> Result<()> {
        write_json_atomic(&self.path, records)?;
        info!("Saved {} wallets to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Parse a JSON file into `T`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| Error::Persistence(format!("temp file in {}: {}", parent.display(), e)))?;
    tmp.write_all(data.as_bytes())
        .map_err(|e| Error::Persistence(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::Persistence(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e.error)))?;

    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}
