//! Namespaced key-value text store.
//!
//! The persistence contract is deliberately small: UTF-8 values under
//! string keys, with prefix enumeration. [`FsKvStore`] maps each key to
//! one file under a data directory; [`MemoryKvStore`] backs tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("store quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError>;
    fn remove(&mut self, key: &str) -> Result<(), KvError>;
    /// Keys starting with `prefix`, in unspecified order.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

/// One file per key under a data directory. An optional byte quota over
/// the sum of stored values makes capacity failures testable and keeps
/// the integer-array payload encoding from silently eating the disk.
pub struct FsKvStore {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FsKvStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KvError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn used_bytes_excluding(&self, key: &str) -> Result<u64, KvError> {
        let skip = self.path_for(key);
        let mut total = 0u64;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == skip {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

fn key_of(path: &Path) -> Option<&str> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()
}

impl KvStore for FsKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(key)?;
            let wanted = used + value.len() as u64;
            if wanted > quota {
                return Err(KvError::QuotaExceeded(format!(
                    "{wanted} bytes wanted, {quota} allowed"
                )));
            }
        }
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(key) = key_of(&path) {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<u64>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        if let Some(quota) = self.quota_bytes {
            let used: u64 = self
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            if used + value.len() as u64 > quota {
                return Err(KvError::QuotaExceeded(format!(
                    "{} bytes wanted, {quota} allowed",
                    used + value.len() as u64
                )));
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
