//! Recording repository: catalog + persistent store + playback handles.

use crate::kv::{KvError, KvStore};
use crate::recording::{PlaybackHandle, Recording, StoredRecord};
use chrono::{Local, Utc};
use facetrack_core::EncodingFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Reserved key namespace in the persistent store.
pub const KEY_NAMESPACE: &str = "face-tracking-video-";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("refusing to save an empty recording")]
    EmptyPayload,
    #[error("recording not found: {0}")]
    NotFound(String),
    #[error("persistent write failed: {0}")]
    PersistenceWrite(#[from] KvError),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a save. A failed persistent write does not abort the save —
/// the recording stays in the catalog for the session — but the failure is
/// reported here so callers can warn.
pub struct SaveOutcome {
    pub id: String,
    pub persist_warning: Option<KvError>,
}

/// Owns the in-memory catalog, the key-value client and the transient
/// media directory for playback handles. All catalog mutation goes
/// through `save`, `load_all` and `delete`.
pub struct RecordingStore {
    kv: Box<dyn KvStore>,
    catalog: Vec<Recording>,
    media_dir: tempfile::TempDir,
}

impl RecordingStore {
    pub fn new(kv: Box<dyn KvStore>) -> Result<Self, StoreError> {
        Ok(Self {
            kv,
            catalog: Vec::new(),
            media_dir: tempfile::tempdir()?,
        })
    }

    /// Catalog entries, newest first.
    pub fn catalog(&self) -> &[Recording] {
        &self.catalog
    }

    pub fn get(&self, id: &str) -> Option<&Recording> {
        self.catalog.iter().find(|r| r.id == id)
    }

    fn key_for(id: &str) -> String {
        format!("{KEY_NAMESPACE}{id}")
    }

    /// Persist a finished recording and prepend it to the catalog.
    ///
    /// Store-write failures (quota, I/O) degrade to session-only
    /// durability: the recording is still returned and cataloged, with the
    /// failure reported in the outcome.
    pub fn save(
        &mut self,
        payload: Vec<u8>,
        format: EncodingFormat,
        duration_secs: u64,
    ) -> Result<SaveOutcome, StoreError> {
        if payload.is_empty() {
            return Err(StoreError::EmptyPayload);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let timestamp_ms = Utc::now().timestamp_millis();
        let name = format!(
            "Face Tracking Recording {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let size = payload.len() as u64;

        let record = StoredRecord {
            id: id.clone(),
            name: name.clone(),
            data: payload.clone(),
            timestamp: timestamp_ms,
            duration: duration_secs,
            size,
            format: Some(format.mime().to_string()),
        };
        let value = serde_json::to_string(&record)?;

        let persist_warning = match self.kv.set(&Self::key_for(&id), &value) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(id, error = %e, "persistent write failed; keeping recording in memory only");
                Some(e)
            }
        };

        let playback = self.materialize_playback(&id, format, &payload);

        self.catalog.insert(
            0,
            Recording {
                id: id.clone(),
                name,
                payload,
                timestamp_ms,
                duration_secs,
                size,
                format,
                playback,
            },
        );

        tracing::info!(id, bytes = size, duration_secs, "recording saved");
        Ok(SaveOutcome {
            id,
            persist_warning,
        })
    }

    /// Rebuild the catalog from the persistent store. A corrupt entry is
    /// skipped and logged; it never fails the whole load. Returns the
    /// number of entries loaded.
    pub fn load_all(&mut self) -> Result<usize, StoreError> {
        for stale in self.catalog.drain(..) {
            if let Some(handle) = stale.playback {
                handle.revoke();
            }
        }

        let mut loaded = Vec::new();
        for key in self.kv.keys(KEY_NAMESPACE)? {
            let value = match self.kv.get(&key) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping unreadable store entry");
                    continue;
                }
            };
            let record: StoredRecord = match serde_json::from_str(&value) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping corrupt store entry");
                    continue;
                }
            };
            let format = record.format();
            let playback = self.materialize_playback(&record.id, format, &record.data);
            loaded.push(Recording {
                id: record.id,
                name: record.name,
                size: record.data.len() as u64,
                payload: record.data,
                timestamp_ms: record.timestamp,
                duration_secs: record.duration,
                format,
                playback,
            });
        }

        loaded.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        let count = loaded.len();
        self.catalog = loaded;
        tracing::info!(count, "catalog loaded");
        Ok(count)
    }

    /// Remove a recording everywhere: playback handle, persistent key,
    /// catalog entry. Deleting an unknown id is a no-op.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let Some(index) = self.catalog.iter().position(|r| r.id == id) else {
            tracing::debug!(id, "delete ignored; unknown id");
            return Ok(());
        };

        let recording = self.catalog.remove(index);
        if let Some(handle) = recording.playback {
            handle.revoke();
        }
        if let Err(e) = self.kv.remove(&Self::key_for(id)) {
            tracing::warn!(id, error = %e, "failed to remove persisted entry");
        }
        tracing::info!(id, "recording deleted");
        Ok(())
    }

    /// Write the recording's bytes as a downloadable file named from its
    /// display name and container extension. No persistent state changes.
    pub fn download(&self, id: &str, dir: &Path) -> Result<PathBuf, StoreError> {
        let recording = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let file_name = format!(
            "{}.{}",
            sanitize_file_name(&recording.name),
            recording.format.extension()
        );
        let path = dir.join(file_name);
        std::fs::write(&path, &recording.payload)?;
        Ok(path)
    }

    /// Drop all transient playback handles; called on teardown.
    pub fn revoke_all(&mut self) {
        for recording in &mut self.catalog {
            if let Some(handle) = recording.playback.take() {
                handle.revoke();
            }
        }
    }

    fn materialize_playback(
        &self,
        id: &str,
        format: EncodingFormat,
        payload: &[u8],
    ) -> Option<PlaybackHandle> {
        match PlaybackHandle::create(self.media_dir.path(), id, format, payload) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(id, error = %e, "playback handle unavailable");
                None
            }
        }
    }
}

/// Keep display names filesystem-safe without mangling them beyond
/// recognition.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
