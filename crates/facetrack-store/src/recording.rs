//! Recording artifact and its persisted shape.

use facetrack_core::EncodingFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A finished, cataloged recording.
pub struct Recording {
    pub id: String,
    pub name: String,
    /// Encoded container bytes. Invariant: never empty.
    pub payload: Vec<u8>,
    /// Creation time, milliseconds since the epoch.
    pub timestamp_ms: i64,
    pub duration_secs: u64,
    pub size: u64,
    pub format: EncodingFormat,
    /// Transient handle for playback without re-reading the store.
    pub playback: Option<PlaybackHandle>,
}

/// Persisted record value. `data` serializes as a plain JSON array of
/// integers 0-255 — the store is text-only, and this encoding is the
/// compatibility contract with existing stores. `format` is newer; records
/// without it load as plain WebM.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub id: String,
    pub name: String,
    pub data: Vec<u8>,
    pub timestamp: i64,
    pub duration: u64,
    pub size: u64,
    #[serde(default)]
    pub format: Option<String>,
}

impl StoredRecord {
    pub(crate) fn format(&self) -> EncodingFormat {
        self.format
            .as_deref()
            .and_then(EncodingFormat::from_mime)
            .unwrap_or(EncodingFormat::Webm)
    }
}

/// A revocable file-backed reference to a recording's media bytes.
///
/// Lives in the store's transient media directory; revocation deletes the
/// file so decoded media is not held around after deletion or teardown.
pub struct PlaybackHandle {
    path: PathBuf,
}

impl PlaybackHandle {
    pub(crate) fn create(
        dir: &Path,
        id: &str,
        format: EncodingFormat,
        payload: &[u8],
    ) -> std::io::Result<Self> {
        let path = dir.join(format!("{id}.{}", format.extension()));
        std::fs::write(&path, payload)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn revoke(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to revoke playback handle");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_record_payload_is_integer_array() {
        let record = StoredRecord {
            id: "abc".into(),
            name: "clip".into(),
            data: vec![0, 127, 255],
            timestamp: 1_700_000_000_000,
            duration: 3,
            size: 3,
            format: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"data\":[0,127,255]"));
    }

    #[test]
    fn test_record_without_format_loads_as_webm() {
        let json = r#"{"id":"a","name":"n","data":[1],"timestamp":1,"duration":1,"size":1}"#;
        let record: StoredRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.format(), EncodingFormat::Webm);
    }

    #[test]
    fn test_record_with_format_round_trips() {
        let record = StoredRecord {
            id: "a".into(),
            name: "n".into(),
            data: vec![1],
            timestamp: 1,
            duration: 1,
            size: 1,
            format: Some(EncodingFormat::WebmVp9.mime().to_string()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: StoredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.format(), EncodingFormat::WebmVp9);
    }

    #[test]
    fn test_playback_handle_revoke_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle =
            PlaybackHandle::create(dir.path(), "clip", EncodingFormat::Webm, &[1, 2, 3]).unwrap();
        let path = handle.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "webm");
        handle.revoke();
        assert!(!path.exists());
    }
}
