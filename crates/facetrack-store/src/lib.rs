//! facetrack-store — Persistence for finished recordings.
//!
//! A [`RecordingStore`] is the single owner of both the in-memory catalog
//! and the persistent key-value client; save/load/delete are its only
//! mutation points. Recordings are stored one per key under a reserved
//! namespace, as JSON with the payload encoded as a plain integer array.

pub mod kv;
pub mod recording;
pub mod store;

pub use kv::{FsKvStore, KvError, KvStore, MemoryKvStore};
pub use recording::{PlaybackHandle, Recording};
pub use store::{RecordingStore, SaveOutcome, StoreError, KEY_NAMESPACE};
