//! Command implementations.
//!
//! `record` wires the full pipeline: media session, detection loop,
//! recorder and store. The teardown order is fixed — recorder first (it
//! feeds the encoder), then the detection loop, then the capture threads —
//! and runs on every exit path, including encoder failure and Ctrl-C.

use crate::config::{Config, REQUESTED_HEIGHT, REQUESTED_WIDTH};
use anyhow::Context;
use chrono::{Local, TimeZone};
use facetrack_core::{FixedRegionDetector, OverlaySurface};
use facetrack_hw::{Camera, MediaSession};
use facetrack_pipeline::tracker::DETECTION_PERIOD;
use facetrack_pipeline::{spawn_detection_loop, FfmpegEncoder, FinishedRecording, Recorder};
use facetrack_store::{FsKvStore, RecordingStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn open_store(config: &Config) -> anyhow::Result<RecordingStore> {
    let kv = FsKvStore::open(&config.data_dir)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
    let kv = match config.store_quota_bytes {
        Some(quota) => kv.with_quota(quota),
        None => kv,
    };
    Ok(RecordingStore::new(Box::new(kv))?)
}

/// Record until Ctrl-C (or for `duration` seconds), then save.
pub async fn record(config: &Config, duration: Option<u64>) -> anyhow::Result<()> {
    let mut store = open_store(config)?;

    let mut session = MediaSession::open(
        &config.camera_device,
        REQUESTED_WIDTH,
        REQUESTED_HEIGHT,
        config.audio_enabled,
    )
    .with_context(|| format!("opening capture devices ({})", config.camera_device))?;

    let overlay = Arc::new(Mutex::new(OverlaySurface::new(0, 0)));
    let tracker = spawn_detection_loop(
        session.frames(),
        overlay.clone(),
        Box::new(FixedRegionDetector),
        DETECTION_PERIOD,
    );

    let mut recorder = Recorder::new(Arc::new(FfmpegEncoder::new()), config.recorder_config());
    let audio = session.take_audio();

    let result = run_session(
        &mut recorder,
        &session,
        overlay.clone(),
        audio,
        duration,
    )
    .await;

    tracker.stop();
    session.close();

    match result? {
        Some(finished) => report_saved(&mut store, finished),
        None => {
            println!("Nothing recorded.");
            Ok(())
        }
    }
}

async fn run_session(
    recorder: &mut Recorder,
    session: &MediaSession,
    overlay: Arc<Mutex<OverlaySurface>>,
    audio: Option<(
        facetrack_hw::AudioFormat,
        tokio::sync::mpsc::Receiver<Vec<i16>>,
    )>,
    duration: Option<u64>,
) -> anyhow::Result<Option<FinishedRecording>> {
    recorder
        .start(
            session.frames(),
            overlay,
            session.track_settings(),
            audio,
        )
        .await
        .context("starting recorder")?;

    match duration {
        Some(secs) => {
            println!("Recording for {secs}s...");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        None => {
            println!("Recording... press Ctrl-C to stop.");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    recorder.stop().await.context("finalizing recording")
}

fn report_saved(store: &mut RecordingStore, finished: FinishedRecording) -> anyhow::Result<()> {
    let duration = finished.duration_secs;
    let format = finished.format;
    let size = finished.payload.len() as u64;
    let outcome = store.save(finished.payload, format, duration)?;

    println!(
        "Saved recording {} ({format}, {}, {})",
        outcome.id,
        format_duration(duration),
        format_size(size),
    );
    if let Some(warning) = outcome.persist_warning {
        tracing::warn!(error = %warning, "recording kept in this session only");
        println!("Warning: persistent store write failed; the recording will not survive exit.");
    }
    Ok(())
}

/// List the stored recordings, newest first.
pub fn list(config: &Config) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    let count = store.load_all()?;
    if count == 0 {
        println!("No recordings.");
        return Ok(());
    }

    for recording in store.catalog() {
        let when = Local
            .timestamp_millis_opt(recording.timestamp_ms)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| recording.timestamp_ms.to_string());
        println!(
            "{}  {}  {}  {}  {}  {}",
            recording.id,
            recording.name,
            when,
            format_duration(recording.duration_secs),
            format_size(recording.size),
            recording.format,
        );
    }
    store.revoke_all();
    Ok(())
}

/// Write a recording's media bytes into `out` (default: current directory).
pub fn download(config: &Config, id: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    store.load_all()?;
    let dir = out.unwrap_or_else(|| PathBuf::from("."));
    let path = store.download(id, &dir)?;
    println!("Wrote {}", path.display());
    store.revoke_all();
    Ok(())
}

/// Delete a recording from the store.
pub fn delete(config: &Config, id: &str) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    store.load_all()?;
    if store.get(id).is_none() {
        println!("No recording with id {id}.");
        return Ok(());
    }
    store.delete(id)?;
    println!("Deleted {id}.");
    store.revoke_all();
    Ok(())
}

/// Enumerate capture devices.
pub fn devices() -> anyhow::Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video devices found.");
        return Ok(());
    }
    for dev in devices {
        println!("{}  {} ({} on {})", dev.path, dev.name, dev.driver, dev.bus);
    }
    Ok(())
}

fn format_duration(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
