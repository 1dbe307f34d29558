//! Live camera+microphone session.
//!
//! A [`MediaSession`] owns the capture threads for its entire lifetime.
//! Frame dimensions are discovered asynchronously: the latest-frame watch
//! slot starts at `None` and the first published frame doubles as the
//! metadata-ready signal. `close()` stops both devices and is safe to call
//! on every teardown path; `Drop` is the safety net.

use crate::camera::{Camera, CameraError};
use crate::microphone::{self, AudioFormat, MicrophoneError};
use facetrack_core::frame::VideoFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("microphone error: {0}")]
    Microphone(#[from] MicrophoneError),
}

/// Live capture handles plus the negotiated track settings.
pub struct MediaSession {
    run: Arc<AtomicBool>,
    camera_thread: Option<std::thread::JoinHandle<()>>,
    mic_thread: Option<std::thread::JoinHandle<()>>,
    frames: watch::Receiver<Option<VideoFrame>>,
    audio: Option<(AudioFormat, mpsc::Receiver<Vec<i16>>)>,
    track_settings: (u32, u32),
}

impl MediaSession {
    /// Acquire the camera (and optionally the microphone) and start
    /// streaming. Fails fast: any device-access error surfaces here and no
    /// threads are left running.
    pub fn open(
        camera_device: &str,
        req_width: u32,
        req_height: u32,
        with_audio: bool,
    ) -> Result<Self, SessionError> {
        let camera = Camera::open(camera_device, req_width, req_height)?;
        let track_settings = camera.settings();

        let run = Arc::new(AtomicBool::new(true));

        let audio = if with_audio {
            match microphone::spawn_capture(run.clone()) {
                Ok((format, rx, handle)) => Some((format, rx, handle)),
                Err(e) => {
                    run.store(false, Ordering::Relaxed);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let (frames_tx, frames_rx) = watch::channel(None);
        let camera_run = run.clone();
        let camera_thread = std::thread::Builder::new()
            .name("facetrack-camera".into())
            .spawn(move || camera.run_capture_loop(frames_tx, camera_run))
            .expect("failed to spawn camera thread");

        let (audio_pair, mic_thread) = match audio {
            Some((format, rx, handle)) => (Some((format, rx)), Some(handle)),
            None => (None, None),
        };

        Ok(Self {
            run,
            camera_thread: Some(camera_thread),
            mic_thread,
            frames: frames_rx,
            audio: audio_pair,
            track_settings,
        })
    }

    /// Latest-frame slot. `None` until the first frame arrives and after
    /// the stream stops.
    pub fn frames(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.frames.clone()
    }

    /// Dimensions the driver reported back at negotiation time.
    pub fn track_settings(&self) -> (u32, u32) {
        self.track_settings
    }

    /// The audio track, if one was requested. Can only be taken once; the
    /// recorder consumes it for the duration of the session.
    pub fn take_audio(&mut self) -> Option<(AudioFormat, mpsc::Receiver<Vec<i16>>)> {
        self.audio.take()
    }

    /// Wait until the video reports usable dimensions. Returns `None` if
    /// the stream ends first.
    pub async fn metadata_ready(&self) -> Option<(u32, u32)> {
        let mut frames = self.frames.clone();
        let guard = frames.wait_for(|f| f.is_some()).await.ok()?;
        guard.as_ref().and_then(|f| f.dimensions())
    }

    /// Stop both capture threads and release the devices.
    pub fn close(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        if let Some(handle) = self.mic_thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
        if let Some(handle) = self.camera_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}
