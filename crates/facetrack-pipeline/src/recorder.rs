//! Recording lifecycle: `idle → recording → finalizing → idle`.
//!
//! While a session is active, a per-refresh composite task draws the
//! latest video frame plus the shared overlay into an off-screen buffer
//! and feeds it to the encoder. Encoded chunks are buffered in arrival
//! order by a collector task driven by the encoder's event stream, and
//! finalization completes only when that stream delivers its terminal
//! event — never when `stop()` merely returns.

use crate::encoder::{EncoderConfig, EncoderEvent, EncoderSink, StreamEncoder};
use crate::format::{negotiate_format, EncodingFormat};
use crate::PipelineError;
use chrono::{DateTime, Utc};
use facetrack_core::{resolve_dimensions, Compositor, OverlaySurface, VideoFrame};
use facetrack_hw::AudioFormat;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecorderState {
    Idle = 0,
    Recording = 1,
    Finalizing = 2,
}

/// Shared state slot. The chunk collector moves `Recording → Finalizing`
/// when the encoder's event stream terminates on its own, so the machine
/// leaves `Recording` as soon as the underlying stream does.
#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(RecorderState::Idle as u8)))
    }

    fn get(&self) -> RecorderState {
        match self.0.load(Ordering::Relaxed) {
            x if x == RecorderState::Recording as u8 => RecorderState::Recording,
            x if x == RecorderState::Finalizing as u8 => RecorderState::Finalizing,
            _ => RecorderState::Idle,
        }
    }

    fn set(&self, state: RecorderState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    fn transition(&self, from: RecorderState, to: RecorderState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub fps: u32,
    pub video_bitrate: u32,
    /// Interval between encoded output slices.
    pub timeslice: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate: 2_500_000,
            timeslice: Duration::from_secs(1),
        }
    }
}

/// A finalized capture, ready for the recording store.
#[derive(Debug)]
pub struct FinishedRecording {
    pub payload: Vec<u8>,
    pub format: EncodingFormat,
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
}

struct ActiveSession {
    format: EncodingFormat,
    started_at: DateTime<Utc>,
    sink: Arc<dyn EncoderSink>,
    collector: JoinHandle<Result<Vec<Vec<u8>>, PipelineError>>,
    composite_task: JoinHandle<()>,
    timer_task: JoinHandle<()>,
    audio_task: Option<JoinHandle<()>>,
}

pub struct Recorder {
    encoder: Arc<dyn StreamEncoder>,
    config: RecorderConfig,
    state: StateCell,
    elapsed: Arc<AtomicU64>,
    active: Option<ActiveSession>,
}

impl Recorder {
    pub fn new(encoder: Arc<dyn StreamEncoder>, config: RecorderConfig) -> Self {
        Self {
            encoder,
            config,
            state: StateCell::new(),
            elapsed: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    /// Whole seconds elapsed in the active session. Stays readable through
    /// finalization; resets to 0 once the machine is idle again.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    /// Start a recording session. A start request while a session is
    /// active is a no-op and returns `Ok(false)`.
    ///
    /// Waits for the video to report usable dimensions before the first
    /// composite, negotiates the encoding format, then spawns the
    /// composite loop, the elapsed-seconds timer, the audio forwarder and
    /// the chunk collector. Any failure here leaves the state at `Idle`
    /// with nothing spawned.
    pub async fn start(
        &mut self,
        mut frames: watch::Receiver<Option<VideoFrame>>,
        overlay: Arc<Mutex<OverlaySurface>>,
        track_settings: (u32, u32),
        audio: Option<(AudioFormat, mpsc::Receiver<Vec<i16>>)>,
    ) -> Result<bool, PipelineError> {
        if self.state.get() != RecorderState::Idle {
            tracing::debug!(state = ?self.state.get(), "start ignored; session already active");
            return Ok(false);
        }

        // Metadata-ready gate: never composite blank frames.
        let frame_dims = frames
            .wait_for(|f| f.is_some())
            .await
            .map_err(|_| PipelineError::StreamEnded)?
            .as_ref()
            .and_then(|f| f.dimensions());
        let (width, height) = resolve_dimensions(frame_dims, Some(track_settings));

        let format = negotiate_format(self.encoder.as_ref())?;

        let (sink, mut events) = self.encoder.start(EncoderConfig {
            format,
            width,
            height,
            fps: self.config.fps,
            video_bitrate: self.config.video_bitrate,
            timeslice: self.config.timeslice,
            audio: audio.as_ref().map(|(f, _)| *f),
        })?;

        self.elapsed.store(0, Ordering::Relaxed);
        self.state.set(RecorderState::Recording);

        // Buffer encoded slices in arrival order until the terminal event.
        // A stream that terminates on its own (encoder death, closed pipe)
        // moves the machine to finalizing without waiting for stop().
        let collector = {
            let state = self.state.clone();
            tokio::spawn(async move {
                let mut chunks: Vec<Vec<u8>> = Vec::new();
                while let Some(event) = events.recv().await {
                    match event {
                        EncoderEvent::Chunk(chunk) => {
                            if !chunk.is_empty() {
                                chunks.push(chunk);
                            }
                        }
                        EncoderEvent::Finished => {
                            state.transition(RecorderState::Recording, RecorderState::Finalizing);
                            return Ok(chunks);
                        }
                        EncoderEvent::Error(msg) => {
                            state.transition(RecorderState::Recording, RecorderState::Finalizing);
                            return Err(PipelineError::Encoder(msg));
                        }
                    }
                }
                state.transition(RecorderState::Recording, RecorderState::Finalizing);
                Err(PipelineError::Encoder("encoder event stream closed".into()))
            })
        };

        let composite_task = {
            let sink = sink.clone();
            let frames = frames.clone();
            let overlay = overlay.clone();
            let fps = self.config.fps.max(1);
            tokio::spawn(async move {
                let mut compositor = Compositor::new(width, height);
                let mut interval =
                    tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    let frame = frames.borrow().clone();
                    let Some(frame) = frame else {
                        continue;
                    };
                    {
                        let surface = overlay.lock().expect("overlay lock poisoned");
                        compositor.composite(&frame, &surface);
                    }
                    sink.write_frame(compositor.buffer().to_vec());
                }
            })
        };

        let timer_task = {
            let elapsed = self.elapsed.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                interval.tick().await; // consume the immediate first tick
                loop {
                    interval.tick().await;
                    elapsed.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let audio_task = audio.map(|(_, mut rx)| {
            let sink = sink.clone();
            tokio::spawn(async move {
                while let Some(samples) = rx.recv().await {
                    sink.write_audio(samples);
                }
            })
        });

        self.active = Some(ActiveSession {
            format,
            started_at: Utc::now(),
            sink,
            collector,
            composite_task,
            timer_task,
            audio_task,
        });
        tracing::info!(%format, width, height, "recording started");
        Ok(true)
    }

    /// Stop the active session. A stop request while idle is a no-op and
    /// returns `Ok(None)`.
    ///
    /// Signals the encoder to finalize, cancels the periodic tasks, then
    /// waits for the encoder's completion event before concatenating the
    /// buffered slices. A zero-byte concatenation is an
    /// [`PipelineError::EmptyRecording`] and produces nothing. The state
    /// is back at `Idle` on every exit path.
    pub async fn stop(&mut self) -> Result<Option<FinishedRecording>, PipelineError> {
        let Some(session) = self.active.take() else {
            tracing::debug!("stop ignored; no active session");
            return Ok(None);
        };
        self.state.set(RecorderState::Finalizing);

        session.composite_task.abort();
        session.timer_task.abort();
        if let Some(task) = session.audio_task {
            task.abort();
        }
        session.sink.stop();

        let collected = session.collector.await;
        let duration_secs = self.elapsed.swap(0, Ordering::Relaxed);
        self.state.set(RecorderState::Idle);

        let chunks = match collected {
            Ok(result) => result?,
            Err(e) => {
                return Err(PipelineError::Encoder(format!("chunk collector failed: {e}")))
            }
        };

        let payload: Vec<u8> = chunks.concat();
        if payload.is_empty() {
            tracing::warn!("finalize produced no data");
            return Err(PipelineError::EmptyRecording);
        }
        tracing::info!(
            bytes = payload.len(),
            duration_secs,
            format = %session.format,
            "recording finalized"
        );

        Ok(Some(FinishedRecording {
            payload,
            format: session.format,
            duration_secs,
            started_at: session.started_at,
        }))
    }

    /// Cancel without producing a recording; used on teardown paths.
    pub fn abort(&mut self) {
        if let Some(session) = self.active.take() {
            session.composite_task.abort();
            session.timer_task.abort();
            if let Some(task) = session.audio_task {
                task.abort();
            }
            session.sink.stop();
            session.collector.abort();
        }
        self.elapsed.store(0, Ordering::Relaxed);
        self.state.set(RecorderState::Idle);
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Scripted encoder: records written frames, and on `stop()` replays a
    /// fixed chunk sequence followed by the configured terminal event.
    struct MockEncoder {
        supported: Vec<EncodingFormat>,
        chunks_on_stop: Vec<Vec<u8>>,
        fail_on_stop: Option<String>,
        frames_written: Arc<AtomicUsize>,
        sessions_started: Arc<AtomicUsize>,
    }

    impl MockEncoder {
        fn new(chunks_on_stop: Vec<Vec<u8>>) -> Self {
            Self {
                supported: EncodingFormat::PREFERENCE.to_vec(),
                chunks_on_stop,
                fail_on_stop: None,
                frames_written: Arc::new(AtomicUsize::new(0)),
                sessions_started: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    struct MockSink {
        event_tx: mpsc::Sender<EncoderEvent>,
        chunks: Vec<Vec<u8>>,
        fail: Option<String>,
        frames_written: Arc<AtomicUsize>,
    }

    impl EncoderSink for MockSink {
        fn write_frame(&self, _rgba: Vec<u8>) {
            self.frames_written.fetch_add(1, Ordering::Relaxed);
        }

        fn write_audio(&self, _samples: Vec<i16>) {}

        fn stop(&self) {
            for chunk in &self.chunks {
                let _ = self.event_tx.try_send(EncoderEvent::Chunk(chunk.clone()));
            }
            let terminal = match &self.fail {
                Some(msg) => EncoderEvent::Error(msg.clone()),
                None => EncoderEvent::Finished,
            };
            let _ = self.event_tx.try_send(terminal);
        }
    }

    impl StreamEncoder for MockEncoder {
        fn supports(&self, format: EncodingFormat) -> bool {
            self.supported.contains(&format)
        }

        fn start(
            &self,
            _config: EncoderConfig,
        ) -> Result<(Arc<dyn EncoderSink>, mpsc::Receiver<EncoderEvent>), PipelineError>
        {
            self.sessions_started.fetch_add(1, Ordering::Relaxed);
            let (event_tx, event_rx) = mpsc::channel(32);
            Ok((
                Arc::new(MockSink {
                    event_tx,
                    chunks: self.chunks_on_stop.clone(),
                    fail: self.fail_on_stop.clone(),
                    frames_written: self.frames_written.clone(),
                }),
                event_rx,
            ))
        }
    }

    fn test_frame() -> VideoFrame {
        VideoFrame {
            data: vec![0; 8 * 8 * 4],
            width: 8,
            height: 8,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    fn live_inputs() -> (
        watch::Receiver<Option<VideoFrame>>,
        watch::Sender<Option<VideoFrame>>,
        Arc<Mutex<OverlaySurface>>,
    ) {
        let (tx, rx) = watch::channel(Some(test_frame()));
        (rx, tx, Arc::new(Mutex::new(OverlaySurface::new(8, 8))))
    }

    fn recorder(encoder: MockEncoder) -> Recorder {
        Recorder::new(Arc::new(encoder), RecorderConfig::default())
    }

    #[tokio::test]
    async fn test_start_then_stop_concatenates_chunks_in_order() {
        let mut rec = recorder(MockEncoder::new(vec![vec![1, 2], vec![3], vec![4, 5]]));
        let (frames, _tx, overlay) = live_inputs();

        assert!(rec.start(frames, overlay, (8, 8), None).await.unwrap());
        assert_eq!(rec.state(), RecorderState::Recording);

        let finished = rec.stop().await.unwrap().expect("recording expected");
        assert_eq!(finished.payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(finished.format, EncodingFormat::WebmVp9);
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_start_while_recording_is_noop() {
        let encoder = MockEncoder::new(vec![vec![9]]);
        let sessions = encoder.sessions_started.clone();
        let mut rec = recorder(encoder);
        let (frames, _tx, overlay) = live_inputs();

        assert!(rec
            .start(frames.clone(), overlay.clone(), (8, 8), None)
            .await
            .unwrap());
        // Second start: no error, no second session
        assert!(!rec.start(frames, overlay, (8, 8), None).await.unwrap());
        assert_eq!(rec.state(), RecorderState::Recording);
        assert_eq!(sessions.load(Ordering::Relaxed), 1);

        rec.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let mut rec = recorder(MockEncoder::new(vec![]));
        assert!(rec.stop().await.unwrap().is_none());
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_zero_chunks_is_empty_recording() {
        let mut rec = recorder(MockEncoder::new(vec![]));
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        let result = rec.stop().await;
        assert!(matches!(result, Err(PipelineError::EmptyRecording)));
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_empty_chunks_do_not_mask_empty_recording() {
        // Encoders may deliver zero-length slices; they count for nothing.
        let mut rec = recorder(MockEncoder::new(vec![vec![], vec![]]));
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        assert!(matches!(rec.stop().await, Err(PipelineError::EmptyRecording)));
    }

    #[tokio::test]
    async fn test_encoder_error_fails_finalize_without_partial_result() {
        let mut encoder = MockEncoder::new(vec![vec![1, 2, 3]]);
        encoder.fail_on_stop = Some("pipe broke".into());
        let mut rec = recorder(encoder);
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        match rec.stop().await {
            Err(PipelineError::Encoder(msg)) => assert!(msg.contains("pipe broke")),
            other => panic!("expected encoder error, got {other:?}"),
        }
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    struct NullSink;

    impl EncoderSink for NullSink {
        fn write_frame(&self, _rgba: Vec<u8>) {}
        fn write_audio(&self, _samples: Vec<i16>) {}
        fn stop(&self) {}
    }

    /// Encoder whose event stream the test drives directly, standing in
    /// for a process that dies without a stop request.
    struct DetachedEncoder {
        event_tx: Arc<std::sync::Mutex<Option<mpsc::Sender<EncoderEvent>>>>,
    }

    impl StreamEncoder for DetachedEncoder {
        fn supports(&self, _format: EncodingFormat) -> bool {
            true
        }

        fn start(
            &self,
            _config: EncoderConfig,
        ) -> Result<(Arc<dyn EncoderSink>, mpsc::Receiver<EncoderEvent>), PipelineError>
        {
            let (tx, rx) = mpsc::channel(8);
            *self.event_tx.lock().unwrap() = Some(tx);
            Ok((Arc::new(NullSink), rx))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoder_death_finalizes_without_stop() {
        let slot = Arc::new(std::sync::Mutex::new(None));
        let mut rec = Recorder::new(
            Arc::new(DetachedEncoder {
                event_tx: slot.clone(),
            }),
            RecorderConfig::default(),
        );
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        tokio::task::yield_now().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }

        let event_tx = slot.lock().unwrap().take().unwrap();
        event_tx
            .send(EncoderEvent::Error("encoder process died".into()))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        // The dead stream moves the machine out of Recording on its own,
        // and the elapsed counter stays readable until finalization ends.
        assert_eq!(rec.state(), RecorderState::Finalizing);
        assert_eq!(rec.elapsed_secs(), 2);

        match rec.stop().await {
            Err(PipelineError::Encoder(msg)) => assert!(msg.contains("died")),
            other => panic!("expected encoder error, got {other:?}"),
        }
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(rec.elapsed_secs(), 0);
    }

    #[tokio::test]
    async fn test_no_supported_format_reverts_to_idle() {
        let mut encoder = MockEncoder::new(vec![vec![1]]);
        encoder.supported.clear();
        let mut rec = recorder(encoder);
        let (frames, _tx, overlay) = live_inputs();

        let result = rec.start(frames, overlay, (8, 8), None).await;
        assert!(matches!(result, Err(PipelineError::UnsupportedFormat)));
        assert_eq!(rec.state(), RecorderState::Idle);
        // Nothing to finalize afterwards
        assert!(rec.stop().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_counter_counts_completed_seconds() {
        let mut rec = recorder(MockEncoder::new(vec![vec![7]]));
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        // Let the spawned timer register its interval before moving the clock
        tokio::task::yield_now().await;
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(rec.elapsed_secs(), 3);

        let finished = rec.stop().await.unwrap().unwrap();
        assert_eq!(finished.duration_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_loop_feeds_encoder_while_recording() {
        let encoder = MockEncoder::new(vec![vec![7]]);
        let frames_written = encoder.frames_written.clone();
        let mut rec = recorder(encoder);
        let (frames, _tx, overlay) = live_inputs();

        rec.start(frames, overlay, (8, 8), None).await.unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(frames_written.load(Ordering::Relaxed) > 0);

        let before_stop = frames_written.load(Ordering::Relaxed);
        rec.stop().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        // Composite loop is cancelled by stop
        assert_eq!(frames_written.load(Ordering::Relaxed), before_stop);
    }

    #[tokio::test]
    async fn test_dimension_gate_uses_track_settings_fallback() {
        // Frame present but with zero dimensions: the compositor falls back
        // to the negotiated track settings.
        let mut rec = recorder(MockEncoder::new(vec![vec![1]]));
        let zero = VideoFrame {
            data: Vec::new(),
            width: 0,
            height: 0,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let (_tx, frames) = {
            let (tx, rx) = watch::channel(Some(zero));
            (tx, rx)
        };
        let overlay = Arc::new(Mutex::new(OverlaySurface::new(0, 0)));

        assert!(rec.start(frames, overlay, (320, 240), None).await.unwrap());
        rec.stop().await.unwrap();
    }
}
