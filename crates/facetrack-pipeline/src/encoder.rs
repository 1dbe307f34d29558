//! Stream encoder abstraction and the ffmpeg-backed implementation.
//!
//! The recorder talks to an encoder through two halves: an [`EncoderSink`]
//! it feeds composited frames and audio into, and an event stream delivering
//! encoded chunks in arrival order followed by exactly one terminal event.
//! `stop()` only requests finalization — the terminal `Finished` arrives
//! after the encoder's own final flush.

use crate::format::EncodingFormat;
use crate::PipelineError;
use facetrack_hw::AudioFormat;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Asynchronous encoder output. `Chunk`s arrive roughly once per configured
/// time slice; the stream ends with exactly one `Finished` or `Error`.
#[derive(Debug)]
pub enum EncoderEvent {
    Chunk(Vec<u8>),
    Finished,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate: u32,
    /// Target interval between emitted chunks.
    pub timeslice: Duration,
    pub audio: Option<AudioFormat>,
}

/// Input half of a running encoder. Writes never block the caller; errors
/// surface through the event stream instead.
pub trait EncoderSink: Send + Sync {
    fn write_frame(&self, rgba: Vec<u8>);
    fn write_audio(&self, samples: Vec<i16>);
    /// Request finalization: flush, close inputs, deliver remaining chunks
    /// and the terminal event.
    fn stop(&self);
}

pub trait StreamEncoder: Send + Sync {
    /// Whether this encoder can produce the given container/codec combo.
    fn supports(&self, format: EncodingFormat) -> bool;

    fn start(
        &self,
        config: EncoderConfig,
    ) -> Result<(Arc<dyn EncoderSink>, mpsc::Receiver<EncoderEvent>), PipelineError>;
}

/// Encoder backed by an external `ffmpeg` process: raw RGBA frames on
/// stdin, s16le audio through a FIFO, encoded container bytes on stdout.
pub struct FfmpegEncoder {
    binary: String,
    encoders: OnceLock<Option<String>>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".into(),
            encoders: OnceLock::new(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    /// Cached `ffmpeg -encoders` output; `None` when ffmpeg is missing.
    fn encoder_list(&self) -> Option<&str> {
        self.encoders
            .get_or_init(|| {
                match Command::new(&self.binary)
                    .args(["-hide_banner", "-encoders"])
                    .output()
                {
                    Ok(out) if out.status.success() => {
                        Some(String::from_utf8_lossy(&out.stdout).into_owned())
                    }
                    Ok(out) => {
                        tracing::warn!(status = ?out.status, "ffmpeg -encoders failed");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ffmpeg not available");
                        None
                    }
                }
            })
            .as_deref()
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

enum SinkMsg {
    Frame(Vec<u8>),
    Audio(Vec<i16>),
    Stop,
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkMsg>,
}

impl EncoderSink for ChannelSink {
    fn write_frame(&self, rgba: Vec<u8>) {
        let _ = self.tx.send(SinkMsg::Frame(rgba));
    }

    fn write_audio(&self, samples: Vec<i16>) {
        let _ = self.tx.send(SinkMsg::Audio(samples));
    }

    fn stop(&self) {
        let _ = self.tx.send(SinkMsg::Stop);
    }
}

impl StreamEncoder for FfmpegEncoder {
    fn supports(&self, format: EncodingFormat) -> bool {
        self.encoder_list().is_some_and(|list| {
            list.contains(format.video_codec()) && list.contains(format.audio_codec())
        })
    }

    fn start(
        &self,
        config: EncoderConfig,
    ) -> Result<(Arc<dyn EncoderSink>, mpsc::Receiver<EncoderEvent>), PipelineError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| PipelineError::Encoder(format!("workdir: {e}")))?;

        // Audio goes through a FIFO so both inputs live in one process.
        let audio_fifo = match &config.audio {
            Some(_) => {
                let path = workdir.path().join("audio.pcm");
                nix::unistd::mkfifo(&path, nix::sys::stat::Mode::S_IRWXU)
                    .map_err(|e| PipelineError::Encoder(format!("mkfifo: {e}")))?;
                Some(path)
            }
            None => None,
        };

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd.args([
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", config.width, config.height),
            "-r",
            &config.fps.to_string(),
            "-i",
            "pipe:0",
        ]);
        if let (Some(fifo), Some(af)) = (&audio_fifo, &config.audio) {
            cmd.args([
                "-f",
                "s16le",
                "-ar",
                &af.sample_rate.to_string(),
                "-ac",
                &af.channels.to_string(),
                "-i",
            ])
            .arg(fifo);
        }
        cmd.args(["-c:v", config.format.video_codec()]);
        cmd.args(["-b:v", &config.video_bitrate.to_string()]);
        if config.audio.is_some() {
            cmd.args(["-c:a", config.format.audio_codec()]);
        } else {
            cmd.arg("-an");
        }
        if config.format == EncodingFormat::Mp4 {
            // mp4 on a non-seekable pipe needs fragmented output
            cmd.args(["-movflags", "frag_keyframe+empty_moov"]);
        }
        cmd.args(["-f", config.format.container(), "pipe:1"]);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        tracing::info!(
            format = %config.format,
            width = config.width,
            height = config.height,
            fps = config.fps,
            audio = config.audio.is_some(),
            "starting ffmpeg encoder"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::Encoder(format!("spawn ffmpeg: {e}")))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::Encoder("ffmpeg stdin unavailable".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Encoder("ffmpeg stdout unavailable".into()))?;

        // Writer thread: owns stdin + the audio FIFO write end. The FIFO
        // open blocks until ffmpeg opens the read end, which is why it
        // happens here and not on the caller.
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<SinkMsg>();
        std::thread::Builder::new()
            .name("facetrack-enc-writer".into())
            .spawn(move || {
                let _workdir = workdir; // keep the FIFO path alive
                let mut fifo = audio_fifo.as_ref().and_then(|path| {
                    std::fs::OpenOptions::new()
                        .write(true)
                        .open(path)
                        .map_err(|e| tracing::warn!(error = %e, "audio FIFO open failed"))
                        .ok()
                });

                while let Some(msg) = msg_rx.blocking_recv() {
                    match msg {
                        SinkMsg::Frame(data) => {
                            if let Err(e) = stdin.write_all(&data) {
                                tracing::warn!(error = %e, "encoder rejected frame; stopping input");
                                break;
                            }
                        }
                        SinkMsg::Audio(samples) => {
                            if let Some(f) = fifo.as_mut() {
                                let mut bytes = Vec::with_capacity(samples.len() * 2);
                                for s in samples {
                                    bytes.extend_from_slice(&s.to_le_bytes());
                                }
                                if let Err(e) = f.write_all(&bytes) {
                                    tracing::warn!(error = %e, "audio FIFO write failed");
                                    fifo = None;
                                }
                            }
                        }
                        SinkMsg::Stop => break,
                    }
                }
                // Dropping both ends signals EOF; ffmpeg flushes and exits.
                drop(stdin);
                drop(fifo);
            })
            .expect("failed to spawn encoder writer thread");

        // Reader thread: slices stdout into ~timeslice chunks and reports
        // the terminal event once ffmpeg exits.
        let (event_tx, event_rx) = mpsc::channel::<EncoderEvent>(32);
        let timeslice = config.timeslice;
        std::thread::Builder::new()
            .name("facetrack-enc-reader".into())
            .spawn(move || {
                let mut pending: Vec<u8> = Vec::new();
                let mut last_flush = Instant::now();
                let mut buf = [0u8; 8192];

                loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            pending.extend_from_slice(&buf[..n]);
                            if last_flush.elapsed() >= timeslice {
                                let chunk = std::mem::take(&mut pending);
                                if event_tx.blocking_send(EncoderEvent::Chunk(chunk)).is_err() {
                                    let _ = child.kill();
                                    break;
                                }
                                last_flush = Instant::now();
                            }
                        }
                        Err(e) => {
                            let _ = event_tx
                                .blocking_send(EncoderEvent::Error(format!("read output: {e}")));
                            let _ = child.kill();
                            let _ = child.wait();
                            return;
                        }
                    }
                }

                if !pending.is_empty() {
                    let _ = event_tx.blocking_send(EncoderEvent::Chunk(pending));
                }

                let terminal = match child.wait() {
                    Ok(status) if status.success() => EncoderEvent::Finished,
                    Ok(status) => EncoderEvent::Error(format!("ffmpeg exited with {status}")),
                    Err(e) => EncoderEvent::Error(format!("wait for ffmpeg: {e}")),
                };
                let _ = event_tx.blocking_send(terminal);
            })
            .expect("failed to spawn encoder reader thread");

        Ok((Arc::new(ChannelSink { tx: msg_tx }), event_rx))
    }
}
