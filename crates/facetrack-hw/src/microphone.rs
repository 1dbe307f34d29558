//! Microphone capture via cpal.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread for its
//! whole lifetime. Samples are normalized to interleaved `i16` and pushed
//! into a bounded channel; a full channel drops the chunk rather than
//! blocking the audio callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;

#[derive(Error, Debug)]
pub enum MicrophoneError {
    #[error("no input device available")]
    NoDevice,
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("stream setup failed: {0}")]
    StreamSetup(String),
    #[error("microphone thread exited before reporting a format")]
    ThreadExited,
}

/// Negotiated audio track settings.
#[derive(Debug, Clone, Copy)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

const CHANNEL_CAPACITY: usize = 64;

/// Open the default input device on a dedicated thread.
///
/// Returns the negotiated format, the sample channel and the thread handle.
/// The thread keeps the stream alive until `run` clears.
pub fn spawn_capture(
    run: Arc<AtomicBool>,
) -> Result<(AudioFormat, mpsc::Receiver<Vec<i16>>, std::thread::JoinHandle<()>), MicrophoneError> {
    let (sample_tx, sample_rx) = mpsc::channel::<Vec<i16>>(CHANNEL_CAPACITY);
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<AudioFormat, MicrophoneError>>();

    let handle = std::thread::Builder::new()
        .name("facetrack-mic".into())
        .spawn(move || {
            let stream = match build_stream(sample_tx) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while run.load(Ordering::Relaxed) {
                std::thread::park_timeout(std::time::Duration::from_millis(100));
            }
            drop(stream);
            tracing::debug!("microphone thread exited");
        })
        .expect("failed to spawn microphone thread");

    let format = ready_rx.recv().map_err(|_| MicrophoneError::ThreadExited)??;
    tracing::info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "microphone opened"
    );
    Ok((format, sample_rx, handle))
}

fn build_stream(
    tx: mpsc::Sender<Vec<i16>>,
) -> Result<(cpal::Stream, AudioFormat), MicrophoneError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(MicrophoneError::NoDevice)?;

    let config = device
        .default_input_config()
        .map_err(|e| MicrophoneError::StreamSetup(format!("default config: {e}")))?;

    let format = AudioFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    };

    let err_fn = |e: cpal::StreamError| tracing::warn!(error = %e, "audio stream error");

    let stream = match config.sample_format() {
        SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _| push_samples(&tx, data.to_vec()),
                err_fn,
                None,
            )
            .map_err(|e| MicrophoneError::StreamSetup(format!("build stream: {e}")))?,
        SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    let samples = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    push_samples(&tx, samples);
                },
                err_fn,
                None,
            )
            .map_err(|e| MicrophoneError::StreamSetup(format!("build stream: {e}")))?,
        other => {
            return Err(MicrophoneError::UnsupportedSampleFormat(format!("{other:?}")));
        }
    };

    stream
        .play()
        .map_err(|e| MicrophoneError::StreamSetup(format!("play: {e}")))?;

    Ok((stream, format))
}

/// Never block inside the audio callback; a full channel loses the chunk.
fn push_samples(tx: &mpsc::Sender<Vec<i16>>, samples: Vec<i16>) {
    if tx.try_send(samples).is_err() {
        tracing::trace!("audio channel full; dropping chunk");
    }
}
