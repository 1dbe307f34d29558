//! facetrack-pipeline — Capture-composite-record pipeline.
//!
//! Owns the recording lifecycle (`idle → recording → finalizing → idle`),
//! the encoding-format negotiation, the ffmpeg-backed stream encoder and
//! the always-on detection/overlay loop.

pub mod encoder;
pub mod format;
pub mod recorder;
pub mod tracker;

pub use encoder::{EncoderConfig, EncoderEvent, EncoderSink, FfmpegEncoder, StreamEncoder};
pub use format::{negotiate_format, EncodingFormat};
pub use recorder::{FinishedRecording, Recorder, RecorderConfig, RecorderState};
pub use tracker::{spawn_detection_loop, DetectionLoop};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// No codec/container combination in the preference list is encodable.
    #[error("no supported encoding format available")]
    UnsupportedFormat,
    /// Finalization produced zero bytes; no recording is created.
    #[error("recording produced no data")]
    EmptyRecording,
    #[error("encoder error: {0}")]
    Encoder(String),
    #[error("video stream ended before reporting dimensions")]
    StreamEnded,
}
