//! Encoding-format negotiation.
//!
//! Record-start probes the preference list against the encoder and takes
//! the first supported entry.

use crate::encoder::StreamEncoder;
use crate::PipelineError;

pub use facetrack_core::EncodingFormat;

/// Select the first supported format from the preference list.
pub fn negotiate_format(encoder: &dyn StreamEncoder) -> Result<EncodingFormat, PipelineError> {
    EncodingFormat::PREFERENCE
        .into_iter()
        .find(|&f| encoder.supports(f))
        .ok_or(PipelineError::UnsupportedFormat)
}
