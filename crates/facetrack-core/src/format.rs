//! Container/codec combinations a recording can be encoded into.

use serde::{Deserialize, Serialize};

/// A container/codec combination, ordered from most to least preferred:
/// a modern royalty-free codec first, older fallbacks after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingFormat {
    WebmVp9,
    WebmVp8,
    Webm,
    Mp4,
}

impl EncodingFormat {
    /// Probe order at record start.
    pub const PREFERENCE: [EncodingFormat; 4] = [
        EncodingFormat::WebmVp9,
        EncodingFormat::WebmVp8,
        EncodingFormat::Webm,
        EncodingFormat::Mp4,
    ];

    /// MIME-style tag stored alongside the payload.
    pub fn mime(self) -> &'static str {
        match self {
            EncodingFormat::WebmVp9 => "video/webm;codecs=vp9",
            EncodingFormat::WebmVp8 => "video/webm;codecs=vp8",
            EncodingFormat::Webm => "video/webm",
            EncodingFormat::Mp4 => "video/mp4",
        }
    }

    /// Reverse of [`mime`](Self::mime), for records loaded from the store.
    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|f| f.mime() == mime)
    }

    /// File extension for download artifacts.
    pub fn extension(self) -> &'static str {
        match self {
            EncodingFormat::Mp4 => "mp4",
            _ => "webm",
        }
    }

    /// ffmpeg muxer name.
    pub fn container(self) -> &'static str {
        match self {
            EncodingFormat::Mp4 => "mp4",
            _ => "webm",
        }
    }

    /// ffmpeg video encoder name.
    pub fn video_codec(self) -> &'static str {
        match self {
            EncodingFormat::WebmVp9 => "libvpx-vp9",
            EncodingFormat::WebmVp8 | EncodingFormat::Webm => "libvpx",
            EncodingFormat::Mp4 => "libx264",
        }
    }

    /// ffmpeg audio encoder name.
    pub fn audio_codec(self) -> &'static str {
        match self {
            EncodingFormat::Mp4 => "aac",
            EncodingFormat::Webm => "libvorbis",
            _ => "libopus",
        }
    }
}

impl std::fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}
