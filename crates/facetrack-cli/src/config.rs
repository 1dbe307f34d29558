use std::path::PathBuf;
use std::time::Duration;

/// Requested capture resolution. A preference, not a guarantee — the
/// negotiated settings are read back from the driver.
pub const REQUESTED_WIDTH: u32 = 640;
pub const REQUESTED_HEIGHT: u32 = 480;

/// Tool configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory backing the persistent recording store.
    pub data_dir: PathBuf,
    /// Composite/encode frame rate.
    pub fps: u32,
    /// Encoded output slice interval in milliseconds.
    pub timeslice_ms: u64,
    /// Target video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Whether to capture the microphone alongside video.
    pub audio_enabled: bool,
    /// Optional byte quota for the persistent store.
    pub store_quota_bytes: Option<u64>,
}

impl Config {
    /// Load configuration from `FACETRACK_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACETRACK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("facetrack/recordings")
            });

        Self {
            camera_device: std::env::var("FACETRACK_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            data_dir,
            fps: env_u32("FACETRACK_FPS", 30),
            timeslice_ms: env_u64("FACETRACK_TIMESLICE_MS", 1000),
            video_bitrate: env_u32("FACETRACK_VIDEO_BITRATE", 2_500_000),
            audio_enabled: std::env::var("FACETRACK_AUDIO")
                .map(|v| v != "0")
                .unwrap_or(true),
            store_quota_bytes: std::env::var("FACETRACK_STORE_QUOTA_BYTES")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn recorder_config(&self) -> facetrack_pipeline::RecorderConfig {
        facetrack_pipeline::RecorderConfig {
            fps: self.fps,
            video_bitrate: self.video_bitrate,
            timeslice: Duration::from_millis(self.timeslice_ms),
        }
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
