//! V4L2 camera capture via the `v4l` crate.

use facetrack_core::frame::{self, VideoFrame};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG (one JPEG image per frame).
    Mjpeg,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path, requesting the given resolution.
    ///
    /// The requested resolution is a preference; the driver may negotiate
    /// something else, and `width`/`height` hold what it actually granted.
    pub fn open(device_path: &str, req_width: u32, req_height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::DeviceBusy
            } else if msg.contains("denied") || msg.contains("EACCES") {
                CameraError::AccessDenied(format!("{device_path}: {e}"))
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request YUYV at the preferred resolution; many webcams only do
        // MJPG at 640x480, so accept that too.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = req_width;
        fmt.height = req_height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"MJPG") {
            PixelFormat::Mjpeg
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or MJPG)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Negotiated capture dimensions, as reported back by the driver.
    pub fn settings(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Blocking capture loop: decode each dequeued buffer to RGBA and
    /// publish it into the latest-frame slot. Runs until `run` clears or
    /// the stream errors; the slot is reset to `None` on exit either way.
    pub fn run_capture_loop(
        self,
        frames: watch::Sender<Option<VideoFrame>>,
        run: Arc<AtomicBool>,
    ) {
        let mut stream =
            match MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(device = %self.device_path, error = %e, "failed to create mmap stream");
                    frames.send_replace(None);
                    return;
                }
            };

        while run.load(Ordering::Relaxed) {
            let (buf, meta) = match stream.next() {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(device = %self.device_path, error = %e, "capture failed; stopping stream");
                    break;
                }
            };

            match self.decode(buf) {
                Ok((data, width, height)) => {
                    frames.send_replace(Some(VideoFrame {
                        data,
                        width,
                        height,
                        timestamp: std::time::Instant::now(),
                        sequence: meta.sequence,
                    }));
                }
                Err(e) => {
                    tracing::warn!(seq = meta.sequence, error = %e, "dropping undecodable frame");
                }
            }
        }

        frames.send_replace(None);
        tracing::debug!(device = %self.device_path, "capture loop exited");
    }

    /// Convert a raw buffer to RGBA based on the negotiated format,
    /// returning the dimensions the pixels actually cover. MJPG frames
    /// carry their own dimensions, which some cameras let drift from the
    /// negotiated ones; trusting the embedded size keeps the frame's
    /// buffer and its labels consistent.
    fn decode(&self, buf: &[u8]) -> Result<(Vec<u8>, u32, u32), CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgba(buf, self.width, self.height)
                .map(|data| (data, self.width, self.height))
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
            PixelFormat::Mjpeg => {
                let img = image::load_from_memory(buf).map_err(|e| {
                    CameraError::CaptureFailed(format!("MJPG decode failed: {e}"))
                })?;
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                if (width, height) != (self.width, self.height) {
                    tracing::trace!(width, height, "MJPG frame differs from negotiated size");
                }
                Ok((rgba.into_raw(), width, height))
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}
