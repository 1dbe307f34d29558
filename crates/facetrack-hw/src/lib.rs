//! facetrack-hw — Hardware abstraction for camera and microphone capture.
//!
//! Provides V4L2-based camera access, cpal-based microphone input and the
//! [`MediaSession`] that owns both for the lifetime of the application.

pub mod camera;
pub mod microphone;
pub mod session;

pub use camera::{Camera, CameraError, PixelFormat};
pub use microphone::{AudioFormat, MicrophoneError};
pub use session::{MediaSession, SessionError};
