//! Always-on detection/overlay loop.
//!
//! Ticks at a fixed cadence (~30 Hz) from the moment the camera is up,
//! whether or not a recording is active. Each tick reads the latest frame,
//! asks the detection source for annotations and redraws the shared
//! overlay surface. The compositor may read an overlay that is one
//! detection tick stale; both loops run on the same scheduler, so that
//! staleness is bounded and accepted.

use facetrack_core::{DetectionSource, OverlaySurface, VideoFrame};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default detection cadence, ~30 Hz.
pub const DETECTION_PERIOD: Duration = Duration::from_millis(33);

/// Handle to a running detection loop. Dropping it cancels the task.
pub struct DetectionLoop {
    handle: JoinHandle<()>,
    detections: watch::Receiver<usize>,
}

impl DetectionLoop {
    /// Latest per-tick detection count, for status surfaces.
    pub fn detections(&self) -> watch::Receiver<usize> {
        self.detections.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn the detection tick. Only called once camera initialization has
/// succeeded; a denied camera means no loop ever runs.
pub fn spawn_detection_loop(
    frames: watch::Receiver<Option<VideoFrame>>,
    overlay: Arc<Mutex<OverlaySurface>>,
    mut detector: Box<dyn DetectionSource>,
    period: Duration,
) -> DetectionLoop {
    let (count_tx, count_rx) = watch::channel(0usize);

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;

            let frame = frames.borrow().clone();
            // No frame yet (metadata not ready) is a skipped tick, not an error
            let Some(frame) = frame else {
                continue;
            };

            match detector.detect(&frame) {
                Ok(regions) => {
                    {
                        let mut surface = overlay.lock().expect("overlay lock poisoned");
                        surface.render(frame.width, frame.height, &regions);
                    }
                    count_tx.send_replace(regions.len());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "detection tick failed");
                }
            }
        }
    });

    DetectionLoop {
        handle,
        detections: count_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetrack_core::FixedRegionDetector;

    fn frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            data: vec![0; (width * height * 4) as usize],
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_redrawn_each_tick() {
        let (frame_tx, frame_rx) = watch::channel(Some(frame(64, 64)));
        let overlay = Arc::new(Mutex::new(OverlaySurface::new(0, 0)));

        let tracker = spawn_detection_loop(
            frame_rx,
            overlay.clone(),
            Box::new(FixedRegionDetector),
            DETECTION_PERIOD,
        );
        tokio::task::yield_now().await;
        tokio::time::advance(DETECTION_PERIOD).await;
        tokio::task::yield_now().await;

        assert_eq!(*tracker.detections().borrow(), 1);
        {
            let surface = overlay.lock().unwrap();
            assert_eq!((surface.width(), surface.height()), (64, 64));
        }
        drop(frame_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_frame_means_no_detections() {
        let (frame_tx, frame_rx) = watch::channel(None);
        let overlay = Arc::new(Mutex::new(OverlaySurface::new(0, 0)));

        let tracker = spawn_detection_loop(
            frame_rx,
            overlay.clone(),
            Box::new(FixedRegionDetector),
            DETECTION_PERIOD,
        );
        tokio::task::yield_now().await;
        tokio::time::advance(DETECTION_PERIOD * 3).await;
        tokio::task::yield_now().await;

        assert_eq!(*tracker.detections().borrow(), 0);
        assert_eq!(overlay.lock().unwrap().width(), 0);
        drop(frame_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ticks() {
        let (frame_tx, frame_rx) = watch::channel(Some(frame(32, 32)));
        let overlay = Arc::new(Mutex::new(OverlaySurface::new(0, 0)));

        let tracker = spawn_detection_loop(
            frame_rx,
            overlay.clone(),
            Box::new(FixedRegionDetector),
            DETECTION_PERIOD,
        );
        tokio::task::yield_now().await;
        tracker.stop();
        tokio::task::yield_now().await;

        // Surface stays untouched after cancellation
        let before = overlay.lock().unwrap().width();
        tokio::time::advance(DETECTION_PERIOD * 3).await;
        tokio::task::yield_now().await;
        assert_eq!(overlay.lock().unwrap().width(), before);
        drop(frame_tx);
    }
}
