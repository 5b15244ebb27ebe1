//! Camera acquisition. A device hands out one [`VideoStream`] per attempt;
//! [`StreamGuard`] owns it and stops it when dropped, so every exit path of a
//! capture releases the camera.

use super::CaptureError;
use std::{future::Future, path::PathBuf, pin::Pin};
use tracing::{debug, instrument};

/// One decoded video frame.
pub type Frame = image::RgbImage;

pub type DeviceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn VideoStream>, CaptureError>> + Send + 'a>>;

pub trait CaptureDevice: Send + Sync {
    /// Request camera access. Denial and hardware errors both surface as
    /// `CaptureError::DeviceAccessDenied`.
    fn acquire(&self) -> DeviceFuture<'_>;
}

pub trait VideoStream: Send {
    /// Latest frame of the live stream, `None` when nothing is available yet.
    fn current_frame(&self) -> Option<Frame>;

    fn stop(&mut self);
}

pub struct StreamGuard {
    stream: Option<Box<dyn VideoStream>>,
}

impl StreamGuard {
    #[must_use]
    pub fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<Frame> {
        self.stream.as_ref().and_then(|stream| stream.current_frame())
    }

    /// Stop the stream now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!("releasing capture device");
            stream.stop();
        }
    }
}

/// Uses a still image on disk as the camera feed.
#[derive(Debug, Clone)]
pub struct StillImageDevice {
    path: PathBuf,
}

impl StillImageDevice {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureDevice for StillImageDevice {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn acquire(&self) -> DeviceFuture<'_> {
        let path = self.path.clone();
        Box::pin(async move {
            let display = path.display().to_string();
            let decoded = tokio::task::spawn_blocking(move || image::open(&path))
                .await
                .map_err(|err| CaptureError::DeviceAccessDenied(format!("{display}: {err}")))?
                .map_err(|err| CaptureError::DeviceAccessDenied(format!("{display}: {err}")))?;

            debug!(
                width = decoded.width(),
                height = decoded.height(),
                "capture source opened"
            );

            let stream: Box<dyn VideoStream> = Box::new(StillImageStream {
                frame: Some(decoded.to_rgb8()),
            });
            Ok(stream)
        })
    }
}

/// Stands in when no capture source is configured; every request is denied.
#[derive(Debug, Clone)]
pub struct UnavailableDevice {
    reason: String,
}

impl UnavailableDevice {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl CaptureDevice for UnavailableDevice {
    fn acquire(&self) -> DeviceFuture<'_> {
        Box::pin(async move { Err(CaptureError::DeviceAccessDenied(self.reason.clone())) })
    }
}

struct StillImageStream {
    frame: Option<Frame>,
}

impl VideoStream for StillImageStream {
    fn current_frame(&self) -> Option<Frame> {
        self.frame.clone()
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}
