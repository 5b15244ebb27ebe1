//! Biometric capture: the camera adapter and the countdown state machine that
//! turns a live stream into one encoded still image. The payload is handed to
//! a flow and never persisted.

pub mod device;
pub mod machine;

pub use device::{
    CaptureDevice, DeviceFuture, Frame, StillImageDevice, StreamGuard, UnavailableDevice,
    VideoStream,
};
pub use machine::{CaptureMachine, CaptureSettings};

use base64ct::{Base64, Encoding};
use std::fmt;
use thiserror::Error;

/// Encoded still image produced by one capture attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct BiometricPayload(Vec<u8>);

impl BiometricPayload {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Base64 form sent to the backend as `iris_data`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.0)
    }
}

// Image bytes are biometric data; keep them out of logs.
impl fmt::Debug for BiometricPayload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "BiometricPayload({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    DeviceDenied(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    AwaitingDevice,
    Streaming,
    CountingDown(u8),
    Captured(BiometricPayload),
    Failed(CaptureFailure),
}

impl CaptureState {
    /// States in which the camera stream is open.
    #[must_use]
    pub fn holds_device(&self) -> bool {
        matches!(self, Self::Streaming | Self::CountingDown(_))
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingDevice => "awaiting_device",
            Self::Streaming => "streaming",
            Self::CountingDown(_) => "counting_down",
            Self::Captured(_) => "captured",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("Failed to access camera: {0}")]
    DeviceAccessDenied(String),
    #[error("No frame available to capture")]
    NotReady,
    #[error("Failed to encode frame: {0}")]
    Encoding(String),
    #[error("Capture cancelled")]
    Cancelled,
    #[error("A capture is already in progress")]
    AlreadyActive,
}
