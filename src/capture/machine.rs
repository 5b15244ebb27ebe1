use super::{
    BiometricPayload, CaptureDevice, CaptureError, CaptureFailure, CaptureState, Frame,
    StreamGuard,
};
use image::ImageFormat;
use std::{io::Cursor, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_COUNTDOWN: u8 = 3;
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
/// Ticks spent at zero waiting for a usable frame before giving up.
pub const DEFAULT_FRAME_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub countdown: u8,
    pub tick: Duration,
    pub frame_retries: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            countdown: DEFAULT_COUNTDOWN,
            tick: DEFAULT_TICK,
            frame_retries: DEFAULT_FRAME_RETRIES,
        }
    }
}

/// Drives one camera through start, countdown and snapshot.
///
/// The open stream lives only in `stream`; it is `Some` exactly while the
/// state is `Streaming` or `CountingDown`.
pub struct CaptureMachine {
    device: Arc<dyn CaptureDevice>,
    settings: CaptureSettings,
    state: Arc<watch::Sender<CaptureState>>,
    stream: Option<StreamGuard>,
}

impl CaptureMachine {
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>, settings: CaptureSettings) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self::with_state(device, settings, Arc::new(state))
    }

    /// Publish transitions on a channel owned by the caller, so observers can
    /// outlive a single attempt. The channel is reset to `Idle`.
    #[must_use]
    pub fn with_state(
        device: Arc<dyn CaptureDevice>,
        settings: CaptureSettings,
        state: Arc<watch::Sender<CaptureState>>,
    ) -> Self {
        state.send_replace(CaptureState::Idle);
        Self {
            device,
            settings,
            state,
            stream: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state.borrow().clone()
    }

    /// Observe transitions, e.g. to render the countdown.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn holds_device(&self) -> bool {
        self.stream.is_some()
    }

    fn transition(&self, next: CaptureState) {
        debug!(
            from = self.state.borrow().label(),
            to = next.label(),
            "capture transition"
        );
        self.state.send_replace(next);
    }

    /// Request the camera and arm the countdown.
    ///
    /// # Errors
    /// `AlreadyActive` if an attempt is running, `DeviceAccessDenied` if the
    /// camera cannot be opened. A failed machine may be started again.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state(), CaptureState::Idle | CaptureState::Failed(_)) {
            return Err(CaptureError::AlreadyActive);
        }

        self.transition(CaptureState::AwaitingDevice);

        match self.device.acquire().await {
            Ok(stream) => {
                self.stream = Some(StreamGuard::new(stream));
                self.transition(CaptureState::Streaming);
                self.transition(CaptureState::CountingDown(self.settings.countdown));
                Ok(())
            }
            Err(err) => {
                let reason = match err {
                    CaptureError::DeviceAccessDenied(reason) => reason,
                    other => other.to_string(),
                };
                warn!("camera access failed: {reason}");
                self.transition(CaptureState::Failed(CaptureFailure::DeviceDenied(
                    reason.clone(),
                )));
                Err(CaptureError::DeviceAccessDenied(reason))
            }
        }
    }

    /// Advance the countdown by one unit. Reaching zero takes the snapshot in
    /// the same step. Ticks outside the countdown are ignored.
    ///
    /// # Errors
    /// `NotReady` or `Encoding` when no usable frame exists at zero; the
    /// machine stays at zero and the next tick retries.
    pub fn tick(&mut self) -> Result<(), CaptureError> {
        match self.state() {
            CaptureState::CountingDown(0) => self.snapshot(),
            CaptureState::CountingDown(1) => {
                self.transition(CaptureState::CountingDown(0));
                self.snapshot()
            }
            CaptureState::CountingDown(remaining) => {
                self.transition(CaptureState::CountingDown(remaining - 1));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn snapshot(&mut self) -> Result<(), CaptureError> {
        let frame = self
            .stream
            .as_ref()
            .and_then(StreamGuard::current_frame)
            .ok_or(CaptureError::NotReady)?;
        let payload = encode_frame(&frame)?;

        if let Some(stream) = self.stream.take() {
            stream.release();
        }

        info!(bytes = payload.len(), "iris image captured");
        self.transition(CaptureState::Captured(payload));
        Ok(())
    }

    /// Abort the attempt from any state, stopping the camera if it is open.
    pub fn cancel(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.release();
        }
        if self.state() != CaptureState::Idle {
            self.transition(CaptureState::Idle);
        }
    }

    /// Clear a device failure so the caller can retry.
    pub fn acknowledge(&mut self) {
        if matches!(self.state(), CaptureState::Failed(_)) {
            self.transition(CaptureState::Idle);
        }
    }

    /// Hand the captured payload over and return to `Idle`.
    pub fn take_payload(&mut self) -> Option<BiometricPayload> {
        if !matches!(*self.state.borrow(), CaptureState::Captured(_)) {
            return None;
        }
        match self.state.send_replace(CaptureState::Idle) {
            CaptureState::Captured(payload) => Some(payload),
            _ => None,
        }
    }

    /// Run a full attempt on a fixed-interval tick until a payload is
    /// captured or `cancel` fires.
    ///
    /// # Errors
    /// `Cancelled`, `DeviceAccessDenied`, or the last snapshot error once the
    /// frame retries are exhausted. The camera is released in every case.
    #[instrument(skip_all)]
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<BiometricPayload, CaptureError> {
        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.start() => Some(result),
        };
        match started {
            Some(result) => result?,
            None => {
                self.cancel();
                return Err(CaptureError::Cancelled);
            }
        }

        let mut ticker = interval_at(Instant::now() + self.settings.tick, self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut misses = 0;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("capture cancelled");
                    self.cancel();
                    return Err(CaptureError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            match self.tick() {
                Ok(()) => {
                    if let Some(payload) = self.take_payload() {
                        return Ok(payload);
                    }
                }
                Err(err) => {
                    misses += 1;
                    if misses > self.settings.frame_retries {
                        warn!("giving up on capture after {misses} attempts: {err}");
                        self.cancel();
                        return Err(err);
                    }
                    debug!("frame not ready, retrying: {err}");
                }
            }
        }
    }
}

impl Drop for CaptureMachine {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// JPEG-encode a single frame.
fn encode_frame(frame: &Frame) -> Result<BiometricPayload, CaptureError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureError::NotReady);
    }
    let mut buffer = Cursor::new(Vec::new());
    frame
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|err| CaptureError::Encoding(err.to_string()))?;
    Ok(BiometricPayload::from_bytes(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::testing::FakeDevice;
    use anyhow::{bail, Result};

    fn machine(device: &FakeDevice) -> CaptureMachine {
        CaptureMachine::new(Arc::new(device.clone()), CaptureSettings::default())
    }

    #[tokio::test]
    async fn countdown_decrements_then_captures_once() -> Result<()> {
        let device = FakeDevice::working();
        let mut machine = machine(&device);

        machine.start().await?;
        assert_eq!(machine.state(), CaptureState::CountingDown(3));

        machine.tick()?;
        assert_eq!(machine.state(), CaptureState::CountingDown(2));
        assert_eq!(device.frames_taken(), 0);

        machine.tick()?;
        assert_eq!(machine.state(), CaptureState::CountingDown(1));
        assert_eq!(device.frames_taken(), 0);
        assert!(device.is_open());

        machine.tick()?;
        assert!(matches!(machine.state(), CaptureState::Captured(_)));
        assert_eq!(device.frames_taken(), 1);
        assert!(!device.is_open());
        assert!(!machine.holds_device());

        // Further ticks do nothing once captured.
        machine.tick()?;
        assert_eq!(device.frames_taken(), 1);

        let Some(payload) = machine.take_payload() else {
            bail!("expected a payload");
        };
        assert!(payload.as_bytes().starts_with(&[0xff, 0xd8]));
        assert_eq!(machine.state(), CaptureState::Idle);
        assert!(machine.take_payload().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn denial_fails_and_is_retryable() {
        let device = FakeDevice::denying();
        let mut machine = machine(&device);

        let result = machine.start().await;
        assert!(matches!(result, Err(CaptureError::DeviceAccessDenied(_))));
        assert!(matches!(
            machine.state(),
            CaptureState::Failed(CaptureFailure::DeviceDenied(_))
        ));
        assert_eq!(device.acquired(), 0);

        machine.acknowledge();
        assert_eq!(machine.state(), CaptureState::Idle);
        assert!(machine.start().await.is_err());
    }

    #[tokio::test]
    async fn cancel_while_counting_releases_device() -> Result<()> {
        let device = FakeDevice::working();
        let mut machine = machine(&device);

        machine.start().await?;
        machine.tick()?;
        assert!(device.is_open());

        machine.cancel();
        assert_eq!(machine.state(), CaptureState::Idle);
        assert_eq!(device.released(), 1);
        assert_eq!(device.frames_taken(), 0);

        // Cancel on an idle machine is harmless.
        machine.cancel();
        assert_eq!(device.released(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn start_rejected_while_active() -> Result<()> {
        let device = FakeDevice::working();
        let mut machine = machine(&device);

        machine.start().await?;
        assert_eq!(machine.start().await, Err(CaptureError::AlreadyActive));
        assert_eq!(device.acquired(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_frame_keeps_countdown_at_zero() -> Result<()> {
        let device = FakeDevice {
            blank_frames: 1,
            ..FakeDevice::working()
        };
        let mut machine = machine(&device);

        machine.start().await?;
        machine.tick()?;
        machine.tick()?;
        assert_eq!(machine.tick(), Err(CaptureError::NotReady));
        assert_eq!(machine.state(), CaptureState::CountingDown(0));
        assert!(device.is_open());

        machine.tick()?;
        assert!(matches!(machine.state(), CaptureState::Captured(_)));
        assert!(!device.is_open());
        Ok(())
    }

    #[tokio::test]
    async fn dropping_machine_releases_device() -> Result<()> {
        let device = FakeDevice::working();
        {
            let mut machine = machine(&device);
            machine.start().await?;
            assert!(device.is_open());
        }
        assert!(!device.is_open());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn run_captures_after_three_ticks() -> Result<()> {
        let device = FakeDevice::working();
        let mut machine = machine(&device);
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let payload = machine.run(&cancel).await?;

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(!payload.is_empty());
        assert_eq!(device.frames_taken(), 1);
        assert!(!device.is_open());
        assert_eq!(machine.state(), CaptureState::Idle);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let device = FakeDevice::working();
        let mut machine = machine(&device);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let result = machine.run(&cancel).await;
        assert_eq!(result, Err(CaptureError::Cancelled));
        assert_eq!(device.frames_taken(), 0);
        assert_eq!(device.acquired(), 1);
        assert!(!device.is_open());
        assert_eq!(machine.state(), CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn run_gives_up_without_frames() {
        let device = FakeDevice {
            blank_frames: usize::MAX,
            ..FakeDevice::working()
        };
        let mut machine = machine(&device);

        let result = machine.run(&CancellationToken::new()).await;
        assert_eq!(result, Err(CaptureError::NotReady));
        assert!(!device.is_open());
        assert_eq!(machine.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn shared_channel_sees_every_attempt() -> Result<()> {
        let device = FakeDevice::working();
        let (state, _) = watch::channel(CaptureState::Failed(CaptureFailure::DeviceDenied(
            "stale".to_string(),
        )));
        let state = Arc::new(state);
        let observer = state.subscribe();

        let mut first = CaptureMachine::with_state(
            Arc::new(device.clone()),
            CaptureSettings::default(),
            state.clone(),
        );
        assert_eq!(*observer.borrow(), CaptureState::Idle);
        first.start().await?;
        assert_eq!(*observer.borrow(), CaptureState::CountingDown(3));
        drop(first);
        assert_eq!(*observer.borrow(), CaptureState::Idle);

        let mut second =
            CaptureMachine::with_state(Arc::new(device.clone()), CaptureSettings::default(), state);
        second.start().await?;
        second.tick()?;
        assert_eq!(*observer.borrow(), CaptureState::CountingDown(2));
        Ok(())
    }

    #[test]
    fn encode_rejects_empty_frame() {
        let frame = Frame::new(0, 0);
        assert_eq!(encode_frame(&frame), Err(CaptureError::NotReady));
    }
}
