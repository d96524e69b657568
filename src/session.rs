//! # Capture Session
//!
//! Owns the single live camera stream of a scanning surface and the frame
//! scan loop running on it.
//!
//! ## Ownership
//!
//! - At most one [`StreamHandle`] is live per session. `open` releases the
//!   previous stream before the backend is asked for a new one.
//! - The scan loop depends on the stream and never outlives it: `close`
//!   cancels the loop first, then stops the stream.
//! - Dropping the session does the same, spawning the stream stop onto the
//!   current runtime when one is available.
//!
//! ## Loop state
//!
//! ```text
//! Idle ──start_scan──▶ Running ──decode / cancel──▶ Stopped
//!                        │
//!         access denied  ▼
//!                  Suspended(permission_denied)
//!
//! any state ──open (device change)──▶ Idle
//! ```
//!
//! A denied permission is never retried by the session itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use scan_decode::Size;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::camera::{CameraBackend, Facing, StreamRequest, VideoSource};
use crate::error::{ScannerError, ScannerResult};
use crate::payload::DecodedPayload;
use crate::scan_loop::{FrameScanLoop, LoopExit, LoopHandle};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Why a scan loop is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendReason {
    PermissionDenied,
}

/// Lifecycle state of the session's scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanLoopState {
    Idle,
    Running,
    Suspended(SuspendReason),
    Stopped,
}

impl std::fmt::Display for ScanLoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanLoopState::Idle => write!(f, "idle"),
            ScanLoopState::Running => write!(f, "running"),
            ScanLoopState::Suspended(SuspendReason::PermissionDenied) => {
                write!(f, "suspended(permission_denied)")
            }
            ScanLoopState::Stopped => write!(f, "stopped"),
        }
    }
}

struct StreamInner {
    id: u64,
    device_id: String,
    size: Size,
    illumination: bool,
    closed: AtomicBool,
    source: Mutex<Option<Box<dyn VideoSource>>>,
}

/// Handle to an open camera stream.
///
/// Cloning shares the same stream. Once the owning session releases it,
/// every clone reports `stream_closed` instead of touching the device.
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

impl StreamHandle {
    fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
                device_id: source.device_id().to_string(),
                size: source.negotiated_size(),
                illumination: source.supports_illumination(),
                closed: AtomicBool::new(false),
                source: Mutex::new(Some(source)),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Negotiated resolution. May differ from the requested ideal size.
    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether the device has a controllable torch.
    pub fn supports_illumination(&self) -> bool {
        self.inner.illumination
    }

    /// Turns the torch on or off.
    ///
    /// Devices without a torch report `illumination_unsupported`, never a
    /// silent success.
    pub async fn set_illumination(&self, on: bool) -> ScannerResult<()> {
        let mut guard = self.inner.source.lock().await;
        let source = match guard.as_mut() {
            Some(source) if !self.is_closed() => source,
            _ => return Err(ScannerError::stream_closed("set_illumination", self.id())),
        };
        if !source.supports_illumination() {
            return Err(ScannerError::illumination_unsupported(self.device_id()));
        }
        source.apply_illumination(on).await
    }

    /// Runs `f` against the live source.
    pub(crate) async fn with_source<R>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Box<dyn VideoSource>) -> R,
    ) -> ScannerResult<R> {
        let mut guard = self.inner.source.lock().await;
        match guard.as_mut() {
            Some(source) if !self.is_closed() => Ok(f(source)),
            _ => Err(ScannerError::stream_closed(operation, self.id())),
        }
    }

    /// Stops the stream. Returns `false` if it was already released.
    async fn release(&self) -> bool {
        self.inner.closed.store(true, Ordering::Release);
        let source = self.inner.source.lock().await.take();
        match source {
            Some(mut source) => {
                source.stop().await;
                info!(stream_id = self.id(), device_id = %self.device_id(), "Capture stream closed");
                true
            }
            None => false,
        }
    }

    /// Release for `Drop`.
    ///
    /// The stop runs on the current runtime once any in-flight sample has
    /// let go of the source.
    fn release_now(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let stream_id = self.id();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(stream_id, "No runtime to stop capture stream on drop");
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let source = inner.source.lock().await.take();
            if let Some(mut source) = source {
                source.stop().await;
                debug!(stream_id, "Capture stream stopped after drop");
            }
        });
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id())
            .field("device_id", &self.device_id())
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One scanning surface's camera stream and scan loop.
pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    scan_loop: FrameScanLoop,
    ideal: Size,
    stream: Option<StreamHandle>,
    active_loop: Option<LoopHandle>,
    state: ScanLoopState,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CameraBackend>, scan_loop: FrameScanLoop, ideal: Size) -> Self {
        Self {
            backend,
            scan_loop,
            ideal,
            stream: None,
            active_loop: None,
            state: ScanLoopState::Idle,
        }
    }

    /// Opens a stream, releasing any previous one first.
    ///
    /// On `permission_denied` the session becomes suspended.
    pub async fn open(&mut self, device_id: Option<&str>, facing: Facing) -> ScannerResult<StreamHandle> {
        self.close().await;
        self.state = ScanLoopState::Idle;

        let request = StreamRequest {
            device_id: device_id.map(str::to_string),
            facing,
            ideal: self.ideal,
        };

        match self.backend.open(&request).await {
            Ok(source) => {
                let handle = StreamHandle::new(source);
                info!(
                    stream_id = handle.id(),
                    device_id = %handle.device_id(),
                    ideal = %self.ideal,
                    negotiated = %handle.size(),
                    "Capture stream opened"
                );
                self.stream = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                if matches!(e, ScannerError::PermissionDenied { .. }) {
                    warn!(error = %e, "Camera access denied, suspending session");
                    self.state = ScanLoopState::Suspended(SuspendReason::PermissionDenied);
                } else {
                    warn!(error = %e, "Failed to open capture stream");
                }
                Err(e)
            }
        }
    }

    /// Cancels the scan loop, then releases the stream. Idempotent.
    ///
    /// Returns `true` if a live stream was released.
    pub async fn close(&mut self) -> bool {
        self.cancel_scan();
        let released = match self.stream.take() {
            Some(handle) => handle.release().await,
            None => false,
        };
        if !matches!(self.state, ScanLoopState::Suspended(_)) {
            self.state = ScanLoopState::Idle;
        }
        released
    }

    /// Starts a scan loop on the open stream, replacing any running loop.
    pub fn start_scan<F>(&mut self, on_decoded: F) -> ScannerResult<()>
    where
        F: FnOnce(DecodedPayload) + Send + 'static,
    {
        if let ScanLoopState::Suspended(_) = self.state {
            return Err(ScannerError::state(
                self.state.to_string(),
                "start_scan",
                "camera access was denied",
            ));
        }
        let stream = self.require_stream("start_scan")?.clone();

        self.cancel_scan();
        self.active_loop = Some(self.scan_loop.start(stream, on_decoded));
        self.state = ScanLoopState::Running;
        Ok(())
    }

    /// Cancels the running loop, if any. Idempotent.
    pub fn cancel_scan(&mut self) -> bool {
        match self.active_loop.take() {
            Some(active) => {
                active.cancel();
                if self.state == ScanLoopState::Running {
                    self.state = ScanLoopState::Stopped;
                }
                true
            }
            None => false,
        }
    }

    /// Waits for the running loop to stop.
    pub async fn wait_scan(&mut self) -> Option<LoopExit> {
        match self.active_loop.as_mut() {
            Some(active) => Some(active.wait().await),
            None => None,
        }
    }

    /// Current loop state. A loop that ended by itself reads as `Stopped`.
    pub fn state(&self) -> ScanLoopState {
        match (self.state, &self.active_loop) {
            (ScanLoopState::Running, Some(active)) if active.is_finished() => ScanLoopState::Stopped,
            (state, _) => state,
        }
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    pub fn loop_handle(&self) -> Option<&LoopHandle> {
        self.active_loop.as_ref()
    }

    pub fn supports_illumination(&self) -> ScannerResult<bool> {
        Ok(self.require_stream("supports_illumination")?.supports_illumination())
    }

    pub async fn set_illumination(&self, on: bool) -> ScannerResult<()> {
        self.require_stream("set_illumination")?.set_illumination(on).await
    }

    fn require_stream(&self, operation: &str) -> ScannerResult<&StreamHandle> {
        self.stream
            .as_ref()
            .filter(|handle| !handle.is_closed())
            .ok_or_else(|| ScannerError::state(self.state().to_string(), operation, "no open stream"))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = self.active_loop.take() {
            active.cancel();
        }
        if let Some(stream) = self.stream.take() {
            stream.release_now();
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("ideal", &self.ideal)
            .field("stream", &self.stream)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
