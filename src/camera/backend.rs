//! Platform seam for camera access.
//!
//! A [`CameraBackend`] enumerates devices and opens streams; the opened
//! stream is a [`VideoSource`] that the capture session owns exclusively.

use async_trait::async_trait;
use scan_decode::Size;
use serde::Serialize;

use super::device::{CaptureDevice, Facing};
use crate::core::FrameBuffer;
use crate::error::ScannerResult;

/// Parameters for opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Exact device to open. `None` lets the backend pick by facing.
    pub device_id: Option<String>,
    pub facing: Facing,
    /// Requested resolution. The device may negotiate a different one.
    pub ideal: Size,
}

/// Capability flags queried per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceCapabilities {
    pub illumination: bool,
}

/// Abstract interface for camera platforms.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Lists the devices currently available.
    async fn enumerate(&self) -> ScannerResult<Vec<CaptureDevice>>;

    /// Queries capability flags for a device.
    async fn capabilities(&self, device_id: &str) -> ScannerResult<DeviceCapabilities>;

    /// Opens a stream.
    ///
    /// Fails with `permission_denied` when access is refused and
    /// `device_unavailable` when the device cannot be opened.
    async fn open(&self, request: &StreamRequest) -> ScannerResult<Box<dyn VideoSource>>;
}

/// A live video stream.
#[async_trait]
pub trait VideoSource: Send {
    /// Identifier of the device backing this stream.
    fn device_id(&self) -> &str;

    /// Resolution actually negotiated with the device.
    fn negotiated_size(&self) -> Size;

    /// Whether enough data is buffered to sample a frame.
    fn has_frame_data(&mut self) -> bool;

    /// Copies the current frame into `buffer`, resizing it to the frame size.
    fn read_frame(&mut self, buffer: &mut FrameBuffer) -> ScannerResult<()>;

    /// Whether the device exposes a controllable light source.
    fn supports_illumination(&self) -> bool;

    /// Turns the light source on or off.
    async fn apply_illumination(&mut self, on: bool) -> ScannerResult<()>;

    /// Stops the stream and releases the device.
    async fn stop(&mut self);
}
