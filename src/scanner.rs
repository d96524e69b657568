//! # Scanner
//!
//! The scanning surface: one camera session, its scan loop, the upload
//! decoder and the result controller, wired together.
//!
//! ```text
//! DeviceManager ─▶ CaptureSession ─▶ FrameScanLoop ─┐
//!                                                   ├─▶ ScanResultController
//!                      StaticImageDecoder ──────────┘
//! ```
//!
//! Teardown order is fixed: cancel the scan loop, release any pending
//! classification, then close the camera stream.

use std::sync::Arc;

use scan_decode::{DecodePrimitive, QrDecoder};
use tracing::{info, warn};

use crate::camera::{CameraBackend, CaptureDevice, DeviceCapabilities, DeviceManager};
use crate::classify::{MockCatalog, RecordLookup, ScanResultClassifier, SchemaTable};
use crate::config::ScannerConfig;
use crate::controller::{ControllerState, ScanResultController};
use crate::error::{ScannerError, ScannerResult};
use crate::payload::DecodedPayload;
use crate::scan_loop::{FrameScanLoop, LoopExit};
use crate::session::{CaptureSession, ScanLoopState};
use crate::upload::{StaticImageDecoder, UploadedImage};

pub struct Scanner {
    config: ScannerConfig,
    devices: DeviceManager,
    session: CaptureSession,
    uploads: StaticImageDecoder,
    controller: ScanResultController,
    known_devices: Vec<CaptureDevice>,
    active_device: Option<CaptureDevice>,
}

impl Scanner {
    /// Creates a scanner from its collaborators.
    pub fn new(
        config: ScannerConfig,
        backend: Arc<dyn CameraBackend>,
        decoder: Arc<dyn DecodePrimitive>,
        lookup: Arc<dyn RecordLookup>,
    ) -> Self {
        let scan_loop = FrameScanLoop::new(Arc::clone(&decoder), config.frame_interval());
        let session = CaptureSession::new(Arc::clone(&backend), scan_loop, config.ideal_size());
        let classifier = ScanResultClassifier::new(SchemaTable::default(), lookup);

        Self {
            devices: DeviceManager::new(backend),
            session,
            uploads: StaticImageDecoder::new(decoder),
            controller: ScanResultController::new(classifier),
            known_devices: Vec::new(),
            active_device: None,
            config,
        }
    }

    /// QR decoder and sample catalog configured from `config`.
    pub fn with_defaults(config: ScannerConfig, backend: Arc<dyn CameraBackend>) -> Self {
        let decoder = QrDecoder::new().with_max_long_side(config.max_decode_side());
        let catalog = MockCatalog::new().with_latency(config.lookup_latency());
        Self::new(config, backend, Arc::new(decoder), Arc::new(catalog))
    }

    /// Enumerates devices (once), opens the preferred one and starts scanning.
    pub async fn start(&mut self) -> ScannerResult<CaptureDevice> {
        if self.known_devices.is_empty() {
            self.known_devices = self.devices.list_devices().await?;
        }
        let device = DeviceManager::select_preferred(&self.known_devices, self.config.prefer_front)
            .cloned()
            .ok_or_else(|| ScannerError::device_unavailable("<none>", "no capture devices found"))?;
        self.open_and_scan(device).await
    }

    /// Switches to another device: tears down the loop and stream, reopens
    /// and restarts scanning.
    pub async fn select_device(&mut self, device_id: &str) -> ScannerResult<CaptureDevice> {
        if self.known_devices.is_empty() {
            self.known_devices = self.devices.list_devices().await?;
        }
        let device = self
            .known_devices
            .iter()
            .find(|device| device.id == device_id)
            .cloned()
            .ok_or_else(|| ScannerError::device_unavailable(device_id, "device was not enumerated"))?;
        self.open_and_scan(device).await
    }

    /// Dismisses the current result and scans again on the open stream.
    pub fn rescan(&mut self) -> ScannerResult<()> {
        self.controller.dismiss();
        self.start_loop()
    }

    /// Decodes an uploaded image and submits the payload for classification.
    ///
    /// The controller is untouched when decoding fails.
    pub async fn upload(&self, image: UploadedImage) -> ScannerResult<DecodedPayload> {
        let payload = self.uploads.decode_image(image).await?;
        self.controller.submit(payload.clone());
        Ok(payload)
    }

    /// Whether the open stream's device has a torch. `false` without a stream.
    pub fn torch_supported(&self) -> bool {
        self.session.supports_illumination().unwrap_or(false)
    }

    pub async fn set_torch(&self, on: bool) -> ScannerResult<()> {
        self.session.set_illumination(on).await
    }

    /// Capability flags for an enumerated device.
    pub async fn capabilities(&self, device_id: &str) -> ScannerResult<DeviceCapabilities> {
        self.devices.capabilities(device_id).await
    }

    pub fn state(&self) -> ScanLoopState {
        self.session.state()
    }

    /// Waits for the current scan loop to stop.
    pub async fn wait_scan(&mut self) -> Option<LoopExit> {
        self.session.wait_scan().await
    }

    pub fn result_state(&self) -> ControllerState {
        self.controller.current()
    }

    pub fn controller(&self) -> &ScanResultController {
        &self.controller
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn devices(&self) -> &[CaptureDevice] {
        &self.known_devices
    }

    pub fn active_device(&self) -> Option<&CaptureDevice> {
        self.active_device.as_ref()
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Cancels the loop, releases pending classification, closes the stream.
    pub async fn shutdown(&mut self) {
        self.session.cancel_scan();
        self.controller.cancel_pending();
        self.session.close().await;
        self.active_device = None;
        info!("Scanner shut down");
    }

    async fn open_and_scan(&mut self, device: CaptureDevice) -> ScannerResult<CaptureDevice> {
        self.active_device = None;
        if let Err(e) = self.session.open(Some(&device.id), device.facing).await {
            warn!(device_id = %device.id, category = e.category(), "Could not open device");
            return Err(e);
        }
        self.active_device = Some(device.clone());
        self.start_loop()?;
        info!(device_id = %device.id, label = %device.label, "Scanning started");
        Ok(device)
    }

    fn start_loop(&mut self) -> ScannerResult<()> {
        let controller = self.controller.clone();
        self.session.start_scan(move |payload| {
            controller.submit(payload);
        })
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.session.cancel_scan();
        self.controller.cancel_pending();
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("active_device", &self.active_device)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
