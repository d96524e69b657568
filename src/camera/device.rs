//! Capture device snapshots and preferred-device selection.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::backend::{CameraBackend, DeviceCapabilities};
use crate::error::{ScannerError, ScannerResult};

const FRONT_HINTS: &[&str] = &["front", "user", "facetime", "selfie"];
const REAR_HINTS: &[&str] = &["back", "rear", "environment", "world"];

/// Which way a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    Rear,
    #[default]
    Unknown,
}

impl Facing {
    /// Infers facing from a device label.
    ///
    /// ```rust
    /// use code_scanner::camera::Facing;
    ///
    /// assert_eq!(Facing::from_label("FaceTime HD Camera"), Facing::Front);
    /// assert_eq!(Facing::from_label("Back Camera"), Facing::Rear);
    /// assert_eq!(Facing::from_label("USB Video Device"), Facing::Unknown);
    /// ```
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if FRONT_HINTS.iter().any(|hint| label.contains(hint)) {
            Facing::Front
        } else if REAR_HINTS.iter().any(|hint| label.contains(hint)) {
            Facing::Rear
        } else {
            Facing::Unknown
        }
    }
}

/// Immutable snapshot of an enumerated capture device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDevice {
    pub id: String,
    pub label: String,
    pub facing: Facing,
}

impl CaptureDevice {
    /// Creates a device, inferring its facing from the label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            id: id.into(),
            facing: Facing::from_label(&label),
            label,
        }
    }

    /// Overrides the inferred facing with one reported by the backend.
    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }
}

/// Enumerates devices and picks the one to open.
#[derive(Clone)]
pub struct DeviceManager {
    backend: Arc<dyn CameraBackend>,
}

impl DeviceManager {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Enumerates available capture devices.
    ///
    /// Backend failures surface as `enumeration` errors.
    pub async fn list_devices(&self) -> ScannerResult<Vec<CaptureDevice>> {
        let devices = self.backend.enumerate().await.map_err(|e| match e {
            ScannerError::Enumeration { .. } => e,
            other => ScannerError::enumeration(other.to_string()),
        })?;
        info!(count = devices.len(), "Enumerated capture devices");
        Ok(devices)
    }

    /// Capability flags for a device.
    pub async fn capabilities(&self, device_id: &str) -> ScannerResult<DeviceCapabilities> {
        self.backend.capabilities(device_id).await
    }

    /// Picks a device from an enumerated list.
    ///
    /// Prefers the first device facing the requested way, falling back to the
    /// first device overall.
    pub fn select_preferred(devices: &[CaptureDevice], prefer_front: bool) -> Option<&CaptureDevice> {
        let wanted = if prefer_front { Facing::Front } else { Facing::Rear };
        let selected = devices
            .iter()
            .find(|device| device.facing == wanted)
            .or_else(|| devices.first());
        if let Some(device) = selected {
            debug!(device_id = %device.id, label = %device.label, prefer_front, "Selected capture device");
        }
        selected
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager").finish_non_exhaustive()
    }
}
