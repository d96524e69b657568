//! # Replay Camera Backend
//!
//! A virtual camera that plays still images as video frames. Used by the CLI
//! to run the full pipeline without camera hardware, and by tests to script
//! device behaviour.
//!
//! ## Directory layout
//!
//! ```text
//! frames/
//! ├── back-camera/        one device per sub-directory
//! │   ├── 000.png         frames in lexical order
//! │   └── 001.png
//! └── front-camera/
//!     └── 000.jpg
//! ```
//!
//! A directory without sub-directories is loaded as a single device.
//!
//! After the last frame the source keeps returning it, like a camera pointed
//! at a static scene.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use scan_decode::Size;
use tracing::{debug, info, warn};

use super::backend::{CameraBackend, DeviceCapabilities, StreamRequest, VideoSource};
use super::device::{CaptureDevice, Facing};
use crate::core::FrameBuffer;
use crate::error::{ScannerError, ScannerResult};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// A tightly packed RGBA frame shared between devices and sources.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    size: Size,
    data: Arc<[u8]>,
}

impl RgbaFrame {
    /// Wraps RGBA bytes, checking they cover `size`.
    pub fn new(size: Size, data: Vec<u8>) -> ScannerResult<Self> {
        if size.is_empty() || data.len() != size.rgba_len() {
            return Err(ScannerError::unreadable_image(format!(
                "frame {} needs {} bytes, got {}",
                size,
                size.rgba_len(),
                data.len()
            )));
        }
        Ok(Self {
            size,
            data: data.into(),
        })
    }

    /// A frame filled with one colour.
    pub fn solid(size: Size, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba.iter().copied().cycle().take(size.rgba_len()).collect();
        Self {
            size,
            data: data.into(),
        }
    }

    pub fn from_image(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let size = Size::new(rgba.width(), rgba.height());
        Self {
            size,
            data: rgba.into_raw().into(),
        }
    }

    /// Loads an image file as a frame.
    pub fn load(path: &Path) -> ScannerResult<Self> {
        let image = image::open(path).map_err(|e| {
            ScannerError::unreadable_image(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::from_image(&image))
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Outcome of an access request to a replay device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceAccess {
    #[default]
    Granted,
    Denied,
    Unavailable,
}

/// Scripted device definition.
#[derive(Debug, Clone)]
pub struct ReplayDevice {
    info: CaptureDevice,
    frames: Vec<RgbaFrame>,
    access: DeviceAccess,
    torch: bool,
    warmup_polls: u32,
}

impl ReplayDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            info: CaptureDevice::new(id, label),
            frames: Vec::new(),
            access: DeviceAccess::Granted,
            torch: false,
            warmup_polls: 0,
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.info = self.info.with_facing(facing);
        self
    }

    pub fn with_frame(mut self, frame: RgbaFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = RgbaFrame>) -> Self {
        self.frames.extend(frames);
        self
    }

    pub fn with_access(mut self, access: DeviceAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_torch(mut self, torch: bool) -> Self {
        self.torch = torch;
        self
    }

    /// Number of `has_frame_data` polls answered with `false` after opening.
    pub fn with_warmup(mut self, polls: u32) -> Self {
        self.warmup_polls = polls;
        self
    }

    pub fn info(&self) -> &CaptureDevice {
        &self.info
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Camera backend over scripted devices.
#[derive(Debug, Clone, Default)]
pub struct ReplayBackend {
    devices: Vec<ReplayDevice>,
    api_unavailable: bool,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: ReplayDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// A backend whose device-access API is missing. Enumeration fails.
    pub fn unavailable() -> Self {
        Self {
            devices: Vec::new(),
            api_unavailable: true,
        }
    }

    /// Loads devices from a directory of frame images.
    pub fn from_directory(root: &Path) -> ScannerResult<Self> {
        let entries = sorted_entries(root)?;
        let subdirs: Vec<&PathBuf> = entries.iter().filter(|path| path.is_dir()).collect();

        let mut backend = Self::new();
        if subdirs.is_empty() {
            let label = root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "replay".to_string());
            let frames = load_frames(&entries)?;
            backend = backend.with_device(ReplayDevice::new("replay-0", label).with_frames(frames));
        } else {
            for dir in subdirs {
                let name = dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let frames = load_frames(&sorted_entries(dir)?)?;
                if frames.is_empty() {
                    warn!(path = %dir.display(), "Skipping replay device without frames");
                    continue;
                }
                backend = backend.with_device(ReplayDevice::new(name.clone(), name).with_frames(frames));
            }
        }

        info!(
            root = %root.display(),
            devices = backend.devices.len(),
            "Loaded replay devices"
        );
        Ok(backend)
    }

    pub fn devices(&self) -> &[ReplayDevice] {
        &self.devices
    }

    fn find(&self, request: &StreamRequest) -> Option<&ReplayDevice> {
        match &request.device_id {
            Some(id) => self.devices.iter().find(|d| &d.info.id == id),
            None => self
                .devices
                .iter()
                .find(|d| d.info.facing == request.facing)
                .or_else(|| self.devices.first()),
        }
    }

    fn find_by_id(&self, device_id: &str) -> ScannerResult<&ReplayDevice> {
        self.devices
            .iter()
            .find(|d| d.info.id == device_id)
            .ok_or_else(|| ScannerError::device_unavailable(device_id, "no such device"))
    }
}

fn sorted_entries(dir: &Path) -> ScannerResult<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| ScannerError::io("read replay directory", e).with_path(dir.display().to_string()))?;
    let mut paths = Vec::new();
    for entry in read_dir {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

fn load_frames(paths: &[PathBuf]) -> ScannerResult<Vec<RgbaFrame>> {
    paths
        .iter()
        .filter(|path| path.is_file() && is_image(path))
        .map(|path| RgbaFrame::load(path))
        .collect()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[async_trait]
impl CameraBackend for ReplayBackend {
    async fn enumerate(&self) -> ScannerResult<Vec<CaptureDevice>> {
        if self.api_unavailable {
            return Err(ScannerError::enumeration("device access API is not available"));
        }
        Ok(self.devices.iter().map(|d| d.info.clone()).collect())
    }

    async fn capabilities(&self, device_id: &str) -> ScannerResult<DeviceCapabilities> {
        let device = self.find_by_id(device_id)?;
        Ok(DeviceCapabilities {
            illumination: device.torch,
        })
    }

    async fn open(&self, request: &StreamRequest) -> ScannerResult<Box<dyn VideoSource>> {
        let requested = request.device_id.as_deref().unwrap_or("<default>");
        let device = self
            .find(request)
            .ok_or_else(|| ScannerError::device_unavailable(requested, "no such device"))?;

        match device.access {
            DeviceAccess::Granted => {}
            DeviceAccess::Denied => return Err(ScannerError::permission_denied(&device.info.id)),
            DeviceAccess::Unavailable => {
                return Err(ScannerError::device_unavailable(
                    &device.info.id,
                    "device is in use or disconnected",
                ));
            }
        }
        if device.frames.is_empty() {
            return Err(ScannerError::device_unavailable(&device.info.id, "device produced no frames"));
        }

        let source = ReplaySource {
            device_id: device.info.id.clone(),
            frames: device.frames.clone(),
            cursor: 0,
            warmup_remaining: device.warmup_polls,
            torch_supported: device.torch,
            torch_on: false,
            stopped: false,
        };
        debug!(
            device_id = %source.device_id,
            ideal = %request.ideal,
            negotiated = %source.negotiated_size(),
            "Opened replay stream"
        );
        Ok(Box::new(source))
    }
}

/// A stream over a replay device's frames.
#[derive(Debug)]
pub struct ReplaySource {
    device_id: String,
    frames: Vec<RgbaFrame>,
    cursor: usize,
    warmup_remaining: u32,
    torch_supported: bool,
    torch_on: bool,
    stopped: bool,
}

impl ReplaySource {
    pub fn torch_on(&self) -> bool {
        self.torch_on
    }
}

#[async_trait]
impl VideoSource for ReplaySource {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn negotiated_size(&self) -> Size {
        self.frames.first().map(RgbaFrame::size).unwrap_or_default()
    }

    fn has_frame_data(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return false;
        }
        true
    }

    fn read_frame(&mut self, buffer: &mut FrameBuffer) -> ScannerResult<()> {
        if self.stopped {
            return Err(ScannerError::state("stopped", "read_frame", "stream was stopped"));
        }
        let index = self.cursor.min(self.frames.len().saturating_sub(1));
        let frame = self
            .frames
            .get(index)
            .ok_or_else(|| ScannerError::hardware("read_frame", "stream has no frames"))?;
        buffer.ensure_size(frame.size());
        buffer.as_mut_slice().copy_from_slice(frame.as_bytes());
        self.cursor = self.cursor.saturating_add(1);
        Ok(())
    }

    fn supports_illumination(&self) -> bool {
        self.torch_supported
    }

    async fn apply_illumination(&mut self, on: bool) -> ScannerResult<()> {
        if !self.torch_supported {
            return Err(ScannerError::illumination_unsupported(&self.device_id));
        }
        if self.stopped {
            return Err(ScannerError::hardware("apply_illumination", "stream was stopped"));
        }
        self.torch_on = on;
        debug!(device_id = %self.device_id, on, "Torch toggled");
        Ok(())
    }

    async fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.torch_on = false;
            debug!(device_id = %self.device_id, "Replay stream stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(device_id: Option<&str>) -> StreamRequest {
        StreamRequest {
            device_id: device_id.map(str::to_string),
            facing: Facing::Rear,
            ideal: Size::new(1280, 720),
        }
    }

    fn frame(shade: u8) -> RgbaFrame {
        RgbaFrame::solid(Size::new(4, 2), [shade, shade, shade, 255])
    }

    #[test]
    fn test_frame_length_checked() {
        assert!(RgbaFrame::new(Size::new(2, 2), vec![0; 16]).is_ok());
        assert!(RgbaFrame::new(Size::new(2, 2), vec![0; 15]).is_err());
        assert!(RgbaFrame::new(Size::new(0, 2), Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_negotiated_size_is_native() {
        let backend = ReplayBackend::new().with_device(ReplayDevice::new("cam", "Back Camera").with_frame(frame(10)));
        let source = backend.open(&request(None)).await.unwrap();
        assert_eq!(source.negotiated_size(), Size::new(4, 2));
    }

    #[tokio::test]
    async fn test_access_outcomes() {
        let backend = ReplayBackend::new()
            .with_device(ReplayDevice::new("denied", "Front").with_frame(frame(1)).with_access(DeviceAccess::Denied))
            .with_device(
                ReplayDevice::new("busy", "Back").with_frame(frame(1)).with_access(DeviceAccess::Unavailable),
            )
            .with_device(ReplayDevice::new("empty", "Back"));

        let denied = backend.open(&request(Some("denied"))).await.err().unwrap();
        assert_eq!(denied.category(), "permission_denied");
        let busy = backend.open(&request(Some("busy"))).await.err().unwrap();
        assert_eq!(busy.category(), "device_unavailable");
        let empty = backend.open(&request(Some("empty"))).await.err().unwrap();
        assert_eq!(empty.category(), "device_unavailable");
        let missing = backend.open(&request(Some("nope"))).await.err().unwrap();
        assert_eq!(missing.category(), "device_unavailable");
    }

    #[tokio::test]
    async fn test_warmup_and_frame_sequence() {
        let backend = ReplayBackend::new().with_device(
            ReplayDevice::new("cam", "Back Camera")
                .with_frames([frame(10), frame(20)])
                .with_warmup(2),
        );
        let mut source = backend.open(&request(Some("cam"))).await.unwrap();
        assert!(!source.has_frame_data());
        assert!(!source.has_frame_data());
        assert!(source.has_frame_data());

        let mut buffer = FrameBuffer::new();
        let shades: Vec<u8> = (0..4)
            .map(|_| {
                source.read_frame(&mut buffer).unwrap();
                buffer.as_slice()[0]
            })
            .collect();
        assert_eq!(shades, vec![10, 20, 20, 20]);
        assert_eq!(buffer.reallocations(), 1);

        source.stop().await;
        assert!(!source.has_frame_data());
        assert!(source.read_frame(&mut buffer).is_err());
    }

    #[tokio::test]
    async fn test_torch() {
        let backend = ReplayBackend::new()
            .with_device(ReplayDevice::new("lit", "Back").with_frame(frame(1)).with_torch(true))
            .with_device(ReplayDevice::new("dark", "Front").with_frame(frame(1)));

        assert!(backend.capabilities("lit").await.unwrap().illumination);
        assert!(!backend.capabilities("dark").await.unwrap().illumination);

        let mut lit = backend.open(&request(Some("lit"))).await.unwrap();
        assert!(lit.apply_illumination(true).await.is_ok());

        let mut dark = backend.open(&request(Some("dark"))).await.unwrap();
        let err = dark.apply_illumination(true).await.unwrap_err();
        assert_eq!(err.category(), "illumination_unsupported");
    }

    #[tokio::test]
    async fn test_unavailable_api() {
        let err = ReplayBackend::unavailable().enumerate().await.unwrap_err();
        assert_eq!(err.category(), "enumeration");
    }

    #[test]
    fn test_from_directory() {
        let root = tempfile::tempdir().unwrap();
        let back = root.path().join("back-camera");
        let front = root.path().join("front-camera");
        std::fs::create_dir(&back).unwrap();
        std::fs::create_dir(&front).unwrap();
        std::fs::create_dir(root.path().join("empty")).unwrap();

        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]));
        img.save(back.join("000.png")).unwrap();
        img.save(back.join("001.png")).unwrap();
        img.save(front.join("000.png")).unwrap();
        std::fs::write(front.join("notes.txt"), "not a frame").unwrap();

        let backend = ReplayBackend::from_directory(root.path()).unwrap();
        let ids: Vec<&str> = backend.devices().iter().map(|d| d.info().id.as_str()).collect();
        assert_eq!(ids, vec!["back-camera", "front-camera"]);
        assert_eq!(backend.devices()[0].info().facing, Facing::Rear);
        assert_eq!(backend.devices()[0].frame_count(), 2);
        assert_eq!(backend.devices()[1].info().facing, Facing::Front);
        assert_eq!(backend.devices()[1].frame_count(), 1);
    }

    #[test]
    fn test_from_flat_directory() {
        let root = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
        img.save(root.path().join("frame.png")).unwrap();

        let backend = ReplayBackend::from_directory(root.path()).unwrap();
        assert_eq!(backend.devices().len(), 1);
        assert_eq!(backend.devices()[0].info().id, "replay-0");
    }
}
