//! Camera device layer: backend seam, device selection and the replay backend.

pub mod backend;
pub mod device;
pub mod replay;

pub use backend::{CameraBackend, DeviceCapabilities, StreamRequest, VideoSource};
pub use device::{CaptureDevice, DeviceManager, Facing};
pub use replay::{DeviceAccess, ReplayBackend, ReplayDevice, ReplaySource, RgbaFrame};
