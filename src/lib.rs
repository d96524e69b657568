//! # Code Scanner Library
//!
//! Camera-based scanning of machine-readable codes: device selection, stream
//! lifecycle, a cooperative frame-sampling loop, static image decode, and
//! classification of decoded payloads into typed results.
//!
//! ## Architecture
//!
//! - `camera`: backend seam, device selection, replay backend
//! - `session`: exclusive ownership of the live stream and its scan loop
//! - `scan_loop`: frame sampling until a code is decoded or cancelled
//! - `upload`: single-image decode through the same decode primitive
//! - `classify`: schema table, record lookup and typed results
//! - `controller`: pending/resolved lifecycle with last-write-wins delivery
//! - `scanner`: the composed scanning surface
//! - `config`, `error`, `core`: configuration, error taxonomy, frame buffers
//!
//! The decode primitive itself lives in the `scan-decode` crate and is only
//! reached through [`DecodePrimitive`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use code_scanner::camera::ReplayBackend;
//! use code_scanner::{Scanner, ScannerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = ReplayBackend::from_directory(Path::new("frames"))?;
//! let mut scanner = Scanner::with_defaults(ScannerConfig::default(), Arc::new(backend));
//!
//! scanner.start().await?;
//! if let Some(result) = scanner.controller().resolved().await {
//!     println!("{}", result.to_json_pretty()?);
//! }
//! scanner.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod classify;
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod payload;
pub mod scan_loop;
pub mod scanner;
pub mod session;
pub mod upload;

pub use scan_decode::{DecodePrimitive, DecodedCode, Point, QrDecoder, SamplingPreset, Size};

pub use camera::{CameraBackend, CaptureDevice, DeviceManager, Facing, VideoSource};
pub use classify::{ScanDetails, ScanResult, ScanResultClassifier};
pub use config::ScannerConfig;
pub use controller::{ControllerState, ScanResultController};
pub use error::{
    HasRecoverySuggestion, HasSeverity, Recoverable, Retryable, ScannerError, ScannerResult,
};
pub use payload::{DecodedPayload, Provenance};
pub use scan_loop::{FrameScanLoop, LoopExit, LoopHandle};
pub use scanner::Scanner;
pub use session::{CaptureSession, ScanLoopState, StreamHandle, SuspendReason};
pub use upload::{StaticImageDecoder, UploadedImage};
