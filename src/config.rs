//! # Scanner Configuration
//!
//! Runtime configuration for the scanning pipeline.
//!
//! ## Sources
//!
//! Later sources override earlier ones:
//!
//! 1. Default values
//! 2. TOML file passed to [`ScannerConfig::load`]
//! 3. Environment variables
//!
//! The merged result is validated before it is returned.
//!
//! ## Parameters
//!
//! | Parameter | Default | Range | Env override |
//! |-----------|---------|-------|--------------|
//! | `ideal_width` | 1280 | > 0 | |
//! | `ideal_height` | 720 | > 0 | |
//! | `prefer_front` | false | | `SCANNER_PREFER_FRONT` |
//! | `frame_interval_ms` | 16 | 1-1000 | `SCANNER_FRAME_INTERVAL_MS` |
//! | `max_decode_side` | 1280 | 0 = full frame | `SCANNER_MAX_DECODE_SIDE` |
//! | `lookup_latency_ms` | 800 | 0-60000 | `SCANNER_LOOKUP_LATENCY_MS` |
//!
//! ## File Format
//!
//! ```toml
//! ideal_width = 1920
//! ideal_height = 1080
//! prefer_front = true
//! frame_interval_ms = 33
//! max_decode_side = 960
//! lookup_latency_ms = 0
//! ```

use std::path::Path;
use std::time::Duration;

use scan_decode::Size;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ScannerError, ScannerResult};

const MAX_LOOKUP_LATENCY_MS: u64 = 60_000;

/// Configuration for a scanning surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Requested capture width. The device may negotiate another size.
    pub ideal_width: u32,

    /// Requested capture height.
    pub ideal_height: u32,

    /// Prefer a front-facing camera when selecting a device.
    pub prefer_front: bool,

    /// Delay between frame samples, in milliseconds.
    ///
    /// 16ms approximates one display refresh.
    pub frame_interval_ms: u64,

    /// Longest side handed to the decoder; larger frames are downsampled.
    /// `0` decodes at full resolution.
    pub max_decode_side: u32,

    /// Artificial latency of the mock classification lookup, in milliseconds.
    pub lookup_latency_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            prefer_front: false,
            frame_interval_ms: 16,
            max_decode_side: 1280,
            lookup_latency_ms: 800,
        }
    }
}

impl ScannerConfig {
    /// Loads configuration from defaults, an optional TOML file and the
    /// process environment, then validates it.
    pub fn load(config_path: Option<&Path>) -> ScannerResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> ScannerResult<Self> {
        info!(?path, "Loading scanner config from file");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ScannerError::io("read config file", e).with_path(path.display().to_string())
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> ScannerResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies environment overrides using `lookup` to read variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("SCANNER_PREFER_FRONT") {
            match parse_bool(&value) {
                Some(prefer) => {
                    debug!(prefer_front = prefer, "Overriding camera preference from environment");
                    self.prefer_front = prefer;
                }
                None => warn!(value = %value, "Ignoring invalid SCANNER_PREFER_FRONT"),
            }
        }

        if let Some(value) = lookup("SCANNER_FRAME_INTERVAL_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => {
                    debug!(frame_interval_ms = ms, "Overriding frame interval from environment");
                    self.frame_interval_ms = ms;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid SCANNER_FRAME_INTERVAL_MS"),
            }
        }

        if let Some(value) = lookup("SCANNER_MAX_DECODE_SIDE") {
            match value.trim().parse::<u32>() {
                Ok(side) => self.max_decode_side = side,
                Err(_) => warn!(value = %value, "Ignoring invalid SCANNER_MAX_DECODE_SIDE"),
            }
        }

        if let Some(value) = lookup("SCANNER_LOOKUP_LATENCY_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => self.lookup_latency_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid SCANNER_LOOKUP_LATENCY_MS"),
            }
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> ScannerResult<()> {
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(ScannerError::config(
                "ideal_size",
                format!("{}x{}", self.ideal_width, self.ideal_height),
                "ideal capture size must be non-zero",
            ));
        }
        if !(1..=1000).contains(&self.frame_interval_ms) {
            return Err(ScannerError::config(
                "frame_interval_ms",
                self.frame_interval_ms.to_string(),
                "frame interval must be between 1 and 1000 ms",
            ));
        }
        if self.lookup_latency_ms > MAX_LOOKUP_LATENCY_MS {
            return Err(ScannerError::config(
                "lookup_latency_ms",
                self.lookup_latency_ms.to_string(),
                "lookup latency must not exceed 60 seconds",
            ));
        }
        Ok(())
    }

    /// Requested capture resolution.
    pub fn ideal_size(&self) -> Size {
        Size::new(self.ideal_width, self.ideal_height)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn lookup_latency(&self) -> Duration {
        Duration::from_millis(self.lookup_latency_ms)
    }

    /// Decoder downsampling limit, `None` for full resolution.
    pub fn max_decode_side(&self) -> Option<u32> {
        (self.max_decode_side > 0).then_some(self.max_decode_side)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
