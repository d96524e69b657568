//! Decoded payloads as they leave the scan loop or the upload decoder.

use chrono::{DateTime, Utc};
use scan_decode::{DecodedCode, Point};
use serde::Serialize;

/// Where a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Live,
    UploadedImage,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Live => write!(f, "live"),
            Provenance::UploadedImage => write!(f, "uploaded-image"),
        }
    }
}

/// Raw decoded string plus capture metadata.
///
/// Transient: handed to the classifier and not retained afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub raw: String,
    pub captured_at: DateTime<Utc>,
    pub provenance: Provenance,
    /// Code boundary in source pixels, when the payload came from an image.
    pub corners: Option<[Point; 4]>,
}

impl DecodedPayload {
    /// Payload without geometry, stamped with the current time.
    pub fn new(raw: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            raw: raw.into(),
            captured_at: Utc::now(),
            provenance,
            corners: None,
        }
    }

    pub fn from_code(code: DecodedCode, provenance: Provenance) -> Self {
        Self {
            raw: code.data,
            captured_at: Utc::now(),
            provenance,
            corners: Some(code.corners),
        }
    }

    pub fn live(code: DecodedCode) -> Self {
        Self::from_code(code, Provenance::Live)
    }

    pub fn uploaded(code: DecodedCode) -> Self {
        Self::from_code(code, Provenance::UploadedImage)
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }
}
