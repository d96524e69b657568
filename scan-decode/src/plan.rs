// SPDX-License-Identifier: MIT
//! # Sampling Plans
//!
//! Decoding cost grows with pixel count while QR detection only needs enough
//! resolution to resolve modules. A [`SamplePlan`] clamps the longest side of
//! a frame to a configured maximum before it reaches the detector.
//!
//! ## Rules
//!
//! - Aspect ratio is always preserved
//! - No upscaling: frames smaller than the target pass through unchanged
//! - Output dimensions are clamped to at least 1px

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    /// Create a size from width and height.
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Number of pixels covered by this size.
    pub fn pixels(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Byte length of a tightly packed RGBA buffer of this size.
    pub fn rgba_len(&self) -> usize {
        self.pixels() * 4
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// Computed sampling plan for one frame geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplePlan {
    /// Original frame dimensions
    pub input: Size,
    /// Dimensions handed to the detector
    pub out: Size,
}

impl SamplePlan {
    /// Whether the plan requires a resize pass.
    pub fn is_downsampled(&self) -> bool {
        self.input != self.out
    }

    /// Factors mapping detector coordinates back to source coordinates.
    pub fn inverse_scale(&self) -> (f32, f32) {
        (
            self.input.w as f32 / self.out.w as f32,
            self.input.h as f32 / self.out.h as f32,
        )
    }
}

/// Compute a sampling plan for a frame.
///
/// `max_long_side` of `None` (or `Some(0)`) keeps the frame at native size.
pub fn build_plan(input: Size, max_long_side: Option<u32>) -> SamplePlan {
    let out = match max_long_side {
        Some(max) if max > 0 && !input.is_empty() => {
            let (w, h) = fit_preserve(input, max);
            Size { w, h }
        }
        _ => input,
    };
    SamplePlan { input, out }
}

/// Fit within `max_long` on the longest dimension, preserving aspect ratio.
/// Never upscales.
fn fit_preserve(input: Size, max_long: u32) -> (u32, u32) {
    let (w, h) = (input.w as f64, input.h as f64);
    let long = w.max(h);
    let s = (max_long as f64 / long).min(1.0);
    (
        ((w * s).round() as u32).max(1),
        ((h * s).round() as u32).max(1),
    )
}

/// Detector resolution presets.
///
/// Smaller presets decode faster on large camera frames at the cost of
/// missing very small or distant codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SamplingPreset {
    /// Decode at the negotiated camera resolution
    #[clap(name = "full")]
    Full,
    /// Clamp the longest side to 1280px
    #[clap(name = "long1280")]
    Long1280,
    /// Clamp the longest side to 960px
    #[clap(name = "long960")]
    Long960,
    /// Clamp the longest side to 640px
    #[clap(name = "long640")]
    Long640,
}

impl SamplingPreset {
    /// Longest-side limit for this preset.
    pub fn max_long_side(self) -> Option<u32> {
        match self {
            SamplingPreset::Full => None,
            SamplingPreset::Long1280 => Some(1280),
            SamplingPreset::Long960 => Some(960),
            SamplingPreset::Long640 => Some(640),
        }
    }
}
