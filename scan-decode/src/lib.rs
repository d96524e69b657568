// SPDX-License-Identifier: MIT
//! # scan-decode: Frame-to-Payload Decoding
//!
//! This crate is the decode primitive behind the scanner: given an RGBA pixel
//! buffer and its dimensions, it returns the payload of the first readable QR
//! code together with its corner geometry, or `None`.
//!
//! ## Key Components
//!
//! - [`plan`]: Detector resolution planning (longest-side clamping)
//! - [`luma`]: RGBA → luma conversion and SIMD downsampling
//! - [`QrDecoder`]: The `rqrr`-backed [`DecodePrimitive`]
//!
//! ## Input Contract
//!
//! - Channel order is RGBA, 4 bytes per pixel, rows tightly packed
//! - Any input is tolerated: short buffers, zero dimensions and noise all
//!   produce `None` rather than an error
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use scan_decode::{DecodePrimitive, QrDecoder};
//!
//! let decoder = QrDecoder::new().with_max_long_side(Some(960));
//! let rgba = vec![0u8; 1280 * 720 * 4];
//! if let Some(code) = decoder.decode(&rgba, 1280, 720) {
//!     println!("{} at {:?}", code.data, code.corners);
//! }
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

pub mod luma;
pub mod plan;

pub use plan::{build_plan, SamplePlan, SamplingPreset, Size};

/// A point in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Payload and location of a decoded code.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedCode {
    /// Decoded text content
    pub data: String,
    /// Corner points, clockwise from the top-left finder pattern
    pub corners: [Point; 4],
}

/// Black-box decoder over a pixel buffer.
///
/// Implementations must never panic or error on malformed input; "nothing
/// found" is always `None`.
pub trait DecodePrimitive: Send + Sync {
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Option<DecodedCode>;
}

/// QR decoder built on `rqrr`.
#[derive(Debug, Default)]
pub struct QrDecoder {
    max_long_side: Option<u32>,
    scratch: Mutex<luma::LumaScratch>,
}

impl QrDecoder {
    /// Decoder working at native frame resolution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamp the detector resolution. `None` or `Some(0)` disables downsampling.
    pub fn with_max_long_side(mut self, max_long_side: Option<u32>) -> Self {
        self.max_long_side = max_long_side.filter(|&side| side > 0);
        self
    }

    /// Decoder configured from a preset.
    pub fn with_preset(preset: SamplingPreset) -> Self {
        Self::new().with_max_long_side(preset.max_long_side())
    }

    fn detect(&self, rgba: &[u8], size: Size) -> Option<DecodedCode> {
        let plan = build_plan(size, self.max_long_side);
        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        let luma = luma::prepare_luma(&mut scratch, rgba, &plan).ok()?;

        let width = plan.out.w as usize;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, plan.out.h as usize, |x, y| {
                luma[y * width + x]
            });

        let (sx, sy) = plan.inverse_scale();
        prepared.detect_grids().into_iter().find_map(|grid| {
            let (_meta, content) = grid.decode().ok()?;
            let corners = grid.bounds.map(|p| Point {
                x: p.x as f32 * sx,
                y: p.y as f32 * sy,
            });
            Some(DecodedCode {
                data: content,
                corners,
            })
        })
    }
}

impl DecodePrimitive for QrDecoder {
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Option<DecodedCode> {
        let size = Size::new(width, height);
        if size.is_empty() || rgba.len() < size.rgba_len() {
            return None;
        }
        // rqrr has panicked on degenerate grids in the past; treat that as "not found".
        panic::catch_unwind(AssertUnwindSafe(|| self.detect(rgba, size))).unwrap_or(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE_PX: usize = 6;
    const QUIET_MODULES: usize = 4;

    fn render_qr(payload: &str) -> (Vec<u8>, Size) {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        let colors = code.to_colors();
        let side = (modules + QUIET_MODULES * 2) * MODULE_PX;
        let mut rgba = vec![255u8; side * side * 4];
        for y in 0..side {
            for x in 0..side {
                let mx = (x / MODULE_PX) as isize - QUIET_MODULES as isize;
                let my = (y / MODULE_PX) as isize - QUIET_MODULES as isize;
                let inside = mx >= 0 && my >= 0 && (mx as usize) < modules && (my as usize) < modules;
                if inside && colors[my as usize * modules + mx as usize] == qrcode::Color::Dark {
                    let i = (y * side + x) * 4;
                    rgba[i..i + 3].copy_from_slice(&[0, 0, 0]);
                }
            }
        }
        (rgba, Size::new(side as u32, side as u32))
    }

    #[test]
    fn decodes_rendered_code() {
        let (rgba, size) = render_qr("product:WH-BT100");
        let code = QrDecoder::new().decode(&rgba, size.w, size.h).expect("code");
        assert_eq!(code.data, "product:WH-BT100");
        for corner in code.corners {
            assert!(corner.x >= 0.0 && corner.x <= size.w as f32);
            assert!(corner.y >= 0.0 && corner.y <= size.h as f32);
        }
    }

    #[test]
    fn decodes_after_downsampling() {
        let (rgba, size) = render_qr("order:ORD-2024-0042");
        let decoder = QrDecoder::new().with_max_long_side(Some(size.w / 2));
        let code = decoder.decode(&rgba, size.w, size.h).expect("code");
        assert_eq!(code.data, "order:ORD-2024-0042");
    }

    #[test]
    fn blank_frame_finds_nothing() {
        let rgba = vec![255u8; 320 * 240 * 4];
        assert!(QrDecoder::new().decode(&rgba, 320, 240).is_none());
    }

    #[test]
    fn malformed_input_finds_nothing() {
        let decoder = QrDecoder::new();
        assert!(decoder.decode(&[1, 2, 3], 10, 10).is_none());
        assert!(decoder.decode(&[], 0, 0).is_none());

        let noise: Vec<u8> = (0..64 * 64 * 4).map(|i| (i * 7919 % 251) as u8).collect();
        assert!(decoder.decode(&noise, 64, 64).is_none());
    }
}
