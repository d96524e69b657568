// SPDX-License-Identifier: MIT
// Luma preparation built on fast_image_resize (SIMD-accelerated).
// RGBA8 in → U8 luma out, written into caller-owned scratch buffers.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8;
use fir::{ResizeOptions, Resizer};

use crate::plan::{SamplePlan, Size};

#[derive(Debug)]
pub enum LumaError {
    BufferTooSmall { expected: usize, actual: usize },
    EmptyFrame,
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for LumaError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for LumaError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for LumaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LumaError::BufferTooSmall { expected, actual } => {
                write!(f, "RGBA buffer too small: expected {} bytes, got {}", expected, actual)
            }
            LumaError::EmptyFrame => write!(f, "Frame has a zero dimension"),
            LumaError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            LumaError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for LumaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LumaError::Fir(e) => Some(e),
            LumaError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

/// Reusable luma planes. Kept across calls so steady-state decoding does not allocate.
#[derive(Debug, Default)]
pub struct LumaScratch {
    full: Vec<u8>,
    scaled: Vec<u8>,
}

impl LumaScratch {
    pub fn new() -> Self { Self::default() }

    /// Bytes currently reserved by both planes.
    pub fn capacity(&self) -> usize { self.full.capacity() + self.scaled.capacity() }
}

/// Convert tightly packed RGBA into an 8-bit luma plane (BT.601 weights).
/// `dst` is resized to `size.pixels()`.
pub fn rgba_to_luma(src: &[u8], size: Size, dst: &mut Vec<u8>) -> Result<(), LumaError> {
    if size.is_empty() {
        return Err(LumaError::EmptyFrame);
    }
    let expected = size.rgba_len();
    if src.len() < expected {
        return Err(LumaError::BufferTooSmall { expected, actual: src.len() });
    }

    dst.resize(size.pixels(), 0);
    for (px, out) in src[..expected].chunks_exact(4).zip(dst.iter_mut()) {
        let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
        *out = ((r * 299 + g * 587 + b * 114) / 1000) as u8;
    }
    Ok(())
}

/// Produce the luma plane the detector should see for `plan`.
/// Returns a view into `scratch`; downsampling happens only when the plan asks for it.
pub fn prepare_luma<'a>(
    scratch: &'a mut LumaScratch,
    rgba: &[u8],
    plan: &SamplePlan,
) -> Result<&'a [u8], LumaError> {
    rgba_to_luma(rgba, plan.input, &mut scratch.full)?;
    if !plan.is_downsampled() {
        return Ok(&scratch.full);
    }

    scratch.scaled.resize(plan.out.pixels(), 0);
    let src_view = TypedImageRef::<U8>::from_buffer(plan.input.w, plan.input.h, &scratch.full)?;
    let mut dst_image =
        TypedImage::<U8>::from_buffer(plan.out.w, plan.out.h, scratch.scaled.as_mut_slice())?;

    let opts = ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    let mut resizer = Resizer::new();
    resizer.resize_typed::<U8>(&src_view, &mut dst_image, &opts)?;

    Ok(&scratch.scaled)
}
