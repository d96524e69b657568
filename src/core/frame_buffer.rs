//! # Frame Buffer
//!
//! Reusable RGBA sampling buffer for the frame scan loop.
//!
//! The loop copies every sampled frame into the same buffer. Resizing only
//! reallocates when the backing storage has to grow, so a stream that keeps
//! its negotiated resolution never allocates after the first sample.
//!
//! ```rust
//! use code_scanner::core::FrameBuffer;
//! use code_scanner::Size;
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.ensure_size(Size::new(640, 480));
//! buffer.ensure_size(Size::new(640, 480));
//! assert_eq!(buffer.as_slice().len(), 640 * 480 * 4);
//! assert_eq!(buffer.reallocations(), 1);
//! ```

use scan_decode::Size;

/// RGBA buffer sized to the source's actual dimensions.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    size: Size,
    reallocations: usize,
}

impl FrameBuffer {
    /// Creates an empty buffer. Storage is allocated on the first `ensure_size`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer already sized for `size`.
    pub fn with_size(size: Size) -> Self {
        let mut buffer = Self::new();
        buffer.ensure_size(size);
        buffer
    }

    /// Resizes the buffer in place for a frame of `size`.
    ///
    /// Returns `true` when the backing storage had to grow.
    pub fn ensure_size(&mut self, size: Size) -> bool {
        let needed = size.rgba_len();
        let grew = needed > self.data.capacity();
        if grew {
            self.reallocations += 1;
        }
        self.data.resize(needed, 0);
        self.size = size;
        grew
    }

    /// Current frame dimensions.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Pixel bytes for the current frame.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes for the current frame.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of times the backing storage was (re)allocated.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}
