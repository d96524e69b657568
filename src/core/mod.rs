//! Core data structures shared by the capture layer and the scan loop.

pub mod frame_buffer;

pub use frame_buffer::FrameBuffer;
