//! Camera abstractions consumed by the MJPEG stream.
//!
//! Frames and converted JPEG buffers are RAII guards: dropping a frame hands
//! it back to the driver and dropping a converted buffer frees it.

/// Pixel format reported by the sensor for a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Compressed by the sensor, ready to stream.
    Jpeg,
    Rgb565,
    Yuv422,
    Grayscale,
    /// 24-bit true color. Large, convert before sending.
    Rgb888,
    /// Driver format code this crate has no name for.
    Raw(u32),
}

impl PixelFormat {
    pub fn is_jpeg(&self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }
}

/// A captured frame borrowed from the camera driver.
pub trait Frame {
    fn format(&self) -> PixelFormat;
    fn data(&self) -> &[u8];
}

/// Source of camera frames.
pub trait FrameSource {
    type Frame: Frame;
    /// Buffer produced by a JPEG conversion.
    type Jpeg: AsRef<[u8]>;

    /// Grab the next frame. `None` when the driver has no frame to give.
    fn acquire(&mut self) -> Option<Self::Frame>;

    /// Compress a non-JPEG frame. `quality` ranges over 1..=100.
    fn encode_jpeg(&mut self, frame: &Self::Frame, quality: u8) -> Option<Self::Jpeg>;
}
