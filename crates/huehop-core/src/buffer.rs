//! Pixel buffers exchanged between pipeline steps.
//!
//! A [`PixelBuffer`] is a 3-channel raster with explicit width, height,
//! and channel order. Buffers are immutable after construction: every
//! transform produces a new buffer, and the pipeline engine only ever
//! passes them around by reference.

use serde::{Deserialize, Serialize};

/// Number of samples per pixel. Buffers are always 3-channel.
pub const CHANNELS: usize = 3;

/// Order of the three color samples within each pixel.
///
/// The framework never interprets sample values itself; the order is
/// carried so algorithms can normalize their inputs (see
/// [`PixelBuffer::with_order`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Red, green, blue.
    #[default]
    Rgb,
    /// Blue, green, red.
    Bgr,
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors from [`PixelBuffer`] construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Width or height was zero.
    #[error("buffer dimensions must be positive, got {width}x{height}")]
    ZeroDimension {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Data length does not match `width * height * 3`.
    #[error("buffer data length {actual} does not match {width}x{height}x{CHANNELS} = {expected}")]
    LengthMismatch {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Expected data length in samples.
        expected: usize,
        /// Actual data length in samples.
        actual: usize,
    },
}

/// A 3-channel raster image held in memory.
///
/// Dimensions and channel order are fixed at creation. The sample data
/// is a flat row-major sequence of `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

/// Expected flat data length for the given dimensions.
fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CHANNELS
}

impl PixelBuffer {
    /// Create a buffer from raw sample data.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroDimension`] if `width` or `height` is
    /// zero, and [`BufferError::LengthMismatch`] if `data.len()` is not
    /// `width * height * 3`.
    pub fn from_raw(
        width: u32,
        height: u32,
        order: ChannelOrder,
        data: Vec<u8>,
    ) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        let expected = expected_len(width, height);
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Create a buffer with every pixel set to `pixel`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::ZeroDimension`] if `width` or `height` is
    /// zero.
    pub fn filled(
        width: u32,
        height: u32,
        order: ChannelOrder,
        pixel: [u8; CHANNELS],
    ) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::ZeroDimension { width, height });
        }
        let pixel_count = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixel_count * CHANNELS);
        for _ in 0..pixel_count {
            data.extend_from_slice(&pixel);
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Channel order of the sample data.
    #[must_use]
    pub const fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Width and height as a [`Dimensions`] value.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// The flat sample data, row-major, `width * height * 3` bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer and return the underlying sample data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The pixel at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; CHANNELS]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// A copy of this buffer with the given channel order.
    ///
    /// Swaps the first and third sample of every pixel when the target
    /// order differs; otherwise this is a plain clone.
    #[must_use]
    pub fn with_order(&self, order: ChannelOrder) -> Self {
        if order == self.order {
            return self.clone();
        }
        let mut data = self.data.clone();
        for pixel in data.chunks_exact_mut(CHANNELS) {
            pixel.swap(0, 2);
        }
        Self {
            width: self.width,
            height: self.height,
            order,
            data,
        }
    }
}
