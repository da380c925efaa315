// THEORY:
// `Pixel` is the most fundamental unit of the extractor: a "dumb" RGBA container
// with no knowledge of its neighbors. `PixelBuffer` is the decoded thumbnail a
// task carries to its worker: width, height and row-major RGBA bytes.
//
// Key principles:
// 1) A `PixelBuffer` is validated once, at construction. Every consumer after
//    that (texture windows, sampling) may index it without re-checking length.
// 2) Buffers are read-only once built. The scheduler shares them between the
//    submitting caller and a worker behind an `Arc`, never copies them.
// 3) Alpha is carried but ignored by every heuristic downstream.

use crate::error::ExtractionError;

pub type Channel = u8;

const CHANNELS: usize = 4;

/// A single RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
    /// The alpha (transparency) channel value (0-255).
    pub alpha: Channel,
}

impl Pixel {
    pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub const fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
        Self::new(red, green, blue, 255)
    }
}

impl From<[Channel; CHANNELS]> for Pixel {
    fn from(bytes: [Channel; CHANNELS]) -> Self {
        Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl From<Pixel> for [Channel; CHANNELS] {
    fn from(pixel: Pixel) -> Self {
        [pixel.red, pixel.green, pixel.blue, pixel.alpha]
    }
}

/// A decoded image: row-major, 4 bytes (R, G, B, A) per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<Channel>,
}

impl PixelBuffer {
    /// Wraps raw RGBA bytes, checking that they match the given dimensions.
    pub fn new(width: u32, height: u32, data: Vec<Channel>) -> Result<Self, ExtractionError> {
        if width == 0 || height == 0 {
            return Err(ExtractionError::EmptyImage);
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(ExtractionError::BufferMismatch {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer where every pixel is `pixel`.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Result<Self, ExtractionError> {
        let bytes: [Channel; CHANNELS] = pixel.into();
        let data = bytes.repeat(width as usize * height as usize);
        Self::new(width, height, data)
    }

    /// Builds a buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self, ExtractionError>
    where
        F: FnMut(u32, u32) -> Pixel,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let bytes: [Channel; CHANNELS] = f(x, y).into();
                data.extend_from_slice(&bytes);
            }
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[Channel] {
        &self.data
    }

    pub fn into_data(self) -> Vec<Channel> {
        self.data
    }

    /// The pixel at `(x, y)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{}",
            self.width,
            self.height
        );
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Pixel::new(
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        )
    }
}
