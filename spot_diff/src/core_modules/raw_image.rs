// THEORY:
// `RawImage` is the most fundamental unit of the engine: a "dumb" data container
// holding one decoded image as a single contiguous, row-major byte buffer. Every
// later stage (splitting, differencing, labeling, rendering) works with row/column
// arithmetic over this flat buffer instead of nested per-pixel structures, which
// keeps the hot loops cache friendly and allocation free.
//
// Key architectural principles:
// 1.  **Immutable once built**: The constructor validates that the buffer length is
//     exactly `width * height * channels`; after that, nothing mutates it. Stages
//     that need a modified image (the annotator) work on copies.
// 2.  **Channel agnostic**: Grayscale, gray+alpha, RGB and RGBA are all accepted.
//     Comparison only needs matching channel counts; rendering converts to RGB.

use crate::core_modules::error::{DiffError, Result};
use image::RgbImage;

/// A decoded image stored as one flat, row-major pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(DiffError::Validation(format!(
                "channel count must be between 1 and 4, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DiffError::Validation(format!(
                "pixel buffer holds {} bytes, expected {expected} for {width}x{height}x{channels}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// An image of the given shape with every channel of every pixel set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self> {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes in one row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// `(width, height, channels)`, used for shape comparisons and error reports.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    /// The channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = y as usize * self.stride() + x as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }

    /// Copies rows `[start, end)` into a new image of the same width.
    pub fn rows(&self, start: u32, end: u32) -> Result<Self> {
        if start > end || end > self.height {
            return Err(DiffError::Validation(format!(
                "row range {start}..{end} is outside an image of height {}",
                self.height
            )));
        }
        let stride = self.stride();
        let bytes = self.data[start as usize * stride..end as usize * stride].to_vec();
        Self::new(self.width, end - start, self.channels, bytes)
    }

    /// Converts to an owned RGB buffer for rendering. Gray is replicated across
    /// channels and alpha is dropped.
    pub fn to_rgb_image(&self) -> RgbImage {
        let pixels = self.width as usize * self.height as usize;
        let rgb: Vec<u8> = match self.channels {
            3 => self.data.clone(),
            4 => self
                .data
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect(),
            channels => {
                let mut out = Vec::with_capacity(pixels * 3);
                for p in self.data.chunks_exact(channels as usize) {
                    out.extend_from_slice(&[p[0], p[0], p[0]]);
                }
                out
            }
        };
        // Length is width * height * 3 by construction.
        RgbImage::from_raw(self.width, self.height, rgb).unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

impl From<RgbImage> for RawImage {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 3,
            data: image.into_raw(),
        }
    }
}
