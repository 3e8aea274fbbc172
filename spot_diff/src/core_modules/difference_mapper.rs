// THEORY:
// The `DifferenceMapper` quantifies how much each pixel position changed between
// the two comparison images. It is purely comparative: a single image means
// nothing to it, only the relationship between two co-registered pixels.
//
// Key architectural principles:
// 1.  **Max, not mean**: A pixel's magnitude is the largest absolute per-channel
//     difference. Averaging would dilute a strong single-channel edit (a pure red
//     overlay, a recolored hat) against the unchanged channels, and color-only
//     edits are common in these games.
// 2.  **Global threshold**: The binary mask applies one threshold to every pixel.
//     There is no local or adaptive thresholding.
// 3.  **Two outputs, one pass**: The raw magnitude feeds the heatmap and the
//     thresholded mask feeds the region extractor, so both are produced together.

use crate::core_modules::error::{DiffError, Result};
use crate::core_modules::raw_image::RawImage;

/// Per-pixel difference intensity, one value per pixel position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnitudeMap {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl MagnitudeMap {
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> Result<Self> {
        if values.len() != width as usize * height as usize {
            return Err(DiffError::Validation(format!(
                "magnitude map holds {} values, expected {}",
                values.len(),
                width as usize * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// The largest magnitude in the map, 0 for identical images.
    pub fn max(&self) -> u8 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    /// Applies `threshold` to every position: `mask[p] = magnitude[p] >= threshold`.
    /// Unchanged pixels (magnitude 0) are never set, even for a zero threshold.
    pub fn threshold(&self, threshold: u8) -> BinaryMask {
        let threshold = threshold.max(1);
        BinaryMask {
            width: self.width,
            height: self.height,
            bits: self.values.iter().map(|&m| m >= threshold).collect(),
        }
    }
}

/// A thresholded difference map: `true` where the images differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    pub fn new(width: u32, height: u32, bits: Vec<bool>) -> Result<Self> {
        if bits.len() != width as usize * height as usize {
            return Err(DiffError::Validation(format!(
                "mask holds {} cells, expected {}",
                bits.len(),
                width as usize * height as usize
            )));
        }
        Ok(Self {
            width,
            height,
            bits,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Number of set cells.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

/// Validates a caller-supplied threshold and narrows it to a byte.
pub fn validate_threshold(diff_threshold: i32) -> Result<u8> {
    u8::try_from(diff_threshold).map_err(|_| {
        DiffError::Validation(format!(
            "diff_threshold must be within 0..=255, got {diff_threshold}"
        ))
    })
}

/// Compares two equally shaped images and returns the magnitude map together with
/// its thresholded mask.
pub fn compute(
    top: &RawImage,
    bottom: &RawImage,
    diff_threshold: i32,
) -> Result<(MagnitudeMap, BinaryMask)> {
    let threshold = validate_threshold(diff_threshold)?;
    if top.shape() != bottom.shape() {
        return Err(DiffError::DimensionMismatch {
            top: top.shape(),
            bottom: bottom.shape(),
        });
    }

    let channels = top.channels() as usize;
    let values: Vec<u8> = top
        .data()
        .chunks_exact(channels)
        .zip(bottom.data().chunks_exact(channels))
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .map(|(&ca, &cb)| ca.abs_diff(cb))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let magnitude = MagnitudeMap::new(top.width(), top.height(), values)?;
    let mask = magnitude.threshold(threshold);
    log::debug!(
        "difference map {}x{}: peak {}, {} pixels at or above {threshold}",
        magnitude.width(),
        magnitude.height(),
        magnitude.max(),
        mask.count()
    );
    Ok((magnitude, mask))
}
