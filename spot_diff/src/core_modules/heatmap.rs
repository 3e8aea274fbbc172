// THEORY:
// The heatmap shows *where and how strongly* the scenes differ before any
// thresholding, which makes it the best tool for tuning `diff_threshold` by eye.
//
// Each magnitude is normalized against the map's own peak, so a pair of images with
// only faint differences still spans the full gradient. The normalized level then
// indexes a 256-entry JET-style palette (dark blue → cyan → yellow → dark red). The
// palette is built once behind a `OnceLock`; the per-pixel hot path is a multiply,
// a divide and a table lookup.
//
// Identical images produce a map of zeros, which renders as a uniform cool image.

use crate::core_modules::difference_mapper::MagnitudeMap;
use crate::core_modules::raw_image::RawImage;
use std::sync::OnceLock;

static JET_PALETTE: OnceLock<[[u8; 3]; 256]> = OnceLock::new();

fn jet_channel(level: f32, center: f32) -> u8 {
    let value = (1.5 - (4.0 * level - center).abs()).clamp(0.0, 1.0);
    (value * 255.0).round() as u8
}

/// The color for a normalized level in `0..=255`.
pub fn palette_color(level: u8) -> [u8; 3] {
    let palette = JET_PALETTE.get_or_init(|| {
        let mut table = [[0u8; 3]; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let level = i as f32 / 255.0;
            *entry = [
                jet_channel(level, 3.0),
                jet_channel(level, 2.0),
                jet_channel(level, 1.0),
            ];
        }
        table
    });
    palette[level as usize]
}

/// Renders a magnitude map as an RGB heatmap of the same size.
pub fn heatmap(magnitude: &MagnitudeMap) -> RawImage {
    let peak = magnitude.max() as u32;
    let mut data = Vec::with_capacity(magnitude.values().len() * 3);
    for &value in magnitude.values() {
        let level = if peak == 0 {
            0
        } else {
            ((value as u32 * 255 + peak / 2) / peak) as u8
        };
        data.extend_from_slice(&palette_color(level));
    }
    RawImage::from(
        image::RgbImage::from_raw(magnitude.width(), magnitude.height(), data)
            .unwrap_or_else(|| image::RgbImage::new(magnitude.width(), magnitude.height())),
    )
}
