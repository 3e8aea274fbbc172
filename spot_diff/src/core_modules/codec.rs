// THEORY:
// The codec is the engine's bridge to compressed image formats. Decoding accepts
// anything the `image` crate can sniff and always produces 8-bit RGB, since the
// comparison is color-only. Encoding always produces PNG: it is lossless, so the
// marker colors and heatmap palette survive exactly.

use crate::core_modules::error::{DiffError, Result};
use crate::core_modules::raw_image::RawImage;
use base64::{Engine as _, engine::general_purpose};
use image::ImageEncoder;
use image::codecs::png::PngEncoder;

/// Decodes compressed image bytes into an RGB `RawImage`.
pub fn decode(bytes: &[u8]) -> Result<RawImage> {
    if bytes.is_empty() {
        return Err(DiffError::Decode("input is empty".to_string()));
    }
    let format = image::guess_format(bytes)
        .map_err(|e| DiffError::Decode(format!("unrecognized image format: {e}")))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DiffError::Decode(format!("{format:?} decode failed: {e}")))?;
    log::debug!(
        "decoded {format:?} image {}x{}",
        decoded.width(),
        decoded.height()
    );
    Ok(RawImage::from(decoded.to_rgb8()))
}

/// Encodes an image as PNG.
pub fn encode_png(image: &RawImage) -> Result<Vec<u8>> {
    let color = match image.channels() {
        1 => image::ExtendedColorType::L8,
        2 => image::ExtendedColorType::La8,
        3 => image::ExtendedColorType::Rgb8,
        _ => image::ExtendedColorType::Rgba8,
    };
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.data(), image.width(), image.height(), color)
        .map_err(|e| DiffError::Encode(e.to_string()))?;
    Ok(out)
}

/// Encodes an image as PNG and wraps it in standard Base64.
pub fn encode_png_base64(image: &RawImage) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(encode_png(image)?))
}
