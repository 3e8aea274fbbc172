// Shared builders for composite screenshots.
#![allow(dead_code)]

use spot_diff::RawImage;
use spot_diff::core_modules::codec;

/// A solid RGB scene.
pub fn scene(width: u32, height: u32, value: u8) -> Vec<u8> {
    vec![value; (width * height * 3) as usize]
}

/// Fills a rectangle of an RGB scene with a gray value.
pub fn paint(scene: &mut [u8], scene_width: u32, x: u32, y: u32, w: u32, h: u32, value: u8) {
    for row in y..y + h {
        for col in x..x + w {
            let start = ((row * scene_width + col) * 3) as usize;
            scene[start..start + 3].copy_from_slice(&[value, value, value]);
        }
    }
}

pub fn raw(width: u32, height: u32, data: Vec<u8>) -> RawImage {
    RawImage::new(width, height, 3, data).unwrap()
}

/// Stacks two RGB scenes of equal width and encodes them as one PNG screenshot.
pub fn composite_png(width: u32, top: &[u8], bottom: &[u8]) -> Vec<u8> {
    let height = ((top.len() + bottom.len()) / (width as usize * 3)) as u32;
    let mut data = top.to_vec();
    data.extend_from_slice(bottom);
    codec::encode_png(&raw(width, height, data)).unwrap()
}

/// Two 100x100 black scenes; the bottom one has a `size`x`size` square of `value`
/// at (20, 20).
pub fn square_composite(size: u32, value: u8) -> Vec<u8> {
    let top = scene(100, 100, 0);
    let mut bottom = scene(100, 100, 0);
    paint(&mut bottom, 100, 20, 20, size, size, value);
    composite_png(100, &top, &bottom)
}
