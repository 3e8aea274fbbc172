// THEORY:
// The `Annotator` is the visualization layer. It takes the two comparison images
// and the final region list and produces what a player looks at: each difference
// circled and numbered on both scenes, plus one combined picture of the pair.
//
// Key architectural principles:
// 1.  **Shared geometry**: Both scenes live in the same coordinate space, so every
//     region gets the same circle (center at the box center, radius
//     `max(width, height) / 2 + margin`) and the same label position on both
//     copies. Only the marker color may differ between the two.
// 2.  **Copies, not mutation**: The inputs are borrowed; all drawing happens on
//     fresh RGB buffers.
// 3.  **Layout is configuration**: The combined image keeps the composite's
//     original top/bottom arrangement by default, or places the scenes side by side.

use crate::core_modules::diff_region::{BoundingBox, DiffRegion};
use crate::core_modules::error::{DiffError, Result};
use crate::core_modules::glyphs;
use crate::core_modules::raw_image::RawImage;
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::draw_hollow_circle_mut;
use serde::{Deserialize, Serialize};

const LABEL_SCALE: u32 = 3;
/// Gap between the circle and its number.
const LABEL_GAP: u32 = 6;

/// How the two marked scenes are arranged in the combined image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeLayout {
    /// Top scene above the bottom scene, as in the source screenshot.
    #[default]
    Stacked,
    /// Top scene on the left, bottom scene on the right.
    SideBySide,
}

/// Marker appearance. Geometry is shared by both scenes; colors are per scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    /// RGB color of the markers on the top scene.
    pub top_color: [u8; 3],
    /// RGB color of the markers on the bottom scene.
    pub bottom_color: [u8; 3],
    /// Ring thickness in pixels.
    pub thickness: u32,
    /// Added to half the longer box side to get the circle radius.
    pub margin: u32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            top_color: [255, 0, 0],
            bottom_color: [0, 255, 0],
            thickness: 3,
            margin: 15,
        }
    }
}

/// Where a region's marker goes. Identical for both scenes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub center: (i32, i32),
    pub radius: i32,
    pub label: String,
    /// Top-left corner of the label text.
    pub label_origin: (i32, i32),
}

/// The rendered outputs of one annotation pass.
#[derive(Debug, Clone)]
pub struct AnnotatedImages {
    pub image1_marked: RawImage,
    pub image2_marked: RawImage,
    pub combined: RawImage,
}

/// Computes the marker for `region` on an image of the given size.
pub fn marker_for(region: &DiffRegion, image_width: u32, image_height: u32, margin: u32) -> Marker {
    let bounds: BoundingBox = region.bounding_box();
    let (cx, cy) = bounds.center();
    let radius = (bounds.width.max(bounds.height) / 2 + margin) as i32;
    let label = region.index.to_string();
    let (text_w, text_h) = glyphs::text_size(&label, LABEL_SCALE);
    let (cx, cy) = (cx as i32, cy as i32);

    let max_x = (image_width as i32 - text_w as i32).max(0);
    let max_y = (image_height as i32 - text_h as i32).max(0);
    let label_x = (cx - text_w as i32 / 2).clamp(0, max_x);
    // Prefer above the circle; fall back to below when that leaves the image.
    let above = cy - radius - LABEL_GAP as i32 - text_h as i32;
    let label_y = if above >= 0 {
        above
    } else {
        (cy + radius + LABEL_GAP as i32).min(max_y)
    };

    Marker {
        center: (cx, cy),
        radius,
        label,
        label_origin: (label_x, label_y.clamp(0, max_y)),
    }
}

fn draw_markers(image: &RawImage, markers: &[Marker], color: [u8; 3], thickness: u32) -> RgbImage {
    let mut canvas = image.to_rgb_image();
    let color = Rgb(color);
    let thickness = thickness.max(1) as i32;
    for marker in markers {
        for ring in 0..thickness {
            let radius = marker.radius + ring - thickness / 2;
            if radius > 0 {
                draw_hollow_circle_mut(&mut canvas, marker.center, radius, color);
            }
        }
        let (x, y) = marker.label_origin;
        glyphs::draw_text_mut(&mut canvas, &marker.label, x, y, LABEL_SCALE, color);
    }
    canvas
}

/// Places the two scenes into one image.
pub fn compose(top: &RgbImage, bottom: &RgbImage, layout: CompositeLayout) -> RgbImage {
    let (tw, th) = top.dimensions();
    let (bw, bh) = bottom.dimensions();
    let (mut canvas, offset) = match layout {
        CompositeLayout::Stacked => (RgbImage::new(tw.max(bw), th + bh), (0, th as i64)),
        CompositeLayout::SideBySide => (RgbImage::new(tw + bw, th.max(bh)), (tw as i64, 0)),
    };
    imageops::replace(&mut canvas, top, 0, 0);
    imageops::replace(&mut canvas, bottom, offset.0, offset.1);
    canvas
}

/// Draws every region onto copies of both scenes and builds the combined image.
pub fn annotate(
    top: &RawImage,
    bottom: &RawImage,
    regions: &[DiffRegion],
    style: &MarkerStyle,
    layout: CompositeLayout,
) -> Result<AnnotatedImages> {
    if top.width() != bottom.width() || top.height() != bottom.height() {
        return Err(DiffError::DimensionMismatch {
            top: top.shape(),
            bottom: bottom.shape(),
        });
    }

    let markers: Vec<Marker> = regions
        .iter()
        .map(|r| marker_for(r, top.width(), top.height(), style.margin))
        .collect();

    let marked_top = draw_markers(top, &markers, style.top_color, style.thickness);
    let marked_bottom = draw_markers(bottom, &markers, style.bottom_color, style.thickness);
    let combined = compose(&marked_top, &marked_bottom, layout);

    Ok(AnnotatedImages {
        image1_marked: marked_top.into(),
        image2_marked: marked_bottom.into(),
        combined: combined.into(),
    })
}
