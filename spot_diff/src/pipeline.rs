// THEORY:
// The `pipeline` module is the top-level API for the engine. It wires the core
// modules into the full flow
//
//     bytes → decode → split → difference map → regions → (annotate, heatmap) → result
//
// and exposes it as plain functions over an explicit `DetectionConfig`. There is no
// engine object and no state carried between calls: every call owns its inputs and
// returns its output, so callers may run any number of detections concurrently
// without coordination (see `parallel_pipeline` for a ready-made worker pool).
//
// Parameters are validated before any pixel work begins, and metadata-only
// requests skip rendering entirely.

use crate::core_modules::annotator;
use crate::core_modules::codec;
use crate::core_modules::difference_mapper::{self, validate_threshold};
use crate::core_modules::heatmap::heatmap;
use crate::core_modules::region_extractor::region_extractor;
use crate::core_modules::result_assembler::{self, ImageSize, RenderedImages};
use crate::core_modules::splitter;
use serde::{Deserialize, Serialize};

// Re-export key data structures for the public API.
pub use crate::core_modules::annotator::{CompositeLayout, MarkerStyle};
pub use crate::core_modules::diff_region::DiffRegion;
pub use crate::core_modules::error::{DiffError, ErrorKind, Result};
pub use crate::core_modules::raw_image::RawImage;
pub use crate::core_modules::result_assembler::{DiffResult, OutputMode, RenderedImage};

pub const DEFAULT_MIN_AREA: i32 = 80;
pub const DEFAULT_DIFF_THRESHOLD: i32 = 35;

/// Everything one detection call needs besides the image itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smallest pixel count a connected difference must have to be reported.
    pub min_area: i32,
    /// Per-pixel magnitude (0-255) at or above which a pixel counts as changed.
    pub diff_threshold: i32,
    /// When set, differences whose width or height reaches this fraction of the
    /// image's are dropped as misalignment. Off by default.
    pub max_region_fraction: Option<f32>,
    pub output: OutputMode,
    pub layout: CompositeLayout,
    pub style: MarkerStyle,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            max_region_fraction: None,
            output: OutputMode::default(),
            layout: CompositeLayout::default(),
            style: MarkerStyle::default(),
        }
    }
}

impl DetectionConfig {
    /// A metadata-only config with the given thresholds.
    pub fn metadata_only(min_area: i32, diff_threshold: i32) -> Self {
        Self {
            min_area,
            diff_threshold,
            output: OutputMode::MetadataOnly,
            ..Self::default()
        }
    }

    /// Rejects out-of-range parameters.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.diff_threshold)?;
        region_extractor::validate_min_area(self.min_area)?;
        region_extractor::validate_max_region_fraction(self.max_region_fraction)?;
        if let OutputMode::Saved {
            filename_prefix, ..
        } = &self.output
        {
            if filename_prefix.is_empty() || filename_prefix.contains(['/', '\\']) {
                return Err(DiffError::Validation(format!(
                    "filename_prefix must be a non-empty file name, got {filename_prefix:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Runs the full detection over one composite screenshot.
pub fn detect(image_bytes: &[u8], config: &DetectionConfig) -> Result<DiffResult> {
    config.validate()?;
    let composite = codec::decode(image_bytes)?;
    let pair = splitter::split(&composite)?;
    let (top, bottom) = pair.comparable()?;
    detect_pair(&top, &bottom, config)
}

/// Runs detection over two already separated comparison images.
pub fn detect_pair(top: &RawImage, bottom: &RawImage, config: &DetectionConfig) -> Result<DiffResult> {
    config.validate()?;

    // Stage 1: per-pixel comparison
    let (magnitude, mask) = difference_mapper::compute(top, bottom, config.diff_threshold)?;

    // Stage 2: spatial grouping
    let regions = region_extractor::extract_bounded(&mask, config.min_area, config.max_region_fraction)?;

    // Stage 3: rendering, only when something will be delivered
    let rendered = if config.output.renders_images() {
        let marked = annotator::annotate(top, bottom, &regions, &config.style, config.layout)?;
        Some(RenderedImages {
            combined: marked.combined,
            heatmap: heatmap(&magnitude),
            image1_marked: marked.image1_marked,
            image2_marked: marked.image2_marked,
        })
    } else {
        None
    };

    // Stage 4: packaging
    let image_size = ImageSize {
        width: top.width(),
        height: top.height(),
    };
    let result = result_assembler::assemble(regions, image_size, rendered.as_ref(), &config.output)?;

    log::info!(
        "found {} differences in {}x{} comparison ({:?} output)",
        result.difference_count,
        image_size.width,
        image_size.height,
        config.output
    );
    Ok(result)
}
