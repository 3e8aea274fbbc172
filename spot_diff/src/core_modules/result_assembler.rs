// THEORY:
// The `ResultAssembler` packages one detection into the response a calling layer
// serializes. It owns the only side effect in the engine: in save mode it writes
// the rendered images to a caller-chosen directory.
//
// Key architectural principles:
// 1.  **Output mode decides delivery**: The same four rendered images are either
//     embedded as Base64 PNG, written to disk and referenced by path, or omitted
//     entirely (metadata only, in which case the pipeline never renders them).
// 2.  **No silent overwrite**: Output files are claimed with create-new semantics,
//     an atomic filesystem operation. If any file of the set already exists, the
//     whole set moves to the next counter suffix. Concurrent writers into the same
//     directory therefore never clobber each other and need no shared lock.
// 3.  **Encode before claiming**: All PNGs are encoded in memory first, so a codec
//     failure never leaves empty placeholder files behind.

use crate::core_modules::codec;
use crate::core_modules::diff_region::DiffRegion;
use crate::core_modules::error::{DiffError, Result};
use crate::core_modules::raw_image::RawImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

/// Suffixes for the saved files, in `RenderedImages` field order.
const SAVED_SLOTS: [&str; 4] = ["combined", "heatmap", "img1_marked", "img2_marked"];
/// Gives up on suffixing after this many occupied name sets.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

fn default_prefix() -> String {
    "result".to_string()
}

/// How rendered images are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputMode {
    /// Base64-encoded PNGs inside the result.
    #[default]
    Embedded,
    /// PNG files written under `output_dir`; the result carries their paths.
    Saved {
        output_dir: PathBuf,
        #[serde(default = "default_prefix")]
        filename_prefix: String,
    },
    /// Region metadata only. Nothing is rendered.
    MetadataOnly,
}

impl OutputMode {
    pub fn saved(output_dir: impl Into<PathBuf>, filename_prefix: impl Into<String>) -> Self {
        OutputMode::Saved {
            output_dir: output_dir.into(),
            filename_prefix: filename_prefix.into(),
        }
    }

    pub fn renders_images(&self) -> bool {
        !matches!(self, OutputMode::MetadataOnly)
    }
}

/// One delivered image: Base64 PNG data or a path on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RenderedImage {
    Base64(String),
    Path(PathBuf),
}

impl RenderedImage {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            RenderedImage::Path(path) => Some(path),
            RenderedImage::Base64(_) => None,
        }
    }

    pub fn as_base64(&self) -> Option<&str> {
        match self {
            RenderedImage::Base64(data) => Some(data),
            RenderedImage::Path(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// The images produced by the annotator and heatmap generator.
#[derive(Debug, Clone)]
pub struct RenderedImages {
    pub combined: RawImage,
    pub heatmap: RawImage,
    pub image1_marked: RawImage,
    pub image2_marked: RawImage,
}

/// The response for one detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub difference_count: usize,
    pub differences: Vec<DiffRegion>,
    pub image_size: ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_image: Option<RenderedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<RenderedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image1_marked: Option<RenderedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image2_marked: Option<RenderedImage>,
}

/// Builds the response, encoding or saving `rendered` as `output_mode` asks.
pub fn assemble(
    regions: Vec<DiffRegion>,
    image_size: ImageSize,
    rendered: Option<&RenderedImages>,
    output_mode: &OutputMode,
) -> Result<DiffResult> {
    let mut result = DiffResult {
        difference_count: regions.len(),
        differences: regions,
        image_size,
        marked_image: None,
        heatmap: None,
        image1_marked: None,
        image2_marked: None,
    };

    let Some(images) = rendered else {
        return Ok(result);
    };

    let delivered: Vec<RenderedImage> = match output_mode {
        OutputMode::MetadataOnly => return Ok(result),
        OutputMode::Embedded => [
            &images.combined,
            &images.heatmap,
            &images.image1_marked,
            &images.image2_marked,
        ]
        .into_iter()
        .map(|image| codec::encode_png_base64(image).map(RenderedImage::Base64))
        .collect::<Result<_>>()?,
        OutputMode::Saved {
            output_dir,
            filename_prefix,
        } => save_images(images, output_dir, filename_prefix)?
            .into_iter()
            .map(RenderedImage::Path)
            .collect(),
    };

    let mut delivered = delivered.into_iter();
    result.marked_image = delivered.next();
    result.heatmap = delivered.next();
    result.image1_marked = delivered.next();
    result.image2_marked = delivered.next();
    Ok(result)
}

/// The file names for one attempt: `{prefix}_{slot}.png`, then
/// `{prefix}_{n}_{slot}.png` for `n >= 1`.
pub fn candidate_paths(output_dir: &Path, prefix: &str, attempt: u32) -> Vec<PathBuf> {
    SAVED_SLOTS
        .iter()
        .map(|slot| {
            let name = if attempt == 0 {
                format!("{prefix}_{slot}.png")
            } else {
                format!("{prefix}_{attempt}_{slot}.png")
            };
            output_dir.join(name)
        })
        .collect()
}

/// Atomically claims a full set of unused file names.
fn claim_file_set(output_dir: &Path, prefix: &str) -> Result<Vec<(PathBuf, File)>> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let mut claimed: Vec<(PathBuf, File)> = Vec::with_capacity(SAVED_SLOTS.len());
        let mut collided = false;

        for path in candidate_paths(output_dir, prefix, attempt) {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => claimed.push((path, file)),
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    collided = true;
                    break;
                }
                Err(e) => {
                    release(claimed);
                    return Err(DiffError::io(path, e));
                }
            }
        }

        if !collided {
            if attempt > 0 {
                log::warn!(
                    "output names for prefix {prefix:?} in {} were taken, saving with suffix {attempt}",
                    output_dir.display()
                );
            }
            return Ok(claimed);
        }
        release(claimed);
    }

    Err(DiffError::io(
        output_dir,
        std::io::Error::new(
            IoErrorKind::AlreadyExists,
            format!("no free file names for prefix {prefix:?} after {MAX_NAME_ATTEMPTS} attempts"),
        ),
    ))
}

/// Removes files claimed during a failed attempt.
fn release(claimed: Vec<(PathBuf, File)>) {
    for (path, file) in claimed {
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            log::warn!("could not remove {}: {e}", path.display());
        }
    }
}

fn save_images(images: &RenderedImages, output_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let encoded = [
        codec::encode_png(&images.combined)?,
        codec::encode_png(&images.heatmap)?,
        codec::encode_png(&images.image1_marked)?,
        codec::encode_png(&images.image2_marked)?,
    ];

    fs::create_dir_all(output_dir).map_err(|e| DiffError::io(output_dir, e))?;
    let claimed = claim_file_set(output_dir, prefix)?;
    let paths: Vec<PathBuf> = claimed.iter().map(|(path, _)| path.clone()).collect();

    for ((path, mut file), bytes) in claimed.into_iter().zip(encoded.iter()) {
        if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            for written in &paths {
                let _ = fs::remove_file(written);
            }
            return Err(DiffError::io(path, e));
        }
    }

    log::debug!("saved {} images under {}", paths.len(), output_dir.display());
    Ok(paths)
}
