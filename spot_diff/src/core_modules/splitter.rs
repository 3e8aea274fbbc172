// THEORY:
// A "find the difference" screenshot stacks two near-identical scenes vertically.
// The `Splitter` turns that one composite into the two images we compare by
// cutting it along a single horizontal seam. No scaling or alignment happens here;
// the composite convention is what guarantees the halves are co-registered.
//
// The seam sits at `ceil(height / 2)`, so an odd-height composite gives its extra
// row to the top half. The halves therefore differ by at most one row, which the
// pipeline absorbs with `SplitPair::comparable` before differencing.

use crate::core_modules::error::{DiffError, Result};
use crate::core_modules::raw_image::RawImage;

/// The two halves of a composite image.
#[derive(Debug, Clone)]
pub struct SplitPair {
    pub top: RawImage,
    pub bottom: RawImage,
    /// First row of `bottom` in the composite's coordinates.
    pub seam_row: u32,
}

impl SplitPair {
    /// Trims the top half's extra row, if any, so both halves share a shape.
    pub fn comparable(self) -> Result<(RawImage, RawImage)> {
        let SplitPair { top, bottom, .. } = self;
        if top.height() == bottom.height() + 1 {
            let trimmed = top.rows(0, bottom.height())?;
            return Ok((trimmed, bottom));
        }
        Ok((top, bottom))
    }
}

/// Splits `image` at its seam row into a top and a bottom half.
pub fn split(image: &RawImage) -> Result<SplitPair> {
    let height = image.height();
    if height < 2 {
        return Err(DiffError::Shape { height });
    }

    let seam_row = height.div_ceil(2);
    let top = image.rows(0, seam_row)?;
    let bottom = image.rows(seam_row, height)?;
    log::debug!(
        "split {}x{} composite at row {seam_row} into {}-row and {}-row halves",
        image.width(),
        height,
        top.height(),
        bottom.height()
    );

    Ok(SplitPair {
        top,
        bottom,
        seam_row,
    })
}
