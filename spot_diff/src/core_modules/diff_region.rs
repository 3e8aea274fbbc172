// THEORY:
// A `DiffRegion` is the engine's unit of output: one visual difference between the
// two scenes, summarized as a bounding box in comparison-image coordinates plus the
// number of differing pixels that produced it. Like the other data containers it
// is "dumb"; the region extractor creates it and nothing mutates it afterwards.
//
// `BoundingBox` carries the geometry used while regions are still being merged.
// Boxes are half-open (`[x, x + width)`), so two boxes that merely share an edge
// do not intersect.

use serde::{Deserialize, Serialize};

/// An axis-aligned, half-open pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// The box spanning the inclusive pixel corners `(min_x, min_y)` and `(max_x, max_y)`.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True when the two boxes share at least one pixel.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// The smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Integer center, rounded toward the top-left.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// One detected difference, numbered in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffRegion {
    /// 1-based position in top-to-bottom, left-to-right order.
    pub index: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of differing pixels, not the bounding-box area.
    pub area: u64,
}

impl DiffRegion {
    pub fn new(index: u32, bounds: BoundingBox, area: u64) -> Self {
        Self {
            index,
            x: bounds.x,
            y: bounds.y,
            width: bounds.width,
            height: bounds.height,
            area,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn from_corners_is_inclusive() {
        assert_eq!(BoundingBox::from_corners(2, 3, 2, 3), bbox(2, 3, 1, 1));
        assert_eq!(BoundingBox::from_corners(0, 0, 9, 4), bbox(0, 0, 10, 5));
    }

    #[test]
    fn shared_edges_do_not_overlap() {
        let left = bbox(0, 0, 5, 5);
        assert!(!left.overlaps(&bbox(5, 0, 5, 5)));
        assert!(!left.overlaps(&bbox(0, 5, 5, 5)));
        assert!(!left.overlaps(&bbox(5, 5, 5, 5)));
        assert!(left.overlaps(&bbox(4, 4, 5, 5)));
    }

    #[test]
    fn containment_counts_as_overlap() {
        let outer = bbox(0, 0, 20, 20);
        let inner = bbox(5, 5, 2, 2);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
        assert_eq!(outer.union(&inner), outer);
    }

    #[test]
    fn union_spans_both_boxes() {
        assert_eq!(bbox(0, 0, 4, 4).union(&bbox(2, 3, 6, 2)), bbox(0, 0, 8, 5));
    }

    #[test]
    fn center_of_square() {
        assert_eq!(bbox(20, 20, 10, 10).center(), (25, 25));
    }
}
