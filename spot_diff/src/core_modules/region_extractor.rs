// THEORY:
// The `RegionExtractor` is the engine of the spatial grouping stage. It turns the
// binary difference mask into a short, ordered list of `DiffRegion`s, one per
// visual difference a player would circle.
//
// Algorithm steps:
// 1.  **Connected-component labeling**: Every unvisited `true` cell seeds a
//     flood fill over its 8 neighbors. The fill uses an explicit stack, so a
//     large contiguous difference cannot overflow the call stack.
// 2.  **Data aggregation**: Each component is reduced to its bounding box and its
//     pixel count. Components smaller than `min_area` are discarded here, before
//     any merging, so two sub-threshold specks never combine into a region.
// 3.  **Overlap merging**: The mask can split one visual difference into several
//     blobs (anti-aliasing gaps, thin outlines). Surviving boxes that intersect are
//     replaced by their union, repeatedly, until no two boxes intersect. Boxes that
//     only touch along an edge are left alone. Candidate pairs come from a coarse
//     bucket grid, so a speckled mask with many thousands of tiny components is
//     not compared pairwise.
// 3b. **Misalignment guard**: Optionally, a component spanning most of the image
//     width or height is dropped before merging. Such a box means the two halves
//     are shifted against each other, not that one region was edited.
// 4.  **Reading-order numbering**: Final boxes are sorted by the `(y, x)` of their
//     top-left corner and numbered from 1. The numbering therefore never depends on
//     the order the flood fill happened to visit components.
// 5.  **Stateless utility**: `extract` takes one mask and returns one list. It has
//     no memory of previous calls.

use crate::core_modules::difference_mapper::BinaryMask;
use crate::core_modules::diff_region::{BoundingBox, DiffRegion};
use crate::core_modules::error::{DiffError, Result};

pub mod region_extractor {
    use super::*;

    /// A labeled component before filtering and merging.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Component {
        pub bounds: BoundingBox,
        pub area: u64,
    }

    /// Validates a caller-supplied minimum area.
    pub fn validate_min_area(min_area: i32) -> Result<u64> {
        if min_area <= 0 {
            return Err(DiffError::Validation(format!(
                "min_area must be positive, got {min_area}"
            )));
        }
        Ok(min_area as u64)
    }

    /// Validates the optional oversized-region limit, a fraction of the image side.
    pub fn validate_max_region_fraction(max_region_fraction: Option<f32>) -> Result<()> {
        match max_region_fraction {
            Some(fraction) if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) => {
                Err(DiffError::Validation(format!(
                    "max_region_fraction must be within (0, 1], got {fraction}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Groups the mask into ordered, non-overlapping difference regions.
    pub fn extract(mask: &BinaryMask, min_area: i32) -> Result<Vec<DiffRegion>> {
        extract_bounded(mask, min_area, None)
    }

    /// Like `extract`, but also drops components whose width or height reaches
    /// `max_region_fraction` of the image's. A near full-frame box means the two
    /// halves are misaligned rather than edited.
    pub fn extract_bounded(
        mask: &BinaryMask,
        min_area: i32,
        max_region_fraction: Option<f32>,
    ) -> Result<Vec<DiffRegion>> {
        let min_area = validate_min_area(min_area)?;
        validate_max_region_fraction(max_region_fraction)?;

        let components = label_components(mask);
        let raw_count = components.len();
        let survivors: Vec<Component> = components
            .into_iter()
            .filter(|c| c.area >= min_area)
            .filter(|c| match max_region_fraction {
                Some(fraction) => !is_oversized(&c.bounds, mask.width(), mask.height(), fraction),
                None => true,
            })
            .collect();
        let survivor_count = survivors.len();

        let mut merged = merge_overlapping(survivors);
        merged.sort_by_key(|c| (c.bounds.y, c.bounds.x, c.bounds.height, c.bounds.width));

        log::debug!(
            "{raw_count} components, {survivor_count} kept by area and size, {} after merging",
            merged.len()
        );

        Ok(merged
            .into_iter()
            .enumerate()
            .map(|(i, c)| DiffRegion::new(i as u32 + 1, c.bounds, c.area))
            .collect())
    }

    fn is_oversized(bounds: &BoundingBox, width: u32, height: u32, fraction: f32) -> bool {
        bounds.width as f32 >= fraction * width as f32 || bounds.height as f32 >= fraction * height as f32
    }

    /// Labels the 8-connected components of `true` cells.
    pub fn label_components(mask: &BinaryMask) -> Vec<Component> {
        let width = mask.width() as usize;
        let height = mask.height() as usize;
        let bits = mask.bits();
        let mut visited = vec![false; bits.len()];
        let mut stack: Vec<usize> = Vec::new();
        let mut components = Vec::new();

        for seed in 0..bits.len() {
            if !bits[seed] || visited[seed] {
                continue;
            }

            visited[seed] = true;
            stack.push(seed);

            let mut min_x = usize::MAX;
            let mut min_y = usize::MAX;
            let mut max_x = 0;
            let mut max_y = 0;
            let mut area = 0u64;

            while let Some(current) = stack.pop() {
                let x = current % width;
                let y = current / width;
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                // Check all 8 neighbors.
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as isize + dx;
                        let ny = y as isize + dy;
                        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                            continue;
                        }
                        let neighbor = ny as usize * width + nx as usize;
                        if bits[neighbor] && !visited[neighbor] {
                            visited[neighbor] = true;
                            stack.push(neighbor);
                        }
                    }
                }
            }

            components.push(Component {
                bounds: BoundingBox::from_corners(
                    min_x as u32,
                    min_y as u32,
                    max_x as u32,
                    max_y as u32,
                ),
                area,
            });
        }

        components
    }

    /// Replaces intersecting boxes with their union until no two boxes intersect.
    pub fn merge_overlapping(mut components: Vec<Component>) -> Vec<Component> {
        let mut passes = 0;
        loop {
            passes += 1;
            let count = components.len();
            components = merge_pass(components);
            if components.len() == count {
                break;
            }
        }
        log::trace!("overlap merging settled after {passes} passes");
        components
    }

    /// Joins every group of transitively intersecting boxes once. Grown unions may
    /// intersect further boxes, so callers repeat until the count stops changing.
    fn merge_pass(components: Vec<Component>) -> Vec<Component> {
        if components.len() < 2 {
            return components;
        }

        let grid = BucketGrid::new(&components);
        let mut groups = DisjointSets::new(components.len());
        for (i, component) in components.iter().enumerate() {
            for cell in grid.cells_of(&component.bounds) {
                for &j in &grid.buckets[cell] {
                    if j <= i || groups.find(i) == groups.find(j) {
                        continue;
                    }
                    if component.bounds.overlaps(&components[j].bounds) {
                        groups.union(i, j);
                    }
                }
            }
        }

        let mut merged: Vec<Option<Component>> = vec![None; components.len()];
        for (i, component) in components.into_iter().enumerate() {
            let slot = &mut merged[groups.find(i)];
            *slot = Some(match slot.take() {
                Some(acc) => Component {
                    bounds: acc.bounds.union(&component.bounds),
                    area: acc.area + component.area,
                },
                None => component,
            });
        }
        merged.into_iter().flatten().collect()
    }

    /// Smallest bucket side in pixels.
    const MIN_BUCKET_SIDE: u32 = 4;

    /// A coarse grid over the boxes' extent. Each bucket lists the boxes covering
    /// it, so two boxes with a positive-area intersection always share a bucket.
    struct BucketGrid {
        side: u32,
        columns: usize,
        buckets: Vec<Vec<usize>>,
    }

    impl BucketGrid {
        fn new(components: &[Component]) -> Self {
            let count = components.len() as u64;
            let extent_x = components.iter().map(|c| c.bounds.right()).max().unwrap_or(0).max(1);
            let extent_y = components.iter().map(|c| c.bounds.bottom()).max().unwrap_or(0).max(1);

            // Buckets about as large as a typical box, but never more than ~4 per box.
            let mean_side = components
                .iter()
                .map(|c| c.bounds.width.max(c.bounds.height) as u64)
                .sum::<u64>()
                / count;
            let sparse_side = ((extent_x as u64 * extent_y as u64) / (4 * count)).isqrt();
            let side = (mean_side.max(sparse_side) as u32).max(MIN_BUCKET_SIDE);

            let columns = extent_x.div_ceil(side) as usize;
            let rows = extent_y.div_ceil(side) as usize;
            let mut grid = Self {
                side,
                columns,
                buckets: vec![Vec::new(); columns * rows],
            };
            for (i, component) in components.iter().enumerate() {
                for cell in grid.cells_of(&component.bounds) {
                    grid.buckets[cell].push(i);
                }
            }
            grid
        }

        fn cells_of(&self, bounds: &BoundingBox) -> impl Iterator<Item = usize> + use<> {
            // Empty boxes intersect nothing.
            let (first_col, last_col, first_row, last_row) = if bounds.width == 0 || bounds.height == 0 {
                (1, 0, 1, 0)
            } else {
                (
                    bounds.x / self.side,
                    (bounds.right() - 1) / self.side,
                    bounds.y / self.side,
                    (bounds.bottom() - 1) / self.side,
                )
            };
            let columns = self.columns;
            (first_row..=last_row).flat_map(move |row| {
                (first_col..=last_col).map(move |col| row as usize * columns + col as usize)
            })
        }
    }

    /// Union-find over box indices.
    struct DisjointSets {
        parent: Vec<usize>,
    }

    impl DisjointSets {
        fn new(size: usize) -> Self {
            Self {
                parent: (0..size).collect(),
            }
        }

        fn find(&mut self, mut node: usize) -> usize {
            while self.parent[node] != node {
                self.parent[node] = self.parent[self.parent[node]];
                node = self.parent[node];
            }
            node
        }

        fn union(&mut self, a: usize, b: usize) {
            let (a, b) = (self.find(a), self.find(b));
            if a != b {
                self.parent[b] = a;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::region_extractor::*;
    use super::*;

    /// Builds a mask from rows of '#' (set) and '.' (clear).
    fn mask(rows: &[&str]) -> BinaryMask {
        let width = rows[0].len() as u32;
        let bits = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();
        BinaryMask::new(width, rows.len() as u32, bits).unwrap()
    }

    fn blank(width: u32, height: u32) -> Vec<bool> {
        vec![false; (width * height) as usize]
    }

    fn fill(bits: &mut [bool], width: u32, rect: BoundingBox) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                bits[(y * width + x) as usize] = true;
            }
        }
    }

    fn bbox(x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn empty_mask_yields_no_regions() {
        let m = BinaryMask::new(16, 16, blank(16, 16)).unwrap();
        assert!(extract(&m, 1).unwrap().is_empty());
    }

    #[test]
    fn non_positive_min_area_is_rejected() {
        let m = mask(&["#"]);
        assert!(matches!(extract(&m, 0), Err(DiffError::Validation(_))));
        assert!(matches!(extract(&m, -5), Err(DiffError::Validation(_))));
    }

    #[test]
    fn diagonal_neighbors_are_connected() {
        let m = mask(&["#...", ".#..", "..#.", "...#"]);
        let components = label_components(&m);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].area, 4);
        assert_eq!(components[0].bounds, bbox(0, 0, 4, 4));
    }

    #[test]
    fn area_counts_pixels_not_box() {
        let m = mask(&["#...", "....", "...#", "..##"]);
        let components = label_components(&m);
        assert_eq!(components.len(), 2);
        let areas: Vec<u64> = components.iter().map(|c| c.area).collect();
        assert_eq!(areas, vec![1, 3]);
    }

    #[test]
    fn small_components_are_filtered() {
        let m = mask(&["##....", "##....", "......", ".....#"]);
        let regions = extract(&m, 2).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 4);
    }

    #[test]
    fn regions_touching_the_border_are_kept() {
        let m = mask(&["##", "##"]);
        let regions = extract(&m, 4).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounding_box(), bbox(0, 0, 2, 2));
    }

    #[test]
    fn overlapping_boxes_of_disconnected_blobs_merge() {
        // A hollow ring with a separate dot inside: two components whose boxes overlap.
        let m = mask(&[
            "#######", //
            "#.....#", //
            "#..#..#", //
            "#.....#", //
            "#######",
        ]);
        assert_eq!(label_components(&m).len(), 2);
        let regions = extract(&m, 1).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounding_box(), bbox(0, 0, 7, 5));
        assert_eq!(regions[0].area, 21);
    }

    #[test]
    fn merging_cascades_to_a_fixed_point() {
        // The first box only intersects the union of the other two.
        let merged = merge_overlapping(vec![
            Component { bounds: bbox(0, 0, 3, 3), area: 1 },
            Component { bounds: bbox(5, 0, 1, 6), area: 1 },
            Component { bounds: bbox(1, 5, 5, 1), area: 1 },
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].bounds, bbox(0, 0, 6, 6));
        assert_eq!(merged[0].area, 3);

        let chained = merge_overlapping(vec![
            Component { bounds: bbox(0, 0, 3, 3), area: 1 },
            Component { bounds: bbox(20, 0, 3, 3), area: 1 },
            Component { bounds: bbox(10, 0, 3, 3), area: 1 },
            Component { bounds: bbox(2, 2, 10, 1), area: 1 },
            Component { bounds: bbox(12, 0, 9, 1), area: 1 },
        ]);
        assert_eq!(chained.len(), 1);
        assert_eq!(chained[0].bounds, bbox(0, 0, 23, 3));
    }

    #[test]
    fn separated_blobs_stay_separate() {
        let (w, h) = (40, 20);
        let mut bits = blank(w, h);
        fill(&mut bits, w, bbox(2, 2, 10, 10));
        fill(&mut bits, w, bbox(13, 2, 10, 10));
        let m = BinaryMask::new(w, h, bits).unwrap();
        let regions = extract(&m, 80).unwrap();
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn sub_threshold_neighbors_do_not_combine() {
        // Two 5x10 blobs (area 50 each) one column apart: not connected, boxes disjoint.
        let (w, h) = (30, 20);
        let mut bits = blank(w, h);
        fill(&mut bits, w, bbox(5, 5, 5, 10));
        fill(&mut bits, w, bbox(11, 5, 5, 10));
        let m = BinaryMask::new(w, h, bits).unwrap();
        assert_eq!(label_components(&m).len(), 2);
        assert!(extract(&m, 80).unwrap().is_empty());
    }

    #[test]
    fn indices_follow_reading_order() {
        let (w, h) = (30, 30);
        let mut bits = blank(w, h);
        fill(&mut bits, w, bbox(20, 20, 3, 3));
        fill(&mut bits, w, bbox(20, 2, 3, 3));
        fill(&mut bits, w, bbox(2, 2, 3, 3));
        fill(&mut bits, w, bbox(2, 10, 3, 3));
        let m = BinaryMask::new(w, h, bits).unwrap();
        let regions = extract(&m, 1).unwrap();
        let corners: Vec<(u32, u32, u32)> = regions.iter().map(|r| (r.index, r.x, r.y)).collect();
        assert_eq!(corners, vec![(1, 2, 2), (2, 20, 2), (3, 2, 10), (4, 20, 20)]);
    }

    #[test]
    fn large_regions_do_not_exhaust_the_stack() {
        let (w, h) = (1000, 1000);
        let m = BinaryMask::new(w, h, vec![true; (w * h) as usize]).unwrap();
        let regions = extract(&m, 1).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 1_000_000);
    }

    #[test]
    fn boxes_sharing_an_edge_stay_separate() {
        // Left blob owns columns 0-4, right blob columns 5-9. They only meet where
        // column 4 (rows 0-1) and column 5 (rows 8-9) are set, which are far apart.
        let (w, h) = (10, 10);
        let mut bits = blank(w, h);
        fill(&mut bits, w, bbox(0, 0, 4, 10));
        fill(&mut bits, w, bbox(4, 0, 1, 2));
        fill(&mut bits, w, bbox(6, 0, 4, 10));
        fill(&mut bits, w, bbox(5, 8, 1, 2));
        let m = BinaryMask::new(w, h, bits).unwrap();

        let regions = extract(&m, 1).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bounding_box(), bbox(0, 0, 5, 10));
        assert_eq!(regions[1].bounding_box(), bbox(5, 0, 5, 10));
        assert_eq!(regions[0].area, 42);
    }

    #[test]
    fn oversized_components_are_dropped_when_limited() {
        let (w, h) = (20, 20);
        let mut bits = blank(w, h);
        // 16 = 0.8 * 20 wide: at the limit, so dropped.
        fill(&mut bits, w, bbox(2, 2, 16, 2));
        fill(&mut bits, w, bbox(4, 10, 3, 3));
        // 15 tall: under the limit.
        fill(&mut bits, w, bbox(17, 5, 1, 15));
        let m = BinaryMask::new(w, h, bits).unwrap();

        assert_eq!(extract(&m, 1).unwrap().len(), 3);
        let limited = extract_bounded(&m, 1, Some(0.8)).unwrap();
        let corners: Vec<(u32, u32)> = limited.iter().map(|r| (r.x, r.y)).collect();
        assert_eq!(corners, vec![(17, 5), (4, 10)]);
        assert_eq!(limited[0].index, 1);
    }

    #[test]
    fn invalid_region_fraction_is_rejected() {
        let m = mask(&["#"]);
        for fraction in [0.0, 1.01, f32::NAN] {
            assert!(matches!(
                extract_bounded(&m, 1, Some(fraction)),
                Err(DiffError::Validation(_))
            ));
        }
        assert_eq!(extract_bounded(&m, 1, Some(1.0)).unwrap().len(), 0);
    }

    #[test]
    fn speckle_noise_is_handled_quickly() {
        // One isolated pixel every third row and column: 144,000 components.
        let (w, h) = (1080u32, 1200u32);
        let bits: Vec<bool> = (0..w * h)
            .map(|i| (i % w) % 3 == 0 && (i / w) % 3 == 0)
            .collect();
        let m = BinaryMask::new(w, h, bits).unwrap();

        let started = std::time::Instant::now();
        let regions = extract(&m, 1).unwrap();
        assert_eq!(regions.len(), 144_000);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert_eq!(regions.last().map(|r| (r.x, r.y)), Some((1077, 1197)));
    }

    /// Pairwise fixed-point merge, for cross-checking the bucketed one.
    fn merge_pairwise(mut components: Vec<Component>) -> Vec<Component> {
        loop {
            let mut changed = false;
            let mut i = 0;
            while i < components.len() {
                let mut j = i + 1;
                while j < components.len() {
                    if components[i].bounds.overlaps(&components[j].bounds) {
                        let absorbed = components.swap_remove(j);
                        components[i].bounds = components[i].bounds.union(&absorbed.bounds);
                        components[i].area += absorbed.area;
                        changed = true;
                    } else {
                        j += 1;
                    }
                }
                i += 1;
            }
            if !changed {
                return components;
            }
        }
    }

    #[test]
    fn bucketed_merge_agrees_with_pairwise_merge() {
        let mut seed = 0x2545_f491_u64;
        let mut next = move |bound: u32| {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            ((seed >> 33) % bound as u64) as u32
        };
        for round in 0..20 {
            let count = 20 + round * 15;
            let components: Vec<Component> = (0..count)
                .map(|_| {
                    let (width, height) = (1 + next(30), 1 + next(30));
                    Component {
                        bounds: bbox(next(300), next(300), width, height),
                        area: 1,
                    }
                })
                .collect();

            let key = |c: &Component| (c.bounds.y, c.bounds.x, c.bounds.height, c.bounds.width, c.area);
            let mut expected = merge_pairwise(components.clone());
            let mut actual = merge_overlapping(components);
            expected.sort_by_key(key);
            actual.sort_by_key(key);
            assert_eq!(actual, expected);
        }
    }
}
