pub mod annotator;
pub mod codec;
pub mod diff_region;
pub mod difference_mapper;
pub mod error;
pub mod glyphs;
pub mod heatmap;
pub mod raw_image;
pub mod region_extractor;
pub mod result_assembler;
pub mod splitter;
