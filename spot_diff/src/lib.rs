// THEORY:
// This file is the main entry point for the `spot_diff` library crate. The
// primary goal is to export `pipeline::detect` and its associated data structures
// (`DetectionConfig`, `DiffResult`, `DiffRegion`, ...) as the clean, high-level
// interface to the engine, plus `parallel_pipeline::WorkerPool` for callers that
// run many detections at once. The individual stages in `core_modules` stay public
// so they can be driven and tested one at a time.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use pipeline::{
    CompositeLayout, DetectionConfig, DiffError, DiffRegion, DiffResult, ErrorKind, MarkerStyle,
    OutputMode, RawImage, RenderedImage, Result, detect, detect_pair,
};
