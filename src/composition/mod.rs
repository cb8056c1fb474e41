//! # Composition
//!
//! Layers and the compositor that paints them, plus the drivers built on
//! top: the per-item [`ShortsPipeline`], the concurrent [`BatchRunner`], the
//! [`Compiler`] that joins finished shorts and the [`Baker`] that turns a
//! clip and a matte video into green-screen footage.

pub mod bake;
pub mod batch;
pub mod compile;
pub mod compositor;
pub mod layer;
pub mod pipeline;

// Re-exports for convenience
pub use bake::Baker;
pub use batch::{discover_media, BatchPaths, BatchReport, BatchRunner, SkippedItem};
pub use compile::{CompilePlan, Compiler};
pub use compositor::{blend_over, Compositor};
pub use layer::{Align, Anchor, Layer, Position};
pub use pipeline::{output_name, ComposedShort, Job, ShortsPipeline};
