//! Rendering and painting core for a layered raster image editor.
//!
//! The crate produces the visible pixel output of a [`document::Document`] by
//! compositing per-layer buffers under alpha-aware blend modes, ingests
//! pointer-driven paint tools (brush, clone stamp, flood fill) into layer
//! surfaces, applies non-destructive geometric transforms and constrains
//! edits to polygon-based, boolean-combinable selections.
//!
//! Hosts drive the engine through [`controller::CanvasController`], which
//! owns the frame loop, the viewport and input dispatch. Per-layer tool
//! interaction lives in [`renderer::LayerRenderer`]. Pooled scratch buffers
//! (live preview, clone stamp, blend compositing) are owned by an explicitly
//! constructed [`context::RenderContext`] so that nothing in the engine is a
//! process-wide global.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod blending;
pub mod cache;
pub mod clipping;
pub mod cloning;
pub mod context;
pub mod controller;
pub mod document;
pub mod drawing;
pub mod fill;
pub mod history;
pub mod lowres;
pub mod renderer;
pub mod shapes;
pub mod surface;
pub mod transforming;

pub use blending::BlendMode;
pub use context::RenderContext;
pub use controller::CanvasController;
pub use document::{Document, Effects, Filters, Layer, LayerType};
pub use drawing::{Brush, BrushKind, BrushOptions};
pub use renderer::LayerRenderer;
pub use shapes::{Selection, Shape};
pub use surface::Surface;
