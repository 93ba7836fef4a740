//! Shared engine resources.
//!
//! All pooled scratch buffers live here, constructed explicitly by the host
//! and passed by reference into the engine. One stroke or clone session is
//! in flight at a time, so a single instance of each pool suffices.

use crate::blending::BlendScratch;
use crate::cloning::CloneScratch;
use crate::lowres::PreviewPool;

#[derive(Default)]
pub struct RenderContext {
    /// Low-res preview surface for in-progress strokes.
    pub preview: PreviewPool,
    /// Brush-diameter scratch for the clone stamp.
    pub clone_scratch: CloneScratch,
    /// Full-canvas scratch for blend-mode compositing.
    pub blend_scratch: BlendScratch,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }
}
