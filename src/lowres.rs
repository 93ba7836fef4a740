//! Low resolution preview rendering.
//!
//! While a pointer is down, brush and clone work is rendered into a pooled
//! preview surface sized to the on-screen viewport instead of the full
//! resolution layer source. An [`OverrideConfig`] remaps document-space
//! pointers into that preview's coordinate space. The true-resolution
//! surface receives the stroke exactly once, on pointer release.

use egui::{Pos2, Rect};

use crate::drawing::Brush;
use crate::surface::{CompositeOp, Surface};

/// Remap parameters for rendering into the low-res preview surface.
#[derive(Clone, Debug)]
pub struct OverrideConfig {
    /// Document scale: preview pixels per document pixel.
    pub scale: f32,
    /// Host zoom factor, used to scale brush radii for the preview.
    pub zoom: f32,
    /// Viewport offset in preview space, subtracted after scaling.
    pub vp_x: f32,
    pub vp_y: f32,
    /// Pointer tail to render this step, already in document space.
    pub pointers: Vec<Pos2>,
}

pub fn create_override_config(
    document_scale: f32,
    zoom: f32,
    viewport: Rect,
    pointers: Vec<Pos2>,
) -> OverrideConfig {
    OverrideConfig {
        scale: document_scale,
        zoom,
        vp_x: viewport.min.x,
        vp_y: viewport.min.y,
        pointers,
    }
}

/// Map a document-space point into preview space: offset to the drawing
/// origin, scale, then subtract the viewport pan.
pub fn apply_override_config(cfg: &OverrideConfig, offset_x: f32, offset_y: f32, p: Pos2) -> Pos2 {
    egui::pos2(
        ((p.x - offset_x) * cfg.scale) - cfg.vp_x,
        ((p.y - offset_y) * cfg.scale) - cfg.vp_y,
    )
}

/// Pointer tail for stepped live rendering: while the brush is down only the
/// most recent segment needs re-rendering, the rest is already on the
/// preview surface.
pub fn slice_pointers(brush: &Brush) -> Vec<Pos2> {
    let pointers = &brush.pointers;
    if brush.down && pointers.len() > 2 {
        pointers[pointers.len() - 3..].to_vec()
    } else {
        pointers.clone()
    }
}

/// Single pooled preview surface. Acquired for the duration of a stroke,
/// deflated to a 1x1 allocation on release.
pub struct PreviewPool {
    surface: Surface,
    active: bool,
}

impl Default for PreviewPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewPool {
    pub fn new() -> Self {
        Self {
            surface: Surface::new(1, 1),
            active: false,
        }
    }

    /// Size the pooled surface for a new stroke and hand it out. Contents
    /// are cleared.
    pub fn acquire(&mut self, width: u32, height: u32) -> &mut Surface {
        self.surface.set_dimensions(width, height);
        self.active = true;
        &mut self.surface
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.active.then_some(&self.surface)
    }

    pub fn surface_mut(&mut self) -> Option<&mut Surface> {
        self.active.then_some(&mut self.surface)
    }

    /// Return the surface to the pool, deflating the allocation.
    pub fn release(&mut self) {
        self.surface.set_dimensions(1, 1);
        self.active = false;
    }
}

/// Project the pooled preview onto a destination at the inverse document
/// scale and the given offset, so preview pixels land where the committed
/// stroke will. The compositor calls this every frame while a stroke is in
/// flight; `DestinationOut` presents an eraser stroke.
pub fn render_preview(
    dest: &mut Surface,
    pool: &PreviewPool,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    alpha: f32,
    op: CompositeOp,
) {
    let Some(preview) = pool.surface() else {
        return;
    };
    let inv = 1.0 / scale.max(f32::EPSILON);
    dest.draw_surface_scaled(
        preview,
        offset_x,
        offset_y,
        preview.width() as f32 * inv,
        preview.height() as f32 * inv,
        alpha,
        op,
    );
}
