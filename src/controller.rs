//! Canvas controller: the frame loop, the viewport and input dispatch.
//!
//! The host calls [`CanvasController::update`] from its frame callback; the
//! controller gates rendering to its frame interval, ticks every layer
//! renderer and composites the document bottom-up into the output surface.
//! Pointer events are dispatched to the topmost renderer under the pointer;
//! multitouch ids stay mapped to the renderer that claimed them on press
//! until any non-move event releases the mapping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use egui::{Pos2, Rect, Vec2};
use uuid::Uuid;

use crate::blending::{blend_layer, BlendMode};
use crate::cache::RenderCache;
use crate::context::RenderContext;
use crate::document::{Document, Layer, TextRasterizer};
use crate::history::HistorySink;
use crate::lowres::render_preview;
use crate::renderer::{LayerRenderer, PaintTool, ToolMode};
use crate::surface::{CompositeOp, Surface};
use crate::transforming::{apply_transformation, LayerTransform};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct CanvasController {
    viewport: Rect,
    zoom_factor: f32,
    document_scale: f32,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    /// While locked, compositing is skipped and the previous output is
    /// retained (an external render job owns the frame).
    locked: bool,
    /// Defer post-stroke history snapshots via the debounce instead of
    /// storing them on release.
    low_memory: bool,
    renderers: Vec<LayerRenderer>,
    /// Touch id to the layer whose renderer claimed it on press.
    touch_map: HashMap<u64, Uuid>,
    cache: RenderCache,
    context: RenderContext,
    output: Surface,
    text_rasterizer: Option<Box<dyn TextRasterizer>>,
}

impl CanvasController {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: Rect::from_min_size(
                egui::pos2(0.0, 0.0),
                egui::vec2(width as f32, height as f32),
            ),
            zoom_factor: 1.0,
            document_scale: 1.0,
            frame_interval: FRAME_INTERVAL,
            last_frame: None,
            locked: false,
            low_memory: false,
            renderers: Vec::new(),
            touch_map: HashMap::new(),
            cache: RenderCache::new(),
            context: RenderContext::new(),
            output: Surface::new(width, height),
            text_rasterizer: None,
        }
    }

    pub fn set_text_rasterizer(&mut self, rasterizer: Box<dyn TextRasterizer>) {
        self.text_rasterizer = Some(rasterizer);
    }

    // ------------------------------------------------------------------
    // viewport
    // ------------------------------------------------------------------

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.viewport = self.viewport.translate(delta);
    }

    pub fn zoom_factor(&self) -> f32 {
        self.zoom_factor
    }

    /// The scale the document is rendered at, also used to size the low-res
    /// stroke preview.
    pub fn document_scale(&self) -> f32 {
        self.document_scale
    }

    pub fn set_zoom(&mut self, factor: f32) {
        let factor = factor.max(0.01);
        self.zoom_factor = factor;
        self.document_scale = factor;
    }

    pub fn set_lock(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Trade snapshot memory for history granularity: when set, post-stroke
    /// snapshots are coalesced through the debounce instead of stored on
    /// every release.
    pub fn set_low_memory(&mut self, low_memory: bool) {
        self.low_memory = low_memory;
        for renderer in &mut self.renderers {
            renderer.set_low_memory(low_memory);
        }
    }

    // ------------------------------------------------------------------
    // renderers
    // ------------------------------------------------------------------

    /// Bring the renderer list in sync with the layer stack: one renderer
    /// per layer, in stack order. Renderers of removed layers are disposed.
    pub fn sync_layers(&mut self, document: &mut Document, sink: &mut dyn HistorySink) {
        let mut renderers = std::mem::take(&mut self.renderers);
        let mut kept: Vec<LayerRenderer> = Vec::with_capacity(document.layers.len());
        for layer in &document.layers {
            match renderers.iter().position(|r| r.layer_id() == layer.id) {
                Some(idx) => kept.push(renderers.remove(idx)),
                None => {
                    let mut renderer = LayerRenderer::new(layer.id, layer.rect());
                    renderer.set_low_memory(self.low_memory);
                    kept.push(renderer);
                }
            }
        }
        for mut orphan in renderers {
            orphan.dispose(document, &mut self.context, sink);
            self.touch_map.retain(|_, id| *id != orphan.layer_id());
            self.cache.invalidate(orphan.layer_id());
        }
        self.renderers = kept;
    }

    pub fn renderer_mut(&mut self, layer_id: Uuid) -> Option<&mut LayerRenderer> {
        self.renderers.iter_mut().find(|r| r.layer_id() == layer_id)
    }

    /// Switch the active tool on every renderer.
    pub fn set_active_tool(
        &mut self,
        mode: ToolMode,
        document: &mut Document,
        sink: &mut dyn HistorySink,
    ) {
        for renderer in &mut self.renderers {
            renderer.handle_active_tool(mode, document, &mut self.context, sink);
        }
    }

    // ------------------------------------------------------------------
    // frame loop
    // ------------------------------------------------------------------

    /// Frame tick. Returns false when the call fell inside the frame
    /// interval and nothing was rendered.
    pub fn update(
        &mut self,
        now: Instant,
        document: &mut Document,
        sink: &mut dyn HistorySink,
    ) -> bool {
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.frame_interval {
                return false;
            }
        }
        self.last_frame = Some(now);

        for renderer in &mut self.renderers {
            renderer.update(now, document, &mut self.context, sink, self.document_scale);
        }

        if !self.locked {
            self.composite(document);
        }
        true
    }

    pub fn output(&self) -> &Surface {
        &self.output
    }

    /// Composite the layer stack bottom-up into the output surface.
    pub fn composite(&mut self, document: &Document) -> &Surface {
        if self.output.width() != document.width || self.output.height() != document.height {
            self.output.set_dimensions(document.width, document.height);
        } else {
            self.output.clear();
        }

        for layer in &document.layers {
            if !layer.visible {
                continue;
            }
            let (opacity, mode) = if layer.filters.enabled {
                (layer.filters.opacity, layer.filters.blend_mode)
            } else {
                (1.0, BlendMode::Normal)
            };
            if opacity <= 0.0 {
                continue;
            }

            let transform = apply_transformation(layer, self.viewport);
            let rendered = self
                .cache
                .rendered_source(layer, self.text_rasterizer.as_deref());

            if mode == BlendMode::Normal {
                match &transform {
                    Some(t) => {
                        draw_transformed(&mut self.output, rendered, t, opacity, layer.left, layer.top)
                    }
                    None => self.output.draw_surface(
                        rendered,
                        (layer.left - self.viewport.min.x).round() as i32,
                        (layer.top - self.viewport.min.y).round() as i32,
                        opacity,
                        CompositeOp::SourceOver,
                    ),
                }
            } else {
                // render the layer into a full-canvas scratch, then route
                // through the blend engine at the layer's bounds
                let scratch = self
                    .context
                    .blend_scratch
                    .acquire(document.width, document.height);
                let bounds = match &transform {
                    Some(t) => {
                        draw_transformed(scratch, rendered, t, opacity, layer.left, layer.top);
                        t.bounds
                    }
                    None => {
                        scratch.draw_surface(
                            rendered,
                            (layer.left - self.viewport.min.x).round() as i32,
                            (layer.top - self.viewport.min.y).round() as i32,
                            opacity,
                            CompositeOp::SourceOver,
                        );
                        layer.rect().translate(-self.viewport.min.to_vec2())
                    }
                };
                blend_layer(&mut self.output, scratch, mode, Some(bounds));
                self.context.blend_scratch.release();
            }

            self.present_preview(layer);
        }

        self.cache.store_composite(self.output.clone());
        &self.output
    }

    /// Overlay the in-flight stroke preview of the painting renderer on the
    /// layer it targets, so strokes are visible before they commit on
    /// release.
    fn present_preview(&mut self, layer: &Layer) {
        let Some(renderer) = self.renderers.iter().find(|r| r.layer_id() == layer.id) else {
            return;
        };
        if !renderer.is_painting() || !self.context.preview.is_active() {
            return;
        }
        let op = if matches!(renderer.tool_mode(), ToolMode::Paint(PaintTool::Eraser)) {
            CompositeOp::DestinationOut
        } else {
            CompositeOp::SourceOver
        };
        render_preview(
            &mut self.output,
            &self.context.preview,
            self.document_scale,
            layer.left - self.viewport.min.x,
            layer.top - self.viewport.min.y,
            renderer.brush().options.opacity,
            op,
        );
    }

    // ------------------------------------------------------------------
    // input dispatch
    // ------------------------------------------------------------------

    /// Press: topmost renderer under the pointer claims the touch id.
    pub fn handle_press(
        &mut self,
        touch_id: u64,
        p: Pos2,
        document: &mut Document,
        sink: &mut dyn HistorySink,
    ) {
        for renderer in self.renderers.iter_mut().rev() {
            if renderer.contains(p) {
                self.touch_map.insert(touch_id, renderer.layer_id());
                renderer.handle_press(p, document, &mut self.context, &mut self.cache, sink);
                return;
            }
        }
    }

    /// Move events go to whichever renderer claimed the touch.
    pub fn handle_move(
        &mut self,
        touch_id: u64,
        p: Pos2,
        document: &mut Document,
        sink: &mut dyn HistorySink,
    ) {
        let Some(layer_id) = self.touch_map.get(&touch_id).copied() else {
            return;
        };
        if let Some(renderer) = self.renderer_mut(layer_id) {
            renderer.handle_move(p, document, sink);
        }
    }

    /// Release: dispatch to the claiming renderer, then drop the mapping.
    pub fn handle_release(
        &mut self,
        touch_id: u64,
        p: Pos2,
        document: &mut Document,
        sink: &mut dyn HistorySink,
        now: Instant,
    ) {
        let Some(layer_id) = self.touch_map.remove(&touch_id) else {
            return;
        };
        let scale = self.document_scale;
        let Some(idx) = self
            .renderers
            .iter()
            .position(|r| r.layer_id() == layer_id)
        else {
            return;
        };
        self.renderers[idx].handle_release(
            p,
            document,
            &mut self.context,
            &mut self.cache,
            sink,
            now,
            scale,
        );
    }

    /// Invalidate one layer's cached render after its pixels changed
    /// outside the tool pipeline.
    pub fn invalidate_layer(&mut self, layer_id: Uuid) {
        self.cache.invalidate(layer_id);
    }
}

/// Resample `src` into `dst` through the transform matrix (inverse mapped,
/// nearest neighbor), restricted to the transformed bounds. The matrix maps
/// document space, so the inverse-mapped point is shifted by the layer
/// origin before sampling the layer-local source.
fn draw_transformed(
    dst: &mut Surface,
    src: &Surface,
    t: &LayerTransform,
    alpha: f32,
    origin_x: f32,
    origin_y: f32,
) {
    let inv = t.matrix.inverse();
    let x0 = t.bounds.min.x.floor().max(0.0) as i64;
    let y0 = t.bounds.min.y.floor().max(0.0) as i64;
    let x1 = (t.bounds.max.x.ceil() as i64).min(dst.width() as i64);
    let y1 = (t.bounds.max.y.ceil() as i64).min(dst.height() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            let p = inv * kurbo::Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let sx = (p.x - origin_x as f64).floor() as i64;
            let sy = (p.y - origin_y as f64).floor() as i64;
            if sx < 0 || sy < 0 || sx >= src.width() as i64 || sy >= src.height() as i64 {
                continue;
            }
            let px = src.get_pixel(sx as u32, sy as u32);
            if px[3] > 0 {
                dst.blend_pixel(x as u32, y as u32, px, alpha);
            }
        }
    }
}
