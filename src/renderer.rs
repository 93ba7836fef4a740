//! Per-layer tool interaction.
//!
//! A [`LayerRenderer`] owns the interactive state of one layer: the active
//! tool mode, the brush, the in-progress stroke and its history snapshot.
//! While a pointer is down all paint work lands on the pooled preview
//! surface; the true-resolution layer raster is written exactly once, on
//! pointer release.

use std::fmt;
use std::time::Instant;

use egui::{Pos2, Rect, Vec2};
use image::Rgba;
use uuid::Uuid;

use crate::cache::RenderCache;
use crate::clipping::ClipMask;
use crate::cloning::render_cloned_stroke;
use crate::context::RenderContext;
use crate::document::Document;
use crate::drawing::{render_brush_stroke, Brush, BrushOptions};
use crate::fill::flood_fill;
use crate::history::{HistoryEntry, HistorySink, HistoryState, SnapshotDebounce};
use crate::lowres::{apply_override_config, create_override_config, slice_pointers, OverrideConfig};
use crate::shapes::{get_last_shape, is_shape_closed};
use crate::surface::{CompositeOp, Surface};

/// Paint tool variants. Clone carries its two-step setup state so an
/// unarmed clone cannot paint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaintTool {
    Brush,
    Eraser,
    Fill,
    Clone {
        source_layer: Uuid,
        source_coords: Option<Pos2>,
    },
}

/// Interaction mode of a renderer. Tool combinations that make no sense
/// cannot be expressed.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum ToolMode {
    #[default]
    Idle,
    Paint(PaintTool),
    Drag,
    ColorPicker,
}

#[derive(Debug)]
pub enum RenderError {
    MissingLayer(Uuid),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::MissingLayer(id) => write!(f, "layer {id} not present in document"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Captured state at drag start, for delta moves and the history pair.
#[derive(Clone, Copy)]
struct DragState {
    pointer: Pos2,
    bounds: Rect,
    mask_offset: (f32, f32),
}

pub struct LayerRenderer {
    layer_id: Uuid,
    /// On-screen bounds, kept in sync with the layer model by `set_bounds`.
    bounds: Rect,
    mode: ToolMode,
    brush: Brush,
    /// Edits target the layer mask instead of the source.
    paint_mask: bool,
    /// Pre-stroke state, enqueued to history when the debounce fires.
    pending_snapshot: Option<HistoryState>,
    debounce: SnapshotDebounce,
    /// Resume point for incremental full-res stroke rendering.
    last_index: usize,
    /// Coalesce post-stroke snapshots through the debounce instead of
    /// storing them on every release.
    low_memory: bool,
    /// Pointer the clone drag started at.
    clone_reference: Option<Pos2>,
    drag_start: Option<DragState>,
    /// Pointers arrived since the last frame tick.
    queued: bool,
    picked_color: Option<Rgba<u8>>,
}

impl LayerRenderer {
    pub fn new(layer_id: Uuid, bounds: Rect) -> Self {
        Self {
            layer_id,
            bounds,
            mode: ToolMode::Idle,
            brush: Brush::new(egui::Color32::BLACK, 10.0, BrushOptions::default()),
            paint_mask: false,
            pending_snapshot: None,
            debounce: SnapshotDebounce::new(),
            last_index: 1,
            low_memory: false,
            clone_reference: None,
            drag_start: None,
            queued: false,
            picked_color: None,
        }
    }

    pub fn layer_id(&self) -> Uuid {
        self.layer_id
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn contains(&self, p: Pos2) -> bool {
        self.bounds.contains(p)
    }

    pub fn tool_mode(&self) -> ToolMode {
        self.mode
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut Brush {
        &mut self.brush
    }

    pub fn set_low_memory(&mut self, low_memory: bool) {
        self.low_memory = low_memory;
    }

    pub fn set_paint_mask(&mut self, paint_mask: bool) {
        self.paint_mask = paint_mask;
    }

    pub fn is_painting(&self) -> bool {
        self.brush.down
    }

    pub fn take_picked_color(&mut self) -> Option<Rgba<u8>> {
        self.picked_color.take()
    }

    /// Switch the active tool. Any debounced snapshot is flushed first so a
    /// finished drawing session lands in history before the mode changes.
    pub fn handle_active_tool(
        &mut self,
        mode: ToolMode,
        document: &mut Document,
        ctx: &mut RenderContext,
        sink: &mut dyn HistorySink,
    ) {
        self.flush_snapshot(document, sink);
        self.brush.reset();
        self.last_index = 1;
        self.clone_reference = None;
        self.drag_start = None;
        ctx.preview.release();
        self.mode = mode;
    }

    pub fn handle_press(
        &mut self,
        p: Pos2,
        document: &mut Document,
        ctx: &mut RenderContext,
        cache: &mut RenderCache,
        sink: &mut dyn HistorySink,
    ) {
        let local = self.to_local(p);
        match self.mode {
            ToolMode::Idle => {}
            ToolMode::ColorPicker => {
                if let Some(layer) = document.layer(self.layer_id) {
                    let x = local.x.round() as i32;
                    let y = local.y.round() as i32;
                    if layer.source.in_bounds(x, y) {
                        self.picked_color = Some(layer.source.get_pixel(x as u32, y as u32));
                    }
                }
                // one shot
                self.mode = ToolMode::Idle;
            }
            ToolMode::Drag => {
                let mask_offset = document
                    .layer(self.layer_id)
                    .map_or((0.0, 0.0), |l| (l.mask_x, l.mask_y));
                self.drag_start = Some(DragState {
                    pointer: p,
                    bounds: self.bounds,
                    mask_offset,
                });
            }
            ToolMode::Paint(PaintTool::Fill) => {
                self.take_pre_stroke_snapshot(document);
                let clip = self.stroke_clip(document, 1.0, None);
                if let Some(layer) = document.layer_mut(self.layer_id) {
                    let target = if self.paint_mask {
                        layer.mask.as_mut()
                    } else {
                        Some(&mut layer.source)
                    };
                    if let Some(target) = target {
                        let color = self.brush.colors[0];
                        flood_fill(
                            target,
                            local.x,
                            local.y,
                            Rgba([color.r(), color.g(), color.b(), color.a()]),
                            5.0,
                            clip.as_ref(),
                        );
                    }
                    cache.invalidate(self.layer_id);
                }
                self.enqueue_snapshot(document, sink, "flood fill");
            }
            ToolMode::Paint(PaintTool::Clone {
                source_layer,
                source_coords,
            }) => {
                if source_coords.is_none() {
                    // first press samples the clone origin on the source layer
                    self.mode = ToolMode::Paint(PaintTool::Clone {
                        source_layer,
                        source_coords: Some(p),
                    });
                    return;
                }
                self.take_pre_stroke_snapshot(document);
                self.clone_reference = Some(local);
                self.brush.pointers = vec![local];
                self.brush.down = true;
            }
            ToolMode::Paint(_) => {
                self.take_pre_stroke_snapshot(document);
                self.brush.pointers = vec![local];
                self.brush.down = true;
                self.last_index = 1;
                ctx.preview.release();
            }
        }
    }

    pub fn handle_move(&mut self, p: Pos2, document: &mut Document, _sink: &mut dyn HistorySink) {
        if let (ToolMode::Drag, Some(drag)) = (self.mode, self.drag_start) {
            let delta = p - drag.pointer;
            if self.paint_mask {
                if let Some(layer) = document.layer_mut(self.layer_id) {
                    if layer.is_maskable() {
                        layer.mask_x = drag.mask_offset.0 + delta.x;
                        layer.mask_y = drag.mask_offset.1 + delta.y;
                    }
                }
            } else {
                let target = Rect::from_min_size(drag.bounds.min + delta, drag.bounds.size());
                self.move_bounds(target, document);
            }
            return;
        }
        if self.brush.down {
            self.brush.pointers.push(self.to_local(p));
            self.queued = true;
        }
    }

    /// Frame tick: renders queued pointers into the preview and flushes the
    /// snapshot debounce when its deadline passed.
    pub fn update(
        &mut self,
        now: Instant,
        document: &mut Document,
        ctx: &mut RenderContext,
        sink: &mut dyn HistorySink,
        document_scale: f32,
    ) {
        if self.debounce.due(now) {
            self.flush_snapshot(document, sink);
        }
        if !self.brush.down || self.brush.pointers.len() < 2 || !self.queued {
            return;
        }
        self.queued = false;

        let Some(layer) = document.layer(self.layer_id) else {
            return;
        };
        let (lw, lh) = (layer.width, layer.height);
        let pw = ((lw as f32) * document_scale).ceil().max(1.0) as u32;
        let ph = ((lh as f32) * document_scale).ceil().max(1.0) as u32;

        // pointers are layer-local and the preview covers the layer, so the
        // remap carries no viewport pan
        let cfg = (document_scale != 1.0).then(|| {
            create_override_config(
                document_scale,
                document_scale,
                Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(pw as f32, ph as f32)),
                slice_pointers(&self.brush),
            )
        });

        let clip = self.stroke_clip(document, document_scale, cfg.as_ref());

        if !ctx.preview.is_active() {
            ctx.preview.acquire(pw, ph);
        }

        if let ToolMode::Paint(PaintTool::Clone {
            source_layer,
            source_coords: Some(source_coords),
        }) = self.mode
        {
            self.render_clone_step(
                document,
                ctx,
                source_layer,
                source_coords,
                cfg.as_ref(),
                clip.as_ref(),
                document_scale,
            );
        } else if let Some(preview) = ctx.preview.surface_mut() {
            let idx = render_brush_stroke(
                preview,
                &self.brush,
                cfg.as_ref(),
                if cfg.is_some() { 1 } else { self.last_index },
                clip.as_ref(),
            );
            if cfg.is_none() {
                self.last_index = idx;
            }
        }

        self.debounce.re_arm(now);
    }

    /// Pointer up: always clears the down state and disposes the preview,
    /// then commits the preview into the true surface exactly once. Commit
    /// failure is logged, never propagated, and never skips the cleanup.
    pub fn handle_release(
        &mut self,
        _p: Pos2,
        document: &mut Document,
        ctx: &mut RenderContext,
        cache: &mut RenderCache,
        sink: &mut dyn HistorySink,
        now: Instant,
        document_scale: f32,
    ) {
        if self.mode == ToolMode::Drag {
            if let Some(drag) = self.drag_start.take() {
                if self.paint_mask {
                    let offset = document
                        .layer(self.layer_id)
                        .map(|l| (l.mask_x, l.mask_y));
                    if let Some((x, y)) = offset {
                        if (x, y) != drag.mask_offset {
                            sink.enqueue(HistoryEntry {
                                layer_id: self.layer_id,
                                description: String::from("move mask"),
                                undo: HistoryState::MaskOffset {
                                    x: drag.mask_offset.0,
                                    y: drag.mask_offset.1,
                                },
                                redo: HistoryState::MaskOffset { x, y },
                            });
                        }
                    }
                } else if self.bounds.min != drag.bounds.min {
                    sink.enqueue(HistoryEntry {
                        layer_id: self.layer_id,
                        description: String::from("move layer"),
                        undo: HistoryState::Bounds {
                            left: drag.bounds.min.x,
                            top: drag.bounds.min.y,
                        },
                        redo: HistoryState::Bounds {
                            left: self.bounds.min.x,
                            top: self.bounds.min.y,
                        },
                    });
                }
            }
            return;
        }

        if !self.brush.down {
            return;
        }
        self.brush.down = false;

        let committed = self.commit_preview(document, ctx, document_scale);

        // cleanup happens regardless of the commit outcome
        ctx.preview.release();
        self.brush.pointers.clear();
        self.last_index = 1;

        match committed {
            Ok(true) => {
                cache.invalidate(self.layer_id);
                if self.low_memory {
                    // debounce the snapshot so a drawing session of many
                    // short strokes lands in history as one entry
                    self.debounce.arm(now);
                } else {
                    self.flush_snapshot(document, sink);
                }
            }
            Ok(false) => {}
            Err(err) => {
                crate::log_err!("stroke commit failed: {}", err);
                self.flush_snapshot(document, sink);
            }
        }
    }

    /// Move the renderer bounds and the layer model by the same relative
    /// delta, recording a matched undo/redo pair.
    pub fn set_bounds(&mut self, target: Rect, document: &mut Document, sink: &mut dyn HistorySink) {
        let old = self.bounds;
        self.move_bounds(target, document);
        if old.min != self.bounds.min {
            sink.enqueue(HistoryEntry {
                layer_id: self.layer_id,
                description: String::from("move layer"),
                undo: HistoryState::Bounds {
                    left: old.min.x,
                    top: old.min.y,
                },
                redo: HistoryState::Bounds {
                    left: self.bounds.min.x,
                    top: self.bounds.min.y,
                },
            });
        }
    }

    /// Tear down interactive state: flush pending history, cancel the
    /// debounce, return pooled buffers.
    pub fn dispose(
        &mut self,
        document: &mut Document,
        ctx: &mut RenderContext,
        sink: &mut dyn HistorySink,
    ) {
        self.flush_snapshot(document, sink);
        self.debounce.cancel();
        self.brush.reset();
        ctx.preview.release();
        ctx.clone_scratch.release();
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn to_local(&self, p: Pos2) -> Pos2 {
        egui::pos2(p.x - self.bounds.min.x, p.y - self.bounds.min.y)
    }

    fn move_bounds(&mut self, target: Rect, document: &mut Document) {
        let delta = target.min - self.bounds.min;
        self.bounds = target;
        if let Some(layer) = document.layer_mut(self.layer_id) {
            layer.translate(Vec2::new(delta.x, delta.y));
        }
    }

    /// Clip mask for the active selection in layer-local coordinates, at
    /// the given preview scale. Only closed selections clip paint tools.
    fn stroke_clip(
        &self,
        document: &Document,
        scale: f32,
        cfg: Option<&OverrideConfig>,
    ) -> Option<ClipMask> {
        if !document.has_selection() {
            return None;
        }
        if !get_last_shape(&document.active_selection).is_some_and(|s| is_shape_closed(s)) {
            return None;
        }
        let layer = document.layer(self.layer_id)?;
        let w = ((layer.width as f32) * scale).ceil().max(1.0) as u32;
        let h = ((layer.height as f32) * scale).ceil().max(1.0) as u32;
        Some(ClipMask::from_selection(
            w,
            h,
            &document.active_selection,
            layer.left,
            layer.top,
            document.invert_selection,
            cfg,
        ))
    }

    fn take_pre_stroke_snapshot(&mut self, document: &Document) {
        if self.pending_snapshot.is_some() {
            // an earlier stroke of this session already holds the pre state
            return;
        }
        let Some(layer) = document.layer(self.layer_id) else {
            return;
        };
        self.pending_snapshot = Some(if self.paint_mask {
            HistoryState::Mask(layer.mask.clone())
        } else {
            HistoryState::Source(layer.source.clone())
        });
    }

    /// Enqueue the pending pre-stroke snapshot together with the current
    /// state. No-op when nothing is pending.
    fn flush_snapshot(&mut self, document: &Document, sink: &mut dyn HistorySink) {
        self.debounce.cancel();
        self.enqueue_snapshot(document, sink, "paint");
    }

    fn enqueue_snapshot(
        &mut self,
        document: &Document,
        sink: &mut dyn HistorySink,
        description: &str,
    ) {
        let Some(undo) = self.pending_snapshot.take() else {
            return;
        };
        let Some(layer) = document.layer(self.layer_id) else {
            return;
        };
        let redo = if self.paint_mask {
            HistoryState::Mask(layer.mask.clone())
        } else {
            HistoryState::Source(layer.source.clone())
        };
        sink.enqueue(HistoryEntry {
            layer_id: self.layer_id,
            description: String::from(description),
            undo,
            redo,
        });
    }

    fn render_clone_step(
        &mut self,
        document: &Document,
        ctx: &mut RenderContext,
        source_layer: Uuid,
        source_coords: Pos2,
        cfg: Option<&OverrideConfig>,
        clip: Option<&ClipMask>,
        document_scale: f32,
    ) {
        let Some(source) = document.layer(source_layer) else {
            crate::log_warn!("clone source layer {} is gone, skipping stroke", source_layer);
            return;
        };
        let Some(reference) = self.clone_reference else {
            return;
        };
        let pointers: Vec<Pos2> = match cfg {
            Some(c) => slice_pointers(&self.brush)
                .iter()
                .map(|p| apply_override_config(c, 0.0, 0.0, *p))
                .collect(),
            None => slice_pointers(&self.brush),
        };
        let mut brush = self.brush.clone();
        if document_scale != 1.0 {
            brush.set_radius(self.brush.radius * document_scale);
        }
        let (reference, origin) = match cfg {
            Some(c) => (
                apply_override_config(c, 0.0, 0.0, reference),
                apply_override_config(c, 0.0, 0.0, source_coords),
            ),
            None => (reference, source_coords),
        };
        if let Some(preview) = ctx.preview.surface_mut() {
            render_cloned_stroke(
                preview,
                &brush,
                &source.source,
                source.left * document_scale,
                source.top * document_scale,
                origin,
                reference,
                Vec2::ZERO,
                brush.options.opacity,
                &pointers,
                &mut ctx.clone_scratch,
                clip,
            );
        }
    }

    /// Blit the preview into the true-resolution target. Returns whether
    /// any pixels were committed.
    fn commit_preview(
        &mut self,
        document: &mut Document,
        ctx: &mut RenderContext,
        document_scale: f32,
    ) -> Result<bool, RenderError> {
        let Some(preview) = ctx.preview.surface() else {
            return Ok(false);
        };
        let clip = self.stroke_clip(document, 1.0, None);
        let eraser = matches!(self.mode, ToolMode::Paint(PaintTool::Eraser));
        let opacity = self.brush.options.opacity;

        let layer = document
            .layer_mut(self.layer_id)
            .ok_or(RenderError::MissingLayer(self.layer_id))?;
        let (lw, lh) = (layer.width, layer.height);

        // project the preview back to full resolution first
        let full_res;
        let src: &Surface = if document_scale != 1.0 {
            let mut up = Surface::new(lw, lh);
            up.draw_surface_scaled(preview, 0.0, 0.0, lw as f32, lh as f32, 1.0, CompositeOp::SourceOver);
            full_res = up;
            &full_res
        } else {
            preview
        };

        let target = if self.paint_mask {
            match layer.mask.as_mut() {
                Some(mask) => mask,
                None => return Ok(false),
            }
        } else {
            &mut layer.source
        };

        let op = if eraser {
            CompositeOp::DestinationOut
        } else {
            CompositeOp::SourceOver
        };
        match &clip {
            Some(clip) => {
                for y in 0..src.height().min(target.height()) {
                    for x in 0..src.width().min(target.width()) {
                        if !clip.contains(x as i32, y as i32) {
                            continue;
                        }
                        let px = src.get_pixel(x, y);
                        if px[3] == 0 {
                            continue;
                        }
                        match op {
                            CompositeOp::SourceOver => target.blend_pixel(x, y, px, opacity),
                            _ => {
                                let d = target.get_pixel(x, y);
                                let sa = (px[3] as f32 / 255.0) * opacity;
                                let a = (d[3] as f32 / 255.0) * (1.0 - sa);
                                target.put_pixel(
                                    x,
                                    y,
                                    Rgba([d[0], d[1], d[2], (a * 255.0) as u8]),
                                );
                            }
                        }
                    }
                }
            }
            None => target.draw_surface(src, 0, 0, opacity, op),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Layer;
    use crate::drawing::BrushKind;
    use crate::history::MemoryHistory;

    fn paint_setup() -> (Document, Uuid, LayerRenderer, RenderContext, RenderCache, MemoryHistory) {
        let mut doc = Document::new(64, 64);
        let id = doc.add_layer(Layer::new("paint", 64, 64));
        let bounds = doc.layer(id).unwrap().rect();
        let mut renderer = LayerRenderer::new(id, bounds);
        renderer.brush_mut().options.kind = BrushKind::Line;
        (doc, id, renderer, RenderContext::new(), RenderCache::new(), MemoryHistory::new())
    }

    fn stroke(
        renderer: &mut LayerRenderer,
        doc: &mut Document,
        ctx: &mut RenderContext,
        cache: &mut RenderCache,
        sink: &mut MemoryHistory,
        from: Pos2,
        to: Pos2,
    ) {
        let now = Instant::now();
        renderer.handle_press(from, doc, ctx, cache, sink);
        renderer.handle_move(to, doc, sink);
        renderer.update(now, doc, ctx, sink, 1.0);
        renderer.handle_release(to, doc, ctx, cache, sink, now, 1.0);
    }

    #[test]
    fn stroke_commits_once_on_release() {
        let (mut doc, id, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Brush),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        stroke(
            &mut renderer,
            &mut doc,
            &mut ctx,
            &mut cache,
            &mut sink,
            egui::pos2(10.0, 32.0),
            egui::pos2(50.0, 32.0),
        );
        let layer = doc.layer(id).unwrap();
        assert!(layer.source.get_pixel(30, 32)[3] > 0);
        assert!(!renderer.is_painting());
        assert!(!ctx.preview.is_active());
    }

    #[test]
    fn eraser_commits_destination_out() {
        let (mut doc, id, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        doc.layer_mut(id).unwrap().source.fill(Rgba([50, 60, 70, 255]));
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Eraser),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        stroke(
            &mut renderer,
            &mut doc,
            &mut ctx,
            &mut cache,
            &mut sink,
            egui::pos2(10.0, 32.0),
            egui::pos2(50.0, 32.0),
        );
        let layer = doc.layer(id).unwrap();
        assert!(layer.source.get_pixel(30, 32)[3] < 255);
        assert_eq!(layer.source.get_pixel(30, 5)[3], 255);
    }

    #[test]
    fn release_stores_history_immediately_by_default() {
        let (mut doc, _, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Brush),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        stroke(
            &mut renderer,
            &mut doc,
            &mut ctx,
            &mut cache,
            &mut sink,
            egui::pos2(10.0, 32.0),
            egui::pos2(50.0, 32.0),
        );
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn low_memory_defers_the_snapshot_until_tool_switch() {
        let (mut doc, _, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.set_low_memory(true);
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Brush),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        stroke(
            &mut renderer,
            &mut doc,
            &mut ctx,
            &mut cache,
            &mut sink,
            egui::pos2(10.0, 32.0),
            egui::pos2(50.0, 32.0),
        );
        // debounced: nothing in history yet
        assert!(sink.is_empty());
        renderer.handle_active_tool(ToolMode::Idle, &mut doc, &mut ctx, &mut sink);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn release_cleans_up_when_the_layer_is_gone() {
        let (mut doc, id, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Brush),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        let now = Instant::now();
        renderer.handle_press(egui::pos2(10.0, 32.0), &mut doc, &mut ctx, &mut cache, &mut sink);
        renderer.handle_move(egui::pos2(50.0, 32.0), &mut doc, &mut sink);
        renderer.update(now, &mut doc, &mut ctx, &mut sink, 1.0);
        doc.remove_layer(id);
        renderer.handle_release(egui::pos2(50.0, 32.0), &mut doc, &mut ctx, &mut cache, &mut sink, now, 1.0);
        assert!(!renderer.is_painting());
        assert!(!ctx.preview.is_active());
    }

    #[test]
    fn clone_needs_two_presses_before_painting() {
        let mut doc = Document::new(64, 64);
        let src_id = doc.add_layer(Layer::new_filled("src", 64, 64, Rgba([200, 100, 0, 255])));
        let dst_id = doc.add_layer(Layer::new("dst", 64, 64));
        let bounds = doc.layer(dst_id).unwrap().rect();
        let mut renderer = LayerRenderer::new(dst_id, bounds);
        let mut ctx = RenderContext::new();
        let mut cache = RenderCache::new();
        let mut sink = MemoryHistory::new();
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Clone {
                source_layer: src_id,
                source_coords: None,
            }),
            &mut doc,
            &mut ctx,
            &mut sink,
        );

        // first press only samples the origin
        renderer.handle_press(egui::pos2(16.0, 16.0), &mut doc, &mut ctx, &mut cache, &mut sink);
        assert!(!renderer.is_painting());

        let now = Instant::now();
        renderer.handle_press(egui::pos2(40.0, 40.0), &mut doc, &mut ctx, &mut cache, &mut sink);
        assert!(renderer.is_painting());
        renderer.handle_move(egui::pos2(44.0, 40.0), &mut doc, &mut sink);
        renderer.update(now, &mut doc, &mut ctx, &mut sink, 1.0);
        renderer.handle_release(egui::pos2(44.0, 40.0), &mut doc, &mut ctx, &mut cache, &mut sink, now, 1.0);

        let dst = doc.layer(dst_id).unwrap();
        assert!(dst.source.get_pixel(42, 40)[3] > 0);
        assert_eq!(dst.source.get_pixel(42, 40)[0], 200);
    }

    #[test]
    fn fill_enqueues_history_immediately() {
        let (mut doc, id, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.handle_active_tool(
            ToolMode::Paint(PaintTool::Fill),
            &mut doc,
            &mut ctx,
            &mut sink,
        );
        renderer.handle_press(egui::pos2(32.0, 32.0), &mut doc, &mut ctx, &mut cache, &mut sink);
        assert_eq!(sink.len(), 1);
        assert!(doc.layer(id).unwrap().source.get_pixel(32, 32)[3] > 0);
    }

    #[test]
    fn drag_moves_bounds_and_records_one_entry() {
        let (mut doc, id, mut renderer, mut ctx, mut cache, mut sink) = paint_setup();
        renderer.handle_active_tool(ToolMode::Drag, &mut doc, &mut ctx, &mut sink);
        let now = Instant::now();
        renderer.handle_press(egui::pos2(10.0, 10.0), &mut doc, &mut ctx, &mut cache, &mut sink);
        renderer.handle_move(egui::pos2(25.0, 15.0), &mut doc, &mut sink);
        renderer.handle_release(egui::pos2(25.0, 15.0), &mut doc, &mut ctx, &mut cache, &mut sink, now, 1.0);
        assert_eq!(doc.layer(id).unwrap().left, 15.0);
        assert_eq!(doc.layer(id).unwrap().top, 5.0);
        assert_eq!(sink.len(), 1);
    }
}
