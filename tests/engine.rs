//! End-to-end engine behavior: a host driving the controller the way an
//! editor frontend would.

use std::time::{Duration, Instant};

use egui::pos2;
use image::Rgba;
use layerpaint::document::{Document, Layer};
use layerpaint::drawing::BrushKind;
use layerpaint::history::MemoryHistory;
use layerpaint::renderer::{PaintTool, ToolMode};
use layerpaint::shapes::{merge_shapes, rectangle_to_shape, subtract_shapes};
use layerpaint::BlendMode;
use layerpaint::CanvasController;

const FRAME: Duration = Duration::from_millis(20);

struct Host {
    controller: CanvasController,
    document: Document,
    history: MemoryHistory,
    clock: Instant,
}

impl Host {
    fn new(width: u32, height: u32) -> Self {
        let mut host = Self {
            controller: CanvasController::new(width, height),
            document: Document::new(width, height),
            history: MemoryHistory::new(),
            clock: Instant::now(),
        };
        host.document
            .add_layer(Layer::new("background", width, height));
        host.controller
            .sync_layers(&mut host.document, &mut host.history);
        host
    }

    fn tick(&mut self) {
        self.clock += FRAME;
        self.controller
            .update(self.clock, &mut self.document, &mut self.history);
    }

    fn stroke(&mut self, from: egui::Pos2, to: egui::Pos2) {
        self.controller
            .handle_press(0, from, &mut self.document, &mut self.history);
        self.controller
            .handle_move(0, to, &mut self.document, &mut self.history);
        self.tick();
        self.controller
            .handle_release(0, to, &mut self.document, &mut self.history, self.clock);
    }
}

#[test]
fn brush_stroke_lands_in_the_layer_and_the_composite() {
    let mut host = Host::new(64, 64);
    host.controller.set_active_tool(
        ToolMode::Paint(PaintTool::Brush),
        &mut host.document,
        &mut host.history,
    );
    let id = host.document.layers[0].id;
    {
        let renderer = host.controller.renderer_mut(id).unwrap();
        renderer.brush_mut().options.kind = BrushKind::Line;
        renderer.brush_mut().set_radius(8.0);
    }

    host.stroke(pos2(10.0, 32.0), pos2(54.0, 32.0));

    assert!(host.document.layers[0].source.get_pixel(32, 32)[3] > 0);
    host.tick();
    assert!(host.controller.output().get_pixel(32, 32)[3] > 0);
    // nothing outside the stroke band
    assert_eq!(host.controller.output().get_pixel(32, 8)[3], 0);
}

#[test]
fn in_progress_stroke_shows_in_the_composite_before_release() {
    let mut host = Host::new(64, 64);
    host.controller.set_active_tool(
        ToolMode::Paint(PaintTool::Brush),
        &mut host.document,
        &mut host.history,
    );
    let id = host.document.layers[0].id;
    {
        let renderer = host.controller.renderer_mut(id).unwrap();
        renderer.brush_mut().options.kind = BrushKind::Line;
        renderer.brush_mut().set_radius(8.0);
    }

    host.controller
        .handle_press(0, pos2(10.0, 32.0), &mut host.document, &mut host.history);
    host.controller
        .handle_move(0, pos2(54.0, 32.0), &mut host.document, &mut host.history);
    host.tick();

    // the live preview is composited while the pointer is still down
    assert!(host.controller.output().get_pixel(30, 32)[3] > 0);
    // the layer itself only changes on release
    assert_eq!(host.document.layers[0].source.get_pixel(30, 32)[3], 0);

    host.controller.handle_release(
        0,
        pos2(54.0, 32.0),
        &mut host.document,
        &mut host.history,
        host.clock,
    );
    assert!(host.document.layers[0].source.get_pixel(30, 32)[3] > 0);
}

#[test]
fn selection_constrains_the_fill() {
    let mut host = Host::new(64, 64);
    host.document
        .set_selection(vec![rectangle_to_shape(16.0, 16.0, 8.0, 8.0)]);
    host.controller.set_active_tool(
        ToolMode::Paint(PaintTool::Fill),
        &mut host.document,
        &mut host.history,
    );
    host.controller
        .handle_press(0, pos2(12.0, 12.0), &mut host.document, &mut host.history);

    let source = &host.document.layers[0].source;
    assert!(source.get_pixel(12, 12)[3] > 0);
    assert_eq!(source.get_pixel(40, 40)[3], 0);
}

#[test]
fn inverted_selection_constrains_the_fill_to_the_outside() {
    let mut host = Host::new(64, 64);
    host.document
        .set_selection(vec![rectangle_to_shape(16.0, 16.0, 8.0, 8.0)]);
    host.document.invert_selection = true;
    host.controller.set_active_tool(
        ToolMode::Paint(PaintTool::Fill),
        &mut host.document,
        &mut host.history,
    );
    host.controller
        .handle_press(0, pos2(40.0, 40.0), &mut host.document, &mut host.history);

    let source = &host.document.layers[0].source;
    assert!(source.get_pixel(40, 40)[3] > 0);
    assert_eq!(source.get_pixel(12, 12)[3], 0);
}

#[test]
fn stroke_history_round_trips_through_undo_and_redo() {
    let mut host = Host::new(64, 64);
    // exercise the deferred-snapshot path
    host.controller.set_low_memory(true);
    host.controller.set_active_tool(
        ToolMode::Paint(PaintTool::Brush),
        &mut host.document,
        &mut host.history,
    );
    let id = host.document.layers[0].id;
    host.controller
        .renderer_mut(id)
        .unwrap()
        .brush_mut()
        .options
        .kind = BrushKind::Line;

    host.stroke(pos2(10.0, 32.0), pos2(54.0, 32.0));
    // switching tools flushes the debounced snapshot
    host.controller
        .set_active_tool(ToolMode::Idle, &mut host.document, &mut host.history);
    assert_eq!(host.history.len(), 1);

    let mut history = std::mem::take(&mut host.history);
    assert!(history.undo(&mut host.document));
    assert_eq!(host.document.layers[0].source.get_pixel(32, 32)[3], 0);
    assert!(history.redo(&mut host.document));
    assert!(host.document.layers[0].source.get_pixel(32, 32)[3] > 0);
}

#[test]
fn multiply_blend_of_transparent_source_keeps_the_destination() {
    let mut host = Host::new(8, 8);
    host.document.layers[0]
        .source
        .fill(Rgba([120, 130, 140, 255]));
    let top = host
        .document
        .add_layer(Layer::new("empty multiply", 8, 8));
    {
        let layer = host.document.layer_mut(top).unwrap();
        layer.filters.enabled = true;
        layer.filters.blend_mode = BlendMode::Multiply;
    }
    host.controller
        .sync_layers(&mut host.document, &mut host.history);

    host.tick();
    assert_eq!(
        host.controller.output().get_pixel(4, 4),
        Rgba([120, 130, 140, 255])
    );
}

#[test]
fn selection_booleans_compose_before_use() {
    let a = rectangle_to_shape(10.0, 10.0, 0.0, 0.0);
    let b = rectangle_to_shape(10.0, 10.0, 5.0, 5.0);

    let merged = merge_shapes(&a, &b);
    assert_eq!(merged.len(), 1);

    let hole = subtract_shapes(&a, &rectangle_to_shape(20.0, 20.0, -5.0, -5.0));
    assert!(hole.is_empty());
}
