//! Clone stamp rendering.
//!
//! Each pointer copies a brush-diameter square out of the source surface,
//! offset by how far the pointer has travelled from the drag reference,
//! masks it destination-in with the brush's radial alpha stamp and blits
//! the result source-over at the pointer position.

use egui::{Pos2, Vec2};
use image::Rgba;

use crate::clipping::ClipMask;
use crate::drawing::{create_stamp, Brush};
use crate::surface::{CompositeOp, Surface};

/// Pooled brush-diameter scratch surface, deflated to 1x1 between strokes.
pub struct CloneScratch {
    surface: Surface,
}

impl Default for CloneScratch {
    fn default() -> Self {
        Self::new()
    }
}

impl CloneScratch {
    pub fn new() -> Self {
        Self {
            surface: Surface::new(1, 1),
        }
    }

    fn acquire(&mut self, size: u32) -> &mut Surface {
        self.surface.set_dimensions(size, size);
        &mut self.surface
    }

    pub fn release(&mut self) {
        self.surface.set_dimensions(1, 1);
    }
}

/// Render a cloned stroke for the given pointers.
///
/// `source_coords` is the clone origin sampled on the source layer (document
/// space), `drag_reference` the pointer position the stroke started at;
/// every painted point reads from the source at the same relative offset.
pub fn render_cloned_stroke(
    dest: &mut Surface,
    brush: &Brush,
    source: &Surface,
    source_left: f32,
    source_top: f32,
    source_coords: Pos2,
    drag_reference: Pos2,
    drag_start_offset: Vec2,
    opacity: f32,
    pointers: &[Pos2],
    scratch: &mut CloneScratch,
    clip: Option<&ClipMask>,
) {
    let radius = brush.radius;
    let diameter = brush.double_radius.ceil().max(1.0) as u32;

    let source_x = (source_coords.x - source_left) - radius;
    let source_y = (source_coords.y - source_top) - radius;

    let stamp = create_stamp(brush, 1.0);

    for p in pointers {
        let x_delta = drag_start_offset.x + (p.x - drag_reference.x);
        let y_delta = drag_start_offset.y + (p.y - drag_reference.y);

        let tmp = scratch.acquire(diameter);
        let region = source.extract_region(
            (source_x + x_delta).round() as i32,
            (source_y + y_delta).round() as i32,
            diameter,
            diameter,
        );
        tmp.draw_surface(&region, 0, 0, 1.0, CompositeOp::SourceOver);
        // keep only the area overlapping the brush shape
        tmp.draw_surface(&stamp, 0, 0, 1.0, CompositeOp::DestinationIn);

        let dst_x = (p.x - radius).round() as i32;
        let dst_y = (p.y - radius).round() as i32;
        for y in 0..diameter {
            let ty = dst_y + y as i32;
            for x in 0..diameter {
                let tx = dst_x + x as i32;
                if !dest.in_bounds(tx, ty) {
                    continue;
                }
                if let Some(c) = clip {
                    if !c.contains(tx, ty) {
                        continue;
                    }
                }
                let px = tmp.get_pixel(x, y);
                if px[3] > 0 {
                    dest.blend_pixel(tx as u32, ty as u32, px, opacity);
                }
            }
        }
    }

    scratch.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::BrushOptions;
    use egui::Color32;

    #[test]
    fn clone_copies_source_pixels_at_relative_offset() {
        let mut source = Surface::new(64, 64);
        for y in 0..64 {
            for x in 0..64 {
                source.put_pixel(x, y, Rgba([x as u8, y as u8, 0, 255]));
            }
        }
        let mut dest = Surface::new(64, 64);
        let brush = Brush::new(Color32::BLACK, 6.0, BrushOptions::default());

        // clone origin (10,10); stroke starts at (40,40) and stamps there,
        // so the stamp center reads source (10,10)
        let mut scratch = CloneScratch::new();
        render_cloned_stroke(
            &mut dest,
            &brush,
            &source,
            0.0,
            0.0,
            egui::pos2(10.0, 10.0),
            egui::pos2(40.0, 40.0),
            Vec2::ZERO,
            1.0,
            &[egui::pos2(40.0, 40.0)],
            &mut scratch,
            None,
        );
        let center = dest.get_pixel(40, 40);
        assert!(center[3] > 0);
        // source (10,10) encodes its own coordinates in r/g
        assert!((center[0] as i32 - 10).abs() <= 1);
        assert!((center[1] as i32 - 10).abs() <= 1);
        // outside the brush radius nothing is written
        assert_eq!(dest.get_pixel(50, 40)[3], 0);
    }

    #[test]
    fn zero_opacity_clone_leaves_the_destination_unchanged() {
        let source = Surface::new_filled(64, 64, Rgba([200, 100, 0, 255]));
        let mut dest = Surface::new_filled(64, 64, Rgba([9, 9, 9, 255]));
        let before = dest.clone();
        let mut scratch = CloneScratch::new();

        let brush = Brush::new(Color32::BLACK, 6.0, BrushOptions::default());
        render_cloned_stroke(
            &mut dest,
            &brush,
            &source,
            0.0,
            0.0,
            egui::pos2(10.0, 10.0),
            egui::pos2(40.0, 40.0),
            Vec2::ZERO,
            0.0,
            &[egui::pos2(40.0, 40.0)],
            &mut scratch,
            None,
        );
        assert!(dest == before);

        // a fully transparent brush color masks the stamp to nothing
        let clear = Brush::new(Color32::TRANSPARENT, 6.0, BrushOptions::default());
        render_cloned_stroke(
            &mut dest,
            &clear,
            &source,
            0.0,
            0.0,
            egui::pos2(10.0, 10.0),
            egui::pos2(40.0, 40.0),
            Vec2::ZERO,
            1.0,
            &[egui::pos2(40.0, 40.0)],
            &mut scratch,
            None,
        );
        assert!(dest == before);
    }

    #[test]
    fn pointer_travel_moves_the_source_read() {
        let mut source = Surface::new(64, 64);
        for y in 0..64 {
            for x in 0..64 {
                source.put_pixel(x, y, Rgba([x as u8, y as u8, 0, 255]));
            }
        }
        let mut dest = Surface::new(64, 64);
        let brush = Brush::new(Color32::BLACK, 6.0, BrushOptions::default());
        let mut scratch = CloneScratch::new();
        // pointer moved +8 in x from the drag reference
        render_cloned_stroke(
            &mut dest,
            &brush,
            &source,
            0.0,
            0.0,
            egui::pos2(10.0, 10.0),
            egui::pos2(40.0, 40.0),
            Vec2::ZERO,
            1.0,
            &[egui::pos2(48.0, 40.0)],
            &mut scratch,
            None,
        );
        let center = dest.get_pixel(48, 40);
        assert!((center[0] as i32 - 18).abs() <= 1);
    }
}
