//! Flood fill by boundary tracing.
//!
//! Instead of growing a region pixel by pixel, the fill traces the closed
//! boundary of the color region around the seed (Moore neighborhood walk)
//! and fills the resulting polygon, smoothing the outline through quadratic
//! mid-point curves and stroking it `feather` pixels wide so the edge is
//! softened rather than aliased.

use egui::{Color32, Pos2};
use image::Rgba;

use crate::clipping::ClipMask;
use crate::drawing::{stamp_circle, stamp_line};
use crate::shapes::{point_between, Shape};
use crate::surface::Surface;

const UP: i32 = 0;
const LEFT: i32 = 1;
const DOWN: i32 = 2;
const RIGHT: i32 = 3;

/// Trace the contiguous color region around the seed point and return its
/// boundary as a closed path. `threshold` is a 0..100 color distance; at 0
/// only exact matches join the region.
pub fn select_by_color(surface: &Surface, source_x: f32, source_y: f32, threshold: f32) -> Shape {
    let width = surface.width() as i32;
    let height = surface.height() as i32;
    let data = surface.as_raw();

    let source_x = (source_x.round() as i32).clamp(0, width - 1);
    let source_y = (source_y.round() as i32).clamp(0, height - 1);

    let idx = ((source_y * width + source_x) * 4) as usize;
    let (r, g, b, a) = (
        data[idx] as i32,
        data[idx + 1] as i32,
        data[idx + 2] as i32,
        data[idx + 3] as i32,
    );

    let pixel_match = |x: i32, y: i32| -> bool {
        let i = ((y * width + x) * 4) as usize;
        if threshold == 0.0 {
            return data[i] as i32 == r
                && data[i + 1] as i32 == g
                && data[i + 2] as i32 == b
                && data[i + 3] as i32 == a;
        }
        // red-mean weighted color distance
        let r_mean = (r + data[i] as i32) / 2;
        let r2 = r - data[i] as i32;
        let g2 = g - data[i + 1] as i32;
        let b2 = b - data[i + 2] as i32;
        let distance = ((((512 + r_mean) * r2 * r2) >> 8)
            + 4 * g2 * g2
            + (((767 - r_mean) * b2 * b2) >> 8)) as f32;
        distance.sqrt() < threshold
    };

    // walk up from the seed to the region's upper boundary
    let mut x = source_x;
    let mut y = source_y;
    while y > 0 && pixel_match(x, y - 1) {
        y -= 1;
    }

    let first = egui::pos2(x as f32, y as f32);
    let mut path: Vec<Pos2> = vec![first];
    let mut orientation = LEFT;

    // walk the region boundary until the start point comes around again
    let max_steps = (width as usize * height as usize * 4).max(16);
    for _ in 0..max_steps {
        if path.len() >= 2 {
            let last = path[path.len() - 1];
            let penultimate = path[path.len() - 2];
            if last.y < penultimate.y {
                orientation = UP;
            } else if last.x < penultimate.x {
                orientation = LEFT;
            } else if last.y > penultimate.y {
                orientation = DOWN;
            } else if last.x > penultimate.x {
                orientation = RIGHT;
            }
        }

        let mut found = false;
        for direction in UP..=RIGHT {
            match (orientation + direction) % 4 {
                UP => {
                    if x + 1 < width && pixel_match(x + 1, y) {
                        found = true;
                        x += 1;
                    }
                }
                LEFT => {
                    if y - 1 >= 0 && pixel_match(x, y - 1) {
                        found = true;
                        y -= 1;
                    }
                }
                DOWN => {
                    if x - 1 >= 0 && pixel_match(x - 1, y) {
                        found = true;
                        x -= 1;
                    }
                }
                _ => {
                    if y + 1 < height && pixel_match(x, y + 1) {
                        found = true;
                        y += 1;
                    }
                }
            }
            if found {
                path.push(egui::pos2(x as f32, y as f32));
                break;
            }
        }

        let last = path[path.len() - 1];
        if last == first {
            break;
        }
        if !found {
            // isolated pixel, the single-point path stands
            break;
        }
    }

    path
}

/// Fill the color region around the seed with `color`. `feather` widens the
/// boundary stroke to soften the edge; drawing honors the clip mask.
pub fn flood_fill(
    target: &mut Surface,
    source_x: f32,
    source_y: f32,
    color: Rgba<u8>,
    feather: f32,
    clip: Option<&ClipMask>,
) {
    if target.width() == 0 || target.height() == 0 {
        return;
    }
    let path = select_by_color(target, source_x, source_y, 0.0);
    let fill = Color32::from_rgba_unmultiplied(color[0], color[1], color[2], color[3]);
    let feather = feather.max(1.0);

    if path.len() < 3 {
        let p = path[0];
        stamp_circle(target, p.x, p.y, feather / 2.0, fill, 1.0, clip);
        return;
    }

    let outline = smooth_path(&path);

    // interior: rasterize the smoothed ring and write the fill color inside
    let mask = ClipMask::from_selection(
        target.width(),
        target.height(),
        &vec![outline.clone()],
        0.0,
        0.0,
        false,
        None,
    );
    for y in 0..target.height() as i32 {
        for x in 0..target.width() as i32 {
            if mask.contains(x, y) && clip.map_or(true, |c| c.contains(x, y)) {
                target.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    // feathered boundary stroke, round joins
    for pair in outline.windows(2) {
        stamp_line(target, pair[0], pair[1], feather, fill, 1.0, clip);
    }
}

/// Soften the traced outline through quadratic mid-point curves, flattened
/// into a polyline.
fn smooth_path(path: &[Pos2]) -> Vec<Pos2> {
    let mut out: Vec<Pos2> = vec![path[0]];
    let mut cursor = path[0];
    for i in 1..path.len().saturating_sub(2) {
        let ctrl = path[i];
        let to = point_between(path[i], path[i + 1]);
        flatten_quad(&mut out, cursor, ctrl, to);
        cursor = to;
    }
    let penultimate = path[path.len() - 2];
    let last = path[path.len() - 1];
    flatten_quad(&mut out, cursor, penultimate, last);
    out
}

fn flatten_quad(out: &mut Vec<Pos2>, from: Pos2, ctrl: Pos2, to: Pos2) {
    let steps = 4;
    for s in 1..=steps {
        let t = s as f32 / steps as f32;
        let u = 1.0 - t;
        out.push(egui::pos2(
            u * u * from.x + 2.0 * u * t * ctrl.x + t * t * to.x,
            u * u * from.y + 2.0 * u * t * ctrl.y + t * t * to.y,
        ));
    }
}
