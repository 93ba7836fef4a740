//! Brush stroke rendering.
//!
//! Strokes are rasterized by stamping: lines are stamped as overlapping
//! filled circles so joins and caps come out round, the paint brush stamps a
//! radial falloff gradient along the segment. All randomness (spray dots,
//! pen jitter) comes from a positional hash so a stroke re-renders
//! identically from the same pointers.

use egui::{Color32, Pos2};
use image::Rgba;

use crate::clipping::ClipMask;
use crate::lowres::{apply_override_config, OverrideConfig};
use crate::shapes::{angle_between, distance_between, point_between};
use crate::surface::Surface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushKind {
    Line,
    PaintBrush,
    #[default]
    Pen,
    Calligraphic,
    Connected,
    Nearest,
    Spray,
}

#[derive(Clone, Copy, Debug)]
pub struct BrushOptions {
    pub kind: BrushKind,
    /// Parallel stroke count for the pen.
    pub strokes: u32,
    /// Quadratic mid-point smoothing for the pen.
    pub smooth: bool,
    /// Inner gradient stop of the paint brush stamp, 0..1.
    pub thickness: f32,
    pub opacity: f32,
}

impl Default for BrushOptions {
    fn default() -> Self {
        Self {
            kind: BrushKind::default(),
            strokes: 1,
            smooth: false,
            thickness: 0.5,
            opacity: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Brush {
    pub radius: f32,
    pub half_radius: f32,
    pub double_radius: f32,
    /// Base color, half-alpha variant, fully transparent variant.
    pub colors: [Color32; 3],
    pub pointers: Vec<Pos2>,
    pub down: bool,
    pub options: BrushOptions,
}

impl Brush {
    pub fn new(color: Color32, radius: f32, options: BrushOptions) -> Self {
        let [r, g, b, a] = color.to_array();
        Self {
            radius,
            half_radius: radius * 0.5,
            double_radius: radius * 2.0,
            colors: [
                color,
                Color32::from_rgba_unmultiplied(r, g, b, a / 2),
                Color32::from_rgba_unmultiplied(r, g, b, 0),
            ],
            pointers: Vec::new(),
            down: false,
            options,
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.half_radius = radius * 0.5;
        self.double_radius = radius * 2.0;
    }

    pub fn reset(&mut self) {
        self.pointers.clear();
        self.down = false;
    }
}

/// Stroke width per kind.
pub fn stroke_width(brush: &Brush) -> f32 {
    match brush.options.kind {
        BrushKind::Pen => brush.radius * 0.2,
        BrushKind::Calligraphic => brush.half_radius,
        BrushKind::Connected => brush.half_radius * 0.25,
        BrushKind::Nearest => brush.half_radius,
        _ => brush.radius,
    }
}

/// Render registered pointers into a stroke, starting at `last_index` so a
/// long stroke can be spread over several frames. Returns the new index.
/// Fewer than two pointers renders nothing.
pub fn render_brush_stroke(
    target: &mut Surface,
    brush: &Brush,
    override_config: Option<&OverrideConfig>,
    last_index: usize,
    clip: Option<&ClipMask>,
) -> usize {
    let mut radius = brush.radius;
    let mut double_radius = brush.double_radius;
    let mut scale = 1.0;

    let pointers: Vec<Pos2> = match override_config {
        Some(cfg) => {
            scale = cfg.zoom;
            radius *= scale;
            double_radius *= scale;
            cfg.pointers
                .iter()
                .map(|p| apply_override_config(cfg, 0.0, 0.0, *p))
                .collect()
        }
        None => brush.pointers.clone(),
    };

    if pointers.len() < 2 {
        return last_index;
    }

    let line_width = stroke_width(brush) * scale;
    let opacity = brush.options.opacity;
    let kind = brush.options.kind;
    let color = brush.colors[0];

    let mut i = last_index.max(1);
    while i < pointers.len() {
        let is_first = i == last_index.max(1);
        let prev = pointers[i - 1];
        let point = pointers[i];

        match kind {
            BrushKind::PaintBrush => {
                let dist = distance_between(prev, point);
                let angle = angle_between(prev, point);
                let incr = (radius * 0.25).max(0.5);
                let (sin, cos) = (angle.sin(), angle.cos());
                let mut j = 0.0;
                while j < dist {
                    let x = prev.x + sin * j;
                    let y = prev.y + cos * j;
                    stamp_gradient(target, brush, x, y, radius, opacity, clip);
                    j += incr;
                }
            }
            BrushKind::Spray => {
                let count = double_radius as u32;
                for j in 0..count {
                    let seed = (i as u32).wrapping_mul(31).wrapping_add(j);
                    let angle = hash_range(seed, 0, 0.0, std::f32::consts::TAU);
                    let dist = hash_range(seed, 1, -radius, radius);
                    let size = hash_range(seed, 2, 1.0, 3.0);
                    fill_square(
                        target,
                        point.x + dist * angle.cos(),
                        point.y + dist * angle.sin(),
                        size,
                        color,
                        opacity,
                        clip,
                    );
                }
            }
            BrushKind::Line => {
                stamp_line(target, prev, point, line_width, color, opacity, clip);
            }
            BrushKind::Calligraphic => {
                let min = (radius * 0.2) * 0.66666;
                let max = (radius * 0.2) * 1.33333;
                for offset in [-max, -min, 0.0, min, max] {
                    stamp_line(
                        target,
                        egui::pos2(prev.x + offset, prev.y + offset),
                        egui::pos2(point.x + offset, point.y + offset),
                        line_width,
                        color,
                        opacity,
                        clip,
                    );
                }
            }
            BrushKind::Connected => {
                stamp_line(target, prev, point, line_width, color, opacity, clip);
                if i >= 5 {
                    stamp_line(target, pointers[i - 5], point, line_width, color, opacity, clip);
                }
            }
            BrushKind::Nearest => {
                let last_point = pointers[pointers.len() - 1];
                if is_first {
                    let penultimate = pointers[pointers.len() - 2];
                    stamp_line(target, penultimate, last_point, line_width, color, opacity, clip);
                }
                let dx = point.x - last_point.x;
                let dy = point.y - last_point.y;
                // connect to the stroke tail when the new point is in range
                if dx * dx + dy * dy < 1000.0 {
                    let from = egui::pos2(last_point.x + dx * 0.2, last_point.y + dy * 0.2);
                    let to = egui::pos2(point.x - dx * 0.2, point.y - dy * 0.2);
                    stamp_line(target, from, to, line_width, brush.colors[1], opacity, clip);
                }
            }
            BrushKind::Pen => {
                let mut jitter_x = 0.0;
                let mut jitter_y = 0.0;
                for j in 0..brush.options.strokes.max(1) {
                    let seed = (i as u32).wrapping_mul(131).wrapping_add(j);
                    let width = line_width * hash_range(seed, 0, 0.5, 1.0);
                    let from = egui::pos2(prev.x - jitter_x, prev.y - jitter_y);
                    let to = egui::pos2(point.x - jitter_x, point.y - jitter_y);
                    if brush.options.smooth && i >= 2 {
                        let prev_mid = point_between(pointers[i - 2], prev);
                        quad_stroke(
                            target,
                            egui::pos2(prev_mid.x - jitter_x, prev_mid.y - jitter_y),
                            from,
                            point_between(from, to),
                            width,
                            color,
                            opacity,
                            clip,
                        );
                        if i == pointers.len() - 1 {
                            stamp_line(target, point_between(from, to), to, width, color, opacity, clip);
                        }
                    } else {
                        stamp_line(target, from, to, width, color, opacity, clip);
                    }
                    jitter_x += hash_range(seed, 1, 0.0, width);
                    jitter_y += hash_range(seed, 2, 0.0, width);
                }
            }
        }
        i += 1;
    }

    i
}

/// Radial alpha stamp of a brush, for masking cloned pixels to the brush
/// shape. Stamp is `double_radius` square, alpha follows the paint brush
/// gradient, rgb is opaque white.
pub fn create_stamp(brush: &Brush, scale: f32) -> Surface {
    let radius = brush.radius * scale;
    let size = (radius * 2.0).ceil().max(1.0) as u32;
    let mut stamp = Surface::new(size, size);
    let c = radius;
    for y in 0..size {
        for x in 0..size {
            let d = ((x as f32 + 0.5 - c).powi(2) + (y as f32 + 0.5 - c).powi(2)).sqrt();
            let a = gradient_alpha(brush, d, radius);
            if a > 0.0 {
                stamp.put_pixel(x, y, Rgba([255, 255, 255, (a * 255.0) as u8]));
            }
        }
    }
    stamp
}

// ---------------------------------------------------------------------------
// stamping primitives
// ---------------------------------------------------------------------------

fn clip_allows(clip: Option<&ClipMask>, x: i32, y: i32) -> bool {
    clip.map_or(true, |c| c.contains(x, y))
}

fn put_blended(target: &mut Surface, x: i32, y: i32, color: Color32, alpha: f32, clip: Option<&ClipMask>) {
    if alpha <= 0.0 || !target.in_bounds(x, y) || !clip_allows(clip, x, y) {
        return;
    }
    let [r, g, b, a] = color.to_array();
    target.blend_pixel(x as u32, y as u32, Rgba([r, g, b, a]), alpha);
}

/// Filled circle, the round cap/join primitive.
pub(crate) fn stamp_circle(target: &mut Surface, cx: f32, cy: f32, radius: f32, color: Color32, alpha: f32, clip: Option<&ClipMask>) {
    let r = radius.max(0.5);
    let x0 = (cx - r).floor() as i32;
    let x1 = (cx + r).ceil() as i32;
    let y0 = (cy - r).floor() as i32;
    let y1 = (cy + r).ceil() as i32;
    let r2 = r * r;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let d2 = dx * dx + dy * dy;
            if d2 <= r2 {
                // soften the rim by a pixel
                let d = d2.sqrt();
                let cov = (r - d).clamp(0.0, 1.0);
                put_blended(target, x, y, color, alpha * cov, clip);
            }
        }
    }
}

/// Line as overlapping circle stamps at half-radius increments.
pub(crate) fn stamp_line(target: &mut Surface, from: Pos2, to: Pos2, width: f32, color: Color32, alpha: f32, clip: Option<&ClipMask>) {
    let r = (width * 0.5).max(0.5);
    let dist = distance_between(from, to);
    let steps = (dist / (r * 0.5)).ceil().max(1.0) as u32;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        stamp_circle(
            target,
            from.x + (to.x - from.x) * t,
            from.y + (to.y - from.y) * t,
            r,
            color,
            alpha,
            clip,
        );
    }
}

/// Quadratic segment flattened into line stamps.
fn quad_stroke(target: &mut Surface, from: Pos2, ctrl: Pos2, to: Pos2, width: f32, color: Color32, alpha: f32, clip: Option<&ClipMask>) {
    let steps = (distance_between(from, to).max(4.0) / 2.0).ceil() as u32;
    let mut last = from;
    for s in 1..=steps {
        let t = s as f32 / steps as f32;
        let u = 1.0 - t;
        let x = u * u * from.x + 2.0 * u * t * ctrl.x + t * t * to.x;
        let y = u * u * from.y + 2.0 * u * t * ctrl.y + t * t * to.y;
        let next = egui::pos2(x, y);
        stamp_line(target, last, next, width, color, alpha, clip);
        last = next;
    }
}

fn fill_square(target: &mut Surface, x: f32, y: f32, size: f32, color: Color32, alpha: f32, clip: Option<&ClipMask>) {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let s = size.round().max(1.0) as i32;
    for py in y0..y0 + s {
        for px in x0..x0 + s {
            put_blended(target, px, py, color, alpha, clip);
        }
    }
}

fn gradient_alpha(brush: &Brush, d: f32, radius: f32) -> f32 {
    let half = radius * 0.5;
    let base = brush.colors[0].a() as f32 / 255.0;
    if d <= half {
        return base;
    }
    if d >= radius {
        return 0.0;
    }
    let u = (d - half) / (radius - half);
    let thickness = brush.options.thickness.clamp(0.01, 1.0);
    // stops: 0 -> base, thickness -> base/2, 1 -> 0
    if u <= thickness {
        let t = u / thickness;
        base * (1.0 - 0.5 * t)
    } else {
        let t = (u - thickness) / (1.0 - thickness);
        base * 0.5 * (1.0 - t)
    }
}

/// Radial falloff stamp of the paint brush.
fn stamp_gradient(target: &mut Surface, brush: &Brush, cx: f32, cy: f32, radius: f32, alpha: f32, clip: Option<&ClipMask>) {
    let x0 = (cx - radius).floor() as i32;
    let x1 = (cx + radius).ceil() as i32;
    let y0 = (cy - radius).floor() as i32;
    let y1 = (cy + radius).ceil() as i32;
    let color = brush.colors[0];
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let d = (dx * dx + dy * dy).sqrt();
            let a = gradient_alpha(brush, d, radius);
            if a > 0.0 {
                let c = Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), 255);
                put_blended(target, x, y, c, alpha * a, clip);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// deterministic positional hash
// ---------------------------------------------------------------------------

fn hash01(seed: u32, channel: u32) -> f32 {
    let mut h = seed.wrapping_mul(0x9E37_79B9) ^ channel.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 16;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 13;
    (h & 0xFFFF) as f32 / 65535.0
}

fn hash_range(seed: u32, channel: u32, min: f32, max: f32) -> f32 {
    min + hash01(seed, channel) * (max - min)
}
