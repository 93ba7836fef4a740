//! Blend engine — per-pixel compositing of a fully rendered layer buffer
//! onto the accumulated document buffer under a selectable mode.
//!
//! The math follows the classic premultiplied formulation: both pixels are
//! unpremultiplied by their own alpha, new coverage is
//! `a' = sA + dA − sA·dA`, and the RGB result is weighted by
//! `f1 = dA·sA` (both contribute), `f2 = dA·(1−sA)` (destination only) and
//! `f3 = sA·(1−dA)` (source only). The Lighter/Darker Color modes compare
//! whole pixels using the perceptual-luma weighting `2.623·Δr + 5.15·Δg + Δb`
//! — the coefficients are kept verbatim for output compatibility.
//!
//! Normal is pass-through and is handled by the compositor, not here.

use egui::Rect;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::surface::Surface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Screen,
    Multiply,
    Difference,
    LinearDodge,
    Overlay,
    HardLight,
    ColorDodge,
    ColorBurn,
    Darken,
    Lighten,
    Exclusion,
    SoftLight,
    Luminosity,
    Color,
    Hue,
    Saturation,
    LighterColor,
    DarkerColor,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Screen,
            BlendMode::Multiply,
            BlendMode::Difference,
            BlendMode::LinearDodge,
            BlendMode::Overlay,
            BlendMode::HardLight,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::Exclusion,
            BlendMode::SoftLight,
            BlendMode::Luminosity,
            BlendMode::Color,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::LighterColor,
            BlendMode::DarkerColor,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Screen => "Screen",
            BlendMode::Multiply => "Multiply",
            BlendMode::Difference => "Difference",
            BlendMode::LinearDodge => "Linear Dodge",
            BlendMode::Overlay => "Overlay",
            BlendMode::HardLight => "Hard Light",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::Darken => "Darken",
            BlendMode::Lighten => "Lighten",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Luminosity => "Luminosity",
            BlendMode::Color => "Color",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::LighterColor => "Lighter Color",
            BlendMode::DarkerColor => "Darker Color",
        }
    }
}

/// Blend `source` (this layer, fully rendered) onto `dest` (the buffer
/// below) in place. Both buffers must share dimensions; mismatched input is
/// logged and skipped. `bounds` restricts the operation, defaulting to the
/// full buffer.
pub fn blend_layer(dest: &mut Surface, source: &Surface, mode: BlendMode, bounds: Option<Rect>) {
    if dest.width() != source.width() || dest.height() != source.height() {
        crate::log_warn!(
            "blend_layer: buffer size mismatch {}x{} vs {}x{}, skipping",
            dest.width(),
            dest.height(),
            source.width(),
            source.height()
        );
        return;
    }
    let width = dest.width() as usize;
    let height = dest.height();

    let (min_x, min_y, max_x, max_y) = match bounds {
        Some(r) => (
            r.left().floor().max(0.0) as usize,
            r.top().floor().max(0.0) as u32,
            (r.right().ceil() as usize).min(width),
            (r.bottom().ceil() as u32).min(height),
        ),
        None => (0, 0, width, height),
    };
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let stride = width * 4;
    let src_raw = source.as_raw();

    dest.as_raw_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(min_y as usize)
        .take((max_y - min_y) as usize)
        .for_each(|(y, dst_row)| {
            let src_row = &src_raw[y * stride..(y + 1) * stride];
            for x in min_x..max_x {
                let o = x * 4;
                blend_px(
                    &mut dst_row[o..o + 4],
                    &src_row[o..o + 4],
                    mode,
                );
            }
        });
}

fn blend_px(dst: &mut [u8], src: &[u8], mode: BlendMode) {
    let s_a = src[3] as f32 / 255.0;
    if s_a <= 0.0 {
        return; // fully transparent source contributes nothing
    }
    let d_a = dst[3] as f32 / 255.0;
    let out_a = s_a + d_a - s_a * d_a;

    let r1 = dst[0] as f32;
    let g1 = dst[1] as f32;
    let b1 = dst[2] as f32;
    let r2 = src[0] as f32;
    let g2 = src[1] as f32;
    let b2 = src[2] as f32;

    // premultiplied components in 0..1 range
    let s_ra = r2 / 255.0 * s_a;
    let d_ra = r1 / 255.0 * d_a;
    let s_ga = g2 / 255.0 * s_a;
    let d_ga = g1 / 255.0 * d_a;
    let s_ba = b2 / 255.0 * s_a;
    let d_ba = b1 / 255.0 * d_a;

    let demultiply = if out_a > 0.0 { 255.0 / out_a } else { 0.0 };

    let f1 = d_a * s_a;
    let f2 = d_a - f1;
    let f3 = s_a - f1;

    let (out_r, out_g, out_b) = match mode {
        BlendMode::Normal => (
            (s_ra + d_ra - d_ra * s_a) * demultiply,
            (s_ga + d_ga - d_ga * s_a) * demultiply,
            (s_ba + d_ba - d_ba * s_a) * demultiply,
        ),
        BlendMode::Screen => (
            (s_ra + d_ra - s_ra * d_ra) * demultiply,
            (s_ga + d_ga - s_ga * d_ga) * demultiply,
            (s_ba + d_ba - s_ba * d_ba) * demultiply,
        ),
        BlendMode::Multiply => (
            (s_ra * d_ra + s_ra * (1.0 - d_a) + d_ra * (1.0 - s_a)) * demultiply,
            (s_ga * d_ga + s_ga * (1.0 - d_a) + d_ga * (1.0 - s_a)) * demultiply,
            (s_ba * d_ba + s_ba * (1.0 - d_a) + d_ba * (1.0 - s_a)) * demultiply,
        ),
        BlendMode::Difference => (
            (s_ra + d_ra - 2.0 * (s_ra * d_a).min(d_ra * s_a)) * demultiply,
            (s_ga + d_ga - 2.0 * (s_ga * d_a).min(d_ga * s_a)) * demultiply,
            (s_ba + d_ba - 2.0 * (s_ba * d_a).min(d_ba * s_a)) * demultiply,
        ),
        BlendMode::LinearDodge => (
            (s_ra + d_ra).min(1.0) * demultiply,
            (s_ga + d_ga).min(1.0) * demultiply,
            (s_ba + d_ba).min(1.0) * demultiply,
        ),
        BlendMode::Lighten => (
            d_ra.max(s_ra) * demultiply,
            d_ga.max(s_ga) * demultiply,
            d_ba.max(s_ba) * demultiply,
        ),
        BlendMode::Exclusion => (
            (d_ra + s_ra - 2.0 * d_ra * s_ra) * demultiply,
            (d_ga + s_ga - 2.0 * d_ga * s_ga) * demultiply,
            (d_ba + s_ba - 2.0 * d_ba * s_ba) * demultiply,
        ),
        BlendMode::Overlay => (
            f1 * blend_overlay(r1, r2) + f2 * r1 + f3 * r2,
            f1 * blend_overlay(g1, g2) + f2 * g1 + f3 * g2,
            f1 * blend_overlay(b1, b2) + f2 * b1 + f3 * b2,
        ),
        BlendMode::HardLight => (
            f1 * blend_overlay(r2, r1) + f2 * r1 + f3 * r2,
            f1 * blend_overlay(g2, g1) + f2 * g1 + f3 * g2,
            f1 * blend_overlay(b2, b1) + f2 * b1 + f3 * b2,
        ),
        BlendMode::ColorDodge => (
            f1 * blend_dodge(r1, r2) + f2 * r1 + f3 * r2,
            f1 * blend_dodge(g1, g2) + f2 * g1 + f3 * g2,
            f1 * blend_dodge(b1, b2) + f2 * b1 + f3 * b2,
        ),
        BlendMode::ColorBurn => (
            f1 * blend_burn(r1, r2) + f2 * r1 + f3 * r2,
            f1 * blend_burn(g1, g2) + f2 * g1 + f3 * g2,
            f1 * blend_burn(b1, b2) + f2 * b1 + f3 * b2,
        ),
        BlendMode::Darken => (
            f1 * r1.min(r2) + f2 * r1 + f3 * r2,
            f1 * g1.min(g2) + f2 * g1 + f3 * g2,
            f1 * b1.min(b2) + f2 * b1 + f3 * b2,
        ),
        BlendMode::SoftLight => (
            f1 * blend_soft_light(r1, r2) + f2 * r1 + f3 * r2,
            f1 * blend_soft_light(g1, g2) + f2 * g1 + f3 * g2,
            f1 * blend_soft_light(b1, b2) + f2 * b1 + f3 * b2,
        ),
        BlendMode::Luminosity => {
            let d = rgb_to_ycbcr(r1, g1, b1);
            let s = rgb_to_ycbcr(r2, g2, b2);
            let rgb = ycbcr_to_rgb(s.0, d.1, d.2);
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
        BlendMode::Color => {
            let d = rgb_to_ycbcr(r1, g1, b1);
            let s = rgb_to_ycbcr(r2, g2, b2);
            let rgb = ycbcr_to_rgb(d.0, s.1, s.2);
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
        BlendMode::Hue => {
            let d = rgb_to_hsv(r1, g1, b1);
            let s = rgb_to_hsv(r2, g2, b2);
            let rgb = hsv_to_rgb(s.0, d.1, d.2);
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
        BlendMode::Saturation => {
            let d = rgb_to_hsv(r1, g1, b1);
            let s = rgb_to_hsv(r2, g2, b2);
            let rgb = hsv_to_rgb(d.0, s.1, d.2);
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
        BlendMode::LighterColor => {
            // whole-pixel perceptual-luma comparison, not per-channel
            let rgb = if 2.623 * (r1 - r2) + 5.15 * (g1 - g2) + b1 - b2 > 0.0 {
                (r1, g1, b1)
            } else {
                (r2, g2, b2)
            };
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
        BlendMode::DarkerColor => {
            let rgb = if 2.623 * (r1 - r2) + 5.15 * (g1 - g2) + b1 - b2 < 0.0 {
                (r1, g1, b1)
            } else {
                (r2, g2, b2)
            };
            weighted(rgb, (r1, g1, b1), (r2, g2, b2), f1, f2, f3)
        }
    };

    dst[0] = out_r.clamp(0.0, 255.0) as u8;
    dst[1] = out_g.clamp(0.0, 255.0) as u8;
    dst[2] = out_b.clamp(0.0, 255.0) as u8;
    dst[3] = (out_a * 255.0).clamp(0.0, 255.0) as u8;
}

#[inline]
fn weighted(
    rgb: (f32, f32, f32),
    dst: (f32, f32, f32),
    src: (f32, f32, f32),
    f1: f32,
    f2: f32,
    f3: f32,
) -> (f32, f32, f32) {
    (
        f1 * rgb.0 + f2 * dst.0 + f3 * src.0,
        f1 * rgb.1 + f2 * dst.1 + f3 * src.1,
        f1 * rgb.2 + f2 * dst.2 + f3 * src.2,
    )
}

// Channel helpers operate in the 0..255 range, mirroring the integer
// shift arithmetic of the reference formulas.

#[inline]
fn blend_overlay(a: f32, b: f32) -> f32 {
    if a < 128.0 {
        (a * b) / 128.0
    } else {
        255.0 - ((255.0 - b) * (255.0 - a)) / 128.0
    }
}

#[inline]
fn blend_dodge(a: f32, b: f32) -> f32 {
    if b >= 255.0 {
        255.0
    } else {
        ((a * 256.0) / (255.0 - b)).min(255.0)
    }
}

#[inline]
fn blend_burn(a: f32, b: f32) -> f32 {
    if b <= 0.0 {
        0.0
    } else {
        255.0 - (((255.0 - a) * 256.0) / b).min(255.0)
    }
}

#[inline]
fn blend_soft_light(a: f32, b: f32) -> f32 {
    let b2 = b * 2.0;
    if b < 128.0 {
        (a * (b2 + (a * (255.0 - b2)) / 256.0)) / 256.0
    } else {
        (a * (511.0 - b2) + (a * 256.0).sqrt() * (b2 - 255.0)) / 256.0
    }
}

// Luma + chroma round trip (BT.601 YCbCr over the 0..255 range).

#[inline]
fn rgb_to_ycbcr(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    (
        0.2990 * r + 0.5870 * g + 0.1140 * b,
        -0.1687 * r - 0.3313 * g + 0.5000 * b,
        0.5000 * r - 0.4187 * g - 0.0813 * b,
    )
}

#[inline]
fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> (f32, f32, f32) {
    (
        y + 1.4020 * cr,
        y - 0.3441 * cb - 0.7141 * cr,
        y + 1.7720 * cb,
    )
}

/// Polar chroma form: hue is the chroma angle, saturation its magnitude,
/// value the luma.
#[inline]
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let (y, cb, cr) = rgb_to_ycbcr(r, g, b);
    let s = (cb * cb + cr * cr).sqrt();
    let h = cb.atan2(cr);
    (h, s, y)
}

#[inline]
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let cb = s * h.sin();
    let cr = s * h.cos();
    ycbcr_to_rgb(v, cb, cr)
}

// ============================================================================
// BLEND SCRATCH POOL
// ============================================================================

/// Pooled full-canvas scratch surface used to render a layer before
/// blending it. Deflated to 1×1 when released to keep the footprint
/// minimal between composites.
#[derive(Default)]
pub struct BlendScratch {
    surface: Option<Surface>,
}

impl BlendScratch {
    pub fn acquire(&mut self, width: u32, height: u32) -> &mut Surface {
        let s = self
            .surface
            .get_or_insert_with(|| Surface::new(width, height));
        s.set_dimensions(width, height);
        s
    }

    pub fn release(&mut self) {
        if let Some(s) = self.surface.as_mut() {
            s.set_dimensions(1, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn transparent_source_leaves_destination_unchanged_for_all_modes() {
        for &mode in BlendMode::all() {
            let mut dest = Surface::new(4, 4);
            dest.put_pixel(1, 1, Rgba([120, 80, 200, 180]));
            dest.put_pixel(2, 3, Rgba([3, 250, 17, 255]));
            let expected = dest.clone();
            let source = Surface::new(4, 4);
            blend_layer(&mut dest, &source, mode, None);
            assert!(dest == expected, "mode {:?} altered the destination", mode);
        }
    }

    #[test]
    fn multiply_opaque_black_yields_black() {
        let mut dest = Surface::new_filled(2, 2, Rgba([200, 200, 200, 255]));
        let source = Surface::new_filled(2, 2, Rgba([0, 0, 0, 255]));
        blend_layer(&mut dest, &source, BlendMode::Multiply, None);
        let px = dest.get_pixel(0, 0);
        assert_eq!(px, Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn screen_opaque_white_yields_white() {
        let mut dest = Surface::new_filled(2, 2, Rgba([10, 20, 30, 255]));
        let source = Surface::new_filled(2, 2, Rgba([255, 255, 255, 255]));
        blend_layer(&mut dest, &source, BlendMode::Screen, None);
        assert_eq!(dest.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn lighter_color_picks_whole_pixel() {
        let mut dest = Surface::new_filled(1, 1, Rgba([250, 10, 10, 255]));
        let source = Surface::new_filled(1, 1, Rgba([10, 250, 10, 255]));
        blend_layer(&mut dest, &source, BlendMode::LighterColor, None);
        // green side wins the 2.623/5.15/1 weighting; pixel is taken whole
        assert_eq!(dest.get_pixel(0, 0), Rgba([10, 250, 10, 255]));
    }

    #[test]
    fn bounds_restrict_the_blend() {
        let mut dest = Surface::new_filled(4, 4, Rgba([100, 100, 100, 255]));
        let source = Surface::new_filled(4, 4, Rgba([0, 0, 0, 255]));
        let bounds = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(2.0, 2.0));
        blend_layer(&mut dest, &source, BlendMode::Multiply, Some(bounds));
        assert_eq!(dest.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(dest.get_pixel(3, 3), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn coverage_accumulates() {
        let mut dest = Surface::new_filled(1, 1, Rgba([100, 100, 100, 128]));
        let source = Surface::new_filled(1, 1, Rgba([50, 50, 50, 128]));
        blend_layer(&mut dest, &source, BlendMode::Multiply, None);
        let a = dest.get_pixel(0, 0)[3] as f32 / 255.0;
        let expect = 0.50196 + 0.50196 - 0.50196 * 0.50196;
        assert!((a - expect).abs() < 0.02);
    }
}
