//! Owned RGBA raster surface — the pixel substrate every engine component
//! draws into.
//!
//! A [`Surface`] wraps a flat [`RgbaImage`] and adds the small set of
//! composite operations the paint pipeline needs: straight-alpha
//! source-over, `destination-in` masking (clone stamp) and
//! `destination-out` erasing. Colors are stored straight (unpremultiplied);
//! the blend engine premultiplies internally where its math requires it.

use egui::Rect;
use image::{Rgba, RgbaImage};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Porter-Duff composite operator subset used by the paint pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Standard paint: source over destination.
    #[default]
    SourceOver,
    /// Keep destination only where the source has coverage (masking).
    DestinationIn,
    /// Remove destination where the source has coverage (erasing).
    DestinationOut,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    img: RgbaImage,
}

impl Surface {
    /// Create a fully transparent surface. Zero dimensions are clamped to 1
    /// so pooled buffers can always deflate to a valid 1×1 allocation.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut s = Self::new(width, height);
        if color[3] > 0 {
            s.fill(color);
        }
        s
    }

    pub fn from_image(img: RgbaImage) -> Self {
        Self { img }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.img
    }

    pub fn into_image(self) -> RgbaImage {
        self.img
    }

    pub fn as_raw(&self) -> &[u8] {
        self.img.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        // image 0.24 exposes the raw buffer through DerefMut
        &mut *self.img
    }

    /// Bounds as a float rect anchored at the origin.
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(
            egui::pos2(0.0, 0.0),
            egui::vec2(self.width() as f32, self.height() as f32),
        )
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.img.get_pixel(x, y)
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        self.img.put_pixel(x, y, pixel);
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.img.pixels_mut() {
            *px = color;
        }
    }

    pub fn clear(&mut self) {
        self.fill(Rgba([0, 0, 0, 0]));
    }

    /// Reallocate to the given size, discarding contents. Used by pooled
    /// buffers; passing 1×1 deflates the allocation to its minimal footprint.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.width() == width && self.height() == height {
            self.clear();
        } else {
            self.img = RgbaImage::new(width, height);
        }
    }

    /// Straight-alpha source-over of a single pixel.
    pub fn blend_pixel(&mut self, x: u32, y: u32, src: Rgba<u8>, alpha: f32) {
        let sa = (src[3] as f32 / 255.0) * alpha.clamp(0.0, 1.0);
        if sa <= 0.0 {
            return;
        }
        let dst = self.img.get_pixel_mut(x, y);
        let da = dst[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            *dst = Rgba([0, 0, 0, 0]);
            return;
        }
        for c in 0..3 {
            let s = src[c] as f32 / 255.0;
            let d = dst[c] as f32 / 255.0;
            let out = (s * sa + d * da * (1.0 - sa)) / out_a;
            dst[c] = (out * 255.0).clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).clamp(0.0, 255.0) as u8;
    }

    /// Copy a rectangular region out of the surface. Out-of-range pixels
    /// read as transparent.
    pub fn extract_region(&self, rx: i32, ry: i32, rw: u32, rh: u32) -> Surface {
        let mut out = Surface::new(rw, rh);
        for y in 0..rh {
            let sy = ry + y as i32;
            if sy < 0 || sy as u32 >= self.height() {
                continue;
            }
            for x in 0..rw {
                let sx = rx + x as i32;
                if sx < 0 || sx as u32 >= self.width() {
                    continue;
                }
                out.put_pixel(x, y, self.get_pixel(sx as u32, sy as u32));
            }
        }
        out
    }

    /// Draw `src` onto `self` at the given offset using the composite
    /// operator, with a global alpha applied to the source coverage.
    ///
    /// `DestinationIn` visits every destination pixel, not just the source
    /// rect: pixels the (offset) source does not cover have zero coverage
    /// and are cleared.
    pub fn draw_surface(&mut self, src: &Surface, dst_x: i32, dst_y: i32, alpha: f32, op: CompositeOp) {
        let alpha = alpha.clamp(0.0, 1.0);
        if op == CompositeOp::DestinationIn {
            for y in 0..self.height() {
                for x in 0..self.width() {
                    let sx = x as i32 - dst_x;
                    let sy = y as i32 - dst_y;
                    let cov = if sx >= 0
                        && sy >= 0
                        && (sx as u32) < src.width()
                        && (sy as u32) < src.height()
                    {
                        (src.get_pixel(sx as u32, sy as u32)[3] as f32 / 255.0) * alpha
                    } else {
                        0.0
                    };
                    let d = self.img.get_pixel_mut(x, y);
                    d[3] = ((d[3] as f32 / 255.0) * cov * 255.0).clamp(0.0, 255.0) as u8;
                }
            }
            return;
        }
        for y in 0..src.height() {
            let ty = dst_y + y as i32;
            if ty < 0 || ty as u32 >= self.height() {
                continue;
            }
            for x in 0..src.width() {
                let tx = dst_x + x as i32;
                if tx < 0 || tx as u32 >= self.width() {
                    continue;
                }
                let s = src.get_pixel(x, y);
                match op {
                    CompositeOp::SourceOver => {
                        self.blend_pixel(tx as u32, ty as u32, s, alpha);
                    }
                    _ => {
                        let sa = (s[3] as f32 / 255.0) * alpha;
                        let d = self.img.get_pixel_mut(tx as u32, ty as u32);
                        let a = (d[3] as f32 / 255.0) * (1.0 - sa);
                        d[3] = (a * 255.0).clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    }

    /// Draw `src` scaled into the destination rectangle (nearest-neighbor).
    /// Used to project the low-res preview onto the full-resolution output,
    /// source-over for paint and destination-out for the eraser.
    pub fn draw_surface_scaled(&mut self, src: &Surface, dst_x: f32, dst_y: f32, dst_w: f32, dst_h: f32, alpha: f32, op: CompositeOp) {
        if dst_w <= 0.0 || dst_h <= 0.0 {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        let x0 = dst_x.floor().max(0.0) as i64;
        let y0 = dst_y.floor().max(0.0) as i64;
        let x1 = ((dst_x + dst_w).ceil() as i64).min(self.width() as i64);
        let y1 = ((dst_y + dst_h).ceil() as i64).min(self.height() as i64);
        for ty in y0..y1 {
            let v = (ty as f32 - dst_y) / dst_h;
            let sy = (v * src.height() as f32) as i64;
            if sy < 0 || sy >= src.height() as i64 {
                continue;
            }
            for tx in x0..x1 {
                let u = (tx as f32 - dst_x) / dst_w;
                let sx = (u * src.width() as f32) as i64;
                if sx < 0 || sx >= src.width() as i64 {
                    continue;
                }
                let s = src.get_pixel(sx as u32, sy as u32);
                match op {
                    CompositeOp::SourceOver => {
                        self.blend_pixel(tx as u32, ty as u32, s, alpha);
                    }
                    _ => {
                        let sa = (s[3] as f32 / 255.0) * alpha;
                        let keep = match op {
                            CompositeOp::DestinationIn => sa,
                            _ => 1.0 - sa,
                        };
                        let d = self.img.get_pixel_mut(tx as u32, ty as u32);
                        d[3] = ((d[3] as f32 / 255.0) * keep * 255.0).clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    }

    /// Replace contents with a resized canvas, re-centering the existing
    /// pixels on the dimension delta. Keeps the raster dimensions in sync
    /// with a layer's logical width/height after a resize.
    pub fn resize_centered(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width() && height == self.height() {
            return;
        }
        let dx = (width as i32 - self.width() as i32) / 2;
        let dy = (height as i32 - self.height() as i32) / 2;
        let mut out = RgbaImage::new(width, height);
        for (x, y, px) in self.img.enumerate_pixels() {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx >= 0 && ny >= 0 && (nx as u32) < width && (ny as u32) < height {
                out.put_pixel(nx as u32, ny as u32, *px);
            }
        }
        self.img = out;
    }

    pub fn memory_bytes(&self) -> usize {
        self.img.as_raw().len()
    }
}

// Byte-based serde representation, so the document model round-trips
// without exposing the image crate's types in the wire format.

impl Serialize for Surface {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Surface", 3)?;
        state.serialize_field("width", &self.width())?;
        state.serialize_field("height", &self.height())?;
        state.serialize_field("data", self.as_raw())?;
        state.end()
    }
}

#[derive(Deserialize)]
struct RawSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl<'de> Deserialize<'de> for Surface {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawSurface::deserialize(deserializer)?;
        let img = RgbaImage::from_raw(raw.width, raw.height, raw.data)
            .ok_or_else(|| D::Error::custom("pixel buffer does not match dimensions"))?;
        Ok(Surface { img })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_over_onto_transparent_copies_source() {
        let mut s = Surface::new(4, 4);
        s.blend_pixel(1, 1, Rgba([200, 100, 50, 255]), 1.0);
        assert_eq!(s.get_pixel(1, 1), Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn destination_out_erases_coverage() {
        let mut dst = Surface::new_filled(2, 2, Rgba([10, 20, 30, 255]));
        let eraser = Surface::new_filled(2, 2, Rgba([0, 0, 0, 255]));
        dst.draw_surface(&eraser, 0, 0, 1.0, CompositeOp::DestinationOut);
        assert_eq!(dst.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn destination_in_keeps_masked_area_only() {
        let mut dst = Surface::new_filled(2, 1, Rgba([10, 20, 30, 255]));
        let mut mask = Surface::new(2, 1);
        mask.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        dst.draw_surface(&mask, 0, 0, 1.0, CompositeOp::DestinationIn);
        assert_eq!(dst.get_pixel(0, 0)[3], 255);
        assert_eq!(dst.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn destination_in_clears_outside_an_offset_source() {
        let mut dst = Surface::new_filled(8, 8, Rgba([10, 20, 30, 255]));
        let mask = Surface::new_filled(8, 8, Rgba([0, 0, 0, 255]));
        dst.draw_surface(&mask, 4, 0, 1.0, CompositeOp::DestinationIn);
        // the band the shifted mask does not cover is cleared
        assert_eq!(dst.get_pixel(1, 1)[3], 0);
        assert_eq!(dst.get_pixel(5, 1)[3], 255);
    }

    #[test]
    fn resize_centered_keeps_content_centered() {
        let mut s = Surface::new(4, 4);
        s.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
        s.resize_centered(8, 8);
        assert_eq!(s.get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(s.width(), 8);
    }
}
