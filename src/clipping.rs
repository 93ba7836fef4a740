//! Clipping engine — constrains drawing to the selection polygon(s), or
//! their inverse.
//!
//! A [`ClipMask`] is the rasterized clip path of a selection: every shape is
//! traced move/line-to style (each point offset by the destination top-left
//! and optionally remapped by an [`OverrideConfig`] in preview mode) and
//! filled with the **nonzero winding rule**. When the selection is
//! inverted, a full-canvas counter-rectangle traced in the opposite winding
//! is appended per shape, so the nonzero fill excludes rather than includes
//! the interior.

use egui::Pos2;

use crate::lowres::OverrideConfig;
use crate::shapes::Selection;

/// Rasterized clip region. All drawing that honors the mask is constrained
/// until the mask is dropped.
pub struct ClipMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ClipMask {
    /// Build the clip mask for a selection, transformed to destination
    /// coordinates. `offset` is the destination top-left the selection
    /// points are shifted by (layer bounds relative to the viewport).
    pub fn from_selection(
        width: u32,
        height: u32,
        selection: &Selection,
        offset_x: f32,
        offset_y: f32,
        invert: bool,
        override_config: Option<&OverrideConfig>,
    ) -> Self {
        let (scale, vp_x, vp_y) = match override_config {
            Some(cfg) => (cfg.scale, cfg.vp_x, cfg.vp_y),
            None => (1.0, 0.0, 0.0),
        };

        let mut rings: Vec<Vec<Pos2>> = Vec::new();
        for shape in selection {
            if shape.len() < 3 {
                continue; // malformed: treated as "not closed", no-op
            }
            let ring: Vec<Pos2> = shape
                .iter()
                .map(|p| {
                    egui::pos2(
                        ((p.x - offset_x) * scale) - vp_x,
                        ((p.y - offset_y) * scale) - vp_y,
                    )
                })
                .collect();
            if invert {
                // counter-rectangle wound against the shape so the nonzero
                // rule cancels the interior
                let counter = counter_rectangle(width as f32, height as f32, signed_area(&ring));
                rings.push(counter);
            }
            rings.push(ring);
        }

        let mut mask = Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize)],
        };
        mask.rasterize(&rings);
        mask
    }

    /// A mask covering the full canvas (no constraint).
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![255; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize] != 0
    }

    /// Scanline fill of all rings under the nonzero winding rule.
    fn rasterize(&mut self, rings: &[Vec<Pos2>]) {
        let w = self.width as usize;
        for y in 0..self.height {
            let yf = y as f32 + 0.5; // pixel row centre

            // (x-intercept, winding direction) of every edge crossing this row
            let mut nodes: Vec<(f32, i32)> = Vec::new();
            for ring in rings {
                let n = ring.len();
                for i in 0..n {
                    let a = ring[i];
                    let b = ring[(i + 1) % n];
                    if (a.y <= yf && b.y > yf) || (b.y <= yf && a.y > yf) {
                        let t = (yf - a.y) / (b.y - a.y);
                        let x = a.x + t * (b.x - a.x);
                        nodes.push((x, if b.y > a.y { 1 } else { -1 }));
                    }
                }
            }
            nodes.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut winding = 0;
            for pair in nodes.windows(2) {
                winding += pair[0].1;
                if winding != 0 {
                    let x_start = (pair[0].0.max(0.0).round() as usize).min(w);
                    let x_end = (pair[1].0.max(0.0).round() as usize).min(w);
                    let row = y as usize * w;
                    for x in x_start..x_end {
                        self.data[row + x] = 255;
                    }
                }
            }
        }
    }
}

fn signed_area(ring: &[Pos2]) -> f32 {
    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        area += a.x * b.y - b.x * a.y;
    }
    area * 0.5
}

/// Full-canvas rectangle ring wound opposite to the given shape area.
fn counter_rectangle(width: f32, height: f32, shape_area: f32) -> Vec<Pos2> {
    let cw = if shape_area > 0.0 {
        // shape is counter-clockwise in screen space; wind clockwise
        vec![
            egui::pos2(0.0, 0.0),
            egui::pos2(0.0, height),
            egui::pos2(width, height),
            egui::pos2(width, 0.0),
        ]
    } else {
        vec![
            egui::pos2(0.0, 0.0),
            egui::pos2(width, 0.0),
            egui::pos2(width, height),
            egui::pos2(0.0, height),
        ]
    };
    cw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::rectangle_to_shape;

    #[test]
    fn mask_covers_selection_interior() {
        let selection = vec![rectangle_to_shape(10.0, 10.0, 4.0, 4.0)];
        let mask = ClipMask::from_selection(20, 20, &selection, 0.0, 0.0, false, None);
        assert!(mask.contains(9, 9));
        assert!(!mask.contains(1, 1));
        assert!(!mask.contains(16, 16));
    }

    #[test]
    fn inverted_mask_excludes_interior() {
        let selection = vec![rectangle_to_shape(10.0, 10.0, 4.0, 4.0)];
        let mask = ClipMask::from_selection(20, 20, &selection, 0.0, 0.0, true, None);
        assert!(!mask.contains(9, 9));
        assert!(mask.contains(1, 1));
        assert!(mask.contains(16, 16));
    }

    #[test]
    fn offset_shifts_the_mask() {
        let selection = vec![rectangle_to_shape(10.0, 10.0, 4.0, 4.0)];
        // destination offset of (4, 4) moves the region to the origin
        let mask = ClipMask::from_selection(20, 20, &selection, 4.0, 4.0, false, None);
        assert!(mask.contains(1, 1));
        assert!(!mask.contains(12, 12));
    }

    #[test]
    fn degenerate_shape_yields_empty_mask() {
        let selection = vec![vec![egui::pos2(1.0, 1.0), egui::pos2(2.0, 2.0)]];
        let mask = ClipMask::from_selection(8, 8, &selection, 0.0, 0.0, false, None);
        for y in 0..8 {
            for x in 0..8 {
                assert!(!mask.contains(x, y));
            }
        }
    }

    #[test]
    fn override_config_rescales_points() {
        let selection = vec![rectangle_to_shape(10.0, 10.0, 0.0, 0.0)];
        let cfg = OverrideConfig {
            scale: 0.5,
            zoom: 1.0,
            vp_x: 0.0,
            vp_y: 0.0,
            pointers: Vec::new(),
        };
        let mask = ClipMask::from_selection(20, 20, &selection, 0.0, 0.0, false, Some(&cfg));
        assert!(mask.contains(2, 2));
        assert!(!mask.contains(7, 7));
    }
}
