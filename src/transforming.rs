//! Non-destructive layer transforms.
//!
//! [`apply_transformation`] composes the affine matrix that places a layer's
//! source on screen with its mirror, scale and rotation effects applied.
//! [`reverse_transformation`] composes the inverse sequence so on-screen
//! edits land on the correct spot in the untransformed source.

use egui::Rect;
use kurbo::Affine;

use crate::document::Layer;
use crate::shapes::{get_rotation_center, scale_rectangle};

/// A composed transform: the affine matrix plus the layer's bounding
/// rectangle after transformation.
#[derive(Clone, Copy, Debug)]
pub struct LayerTransform {
    pub matrix: Affine,
    pub bounds: Rect,
}

impl LayerTransform {
    /// Map a point through the matrix.
    pub fn apply(&self, p: egui::Pos2) -> egui::Pos2 {
        let out = self.matrix * kurbo::Point::new(p.x as f64, p.y as f64);
        egui::pos2(out.x as f32, out.y as f32)
    }
}

/// Compose the on-screen transform for a layer. Returns `None` when the
/// effects are identity, signalling the caller to take the untransformed
/// fast path.
pub fn apply_transformation(layer: &Layer, viewport: Rect) -> Option<LayerTransform> {
    let effects = layer.effects;
    if effects.is_identity() {
        return None;
    }

    let mut bounds = layer.rect();
    let mut m = Affine::IDENTITY;

    // 1. offset for the viewport pan position (outermost, so it is not
    // affected by the layer-space transforms below)
    m *= Affine::translate((-viewport.min.x as f64, -viewport.min.y as f64));

    // 2. scale, about the bounds center so the scaled bounds stay usable
    // for viewport pan math
    if effects.is_scaled() {
        bounds = scale_rectangle(bounds, effects.scale);
        let c = get_rotation_center(bounds);
        m *= Affine::translate((c.x as f64, c.y as f64))
            * Affine::scale(effects.scale as f64)
            * Affine::translate((-c.x as f64, -c.y as f64));
    }

    let width = bounds.width();
    let height = bounds.height();

    // 3. mirror, negating the matching bounds coordinate so interactions
    // with the inverted axes feel natural
    if effects.is_mirrored() {
        let sx = if effects.mirror_x { -1.0 } else { 1.0 };
        let sy = if effects.mirror_y { -1.0 } else { 1.0 };
        m *= Affine::scale_non_uniform(sx, sy);
        m *= Affine::translate((
            if effects.mirror_x { -width as f64 } else { 0.0 },
            if effects.mirror_y { -height as f64 } else { 0.0 },
        ));
        let mut min = bounds.min;
        if effects.mirror_x {
            min.x = -min.x;
        }
        if effects.mirror_y {
            min.y = -min.y;
        }
        bounds = Rect::from_min_size(min, egui::vec2(width, height));
    }

    // 4. rotation about the bounds center
    if effects.is_rotated() {
        let c = get_rotation_center(bounds);
        let angle = if effects.mirror_x {
            -effects.rotation
        } else {
            effects.rotation
        };
        m *= Affine::translate((c.x as f64, c.y as f64))
            * Affine::rotate(angle as f64)
            * Affine::translate((-c.x as f64, -c.y as f64));
    }

    // the matrix lands in viewport space, so the bounds do too
    let bounds = bounds.translate(-viewport.min.to_vec2());

    Some(LayerTransform { matrix: m, bounds })
}

/// Compose the inverse sequence for drawing onto the source of a
/// transformed layer: unmirror, unrotate, unscale.
pub fn reverse_transformation(layer: &Layer) -> Option<LayerTransform> {
    let effects = layer.effects;
    if effects.is_identity() {
        return None;
    }

    let mut bounds = layer.rect();
    let width = bounds.width();
    let height = bounds.height();
    let mut m = Affine::IDENTITY;

    // 1. mirror
    if effects.is_mirrored() {
        let sx = if effects.mirror_x { -1.0 } else { 1.0 };
        let sy = if effects.mirror_y { -1.0 } else { 1.0 };
        m *= Affine::scale_non_uniform(sx, sy);
        m *= Affine::translate((
            if effects.mirror_x { -width as f64 } else { 0.0 },
            if effects.mirror_y { -height as f64 } else { 0.0 },
        ));
    }

    // 2. rotation, negated relative to the forward pass
    if effects.is_rotated() {
        let tx = (width * 0.5) as f64;
        let ty = (height * 0.5) as f64;
        let angle = if effects.mirror_y {
            effects.rotation
        } else {
            -effects.rotation
        };
        m *= Affine::translate((tx, ty)) * Affine::rotate(angle as f64) * Affine::translate((-tx, -ty));
    }

    // 3. scale
    if effects.is_scaled() {
        m *= Affine::scale(1.0 / effects.scale as f64);
        let scaled = scale_rectangle(bounds, effects.scale);
        bounds = Rect::from_min_size(
            egui::pos2(
                bounds.min.x - (scaled.width() - width) * 0.5,
                bounds.min.y - (scaled.height() - height) * 0.5,
            ),
            egui::vec2(width, height),
        );
    }

    Some(LayerTransform { matrix: m, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Layer;

    fn viewport() -> Rect {
        Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(640.0, 480.0))
    }

    #[test]
    fn identity_effects_skip_the_transform_path() {
        let layer = Layer::new("flat", 100, 100);
        assert!(apply_transformation(&layer, viewport()).is_none());
        assert!(reverse_transformation(&layer).is_none());
    }

    #[test]
    fn scale_grows_bounds_around_the_center() {
        let mut layer = Layer::new("scaled", 100, 100);
        layer.effects.scale = 2.0;
        let t = apply_transformation(&layer, viewport()).unwrap();
        assert_eq!(t.bounds.min, egui::pos2(-50.0, -50.0));
        assert_eq!(t.bounds.size(), egui::vec2(200.0, 200.0));
        // source corner lands on the scaled bounds corner
        let p = t.apply(egui::pos2(0.0, 0.0));
        assert!((p.x + 50.0).abs() < 1e-3 && (p.y + 50.0).abs() < 1e-3);
    }

    #[test]
    fn mirror_x_negates_the_bounds_coordinate() {
        let mut layer = Layer::new("mirrored", 100, 50);
        layer.left = 30.0;
        layer.effects.mirror_x = true;
        let t = apply_transformation(&layer, viewport()).unwrap();
        assert_eq!(t.bounds.min.x, -30.0);
        // left edge maps to the right edge
        let p = t.apply(egui::pos2(0.0, 10.0));
        assert!((p.x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn rotation_round_trips_through_reverse() {
        let mut layer = Layer::new("rotated", 100, 100);
        layer.effects.rotation = 0.7;
        let fwd = apply_transformation(&layer, viewport()).unwrap();
        let rev = reverse_transformation(&layer).unwrap();
        let p = egui::pos2(10.0, 20.0);
        let round = rev.apply(fwd.apply(p));
        assert!((round.x - p.x).abs() < 1e-3);
        assert!((round.y - p.y).abs() < 1e-3);
    }

    #[test]
    fn reverse_scale_offsets_bounds_by_half_the_delta() {
        let mut layer = Layer::new("scaled", 100, 100);
        layer.effects.scale = 2.0;
        let t = reverse_transformation(&layer).unwrap();
        assert_eq!(t.bounds.min, egui::pos2(-50.0, -50.0));
        assert_eq!(t.bounds.size(), egui::vec2(100.0, 100.0));
    }
}
