//! Geometry and shape utilities.
//!
//! A [`Shape`] is an ordered list of points describing a (possibly open)
//! polygon boundary; a [`Selection`] is one or more shapes combined with
//! union semantics. Boolean combination delegates to the `geo` crate's
//! Martinez-style clipping — edge cases around touching edges and
//! degenerate rings are easy to get wrong by hand.

use egui::{pos2, Pos2, Rect};
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

/// Ordered list of 2D points describing a polygon boundary.
/// Closed iff first == last point and length ≥ 3.
pub type Shape = Vec<Pos2>;

/// One or more shapes marking the region eligible for edits.
pub type Selection = Vec<Shape>;

const HALF: f32 = 0.5;

// ============================================================================
// RECTANGLE / SHAPE CONVERSION
// ============================================================================

/// Bounding rectangle of a shape via min/max reduction across its points.
pub fn shape_to_rectangle(shape: &[Pos2]) -> Rect {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = 0.0f32;
    let mut max_y = 0.0f32;
    for p in shape {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Rect::from_min_max(pos2(min_x, min_y), pos2(max_x, max_y))
}

/// Bounding rectangle across all shapes of a selection.
pub fn selection_to_rectangle(selection: &Selection) -> Rect {
    if selection.len() == 1 {
        return shape_to_rectangle(&selection[0]);
    }
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = 0.0f32;
    let mut max_y = 0.0f32;
    for shape in selection {
        for p in shape {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
    }
    Rect::from_min_max(pos2(min_x, min_y), pos2(max_x, max_y))
}

/// Closed five point ring for a rectangle at the given origin.
pub fn rectangle_to_shape(width: f32, height: f32, x: f32, y: f32) -> Shape {
    vec![
        pos2(x, y),
        pos2(x + width, y),
        pos2(x + width, y + height),
        pos2(x, y + height),
        pos2(x, y),
    ]
}

pub fn scale_shape(shape: &[Pos2], scale: f32) -> Shape {
    shape.iter().map(|p| pos2(p.x * scale, p.y * scale)).collect()
}

pub fn scale_selection(selection: &Selection, scale: f32) -> Selection {
    selection.iter().map(|s| scale_shape(s, scale)).collect()
}

pub fn get_last_shape(selection: &Selection) -> Option<&Shape> {
    selection.last()
}

/// A shape is rectangular when it is a closed five point ring whose middle
/// edges are axis aligned.
pub fn is_shape_rectangular(shape: &[Pos2]) -> bool {
    if shape.len() != 5 {
        return false;
    }
    if shape[1].x != shape[2].x || shape[2].y != shape[3].y {
        return false;
    }
    is_shape_closed(shape)
}

/// Smallest closed shape is a three point polygon with a closing point.
pub fn is_shape_closed(shape: &[Pos2]) -> bool {
    if shape.len() < 3 {
        return false;
    }
    let first = shape[0];
    let last = shape[shape.len() - 1];
    first.x == last.x && first.y == last.y
}

// ============================================================================
// BOOLEAN COMBINATION (union / difference / intersection)
// ============================================================================

/// Union of two shapes. Non-overlapping inputs are returned unchanged —
/// a fast path, not an error. Open (< 3 point) inputs are treated as "not
/// closed" and returned untouched.
pub fn merge_shapes(shape_a: &[Pos2], shape_b: &[Pos2]) -> Vec<Shape> {
    if shape_a.len() < 3 || shape_b.len() < 3 {
        return vec![shape_a.to_vec(), shape_b.to_vec()];
    }
    if !shape_to_rectangle(shape_a).intersects(shape_to_rectangle(shape_b)) {
        return vec![shape_a.to_vec(), shape_b.to_vec()];
    }
    let result = to_polygon(shape_a).union(&to_polygon(shape_b));
    from_multi_polygon(&result)
}

/// Difference `shape_a − shape_b`. An empty result signals the selection
/// was fully removed.
pub fn subtract_shapes(shape_a: &[Pos2], shape_b: &[Pos2]) -> Vec<Shape> {
    if shape_a.len() < 3 {
        return Vec::new();
    }
    if shape_b.len() < 3 {
        return vec![shape_a.to_vec()];
    }
    let result = to_polygon(shape_a).difference(&to_polygon(shape_b));
    from_multi_polygon(&result)
}

/// Intersection of two shapes. Empty when the shapes do not overlap.
pub fn intersect_shapes(shape_a: &[Pos2], shape_b: &[Pos2]) -> Vec<Shape> {
    if shape_a.len() < 3 || shape_b.len() < 3 {
        return Vec::new();
    }
    if !shape_to_rectangle(shape_a).intersects(shape_to_rectangle(shape_b)) {
        return Vec::new();
    }
    let result = to_polygon(shape_a).intersection(&to_polygon(shape_b));
    from_multi_polygon(&result)
}

/// Ring-encode a shape for the clipping backend. The ring is closed here
/// regardless of whether the input carried its closing point.
fn to_polygon(shape: &[Pos2]) -> Polygon<f64> {
    let mut coords: Vec<Coord<f64>> = shape
        .iter()
        .map(|p| Coord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    Polygon::new(LineString::new(coords), vec![])
}

fn from_multi_polygon(mp: &MultiPolygon<f64>) -> Vec<Shape> {
    mp.iter()
        .map(|poly| {
            poly.exterior()
                .coords()
                .map(|c| pos2(c.x as f32, c.y as f32))
                .collect()
        })
        .collect()
}

// ============================================================================
// POINT MATH
// ============================================================================

pub fn distance_between(point1: Pos2, point2: Pos2) -> f32 {
    ((point2.x - point1.x).powi(2) + (point2.y - point1.y).powi(2)).sqrt()
}

/// Angle of the segment between two points, measured from the vertical so
/// that `sin` maps to x and `cos` maps to y when stepping along it.
pub fn angle_between(point1: Pos2, point2: Pos2) -> f32 {
    (point2.x - point1.x).atan2(point2.y - point1.y)
}

pub fn point_between(point1: Pos2, point2: Pos2) -> Pos2 {
    pos2(
        point1.x + (point2.x - point1.x) * HALF,
        point1.y + (point2.y - point1.y) * HALF,
    )
}

/// Rotate a point around the given center.
pub fn translate_pointer_rotation(x: f32, y: f32, center_x: f32, center_y: f32, angle: f32) -> Pos2 {
    let x2 = x - center_x;
    let y2 = y - center_y;
    let cos = angle.cos();
    let sin = angle.sin();
    pos2(
        (cos * x2) + (sin * y2) + center_x,
        (cos * y2) - (sin * x2) + center_y,
    )
}

pub fn get_rotation_center(rect: Rect) -> Pos2 {
    pos2(
        rect.left() + rect.width() * HALF,
        rect.top() + rect.height() * HALF,
    )
}

/// Scale a rectangle by a factor around its center.
pub fn scale_rectangle(rect: Rect, scale: f32) -> Rect {
    let scaled_w = rect.width() * scale;
    let scaled_h = rect.height() * scale;
    Rect::from_min_size(
        pos2(
            rect.left() - (scaled_w * HALF - rect.width() * HALF),
            rect.top() - (scaled_h * HALF - rect.height() * HALF),
        ),
        egui::vec2(scaled_w, scaled_h),
    )
}

/// Bounding box of a rectangle rotated around its center.
pub fn rotate_rectangle(rect: Rect, angle: f32) -> Rect {
    if angle == 0.0 {
        return rect;
    }
    let w = rect.width();
    let h = rect.height();
    let cos = angle.cos();
    let sin = angle.sin();
    let corners = [
        (-w * HALF, h * HALF),
        (w * HALF, h * HALF),
        (w * HALF, -h * HALF),
        (-w * HALF, -h * HALF),
    ];
    let mut min_x = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for (x, y) in corners {
        let rx = x * cos + y * sin;
        let ry = -x * sin + y * cos;
        min_x = min_x.min(rx);
        max_x = max_x.max(rx);
        min_y = min_y.min(ry);
        max_y = max_y.max(ry);
    }
    let out_w = max_x - min_x;
    let out_h = max_y - min_y;
    Rect::from_min_size(
        pos2(
            rect.left() - (out_w / 2.0 - w / 2.0),
            rect.top() - (out_h / 2.0 - h / 2.0),
        ),
        egui::vec2(out_w, out_h),
    )
}
