//! The document model: an ordered stack of layers plus the active selection.
//!
//! This is the data the engine renders and mutates; it is owned by the host
//! editor and handed to the engine by mutable reference each frame. Paint,
//! transform and filter changes all land in here (each a candidate
//! undo/redo unit for the host's history ledger).

use egui::{pos2, Rect, Vec2};
use image::Rgba;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blending::BlendMode;
use crate::shapes::Selection;
use crate::surface::Surface;

// ============================================================================
// LAYER EFFECTS / FILTERS
// ============================================================================

/// Non-destructive geometric transform state of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Effects {
    /// Rotation in radians around the layer center.
    pub rotation: f32,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub scale: f32,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            rotation: 0.0,
            mirror_x: false,
            mirror_y: false,
            scale: 1.0,
        }
    }
}

impl Effects {
    pub fn is_mirrored(&self) -> bool {
        self.mirror_x || self.mirror_y
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation % std::f32::consts::TAU != 0.0
    }

    pub fn is_scaled(&self) -> bool {
        self.scale != 1.0
    }

    /// True when the layer renders without any transform.
    pub fn is_identity(&self) -> bool {
        !self.is_mirrored() && !self.is_rotated() && !self.is_scaled()
    }
}

/// Composite-time filter state of a layer. Structural inequality of this
/// struct is what invalidates the per-layer render cache.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub enabled: bool,
    pub opacity: f32,
    pub blend_mode: BlendMode,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerType {
    #[default]
    Graphic,
    Text,
}

/// Text content of a text layer. Rasterization goes through the host's
/// [`TextRasterizer`]; the engine only caches and composites the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextState {
    pub value: String,
    pub size: f32,
    pub font: String,
    pub line_height: f32,
    pub letter_spacing: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            value: String::new(),
            size: 16.0,
            font: String::from("sans-serif"),
            line_height: 1.2,
            letter_spacing: 0.0,
        }
    }
}

/// Host-provided service that turns a [`TextState`] into pixels. Font
/// loading and measuring live outside this core.
pub trait TextRasterizer {
    fn rasterize(&self, text: &TextState, width: u32, height: u32) -> Surface;
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub layer_type: LayerType,
    /// Logical position of the layer within the document.
    pub left: f32,
    pub top: f32,
    pub width: u32,
    pub height: u32,
    /// Owned source raster. Dimensions always match `width`/`height`.
    pub source: Surface,
    /// Optional mask raster plus its offset within the layer.
    pub mask: Option<Surface>,
    pub mask_x: f32,
    pub mask_y: f32,
    pub effects: Effects,
    pub filters: Filters,
    pub text: Option<TextState>,
    pub visible: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            layer_type: LayerType::Graphic,
            left: 0.0,
            top: 0.0,
            width,
            height,
            source: Surface::new(width, height),
            mask: None,
            mask_x: 0.0,
            mask_y: 0.0,
            effects: Effects::default(),
            filters: Filters::default(),
            text: None,
            visible: true,
        }
    }

    pub fn new_filled(name: impl Into<String>, width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut layer = Self::new(name, width, height);
        layer.source = Surface::new_filled(width, height, color);
        layer
    }

    pub fn new_text(name: impl Into<String>, width: u32, height: u32, text: TextState) -> Self {
        let mut layer = Self::new(name, width, height);
        layer.layer_type = LayerType::Text;
        layer.text = Some(text);
        layer
    }

    /// Logical bounding rectangle (untransformed).
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(
            pos2(self.left, self.top),
            egui::vec2(self.width as f32, self.height as f32),
        )
    }

    /// Whether a mask is present and targeted for edits.
    pub fn is_maskable(&self) -> bool {
        self.mask.is_some()
    }

    /// Resize the layer, re-centering the raster content (and mask) on the
    /// dimension delta so buffer dimensions stay in sync with the model.
    pub fn set_size(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return;
        }
        self.source.resize_centered(width, height);
        if let Some(mask) = self.mask.as_mut() {
            mask.resize_centered(width, height);
        }
        self.width = width;
        self.height = height;
    }

    /// Replace the source raster. The layer dimensions follow the new
    /// buffer so the raster-matches-model invariant holds.
    pub fn replace_source(&mut self, source: Surface) {
        self.width = source.width();
        self.height = source.height();
        self.source = source;
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.left += delta.x;
        self.top += delta.y;
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct Document {
    pub width: u32,
    pub height: u32,
    /// Bottom-up layer stack.
    pub layers: Vec<Layer>,
    pub active_selection: Selection,
    pub invert_selection: bool,
}

impl Document {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
            active_selection: Vec::new(),
            invert_selection: false,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_min_size(
            pos2(0.0, 0.0),
            egui::vec2(self.width as f32, self.height as f32),
        )
    }

    pub fn add_layer(&mut self, layer: Layer) -> Uuid {
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Remove a layer, freeing its buffers. Returns false when the id is
    /// unknown (the operation is skipped, not an error).
    pub fn remove_layer(&mut self, id: Uuid) -> bool {
        let len = self.layers.len();
        self.layers.retain(|l| l.id != id);
        len != self.layers.len()
    }

    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn has_selection(&self) -> bool {
        !self.active_selection.is_empty()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.active_selection = selection;
    }

    pub fn clear_selection(&mut self) {
        self.active_selection.clear();
        self.invert_selection = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_resize_keeps_raster_in_sync() {
        let mut layer = Layer::new("test", 8, 8);
        layer.source.put_pixel(4, 4, Rgba([9, 9, 9, 255]));
        layer.set_size(16, 16);
        assert_eq!(layer.source.width(), 16);
        assert_eq!(layer.source.height(), 16);
        // content re-centered on the delta
        assert_eq!(layer.source.get_pixel(8, 8), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn remove_unknown_layer_is_skipped() {
        let mut doc = Document::new(4, 4);
        doc.add_layer(Layer::new("a", 4, 4));
        assert!(!doc.remove_layer(Uuid::new_v4()));
        assert_eq!(doc.layers.len(), 1);
    }

    #[test]
    fn document_round_trips_through_serde() {
        let mut doc = Document::new(8, 8);
        let id = doc.add_layer(Layer::new_filled("bg", 8, 8, Rgba([3, 5, 7, 255])));
        doc.set_selection(vec![crate::shapes::rectangle_to_shape(4.0, 4.0, 1.0, 1.0)]);

        let json = serde_json::to_string(&doc).unwrap();
        let restored: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.layers[0].id, id);
        assert_eq!(restored.layers[0].source.get_pixel(2, 2), Rgba([3, 5, 7, 255]));
        assert_eq!(restored.active_selection.len(), 1);
    }
}
