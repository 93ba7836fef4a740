//! Per-layer render cache.
//!
//! Compositing a layer means resolving its mask and, for text layers,
//! rasterizing the text. Both are too expensive to redo every frame, so the
//! fully-rendered source is memoized per layer and invalidated when the
//! filter or text state structurally changes, or explicitly.

use std::collections::HashMap;

use uuid::Uuid;

use crate::document::{Filters, Layer, LayerType, TextRasterizer, TextState};
use crate::surface::{CompositeOp, Surface};

struct CachedSource {
    filters: Filters,
    text: Option<TextState>,
    mask_offset: (f32, f32),
    has_mask: bool,
    surface: Surface,
}

#[derive(Default)]
pub struct RenderCache {
    layers: HashMap<Uuid, CachedSource>,
    /// Last full composite, retained while the frame lock is held.
    composite: Option<Surface>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fully-rendered source of a layer: text rasterized, mask applied.
    /// Re-renders only when the cache key no longer matches.
    pub fn rendered_source(
        &mut self,
        layer: &Layer,
        text_rasterizer: Option<&dyn TextRasterizer>,
    ) -> &Surface {
        let stale = match self.layers.get(&layer.id) {
            Some(c) => {
                c.filters != layer.filters
                    || c.text != layer.text
                    || c.mask_offset != (layer.mask_x, layer.mask_y)
                    || c.has_mask != layer.mask.is_some()
            }
            None => true,
        };
        if stale {
            let surface = render_layer_source(layer, text_rasterizer);
            self.layers.insert(
                layer.id,
                CachedSource {
                    filters: layer.filters,
                    text: layer.text.clone(),
                    mask_offset: (layer.mask_x, layer.mask_y),
                    has_mask: layer.mask.is_some(),
                    surface,
                },
            );
        }
        &self.layers[&layer.id].surface
    }

    /// Drop the cached render of one layer (after its pixels changed).
    pub fn invalidate(&mut self, layer_id: Uuid) {
        self.layers.remove(&layer_id);
    }

    pub fn invalidate_all(&mut self) {
        self.layers.clear();
    }

    pub fn store_composite(&mut self, composite: Surface) {
        self.composite = Some(composite);
    }

    pub fn composite(&self) -> Option<&Surface> {
        self.composite.as_ref()
    }
}

fn render_layer_source(layer: &Layer, text_rasterizer: Option<&dyn TextRasterizer>) -> Surface {
    let mut rendered = match (layer.layer_type, &layer.text, text_rasterizer) {
        (LayerType::Text, Some(text), Some(rasterizer)) => {
            rasterizer.rasterize(text, layer.width, layer.height)
        }
        (LayerType::Text, Some(_), None) => {
            crate::log_warn!("text layer {} has no rasterizer, rendering source as-is", layer.name);
            layer.source.clone()
        }
        _ => layer.source.clone(),
    };
    if let Some(mask) = &layer.mask {
        rendered.draw_surface(
            mask,
            layer.mask_x.round() as i32,
            layer.mask_y.round() as i32,
            1.0,
            CompositeOp::DestinationIn,
        );
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Layer;
    use image::Rgba;

    #[test]
    fn mask_hides_uncovered_pixels() {
        let mut layer = Layer::new_filled("masked", 4, 4, Rgba([10, 20, 30, 255]));
        let mut mask = Surface::new(4, 4);
        mask.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        layer.mask = Some(mask);

        let mut cache = RenderCache::new();
        let rendered = cache.rendered_source(&layer, None);
        assert_eq!(rendered.get_pixel(0, 0)[3], 255);
        assert_eq!(rendered.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn shifted_mask_clears_uncovered_pixels() {
        let mut layer = Layer::new_filled("masked", 8, 8, Rgba([10, 20, 30, 255]));
        layer.mask = Some(Surface::new_filled(8, 8, Rgba([0, 0, 0, 255])));
        layer.mask_x = 4.0;

        let mut cache = RenderCache::new();
        let rendered = cache.rendered_source(&layer, None);
        // the band left of the shifted mask has no coverage
        assert_eq!(rendered.get_pixel(1, 1)[3], 0);
        assert_eq!(rendered.get_pixel(5, 1)[3], 255);
    }

    #[test]
    fn cache_hit_until_filters_change() {
        let mut layer = Layer::new_filled("cached", 4, 4, Rgba([1, 2, 3, 255]));
        let mut cache = RenderCache::new();
        cache.rendered_source(&layer, None);

        // mutate pixels without invalidating: stale contents are served
        layer.source.put_pixel(0, 0, Rgba([9, 9, 9, 255]));
        assert_eq!(cache.rendered_source(&layer, None).get_pixel(0, 0), Rgba([1, 2, 3, 255]));

        // structural filter change re-renders
        layer.filters.opacity = 0.5;
        assert_eq!(cache.rendered_source(&layer, None).get_pixel(0, 0), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn explicit_invalidate_rerenders() {
        let mut layer = Layer::new_filled("cached", 4, 4, Rgba([1, 2, 3, 255]));
        let mut cache = RenderCache::new();
        cache.rendered_source(&layer, None);
        layer.source.put_pixel(0, 0, Rgba([9, 9, 9, 255]));
        cache.invalidate(layer.id);
        assert_eq!(cache.rendered_source(&layer, None).get_pixel(0, 0), Rgba([9, 9, 9, 255]));
    }
}
