// The live, interactive view.
// Each frame: background -> layers in z-order -> highlight ring on the active
// layer. The mirror flag flips everything through one outer transform; the
// stored layer coordinates never see it.

use image::Rgba;
use kurbo::{Point, Rect, Size};

use crate::geometry::{layer_transform, mirror_transform, unmirror};
use crate::image_source::ImageRegistry;
use crate::layer::{Layer, LayerId};
use crate::scene::{self, BackgroundChoice, Backdrop, StageConfig};
use crate::store::LayerStore;
use crate::surface::Surface;

/// Highlight ring around the active layer.
const RING_COLOR: Rgba<u8> = Rgba([0x3b, 0x82, 0xf6, 255]);
const RING_WIDTH: f64 = 4.0;

pub struct StageRenderer {
    base_width: f64,
}

impl StageRenderer {
    pub fn new(base_width: f64) -> Self {
        Self { base_width }
    }

    /// Paint the whole stage at `size` (stage pixels, rounded down).
    pub fn render(&self, size: Size, config: &StageConfig, backdrop: &Backdrop, store: &LayerStore, images: &ImageRegistry) -> Surface {
        let mut surface = Surface::new(size.width.floor() as u32, size.height.floor() as u32);
        if config.mirror() {
            surface.transform(mirror_transform(surface.size().width));
        }

        /* 1) Background: a missing or unready source shows the placeholder. */
        let drawn = match scene::choose_background(config, backdrop) {
            BackgroundChoice::Video(Some(frame)) => scene::paint_cover(&mut surface, frame.as_ref()),
            BackgroundChoice::Photo(photo) => scene::paint_cover(&mut surface, photo.as_ref()),
            BackgroundChoice::Video(None) | BackgroundChoice::Placeholder => false,
        };
        if !drawn {
            scene::paint_placeholder(&mut surface);
        }

        /* 2) Layers, ascending z. */
        scene::paint_layers(&mut surface, &store.layers(), images, self.base_width);

        /* 3) Ring on the active layer only. */
        if let Some(active) = store.active() {
            self.paint_ring(&mut surface, active, images);
        }
        surface
    }

    fn paint_ring(&self, surface: &mut Surface, layer: &Layer, images: &ImageRegistry) {
        let Some(size) = self.layer_size(layer, images) else {
            return;
        };
        surface.save();
        surface.transform(layer_transform(layer.position, size, layer.rotation));
        let (w, h, r) = (size.width, size.height, RING_WIDTH);
        // four bands just outside the box
        surface.fill_rect(Rect::new(-r, -r, w + r, 0.0), RING_COLOR);
        surface.fill_rect(Rect::new(-r, h, w + r, h + r), RING_COLOR);
        surface.fill_rect(Rect::new(-r, 0.0, 0.0, h), RING_COLOR);
        surface.fill_rect(Rect::new(w, 0.0, w + r, h), RING_COLOR);
        surface.restore();
    }

    fn layer_size(&self, layer: &Layer, images: &ImageRegistry) -> Option<Size> {
        let source = images.ready(&layer.product.image_source)?;
        scene::layer_size(layer, source.as_ref(), self.base_width)
    }

    /// Topmost layer whose rendered box contains `local` (stage-local, as the
    /// user sees it). Accounts for the mirror flag and each layer's rotation.
    pub fn layer_at(&self, store: &LayerStore, images: &ImageRegistry, config: &StageConfig, stage: Size, local: Point) -> Option<LayerId> {
        let p = unmirror(local, stage.width.floor(), config.mirror());
        store.paint_order().iter().rev().find_map(|layer| {
            let size = self.layer_size(layer, images)?;
            let inv = layer_transform(layer.position, size, layer.rotation).inverse();
            Rect::from_origin_size(Point::ZERO, size).contains(inv * p).then_some(layer.id)
        })
    }
}
