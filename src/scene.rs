// What both the live stage and the exporter paint: the configuration record,
// the background choice, and the per-layer draw. Keeping one copy of these is
// what makes an export look like the preview.

use std::sync::Arc;

use image::Rgba;
use kurbo::{Point, Rect, Size, Vec2};

use crate::geometry::{cover_rect, layer_transform, rendered_size};
use crate::image_source::{ImageRegistry, ImageSource, SharedSource};
use crate::layer::Layer;
use crate::store::paint_order;
use crate::surface::Surface;

/// Placeholder gradient stops (135°).
pub const PLACEHOLDER_STOPS: [Rgba<u8>; 2] = [Rgba([0x10, 0x13, 0x1a, 255]), Rgba([0x0a, 0x0c, 0x12, 255])];

/// Global UI switches, passed explicitly into every draw/export.
/// Each change produces a copy with a higher `revision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConfig {
    revision: u64,
    mirror: bool,
    live: bool,
    rear_camera: bool,
}

impl StageConfig {
    pub fn new(mirror: bool, live: bool) -> Self {
        Self { revision: 0, mirror, live, rear_camera: false }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn rear_camera(&self) -> bool {
        self.rear_camera
    }

    fn bumped(mut self) -> Self {
        self.revision += 1;
        self
    }

    pub fn with_mirror(self, mirror: bool) -> Self {
        if self.mirror == mirror { self } else { Self { mirror, ..self }.bumped() }
    }

    pub fn with_live(self, live: bool) -> Self {
        if self.live == live { self } else { Self { live, ..self }.bumped() }
    }

    pub fn with_rear_camera(self, rear_camera: bool) -> Self {
        if self.rear_camera == rear_camera { self } else { Self { rear_camera, ..self }.bumped() }
    }
}

/// Background sources currently available.
#[derive(Clone, Default)]
pub struct Backdrop {
    /// Latest camera frame, if the live session produced one.
    pub video_frame: Option<SharedSource>,
    /// Uploaded background photo.
    pub photo: Option<SharedSource>,
}

/// Which background applies under a given config.
pub enum BackgroundChoice<'a> {
    /// Live mode; `None` when there's no frame yet.
    Video(Option<&'a SharedSource>),
    Photo(&'a SharedSource),
    Placeholder,
}

pub fn choose_background<'a>(config: &StageConfig, backdrop: &'a Backdrop) -> BackgroundChoice<'a> {
    if config.live() {
        BackgroundChoice::Video(backdrop.video_frame.as_ref())
    } else if let Some(photo) = &backdrop.photo {
        BackgroundChoice::Photo(photo)
    } else {
        BackgroundChoice::Placeholder
    }
}

/// Two-stop diagonal gradient over the whole surface.
/// Visual: a dark blue-grey backdrop, lighter at the top-left.
pub fn paint_placeholder(surface: &mut Surface) {
    let size = surface.size();
    let rect = Rect::from_origin_size(Point::ZERO, size);
    let center = rect.center();
    let dir = Vec2::new(1.0, 1.0).normalize();
    let half = (size.width + size.height) / (2.0 * std::f64::consts::SQRT_2);
    surface.fill_linear_gradient(rect, center - dir * half, center + dir * half, PLACEHOLDER_STOPS);
}

/// Draw `source` scaled to cover the surface. `false` if it isn't ready.
pub fn paint_cover(surface: &mut Surface, source: &dyn ImageSource) -> bool {
    if !source.is_ready() {
        return false;
    }
    match cover_rect(source.intrinsic_width(), source.intrinsic_height(), surface.size()) {
        Some(dest) => {
            source.draw_into(surface, dest);
            true
        }
        None => false,
    }
}

/// Rendered size of `layer` with its image, if the image can be drawn.
pub fn layer_size(layer: &Layer, source: &dyn ImageSource, base_width: f64) -> Option<Size> {
    if !source.is_ready() {
        return None;
    }
    rendered_size(base_width, layer.scale, source.intrinsic_width(), source.intrinsic_height())
}

/// Draw one layer: alpha, translate, rotate about its centre, draw, restore.
pub fn paint_layer(surface: &mut Surface, layer: &Layer, source: &dyn ImageSource, base_width: f64) -> bool {
    let Some(size) = layer_size(layer, source, base_width) else {
        return false;
    };
    /* save -> alpha -> move + rotate about the centre -> draw -> restore
       Visual: the garment appears at its spot, tilted and see-through as set. */
    surface.save();
    surface.set_alpha(layer.opacity);
    surface.transform(layer_transform(layer.position, size, layer.rotation));
    source.draw_into(surface, Rect::from_origin_size(Point::ZERO, size));
    surface.restore();
    true
}

/// Draw every layer in paint order; layers whose image isn't ready are
/// skipped. Returns how many were skipped.
pub fn paint_layers(surface: &mut Surface, layers: &[Arc<Layer>], images: &ImageRegistry, base_width: f64) -> usize {
    let mut skipped = 0;
    for layer in paint_order(layers) {
        let painted = images
            .get(&layer.product.image_source)
            .is_some_and(|src| paint_layer(surface, &layer, src.as_ref(), base_width));
        if !painted {
            log::debug!("{} skipped: image not ready", layer.id);
            skipped += 1;
        }
    }
    skipped
}
