// Offline rasteriser for "capture": reproduces the stage into one flat image
// and writes it out as PNG.
//
// Best effort: an overlay whose image isn't loaded is left out, and a
// background photo that doesn't arrive within the bounded wait is replaced by
// the placeholder, exactly as the stage shows it. Layer state is never
// touched here.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kurbo::Size;

use crate::error::Error;
use crate::geometry::mirror_transform;
use crate::image_source::{ImageRegistry, ImageSource};
use crate::layer::Layer;
use crate::scene::{self, BackgroundChoice, Backdrop, StageConfig};
use crate::surface::Surface;

/// Everything one export reads.
pub struct ExportRequest<'a> {
    /// Stage size on screen at the moment of export.
    pub stage_size: Size,
    pub config: &'a StageConfig,
    pub backdrop: &'a Backdrop,
    pub layers: &'a [Arc<Layer>],
    pub images: &'a ImageRegistry,
}

/// What a compose run left out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ComposeReport {
    pub background_skipped: bool,
    pub layers_skipped: usize,
}

pub struct Compositor {
    base_width: f64,
    background_wait: Duration,
}

impl Compositor {
    pub fn new(base_width: f64, background_wait: Duration) -> Self {
        Self { base_width, background_wait }
    }

    /// Output surface size: on-screen stage size rounded down, at least 1×1.
    pub fn output_size(stage_size: Size) -> (u32, u32) {
        let w = stage_size.width.floor().max(1.0) as u32;
        let h = stage_size.height.floor().max(1.0) as u32;
        (w, h)
    }

    pub fn compose(&self, req: &ExportRequest<'_>) -> (Surface, ComposeReport) {
        let (w, h) = Self::output_size(req.stage_size);
        let mut surface = Surface::new(w, h);
        let mut report = ComposeReport::default();

        /* 1) One global flip, before anything is drawn.
           Visual: the export faces the same way as the stage. */
        if req.config.mirror() {
            surface.transform(mirror_transform(f64::from(w)));
        }

        /* 2) Background: same choice and same fallback as the stage. */
        let drawn = match scene::choose_background(req.config, req.backdrop) {
            BackgroundChoice::Video(Some(frame)) => scene::paint_cover(&mut surface, frame.as_ref()),
            BackgroundChoice::Video(None) | BackgroundChoice::Placeholder => false,
            BackgroundChoice::Photo(photo) => {
                // the one suspend point of an export
                if photo.wait_until_ready(self.background_wait) {
                    scene::paint_cover(&mut surface, photo.as_ref())
                } else {
                    log::warn!("background photo not ready after {:?}, exporting the placeholder", self.background_wait);
                    report.background_skipped = true;
                    false
                }
            }
        };
        if !drawn {
            scene::paint_placeholder(&mut surface);
        }

        /* 3) Layers, ascending z. No ring: the export shows no selection. */
        report.layers_skipped = scene::paint_layers(&mut surface, req.layers, req.images, self.base_width);
        if report.layers_skipped > 0 {
            log::warn!("{} layer(s) left out of the export: image not loaded", report.layers_skipped);
        }
        (surface, report)
    }

    pub fn export_png(&self, req: &ExportRequest<'_>) -> Result<Vec<u8>, Error> {
        let (surface, _) = self.compose(req);
        surface.encode_png()
    }
}

/// Writes export artifacts as `<app_name>-<unix millis>.png`.
pub struct ExportSink {
    app_name: String,
    out_dir: PathBuf,
}

impl ExportSink {
    pub fn new(app_name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self { app_name: app_name.into(), out_dir: out_dir.into() }
    }

    pub fn file_name(&self, timestamp_millis: i64) -> String {
        format!("{}-{}.png", self.app_name, timestamp_millis)
    }

    pub fn write(&self, png: &[u8]) -> Result<PathBuf, Error> {
        let path = self.out_dir.join(self.file_name(Utc::now().timestamp_millis()));
        write_file(&path, png)?;
        log::info!("exported {}", path.display());
        Ok(path)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    std::fs::write(path, bytes).map_err(|source| Error::ExportWrite { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::{PendingImage, StillImage};
    use crate::layer::{Category, LayerPatch, Product};
    use crate::stage::StageRenderer;
    use crate::store::LayerStore;
    use image::{Rgba, RgbaImage};
    use kurbo::Point;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn product(uri: &str) -> Product {
        Product { id: uri.into(), brand: "b".into(), name: "n".into(), category: Category::Top, image_source: uri.into() }
    }

    fn compositor() -> Compositor {
        Compositor::new(10.0, Duration::from_millis(20))
    }

    #[test]
    fn output_matches_rounded_down_stage_size() {
        assert_eq!(Compositor::output_size(Size::new(480.9, 639.2)), (480, 639));
        assert_eq!(Compositor::output_size(Size::new(0.4, -3.0)), (1, 1));

        let store = LayerStore::new();
        let cfg = StageConfig::new(false, false);
        let backdrop = Backdrop::default();
        let images = ImageRegistry::new();
        let layers = store.layers();
        let req = ExportRequest { stage_size: Size::new(33.7, 21.2), config: &cfg, backdrop: &backdrop, layers: &layers, images: &images };
        let (s, _) = compositor().compose(&req);
        assert_eq!((s.width(), s.height()), (33, 21));
    }

    #[test]
    fn mirror_applies_once_globally() {
        let mut images = ImageRegistry::new();
        images.insert("/red.png", StillImage::shared(RgbaImage::from_pixel(10, 10, RED)));
        let mut store = LayerStore::new();
        let id = store.add_layer(product("/red.png"));
        store.update_layer(id, &LayerPatch { position: Some(Point::new(0.0, 0.0)), opacity: Some(1.0), ..LayerPatch::default() });
        let cfg = StageConfig::new(true, false);
        let backdrop = Backdrop::default();
        let layers = store.layers();
        let req = ExportRequest { stage_size: Size::new(30.0, 10.0), config: &cfg, backdrop: &backdrop, layers: &layers, images: &images };
        let (s, report) = compositor().compose(&req);
        assert_eq!(s.pixel(25, 5), RED);
        assert_ne!(s.pixel(5, 5), RED);
        assert_eq!(report, ComposeReport::default());
    }

    #[test]
    fn missing_images_are_skipped_not_fatal() {
        let mut images = ImageRegistry::new();
        images.insert("/slow.png", PendingImage::new());
        let mut store = LayerStore::new();
        store.add_layer(product("/slow.png"));
        store.add_layer(product("/unknown.png"));
        let cfg = StageConfig::new(false, false);
        let backdrop = Backdrop::default();
        let layers = store.layers();
        let req = ExportRequest { stage_size: Size::new(8.0, 8.0), config: &cfg, backdrop: &backdrop, layers: &layers, images: &images };
        let (_, report) = compositor().compose(&req);
        assert_eq!(report.layers_skipped, 2);
        assert!(compositor().export_png(&req).is_ok());
    }

    fn placeholder(w: u32, h: u32) -> Surface {
        let mut expected = Surface::new(w, h);
        scene::paint_placeholder(&mut expected);
        expected
    }

    #[test]
    fn late_background_photo_is_skipped_after_bounded_wait() {
        let cfg = StageConfig::new(false, false);
        let backdrop = Backdrop { video_frame: None, photo: Some(PendingImage::new()) };
        let images = ImageRegistry::new();
        let req = ExportRequest { stage_size: Size::new(4.0, 4.0), config: &cfg, backdrop: &backdrop, layers: &[], images: &images };
        let (s, report) = compositor().compose(&req);
        assert!(report.background_skipped);
        assert_eq!(s.image(), placeholder(4, 4).image());
    }

    #[test]
    fn failed_photo_exports_what_the_stage_shows() {
        let photo = PendingImage::new();
        photo.fail();
        let mut images = ImageRegistry::new();
        images.insert("/red.png", StillImage::shared(RgbaImage::from_pixel(10, 10, RED)));
        let mut store = LayerStore::new();
        let id = store.add_layer(product("/red.png"));
        store.update_layer(id, &LayerPatch::position(Point::new(1.0, 1.0)));
        store.set_active(None);
        let backdrop = Backdrop { video_frame: None, photo: Some(photo) };

        for mirror in [false, true] {
            let cfg = StageConfig::new(mirror, false);
            let stage = StageRenderer::new(10.0).render(Size::new(16.0, 16.0), &cfg, &backdrop, &store, &images);
            let layers = store.layers();
            let req = ExportRequest { stage_size: Size::new(16.0, 16.0), config: &cfg, backdrop: &backdrop, layers: &layers, images: &images };
            let (export, report) = compositor().compose(&req);
            assert!(report.background_skipped);
            assert_eq!(export.pixel(0, 0), stage.pixel(0, 0));
            assert!(stage.image() == export.image(), "mirror = {mirror}");
        }
    }

    #[test]
    fn ready_photo_covers_the_surface() {
        let cfg = StageConfig::new(false, false);
        let backdrop = Backdrop { video_frame: None, photo: Some(StillImage::shared(RgbaImage::from_pixel(2, 1, BLUE))) };
        let images = ImageRegistry::new();
        let req = ExportRequest { stage_size: Size::new(4.0, 4.0), config: &cfg, backdrop: &backdrop, layers: &[], images: &images };
        let (s, report) = compositor().compose(&req);
        assert!(!report.background_skipped);
        assert_eq!(s.pixel(0, 0), BLUE);
        assert_eq!(s.pixel(3, 3), BLUE);
    }

    #[test]
    fn live_mode_without_frame_uses_placeholder() {
        let cfg = StageConfig::new(false, true);
        let backdrop = Backdrop::default();
        let images = ImageRegistry::new();
        let req = ExportRequest { stage_size: Size::new(4.0, 4.0), config: &cfg, backdrop: &backdrop, layers: &[], images: &images };
        let (s, _) = compositor().compose(&req);
        assert_eq!(s.image(), placeholder(4, 4).image());
    }

    #[test]
    fn file_name_pattern() {
        let sink = ExportSink::new("fitting-room", "/tmp");
        assert_eq!(sink.file_name(1_700_000_000_000), "fitting-room-1700000000000.png");
    }

    #[test]
    fn unwritable_directory_reports_export_error() {
        let sink = ExportSink::new("x", "/definitely/not/a/dir");
        assert!(matches!(sink.write(b"png"), Err(Error::ExportWrite { .. })));
    }
}
