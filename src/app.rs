// The try-on session and the window loop around it.
//
// `TryOn` is everything that isn't a device: layers, drag controller, stage
// switches, background sources and the two painters. `App` adds the window,
// the camera and the image loader, and turns raw input into intents.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kurbo::{Point, Size};
use minifb::Key;

use crate::camera::{CameraCapture, Facing, LiveSession, open_camera};
use crate::compositor::{ComposeReport, Compositor, ExportRequest, ExportSink};
use crate::config::{AppConfig, ExportConfig, HUD_HEIGHT, StageDefaults};
use crate::draw::{Drawer, draw_text_5x7, fill_bar};
use crate::error::Error;
use crate::image_source::{ImageRegistry, SharedSource};
use crate::layer::{Layer, LayerId, LayerPatch, Product};
use crate::loader::ImageLoader;
use crate::pointer::{PointerController, PointerEvent, StageBounds};
use crate::scene::{Backdrop, StageConfig};
use crate::stage::StageRenderer;
use crate::store::{LayerStore, ZStep};
use crate::surface::Surface;
use crate::types::FrameBuffer;

pub const SCALE_STEP: f64 = 0.05;
pub const ROTATION_STEP: f64 = 2.5;
pub const OPACITY_STEP: f64 = 0.05;

const HUD_BG: u32 = 0x00_1A_1D_24;
const HUD_FG: u32 = 0x00_FF_FF_FF;

/// Something the user asked for from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    ToggleMirror,
    ToggleLive,
    ToggleRearCamera,
    NudgeScale(f64),
    NudgeRotation(f64),
    NudgeOpacity(f64),
    BringForward,
    SendBackward,
    RemoveActive,
    DuplicateActive,
    CycleActive,
    Export,
    Quit,
}

/// Key bindings: (key, intent, auto-repeat).
const BINDINGS: &[(Key, Intent, bool)] = &[
    (Key::M, Intent::ToggleMirror, false),
    (Key::V, Intent::ToggleLive, false),
    (Key::R, Intent::ToggleRearCamera, false),
    (Key::Equal, Intent::NudgeScale(SCALE_STEP), true),
    (Key::Minus, Intent::NudgeScale(-SCALE_STEP), true),
    (Key::Q, Intent::NudgeRotation(-ROTATION_STEP), true),
    (Key::E, Intent::NudgeRotation(ROTATION_STEP), true),
    (Key::O, Intent::NudgeOpacity(-OPACITY_STEP), true),
    (Key::P, Intent::NudgeOpacity(OPACITY_STEP), true),
    (Key::F, Intent::BringForward, false),
    (Key::B, Intent::SendBackward, false),
    (Key::Delete, Intent::RemoveActive, false),
    (Key::Backspace, Intent::RemoveActive, false),
    (Key::D, Intent::DuplicateActive, false),
    (Key::Tab, Intent::CycleActive, false),
    (Key::S, Intent::Export, false),
    (Key::Space, Intent::Export, false),
    (Key::Escape, Intent::Quit, false),
];

/// Device-free session state.
pub struct TryOn {
    store: LayerStore,
    pointer: PointerController,
    config: StageConfig,
    backdrop: Backdrop,
    images: ImageRegistry,
    renderer: StageRenderer,
    compositor: Compositor,
}

impl TryOn {
    pub fn new(stage: &StageDefaults, export: &ExportConfig) -> Self {
        Self {
            store: LayerStore::new(),
            pointer: PointerController::new(),
            config: StageConfig::new(stage.mirror, stage.live),
            backdrop: Backdrop::default(),
            images: ImageRegistry::new(),
            renderer: StageRenderer::new(stage.base_layer_width),
            compositor: Compositor::new(stage.base_layer_width, export.background_wait()),
        }
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LayerStore {
        &mut self.store
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: StageConfig) {
        self.config = config;
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageRegistry {
        &mut self.images
    }

    pub fn set_video_frame(&mut self, frame: Option<SharedSource>) {
        self.backdrop.video_frame = frame;
    }

    pub fn set_photo(&mut self, photo: Option<SharedSource>) {
        self.backdrop.photo = photo;
    }

    pub fn has_photo(&self) -> bool {
        self.backdrop.photo.is_some()
    }

    pub fn pointer(&self) -> &PointerController {
        &self.pointer
    }

    /// Apply a layer or stage intent. Returns `false` for the ones the
    /// window loop owns (export, quit).
    pub fn apply(&mut self, intent: Intent) -> bool {
        let active = self.store.active().cloned();
        match intent {
            Intent::ToggleMirror => self.config = self.config.with_mirror(!self.config.mirror()),
            Intent::ToggleLive => self.config = self.config.with_live(!self.config.live()),
            Intent::ToggleRearCamera => self.config = self.config.with_rear_camera(!self.config.rear_camera()),
            Intent::NudgeScale(d) => {
                if let Some(l) = active {
                    self.store.update_layer(l.id, &LayerPatch::scale(l.scale + d));
                }
            }
            Intent::NudgeRotation(d) => {
                if let Some(l) = active {
                    self.store.update_layer(l.id, &LayerPatch::rotation(l.rotation + d));
                }
            }
            Intent::NudgeOpacity(d) => {
                if let Some(l) = active {
                    self.store.update_layer(l.id, &LayerPatch::opacity(l.opacity + d));
                }
            }
            Intent::BringForward => {
                if let Some(l) = active {
                    self.store.reorder(l.id, ZStep::Forward);
                }
            }
            Intent::SendBackward => {
                if let Some(l) = active {
                    self.store.reorder(l.id, ZStep::Backward);
                }
            }
            Intent::RemoveActive => {
                if let Some(l) = active {
                    self.store.remove_layer(l.id);
                }
            }
            Intent::DuplicateActive => {
                if let Some(l) = active {
                    self.store.duplicate(l.id);
                }
            }
            Intent::CycleActive => self.store.cycle_active(),
            Intent::Export | Intent::Quit => return false,
        }
        true
    }

    /// Topmost layer under a stage-local point, as displayed.
    pub fn layer_at(&self, stage: Size, local: Point) -> Option<LayerId> {
        self.renderer.layer_at(&self.store, &self.images, &self.config, stage, local)
    }

    /// Layer under a window point, only when that point lies on the stage
    /// (never through the status bar above it).
    pub fn target_at(&self, bounds: StageBounds, client: Point) -> Option<LayerId> {
        let local = bounds.to_local(client);
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        self.layer_at(bounds.size, local)
    }

    /// Forget images no layer references any more. Returns how many went.
    pub fn prune_images(&mut self) -> usize {
        let layers = self.store.layers();
        self.images.retain(|uri| layers.iter().any(|l| l.product.image_source == uri))
    }

    pub fn handle_pointer(&mut self, event: PointerEvent, stage: Option<StageBounds>) {
        self.pointer.handle(event, stage, &mut self.store);
    }

    /// The interactive view, at `size`.
    pub fn render(&self, size: Size) -> Surface {
        self.renderer.render(size, &self.config, &self.backdrop, &self.store, &self.images)
    }

    /// The export raster, at the on-screen `size`.
    pub fn compose(&self, size: Size) -> (Surface, ComposeReport) {
        let layers = self.store.layers();
        self.compositor.compose(&self.request(size, &layers))
    }

    pub fn export_png(&self, size: Size) -> Result<Vec<u8>, Error> {
        let layers = self.store.layers();
        self.compositor.export_png(&self.request(size, &layers))
    }

    fn request<'a>(&'a self, size: Size, layers: &'a [Arc<Layer>]) -> ExportRequest<'a> {
        ExportRequest { stage_size: size, config: &self.config, backdrop: &self.backdrop, layers, images: &self.images }
    }
}

/// Mouse state carried between frames to turn polling into events.
#[derive(Debug, Default)]
struct MouseTracker {
    was_down: bool,
    last: Option<Point>,
}

impl MouseTracker {
    /// Turn this frame's (position, button) sample into pointer events.
    /// `hit` resolves the layer under a client point.
    fn sample(&mut self, pos: Option<Point>, down: bool, hit: impl Fn(Point) -> Option<LayerId>) -> Vec<PointerEvent> {
        let mut events = Vec::new();
        match (pos, self.last) {
            (None, Some(_)) => events.push(PointerEvent::Leave),
            (Some(p), _) if down && !self.was_down => events.push(PointerEvent::Down { position: p, target: hit(p) }),
            (Some(p), Some(prev)) if down && p != prev => events.push(PointerEvent::Move { position: p }),
            _ => {}
        }
        if !down && self.was_down && pos.is_some() {
            events.push(PointerEvent::Up);
        }
        self.was_down = down && pos.is_some();
        self.last = pos;
        events
    }
}

/// Frames-per-second over one-second windows.
struct FpsCounter {
    since: Instant,
    frames: u32,
    value: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self { since: Instant::now(), frames: 0, value: 0.0 }
    }

    /// Count one frame; returns the new rate when a window closes.
    fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.duration_since(self.since);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.value = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.since = now;
        Some(self.value)
    }
}

/// The window loop.
pub struct App {
    config: AppConfig,
    drawer: Drawer,
    loader: ImageLoader,
    sink: ExportSink,
    tryon: TryOn,
    live: Option<LiveSession<CameraCapture>>,
    mouse: MouseTracker,
    layers_seen: u64,
    status: String,
    fps: FpsCounter,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        let drawer = Drawer::new(&config.window.title, config.window.width, config.window.height + HUD_HEIGHT)?;
        let loader = ImageLoader::new(&config.images)?;
        let sink = ExportSink::new(config.export.app_name.clone(), config.export.out_dir.clone());
        let tryon = TryOn::new(&config.stage, &config.export);
        Ok(Self {
            config,
            drawer,
            loader,
            sink,
            tryon,
            live: None,
            mouse: MouseTracker::default(),
            layers_seen: u64::MAX,
            status: String::new(),
            fps: FpsCounter::new(),
        })
    }

    /// Add a deep-linked product as the sole layer.
    pub fn seed(&mut self, product: Product) {
        log::info!("seeding {} ({})", product.name, product.image_source);
        self.tryon.store_mut().seed(product);
    }

    pub fn add(&mut self, product: Product) {
        log::info!("adding {} ({})", product.name, product.image_source);
        self.tryon.store_mut().add_layer(product);
    }

    /// Use a local photo as the background; switches live mode off.
    pub fn use_photo(&mut self, path: &Path) {
        let photo: SharedSource = self.loader.load_file(path);
        self.tryon.set_photo(Some(photo));
        let config = self.tryon.config().with_live(false);
        self.tryon.set_config(config);
    }

    fn stage_bounds(&self) -> Option<StageBounds> {
        let (w, h) = self.drawer.size();
        StageBounds::measure(
            Point::new(0.0, HUD_HEIGHT as f64),
            Size::new(w as f64, h.saturating_sub(HUD_HEIGHT) as f64),
        )
    }

    /// Bring the camera in line with the live/facing switches.
    fn sync_camera(&mut self) {
        let config = *self.tryon.config();
        if !config.live() {
            if self.live.take().is_some() {
                self.tryon.set_video_frame(None);
            }
            return;
        }
        let facing = if config.rear_camera() { Facing::Rear } else { Facing::Front };
        if self.live.as_ref().is_some_and(|s| s.facing() == facing) {
            return;
        }
        // old stream first: one device at a time
        if let Some(mut old) = self.live.take() {
            old.release();
        }
        self.tryon.set_video_frame(None);
        self.live = Some(LiveSession::start(facing, open_camera(&self.config.camera, facing)));
    }

    /// Make sure every layer's image has a loader.
    fn sync_images(&mut self) {
        let revision = self.tryon.store().revision();
        if revision == self.layers_seen {
            return;
        }
        self.layers_seen = revision;
        let layers = self.tryon.store().layers();
        for layer in layers.iter() {
            self.loader.register(self.tryon.images_mut(), &layer.product.image_source);
        }
        let dropped = self.tryon.prune_images();
        if dropped > 0 {
            log::debug!("released {dropped} image(s) no layer uses");
        }
    }

    fn export(&mut self, stage: Size) {
        let result = self.tryon.export_png(stage).and_then(|png| self.sink.write(&png));
        self.status = match result {
            Ok(path) => format!("SAVED {}", path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()),
            Err(e) => {
                log::error!("export failed: {e}");
                "EXPORT FAILED".to_string()
            }
        };
    }

    fn hud_text(&self) -> String {
        let cfg = self.tryon.config();
        let mode = match (cfg.live(), self.live.as_ref().is_some_and(|s| s.is_streaming())) {
            (true, true) => "LIVE",
            (true, false) => "LIVE NO CAMERA",
            (false, _) if self.tryon.has_photo() => "PHOTO",
            (false, _) => "NO BACKGROUND",
        };
        let mut text = format!(
            "{mode} | MIRROR {} | {} LAYERS | FPS {:.1}",
            if cfg.mirror() { "ON" } else { "OFF" },
            self.tryon.store().len(),
            self.fps.value
        );
        if let Some(active) = self.tryon.store().active() {
            text.push_str(&format!(
                " | {} {:.0}% {:.0}",
                active.id,
                active.opacity * 100.0,
                active.rotation
            ));
        }
        if !self.status.is_empty() {
            text.push_str(" | ");
            text.push_str(&self.status);
        }
        text
    }

    pub fn run(&mut self) -> Result<(), Error> {
        /* ------------------------------ Main loop ------------------------------ */
        while self.drawer.is_open() {
            self.sync_camera();
            self.sync_images();

            /* 1) Fresh camera frame (kept from the last grab if this one failed). */
            let frame = self.live.as_mut().and_then(|s| s.poll());
            self.tryon.set_video_frame(frame);

            /* 2) Keys -> intents. */
            let mut quit = false;
            let mut export = false;
            for &(key, intent, repeat) in BINDINGS {
                let hit = if repeat { self.drawer.pressed_repeating(key) } else { self.drawer.pressed_once(key) };
                if !hit {
                    continue;
                }
                match intent {
                    Intent::Quit => quit = true,
                    Intent::Export => export = true,
                    other => {
                        self.tryon.apply(other);
                    }
                }
            }
            if quit {
                break;
            }

            /* 3) Mouse -> pointer events, stage re-measured for each frame. */
            let bounds = self.stage_bounds();
            let pos = self.drawer.mouse_pos().map(|(x, y)| Point::new(f64::from(x), f64::from(y)));
            let down = self.drawer.left_mouse_down();
            let tryon = &self.tryon;
            let events = self.mouse.sample(pos, down, |client| tryon.target_at(bounds?, client));
            for event in events {
                self.tryon.handle_pointer(event, bounds);
            }

            /* 4) Paint: HUD bar on top, stage below it. */
            let (win_w, win_h) = self.drawer.size();
            let mut screen = FrameBuffer::new(win_w.max(1), win_h.max(1));
            if let Some(b) = bounds {
                if export {
                    self.export(b.size);
                }
                let stage = self.tryon.render(b.size).to_frame_buffer();
                screen.blit_rows(&stage, HUD_HEIGHT);
            }
            fill_bar(&mut screen, 0, HUD_HEIGHT, HUD_BG);
            draw_text_5x7(&mut screen, 4, 4, &self.hud_text(), HUD_FG);

            /* 5) Present. */
            self.drawer.present(&screen)?;

            /* 6) FPS counter (logged + shown in the HUD once per second) */
            if let Some(fps) = self.fps.tick(Instant::now()) {
                log::debug!("FPS: {fps:.1}");
            }
        }

        // camera goes through the same release path as a toggle
        if let Some(mut session) = self.live.take() {
            session.release();
        }
        Ok(())
    }
}
