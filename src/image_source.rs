// The "ImageSource" capability: anything with an intrinsic size that may or
// may not be ready yet, and can paint itself into a surface rectangle.
// Overlays, the background photo and camera frames all go through it, so
// neither the stage nor the compositor cares how pixels were obtained.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use image::RgbaImage;
use kurbo::Rect;

use crate::surface::Surface;

pub trait ImageSource: Send + Sync {
    /// Intrinsic pixel width; 0 while not ready.
    fn intrinsic_width(&self) -> u32;
    /// Intrinsic pixel height; 0 while not ready.
    fn intrinsic_height(&self) -> u32;
    fn is_ready(&self) -> bool;
    /// Paint into `dest` (surface user space). Does nothing when not ready.
    fn draw_into(&self, surface: &mut Surface, dest: Rect);

    /// Block for at most `timeout` until ready. Sources that never become
    /// ready later just report their current state.
    fn wait_until_ready(&self, _timeout: Duration) -> bool {
        self.is_ready()
    }
}

pub type SharedSource = Arc<dyn ImageSource>;

/// An already-decoded image (camera snapshot, test fixture).
pub struct StillImage {
    pixels: Arc<RgbaImage>,
}

impl StillImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels: Arc::new(pixels) }
    }

    pub fn shared(pixels: RgbaImage) -> SharedSource {
        Arc::new(Self::new(pixels))
    }
}

impl ImageSource for StillImage {
    fn intrinsic_width(&self) -> u32 {
        self.pixels.width()
    }

    fn intrinsic_height(&self) -> u32 {
        self.pixels.height()
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn draw_into(&self, surface: &mut Surface, dest: Rect) {
        surface.draw_image(&self.pixels, dest);
    }
}

/// Load progress of a [`PendingImage`].
#[derive(Clone, Default)]
pub enum LoadState {
    #[default]
    Pending,
    Ready(Arc<RgbaImage>),
    Failed,
}

/// An image that's filled in later by a loader thread.
/// Visual: until it resolves, whatever uses it is simply skipped.
#[derive(Default)]
pub struct PendingImage {
    state: Mutex<LoadState>,
    changed: Condvar,
}

impl PendingImage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fulfil(&self, pixels: RgbaImage) {
        self.settle(LoadState::Ready(Arc::new(pixels)));
    }

    pub fn fail(&self) {
        self.settle(LoadState::Failed);
    }

    fn settle(&self, next: LoadState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = next;
        self.changed.notify_all();
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn ready_pixels(&self) -> Option<Arc<RgbaImage>> {
        match self.state() {
            LoadState::Ready(p) => Some(p),
            _ => None,
        }
    }
}

impl ImageSource for PendingImage {
    fn intrinsic_width(&self) -> u32 {
        self.ready_pixels().map_or(0, |p| p.width())
    }

    fn intrinsic_height(&self) -> u32 {
        self.ready_pixels().map_or(0, |p| p.height())
    }

    fn is_ready(&self) -> bool {
        self.ready_pixels().is_some()
    }

    fn draw_into(&self, surface: &mut Surface, dest: Rect) {
        if let Some(pixels) = self.ready_pixels() {
            surface.draw_image(&pixels, dest);
        }
    }

    fn wait_until_ready(&self, timeout: Duration) -> bool {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| matches!(s, LoadState::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        matches!(*guard, LoadState::Ready(_))
    }
}

/// Image handles keyed by resolved URI. Layers that share a source share the
/// decoded pixels.
#[derive(Default, Clone)]
pub struct ImageRegistry {
    sources: HashMap<String, SharedSource>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, source: SharedSource) {
        self.sources.insert(uri.into(), source);
    }

    pub fn get(&self, uri: &str) -> Option<&SharedSource> {
        self.sources.get(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.sources.contains_key(uri)
    }

    /// The source only if it can be drawn right now.
    pub fn ready(&self, uri: &str) -> Option<&SharedSource> {
        self.get(uri).filter(|s| s.is_ready())
    }

    /// Drop every source whose URI `keep` rejects. Returns how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.sources.len();
        self.sources.retain(|uri, _| keep(uri.as_str()));
        before - self.sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pending_reports_zero_size_until_fulfilled() {
        let img = PendingImage::new();
        assert!(!img.is_ready());
        assert_eq!(img.intrinsic_width(), 0);
        img.fulfil(RgbaImage::new(4, 3));
        assert!(img.is_ready());
        assert_eq!((img.intrinsic_width(), img.intrinsic_height()), (4, 3));
    }

    #[test]
    fn wait_times_out_on_pending() {
        let img = PendingImage::new();
        assert!(!img.wait_until_ready(Duration::from_millis(10)));
    }

    #[test]
    fn wait_returns_early_on_failure() {
        let img = PendingImage::new();
        img.fail();
        assert!(!img.wait_until_ready(Duration::from_secs(5)));
        assert!(matches!(img.state(), LoadState::Failed));
    }

    #[test]
    fn wait_wakes_when_loader_finishes() {
        let img = PendingImage::new();
        let loader = Arc::clone(&img);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            loader.fulfil(RgbaImage::new(1, 1));
        });
        assert!(img.wait_until_ready(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn registry_hides_unready_sources() {
        let mut reg = ImageRegistry::new();
        let pending = PendingImage::new();
        reg.insert("/a.png", pending.clone());
        assert!(reg.contains("/a.png"));
        assert!(reg.ready("/a.png").is_none());
        pending.fulfil(RgbaImage::new(2, 2));
        assert!(reg.ready("/a.png").is_some());
    }

    #[test]
    fn retain_drops_rejected_uris() {
        let mut reg = ImageRegistry::new();
        reg.insert("/a.png", PendingImage::new());
        reg.insert("/b.png", PendingImage::new());
        assert_eq!(reg.retain(|uri| uri == "/b.png"), 1);
        assert!(!reg.contains("/a.png"));
        assert!(reg.contains("/b.png"));
    }
}
