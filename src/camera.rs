// Opens a camera and hands out frames as RGBA images for the stage.
// The stream is a scoped resource: it belongs to the live-mode session and is
// released through one routine on every exit path (toggle off, facing switch,
// switching to a photo, drop).

use crate::error::Error;
use crate::image_source::{SharedSource, StillImage};

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

// We also use `image` crate types to turn the decoded RGB frame into RGBA.
use image::{DynamicImage, RgbaImage};

/// Anything that yields frames and holds a device open until stopped.
pub trait FrameSource {
    /// Grab one frame (blocks until the device has one).
    fn next_frame(&mut self) -> Result<RgbaImage, Error>;
    /// Release the device. Called once.
    fn stop(&mut self);
}

// A small wrapper around nokhwa::Camera so the session stays clean.
pub struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Try to open camera `index` at a target resolution (falls back if not exact).
    /// On success, nothing is shown on screen yet; we just hold an open stream.
    pub fn new(index: u32, width: u32, height: u32, fps: u32) -> Result<Self, Error> {
        // 1) Choose the device (0 = default webcam)
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            fps,
        );

        // 2) Ask for RGB frames, closest to our request.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        // 3) Create the camera (this might fail if no device exists or access is denied).
        let mut cam = Camera::new(idx, req)
            .map_err(|e| Error::CameraInit(format!("Create camera: {e}")))?;

        // 4) Start streaming frames from the camera.
        cam.open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream: {e}")))?;

        // 5) The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();

        Ok(Self {
            cam,
            width: actual.width(),
            height: actual.height(),
        })
    }

    /// Report the actual resolution the camera is delivering.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for CameraCapture {
    fn next_frame(&mut self) -> Result<RgbaImage, Error> {
        // 1) Pull a frame from the camera.
        let frame = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("Fetch frame: {e}")))?;

        // 2) Decode to RGB (handles the various raw formats), then widen to RGBA.
        let rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("Decode RGB: {e}")))?;

        Ok(DynamicImage::ImageRgb8(rgb_img).into_rgba8())
    }

    fn stop(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            log::warn!("camera stop failed: {e}");
        }
    }
}

/// Front ("user") or rear ("environment") camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Front,
    Rear,
}

/// The live-mode session. Owns at most one open source.
/// Acquisition failure is not an error: the session just has no frames.
pub struct LiveSession<S: FrameSource> {
    source: Option<S>,
    facing: Facing,
    last_frame: Option<SharedSource>,
    frame_error_logged: bool,
}

impl<S: FrameSource> LiveSession<S> {
    /// Start a session from an acquisition attempt.
    pub fn start(facing: Facing, acquired: Result<S, Error>) -> Self {
        let source = match acquired {
            Ok(s) => {
                log::info!("camera acquired ({facing:?})");
                Some(s)
            }
            Err(e) => {
                log::warn!("camera unavailable, showing placeholder: {e}");
                None
            }
        };
        Self { source, facing, last_frame: None, frame_error_logged: false }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn is_streaming(&self) -> bool {
        self.source.is_some()
    }

    /// Pull a fresh frame. On a failed grab the previous frame is kept.
    pub fn poll(&mut self) -> Option<SharedSource> {
        if let Some(source) = self.source.as_mut() {
            match source.next_frame() {
                Ok(frame) => {
                    self.last_frame = Some(StillImage::shared(frame));
                    self.frame_error_logged = false;
                }
                Err(e) if !self.frame_error_logged => {
                    log::warn!("{e}");
                    self.frame_error_logged = true;
                }
                Err(_) => {}
            }
        }
        self.last_frame.clone()
    }

    /// The single teardown routine. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            log::info!("camera released ({:?})", self.facing);
        }
        self.last_frame = None;
    }
}

impl<S: FrameSource> Drop for LiveSession<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open the configured device for `facing`.
pub fn open_camera(cfg: &crate::config::CameraConfig, facing: Facing) -> Result<CameraCapture, Error> {
    let index = match facing {
        Facing::Front => cfg.index,
        Facing::Rear => cfg.rear_index,
    };
    let cam = CameraCapture::new(index, cfg.width, cfg.height, cfg.fps)?;
    let (w, h) = cam.resolution();
    log::debug!("camera {index} streaming at {w}x{h}");
    Ok(cam)
}
