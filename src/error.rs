// One error type for the whole crate.
// Every variant states *where* things went wrong; the render path never sees
// these (it degrades instead), they surface from setup, loading and export.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String), // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Pushing the frame to the window failed
    #[error("Camera init error: {0}")]
    CameraInit(String), // Opening/starting the camera failed
    #[error("Camera frame error: {0}")]
    CameraFrame(String), // Grabbing/decoding a frame failed

    #[error("Image fetch error for {uri}: {reason}")]
    ImageFetch { uri: String, reason: String },
    #[error("Image decode error for {uri}: {source}")]
    ImageDecode {
        uri: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Export encode error: {0}")]
    ExportEncode(#[from] image::ImageError),
    #[error("Export write error for {path}: {source}")]
    ExportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}
