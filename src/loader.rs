// Background image loading.
// Every load returns a PendingImage right away and fills it from a named
// worker thread, so the render loop never blocks on the network or disk.
// Failures are logged and leave the image in the Failed state: whatever
// depends on it is skipped, never crashed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use reqwest::blocking::Client;

use crate::config::ImageConfig;
use crate::error::Error;
use crate::image_source::{ImageRegistry, PendingImage};
use crate::image_url::{ImageUri, classify};

/// Where the bytes for a normalised URI actually live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Remote(String),
    File(PathBuf),
}

pub struct ImageLoader {
    client: Client,
    proxy_path: String,
    proxy_origin: Option<String>,
    asset_root: PathBuf,
}

impl ImageLoader {
    pub fn new(cfg: &ImageConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.fetch_timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            proxy_path: cfg.proxy_path.clone(),
            proxy_origin: cfg.proxy_origin.as_ref().map(|o| o.trim_end_matches('/').to_string()),
            asset_root: cfg.asset_root.clone(),
        })
    }

    /// Map a normalised URI to a fetch target.
    /// Proxied URIs go through the configured proxy origin, or straight to
    /// upstream when there is none. Same-origin paths resolve under `asset_root`.
    pub fn resolve(&self, uri: &str) -> Fetch {
        match classify(uri, &self.proxy_path) {
            ImageUri::Proxied(upstream) => match &self.proxy_origin {
                Some(origin) => Fetch::Remote(format!("{origin}{uri}")),
                None => Fetch::Remote(upstream),
            },
            ImageUri::Local(path) => {
                let path = path.split(['?', '#']).next().unwrap_or_default();
                Fetch::File(self.asset_root.join(path.trim_start_matches('/')))
            }
        }
    }

    /// Start loading `uri`; the handle resolves later.
    pub fn load(&self, uri: &str) -> Arc<PendingImage> {
        let target = self.resolve(uri);
        log::debug!("loading {uri} from {target:?}");
        self.spawn(uri.to_string(), target)
    }

    /// Start loading a local file (the uploaded background photo).
    pub fn load_file(&self, path: &Path) -> Arc<PendingImage> {
        self.spawn(path.display().to_string(), Fetch::File(path.to_path_buf()))
    }

    /// Register a loader for `uri` unless the registry already has one.
    pub fn register(&self, images: &mut ImageRegistry, uri: &str) {
        if !images.contains(uri) {
            images.insert(uri, self.load(uri));
        }
    }

    fn spawn(&self, label: String, target: Fetch) -> Arc<PendingImage> {
        let pending = PendingImage::new();
        let handle = Arc::clone(&pending);
        let client = self.client.clone();
        let spawned = thread::Builder::new().name("image-loader".into()).spawn(move || {
            match fetch(&client, &label, &target) {
                Ok(pixels) => {
                    log::info!("loaded {label} ({}x{})", pixels.width(), pixels.height());
                    handle.fulfil(pixels);
                }
                Err(e) => {
                    log::warn!("{e}");
                    handle.fail();
                }
            }
        });
        if let Err(e) = spawned {
            log::warn!("could not start image loader: {e}");
            pending.fail();
        }
        pending
    }
}

fn fetch(client: &Client, label: &str, target: &Fetch) -> Result<RgbaImage, Error> {
    let fetch_err = |reason: String| Error::ImageFetch { uri: label.to_string(), reason };
    let bytes = match target {
        Fetch::Remote(url) => client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes())
            .map_err(|e| fetch_err(e.to_string()))?
            .to_vec(),
        Fetch::File(path) => std::fs::read(path).map_err(|e| fetch_err(format!("{}: {e}", path.display())))?,
    };
    decode(label, &bytes)
}

/// Decode any supported format to RGBA.
pub fn decode(label: &str, bytes: &[u8]) -> Result<RgbaImage, Error> {
    image::load_from_memory(bytes)
        .map(|img| img.into_rgba8())
        .map_err(|source| Error::ImageDecode { uri: label.to_string(), source })
}
