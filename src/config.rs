//! Runtime configuration.
//!
//! `AppConfig` holds everything a user may want to tweak without rebuilding.
//! It's read from `fitting-room.toml` next to the binary (or `--config`);
//! missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::image_url::PROXY_PATH;

/// Height of the status bar above the stage, in window pixels.
pub const HUD_HEIGHT: usize = 16;
/// Layer width at scale 1.0, in stage pixels.
pub const BASE_LAYER_WIDTH: f64 = 300.0;

const CONFIG_FILE: &str = "fitting-room.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Stage width in pixels.
    pub width: usize,
    /// Stage height in pixels (the HUD bar is added on top).
    pub height: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Fitting Room".into(), width: 480, height: 640 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageDefaults {
    pub base_layer_width: f64,
    pub mirror: bool,
    pub live: bool,
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self { base_layer_width: BASE_LAYER_WIDTH, mirror: true, live: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index of the front ("user") camera.
    pub index: u32,
    /// Device index used when the rear camera is selected.
    pub rear_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { index: 0, rear_index: 1, width: 640, height: 480, fps: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Prefix of exported file names: `<app_name>-<millis>.png`.
    pub app_name: String,
    pub out_dir: PathBuf,
    /// Longest wait for the background photo before exporting without it.
    pub background_wait_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { app_name: "fitting-room".into(), out_dir: PathBuf::from("."), background_wait_ms: 2000 }
    }
}

impl ExportConfig {
    pub fn background_wait(&self) -> Duration {
        Duration::from_millis(self.background_wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    pub proxy_path: String,
    /// When set, proxied images are fetched from `<origin><proxy_path>?url=..`.
    /// Otherwise the upstream URL is fetched directly.
    pub proxy_origin: Option<String>,
    /// Directory same-origin paths (`/img/a.png`) are resolved against.
    pub asset_root: PathBuf,
    pub fetch_timeout_ms: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            proxy_path: PROXY_PATH.into(),
            proxy_origin: None,
            asset_root: PathBuf::from("."),
            fetch_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub stage: StageDefaults,
    pub camera: CameraConfig,
    pub export: ExportConfig,
    pub images: ImageConfig,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `path`; a missing or broken file gives the defaults.
    pub fn load_from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(cfg) => {
                    log::info!("config loaded from {}", path.display());
                    cfg
                }
                Err(e) => {
                    log::warn!("config file is malformed, using defaults: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("no config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// `fitting-room.toml` next to the binary.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .unwrap_or_else(|_| PathBuf::from("fitting-room"))
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [stage]
            mirror = false

            [export]
            app_name = "kabin"
            "#,
        )
        .unwrap();
        assert!(!cfg.stage.mirror);
        assert!(cfg.stage.live);
        assert_eq!(cfg.stage.base_layer_width, 300.0);
        assert_eq!(cfg.export.app_name, "kabin");
        assert_eq!(cfg.export.background_wait(), Duration::from_secs(2));
        assert_eq!(cfg.images.proxy_path, "/api/proxy");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(AppConfig::from_toml("stage = 3"), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = AppConfig::load_from_file(Path::new("/definitely/not/here.toml"));
        assert_eq!(cfg, AppConfig::default());
    }
}
