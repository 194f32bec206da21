// What you SEE:
// • A window with a status bar on top and the stage below it.
// • The stage shows the camera (mirrored by default) or a background photo,
//   with garment images layered on top.
// • Drag a garment with the left mouse button; it becomes the active one
//   (blue ring). Keys adjust the active garment:
//     = / -  scale      Q / E  rotate      O / P  opacity
//     F / B  forward / backward            D  duplicate   Del  remove
//     Tab    next garment
// • M mirror, V live camera on/off, R front/rear camera.
// • S or Space saves a PNG of the stage (no ring, no status bar). ESC quits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fitting_room::app::App;
use fitting_room::config::AppConfig;
use fitting_room::seed::{DeepLink, ManualEntry};

#[derive(Parser, Debug)]
#[command(name = "fitting-room", version, about = "Virtual try-on: layer garment images over a live camera")]
struct Cli {
    /// Config file (defaults to fitting-room.toml next to the binary)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Deep-link query to seed from, e.g. "img=https://cdn.x/a.png&name=Tee"
    #[arg(long, value_name = "QUERY")]
    deep_link: Option<String>,

    /// Seed a single garment from this image (same as img= in a deep link)
    #[arg(long, value_name = "URL")]
    img: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    brand: Option<String>,
    /// Garment category: top, bottom, dress, outer, ...
    #[arg(long = "type", value_name = "TYPE")]
    kind: Option<String>,

    /// Add a garment by image URL (repeatable)
    #[arg(long = "add", value_name = "URL")]
    add: Vec<String>,

    /// Use a local photo as the background instead of the camera
    #[arg(long, value_name = "FILE")]
    photo: Option<PathBuf>,

    /// Directory exported PNGs are written to
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

impl Cli {
    /// Deep link from `--deep-link`, or assembled from `--img` and friends.
    fn deep_link(&self) -> Option<DeepLink> {
        if let Some(query) = &self.deep_link {
            let link = DeepLink::parse(query);
            if link.is_none() {
                log::warn!("deep link has no img parameter, ignoring it");
            }
            return link;
        }
        let img = self.img.as_ref().filter(|s| !s.trim().is_empty())?;
        Some(DeepLink { img: img.clone(), name: self.name.clone(), brand: self.brand.clone(), kind: self.kind.clone() })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();
    log::info!("fitting-room v{} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    /* --- Config ---
       Visual: nothing yet; window size, defaults and export folder come from here. */
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_from_file(&config_path);
    if let Some(dir) = &cli.out_dir {
        config.export.out_dir = dir.clone();
    }
    let proxy_path = config.images.proxy_path.clone();

    /* --- Window + session ---
       Visual: window opens; the camera starts on the first frame. */
    let mut app = App::new(config).context("failed to start the fitting room")?;

    /* --- Initial garments ---
       Visual: a deep link shows exactly one garment; --add stacks more on top. */
    if let Some(link) = cli.deep_link() {
        app.seed(link.into_product(&proxy_path));
    }
    for url in &cli.add {
        match ManualEntry::from_url(url.clone()).to_product(&proxy_path) {
            Some(product) => app.add(product),
            None => log::warn!("skipping empty --add URL"),
        }
    }
    if let Some(photo) = &cli.photo {
        app.use_photo(photo);
    }

    app.run().context("window loop failed")?;
    log::info!("bye");
    Ok(())
}
