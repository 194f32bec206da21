//! Fitting room: a layer compositor for virtual garment try-on.
//!
//! Garment images are layered over a live camera feed or a still photo,
//! dragged and adjusted on a stage, and exported as a PNG that matches what
//! the stage shows.

pub mod app;
pub mod camera;
pub mod compositor;
pub mod config;
pub mod draw;
pub mod error;
pub mod geometry;
pub mod image_source;
pub mod image_url;
pub mod layer;
pub mod loader;
pub mod pointer;
pub mod scene;
pub mod seed;
pub mod stage;
pub mod store;
pub mod surface;
pub mod types;

pub use error::Error;
