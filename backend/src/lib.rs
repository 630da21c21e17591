//! livecast - relay a live source to an HLS playlist
//!
//! A single ffmpeg process transcodes the configured source into a rolling
//! playlist that is served over HTTP next to a small JSON record store for
//! overlays and settings.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod services;

pub use app::AppState;
