//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Public host (for generating absolute playlist URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite connection URL for the overlay/settings store
    pub database_url: String,

    /// Directory the transcoder writes the playlist and segments into
    pub hls_dir: PathBuf,

    /// Public mount of the segment directory (e.g. "/hls")
    pub hls_public_path: String,

    /// Optional prebuilt frontend served as the fallback route
    pub static_dir: PathBuf,

    /// Transcoding tool executable
    pub ffmpeg_path: String,

    /// Upper bound for the startup availability probe
    pub probe_timeout: Duration,

    /// Delay after spawning before a stream is reported as running
    pub grace_period: Duration,

    /// HLS segment duration in seconds
    pub segment_seconds: u32,

    /// Number of segments kept in the rolling playlist
    pub playlist_size: u32,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_path = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/livecast.db".to_string());

        let log_format = match env::var("LOG_FORMAT").ok().as_deref() {
            Some("pretty") => LogFormat::Pretty,
            Some("json") | None => LogFormat::Json,
            Some(other) => anyhow::bail!("Invalid LOG_FORMAT '{}' (expected json or pretty)", other),
        };

        Ok(Self {
            host: env::var("HOST").ok().filter(|h| !h.trim().is_empty()),

            port: parse_var("PORT", 3001)?,

            database_url: sqlite_url(&database_path),

            hls_dir: PathBuf::from(env::var("HLS_DIR").unwrap_or_else(|_| "./data/hls".to_string())),

            hls_public_path: normalize_mount(
                &env::var("HLS_PUBLIC_PATH").unwrap_or_else(|_| "/hls".to_string()),
            ),

            static_dir: PathBuf::from(env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string())),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),

            probe_timeout: Duration::from_millis(parse_var("FFMPEG_PROBE_TIMEOUT_MS", 5000)?),

            grace_period: Duration::from_millis(parse_var("STREAM_GRACE_PERIOD_MS", 3000)?),

            segment_seconds: parse_var("HLS_SEGMENT_SECONDS", 2)?,

            playlist_size: parse_var("HLS_LIST_SIZE", 5)?,

            log_format,
        })
    }

    /// Base URL prepended to public paths. Empty when no host is configured,
    /// in which case URLs are returned relative to the server root.
    pub fn public_base_url(&self) -> String {
        match &self.host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("http://{}:{}", host, self.port),
            None => String::new(),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Accept a bare path or a full sqlite URL.
fn sqlite_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", path)
    }
}

fn normalize_mount(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/hls".to_string()
    } else {
        format!("/{}", trimmed)
    }
}
