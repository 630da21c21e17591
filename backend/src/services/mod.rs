//! Long-running services and the manager that starts and stops them

pub mod database;
pub mod ffmpeg;
pub mod http_server;
pub mod logging;
pub mod manager;
pub mod segments;
pub mod stream;

pub use database::{DatabaseService, DatabaseServiceConfig};
pub use ffmpeg::{FfmpegService, HlsSettings};
pub use http_server::{HttpServerConfig, HttpServerService};
pub use logging::init_tracing;
pub use manager::{HealthStatus, Service, ServiceHealth, ServicesManager, ServicesManagerBuilder};
pub use segments::SegmentDirectory;
pub use stream::{
    StreamError, StreamErrorKind, StreamServiceConfig, StreamState, StreamStatus, StreamSupervisor,
};
