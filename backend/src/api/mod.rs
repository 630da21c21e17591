//! API route definitions
//!
//! REST endpoints under `/api` for stream control and the overlay/settings
//! record store. Health endpoints live at the root.

pub mod health;
pub mod overlays;
pub mod settings;
pub mod stream;

use crate::services::ServicesManagerBuilder;

/// Register every `/api` route builder on the services manager.
pub fn with_api_routes(builder: ServicesManagerBuilder) -> ServicesManagerBuilder {
    builder
        .add_api_routes("stream", |_| stream::router())
        .add_api_routes("overlays", |_| overlays::router())
        .add_api_routes("settings", |_| settings::router())
}
