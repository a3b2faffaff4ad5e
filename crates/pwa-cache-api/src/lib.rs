//! PWA Cache HTTP surface
//!
//! This crate exposes a cache worker as an Axum reverse proxy: every
//! request that is not one of the `/_cache` management routes is handed to
//! the worker as a fetch event, and pass-through requests are forwarded to
//! the origin.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
