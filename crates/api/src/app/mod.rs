//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, protocol and rate producer wiring
//! - `routes/`: one file per call, each adapting a transport onto the protocol
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, ServicesError, build_services, build_services_on};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .fallback(routes::system::not_found)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
