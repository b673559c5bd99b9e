//! Contains all HTTP endpoint handlers.
//!
//! Use [`routes`] to create a router with all endpoints.

use axum::Router;

use crate::state::ServiceState;

mod admin;
pub mod common;
mod health;
mod interactions;
mod videos;

/// Creates a router with all endpoints.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .merge(health::router())
        .merge(videos::router())
        .merge(interactions::router())
        .merge(admin::router())
}
