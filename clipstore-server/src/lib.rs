//! The clipstore web server.
//!
//! This builds on top of [`clipstore_service`] and exposes video uploads, streaming playback,
//! likes, comments and admin profiles over `HTTP`.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod extractors;
pub mod healthcheck;
pub mod observability;
pub mod state;
pub mod web;
