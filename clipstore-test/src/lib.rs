//! Test utilities for clipstore.
//!
//! This crate provides an in-process server and logging setup for integration tests. See the
//! modules for all available utilities.

pub mod server;
pub mod tracing;
